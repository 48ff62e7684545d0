//! Key/value dictionaries embedded in chunk payloads.
//!
//! Entries are `key_len: i32 | key | value_len: i32 | value`, terminated by a
//! zero key length. Values are raw bytes; the typed accessors below interpret
//! them the way the chunk decoders expect (little-endian scalars, packed f32
//! vectors, one-byte booleans).

use super::chunk::ByteCursor;
use crate::error::{Result, SceneError};
use glam::{Mat4, Quat, Vec3};

/// Longest key accepted in either direction.
pub const MAX_KEY_LEN: usize = 256;

/// An ordered dictionary of raw byte values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict {
    entries: Vec<(String, Vec<u8>)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a dictionary from `cursor`.
    ///
    /// A cursor with no bytes left yields an empty dictionary (some chunks
    /// carry an optional trailing dictionary). Otherwise the entries must end
    /// with a zero-length key.
    pub fn read(cursor: &mut ByteCursor<'_>, max_value_len: usize) -> Result<Self> {
        let mut dict = Self::new();
        if cursor.is_empty() {
            return Ok(dict);
        }
        loop {
            if cursor.remaining() < 4 {
                return Err(SceneError::format("unterminated dictionary"));
            }
            let key_len = cursor.read_len("dictionary key", MAX_KEY_LEN)?;
            if key_len == 0 {
                return Ok(dict);
            }
            let key = std::str::from_utf8(cursor.read_bytes(key_len)?)
                .map_err(|_| SceneError::format("dictionary key is not UTF-8"))?
                .to_string();
            let value_len = cursor.read_len("dictionary value", max_value_len)?;
            let value = cursor.read_bytes(value_len)?.to_vec();
            dict.entries.push((key, value));
        }
    }

    /// Append the encoded dictionary, terminator included, to `out`.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        for (key, value) in &self.entries {
            if key.is_empty() || key.len() > MAX_KEY_LEN {
                return Err(SceneError::format(format!(
                    "dictionary key {:?} must be 1..={} bytes",
                    key, MAX_KEY_LEN
                )));
            }
            let value_len = i32::try_from(value.len())
                .map_err(|_| SceneError::format(format!("value for {:?} too large", key)))?;
            out.extend_from_slice(&(key.len() as i32).to_le_bytes());
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(&value_len.to_le_bytes());
            out.extend_from_slice(value);
        }
        out.extend_from_slice(&0i32.to_le_bytes());
        Ok(())
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Set `key`, replacing any earlier value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: Vec<u8>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fixed-size value for `key`. A value of the wrong size is logged and ignored.
    fn get_array<const N: usize>(&self, key: &str) -> Option<[u8; N]> {
        let value = self.get(key)?;
        match <[u8; N]>::try_from(value) {
            Ok(array) => Some(array),
            Err(_) => {
                log::warn!(
                    "Ignoring dictionary value {:?}: expected {} bytes, found {}",
                    key,
                    N,
                    value.len()
                );
                None
            }
        }
    }

    fn get_f32s<const N: usize>(&self, key: &str) -> Option<[f32; N]> {
        let value = self.get(key)?;
        if value.len() != N * 4 {
            log::warn!(
                "Ignoring dictionary value {:?}: expected {} floats, found {} bytes",
                key,
                N,
                value.len()
            );
            return None;
        }
        let mut out = [0.0f32; N];
        for (dst, src) in out.iter_mut().zip(value.chunks_exact(4)) {
            *dst = f32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        }
        Some(out)
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.get_array(key).map(i32::from_le_bytes)
    }

    pub fn get_f32(&self, key: &str) -> Option<f32> {
        self.get_array(key).map(f32::from_le_bytes)
    }

    /// One-byte boolean; any non-zero byte is true.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get_array::<1>(key).map(|b| b[0] != 0)
    }

    /// UTF-8 string, trailing NUL padding stripped.
    pub fn get_str(&self, key: &str) -> Option<String> {
        let value = self.get(key)?;
        let end = value.iter().position(|&b| b == 0).unwrap_or(value.len());
        Some(String::from_utf8_lossy(&value[..end]).into_owned())
    }

    pub fn get_vec3(&self, key: &str) -> Option<Vec3> {
        self.get_f32s::<3>(key).map(Vec3::from_array)
    }

    /// Quaternion stored as `w, x, y, z`.
    pub fn get_quat(&self, key: &str) -> Option<Quat> {
        self.get_f32s::<4>(key)
            .map(|[w, x, y, z]| Quat::from_xyzw(x, y, z, w))
    }

    pub fn get_float4(&self, key: &str) -> Option<[f32; 4]> {
        self.get_f32s::<4>(key)
    }

    pub fn get_rgba8(&self, key: &str) -> Option<[u8; 4]> {
        self.get_array(key)
    }

    /// 4x4 matrix, column-major.
    pub fn get_mat4(&self, key: &str) -> Option<Mat4> {
        self.get_f32s::<16>(key).map(|m| Mat4::from_cols_array(&m))
    }

    pub fn set_i32(&mut self, key: &str, value: i32) {
        self.insert(key, value.to_le_bytes().to_vec());
    }

    pub fn set_f32(&mut self, key: &str, value: f32) {
        self.insert(key, value.to_le_bytes().to_vec());
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.insert(key, vec![value as u8]);
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.insert(key, value.as_bytes().to_vec());
    }

    fn set_f32s(&mut self, key: &str, values: &[f32]) {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.insert(key, bytes);
    }

    pub fn set_vec3(&mut self, key: &str, value: Vec3) {
        self.set_f32s(key, &value.to_array());
    }

    pub fn set_quat(&mut self, key: &str, value: Quat) {
        self.set_f32s(key, &[value.w, value.x, value.y, value.z]);
    }

    pub fn set_float4(&mut self, key: &str, value: [f32; 4]) {
        self.set_f32s(key, &value);
    }

    pub fn set_rgba8(&mut self, key: &str, value: [u8; 4]) {
        self.insert(key, value.to_vec());
    }

    pub fn set_mat4(&mut self, key: &str, value: Mat4) {
        self.set_f32s(key, &value.to_cols_array());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(dict: &Dict) -> Vec<u8> {
        let mut out = Vec::new();
        dict.write(&mut out).unwrap();
        out
    }

    fn decode(bytes: &[u8]) -> Result<Dict> {
        Dict::read(&mut ByteCursor::new(bytes), 4096)
    }

    #[test]
    fn test_wire_layout() {
        let mut dict = Dict::new();
        dict.set_bool("visible", true);
        let bytes = encode(&dict);

        let mut expected = Vec::new();
        expected.extend_from_slice(&7i32.to_le_bytes());
        expected.extend_from_slice(b"visible");
        expected.extend_from_slice(&1i32.to_le_bytes());
        expected.push(1);
        expected.extend_from_slice(&0i32.to_le_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_typed_values() {
        let mut dict = Dict::new();
        dict.set_str("name", "layer");
        dict.set_i32("mat", -1);
        dict.set_f32("dist", 42.5);
        dict.set_vec3("ofs", Vec3::new(1.0, 2.0, 3.0));
        dict.set_quat("rot", Quat::from_xyzw(0.1, 0.2, 0.3, 0.9));
        dict.set_rgba8("color", [1, 2, 3, 4]);
        dict.set_mat4("box", Mat4::from_translation(Vec3::new(5.0, 6.0, 7.0)));

        let parsed = decode(&encode(&dict)).unwrap();
        assert_eq!(parsed.len(), 7);
        assert_eq!(parsed.get_str("name").as_deref(), Some("layer"));
        assert_eq!(parsed.get_i32("mat"), Some(-1));
        assert_eq!(parsed.get_f32("dist"), Some(42.5));
        assert_eq!(parsed.get_vec3("ofs"), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(parsed.get_quat("rot"), Some(Quat::from_xyzw(0.1, 0.2, 0.3, 0.9)));
        assert_eq!(parsed.get_rgba8("color"), Some([1, 2, 3, 4]));
        assert_eq!(
            parsed.get_mat4("box").unwrap().w_axis.truncate(),
            Vec3::new(5.0, 6.0, 7.0)
        );
    }

    #[test]
    fn test_quat_is_stored_w_first() {
        let mut dict = Dict::new();
        dict.set_quat("rot", Quat::from_xyzw(0.0, 0.0, 0.0, 1.0));
        assert_eq!(&dict.get("rot").unwrap()[..4], &1.0f32.to_le_bytes());
    }

    #[test]
    fn test_wrong_sized_value_is_ignored() {
        let mut dict = Dict::new();
        dict.insert("dist", vec![1, 2]);
        assert_eq!(dict.get_f32("dist"), None);
        assert!(dict.get("dist").is_some());
    }

    #[test]
    fn test_nul_padded_string() {
        let mut dict = Dict::new();
        dict.insert("name", b"abc\0\0\0".to_vec());
        assert_eq!(dict.get_str("name").as_deref(), Some("abc"));
    }

    #[test]
    fn test_insert_replaces() {
        let mut dict = Dict::new();
        dict.set_i32("id", 1);
        dict.set_i32("id", 2);
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get_i32("id"), Some(2));
    }

    #[test]
    fn test_empty_input_is_empty_dict() {
        assert!(decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_missing_terminator_is_error() {
        let mut bytes = encode(&{
            let mut d = Dict::new();
            d.set_i32("id", 3);
            d
        });
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(decode(&bytes), Err(SceneError::Format(_))));
    }

    #[test]
    fn test_length_limits() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&300i32.to_le_bytes());
        bytes.extend(std::iter::repeat(b'k').take(300));
        assert!(decode(&bytes).is_err());

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.push(b'k');
        bytes.extend_from_slice(&(-5i32).to_le_bytes());
        assert!(decode(&bytes).is_err());

        let mut dict = Dict::new();
        dict.insert("big", vec![0; 64]);
        let bytes = encode(&dict);
        assert!(Dict::read(&mut ByteCursor::new(&bytes), 16).is_err());
    }

    #[test]
    fn test_write_rejects_bad_keys() {
        let mut dict = Dict::new();
        dict.insert("", vec![1]);
        assert!(dict.write(&mut Vec::new()).is_err());

        let mut dict = Dict::new();
        dict.insert("k".repeat(MAX_KEY_LEN + 1), vec![1]);
        assert!(dict.write(&mut Vec::new()).is_err());
    }

    #[test]
    fn test_read_stops_at_terminator() {
        let mut dict = Dict::new();
        dict.set_i32("a", 1);
        let mut bytes = encode(&dict);
        bytes.extend_from_slice(b"tail");
        let mut cursor = ByteCursor::new(&bytes);
        let parsed = Dict::read(&mut cursor, 4096).unwrap();
        assert_eq!(parsed.get_i32("a"), Some(1));
        assert_eq!(cursor.remaining(), 4);
    }
}
