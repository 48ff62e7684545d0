//! Minimum-width packing of triangle index lists.
//!
//! The width is chosen from the largest index alone: `u8` while every index
//! fits in one byte, then `u16`, then `u32`. The packed form is
//! `[width tag][index bytes, little-endian]`.

use crate::error::{Result, SceneError};

/// Storage width of a packed index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IndexWidth {
    U8 = 1,
    U16 = 2,
    U32 = 4,
}

impl IndexWidth {
    /// Smallest width able to represent `max_index`.
    pub fn for_max(max_index: u32) -> Self {
        if max_index <= u8::MAX as u32 {
            IndexWidth::U8
        } else if max_index <= u16::MAX as u32 {
            IndexWidth::U16
        } else {
            IndexWidth::U32
        }
    }

    /// Bytes per index.
    pub fn bytes(&self) -> usize {
        *self as usize
    }

    /// Parse a width tag. `0` is reserved for the empty encoding and is not a width.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(IndexWidth::U8),
            2 => Some(IndexWidth::U16),
            4 => Some(IndexWidth::U32),
            _ => None,
        }
    }
}

/// A packed index buffer.
///
/// An empty index list packs to width `None` with no data, which is distinct
/// from a single zero index (`Some(U8)`, one byte).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressedIndices {
    width: Option<IndexWidth>,
    data: Vec<u8>,
}

impl CompressedIndices {
    /// Pack `indices`, scanning them for the maximum.
    pub fn compress(indices: &[u32]) -> Self {
        match indices.iter().copied().max() {
            Some(max) => Self::compress_with_max(indices, max),
            None => Self::default(),
        }
    }

    /// Pack `indices` whose largest value is already known.
    ///
    /// # Panics
    ///
    /// If an index exceeds `max_index` and does not fit the chosen width.
    pub fn compress_with_max(indices: &[u32], max_index: u32) -> Self {
        if indices.is_empty() {
            return Self::default();
        }
        let width = IndexWidth::for_max(max_index);
        let mut data = Vec::with_capacity(indices.len() * width.bytes());
        match width {
            IndexWidth::U8 => {
                for &i in indices {
                    let v = u8::try_from(i).expect("index exceeds the given maximum");
                    data.push(v);
                }
            }
            IndexWidth::U16 => {
                for &i in indices {
                    let v = u16::try_from(i).expect("index exceeds the given maximum");
                    data.extend_from_slice(&v.to_le_bytes());
                }
            }
            IndexWidth::U32 => {
                for &i in indices {
                    data.extend_from_slice(&i.to_le_bytes());
                }
            }
        }
        Self {
            width: Some(width),
            data,
        }
    }

    /// Rebuild from a packed buffer and its stored width tag.
    pub fn from_parts(tag: u8, data: Vec<u8>) -> Result<Self> {
        if tag == 0 {
            if !data.is_empty() {
                return Err(SceneError::format("index data present with width 0"));
            }
            return Ok(Self::default());
        }
        let width = IndexWidth::from_tag(tag)
            .ok_or_else(|| SceneError::format(format!("invalid index width tag {tag}")))?;
        if data.len() % width.bytes() != 0 {
            return Err(SceneError::format(format!(
                "index buffer of {} bytes is not a multiple of width {}",
                data.len(),
                width.bytes()
            )));
        }
        Ok(Self {
            width: Some(width),
            data,
        })
    }

    /// Parse the `[tag][data]` form produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (&tag, data) = bytes
            .split_first()
            .ok_or_else(|| SceneError::format("missing index width tag"))?;
        Self::from_parts(tag, data.to_vec())
    }

    /// Serialise as `[tag][data]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.data.len());
        out.push(self.tag());
        out.extend_from_slice(&self.data);
        out
    }

    /// Width tag (`0` for the empty encoding).
    pub fn tag(&self) -> u8 {
        self.width.map_or(0, |w| w as u8)
    }

    pub fn width(&self) -> Option<IndexWidth> {
        self.width
    }

    /// Packed index bytes without the tag.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of packed indices.
    pub fn len(&self) -> usize {
        self.width.map_or(0, |w| self.data.len() / w.bytes())
    }

    /// Unpack to full-width indices.
    pub fn decompress(&self) -> Vec<u32> {
        match self.width {
            None => Vec::new(),
            Some(IndexWidth::U8) => self.data.iter().map(|&b| b as u32).collect(),
            Some(IndexWidth::U16) => self
                .data
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
                .collect(),
            Some(IndexWidth::U32) => self
                .data
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        }
    }
}
