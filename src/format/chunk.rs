//! Chunk framing: header, tagged length-prefixed payloads and CRC-32 checks.

use super::FormatConfig;
use crate::error::{Result, SceneError};
use std::fmt;
use std::io::Write;

/// Magic string at the start of every stream.
pub const GOX_MAGIC: [u8; 4] = *b"GOX ";

/// The only container version this codec reads and writes.
pub const GOX_VERSION: i32 = 2;

/// Bytes before a chunk payload: tag plus length.
const CHUNK_HEADER_LEN: usize = 8;

/// Four-byte chunk identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkTag(pub [u8; 4]);

impl ChunkTag {
    /// Scene bounding box.
    pub const IMG: ChunkTag = ChunkTag(*b"IMG ");
    /// PNG preview image.
    pub const PREV: ChunkTag = ChunkTag(*b"PREV");
    /// One 16³ voxel block encoded as a PNG.
    pub const BL16: ChunkTag = ChunkTag(*b"BL16");
    /// Layer: block references plus a property dictionary.
    pub const LAYR: ChunkTag = ChunkTag(*b"LAYR");
    pub const CAMR: ChunkTag = ChunkTag(*b"CAMR");
    pub const MATE: ChunkTag = ChunkTag(*b"MATE");
    pub const LIGH: ChunkTag = ChunkTag(*b"LIGH");

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = String::from_utf8_lossy(&self.0);
        f.write_str(text.trim_end())
    }
}

impl fmt::Debug for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkTag({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// A framed chunk whose checksum has been verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawChunk<'a> {
    pub tag: ChunkTag,
    pub payload: &'a [u8],
    /// Byte offset of the chunk tag within the stream.
    pub offset: usize,
}

/// Little-endian reader over a byte slice. Underflow is a format error.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(SceneError::format(format!(
                "unexpected end of data at offset {}: need {} bytes, {} left",
                self.pos,
                len,
                self.remaining()
            )));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a signed length field and check it against `max` and the bytes left.
    pub fn read_len(&mut self, what: &str, max: usize) -> Result<usize> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(SceneError::format(format!("negative {} length {}", what, len)));
        }
        let len = len as usize;
        if len > max {
            return Err(SceneError::format(format!(
                "{} length {} exceeds limit {}",
                what, len, max
            )));
        }
        if len > self.remaining() {
            return Err(SceneError::format(format!(
                "{} length {} exceeds the {} bytes remaining",
                what,
                len,
                self.remaining()
            )));
        }
        Ok(len)
    }
}

/// Iterates the chunks of an in-memory GOX stream.
///
/// Yields `Err(SceneError::Integrity)` for a chunk whose checksum does not
/// match; the reader has already moved past it, so iteration may continue.
/// Any other error ends the iteration.
pub struct ChunkReader<'a> {
    cursor: ByteCursor<'a>,
    version: i32,
    max_chunk_len: usize,
    failed: bool,
}

impl<'a> ChunkReader<'a> {
    /// Validate the header and position the reader on the first chunk.
    pub fn new(data: &'a [u8], config: &FormatConfig) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        let magic: [u8; 4] = cursor
            .read_array()
            .map_err(|_| SceneError::format("stream too short for a GOX header"))?;
        if magic != GOX_MAGIC {
            return Err(SceneError::InvalidMagic(magic));
        }
        let version = cursor.read_i32()?;
        if version != GOX_VERSION {
            return Err(SceneError::UnsupportedVersion(version));
        }
        Ok(Self {
            cursor,
            version,
            max_chunk_len: config.max_chunk_len as usize,
            failed: false,
        })
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    fn read_chunk(&mut self) -> Result<RawChunk<'a>> {
        let offset = self.cursor.position();
        if self.cursor.remaining() < CHUNK_HEADER_LEN {
            return Err(SceneError::format(format!(
                "truncated chunk header at offset {}",
                offset
            )));
        }
        let tag = ChunkTag(self.cursor.read_array()?);
        let len = self.cursor.read_len("chunk", self.max_chunk_len)?;
        let payload = self.cursor.read_bytes(len)?;
        let expected = self
            .cursor
            .read_u32()
            .map_err(|_| SceneError::format(format!("chunk {} is missing its CRC", tag)))?;

        let actual = crc32fast::hash(payload);
        if actual != expected {
            return Err(SceneError::Integrity {
                tag,
                expected,
                actual,
            });
        }
        Ok(RawChunk {
            tag,
            payload,
            offset,
        })
    }
}

impl<'a> Iterator for ChunkReader<'a> {
    type Item = Result<RawChunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor.is_empty() {
            return None;
        }
        let chunk = self.read_chunk();
        if let Err(e) = &chunk {
            self.failed = e.is_fatal();
        }
        Some(chunk)
    }
}

/// Writes a GOX header followed by framed chunks.
pub struct ChunkWriter<W: Write> {
    writer: W,
}

impl<W: Write> ChunkWriter<W> {
    /// Write the header for `version` and return the writer.
    pub fn new(mut writer: W, version: i32) -> Result<Self> {
        if version != GOX_VERSION {
            return Err(SceneError::UnsupportedVersion(version));
        }
        writer.write_all(&GOX_MAGIC)?;
        writer.write_all(&version.to_le_bytes())?;
        Ok(Self { writer })
    }

    /// Frame `payload` as one chunk.
    pub fn write_chunk(&mut self, tag: ChunkTag, payload: &[u8]) -> Result<()> {
        let len = i32::try_from(payload.len())
            .map_err(|_| SceneError::format(format!("chunk {} payload too large", tag)))?;
        self.writer.write_all(tag.as_bytes())?;
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(payload)?;
        self.writer.write_all(&crc32fast::hash(payload).to_le_bytes())?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
