//! The GOX chunked scene container.
//!
//! ```text
//! Header:     "GOX " | version: i32
//! Chunk:      tag: [u8; 4] | length: i32 | payload | crc32(payload): u32
//! Dict entry: key length: i32 (0 = end) | key | value length: i32 | value
//! ```
//!
//! All integers are little-endian. [`chunk`] frames chunks, [`dict`] handles
//! the key/value sub-format, [`block`] converts 16³ voxel blocks to images and
//! [`gox`] maps whole documents onto the scene graph.

pub mod block;
pub mod chunk;
pub mod dict;
pub mod gox;

use serde::{Deserialize, Serialize};

/// Codec configuration, passed explicitly to every load and save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Version written to the header on save.
    pub version: i32,
    /// Abort the load on a checksum mismatch instead of skipping the chunk.
    pub strict_crc: bool,
    /// Largest chunk payload accepted when reading.
    pub max_chunk_len: u32,
    /// Largest dictionary value accepted when reading.
    pub max_dict_value_len: u32,
    /// Largest bounding box, in voxels, a loaded layer may span.
    pub max_layer_voxels: u64,
    /// Emit a PREV chunk with a rendered preview on save.
    pub write_preview: bool,
    /// Edge length of the preview image in pixels.
    pub preview_size: u32,
    /// Write identical blocks once and share them between references.
    pub dedup_blocks: bool,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            version: chunk::GOX_VERSION,
            strict_crc: false,
            max_chunk_len: 64 * 1024 * 1024,
            max_dict_value_len: 4096,
            max_layer_voxels: 1 << 26,
            write_preview: true,
            preview_size: 128,
            dedup_blocks: true,
        }
    }
}

impl FormatConfig {
    /// Fail loads on the first corrupt chunk.
    pub fn strict(mut self) -> Self {
        self.strict_crc = true;
        self
    }

    /// Enable or disable the PREV chunk on save.
    pub fn with_preview(mut self, enabled: bool) -> Self {
        self.write_preview = enabled;
        self
    }

    /// Bound the payload size accepted from untrusted input.
    pub fn with_max_chunk_len(mut self, max: u32) -> Self {
        self.max_chunk_len = max;
        self
    }

    /// Bound the dense volume a single layer may allocate on load.
    pub fn with_max_layer_voxels(mut self, max: u64) -> Self {
        self.max_layer_voxels = max;
        self
    }
}
