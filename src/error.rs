//! Error types for mesh handling and the scene container format.

use crate::format::chunk::ChunkTag;
use thiserror::Error;

/// Result type alias using SceneError.
pub type Result<T> = std::result::Result<T, SceneError>;

/// Main error type for loading, saving and mesh post-processing.
#[derive(Error, Debug)]
pub enum SceneError {
    /// Underlying stream or file failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to encode or decode an image payload.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The stream does not start with the expected magic string.
    #[error("Invalid magic: expected \"GOX \", found {0:?}")]
    InvalidMagic([u8; 4]),

    /// The header carries a version this codec does not understand.
    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(i32),

    /// Malformed length fields, dictionaries, block lists or rasters.
    #[error("Format error: {0}")]
    Format(String),

    /// Stored checksum does not match the chunk payload.
    #[error("Corrupt chunk {tag}: stored CRC {expected:#010x}, computed {actual:#010x}")]
    Integrity {
        /// Tag of the offending chunk.
        tag: ChunkTag,
        /// CRC read from the stream.
        expected: u32,
        /// CRC recomputed over the payload.
        actual: u32,
    },

    /// A mesh contract was violated (dangling index, index range exceeded).
    #[error("Constraint violation: {0}")]
    Constraint(String),
}

impl SceneError {
    /// Whether this error must abort a whole load.
    ///
    /// Only checksum mismatches are chunk-local; the reader can skip the chunk
    /// because its length is already known.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SceneError::Integrity { .. })
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        SceneError::Format(msg.into())
    }
}
