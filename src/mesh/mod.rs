//! Indexed voxel meshes.
//!
//! [`extract`] turns voxel volumes into [`Mesh`]es, [`geometry`] holds the
//! mesh container and its post-processing, and [`compress`] packs index
//! buffers into the narrowest integer width.

pub mod compress;
pub mod extract;
pub mod geometry;

pub use compress::{CompressedIndices, IndexWidth};
pub use extract::extract_cubic_mesh;
pub use geometry::{Mesh, VoxelVertex};
