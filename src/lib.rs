//! # voxscene
//!
//! Indexed voxel meshes and the chunked GOX scene container.
//!
//! ## Overview
//!
//! The crate has two halves. [`mesh`] turns voxel volumes into indexed
//! triangle meshes and post-processes them (unused-vertex removal and
//! minimum-width index compression). [`format`] reads and writes GOX files:
//! a CRC-checked chunk stream holding 16³ voxel blocks as PNG images,
//! layers, materials, cameras and a light.
//!
//! ## Quick Start
//!
//! ```ignore
//! use voxscene::{load_scene, save_scene, FormatConfig, extract_cubic_mesh};
//!
//! let config = FormatConfig::default();
//! let scene = load_scene("model.gox", &config)?;
//!
//! for node in scene.model_nodes() {
//!     let volume = node.volume().unwrap();
//!     let mut mesh = extract_cubic_mesh(volume, volume.region());
//!     mesh.remove_unused_vertices();
//!     let triangles = mesh.triangle_count();
//!     let packed = mesh.compress_indices();
//!     println!("{}: {} triangles, {} packed bytes", node.name, triangles, packed.data().len());
//! }
//!
//! save_scene(&scene, "copy.gox", &config)?;
//! ```
//!
//! ## Coordinate Spaces
//!
//! Files are Z-up, the [`SceneGraph`] is Y-up. Conversion happens only inside
//! [`format::gox`]; see [`types::axis`] for the exact mapping.

pub mod error;
pub mod format;
pub mod mesh;
pub mod scene;
pub mod types;

// Re-export main types for convenience
pub use error::{Result, SceneError};
pub use format::chunk::{ChunkReader, ChunkTag, ChunkWriter};
pub use format::gox::{GoxChunk, SceneDocument};
pub use format::FormatConfig;
pub use mesh::{extract_cubic_mesh, CompressedIndices, IndexWidth, Mesh, VoxelVertex};
pub use scene::{
    Camera, Light, Material, NodeKind, Palette, RawVolume, SceneGraph, SceneNode, Transform, Voxel,
    VoxelAccess,
};
pub use types::{Axis, Direction, Region};

/// Load a scene from a GOX file.
pub fn load_scene<P: AsRef<std::path::Path>>(path: P, config: &FormatConfig) -> Result<SceneGraph> {
    format::gox::load(path, config)
}

/// Load a scene from GOX bytes.
pub fn load_scene_from_bytes(data: &[u8], config: &FormatConfig) -> Result<SceneGraph> {
    format::gox::load_from_bytes(data, config)
}

/// Save a scene as a GOX file.
pub fn save_scene<P: AsRef<std::path::Path>>(
    scene: &SceneGraph,
    path: P,
    config: &FormatConfig,
) -> Result<()> {
    format::gox::save(scene, path, config)
}

/// Read only the palette of a GOX file.
pub fn load_palette<P: AsRef<std::path::Path>>(path: P, config: &FormatConfig) -> Result<Palette> {
    format::gox::load_palette(path, config)
}
