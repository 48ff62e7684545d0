//! Indexed triangle mesh produced by surface extraction.

use super::compress::CompressedIndices;
use crate::error::{Result, SceneError};
use glam::IVec3;
use std::cmp::Ordering;

/// A vertex emitted by the surface extractor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VoxelVertex {
    /// Position relative to the mesh offset.
    pub position: [f32; 3],
    /// Palette index of the voxel this vertex belongs to.
    pub color_index: u8,
    /// Ambient occlusion level (0 = fully occluded, 3 = open).
    pub ambient_occlusion: u8,
    /// Free-form material flags.
    pub flags: u8,
}

impl VoxelVertex {
    pub fn new(position: [f32; 3], color_index: u8) -> Self {
        Self {
            position,
            color_index,
            ambient_occlusion: 3,
            flags: 0,
        }
    }

    pub fn with_ambient_occlusion(mut self, ao: u8) -> Self {
        self.ambient_occlusion = ao;
        self
    }
}

/// A triangle mesh with optional per-vertex normals and a cached packed index buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    vertices: Vec<VoxelVertex>,
    indices: Vec<u32>,
    normals: Vec<[f32; 3]>,
    offset: IVec3,
    compressed: Option<CompressedIndices>,
    may_grow: bool,
}

impl Mesh {
    /// Create an empty, growable mesh.
    pub fn new() -> Self {
        Self::with_capacity(0, 0, true)
    }

    /// Create a mesh with reserved buffers.
    ///
    /// With `may_grow == false` the reservation is a hard limit: exceeding it
    /// is a contract violation.
    pub fn with_capacity(vertices: usize, indices: usize, may_grow: bool) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            indices: Vec::with_capacity(indices),
            normals: Vec::new(),
            offset: IVec3::ZERO,
            compressed: None,
            may_grow,
        }
    }

    /// Add a vertex and return its index.
    ///
    /// # Panics
    ///
    /// If the vertex count would exceed the index range, or the mesh is
    /// fixed-size and its reservation is used up.
    pub fn add_vertex(&mut self, vertex: VoxelVertex) -> u32 {
        assert!(
            self.vertices.len() < u32::MAX as usize,
            "mesh has more vertices than the index type allows"
        );
        assert!(
            self.may_grow || self.vertices.len() < self.vertices.capacity(),
            "add_vertex() exceeds the reserved vertex capacity ({})",
            self.vertices.capacity()
        );
        let index = self.vertices.len() as u32;
        self.vertices.push(vertex);
        index
    }

    /// Add a triangle by vertex indices.
    ///
    /// # Panics
    ///
    /// If any index does not refer to an existing vertex, or the mesh is
    /// fixed-size and its index reservation is used up.
    pub fn add_triangle(&mut self, i0: u32, i1: u32, i2: u32) {
        let count = self.vertices.len();
        for i in [i0, i1, i2] {
            assert!(
                (i as usize) < count,
                "index points at an invalid vertex ({i}/{count})"
            );
        }
        assert!(
            self.may_grow || self.indices.len() + 3 <= self.indices.capacity(),
            "add_triangle() exceeds the reserved index capacity ({})",
            self.indices.capacity()
        );
        self.indices.extend_from_slice(&[i0, i1, i2]);
        self.compressed = None;
    }

    /// Add a quad (two triangles) from four vertices in counter-clockwise order.
    pub fn add_quad(&mut self, i0: u32, i1: u32, i2: u32, i3: u32) {
        self.add_triangle(i0, i1, i2);
        self.add_triangle(i0, i2, i3);
    }

    /// Set the normal of vertex `index`.
    ///
    /// The normal buffer grows to the vertex capacity on first use. Either set a
    /// normal for every vertex or for none; consumers treat the buffers as parallel.
    pub fn set_normal(&mut self, index: u32, normal: [f32; 3]) {
        let needed = self.vertices.capacity().max(index as usize + 1);
        if self.normals.len() < needed {
            self.normals.resize(needed, [0.0; 3]);
        }
        self.normals[index as usize] = normal;
    }

    /// Drop every vertex no triangle references and remap the index list.
    ///
    /// Triangle count, order and winding are unchanged; surviving vertices keep
    /// their relative order.
    pub fn remove_unused_vertices(&mut self) {
        let vertex_count = self.vertices.len();
        let mut used = vec![false; vertex_count];
        for &index in &self.indices {
            used[index as usize] = true;
        }

        let has_normals = !self.normals.is_empty();
        let mut new_pos = vec![0u32; vertex_count];
        let mut kept = 0usize;
        for old in 0..vertex_count {
            if !used[old] {
                continue;
            }
            self.vertices[kept] = self.vertices[old];
            if has_normals {
                self.normals[kept] = self.normals[old];
            }
            new_pos[old] = kept as u32;
            kept += 1;
        }

        self.vertices.truncate(kept);
        if has_normals {
            self.normals.truncate(kept);
        }
        for index in &mut self.indices {
            *index = new_pos[*index as usize];
        }
        self.compressed = None;
    }

    /// Recompute the packed index cache from the current index list.
    pub fn compress_indices(&mut self) -> &CompressedIndices {
        self.compressed
            .insert(CompressedIndices::compress(&self.indices))
    }

    /// The packed index cache, if it is current.
    ///
    /// Any index mutation drops the cache; call
    /// [`compress_indices`](Self::compress_indices) again afterwards.
    pub fn compressed_indices(&self) -> Option<&CompressedIndices> {
        self.compressed.as_ref()
    }

    /// Reset to an empty mesh at offset zero. Reserved capacity is kept.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.normals.clear();
        self.offset = IVec3::ZERO;
        self.compressed = None;
    }

    /// Check that the index list forms whole triangles of valid vertices.
    pub fn validate(&self) -> Result<()> {
        if self.indices.len() % 3 != 0 {
            return Err(SceneError::Constraint(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        let count = self.vertices.len();
        if let Some((pos, index)) = self
            .indices
            .iter()
            .enumerate()
            .find(|&(_, &i)| i as usize >= count)
        {
            return Err(SceneError::Constraint(format!(
                "index {index} at position {pos} exceeds vertex count {count}"
            )));
        }
        if !self.normals.is_empty() && self.normals.len() < count {
            return Err(SceneError::Constraint(format!(
                "{} normals for {count} vertices",
                self.normals.len()
            )));
        }
        Ok(())
    }

    /// Coarse spatial ordering used to batch meshes.
    ///
    /// `Less` when every axis of this offset is strictly smaller than `other`'s,
    /// `Greater` when every axis is strictly larger, `None` otherwise. Meshes with
    /// equal offsets are incomparable.
    pub fn batch_order(&self, other: &Mesh) -> Option<Ordering> {
        if self.offset.cmplt(other.offset).all() {
            Some(Ordering::Less)
        } else if self.offset.cmpgt(other.offset).all() {
            Some(Ordering::Greater)
        } else {
            None
        }
    }

    /// Whether this mesh sorts strictly before `other` on all three axes.
    pub fn sorts_before(&self, other: &Mesh) -> bool {
        self.batch_order(other) == Some(Ordering::Less)
    }

    pub fn vertices(&self) -> &[VoxelVertex] {
        &self.vertices
    }

    pub fn vertex(&self, index: u32) -> &VoxelVertex {
        &self.vertices[index as usize]
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Per-vertex normals; empty if none were set.
    pub fn normals(&self) -> &[[f32; 3]] {
        &self.normals
    }

    pub fn offset(&self) -> IVec3 {
        self.offset
    }

    /// Set the placement translation. Vertex positions are not modified.
    pub fn set_offset(&mut self, offset: IVec3) {
        self.offset = offset;
    }

    /// Get the number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of indices.
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Get the number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// A mesh without vertices or without indices draws nothing.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    /// Get positions as a flat array.
    pub fn positions_flat(&self) -> Vec<f32> {
        self.vertices.iter().flat_map(|v| v.position).collect()
    }

    /// Get normals as a flat array, truncated to the vertex count.
    pub fn normals_flat(&self) -> Vec<f32> {
        self.normals
            .iter()
            .take(self.vertices.len())
            .flat_map(|n| *n)
            .collect()
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}
