//! Cubic surface extraction: one quad per exposed voxel face.
//!
//! Vertices are shared between faces that agree on corner, colour, face
//! direction and ambient occlusion, so flat same-coloured areas reuse corners.

use super::geometry::{Mesh, VoxelVertex};
use crate::scene::VoxelAccess;
use crate::types::{Direction, Region};
use glam::IVec3;
use std::collections::HashMap;

/// Extract the visible surface of `region` from `volume`.
///
/// Positions are relative to `region.lower`, which becomes the mesh offset.
/// Faces bordering solid voxels outside the region are culled as well.
pub fn extract_cubic_mesh<V: VoxelAccess>(volume: &V, region: Region) -> Mesh {
    let mut mesh = Mesh::new();
    mesh.set_offset(region.lower);

    let mut shared: HashMap<(IVec3, u8, Direction, u8), u32> = HashMap::new();

    for pos in region.cells() {
        let Some(voxel) = volume.voxel(pos) else {
            continue;
        };
        for dir in Direction::ALL {
            if volume.is_solid(pos + dir.offset()) {
                continue;
            }

            let ao = face_ambient_occlusion(volume, pos, dir);
            let mut quad = [0u32; 4];
            for (i, corner) in dir.face_corners().into_iter().enumerate() {
                let local = pos - region.lower + corner;
                let key = (local, voxel.color, dir, ao[i]);
                quad[i] = *shared.entry(key).or_insert_with(|| {
                    let vertex = VoxelVertex::new(local.as_vec3().to_array(), voxel.color)
                        .with_ambient_occlusion(ao[i]);
                    let index = mesh.add_vertex(vertex);
                    mesh.set_normal(index, dir.normal());
                    index
                });
            }

            // Split along the diagonal with the brighter corners to avoid AO anisotropy.
            if ao[0] as u16 + ao[2] as u16 >= ao[1] as u16 + ao[3] as u16 {
                mesh.add_quad(quad[0], quad[1], quad[2], quad[3]);
            } else {
                mesh.add_quad(quad[1], quad[2], quad[3], quad[0]);
            }
        }
    }

    mesh
}

/// Per-corner occlusion (0 = darkest, 3 = open) for the face of `pos` facing `dir`.
fn face_ambient_occlusion<V: VoxelAccess>(volume: &V, pos: IVec3, dir: Direction) -> [u8; 4] {
    let outside = pos + dir.offset();
    let axis = dir.axis().index();
    let tangents: Vec<usize> = (0..3).filter(|&a| a != axis).collect();

    dir.face_corners().map(|corner| {
        let corner = corner.to_array();
        let mut steps = [IVec3::ZERO; 2];
        for (step, &t) in steps.iter_mut().zip(&tangents) {
            let mut v = [0; 3];
            v[t] = if corner[t] == 1 { 1 } else { -1 };
            *step = IVec3::from_array(v);
        }
        let side1 = volume.is_solid(outside + steps[0]) as u8;
        let side2 = volume.is_solid(outside + steps[1]) as u8;
        let diagonal = volume.is_solid(outside + steps[0] + steps[1]) as u8;
        vertex_ao(side1, side2, diagonal)
    })
}

/// Calculate vertex AO value from neighbor occupancy.
fn vertex_ao(side1: u8, side2: u8, corner: u8) -> u8 {
    if side1 == 1 && side2 == 1 {
        0
    } else {
        3 - (side1 + side2 + corner)
    }
}
