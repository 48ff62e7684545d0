//! Conversion between the Z-up file space and the Y-up scene space.
//!
//! GOX files are authored Z-up; the scene graph is Y-up. The mapping is a
//! rotation of -90 degrees about X:
//!
//! | value            | file `(x, y, z)` | scene            |
//! |------------------|------------------|------------------|
//! | position         | `(x, y, z)`      | `(x, z, -y)`     |
//! | voxel cell       | `(x, y, z)`      | `(x, z, -y - 1)` |
//! | quaternion       | `(w, x, y, z)`   | `(w, x, z, -y)`  |
//! | normalised pivot | `(x, y, z)`      | `(x, z, 1 - y)`  |
//!
//! Cells use `-y - 1` instead of `-y` so that the cell `[y, y + 1)` lands on
//! `[-y - 1, -y)`, which keeps the mapping a bijection on integer cells.

use glam::{IVec3, Quat, Vec3};

/// File-space position to scene space.
pub fn position_to_scene(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.z, -v.y)
}

/// Scene-space position to file space.
pub fn position_to_file(v: Vec3) -> Vec3 {
    Vec3::new(v.x, -v.z, v.y)
}

/// File-space voxel cell to scene space.
pub fn cell_to_scene(c: IVec3) -> IVec3 {
    IVec3::new(c.x, c.z, -c.y - 1)
}

/// Scene-space voxel cell to file space.
pub fn cell_to_file(c: IVec3) -> IVec3 {
    IVec3::new(c.x, -c.z - 1, c.y)
}

/// File-space rotation to scene space.
pub fn rotation_to_scene(q: Quat) -> Quat {
    Quat::from_xyzw(q.x, q.z, -q.y, q.w)
}

/// Scene-space rotation to file space.
pub fn rotation_to_file(q: Quat) -> Quat {
    Quat::from_xyzw(q.x, -q.z, q.y, q.w)
}

/// File-space normalised pivot to scene space.
pub fn pivot_to_scene(p: Vec3) -> Vec3 {
    Vec3::new(p.x, p.z, 1.0 - p.y)
}

/// Scene-space normalised pivot to file space.
pub fn pivot_to_file(p: Vec3) -> Vec3 {
    Vec3::new(p.x, 1.0 - p.z, p.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_mapping() {
        let file = Vec3::new(1.0, 2.0, 3.0);
        let scene = position_to_scene(file);
        assert_eq!(scene, Vec3::new(1.0, 3.0, -2.0));
        assert_eq!(position_to_file(scene), file);
    }

    #[test]
    fn test_file_up_becomes_scene_up() {
        assert_eq!(position_to_scene(Vec3::Z), Vec3::Y);
    }

    #[test]
    fn test_cell_mapping_is_bijective() {
        for x in -2..2 {
            for y in -17..17 {
                for z in -2..2 {
                    let c = IVec3::new(x, y, z);
                    assert_eq!(cell_to_file(cell_to_scene(c)), c);
                    assert_eq!(cell_to_scene(cell_to_file(c)), c);
                }
            }
        }
        // A file block spanning y in [0, 16) lands on z in [-16, 0).
        assert_eq!(cell_to_scene(IVec3::new(0, 0, 0)).z, -1);
        assert_eq!(cell_to_scene(IVec3::new(0, 15, 0)).z, -16);
    }

    #[test]
    fn test_rotation_matches_position_mapping() {
        let q = Quat::from_axis_angle(Vec3::new(1.0, 2.0, 3.0).normalize(), 0.7);
        let v = Vec3::new(0.3, -1.2, 2.5);

        // Rotating in file space then converting equals converting then rotating.
        let a = position_to_scene(q * v);
        let b = rotation_to_scene(q) * position_to_scene(v);
        assert!(a.abs_diff_eq(b, 1e-5), "{a:?} vs {b:?}");

        let back = rotation_to_file(rotation_to_scene(q));
        assert!(back.abs_diff_eq(q, 1e-6));
    }

    #[test]
    fn test_pivot_mapping() {
        let p = Vec3::new(0.25, 0.0, 0.75);
        let scene = pivot_to_scene(p);
        assert_eq!(scene, Vec3::new(0.25, 0.75, 1.0));
        assert_eq!(pivot_to_file(scene), p);
    }
}
