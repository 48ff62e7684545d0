//! Dense voxel storage over a fixed region.

use crate::types::Region;
use glam::IVec3;

/// A solid voxel referencing a palette entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Voxel {
    pub color: u8,
}

impl Voxel {
    pub fn new(color: u8) -> Self {
        Self { color }
    }
}

/// Read access to voxel data (lets extractors run over foreign storage).
pub trait VoxelAccess {
    /// Bounds of the stored cells.
    fn region(&self) -> Region;

    /// The voxel at `pos`, or `None` for empty cells and cells outside the region.
    fn voxel(&self, pos: IVec3) -> Option<Voxel>;

    /// Whether the cell at `pos` holds a voxel.
    fn is_solid(&self, pos: IVec3) -> bool {
        self.voxel(pos).is_some()
    }
}

/// A dense voxel grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawVolume {
    region: Region,
    cells: Vec<Option<Voxel>>,
}

impl RawVolume {
    /// Create an empty volume covering `region`.
    pub fn new(region: Region) -> Self {
        Self {
            region,
            cells: vec![None; region.voxel_count()],
        }
    }

    fn cell_index(&self, pos: IVec3) -> Option<usize> {
        if !self.region.contains(pos) {
            return None;
        }
        let d = self.region.dimensions();
        let p = pos - self.region.lower;
        Some((p.x + p.y * d.x + p.z * d.x * d.y) as usize)
    }

    /// Store or clear a voxel. Returns `false` when `pos` lies outside the region.
    pub fn set_voxel(&mut self, pos: IVec3, voxel: Option<Voxel>) -> bool {
        match self.cell_index(pos) {
            Some(i) => {
                self.cells[i] = voxel;
                true
            }
            None => false,
        }
    }

    /// Iterate solid voxels with their positions, x fastest.
    pub fn iter(&self) -> impl Iterator<Item = (IVec3, Voxel)> + '_ {
        self.region
            .cells()
            .zip(self.cells.iter())
            .filter_map(|(pos, v)| v.map(|v| (pos, v)))
    }

    /// Number of solid voxels.
    pub fn solid_count(&self) -> usize {
        self.cells.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|v| v.is_none())
    }

    /// Tight bounds of the solid voxels, if any.
    pub fn solid_region(&self) -> Option<Region> {
        Region::from_cells(self.iter().map(|(pos, _)| pos))
    }
}

impl VoxelAccess for RawVolume {
    fn region(&self) -> Region {
        self.region
    }

    fn voxel(&self, pos: IVec3) -> Option<Voxel> {
        self.cell_index(pos).and_then(|i| self.cells[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut volume = RawVolume::new(Region::new(IVec3::splat(-2), IVec3::splat(2)));
        assert!(volume.is_empty());

        assert!(volume.set_voxel(IVec3::new(-2, 0, 2), Some(Voxel::new(7))));
        assert!(!volume.set_voxel(IVec3::new(3, 0, 0), Some(Voxel::new(1))));

        assert_eq!(volume.voxel(IVec3::new(-2, 0, 2)), Some(Voxel::new(7)));
        assert_eq!(volume.voxel(IVec3::new(0, 0, 0)), None);
        assert_eq!(volume.voxel(IVec3::new(9, 9, 9)), None);
        assert!(volume.is_solid(IVec3::new(-2, 0, 2)));
        assert_eq!(volume.solid_count(), 1);
    }

    #[test]
    fn test_iter_and_solid_region() {
        let mut volume = RawVolume::new(Region::new(IVec3::ZERO, IVec3::splat(7)));
        volume.set_voxel(IVec3::new(1, 2, 3), Some(Voxel::new(1)));
        volume.set_voxel(IVec3::new(4, 0, 5), Some(Voxel::new(2)));

        let solid: Vec<_> = volume.iter().collect();
        assert_eq!(solid.len(), 2);
        assert!(solid.contains(&(IVec3::new(4, 0, 5), Voxel::new(2))));

        let bounds = volume.solid_region().unwrap();
        assert_eq!(bounds.lower, IVec3::new(1, 0, 3));
        assert_eq!(bounds.upper, IVec3::new(4, 2, 5));

        volume.set_voxel(IVec3::new(1, 2, 3), None);
        volume.set_voxel(IVec3::new(4, 0, 5), None);
        assert!(volume.solid_region().is_none());
    }
}
