//! Shared types used throughout the library.

pub mod axis;
mod direction;

pub use direction::{Axis, Direction};

use glam::IVec3;

/// An inclusive, axis-aligned box of voxel cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub lower: IVec3,
    pub upper: IVec3,
}

impl Region {
    /// Create a region from its inclusive corners.
    ///
    /// The corners are normalised so that `lower <= upper` on every axis.
    pub fn new(a: IVec3, b: IVec3) -> Self {
        Self {
            lower: a.min(b),
            upper: a.max(b),
        }
    }

    /// A region covering exactly one cell.
    pub fn cell(pos: IVec3) -> Self {
        Self {
            lower: pos,
            upper: pos,
        }
    }

    /// Build the smallest region that contains every given cell.
    pub fn from_cells(cells: impl IntoIterator<Item = IVec3>) -> Option<Self> {
        let mut cells = cells.into_iter();
        let first = cells.next()?;
        let mut region = Self::cell(first);
        for cell in cells {
            region.accumulate(cell);
        }
        Some(region)
    }

    /// Number of cells along each axis.
    pub fn dimensions(&self) -> IVec3 {
        self.upper - self.lower + IVec3::ONE
    }

    /// Total number of cells.
    pub fn voxel_count(&self) -> usize {
        let d = self.dimensions();
        d.x as usize * d.y as usize * d.z as usize
    }

    /// Total number of cells, or `None` when it does not fit in a `u64`.
    ///
    /// Safe for regions whose extent overflows `i32`.
    pub fn checked_voxel_count(&self) -> Option<u64> {
        let extent = |lo: i32, hi: i32| (hi as i64 - lo as i64 + 1) as u64;
        extent(self.lower.x, self.upper.x)
            .checked_mul(extent(self.lower.y, self.upper.y))?
            .checked_mul(extent(self.lower.z, self.upper.z))
    }

    pub fn contains(&self, pos: IVec3) -> bool {
        pos.cmpge(self.lower).all() && pos.cmple(self.upper).all()
    }

    /// Grow the region so it includes `pos`.
    pub fn accumulate(&mut self, pos: IVec3) {
        self.lower = self.lower.min(pos);
        self.upper = self.upper.max(pos);
    }

    /// Grow the region so it includes `other`.
    pub fn union(&self, other: &Region) -> Region {
        Region {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    /// Center of the region in continuous space (cell `c` spans `[c, c + 1)`).
    pub fn center(&self) -> glam::Vec3 {
        (self.lower.as_vec3() + (self.upper + IVec3::ONE).as_vec3()) * 0.5
    }

    /// Iterate all cells, x fastest, then y, then z.
    pub fn cells(&self) -> impl Iterator<Item = IVec3> + '_ {
        let (lo, hi) = (self.lower, self.upper);
        (lo.z..=hi.z).flat_map(move |z| {
            (lo.y..=hi.y).flat_map(move |y| (lo.x..=hi.x).map(move |x| IVec3::new(x, y, z)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_normalises_corners() {
        let region = Region::new(IVec3::new(3, -1, 5), IVec3::new(0, 2, 1));
        assert_eq!(region.lower, IVec3::new(0, -1, 1));
        assert_eq!(region.upper, IVec3::new(3, 2, 5));
        assert_eq!(region.dimensions(), IVec3::new(4, 4, 5));
        assert_eq!(region.voxel_count(), 80);
        assert_eq!(region.checked_voxel_count(), Some(80));
    }

    #[test]
    fn test_checked_voxel_count_handles_huge_regions() {
        let wide = Region::new(IVec3::new(i32::MIN, 0, 0), IVec3::new(i32::MAX, 0, 0));
        assert_eq!(wide.checked_voxel_count(), Some(1 << 32));

        let full = Region::new(IVec3::splat(i32::MIN), IVec3::splat(i32::MAX));
        assert_eq!(full.checked_voxel_count(), None);
    }

    #[test]
    fn test_region_from_cells() {
        assert!(Region::from_cells(std::iter::empty()).is_none());

        let region = Region::from_cells([
            IVec3::new(1, 1, 1),
            IVec3::new(-2, 4, 0),
            IVec3::new(0, 0, 9),
        ])
        .unwrap();
        assert_eq!(region.lower, IVec3::new(-2, 0, 0));
        assert_eq!(region.upper, IVec3::new(1, 4, 9));
        assert!(region.contains(IVec3::new(0, 2, 3)));
        assert!(!region.contains(IVec3::new(2, 2, 3)));
    }

    #[test]
    fn test_region_cells_order() {
        let region = Region::new(IVec3::ZERO, IVec3::new(1, 1, 0));
        let cells: Vec<_> = region.cells().collect();
        assert_eq!(
            cells,
            vec![
                IVec3::new(0, 0, 0),
                IVec3::new(1, 0, 0),
                IVec3::new(0, 1, 0),
                IVec3::new(1, 1, 0),
            ]
        );
    }

    #[test]
    fn test_region_center() {
        let region = Region::new(IVec3::ZERO, IVec3::new(15, 15, 15));
        assert_eq!(region.center(), glam::Vec3::splat(8.0));
    }
}
