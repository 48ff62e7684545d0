//! Face directions of a voxel cell.

use glam::IVec3;
use serde::{Deserialize, Serialize};

/// A coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Component index (0, 1, 2).
    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// The six faces of a voxel cell, Y-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Down,
    Up,
    North,
    South,
    West,
    East,
}

impl Direction {
    /// All six directions in order.
    pub const ALL: [Direction; 6] = [
        Direction::Down,
        Direction::Up,
        Direction::North,
        Direction::South,
        Direction::West,
        Direction::East,
    ];

    /// Offset to the neighbouring cell across this face.
    pub fn offset(&self) -> IVec3 {
        match self {
            Direction::Down => IVec3::new(0, -1, 0),
            Direction::Up => IVec3::new(0, 1, 0),
            Direction::North => IVec3::new(0, 0, -1),
            Direction::South => IVec3::new(0, 0, 1),
            Direction::West => IVec3::new(-1, 0, 0),
            Direction::East => IVec3::new(1, 0, 0),
        }
    }

    /// Get the normal vector for this direction.
    pub fn normal(&self) -> [f32; 3] {
        self.offset().as_vec3().to_array()
    }

    /// Get the axis this face is perpendicular to.
    pub fn axis(&self) -> Axis {
        match self {
            Direction::Down | Direction::Up => Axis::Y,
            Direction::North | Direction::South => Axis::Z,
            Direction::West | Direction::East => Axis::X,
        }
    }

    /// Whether the face points along the positive axis.
    pub fn is_positive(&self) -> bool {
        matches!(self, Direction::Up | Direction::South | Direction::East)
    }

    /// Get the opposite direction.
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Down => Direction::Up,
            Direction::Up => Direction::Down,
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::East => Direction::West,
        }
    }

    /// Corners of the unit face for a cell at the origin, counter-clockwise
    /// when viewed from outside the cell.
    pub fn face_corners(&self) -> [IVec3; 4] {
        let c = |x, y, z| IVec3::new(x, y, z);
        match self {
            Direction::Down => [c(0, 0, 0), c(1, 0, 0), c(1, 0, 1), c(0, 0, 1)],
            Direction::Up => [c(0, 1, 0), c(0, 1, 1), c(1, 1, 1), c(1, 1, 0)],
            Direction::North => [c(0, 0, 0), c(0, 1, 0), c(1, 1, 0), c(1, 0, 0)],
            Direction::South => [c(0, 0, 1), c(1, 0, 1), c(1, 1, 1), c(0, 1, 1)],
            Direction::West => [c(0, 0, 0), c(0, 0, 1), c(0, 1, 1), c(0, 1, 0)],
            Direction::East => [c(1, 0, 0), c(1, 1, 0), c(1, 1, 1), c(1, 0, 1)],
        }
    }
}
