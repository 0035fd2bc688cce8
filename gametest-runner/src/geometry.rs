// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integer world-space geometry: block positions, bounding boxes, chunks and rotations.

use serde::{Deserialize, Serialize};
use std::{
    fmt,
    ops::{Add, Sub},
};

/// A block position in world space (or relative to a test's origin).
///
/// Serialized as an `[x, y, z]` array.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(from = "[i32; 3]", into = "[i32; 3]")]
pub struct BlockPos {
    /// The east-west coordinate.
    pub x: i32,
    /// The vertical coordinate.
    pub y: i32,
    /// The north-south coordinate.
    pub z: i32,
}

impl BlockPos {
    /// The position `0, 0, 0`.
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Creates a new position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns this position moved by the given deltas.
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Returns the squared euclidean distance between two positions.
    pub fn distance_squared(self, other: Self) -> i64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);
        let dz = i64::from(self.z) - i64::from(other.z);
        dx * dx + dy * dy + dz * dz
    }

    /// Returns the chunk containing this position.
    pub fn chunk(self) -> ChunkPos {
        ChunkPos::new(self.x >> 4, self.z >> 4)
    }
}

impl Add for BlockPos {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for BlockPos {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl From<[i32; 3]> for BlockPos {
    fn from([x, y, z]: [i32; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl From<BlockPos> for [i32; 3] {
    fn from(pos: BlockPos) -> Self {
        [pos.x, pos.y, pos.z]
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.x, self.y, self.z)
    }
}

/// A 16x16 column of the world, addressed by its chunk coordinates.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ChunkPos {
    /// The chunk's x coordinate (block x divided by 16).
    pub x: i32,
    /// The chunk's z coordinate (block z divided by 16).
    pub z: i32,
}

impl ChunkPos {
    /// Creates a new chunk position.
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// An axis-aligned box of blocks.
///
/// `min` is inclusive and `max` is exclusive, so a structure of size 3 placed at x = 0 covers
/// `0..3` and has an x size of 3. A box where `min == max` has zero volume and is used as the
/// seed for accumulating bounds.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct BoundingBox {
    min: BlockPos,
    max: BlockPos,
}

impl BoundingBox {
    /// Creates a box spanning two corners, in any order.
    pub fn new(a: BlockPos, b: BlockPos) -> Self {
        Self {
            min: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Creates a zero-volume box at the given position.
    pub const fn at(pos: BlockPos) -> Self {
        Self { min: pos, max: pos }
    }

    /// Creates a box with `corner` as its minimum corner and the given size.
    pub fn from_corner_and_size(corner: BlockPos, size: BlockPos) -> Self {
        Self::new(corner, corner + size)
    }

    /// Returns the minimum (inclusive) corner.
    pub fn min(&self) -> BlockPos {
        self.min
    }

    /// Returns the maximum (exclusive) corner.
    pub fn max(&self) -> BlockPos {
        self.max
    }

    /// Returns the size of the box along each axis.
    pub fn size(&self) -> BlockPos {
        self.max - self.min
    }

    /// Returns the size of the box along the x axis.
    pub fn x_size(&self) -> i32 {
        self.max.x - self.min.x
    }

    /// Returns the size of the box along the y axis.
    pub fn y_size(&self) -> i32 {
        self.max.y - self.min.y
    }

    /// Returns the size of the box along the z axis.
    pub fn z_size(&self) -> i32 {
        self.max.z - self.min.z
    }

    /// Returns the smallest box containing both `self` and `other`.
    pub fn encapsulate(&self, other: &Self) -> Self {
        Self {
            min: BlockPos::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: BlockPos::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// Returns true if the two boxes share any volume.
    ///
    /// Boxes that only touch along a face do not intersect.
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
            && self.min.z < other.max.z
            && other.min.z < self.max.z
    }

    /// Returns true if the position lies inside the box.
    pub fn contains(&self, pos: BlockPos) -> bool {
        (self.min.x..self.max.x).contains(&pos.x)
            && (self.min.y..self.max.y).contains(&pos.y)
            && (self.min.z..self.max.z).contains(&pos.z)
    }

    /// Returns every chunk the box touches.
    ///
    /// A zero-volume box touches the chunk containing its corner.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkPos> + use<> {
        let min = self.min.chunk();
        let max_x = (self.max.x - 1).max(self.min.x) >> 4;
        let max_z = (self.max.z - 1).max(self.min.z) >> 4;
        (min.x..=max_x).flat_map(move |x| (min.z..=max_z).map(move |z| ChunkPos::new(x, z)))
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] -> [{}]", self.min, self.max)
    }
}

/// The orientation a structure is placed in, as a clockwise rotation about the vertical axis.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rotation {
    /// No rotation.
    #[default]
    None,

    /// 90 degrees clockwise.
    Clockwise90,

    /// 180 degrees.
    Clockwise180,

    /// 270 degrees clockwise (90 degrees counter-clockwise).
    CounterClockwise90,
}

impl Rotation {
    /// Returns the rotation for the given number of degrees, if it is a multiple of 90.
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Self::None),
            90 => Some(Self::Clockwise90),
            180 => Some(Self::Clockwise180),
            270 => Some(Self::CounterClockwise90),
            _ => None,
        }
    }

    /// Returns the clockwise angle of this rotation in degrees.
    pub fn degrees(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Clockwise90 => 90,
            Self::Clockwise180 => 180,
            Self::CounterClockwise90 => 270,
        }
    }

    /// Returns true if this rotation swaps the x and z axes.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Clockwise90 | Self::CounterClockwise90)
    }

    /// Returns the footprint size of an unrotated structure of size `size` after rotation.
    pub fn rotate_size(self, size: BlockPos) -> BlockPos {
        if self.swaps_axes() {
            BlockPos::new(size.z, size.y, size.x)
        } else {
            size
        }
    }

    /// Maps a position inside an unrotated structure to the same block inside the rotated
    /// structure, both relative to their minimum corner.
    ///
    /// `footprint` is the size of the rotated structure, as returned by
    /// [`rotate_size`](Self::rotate_size).
    pub fn rotate_within(self, pos: BlockPos, footprint: BlockPos) -> BlockPos {
        match self {
            Self::None => pos,
            Self::Clockwise90 => BlockPos::new(footprint.x - 1 - pos.z, pos.y, pos.x),
            Self::Clockwise180 => {
                BlockPos::new(footprint.x - 1 - pos.x, pos.y, footprint.z - 1 - pos.z)
            }
            Self::CounterClockwise90 => BlockPos::new(pos.z, pos.y, footprint.z - 1 - pos.x),
        }
    }

    /// The inverse of [`rotate_within`](Self::rotate_within).
    pub fn unrotate_within(self, pos: BlockPos, footprint: BlockPos) -> BlockPos {
        match self {
            Self::None => pos,
            Self::Clockwise90 => BlockPos::new(pos.z, pos.y, footprint.x - 1 - pos.x),
            Self::Clockwise180 => {
                BlockPos::new(footprint.x - 1 - pos.x, pos.y, footprint.z - 1 - pos.z)
            }
            Self::CounterClockwise90 => BlockPos::new(footprint.z - 1 - pos.z, pos.y, pos.x),
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}
