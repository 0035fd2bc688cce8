// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The host world that tests run inside.
//!
//! The scheduler never simulates anything itself. It asks a [`World`] to materialize test
//! structures, to keep their chunks loaded while a batch runs, and to clear them afterwards. Test
//! bodies read and write blocks through the same trait.
//!
//! [`MemoryWorld`] is a self-contained implementation backed by in-memory maps, suitable for
//! embedding and for tests.

mod memory;

pub use memory::*;

use crate::{
    errors::PlacementError,
    geometry::{BlockPos, BoundingBox, Rotation},
};

/// A request to materialize a test's structure.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StructurePlacement<'a> {
    /// The name of the test the structure belongs to. The world records this on the structure so
    /// that it can later be found again by position.
    pub test_name: &'a str,

    /// The template to load.
    pub template: &'a str,

    /// The minimum (north-west, bottom) corner of the structure.
    pub origin: BlockPos,

    /// The orientation of the structure.
    pub rotation: Rotation,
}

/// A test structure that currently exists in the world.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlacedStructure {
    /// The test the structure was placed for.
    pub test_name: String,

    /// The structure's origin.
    pub origin: BlockPos,

    /// The structure's orientation.
    pub rotation: Rotation,

    /// The structure's footprint.
    pub bounds: BoundingBox,
}

/// A visible status marker rendered at a test's origin.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Marker {
    /// The test is running.
    InProgress,

    /// The test passed.
    Passed,

    /// A required test failed.
    FailedRequired,

    /// An optional test failed.
    FailedOptional,
}

/// The host environment driven by the scheduler.
pub trait World {
    /// Returns the host's current tick.
    fn current_tick(&self) -> u64;

    /// Loads a template at the given origin and returns its footprint.
    fn place_structure(
        &mut self,
        placement: StructurePlacement<'_>,
    ) -> Result<BoundingBox, PlacementError>;

    /// Removes every block and structure inside `bounds`.
    fn clear_region(&mut self, bounds: &BoundingBox);

    /// Forces (or stops forcing) every chunk touched by `bounds` to stay loaded.
    fn set_chunks_forced(&mut self, bounds: &BoundingBox, forced: bool);

    /// Stops forcing every chunk, regardless of which batch forced it.
    fn release_forced_chunks(&mut self);

    /// Returns the block at a world-space position, if any.
    fn block_at(&self, pos: BlockPos) -> Option<&str>;

    /// Sets the block at a world-space position.
    fn set_block(&mut self, pos: BlockPos, block: &str);

    /// Removes the block at a world-space position.
    fn remove_block(&mut self, pos: BlockPos);

    /// Renders a status marker for the test at `origin`.
    fn place_marker(&mut self, origin: BlockPos, marker: Marker);

    /// Returns every test structure currently in the world.
    fn structures(&self) -> Vec<PlacedStructure>;

    /// Returns the test structure whose origin is exactly `origin`.
    fn structure_at(&self, origin: BlockPos) -> Option<PlacedStructure> {
        self.structures()
            .into_iter()
            .find(|structure| structure.origin == origin)
    }
}
