// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{TestRun, TestRunId};
use crate::{
    config::GridLayout,
    errors::PlacementError,
    geometry::{BlockPos, BoundingBox},
    world::World,
};
use std::mem;
use tracing::debug;

/// Decides where test structures are placed.
pub trait StructureSpawner {
    /// Called once at the start of every batch, before any run in it is placed.
    fn on_batch_start(&mut self, world: &mut dyn World) {
        let _ = world;
    }

    /// Places the structure for `run`, through [`TestRun::prepare_structure`], and returns its
    /// footprint.
    fn spawn(
        &mut self,
        run: &mut TestRun,
        world: &mut dyn World,
    ) -> Result<BoundingBox, PlacementError>;
}

/// Lays structures out in rows along x, so that no two structures overlap.
///
/// A new row starts after [`GridLayout::tests_per_row`] structures, regardless of how wide they
/// are.
#[derive(Clone, Debug)]
pub struct GridSpawner {
    layout: GridLayout,
    next_corner: BlockPos,
    row_bounds: BoundingBox,
    row_count: u32,
    max_x: i32,
    placed: Vec<(TestRunId, BoundingBox)>,
}

impl GridSpawner {
    /// Creates a spawner with the given layout.
    pub fn new(layout: GridLayout) -> Self {
        Self {
            layout,
            next_corner: layout.origin,
            row_bounds: BoundingBox::at(layout.origin),
            row_count: 0,
            max_x: layout.origin.x,
            placed: Vec::new(),
        }
    }

    /// Returns the layout this spawner was created with.
    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Returns the corner the next structure will be placed at.
    pub fn next_corner(&self) -> BlockPos {
        self.next_corner
    }

    /// Returns the bounds of every structure in the current row.
    pub fn row_bounds(&self) -> BoundingBox {
        self.row_bounds
    }

    /// Returns the largest x any placement has reached.
    pub fn max_x(&self) -> i32 {
        self.max_x
    }

    /// Returns the runs placed in the current batch, with their footprints.
    pub fn placed(&self) -> &[(TestRunId, BoundingBox)] {
        &self.placed
    }

    fn advance(&mut self, footprint: &BoundingBox) {
        self.row_bounds = self.row_bounds.encapsulate(footprint);
        self.next_corner = self
            .next_corner
            .offset(footprint.x_size() + self.layout.spacing_x, 0, 0);
        self.max_x = self.max_x.max(self.next_corner.x);

        self.row_count += 1;
        if self.row_count >= self.layout.tests_per_row.get() {
            self.next_corner = BlockPos::new(
                self.layout.origin.x,
                self.next_corner.y,
                self.next_corner.z + self.row_bounds.z_size() + self.layout.spacing_z,
            );
            self.row_bounds = BoundingBox::at(self.next_corner);
            self.row_count = 0;
        }
    }

    fn reset(&mut self) {
        self.next_corner = self.layout.origin;
        self.row_bounds = BoundingBox::at(self.layout.origin);
        self.row_count = 0;
    }
}

impl StructureSpawner for GridSpawner {
    fn on_batch_start(&mut self, world: &mut dyn World) {
        let previous = mem::take(&mut self.placed);
        if !self.layout.clear_before_each_batch {
            return;
        }
        for (_, bounds) in previous {
            world.clear_region(&bounds);
        }
        self.reset();
    }

    fn spawn(
        &mut self,
        run: &mut TestRun,
        world: &mut dyn World,
    ) -> Result<BoundingBox, PlacementError> {
        let corner = self.next_corner;
        let footprint = run.prepare_structure(world, corner)?;
        debug!(
            test_name = run.test_name(),
            %corner,
            %footprint,
            "placed structure on grid"
        );
        self.advance(&footprint);
        self.placed.push((run.id(), footprint));
        Ok(footprint)
    }
}

/// Places a run at the origin it was created with, which must already hold its structure.
///
/// Used to rerun tests found in the world.
#[derive(Clone, Copy, Debug, Default)]
pub struct InPlaceSpawner;

impl StructureSpawner for InPlaceSpawner {
    fn spawn(
        &mut self,
        run: &mut TestRun,
        world: &mut dyn World,
    ) -> Result<BoundingBox, PlacementError> {
        let origin = run.origin().ok_or(PlacementError::NoPlacementAvailable)?;
        if world.structure_at(origin).is_none() {
            return Err(PlacementError::StructureNotFound { origin });
        }
        run.prepare_structure(world, origin)
    }
}

/// Never places anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSpawner;

impl StructureSpawner for NoSpawner {
    fn spawn(
        &mut self,
        _run: &mut TestRun,
        _world: &mut dyn World,
    ) -> Result<BoundingBox, PlacementError> {
        Err(PlacementError::NoPlacementAvailable)
    }
}
