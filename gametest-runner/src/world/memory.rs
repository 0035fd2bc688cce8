// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Marker, PlacedStructure, StructurePlacement, World};
use crate::{
    errors::PlacementError,
    geometry::{BlockPos, BoundingBox, ChunkPos},
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// A structure template: a size and the blocks inside it, relative to its minimum corner.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StructureTemplate {
    size: BlockPos,
    blocks: BTreeMap<BlockPos, String>,
}

impl StructureTemplate {
    /// Creates an empty template of the given size.
    pub fn new(size: BlockPos) -> Self {
        Self {
            size,
            blocks: BTreeMap::new(),
        }
    }

    /// Adds a block at a position relative to the template's minimum corner.
    pub fn with_block(mut self, pos: BlockPos, block: impl Into<String>) -> Self {
        self.blocks.insert(pos, block.into());
        self
    }

    /// Returns the unrotated size of the template.
    pub fn size(&self) -> BlockPos {
        self.size
    }
}

/// A [`World`] held entirely in memory.
///
/// Structures are loaded from templates registered with [`add_template`](Self::add_template).
/// The tick only advances when [`advance_tick`](Self::advance_tick) is called.
#[derive(Clone, Debug, Default)]
pub struct MemoryWorld {
    tick: u64,
    templates: HashMap<String, StructureTemplate>,
    blocks: BTreeMap<BlockPos, String>,
    structures: Vec<PlacedStructure>,
    forced_chunks: BTreeSet<ChunkPos>,
    markers: BTreeMap<BlockPos, Marker>,
    cleared: Vec<BoundingBox>,
}

impl MemoryWorld {
    /// Creates an empty world at tick 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a template under `name`, replacing any previous template with that name.
    pub fn add_template(&mut self, name: impl Into<String>, template: StructureTemplate) -> &mut Self {
        self.templates.insert(name.into(), template);
        self
    }

    /// Advances the world by one tick.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
    }

    /// Returns the chunks currently forced to stay loaded.
    pub fn forced_chunks(&self) -> &BTreeSet<ChunkPos> {
        &self.forced_chunks
    }

    /// Returns the marker rendered at `origin`, if any.
    pub fn marker_at(&self, origin: BlockPos) -> Option<Marker> {
        self.markers.get(&origin).copied()
    }

    /// Returns every region cleared so far, in order.
    pub fn cleared_regions(&self) -> &[BoundingBox] {
        &self.cleared
    }
}

impl World for MemoryWorld {
    fn current_tick(&self) -> u64 {
        self.tick
    }

    fn place_structure(
        &mut self,
        placement: StructurePlacement<'_>,
    ) -> Result<BoundingBox, PlacementError> {
        let template = self.templates.get(placement.template).ok_or_else(|| {
            PlacementError::MissingTemplate {
                template: placement.template.to_owned(),
            }
        })?;

        let footprint = placement.rotation.rotate_size(template.size);
        let bounds = BoundingBox::from_corner_and_size(placement.origin, footprint);
        let blocks: Vec<_> = template
            .blocks
            .iter()
            .map(|(rel, block)| {
                let pos = placement.origin + placement.rotation.rotate_within(*rel, footprint);
                (pos, block.clone())
            })
            .collect();

        self.blocks.retain(|pos, _| !bounds.contains(*pos));
        self.structures
            .retain(|structure| structure.origin != placement.origin);
        self.blocks.extend(blocks);
        self.structures.push(PlacedStructure {
            test_name: placement.test_name.to_owned(),
            origin: placement.origin,
            rotation: placement.rotation,
            bounds,
        });

        debug!(
            test_name = placement.test_name,
            template = placement.template,
            origin = %placement.origin,
            %bounds,
            "placed structure"
        );
        Ok(bounds)
    }

    fn clear_region(&mut self, bounds: &BoundingBox) {
        self.blocks.retain(|pos, _| !bounds.contains(*pos));
        self.markers.retain(|pos, _| !bounds.contains(*pos));
        self.structures
            .retain(|structure| !bounds.contains(structure.origin));
        self.cleared.push(*bounds);
    }

    fn set_chunks_forced(&mut self, bounds: &BoundingBox, forced: bool) {
        for chunk in bounds.chunks() {
            if forced {
                self.forced_chunks.insert(chunk);
            } else {
                self.forced_chunks.remove(&chunk);
            }
        }
    }

    fn release_forced_chunks(&mut self) {
        self.forced_chunks.clear();
    }

    fn block_at(&self, pos: BlockPos) -> Option<&str> {
        self.blocks.get(&pos).map(String::as_str)
    }

    fn set_block(&mut self, pos: BlockPos, block: &str) {
        self.blocks.insert(pos, block.to_owned());
    }

    fn remove_block(&mut self, pos: BlockPos) {
        self.blocks.remove(&pos);
    }

    fn place_marker(&mut self, origin: BlockPos, marker: Marker) {
        self.markers.insert(origin, marker);
    }

    fn structures(&self) -> Vec<PlacedStructure> {
        self.structures.clone()
    }
}
