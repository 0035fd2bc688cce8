// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::geometry::BlockPos;
use serde::Deserialize;
use std::num::NonZeroU32;

/// Where newly placed test structures go: rows along x, starting at `origin`.
///
/// This is the type of the `grid` config key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct GridLayout {
    /// The minimum corner of the first structure.
    pub origin: BlockPos,

    /// The number of structures placed in a row before starting a new row.
    pub tests_per_row: NonZeroU32,

    /// The gap along x between neighboring structures in a row.
    pub spacing_x: i32,

    /// The gap along z between rows.
    pub spacing_z: i32,

    /// Whether to clear every structure from the previous batch before placing a new batch.
    pub clear_before_each_batch: bool,
}

impl GridLayout {
    /// The default number of structures per row.
    pub const DEFAULT_TESTS_PER_ROW: NonZeroU32 = NonZeroU32::new(8).expect("8 is non-zero");

    /// Creates a layout starting at `origin` with the default row length and spacing.
    pub fn new(origin: BlockPos) -> Self {
        Self {
            origin,
            tests_per_row: Self::DEFAULT_TESTS_PER_ROW,
            spacing_x: 5,
            spacing_z: 6,
            clear_before_each_batch: true,
        }
    }

    /// Sets the number of structures per row.
    pub fn with_tests_per_row(mut self, tests_per_row: NonZeroU32) -> Self {
        self.tests_per_row = tests_per_row;
        self
    }

    /// Sets whether the previous batch's structures are cleared before each batch.
    pub fn with_clear_before_each_batch(mut self, clear: bool) -> Self {
        self.clear_before_each_batch = clear;
        self
    }
}

impl Default for GridLayout {
    fn default() -> Self {
        Self::new(BlockPos::ZERO)
    }
}

/// A partial grid layout from a custom profile. Missing keys fall back to the default profile.
#[derive(Copy, Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub(super) struct CustomGridImpl {
    #[serde(default)]
    origin: Option<BlockPos>,
    #[serde(default)]
    tests_per_row: Option<NonZeroU32>,
    #[serde(default)]
    spacing_x: Option<i32>,
    #[serde(default)]
    spacing_z: Option<i32>,
    #[serde(default)]
    clear_before_each_batch: Option<bool>,
}

impl CustomGridImpl {
    pub(super) fn apply_to(&self, default: GridLayout) -> GridLayout {
        GridLayout {
            origin: self.origin.unwrap_or(default.origin),
            tests_per_row: self.tests_per_row.unwrap_or(default.tests_per_row),
            spacing_x: self.spacing_x.unwrap_or(default.spacing_x),
            spacing_z: self.spacing_z.unwrap_or(default.spacing_z),
            clear_before_each_batch: self
                .clear_before_each_batch
                .unwrap_or(default.clear_before_each_batch),
        }
    }
}
