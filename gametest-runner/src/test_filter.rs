// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Selecting tests based on user-specified criteria.
//!
//! A [`TestSelector`] picks test cases out of a [`TestRegistry`]; a [`PosSelector`] picks test
//! structures that already exist in the world, so that they can be run again in place. Both are
//! resolved by a [`TestFinder`], which never changes scheduler or tracker state.

use crate::{
    errors::{FindTestsError, SelectorParseError},
    geometry::BlockPos,
    list::{TestCase, TestRegistry},
    runner::RunSpec,
    world::{PlacedStructure, World},
};
use itertools::Itertools;
use std::{fmt, iter, num::NonZeroUsize, str::FromStr, sync::Arc};
use tracing::debug;

/// Selects test cases from a registry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TestSelector {
    /// Every registered test that isn't manual-only.
    All,

    /// The test with this exact name.
    Name(String),

    /// Every test in this batch, including manual-only ones.
    Batch(String),

    /// Every registered test that failed in the last run.
    LastFailed,
}

impl TestSelector {
    const FORMAT: &'static str = "all | failed | name:<name> | batch:<batch>";
}

impl FromStr for TestSelector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => return Ok(Self::All),
            "failed" => return Ok(Self::LastFailed),
            _ => {}
        }

        let (kind, value) = s.split_once(':').ok_or_else(|| {
            SelectorParseError::new(Some(Self::FORMAT), format!("unknown selector `{s}`"))
        })?;
        if value.is_empty() {
            return Err(SelectorParseError::new(
                Some(Self::FORMAT),
                format!("`{kind}` requires a value"),
            ));
        }
        match kind {
            "name" => Ok(Self::Name(value.to_owned())),
            "batch" => Ok(Self::Batch(value.to_owned())),
            other => Err(SelectorParseError::new(
                Some(Self::FORMAT),
                format!("unknown selector kind `{other}`"),
            )),
        }
    }
}

impl fmt::Display for TestSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Name(name) => write!(f, "name:{name}"),
            Self::Batch(batch) => write!(f, "batch:{batch}"),
            Self::LastFailed => write!(f, "failed"),
        }
    }
}

/// Selects test structures already placed in the world, relative to a position.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PosSelector {
    /// The structure whose origin is closest to the position, if within `radius` blocks.
    Nearest {
        /// The search radius, in blocks.
        radius: u32,
    },

    /// Every structure whose origin is within `radius` blocks, closest first.
    Within {
        /// The search radius, in blocks.
        radius: u32,
    },

    /// The structure whose origin is exactly this position.
    At(BlockPos),
}

impl PosSelector {
    /// The search radius of `nearest`.
    pub const NEAREST_RADIUS: u32 = 15;

    /// The search radius of `all-within`.
    pub const ALL_WITHIN_RADIUS: u32 = 200;

    const FORMAT: &'static str = "nearest | all-within | radius:<r> | at:<x>,<y>,<z>";
}

impl FromStr for PosSelector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nearest" => {
                return Ok(Self::Nearest {
                    radius: Self::NEAREST_RADIUS,
                });
            }
            "all-within" => {
                return Ok(Self::Within {
                    radius: Self::ALL_WITHIN_RADIUS,
                });
            }
            _ => {}
        }

        let (kind, value) = s.split_once(':').ok_or_else(|| {
            SelectorParseError::new(Some(Self::FORMAT), format!("unknown selector `{s}`"))
        })?;
        match kind {
            "radius" | "all-within" => {
                let radius = value.parse().map_err(|_| {
                    SelectorParseError::new(
                        Some(Self::FORMAT),
                        format!("radius `{value}` is not a non-negative integer"),
                    )
                })?;
                Ok(Self::Within { radius })
            }
            "nearest" => {
                let radius = value.parse().map_err(|_| {
                    SelectorParseError::new(
                        Some(Self::FORMAT),
                        format!("radius `{value}` is not a non-negative integer"),
                    )
                })?;
                Ok(Self::Nearest { radius })
            }
            "at" => parse_block_pos(value).map(Self::At),
            other => Err(SelectorParseError::new(
                Some(Self::FORMAT),
                format!("unknown selector kind `{other}`"),
            )),
        }
    }
}

fn parse_block_pos(input: &str) -> Result<BlockPos, SelectorParseError> {
    let coords: Vec<_> = input.split(',').map(|coord| coord.trim().parse::<i32>()).collect();
    match coords.as_slice() {
        [Ok(x), Ok(y), Ok(z)] => Ok(BlockPos::new(*x, *y, *z)),
        _ => Err(SelectorParseError::new(
            Some("at:<x>,<y>,<z>"),
            format!("`{input}` is not three integer coordinates"),
        )),
    }
}

impl fmt::Display for PosSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest { radius } => write!(f, "nearest:{radius}"),
            Self::Within { radius } => write!(f, "radius:{radius}"),
            Self::At(pos) => write!(f, "at:{},{},{}", pos.x, pos.y, pos.z),
        }
    }
}

/// Resolves selectors into test cases or runs.
#[derive(Clone, Debug)]
pub struct TestFinder<'a> {
    registry: &'a TestRegistry,
    repeat: NonZeroUsize,
}

impl<'a> TestFinder<'a> {
    /// Creates a finder over `registry`.
    pub fn new(registry: &'a TestRegistry) -> Self {
        Self {
            registry,
            repeat: NonZeroUsize::MIN,
        }
    }

    /// Repeats every resolved item `repeat` times in a row. Defaults to 1.
    pub fn set_repeat(&mut self, repeat: NonZeroUsize) -> &mut Self {
        self.repeat = repeat;
        self
    }

    /// Resolves `selector` into test cases, in registration order.
    pub fn find_cases(
        &self,
        selector: &TestSelector,
    ) -> Result<Vec<Arc<TestCase>>, FindTestsError> {
        let cases: Vec<_> = match selector {
            TestSelector::All => self.registry.all_runnable().cloned().collect(),
            TestSelector::Name(name) => {
                let case = self
                    .registry
                    .get(name)
                    .ok_or_else(|| FindTestsError::UnknownTest { name: name.clone() })?;
                vec![case.clone()]
            }
            TestSelector::Batch(batch) => {
                let cases: Vec<_> = self.registry.by_batch(batch).cloned().collect();
                if cases.is_empty() {
                    return Err(FindTestsError::EmptyBatch {
                        batch: batch.clone(),
                    });
                }
                cases
            }
            TestSelector::LastFailed => {
                let cases: Vec<_> = self.registry.last_failed().cloned().collect();
                if cases.is_empty() {
                    return Err(FindTestsError::NoFailedTests);
                }
                cases
            }
        };

        debug!(%selector, count = cases.len(), repeat = self.repeat.get(), "found test cases");
        Ok(self.repeated(cases))
    }

    /// Resolves `selector` into runs pinned to structures already in `world`, searching from
    /// `from`.
    pub fn find_positions(
        &self,
        world: &dyn World,
        from: BlockPos,
        selector: &PosSelector,
    ) -> Result<Vec<RunSpec>, FindTestsError> {
        let structures = match *selector {
            PosSelector::At(pos) => {
                let structure =
                    world
                        .structure_at(pos)
                        .ok_or(FindTestsError::NoStructuresFound {
                            from: pos,
                            radius: 0,
                        })?;
                vec![structure]
            }
            PosSelector::Nearest { radius } => {
                let mut found = structures_within(world, from, radius);
                found.truncate(1);
                found
            }
            PosSelector::Within { radius } => structures_within(world, from, radius),
        };

        if structures.is_empty() {
            let radius = match *selector {
                PosSelector::Nearest { radius } | PosSelector::Within { radius } => radius,
                PosSelector::At(_) => 0,
            };
            return Err(FindTestsError::NoStructuresFound { from, radius });
        }

        let specs = structures
            .into_iter()
            .map(|structure| {
                let case = self.registry.get(&structure.test_name).ok_or_else(|| {
                    FindTestsError::UnknownStructure {
                        origin: structure.origin,
                        name: structure.test_name.clone(),
                    }
                })?;
                Ok(RunSpec::new(case.clone()).at(structure.origin, structure.rotation))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(%selector, %from, count = specs.len(), "found test structures");
        Ok(self.repeated(specs))
    }

    fn repeated<T: Clone>(&self, items: Vec<T>) -> Vec<T> {
        if self.repeat == NonZeroUsize::MIN {
            return items;
        }
        items
            .into_iter()
            .flat_map(|item| iter::repeat_n(item, self.repeat.get()))
            .collect()
    }
}

/// Returns the structures whose origins lie within `radius` blocks of `from`, closest first.
fn structures_within(world: &dyn World, from: BlockPos, radius: u32) -> Vec<PlacedStructure> {
    let max_distance_squared = i64::from(radius) * i64::from(radius);
    world
        .structures()
        .into_iter()
        .map(|structure| (structure.origin.distance_squared(from), structure))
        .filter(|(distance_squared, _)| *distance_squared <= max_distance_squared)
        .sorted_by(|(a, left), (b, right)| a.cmp(b).then_with(|| left.origin.cmp(&right.origin)))
        .map(|(_, structure)| structure)
        .collect()
}
