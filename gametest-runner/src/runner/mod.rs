// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The tick-driven test scheduler.
//!
//! The main structure in this module is [`Scheduler`], built with a [`SchedulerBuilder`]. Each
//! attempt at running a test is a [`TestRun`], stored in the scheduler's [`TestRuns`] arena and
//! addressed by [`TestRunId`].

mod batch;
mod helper;
mod placement;
mod scheduler;
mod sequence;
mod test_run;
mod tracker;

pub use batch::*;
pub use helper::*;
pub use placement::*;
pub use scheduler::*;
pub use sequence::*;
pub use test_run::*;
pub use tracker::*;

#[cfg(test)]
pub(crate) use test_run::test_helpers;
