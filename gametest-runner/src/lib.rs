// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for running game tests inside a tick-stepped host world.
//!
//! The basic flow is:
//!
//! 1. Test cases are declared once and registered in a [`TestRegistry`](list::TestRegistry).
//! 2. A [`TestFinder`](test_filter::TestFinder) resolves a selection into cases (or into
//!    structures already present in the world).
//! 3. A [`SchedulerBuilder`](runner::SchedulerBuilder) groups them into batches and builds a
//!    [`Scheduler`](runner::Scheduler) over the host [`World`](world::World).
//! 4. The host calls [`Scheduler::tick`](runner::Scheduler::tick) once per simulated tick until
//!    the scheduler reports that it is stopped.
//!
//! Outcomes flow to [`TestListener`](reporter::TestListener)s (the default one being
//! [`Reporter`](reporter::Reporter)) and are aggregated by an
//! [`OutcomeTracker`](runner::OutcomeTracker).

pub mod config;
pub mod errors;
pub mod geometry;
mod helpers;
pub mod list;
pub mod reporter;
pub mod runner;
pub mod test_filter;
mod time;
pub mod world;
