// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Declaring and registering test cases.
//!
//! The main data structures in this module are:
//! * [`TestCase`] for the immutable declaration of a single test
//! * [`TestRegistry`] for the set of known tests, their batch hooks, and the tests that failed
//!   last time

mod registry;
mod test_case;

pub use registry::*;
pub use test_case::*;
