// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for gametest-runner.

/// Utilities for pluralizing various words based on count or plurality.
pub(crate) mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub(crate) fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "attempt" if `count` is 1, otherwise "attempts".
    pub(crate) fn attempts_str(count: u32) -> &'static str {
        if count == 1 { "attempt" } else { "attempts" }
    }
}
