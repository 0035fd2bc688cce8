// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report the results of a test run.
//!
//! Lifecycle events are delivered to [`TestListener`]s attached to each run. The default listener
//! is the [`Reporter`], constructed via a [`ReporterBuilder`], which renders markers in the world,
//! prints status lines and decides whether a failed or flaky test gets another attempt.

mod displayer;
mod imp;
mod last_failed;
mod listener;

pub use displayer::*;
pub use imp::*;
pub use last_failed::*;
pub use listener::*;

use crate::errors::StatusLevelParseError;
use serde::Deserialize;
use std::{fmt, str::FromStr};

/// Status level to show in the reporter output.
///
/// Status levels are incremental: each level causes all the statuses listed above it to be
/// output. For example, [`Pass`](Self::Pass) implies [`Retry`](Self::Retry) and
/// [`Fail`](Self::Fail).
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd, Deserialize)]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum StatusLevel {
    /// No output.
    None,

    /// Only output test failures.
    Fail,

    /// Output retries and failures.
    Retry,

    /// Output passing tests in addition to all variants above.
    Pass,

    /// Output structure placement in addition to all variants above.
    All,
}

impl StatusLevel {
    /// Returns the names of every status level, in increasing order.
    pub fn variants() -> &'static [&'static str] {
        &["none", "fail", "retry", "pass", "all"]
    }
}

impl FromStr for StatusLevel {
    type Err = StatusLevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "fail" => Ok(Self::Fail),
            "retry" => Ok(Self::Retry),
            "pass" => Ok(Self::Pass),
            "all" => Ok(Self::All),
            other => Err(StatusLevelParseError::new(other)),
        }
    }
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Fail => "fail",
            Self::Retry => "retry",
            Self::Pass => "pass",
            Self::All => "all",
        };
        f.write_str(s)
    }
}
