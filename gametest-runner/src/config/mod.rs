// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for gametest.
//!
//! Configuration is read from TOML. An embedded default config
//! ([`GameTestConfig::DEFAULT_CONFIG`]) is always loaded first, and a repository config
//! (`.config/gametest.toml` by default) is layered on top of it. Most settings live in
//! [profiles](GameTestProfile), obtained through [`GameTestConfig::profile`].

mod grid;
mod imp;
mod retry_policy;

pub use grid::*;
pub use imp::*;
pub use retry_policy::*;

#[cfg(test)]
mod test_helpers;
