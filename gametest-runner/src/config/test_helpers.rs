// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::GameTestConfig;
use camino_tempfile::Utf8TempDir;
use std::fs;

/// Writes `config_contents` to `.config/gametest.toml` under a fresh temporary directory.
pub(super) fn temp_workspace(config_contents: &str) -> Utf8TempDir {
    let temp_dir = camino_tempfile::tempdir().expect("error creating temp dir");
    let config_path = temp_dir.path().join(GameTestConfig::CONFIG_PATH);
    fs::create_dir_all(config_path.parent().expect("config path has a parent"))
        .expect("error creating config dir");
    fs::write(&config_path, config_contents).expect("error writing config file");
    temp_dir
}

/// Parses `config_contents` as the repository config.
pub(super) fn parse_config(config_contents: &str) -> (Utf8TempDir, GameTestConfig) {
    let temp_dir = temp_workspace(config_contents);
    let config = GameTestConfig::from_sources(temp_dir.path(), None).expect("config is valid");
    (temp_dir, config)
}
