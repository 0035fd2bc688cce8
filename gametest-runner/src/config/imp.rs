// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    CustomGridImpl, GridLayout, RetryPolicy, deserialize_retry_policy,
    require_deserialize_retry_policy,
};
use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind, ProfileNotFound},
    reporter::{LastFailedStore, StatusLevel},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use indexmap::IndexMap;
use serde::Deserialize;
use std::num::NonZeroUsize;
use tracing::debug;

/// Overall configuration for gametest.
///
/// This is the root data structure for gametest configuration. Most settings are managed through
/// [profiles](GameTestProfile), obtained through the [`profile`](Self::profile) method.
#[derive(Clone, Debug)]
pub struct GameTestConfig {
    workspace_root: Utf8PathBuf,
    inner: GameTestConfigImpl,
}

impl GameTestConfig {
    /// The default location of the config within the path: `.config/gametest.toml`, used to read
    /// the config from the given directory.
    pub const CONFIG_PATH: &'static str = ".config/gametest.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the gametest config from the given file, or if not specified from
    /// `.config/gametest.toml` in the workspace root.
    ///
    /// If no config file is specified and the workspace root doesn't have
    /// `.config/gametest.toml`, uses the default config options.
    pub fn from_sources(
        workspace_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let workspace_root = workspace_root.into();
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = workspace_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let inner = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        debug!(%config_file, "loaded gametest config");

        Ok(Self {
            workspace_root,
            inner,
        })
    }

    /// Returns the default gametest config.
    pub fn default_config(workspace_root: impl Into<Utf8PathBuf>) -> Self {
        let inner = Self::build_and_deserialize_config(&Self::make_default_config())
            .expect("default config is always valid");
        Self {
            workspace_root: workspace_root.into(),
            inner,
        }
    }

    /// Returns the profile with the given name, or an error if a profile was specified but not
    /// found.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<GameTestProfile<'_>, ProfileNotFound> {
        let name = name.as_ref();
        let custom_profile = self.inner.profiles.get(name)?;
        Ok(GameTestProfile {
            name: name.to_owned(),
            store_dir: self.workspace_root.join(&self.inner.store.dir),
            default_profile: &self.inner.profiles.default,
            custom_profile,
        })
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<GameTestConfigImpl, ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        serde_path_to_error::deserialize(config)
            .map_err(|error| ConfigParseErrorKind::DeserializeError(Box::new(error)))
    }
}

/// A configuration profile for gametest. Contains most configuration used by the scheduler.
///
/// Returned by [`GameTestConfig::profile`].
#[derive(Clone, Debug)]
pub struct GameTestProfile<'cfg> {
    name: String,
    store_dir: Utf8PathBuf,
    default_profile: &'cfg DefaultProfileImpl,
    custom_profile: Option<&'cfg CustomProfileImpl>,
}

impl GameTestProfile<'_> {
    /// Returns the name of the profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the absolute store directory.
    pub fn store_dir(&self) -> &Utf8Path {
        &self.store_dir
    }

    /// Returns the maximum number of tests in a batch.
    pub fn batch_size(&self) -> NonZeroUsize {
        self.custom_profile
            .and_then(|profile| profile.batch_size)
            .unwrap_or(self.default_profile.batch_size)
    }

    /// Returns true if a required test failure should stop the whole run.
    pub fn halt_on_error(&self) -> bool {
        self.custom_profile
            .and_then(|profile| profile.halt_on_error)
            .unwrap_or(self.default_profile.halt_on_error)
    }

    /// Returns the default retry policy for tests.
    pub fn retries(&self) -> RetryPolicy {
        self.custom_profile
            .and_then(|profile| profile.retries)
            .unwrap_or(self.default_profile.retries)
    }

    /// Returns the grid layout for newly placed structures.
    pub fn grid(&self) -> GridLayout {
        match self.custom_profile.and_then(|profile| profile.grid.as_ref()) {
            Some(custom) => custom.apply_to(self.default_profile.grid),
            None => self.default_profile.grid,
        }
    }

    /// Returns the status level for reporter output.
    pub fn status_level(&self) -> StatusLevel {
        self.custom_profile
            .and_then(|profile| profile.status_level)
            .unwrap_or(self.default_profile.status_level)
    }

    /// Returns the store for the set of tests that failed in this profile's last run.
    pub fn last_failed_store(&self) -> LastFailedStore {
        LastFailedStore::new(&self.store_dir, &self.name)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct GameTestConfigImpl {
    store: StoreConfigImpl,
    #[serde(rename = "profile")]
    profiles: GameTestProfilesImpl,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StoreConfigImpl {
    dir: Utf8PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct GameTestProfilesImpl {
    default: DefaultProfileImpl,
    #[serde(flatten)]
    other: IndexMap<String, CustomProfileImpl>,
}

impl GameTestProfilesImpl {
    fn get(&self, profile: &str) -> Result<Option<&CustomProfileImpl>, ProfileNotFound> {
        let custom_profile = match profile {
            GameTestConfig::DEFAULT_PROFILE => None,
            other => Some(
                self.other
                    .get(other)
                    .ok_or_else(|| ProfileNotFound::new(profile, self.all_profiles()))?,
            ),
        };
        Ok(custom_profile)
    }

    fn all_profiles(&self) -> impl Iterator<Item = &str> {
        self.other
            .keys()
            .map(|key| key.as_str())
            .chain(std::iter::once(GameTestConfig::DEFAULT_PROFILE))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultProfileImpl {
    batch_size: NonZeroUsize,
    halt_on_error: bool,
    #[serde(deserialize_with = "require_deserialize_retry_policy")]
    retries: RetryPolicy,
    status_level: StatusLevel,
    grid: GridLayout,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default)]
    batch_size: Option<NonZeroUsize>,
    #[serde(default)]
    halt_on_error: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_retry_policy")]
    retries: Option<RetryPolicy>,
    #[serde(default)]
    status_level: Option<StatusLevel>,
    #[serde(default)]
    grid: Option<CustomGridImpl>,
}
