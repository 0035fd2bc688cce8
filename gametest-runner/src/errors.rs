// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by gametest-runner.

use crate::{geometry::BlockPos, reporter::StatusLevel};
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{borrow::Cow, fmt};
use thiserror::Error;

/// A failure captured by a test run.
///
/// These are expected, reported errors: a test body returns one to fail its run, and the run
/// records it as its final error. They never escape the scheduler.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum GameTestError {
    /// A condition without spatial context did not hold.
    #[error("{message}")]
    Assertion {
        /// The failure message.
        message: String,
    },

    /// A condition tied to a specific block did not hold.
    #[error("{message} at {absolute} (relative: {relative}) (t={tick})")]
    PositionalAssertion {
        /// The failure message.
        message: String,

        /// The block position in world space.
        absolute: BlockPos,

        /// The block position relative to the test's origin.
        relative: BlockPos,

        /// The tick of the run at which the failure was raised.
        tick: u64,
    },

    /// The run neither passed nor failed before its timeout.
    #[error("Didn't succeed or fail within {ticks} ticks")]
    Timeout {
        /// The timeout of the test, in ticks.
        ticks: u64,
    },

    /// A sequence step completed at a different tick than it declared.
    #[error("Succeeded in invalid tick: expected {expected}, but current tick is {actual}")]
    SequenceInvalidTick {
        /// The tick the step was expected to complete at.
        expected: u64,

        /// The tick the step actually completed at.
        actual: u64,
    },

    /// A helper was requested for a run whose structure hasn't been placed.
    #[error("structure for `{test_name}` has not been placed")]
    NotPlaced {
        /// The name of the test.
        test_name: String,
    },
}

impl GameTestError {
    /// Creates a new plain assertion error.
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion {
            message: message.into(),
        }
    }

    /// Returns the bare failure message, without any positional context.
    pub fn message(&self) -> Cow<'_, str> {
        match self {
            Self::Assertion { message } | Self::PositionalAssertion { message, .. } => {
                Cow::Borrowed(message)
            }
            other => Cow::Owned(other.to_string()),
        }
    }

    /// Returns the world-space position this error refers to, if any.
    pub fn absolute_pos(&self) -> Option<BlockPos> {
        match self {
            Self::PositionalAssertion { absolute, .. } => Some(*absolute),
            _ => None,
        }
    }
}

/// A flaky or retried test ran out of attempts before reaching its required success count.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error(
    "Not enough successes: {successes} out of {attempts} attempts. \
     Required successes: {required}. Max attempts: {max_attempts}."
)]
pub struct AttemptsExhaustedError {
    /// The number of attempts made.
    pub attempts: u32,

    /// The number of those attempts that passed.
    pub successes: u32,

    /// The number of successes the test needed.
    pub required: u32,

    /// The maximum number of attempts the test was allowed.
    pub max_attempts: u32,
}

/// The final error of a run, as reported.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RunFailure {
    /// The run failed with its own error.
    #[error(transparent)]
    Test(#[from] GameTestError),

    /// The chain of attempts for the test did not produce enough successes.
    #[error(transparent)]
    AttemptsExhausted(#[from] AttemptsExhaustedError),
}

/// A run's environment could not be placed in the world.
///
/// The run is dropped from its batch and the batch continues.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum PlacementError {
    /// The world has no template registered under this name.
    #[error("missing template `{template}`")]
    MissingTemplate {
        /// The name of the missing template.
        template: String,
    },

    /// No structure was found at the position a run was pinned to.
    #[error("structure block entity not found at {origin}")]
    StructureNotFound {
        /// The pinned origin.
        origin: BlockPos,
    },

    /// The placement strategy does not assign positions.
    #[error("no placement available")]
    NoPlacementAvailable,
}

/// An error returned by [`TestCaseBuilder::build`](crate::list::TestCaseBuilder::build).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TestCaseBuildError {
    /// The test name was empty.
    #[error("test name must not be empty")]
    EmptyName,

    /// `max-attempts` or `required-successes` was zero.
    #[error("test `{name}`: {field} must be at least 1")]
    ZeroCount {
        /// The test name.
        name: String,

        /// The field that was zero.
        field: &'static str,
    },

    /// More successes were required than attempts allowed.
    #[error(
        "test `{name}`: required successes ({required_successes}) \
         exceed max attempts ({max_attempts})"
    )]
    SuccessesExceedAttempts {
        /// The test name.
        name: String,

        /// The number of required successes.
        required_successes: u32,

        /// The maximum number of attempts.
        max_attempts: u32,
    },
}

/// An error returned while registering a test case.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("test `{name}` is already registered")]
pub struct DuplicateTestError {
    name: String,
}

impl DuplicateTestError {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the name of the duplicate test.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse gametest config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error which indicates that a profile was requested but not known to gametest.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }

    /// Returns the profile that wasn't found.
    pub fn profile(&self) -> &str {
        &self.profile
    }
}

/// Error returned while parsing a [`StatusLevel`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for status-level: {input}\n(known values: {})",
    StatusLevel::variants().join(", ")
)]
pub struct StatusLevelParseError {
    input: String,
}

impl StatusLevelParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurs while parsing a [`TestSelector`](crate::test_filter::TestSelector) or
/// a [`PosSelector`](crate::test_filter::PosSelector).
#[derive(Clone, Debug, Error)]
pub struct SelectorParseError {
    expected_format: Option<&'static str>,
    message: Cow<'static, str>,
}

impl SelectorParseError {
    pub(crate) fn new(
        expected_format: Option<&'static str>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            expected_format,
            message: message.into(),
        }
    }
}

impl fmt::Display for SelectorParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.expected_format {
            Some(format) => {
                write!(
                    f,
                    "selector must be in the format \"{}\":\n{}",
                    format, self.message
                )
            }
            None => write!(f, "{}", self.message),
        }
    }
}

/// An error returned while resolving a selection into test cases or placements.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum FindTestsError {
    /// No test is registered under this name.
    #[error("no test named `{name}` is registered")]
    UnknownTest {
        /// The requested name.
        name: String,
    },

    /// No registered test belongs to this batch.
    #[error("no tests found in batch `{batch}`")]
    EmptyBatch {
        /// The requested batch.
        batch: String,
    },

    /// A structure in the world refers to a test that isn't registered.
    #[error("structure at {origin} refers to unknown test `{name}`")]
    UnknownStructure {
        /// The structure's origin.
        origin: BlockPos,

        /// The test name recorded on the structure.
        name: String,
    },

    /// No structure was found for a positional selection.
    #[error("no test structure found within {radius} blocks of {from}")]
    NoStructuresFound {
        /// The position the search started from.
        from: BlockPos,

        /// The search radius.
        radius: u32,
    },

    /// The last-failed set was empty.
    #[error("no tests failed in the last run")]
    NoFailedTests,
}

/// An error that occurs while loading a [`LastFailedSnapshot`](crate::reporter::LastFailedSnapshot).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LastFailedLoadError {
    /// The snapshot file couldn't be read.
    #[error("failed to read last-failed snapshot at {path}")]
    Read {
        /// The path that failed to be read.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The snapshot file isn't valid JSON of the expected shape.
    #[error("failed to deserialize last-failed snapshot at {path}")]
    Deserialize {
        /// The path that failed to be deserialized.
        path: Utf8PathBuf,

        /// The underlying deserialization error.
        #[source]
        error: serde_json::Error,
    },

    /// The snapshot was written by an incompatible version.
    #[error("last-failed snapshot version mismatch at {path}: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The path with the version mismatch.
        path: Utf8PathBuf,

        /// The expected version.
        expected: u32,

        /// The version found.
        actual: u32,
    },
}

/// An error that occurs while saving or clearing a
/// [`LastFailedSnapshot`](crate::reporter::LastFailedSnapshot).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LastFailedSaveError {
    /// The store directory couldn't be created.
    #[error("failed to create directory {path}")]
    CreateDir {
        /// The directory that failed to be created.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The snapshot couldn't be serialized.
    #[error("failed to serialize last-failed snapshot")]
    Serialize {
        /// The underlying serialization error.
        #[source]
        error: serde_json::Error,
    },

    /// The snapshot couldn't be written.
    #[error("failed to write last-failed snapshot to {path}")]
    Write {
        /// The path that failed to be written.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The snapshot file couldn't be removed.
    #[error("failed to remove last-failed snapshot at {path}")]
    Remove {
        /// The path that failed to be removed.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },
}
