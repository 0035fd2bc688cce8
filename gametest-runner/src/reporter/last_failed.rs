// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage and retrieval of the tests that failed in a previous run.
//!
//! During a run, [`RememberFailures`] collects the names of failed tests through the outcome
//! tracker's failure listeners. Afterwards the names are saved through a [`LastFailedStore`], and
//! a later run loads them back into a [`TestRegistry`] so that the `failed` selector can find them.

use crate::{
    errors::{LastFailedLoadError, LastFailedSaveError},
    list::{TestCase, TestRegistry},
    runner::FailureListener,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::BTreeSet, fs, io, rc::Rc};
use tracing::debug;

/// The names of the tests that failed in a run, serialized to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastFailedSnapshot {
    /// Version of the snapshot format.
    pub version: u32,

    /// When this snapshot was created.
    pub created_at: DateTime<Utc>,

    /// The profile that was used for the run.
    pub profile_name: String,

    /// The names of the tests that failed.
    pub failed_tests: BTreeSet<String>,
}

impl LastFailedSnapshot {
    /// Creates a snapshot of the current format, timestamped now.
    pub fn new(profile_name: impl Into<String>, failed_tests: BTreeSet<String>) -> Self {
        Self {
            version: LastFailedStore::CURRENT_VERSION,
            created_at: Utc::now(),
            profile_name: profile_name.into(),
            failed_tests,
        }
    }
}

/// Manages persistence of the last-failed set for one profile.
#[derive(Clone, Debug)]
pub struct LastFailedStore {
    path: Utf8PathBuf,
}

impl LastFailedStore {
    /// Current version of the snapshot format.
    pub const CURRENT_VERSION: u32 = 1;

    /// Creates a store for `profile_name`, kept in `store_dir`.
    pub fn new(store_dir: &Utf8Path, profile_name: &str) -> Self {
        let path = store_dir.join(format!("{profile_name}-last-failed.json"));
        Self { path }
    }

    /// Returns the path of the snapshot file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Loads the snapshot from disk. Returns `Ok(None)` if no snapshot has been saved.
    pub fn load(&self) -> Result<Option<LastFailedSnapshot>, LastFailedLoadError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(LastFailedLoadError::Read {
                    path: self.path.clone(),
                    error,
                });
            }
        };

        let snapshot: LastFailedSnapshot =
            serde_json::from_str(&contents).map_err(|error| LastFailedLoadError::Deserialize {
                path: self.path.clone(),
                error,
            })?;
        if snapshot.version != Self::CURRENT_VERSION {
            return Err(LastFailedLoadError::VersionMismatch {
                path: self.path.clone(),
                expected: Self::CURRENT_VERSION,
                actual: snapshot.version,
            });
        }

        debug!(
            path = %self.path,
            count = snapshot.failed_tests.len(),
            "loaded last-failed snapshot"
        );
        Ok(Some(snapshot))
    }

    /// Loads the snapshot, if any, and marks its tests as last-failed in `registry`.
    ///
    /// Returns the number of names loaded.
    pub fn load_into(&self, registry: &mut TestRegistry) -> Result<usize, LastFailedLoadError> {
        let Some(snapshot) = self.load()? else {
            return Ok(0);
        };
        let count = snapshot.failed_tests.len();
        registry.remember_failed(snapshot.failed_tests);
        Ok(count)
    }

    /// Saves the snapshot to disk, creating the store directory if necessary.
    pub fn save(&self, snapshot: &LastFailedSnapshot) -> Result<(), LastFailedSaveError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|error| LastFailedSaveError::CreateDir {
                path: parent.to_owned(),
                error,
            })?;
        }

        let contents = serde_json::to_string_pretty(snapshot)
            .map_err(|error| LastFailedSaveError::Serialize { error })?;
        fs::write(&self.path, contents).map_err(|error| LastFailedSaveError::Write {
            path: self.path.clone(),
            error,
        })?;

        debug!(
            path = %self.path,
            count = snapshot.failed_tests.len(),
            "saved last-failed snapshot"
        );
        Ok(())
    }

    /// Removes the snapshot file. Succeeds if there was nothing to remove.
    pub fn clear(&self) -> Result<(), LastFailedSaveError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(LastFailedSaveError::Remove {
                path: self.path.clone(),
                error,
            }),
        }
    }
}

/// Collects the names of failed tests while a run is in progress.
///
/// Clones share the same set, so one clone can be handed to the scheduler as a failure listener
/// while another reads the result afterwards.
#[derive(Clone, Debug, Default)]
pub struct RememberFailures {
    failed: Rc<RefCell<BTreeSet<String>>>,
}

impl RememberFailures {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a failure listener that adds to this collector.
    pub fn failure_listener(&self) -> FailureListener {
        let failed = self.failed.clone();
        Box::new(move |case: &TestCase| {
            failed.borrow_mut().insert(case.name().to_owned());
        })
    }

    /// Returns the names collected so far.
    pub fn failed_tests(&self) -> BTreeSet<String> {
        self.failed.borrow().clone()
    }

    /// Replaces the registry's last-failed set with the names collected so far.
    pub fn apply_to(&self, registry: &mut TestRegistry) {
        registry.forget_failed_tests();
        registry.remember_failed(self.failed_tests());
    }

    /// Returns a snapshot of the names collected so far.
    pub fn snapshot(&self, profile_name: impl Into<String>) -> LastFailedSnapshot {
        LastFailedSnapshot::new(profile_name, self.failed_tests())
    }
}
