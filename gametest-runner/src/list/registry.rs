// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestCase;
use crate::{errors::DuplicateTestError, world::World};
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};
use tracing::debug;

/// A callback run against the world before or after a batch.
pub type BatchHook = Arc<dyn Fn(&mut dyn World) + Send + Sync>;

/// The before and after hooks of a single batch.
#[derive(Clone, Debug, Default)]
pub struct BatchHooks {
    before: Option<DebugIgnore<BatchHook>>,
    after: Option<DebugIgnore<BatchHook>>,
}

impl BatchHooks {
    /// Creates hooks from optional before and after callbacks.
    pub fn new(before: Option<BatchHook>, after: Option<BatchHook>) -> Self {
        Self {
            before: before.map(DebugIgnore),
            after: after.map(DebugIgnore),
        }
    }

    /// Runs the before-batch hook, if any.
    pub fn run_before(&self, world: &mut dyn World) {
        if let Some(hook) = &self.before {
            hook(world);
        }
    }

    /// Runs the after-batch hook, if any.
    pub fn run_after(&self, world: &mut dyn World) {
        if let Some(hook) = &self.after {
            hook(world);
        }
    }
}

/// Batch hooks keyed by batch name.
#[derive(Clone, Debug, Default)]
pub struct BatchHookMap {
    before: HashMap<String, DebugIgnore<BatchHook>>,
    after: HashMap<String, DebugIgnore<BatchHook>>,
}

impl BatchHookMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hook run before every batch with this name.
    pub fn set_before(&mut self, batch_name: impl Into<String>, hook: BatchHook) -> &mut Self {
        self.before.insert(batch_name.into(), DebugIgnore(hook));
        self
    }

    /// Sets the hook run after every batch with this name.
    pub fn set_after(&mut self, batch_name: impl Into<String>, hook: BatchHook) -> &mut Self {
        self.after.insert(batch_name.into(), DebugIgnore(hook));
        self
    }

    /// Returns the hooks for a batch. Batches without registered hooks get no-op hooks.
    pub fn get(&self, batch_name: &str) -> BatchHooks {
        BatchHooks {
            before: self.before.get(batch_name).cloned(),
            after: self.after.get(batch_name).cloned(),
        }
    }
}

/// The set of known tests.
///
/// The registry is an explicit value owned by the embedder, not global state. It holds every
/// registered [`TestCase`] in registration order, the batch hooks, and the names of the tests that
/// failed in the last run.
#[derive(Clone, Debug, Default)]
pub struct TestRegistry {
    cases: IndexMap<String, Arc<TestCase>>,
    hooks: BatchHookMap,
    last_failed: BTreeSet<String>,
}

impl TestRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a test case. Names must be unique.
    pub fn register(&mut self, case: Arc<TestCase>) -> Result<(), DuplicateTestError> {
        if self.cases.contains_key(case.name()) {
            return Err(DuplicateTestError::new(case.name()));
        }
        debug!(test_name = case.name(), batch = case.batch_name(), "registered test");
        self.cases.insert(case.name().to_owned(), case);
        Ok(())
    }

    /// Removes a test case, returning it if it was registered.
    pub fn forget(&mut self, name: &str) -> Option<Arc<TestCase>> {
        self.last_failed.remove(name);
        self.cases.shift_remove(name)
    }

    /// Returns the test case with this name.
    pub fn get(&self, name: &str) -> Option<&Arc<TestCase>> {
        self.cases.get(name)
    }

    /// Returns the number of registered tests.
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Returns true if no tests are registered.
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Iterates over every registered test, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TestCase>> + '_ {
        self.cases.values()
    }

    /// Iterates over every test that runs without being selected by name.
    pub fn all_runnable(&self) -> impl Iterator<Item = &Arc<TestCase>> + '_ {
        self.iter().filter(|case| !case.is_manual_only())
    }

    /// Iterates over the tests in a batch, in registration order.
    pub fn by_batch<'a>(&'a self, batch_name: &'a str) -> impl Iterator<Item = &'a Arc<TestCase>> {
        self.iter()
            .filter(move |case| case.batch_name() == batch_name)
    }

    /// Sets the hook run before every batch with this name.
    pub fn register_before_batch(&mut self, batch_name: impl Into<String>, hook: BatchHook) {
        self.hooks.set_before(batch_name, hook);
    }

    /// Sets the hook run after every batch with this name.
    pub fn register_after_batch(&mut self, batch_name: impl Into<String>, hook: BatchHook) {
        self.hooks.set_after(batch_name, hook);
    }

    /// Returns the batch hooks registered so far.
    pub fn batch_hooks(&self) -> &BatchHookMap {
        &self.hooks
    }

    /// Records tests as failed in the last run.
    pub fn remember_failed(&mut self, names: impl IntoIterator<Item = impl Into<String>>) {
        self.last_failed.extend(names.into_iter().map(Into::into));
    }

    /// Forgets every failure recorded so far.
    pub fn forget_failed_tests(&mut self) {
        self.last_failed.clear();
    }

    /// Returns the names of the tests that failed in the last run.
    pub fn last_failed_names(&self) -> &BTreeSet<String> {
        &self.last_failed
    }

    /// Iterates over the registered tests that failed in the last run, in registration order.
    ///
    /// Failures recorded for tests that are no longer registered are skipped.
    pub fn last_failed(&self) -> impl Iterator<Item = &Arc<TestCase>> + '_ {
        self.iter()
            .filter(|case| self.last_failed.contains(case.name()))
    }
}
