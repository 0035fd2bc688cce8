// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{TestRunId, TestRuns};
use crate::list::{BatchHookMap, BatchHooks};
use indexmap::IndexMap;
use std::{fmt, num::NonZeroUsize};

/// A group of runs placed, executed and cleaned up together.
///
/// Every run in a batch belongs to the same named batch. Its ID has the form `{name}:{index}`.
#[derive(Clone, Debug)]
pub struct Batch {
    id: String,
    batch_name: String,
    runs: Vec<TestRunId>,
    hooks: BatchHooks,
}

impl Batch {
    /// Creates a batch from its parts.
    pub fn new(
        id: impl Into<String>,
        batch_name: impl Into<String>,
        runs: Vec<TestRunId>,
        hooks: BatchHooks,
    ) -> Self {
        Self {
            id: id.into(),
            batch_name: batch_name.into(),
            runs,
            hooks,
        }
    }

    /// Returns the ID of this batch.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the name shared by every test in this batch.
    pub fn batch_name(&self) -> &str {
        &self.batch_name
    }

    /// Returns the runs in this batch, in execution order.
    pub fn runs(&self) -> &[TestRunId] {
        &self.runs
    }

    /// Returns the hooks run around this batch.
    pub fn hooks(&self) -> &BatchHooks {
        &self.hooks
    }

    pub(crate) fn retain_runs(&mut self, f: impl FnMut(&TestRunId) -> bool) {
        self.runs.retain(f);
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Splits runs into batches.
pub trait Batcher {
    /// Groups `ids` into batches. Every ID must end up in exactly one batch.
    fn make_batches(
        &self,
        runs: &TestRuns,
        ids: Vec<TestRunId>,
        hooks: &BatchHookMap,
    ) -> Vec<Batch>;
}

/// Groups runs by batch name, in order of first appearance, then splits each group into chunks
/// of at most `size` runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChunkedBatcher {
    size: NonZeroUsize,
}

impl ChunkedBatcher {
    /// The default maximum batch size.
    pub const DEFAULT_SIZE: NonZeroUsize = NonZeroUsize::new(50).expect("50 is non-zero");

    /// Creates a batcher with the given maximum batch size.
    pub fn new(size: NonZeroUsize) -> Self {
        Self { size }
    }

    /// Returns the maximum batch size.
    pub fn size(&self) -> NonZeroUsize {
        self.size
    }
}

impl Default for ChunkedBatcher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SIZE)
    }
}

impl Batcher for ChunkedBatcher {
    fn make_batches(
        &self,
        runs: &TestRuns,
        ids: Vec<TestRunId>,
        hooks: &BatchHookMap,
    ) -> Vec<Batch> {
        group_and_chunk(ids, |id| runs[*id].case().batch_name().to_owned(), self.size)
            .into_iter()
            .map(|chunk| {
                let hooks = hooks.get(&chunk.key);
                Batch::new(
                    format!("{}:{}", chunk.key, chunk.index),
                    chunk.key,
                    chunk.items,
                    hooks,
                )
            })
            .collect()
    }
}

#[derive(Debug)]
pub(crate) struct Chunk<T> {
    pub(crate) key: String,
    pub(crate) index: usize,
    pub(crate) items: Vec<T>,
}

/// Groups items by key in order of first appearance, then chunks each group. Chunk indexes
/// restart at 0 for every group.
pub(crate) fn group_and_chunk<T>(
    items: impl IntoIterator<Item = T>,
    key: impl Fn(&T) -> String,
    size: NonZeroUsize,
) -> Vec<Chunk<T>> {
    let mut groups: IndexMap<String, Vec<T>> = IndexMap::new();
    for item in items {
        groups.entry(key(&item)).or_default().push(item);
    }

    let mut chunks = Vec::new();
    for (key, mut group) in groups {
        let mut index = 0;
        while !group.is_empty() {
            let rest = group.split_off(size.get().min(group.len()));
            chunks.push(Chunk {
                key: key.clone(),
                index,
                items: group,
            });
            group = rest;
            index += 1;
        }
    }
    chunks
}
