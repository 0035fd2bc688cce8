// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{AttemptsExhaustedError, PlacementError},
    runner::{Batch, TestRun, TestRunId, TestRuns},
    world::World,
};
use std::fmt;

/// Identifies a [`TestListener`] registered with a scheduler.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ListenerId(usize);

impl ListenerId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the index of the listener in registration order.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// What the listeners of one event asked the scheduler to do.
#[derive(Debug, Default)]
pub(crate) struct ListenerRequests {
    pub(crate) reruns: Vec<TestRunId>,
    pub(crate) attempts_exhausted: Vec<(TestRunId, AttemptsExhaustedError)>,
}

/// What a [`TestListener`] can reach while handling an event.
pub struct ListenerContext<'a> {
    world: &'a mut dyn World,
    runs: &'a TestRuns,
    requests: &'a mut ListenerRequests,
}

impl<'a> ListenerContext<'a> {
    pub(crate) fn new(
        world: &'a mut dyn World,
        runs: &'a TestRuns,
        requests: &'a mut ListenerRequests,
    ) -> Self {
        Self {
            world,
            runs,
            requests,
        }
    }

    /// Gives access to the world.
    pub fn world(&mut self) -> &mut dyn World {
        &mut *self.world
    }

    /// Returns every run the scheduler has created, including earlier attempts.
    pub fn runs(&self) -> &'a TestRuns {
        self.runs
    }

    /// Asks the scheduler to run another attempt of `run` once the current event has been
    /// delivered to every listener.
    ///
    /// Requests for a run that already has a rerun are ignored.
    pub fn request_rerun(&mut self, run: TestRunId) {
        if !self.requests.reruns.contains(&run) {
            self.requests.reruns.push(run);
        }
    }

    /// Records that `run` was the last attempt of its test and the test didn't reach its
    /// required number of successes.
    ///
    /// The error is stored on the run before the scheduler's trackers see its outcome.
    pub fn record_attempts_exhausted(&mut self, run: TestRunId, error: AttemptsExhaustedError) {
        self.requests.attempts_exhausted.push((run, error));
    }
}

/// Receives lifecycle events for the runs it is attached to.
///
/// Listeners are called synchronously, in registration order, at the moment of each transition.
/// A listener attached to a run stays attached to every rerun of it.
pub trait TestListener {
    /// The run's structure has been placed.
    fn on_structure_loaded(&mut self, run: &TestRun, cx: &mut ListenerContext<'_>) {
        let _ = (run, cx);
    }

    /// The run passed.
    fn on_passed(&mut self, run: &TestRun, cx: &mut ListenerContext<'_>) {
        let _ = (run, cx);
    }

    /// The run failed or timed out.
    fn on_failed(&mut self, run: &TestRun, cx: &mut ListenerContext<'_>) {
        let _ = (run, cx);
    }

    /// `next` was created as a rerun of `previous`.
    fn on_rerun_added(&mut self, previous: &TestRun, next: &TestRun, cx: &mut ListenerContext<'_>) {
        let _ = (previous, next, cx);
    }

    /// The run's structure couldn't be placed, so the run was dropped from its batch.
    fn on_placement_failed(
        &mut self,
        run: &TestRun,
        error: &PlacementError,
        cx: &mut ListenerContext<'_>,
    ) {
        let _ = (run, error, cx);
    }
}

/// Receives events for whole batches.
pub trait BatchListener {
    /// The batch is about to be placed and started.
    fn on_batch_starting(&mut self, batch: &Batch) {
        let _ = batch;
    }

    /// Every run in the batch has finished, or the scheduler stopped.
    fn on_batch_finished(&mut self, batch: &Batch) {
        let _ = batch;
    }
}
