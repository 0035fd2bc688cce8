// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{TestRun, TestRunId, TestRunState};
use crate::list::TestCase;
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use std::{fmt, sync::Arc};

/// Receives outcomes from an [`OutcomeTracker`].
pub trait TrackerListener {
    /// Called when a tracked run passes.
    fn on_test_passed(&mut self, run: &TestRun) {
        let _ = run;
    }

    /// Called when a tracked run fails or times out.
    fn on_test_failed(&mut self, run: &TestRun) {
        let _ = run;
    }

    /// Called once every tracked run has finished.
    fn on_all_done(&mut self, summary: &RunSummary) {
        let _ = summary;
    }
}

/// Called with the test case of every tracked run that fails.
pub type FailureListener = Box<dyn FnMut(&TestCase)>;

#[derive(Clone, Debug)]
struct TrackedRun {
    case: Arc<TestCase>,
    state: TestRunState,
    attempts_exhausted: bool,
}

/// Aggregates the outcomes of a set of runs.
#[derive(Debug, Default)]
pub struct OutcomeTracker {
    tracked: IndexMap<TestRunId, TrackedRun>,
    listeners: DebugIgnore<Vec<Box<dyn TrackerListener>>>,
    failure_listeners: DebugIgnore<Vec<FailureListener>>,
    done_notified: bool,
}

impl OutcomeTracker {
    /// Creates a tracker with nothing tracked.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener notified of every outcome.
    pub fn add_listener(&mut self, listener: Box<dyn TrackerListener>) {
        self.listeners.push(listener);
    }

    /// Adds a listener notified of every failed test case.
    pub fn add_failure_listener(&mut self, listener: FailureListener) {
        self.failure_listeners.push(listener);
    }

    /// Starts tracking a run.
    pub fn add(&mut self, run: &TestRun) {
        self.tracked.insert(
            run.id(),
            TrackedRun {
                case: run.case().clone(),
                state: run.state(),
                attempts_exhausted: false,
            },
        );
        self.done_notified = false;
    }

    /// Stops tracking a run.
    pub fn forget(&mut self, id: TestRunId) {
        self.tracked.shift_remove(&id);
    }

    /// Tracks `next` in place of `previous`, keeping its position. Does nothing if `previous`
    /// isn't tracked.
    pub fn replace(&mut self, previous: TestRunId, next: &TestRun) {
        let Some((index, _, _)) = self.tracked.shift_remove_full(&previous) else {
            return;
        };
        self.tracked.shift_insert(
            index,
            next.id(),
            TrackedRun {
                case: next.case().clone(),
                state: next.state(),
                attempts_exhausted: false,
            },
        );
        self.done_notified = false;
    }

    /// Records the current state of `run`, notifying listeners if it has finished.
    ///
    /// Runs that aren't tracked are ignored.
    pub fn record(&mut self, run: &TestRun) {
        let Some(tracked) = self.tracked.get_mut(&run.id()) else {
            return;
        };
        let previous = tracked.state;
        tracked.state = run.state();
        tracked.attempts_exhausted = run.attempts_exhausted().is_some();
        if previous.is_terminal() || !run.is_done() {
            return;
        }

        if run.state().is_failure() {
            for listener in self.listeners.iter_mut() {
                listener.on_test_failed(run);
            }
            let case: &TestCase = run.case();
            for listener in self.failure_listeners.iter_mut() {
                listener(case);
            }
        } else {
            for listener in self.listeners.iter_mut() {
                listener.on_test_passed(run);
            }
        }

        if self.is_done() && !self.done_notified {
            self.done_notified = true;
            let summary = self.summary();
            for listener in self.listeners.iter_mut() {
                listener.on_all_done(&summary);
            }
        }
    }

    /// Returns true if at least one run is tracked and every tracked run has finished.
    pub fn is_done(&self) -> bool {
        !self.tracked.is_empty()
            && self
                .tracked
                .values()
                .all(|tracked| tracked.state.is_terminal())
    }

    /// Returns the IDs of the tracked runs, in the order they were added.
    pub fn tracked(&self) -> impl Iterator<Item = TestRunId> + '_ {
        self.tracked.keys().copied()
    }

    /// Returns the number of tracked runs.
    pub fn total_count(&self) -> usize {
        self.tracked.len()
    }

    /// Returns the number of tracked runs that passed.
    pub fn passed_count(&self) -> usize {
        self.count(|tracked| tracked.state == TestRunState::Passed)
    }

    /// Returns the number of tracked runs that haven't finished.
    pub fn in_progress_count(&self) -> usize {
        self.count(|tracked| !tracked.state.is_terminal())
    }

    /// Returns the number of required tests that failed.
    pub fn failed_required_count(&self) -> usize {
        self.count(|tracked| tracked.state.is_failure() && tracked.case.is_required())
    }

    /// Returns the number of optional tests that failed.
    pub fn failed_optional_count(&self) -> usize {
        self.count(|tracked| tracked.state.is_failure() && !tracked.case.is_required())
    }

    /// Returns true if a required test failed.
    pub fn has_failed_required(&self) -> bool {
        self.failed_required_count() > 0
    }

    /// Returns true if an optional test failed.
    pub fn has_failed_optional(&self) -> bool {
        self.failed_optional_count() > 0
    }

    /// Returns the required test cases that failed, in tracking order.
    pub fn failed_required(&self) -> impl Iterator<Item = &Arc<TestCase>> + '_ {
        self.tracked
            .values()
            .filter(|tracked| tracked.state.is_failure() && tracked.case.is_required())
            .map(|tracked| &tracked.case)
    }

    /// Returns the optional test cases that failed, in tracking order.
    pub fn failed_optional(&self) -> impl Iterator<Item = &Arc<TestCase>> + '_ {
        self.tracked
            .values()
            .filter(|tracked| tracked.state.is_failure() && !tracked.case.is_required())
            .map(|tracked| &tracked.case)
    }

    /// Returns the test cases whose last attempt ran out of attempts before reaching the
    /// required number of successes, in tracking order.
    pub fn attempts_exhausted(&self) -> impl Iterator<Item = &Arc<TestCase>> + '_ {
        self.tracked
            .values()
            .filter(|tracked| tracked.attempts_exhausted)
            .map(|tracked| &tracked.case)
    }

    /// Returns a snapshot of the tracked outcomes.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total: self.total_count(),
            passed: self.passed_count(),
            failed_required: self.failed_required().map(|case| case.name().to_owned()).collect(),
            failed_optional: self.failed_optional().map(|case| case.name().to_owned()).collect(),
            attempts_exhausted: self
                .attempts_exhausted()
                .map(|case| case.name().to_owned())
                .collect(),
            in_progress: self.in_progress_count(),
        }
    }

    /// Renders one character per tracked run: ` ` not started, `_` running, `+` passed, `X`
    /// required failure, `x` optional failure.
    pub fn progress_bar(&self) -> String {
        let mut bar = String::with_capacity(self.tracked.len() + 2);
        bar.push('[');
        for tracked in self.tracked.values() {
            bar.push(match tracked.state {
                TestRunState::Created | TestRunState::StructureLoading => ' ',
                TestRunState::Running => '_',
                TestRunState::Passed => '+',
                TestRunState::Failed | TestRunState::TimedOut if tracked.case.is_required() => {
                    'X'
                }
                TestRunState::Failed | TestRunState::TimedOut => 'x',
            });
        }
        bar.push(']');
        bar
    }

    fn count(&self, f: impl Fn(&TrackedRun) -> bool) -> usize {
        self.tracked.values().filter(|tracked| f(tracked)).count()
    }
}

/// The outcomes of a set of runs at one point in time.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    /// The number of tracked runs.
    pub total: usize,

    /// The number of runs that passed.
    pub passed: usize,

    /// The names of the required tests that failed.
    pub failed_required: Vec<String>,

    /// The names of the optional tests that failed.
    pub failed_optional: Vec<String>,

    /// The names of the tests that ran out of attempts before reaching their required number of
    /// successes.
    pub attempts_exhausted: Vec<String>,

    /// The number of runs that haven't finished.
    pub in_progress: usize,
}

impl RunSummary {
    /// Returns true if no required test failed.
    pub fn is_success(&self) -> bool {
        self.failed_required.is_empty()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} required failed, {} optional failed, {} in progress",
            self.passed,
            self.failed_required.len(),
            self.failed_optional.len(),
            self.in_progress,
        )
    }
}
