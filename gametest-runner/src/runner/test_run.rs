// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{GameTestSequence, TestHelper};
use crate::{
    config::RetryPolicy,
    errors::{AttemptsExhaustedError, GameTestError, PlacementError},
    geometry::{BlockPos, BoundingBox, Rotation},
    list::TestCase,
    reporter::ListenerId,
    time::{StopwatchSnapshot, StopwatchStart, stopwatch},
    world::{StructurePlacement, World},
};
use chrono::{DateTime, Local};
use debug_ignore::DebugIgnore;
use std::{
    fmt, mem,
    ops::{Index, IndexMut},
    sync::Arc,
    time::Duration,
};
use tracing::debug;

/// Identifies a [`TestRun`] within a scheduler's [`TestRuns`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TestRunId(usize);

impl TestRunId {
    /// Returns the index of the run in creation order.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TestRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The lifecycle state of a [`TestRun`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TestRunState {
    /// The run exists but its structure hasn't been placed.
    Created,

    /// The structure has been placed and the run is waiting to start.
    StructureLoading,

    /// The run is being ticked.
    Running,

    /// The run neither passed nor failed before its timeout.
    TimedOut,

    /// The run failed.
    Failed,

    /// The run passed.
    Passed,
}

impl TestRunState {
    /// Returns true if the run has finished.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::TimedOut | Self::Failed | Self::Passed)
    }

    /// Returns true if the run finished without passing.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::TimedOut | Self::Failed)
    }
}

pub(crate) type TickCallback = Box<dyn FnOnce(&mut TestHelper<'_>) -> Result<(), GameTestError>>;

/// One attempt at running a [`TestCase`].
///
/// A run is never restarted in place. Retrying a test creates a new run linked to this one
/// through [`previous`](Self::previous) and [`rerun`](Self::rerun), so earlier attempts stay
/// available for reporting.
#[derive(Debug)]
pub struct TestRun {
    id: TestRunId,
    case: Arc<TestCase>,
    retry_policy: RetryPolicy,
    attempt: u32,
    previous: Option<TestRunId>,
    rerun: Option<TestRunId>,
    origin: Option<BlockPos>,
    rotation: Rotation,
    bounds: Option<BoundingBox>,
    setup_remaining: u64,
    tick_count: u64,
    started: bool,
    state: TestRunState,
    scheduled: Vec<(u64, DebugIgnore<TickCallback>)>,
    sequences: Vec<GameTestSequence>,
    listeners: Vec<ListenerId>,
    error: Option<GameTestError>,
    attempts_exhausted: Option<AttemptsExhaustedError>,
    stopwatch: Option<StopwatchStart>,
    finished: Option<StopwatchSnapshot>,
}

impl TestRun {
    fn new(id: TestRunId, case: Arc<TestCase>, retry_policy: RetryPolicy) -> Self {
        let rotation = case.rotation();
        Self {
            id,
            case,
            retry_policy,
            attempt: 1,
            previous: None,
            rerun: None,
            origin: None,
            rotation,
            bounds: None,
            setup_remaining: 0,
            tick_count: 0,
            started: false,
            state: TestRunState::Created,
            scheduled: Vec::new(),
            sequences: Vec::new(),
            listeners: Vec::new(),
            error: None,
            attempts_exhausted: None,
            stopwatch: None,
            finished: None,
        }
    }

    /// Returns the ID of this run.
    pub fn id(&self) -> TestRunId {
        self.id
    }

    /// Returns the test case this run executes.
    pub fn case(&self) -> &Arc<TestCase> {
        &self.case
    }

    /// Returns the name of the test.
    pub fn test_name(&self) -> &str {
        self.case.name()
    }

    /// Returns the retry policy the run was created with.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Returns the 1-based attempt number of this run within its chain of reruns.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the run this one is a rerun of.
    pub fn previous(&self) -> Option<TestRunId> {
        self.previous
    }

    /// Returns the rerun created for this run, if any.
    pub fn rerun(&self) -> Option<TestRunId> {
        self.rerun
    }

    /// Returns the origin of the run's structure, once known.
    pub fn origin(&self) -> Option<BlockPos> {
        self.origin
    }

    /// Returns the orientation of the run's structure.
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Returns the footprint of the run's structure, once placed.
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    /// Returns the number of ticks the run has executed for, starting at 0 on the tick the body
    /// runs.
    pub fn tick(&self) -> u64 {
        self.tick_count
    }

    /// Returns the lifecycle state of the run.
    pub fn state(&self) -> TestRunState {
        self.state
    }

    /// Returns true if the run has finished.
    pub fn is_done(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns the error the run failed with.
    pub fn error(&self) -> Option<&GameTestError> {
        self.error.as_ref()
    }

    /// Returns the error recorded when this run was the last allowed attempt of its test and the
    /// test didn't reach its required number of successes.
    pub fn attempts_exhausted(&self) -> Option<&AttemptsExhaustedError> {
        self.attempts_exhausted.as_ref()
    }

    pub(crate) fn set_attempts_exhausted(&mut self, error: AttemptsExhaustedError) {
        self.attempts_exhausted = Some(error);
    }

    /// Returns the listeners notified of this run's lifecycle events, in registration order.
    pub fn listeners(&self) -> &[ListenerId] {
        &self.listeners
    }

    /// Returns the wall-clock time the run started executing.
    pub fn start_time(&self) -> Option<DateTime<Local>> {
        self.stopwatch
            .as_ref()
            .map(|stopwatch| stopwatch.snapshot().start_time)
    }

    /// Returns the wall-clock time the run finished.
    pub fn end_time(&self) -> Option<DateTime<Local>> {
        self.finished.map(|snapshot| snapshot.end_time())
    }

    /// Returns how long the run has been executing, or took to execute if it has finished.
    pub fn elapsed(&self) -> Duration {
        match (&self.finished, &self.stopwatch) {
            (Some(snapshot), _) => snapshot.duration,
            (None, Some(stopwatch)) => stopwatch.snapshot().duration,
            (None, None) => Duration::ZERO,
        }
    }

    // ---
    // Lifecycle, driven by the scheduler
    // ---

    pub(crate) fn add_listener(&mut self, listener: ListenerId) {
        if !self.listeners.contains(&listener) {
            self.listeners.push(listener);
        }
    }

    /// Places the run's structure at `origin`. Called by
    /// [`StructureSpawner`](super::StructureSpawner) implementations.
    ///
    /// On error the run stays in the `Created` state.
    ///
    /// # Panics
    ///
    /// Panics if the structure was already placed.
    pub fn prepare_structure(
        &mut self,
        world: &mut dyn World,
        origin: BlockPos,
    ) -> Result<BoundingBox, PlacementError> {
        if self.state != TestRunState::Created {
            panic!(
                "illegal state transition: structure for `{}` placed in state {:?}",
                self.case.name(),
                self.state
            );
        }

        let bounds = world.place_structure(StructurePlacement {
            test_name: self.case.name(),
            template: self.case.template(),
            origin,
            rotation: self.rotation,
        })?;
        self.origin = Some(origin);
        self.bounds = Some(bounds);
        self.state = TestRunState::StructureLoading;
        Ok(bounds)
    }

    pub(crate) fn start_execution(&mut self) {
        if self.state != TestRunState::StructureLoading {
            panic!(
                "illegal state transition: `{}` started in state {:?}",
                self.case.name(),
                self.state
            );
        }
        self.setup_remaining = self.case.setup_ticks();
        self.state = TestRunState::Running;
        self.stopwatch = Some(stopwatch());
    }

    /// Advances the run by one host tick.
    ///
    /// Finished runs ignore ticks.
    pub(crate) fn tick_once(&mut self, world: &mut dyn World) {
        match self.state {
            TestRunState::Running => {}
            state if state.is_terminal() => return,
            state => panic!(
                "illegal state transition: `{}` ticked in state {state:?}",
                self.case.name()
            ),
        }

        if self.setup_remaining > 0 {
            self.setup_remaining -= 1;
            return;
        }

        if self.started {
            self.tick_count += 1;
        } else {
            self.started = true;
            let function = self.case.function().clone();
            self.invoke(world, move |helper| function(helper));
        }

        self.run_due_callbacks(world);
        if self.is_done() {
            return;
        }

        if self.tick_count >= self.case.timeout_ticks() {
            self.poll_sequences(world, true);
            if !self.is_done() {
                let ticks = self.case.timeout_ticks();
                self.finish(TestRunState::TimedOut, Some(GameTestError::Timeout { ticks }));
            }
        } else {
            self.poll_sequences(world, false);
        }
    }

    pub(crate) fn succeed(&mut self) {
        self.check_can_finish("succeeded");
        self.finish(TestRunState::Passed, None);
    }

    pub(crate) fn fail(&mut self, error: GameTestError) {
        self.check_can_finish("failed");
        self.finish(TestRunState::Failed, Some(error));
    }

    pub(crate) fn schedule(&mut self, tick: u64, callback: TickCallback) {
        self.scheduled.push((tick, DebugIgnore(callback)));
    }

    pub(crate) fn start_sequence(&mut self) -> &mut GameTestSequence {
        let index = self.sequences.len();
        self.sequences.push(GameTestSequence::new(self.tick_count));
        &mut self.sequences[index]
    }

    fn invoke<F>(&mut self, world: &mut dyn World, f: F)
    where
        F: FnOnce(&mut TestHelper<'_>) -> Result<(), GameTestError>,
    {
        let result = TestHelper::new(self, world).and_then(|mut helper| f(&mut helper));
        if let Err(error) = result {
            self.fail(error);
        }
    }

    fn run_due_callbacks(&mut self, world: &mut dyn World) {
        let now = self.tick_count;
        let due: Vec<_> = self
            .scheduled
            .extract_if(.., |(tick, _)| *tick <= now)
            .collect();
        for (_, callback) in due {
            if self.is_done() {
                break;
            }
            self.invoke(world, callback.0);
        }
    }

    fn poll_sequences(&mut self, world: &mut dyn World, final_poll: bool) {
        if self.sequences.is_empty() {
            return;
        }

        // Sequences started while polling are pushed to self.sequences and merged back below.
        let mut sequences = mem::take(&mut self.sequences);
        for sequence in &mut sequences {
            if self.is_done() {
                break;
            }
            let result = TestHelper::new(self, world)
                .and_then(|mut helper| {
                    sequence.tick_and_continue(&mut helper)?;
                    Ok(helper)
                })
                .map_err(|error| (TestRunState::Failed, error))
                .and_then(|helper| {
                    if final_poll {
                        sequence
                            .fail_if_not_complete(&helper)
                            .map_err(|error| (TestRunState::TimedOut, error))
                    } else {
                        Ok(())
                    }
                });
            if let Err((state, error)) = result {
                if !self.is_done() {
                    self.finish(state, Some(error));
                }
                break;
            }
        }

        sequences.retain(|sequence| !sequence.is_complete());
        let started = mem::replace(&mut self.sequences, sequences);
        self.sequences.extend(started);
    }

    fn check_can_finish(&self, action: &str) {
        if self.state != TestRunState::Running {
            panic!(
                "illegal state transition: `{}` {action} in state {:?}",
                self.case.name(),
                self.state
            );
        }
    }

    fn finish(&mut self, state: TestRunState, error: Option<GameTestError>) {
        self.state = state;
        self.error = error;
        self.finished = self.stopwatch.as_ref().map(|stopwatch| stopwatch.snapshot());
        self.scheduled.clear();
        debug!(
            test_name = self.case.name(),
            attempt = self.attempt,
            tick = self.tick_count,
            ?state,
            "run finished"
        );
    }
}

/// Every run created by a scheduler, indexed by [`TestRunId`].
#[derive(Debug, Default)]
pub struct TestRuns {
    runs: Vec<TestRun>,
}

impl TestRuns {
    /// Returns the run with this ID.
    pub fn get(&self, id: TestRunId) -> Option<&TestRun> {
        self.runs.get(id.0)
    }

    /// Iterates over every run, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &TestRun> + '_ {
        self.runs.iter()
    }

    /// Returns the number of runs.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Returns true if no runs have been created.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Returns every attempt in the chain `id` belongs to, oldest first.
    pub fn chain(&self, id: TestRunId) -> Vec<&TestRun> {
        let mut first = &self[id];
        while let Some(previous) = first.previous {
            first = &self[previous];
        }

        let mut chain = vec![first];
        while let Some(next) = chain.last().and_then(|run| run.rerun) {
            chain.push(&self[next]);
        }
        chain
    }

    pub(crate) fn create(
        &mut self,
        case: Arc<TestCase>,
        retry_policy: RetryPolicy,
        pinned: Option<(BlockPos, Rotation)>,
    ) -> TestRunId {
        let id = TestRunId(self.runs.len());
        let mut run = TestRun::new(id, case, retry_policy);
        if let Some((origin, rotation)) = pinned {
            run.origin = Some(origin);
            run.rotation = rotation;
        }
        self.runs.push(run);
        id
    }

    /// Creates the next attempt for `previous`: same case, policy, rotation and listeners, fresh
    /// lifecycle state, no origin.
    pub(crate) fn copy_reset(&mut self, previous: TestRunId) -> TestRunId {
        let id = TestRunId(self.runs.len());
        let prev = &mut self[previous];
        if let Some(existing) = prev.rerun {
            panic!(
                "illegal state transition: `{}` already has rerun {existing}",
                prev.case.name()
            );
        }
        prev.rerun = Some(id);

        let mut run = TestRun::new(id, prev.case.clone(), prev.retry_policy);
        run.attempt = prev.attempt + 1;
        run.previous = Some(previous);
        run.rotation = prev.rotation;
        run.listeners = prev.listeners.clone();
        self.runs.push(run);
        id
    }
}

impl Index<TestRunId> for TestRuns {
    type Output = TestRun;

    fn index(&self, id: TestRunId) -> &TestRun {
        &self.runs[id.0]
    }
}

impl IndexMut<TestRunId> for TestRuns {
    fn index_mut(&mut self, id: TestRunId) -> &mut TestRun {
        &mut self.runs[id.0]
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;
    use crate::world::{MemoryWorld, StructureTemplate};

    pub(crate) const TEMPLATE: &str = "box";

    pub(crate) fn world() -> MemoryWorld {
        let mut world = MemoryWorld::new();
        world.add_template(TEMPLATE, StructureTemplate::new(BlockPos::new(3, 3, 3)));
        world
    }

    pub(crate) fn case<F>(name: &str, f: F) -> Arc<TestCase>
    where
        F: Fn(&mut TestHelper<'_>) -> Result<(), GameTestError> + Send + Sync + 'static,
    {
        TestCase::builder(name, f)
            .set_template(TEMPLATE)
            .set_timeout_ticks(20)
            .build()
            .expect("valid test case")
    }

    /// Creates a run of `case`, places it at the origin and starts it.
    pub(crate) fn started_run(
        runs: &mut TestRuns,
        world: &mut MemoryWorld,
        case: Arc<TestCase>,
    ) -> TestRunId {
        let id = runs.create(case, RetryPolicy::no_retries(), None);
        runs[id]
            .prepare_structure(world, BlockPos::ZERO)
            .expect("template exists");
        runs[id].start_execution();
        id
    }

    /// Ticks a run until it finishes or `max_ticks` pass.
    pub(crate) fn tick_until_done(run: &mut TestRun, world: &mut MemoryWorld, max_ticks: u64) {
        for _ in 0..max_ticks {
            if run.is_done() {
                return;
            }
            world.advance_tick();
            run.tick_once(world);
        }
    }
}
