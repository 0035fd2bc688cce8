// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    Batch, Batcher, ChunkedBatcher, FailureListener, GridSpawner, InPlaceSpawner,
    OutcomeTracker, StructureSpawner, TestRunId, TestRuns, TrackerListener,
};
use crate::{
    config::{GameTestProfile, GridLayout, RetryPolicy},
    errors::PlacementError,
    geometry::{BlockPos, BoundingBox, Rotation},
    list::{BatchHookMap, BatchHooks, TestCase},
    reporter::{BatchListener, ListenerContext, ListenerId, ListenerRequests, TestListener},
    world::World,
};
use debug_ignore::DebugIgnore;
use std::{mem, num::NonZeroUsize, sync::Arc};
use tracing::{debug, info, warn};

/// A request to run a test case once.
#[derive(Clone, Debug)]
pub struct RunSpec {
    case: Arc<TestCase>,
    pinned: Option<(BlockPos, Rotation)>,
    retry_policy: Option<RetryPolicy>,
}

impl RunSpec {
    /// Creates a request for `case`, placed by the scheduler's grid.
    pub fn new(case: Arc<TestCase>) -> Self {
        Self {
            case,
            pinned: None,
            retry_policy: None,
        }
    }

    /// Runs the test at an existing structure instead of placing a new one.
    pub fn at(mut self, origin: BlockPos, rotation: Rotation) -> Self {
        self.pinned = Some((origin, rotation));
        self
    }

    /// Overrides the scheduler's default retry policy for this run.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    /// Returns the test case to run.
    pub fn case(&self) -> &Arc<TestCase> {
        &self.case
    }

    /// Returns the origin and rotation the run is pinned to, if any.
    pub fn pinned(&self) -> Option<(BlockPos, Rotation)> {
        self.pinned
    }
}

/// A batch assembled by the caller rather than by a [`Batcher`].
#[derive(Clone, Debug)]
pub struct BatchSpec {
    id: String,
    runs: Vec<RunSpec>,
    hooks: BatchHooks,
}

impl BatchSpec {
    /// Creates a batch with the given ID and runs, and no hooks.
    pub fn new(id: impl Into<String>, runs: Vec<RunSpec>) -> Self {
        Self {
            id: id.into(),
            runs,
            hooks: BatchHooks::default(),
        }
    }

    /// Sets the hooks run around the batch.
    pub fn with_hooks(mut self, hooks: BatchHooks) -> Self {
        self.hooks = hooks;
        self
    }
}

#[derive(Debug)]
enum SchedulerInput {
    Runs(Vec<RunSpec>),
    Batches(Vec<BatchSpec>),
}

/// Builder for a [`Scheduler`].
#[derive(Debug)]
pub struct SchedulerBuilder {
    input: SchedulerInput,
    new_structure_spawner: Option<DebugIgnore<Box<dyn StructureSpawner>>>,
    existing_structure_spawner: Option<DebugIgnore<Box<dyn StructureSpawner>>>,
    batcher: Option<DebugIgnore<Box<dyn Batcher>>>,
    batch_size: NonZeroUsize,
    grid: GridLayout,
    hooks: BatchHookMap,
    retry_policy: RetryPolicy,
    halt_on_error: bool,
    test_listeners: DebugIgnore<Vec<Box<dyn TestListener>>>,
    batch_listeners: DebugIgnore<Vec<Box<dyn BatchListener>>>,
    tracker_listeners: DebugIgnore<Vec<Box<dyn TrackerListener>>>,
    failure_listeners: DebugIgnore<Vec<FailureListener>>,
}

impl SchedulerBuilder {
    fn new(input: SchedulerInput) -> Self {
        Self {
            input,
            new_structure_spawner: None,
            existing_structure_spawner: None,
            batcher: None,
            batch_size: ChunkedBatcher::DEFAULT_SIZE,
            grid: GridLayout::default(),
            hooks: BatchHookMap::new(),
            retry_policy: RetryPolicy::no_retries(),
            halt_on_error: false,
            test_listeners: DebugIgnore(Vec::new()),
            batch_listeners: DebugIgnore(Vec::new()),
            tracker_listeners: DebugIgnore(Vec::new()),
            failure_listeners: DebugIgnore(Vec::new()),
        }
    }

    /// Runs every case once, each placed on the grid.
    pub fn from_cases(cases: impl IntoIterator<Item = Arc<TestCase>>) -> Self {
        Self::from_runs(cases.into_iter().map(RunSpec::new))
    }

    /// Runs every request once. The runs are split into batches by the builder's [`Batcher`].
    pub fn from_runs(runs: impl IntoIterator<Item = RunSpec>) -> Self {
        Self::new(SchedulerInput::Runs(runs.into_iter().collect()))
    }

    /// Runs the given batches, in order.
    pub fn from_batches(batches: impl IntoIterator<Item = BatchSpec>) -> Self {
        Self::new(SchedulerInput::Batches(batches.into_iter().collect()))
    }

    /// Sets the spawner for runs without an origin. Defaults to a [`GridSpawner`] using the
    /// builder's grid layout.
    pub fn set_new_structure_spawner(&mut self, spawner: Box<dyn StructureSpawner>) -> &mut Self {
        self.new_structure_spawner = Some(DebugIgnore(spawner));
        self
    }

    /// Sets the spawner for runs pinned to an origin. Defaults to an [`InPlaceSpawner`].
    pub fn set_existing_structure_spawner(
        &mut self,
        spawner: Box<dyn StructureSpawner>,
    ) -> &mut Self {
        self.existing_structure_spawner = Some(DebugIgnore(spawner));
        self
    }

    /// Sets the batcher. Defaults to a [`ChunkedBatcher`] using the builder's batch size.
    pub fn set_batcher(&mut self, batcher: Box<dyn Batcher>) -> &mut Self {
        self.batcher = Some(DebugIgnore(batcher));
        self
    }

    /// Sets the maximum number of runs in a batch.
    pub fn set_batch_size(&mut self, batch_size: NonZeroUsize) -> &mut Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the grid layout used by the default spawner.
    pub fn set_grid(&mut self, grid: GridLayout) -> &mut Self {
        self.grid = grid;
        self
    }

    /// Sets the hooks attached to batches made by the batcher.
    pub fn set_batch_hooks(&mut self, hooks: BatchHookMap) -> &mut Self {
        self.hooks = hooks;
        self
    }

    /// Sets the retry policy for runs that don't specify one.
    pub fn set_retry_policy(&mut self, retry_policy: RetryPolicy) -> &mut Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sets whether a required test failure stops the scheduler.
    pub fn set_halt_on_error(&mut self, halt_on_error: bool) -> &mut Self {
        self.halt_on_error = halt_on_error;
        self
    }

    /// Adds a listener attached to every run.
    pub fn add_test_listener(&mut self, listener: Box<dyn TestListener>) -> &mut Self {
        self.test_listeners.push(listener);
        self
    }

    /// Adds a listener for batch events.
    pub fn add_batch_listener(&mut self, listener: Box<dyn BatchListener>) -> &mut Self {
        self.batch_listeners.push(listener);
        self
    }

    /// Adds a listener to the scheduler's overall tracker.
    pub fn add_tracker_listener(&mut self, listener: Box<dyn TrackerListener>) -> &mut Self {
        self.tracker_listeners.push(listener);
        self
    }

    /// Adds a listener called with every test case whose final attempt failed.
    pub fn add_failure_listener(&mut self, listener: FailureListener) -> &mut Self {
        self.failure_listeners.push(listener);
        self
    }

    /// Applies the batch size, halt policy, retry policy and grid layout of a profile.
    pub fn apply_profile(&mut self, profile: &GameTestProfile<'_>) -> &mut Self {
        self.batch_size = profile.batch_size();
        self.halt_on_error = profile.halt_on_error();
        self.retry_policy = profile.retries();
        self.grid = profile.grid();
        self
    }

    /// Creates the scheduler. Nothing runs until [`Scheduler::start`] is called.
    pub fn build<W: World>(self, world: W) -> Scheduler<W> {
        let Self {
            input,
            new_structure_spawner,
            existing_structure_spawner,
            batcher,
            batch_size,
            grid,
            hooks,
            retry_policy,
            halt_on_error,
            test_listeners,
            batch_listeners,
            tracker_listeners,
            failure_listeners,
        } = self;

        let listener_ids: Vec<_> = (0..test_listeners.len()).map(ListenerId::new).collect();
        let mut runs = TestRuns::default();
        let mut create = |spec: RunSpec| {
            let id = runs.create(
                spec.case,
                spec.retry_policy.unwrap_or(retry_policy),
                spec.pinned,
            );
            for listener in &listener_ids {
                runs[id].add_listener(*listener);
            }
            id
        };

        let batcher = batcher.map_or_else(
            || Box::new(ChunkedBatcher::new(batch_size)) as Box<dyn Batcher>,
            |batcher| batcher.0,
        );
        let batches = match input {
            SchedulerInput::Runs(specs) => {
                let ids: Vec<_> = specs.into_iter().map(&mut create).collect();
                batcher.make_batches(&runs, ids, &hooks)
            }
            SchedulerInput::Batches(specs) => specs
                .into_iter()
                .map(|spec| {
                    let batch_name = spec
                        .runs
                        .first()
                        .map_or_else(|| spec.id.clone(), |run| run.case.batch_name().to_owned());
                    let ids = spec.runs.into_iter().map(&mut create).collect();
                    Batch::new(spec.id, batch_name, ids, spec.hooks)
                })
                .collect(),
        };

        let mut tracker = OutcomeTracker::new();
        for run in runs.iter() {
            tracker.add(run);
        }
        for listener in tracker_listeners.0 {
            tracker.add_listener(listener);
        }
        for listener in failure_listeners.0 {
            tracker.add_failure_listener(listener);
        }

        debug!(
            runs = runs.len(),
            batches = batches.len(),
            halt_on_error,
            "built scheduler"
        );

        Scheduler {
            world,
            runs,
            listeners: test_listeners.0,
            batch_listeners: batch_listeners.0,
            batches,
            current_batch: None,
            batch_tracker: OutcomeTracker::new(),
            batch_regions: Vec::new(),
            ticking: Vec::new(),
            rerun_queue: Vec::new(),
            tracker,
            new_structure_spawner: new_structure_spawner
                .map_or_else(
                    || Box::new(GridSpawner::new(grid)) as Box<dyn StructureSpawner>,
                    |spawner| spawner.0,
                ),
            existing_structure_spawner: existing_structure_spawner
                .map_or_else(
                    || Box::new(InPlaceSpawner) as Box<dyn StructureSpawner>,
                    |spawner| spawner.0,
                ),
            batcher,
            hooks,
            halt_on_error,
            started: false,
            stopped: true,
            halted: false,
        }
    }
}

#[derive(Clone, Copy)]
enum RunEvent<'a> {
    StructureLoaded,
    Finished,
    PlacementFailed(&'a PlacementError),
    RerunAdded(TestRunId),
}

/// Runs batches of tests inside a [`World`], one host tick at a time.
///
/// The host calls [`tick`](Self::tick) once per simulated tick. Batches run strictly one after
/// another: a batch's structures are placed, its runs are ticked until every one of them has
/// finished, and then the next batch starts. Reruns requested along the way are collected and run
/// as extra batches once the last batch is done.
pub struct Scheduler<W> {
    world: W,
    runs: TestRuns,
    listeners: Vec<Box<dyn TestListener>>,
    batch_listeners: Vec<Box<dyn BatchListener>>,
    batches: Vec<Batch>,
    current_batch: Option<usize>,
    batch_tracker: OutcomeTracker,
    batch_regions: Vec<BoundingBox>,
    ticking: Vec<TestRunId>,
    rerun_queue: Vec<TestRunId>,
    tracker: OutcomeTracker,
    new_structure_spawner: Box<dyn StructureSpawner>,
    existing_structure_spawner: Box<dyn StructureSpawner>,
    batcher: Box<dyn Batcher>,
    hooks: BatchHookMap,
    halt_on_error: bool,
    started: bool,
    stopped: bool,
    halted: bool,
}

impl<W: World> Scheduler<W> {
    /// Starts the first batch. Only the first call has an effect.
    pub fn start(&mut self) {
        if mem::replace(&mut self.started, true) {
            debug!("scheduler already started");
            return;
        }
        info!(
            runs = self.runs.len(),
            batches = self.batches.len(),
            "starting test run"
        );
        self.stopped = false;
        self.halted = false;
        self.run_batch(0);
    }

    /// Advances every running test by one tick. Does nothing once the scheduler has stopped.
    pub fn tick(&mut self) {
        if self.stopped {
            return;
        }

        // Runs of a batch started during this tick begin ticking on the next one.
        let ticking = self.ticking.clone();
        for id in ticking {
            if self.stopped {
                break;
            }
            let run = &mut self.runs[id];
            if run.is_done() {
                continue;
            }
            run.tick_once(&mut self.world);
            if run.is_done() {
                self.on_run_finished(id);
            }
        }

        let runs = &self.runs;
        self.ticking.retain(|id| !runs[*id].is_done());
    }

    /// Stops the scheduler, running the current batch's after hook and releasing its chunks.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        info!("stopping test run");
        self.finish_batch();
        self.stopped = true;
        self.current_batch = None;
        self.ticking.clear();
    }

    /// Creates a new attempt of `run` and queues it.
    ///
    /// The new run keeps the case, retry policy and listeners of `run`, and takes its place in
    /// the overall tracker. Queued runs start once the last batch is done, or right away if the
    /// scheduler has already run and stopped.
    ///
    /// # Panics
    ///
    /// Panics if `run` already has a rerun.
    pub fn rerun_test(&mut self, run: TestRunId) -> TestRunId {
        let next = self.runs.copy_reset(run);
        info!(
            test_name = self.runs[next].test_name(),
            attempt = self.runs[next].attempt(),
            "queued rerun"
        );
        self.dispatch(run, RunEvent::RerunAdded(next));
        self.tracker.replace(run, &self.runs[next]);
        self.rerun_queue.push(next);

        if self.started && self.stopped {
            self.stopped = false;
            self.halted = false;
            self.run_batch(self.batches.len());
        }
        next
    }

    /// Adds a listener and attaches it to every run created so far and their future reruns.
    pub fn add_test_listener(&mut self, listener: Box<dyn TestListener>) -> ListenerId {
        let id = ListenerId::new(self.listeners.len());
        self.listeners.push(listener);
        let ids: Vec<_> = self.runs.iter().map(|run| run.id()).collect();
        for run in ids {
            self.runs[run].add_listener(id);
        }
        id
    }

    /// Adds a listener for batch events.
    pub fn add_batch_listener(&mut self, listener: Box<dyn BatchListener>) {
        self.batch_listeners.push(listener);
    }

    // ---
    // Accessors
    // ---

    /// Returns the world.
    pub fn world(&self) -> &W {
        &self.world
    }

    /// Returns the world mutably, for the host to advance it between ticks.
    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    /// Consumes the scheduler and returns the world.
    pub fn into_world(self) -> W {
        self.world
    }

    /// Returns every run created so far, including superseded attempts.
    pub fn runs(&self) -> &TestRuns {
        &self.runs
    }

    /// Returns the tracker over every test's latest attempt.
    pub fn tracker(&self) -> &OutcomeTracker {
        &self.tracker
    }

    /// Returns the tracker over the current batch.
    pub fn batch_tracker(&self) -> &OutcomeTracker {
        &self.batch_tracker
    }

    /// Returns the batches of the current pass.
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Returns the batch being run, if any.
    pub fn current_batch(&self) -> Option<&Batch> {
        self.current_batch.map(|index| &self.batches[index])
    }

    /// Returns the runs waiting for the next rerun pass.
    pub fn rerun_queue(&self) -> &[TestRunId] {
        &self.rerun_queue
    }

    /// Returns true if the scheduler isn't running anything.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Returns true if the scheduler stopped because a required test failed.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    // ---
    // Helper methods
    // ---

    fn run_batch(&mut self, mut index: usize) {
        loop {
            if index >= self.batches.len() {
                if self.rerun_queue.is_empty() {
                    info!(summary = %self.tracker.summary(), "test run finished");
                    self.current_batch = None;
                    self.stopped = true;
                    return;
                }
                let queue = mem::take(&mut self.rerun_queue);
                info!(reruns = queue.len(), "running queued reruns");
                self.batches = self.batcher.make_batches(&self.runs, queue, &self.hooks);
                index = 0;
                continue;
            }

            if self.start_batch(index) {
                return;
            }

            // Nothing in the batch could be placed.
            self.finish_batch();
            index += 1;
        }
    }

    /// Places and starts a batch. Returns false if no run in it could be placed.
    fn start_batch(&mut self, index: usize) -> bool {
        self.current_batch = Some(index);
        let batch = &self.batches[index];
        info!(batch = batch.id(), runs = batch.runs().len(), "starting batch");
        for listener in &mut self.batch_listeners {
            listener.on_batch_starting(batch);
        }

        self.new_structure_spawner.on_batch_start(&mut self.world);
        self.existing_structure_spawner
            .on_batch_start(&mut self.world);

        let mut placed = Vec::new();
        for id in self.batches[index].runs().to_vec() {
            let run = &mut self.runs[id];
            let spawner = if run.origin().is_some() {
                &mut self.existing_structure_spawner
            } else {
                &mut self.new_structure_spawner
            };
            match spawner.spawn(run, &mut self.world) {
                Ok(bounds) => {
                    self.world.set_chunks_forced(&bounds, true);
                    self.batch_regions.push(bounds);
                    placed.push(id);
                    self.dispatch(id, RunEvent::StructureLoaded);
                }
                Err(error) => {
                    warn!(
                        test_name = run.test_name(),
                        batch = self.batches[index].id(),
                        %error,
                        "failed to place test structure"
                    );
                    self.tracker.forget(id);
                    self.dispatch(id, RunEvent::PlacementFailed(&error));
                }
            }
        }
        self.batches[index].retain_runs(|id| placed.contains(id));

        self.batches[index].hooks().run_before(&mut self.world);

        self.batch_tracker = OutcomeTracker::new();
        for id in &placed {
            let run = &mut self.runs[*id];
            run.start_execution();
            self.batch_tracker.add(run);
            self.tracker.record(run);
        }
        let started = !placed.is_empty();
        self.ticking = placed;
        started
    }

    fn finish_batch(&mut self) {
        let Some(index) = self.current_batch else {
            return;
        };
        let batch = &self.batches[index];
        batch.hooks().run_after(&mut self.world);
        for bounds in self.batch_regions.drain(..) {
            self.world.set_chunks_forced(&bounds, false);
        }
        for listener in &mut self.batch_listeners {
            listener.on_batch_finished(batch);
        }
        info!(
            batch = batch.id(),
            progress = %self.batch_tracker.progress_bar(),
            "finished batch"
        );
    }

    fn on_run_finished(&mut self, id: TestRunId) {
        self.dispatch(id, RunEvent::Finished);

        let run = &self.runs[id];
        self.batch_tracker.record(run);
        self.tracker.record(run);

        if self.halt_on_error
            && run.state().is_failure()
            && run.case().is_required()
            && run.rerun().is_none()
        {
            self.halt(id);
            return;
        }

        if self.batch_tracker.is_done() {
            let next = self.current_batch.map_or(0, |index| index + 1);
            self.finish_batch();
            self.run_batch(next);
        }
    }

    fn halt(&mut self, id: TestRunId) {
        warn!(
            test_name = self.runs[id].test_name(),
            batch = self.current_batch().map(|batch| batch.id()),
            "required test failed, halting"
        );
        self.finish_batch();
        self.world.release_forced_chunks();
        self.stopped = true;
        self.halted = true;
        self.current_batch = None;
        self.ticking.clear();
    }

    fn dispatch(&mut self, id: TestRunId, event: RunEvent<'_>) {
        let mut requests = ListenerRequests::default();
        {
            let run = &self.runs[id];
            let mut cx = ListenerContext::new(&mut self.world, &self.runs, &mut requests);
            for listener_id in run.listeners() {
                let listener = &mut self.listeners[listener_id.index()];
                match event {
                    RunEvent::StructureLoaded => listener.on_structure_loaded(run, &mut cx),
                    RunEvent::Finished if run.state().is_failure() => {
                        listener.on_failed(run, &mut cx)
                    }
                    RunEvent::Finished => listener.on_passed(run, &mut cx),
                    RunEvent::PlacementFailed(error) => {
                        listener.on_placement_failed(run, error, &mut cx)
                    }
                    RunEvent::RerunAdded(next) => {
                        listener.on_rerun_added(run, &self.runs[next], &mut cx)
                    }
                }
            }
        }

        for (run, error) in requests.attempts_exhausted {
            self.runs[run].set_attempts_exhausted(error);
        }
        for rerun in requests.reruns {
            if self.runs[rerun].rerun().is_some() {
                debug!(run = %rerun, "ignoring duplicate rerun request");
                continue;
            }
            self.rerun_test(rerun);
        }
    }
}
