// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use gametest_runner::{
    geometry::BlockPos,
    list::{TestCase, TestCaseBuilder},
    reporter::{
        BatchListener, ListenerContext, Reporter, ReporterBuilder, ReporterOutput, SharedBuffer,
        StatusLevel, TestListener,
    },
    runner::{Batch, Scheduler, TestRun},
    world::{MemoryWorld, StructureTemplate},
};
use std::{
    cell::RefCell,
    mem,
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

/// A 3x2x3 template every fixture test runs in.
pub(crate) const TEMPLATE: &str = "platform";

pub(crate) fn test_init() {
    // Ignore the error if a subscriber was already installed by another test.
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub(crate) fn world() -> MemoryWorld {
    let mut world = MemoryWorld::new();
    world.add_template(
        TEMPLATE,
        StructureTemplate::new(BlockPos::new(3, 2, 3)).with_block(BlockPos::new(1, 0, 1), "lamp"),
    );
    world
}

/// The outcome of one attempt of a scripted test.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Outcome {
    Pass,
    Fail,
}

/// Builds a test whose attempts pass or fail in the given order. Attempts beyond the script
/// repeat its last outcome.
pub(crate) fn scripted(name: &str, script: &[Outcome]) -> TestCaseBuilder {
    let script = script.to_vec();
    let attempt = Arc::new(AtomicUsize::new(0));
    let mut builder = TestCase::builder(name, move |helper| {
        let index = attempt.fetch_add(1, Ordering::SeqCst);
        let outcome = script
            .get(index)
            .or(script.last())
            .copied()
            .unwrap_or(Outcome::Pass);
        match outcome {
            Outcome::Pass => {
                helper.succeed();
                Ok(())
            }
            Outcome::Fail => Err(helper.fail(format!("attempt {} failed", index + 1))),
        }
    });
    builder.set_template(TEMPLATE);
    builder
}

pub(crate) fn passing(name: &str, batch: &str) -> Arc<TestCase> {
    scripted(name, &[Outcome::Pass])
        .set_batch(batch)
        .build()
        .expect("valid test case")
}

pub(crate) fn failing(name: &str, batch: &str) -> Arc<TestCase> {
    scripted(name, &[Outcome::Fail])
        .set_batch(batch)
        .build()
        .expect("valid test case")
}

/// Returns a reporter writing to a fresh buffer.
pub(crate) fn buffered_reporter(level: StatusLevel) -> (Reporter, SharedBuffer) {
    let buffer = SharedBuffer::new();
    let reporter = ReporterBuilder::default()
        .set_status_level(level)
        .build(ReporterOutput::Buffer(buffer.clone()));
    (reporter, buffer)
}

/// Strips the bracketed durations from reporter output, which vary from run to run.
pub(crate) fn normalized_lines(buffer: &SharedBuffer) -> Vec<String> {
    buffer
        .contents()
        .lines()
        .map(|line| match (line.find('['), line.find("] ")) {
            (Some(start), Some(end)) if start < end => {
                format!("{}{}", &line[..start], &line[end + 2..])
            }
            _ => line.to_owned(),
        })
        .collect()
}

/// Starts the scheduler and ticks it until it stops.
pub(crate) fn run_to_completion(scheduler: &mut Scheduler<MemoryWorld>) {
    scheduler.start();
    drive(scheduler);
}

/// Ticks the scheduler until it stops.
pub(crate) fn drive(scheduler: &mut Scheduler<MemoryWorld>) {
    for _ in 0..10_000 {
        if scheduler.is_stopped() {
            return;
        }
        scheduler.world_mut().advance_tick();
        scheduler.tick();
    }
    panic!("scheduler didn't stop within 10000 ticks");
}

/// Records batch and test events as strings.
#[derive(Clone, Default)]
pub(crate) struct Events(Rc<RefCell<Vec<String>>>);

impl Events {
    pub(crate) fn take(&self) -> Vec<String> {
        mem::take(&mut *self.0.borrow_mut())
    }

    fn push(&self, event: String) {
        self.0.borrow_mut().push(event);
    }
}

impl BatchListener for Events {
    fn on_batch_starting(&mut self, batch: &Batch) {
        self.push(format!("start {batch}"));
    }

    fn on_batch_finished(&mut self, batch: &Batch) {
        self.push(format!("finish {batch}"));
    }
}

impl TestListener for Events {
    fn on_passed(&mut self, run: &TestRun, _cx: &mut ListenerContext<'_>) {
        self.push(format!("passed {} #{}", run.test_name(), run.attempt()));
    }

    fn on_failed(&mut self, run: &TestRun, _cx: &mut ListenerContext<'_>) {
        self.push(format!("failed {} #{}", run.test_name(), run.attempt()));
    }

    fn on_rerun_added(&mut self, previous: &TestRun, next: &TestRun, _cx: &mut ListenerContext<'_>) {
        self.push(format!(
            "rerun {} #{} -> #{}",
            next.test_name(),
            previous.attempt(),
            next.attempt()
        ));
    }
}
