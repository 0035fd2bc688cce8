// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prints out test statuses and decides whether a test gets another attempt.
//!
//! The main structure in this module is [`Reporter`].

use super::{
    ListenerContext, StatusLevel, SummaryDisplayer, TestListener,
    displayer::{DisplayBracketedDuration, Styles},
};
use crate::{
    errors::{AttemptsExhaustedError, PlacementError, RunFailure},
    helpers::plural,
    runner::{TestRun, TestRunState, TestRuns},
    world::Marker,
};
use owo_colors::{OwoColorize, Style};
use std::{
    cell::RefCell,
    fmt,
    io::{self, Write},
    rc::Rc,
};
use swrite::{SWrite, swrite};
use tracing::{debug, warn};

/// An in-memory buffer that reporter output can be written to and read back from.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything written so far, lossily decoded as UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

/// Where the reporter writes its output.
///
/// This is usually standard error, but can be an in-memory buffer for tests.
#[derive(Clone, Debug, Default)]
pub enum ReporterOutput {
    /// Write output to standard error.
    #[default]
    Stderr,

    /// Write output to a buffer.
    Buffer(SharedBuffer),
}

impl ReporterOutput {
    pub(super) fn write_line(&self, line: &str) {
        let res = match self {
            Self::Stderr => writeln!(io::stderr().lock(), "{line}"),
            Self::Buffer(buffer) => writeln!(buffer.0.borrow_mut(), "{line}"),
        };
        if let Err(error) = res {
            warn!(%error, "failed to write reporter output");
        }
    }
}

/// Reporter builder.
#[derive(Debug, Default)]
pub struct ReporterBuilder {
    should_colorize: bool,
    status_level: Option<StatusLevel>,
}

impl ReporterBuilder {
    /// Set to true if the reporter should colorize output.
    pub fn set_colorize(&mut self, should_colorize: bool) -> &mut Self {
        self.should_colorize = should_colorize;
        self
    }

    /// Sets the conditions under which test statuses are output. Defaults to
    /// [`StatusLevel::Pass`].
    pub fn set_status_level(&mut self, status_level: StatusLevel) -> &mut Self {
        self.status_level = Some(status_level);
        self
    }

    /// Creates a new reporter writing to `output`.
    pub fn build(&self, output: ReporterOutput) -> Reporter {
        Reporter {
            styles: self.styles(),
            status_level: self.status_level(),
            output,
        }
    }

    /// Creates a displayer for the end-of-run summary, writing to `output`.
    pub fn build_summary(&self, output: ReporterOutput) -> SummaryDisplayer {
        SummaryDisplayer::new(self.styles(), self.status_level(), output)
    }

    fn styles(&self) -> Styles {
        let mut styles = Styles::default();
        if self.should_colorize {
            styles.colorize();
        }
        styles
    }

    fn status_level(&self) -> StatusLevel {
        self.status_level.unwrap_or(StatusLevel::Pass)
    }
}

/// The default [`TestListener`].
///
/// The reporter renders a [`Marker`] at each test's origin and prints a status line for every
/// outcome. It requests another attempt for flaky tests that haven't yet reached their required
/// number of successes, and for tests whose retry policy allows one. A policy that halts on
/// failure repeats passing tests until one fails or the attempts run out; any other policy
/// retries failed tests.
#[derive(Debug)]
pub struct Reporter {
    styles: Styles,
    status_level: StatusLevel,
    output: ReporterOutput,
}

impl Reporter {
    fn write_status(
        &self,
        level: StatusLevel,
        status: &str,
        style: Style,
        run: &TestRun,
        suffix: impl fmt::Display,
    ) {
        if self.status_level < level {
            return;
        }

        let mut line = String::new();
        swrite!(
            line,
            "{:>12} {}{}{}",
            status.style(style),
            DisplayBracketedDuration(run.elapsed()),
            run.test_name().style(self.styles.test_name),
            suffix,
        );
        self.output.write_line(&line);
    }

    fn attempt_status(run: &TestRun, outcome: &str) -> String {
        if run.attempt() > 1 {
            format!("TRY {} {outcome}", run.attempt())
        } else {
            outcome.to_owned()
        }
    }

    fn attempts_exhausted(
        &self,
        run: &TestRun,
        attempts: u32,
        successes: u32,
        cx: &mut ListenerContext<'_>,
    ) {
        let case = run.case();
        let error = AttemptsExhaustedError {
            attempts,
            successes,
            required: case.required_successes(),
            max_attempts: case.max_attempts(),
        };
        cx.record_attempts_exhausted(run.id(), error.clone());
        self.finalize_failure(run, error.into());
    }

    fn finalize_failure(&self, run: &TestRun, failure: RunFailure) {
        let style = if run.case().is_required() {
            self.styles.fail
        } else {
            self.styles.skip
        };
        self.write_status(
            StatusLevel::Fail,
            &Self::attempt_status(run, "FAIL"),
            style,
            run,
            format_args!(": {failure}"),
        );
    }
}

/// Returns the number of attempts made so far for the run's test and how many of them passed.
fn attempt_counts(runs: &TestRuns, run: &TestRun) -> (u32, u32) {
    let successes = runs
        .chain(run.id())
        .into_iter()
        .take_while(|attempt| attempt.attempt() <= run.attempt())
        .filter(|attempt| attempt.state() == TestRunState::Passed)
        .count();
    (run.attempt(), successes as u32)
}

impl TestListener for Reporter {
    fn on_structure_loaded(&mut self, run: &TestRun, cx: &mut ListenerContext<'_>) {
        if let Some(origin) = run.origin() {
            cx.world().place_marker(origin, Marker::InProgress);
            self.write_status(
                StatusLevel::All,
                "PLACED",
                self.styles.count,
                run,
                format_args!(" at {origin}"),
            );
        }
    }

    fn on_passed(&mut self, run: &TestRun, cx: &mut ListenerContext<'_>) {
        if let Some(origin) = run.origin() {
            cx.world().place_marker(origin, Marker::Passed);
        }

        let case = run.case();
        let (attempts, successes) = attempt_counts(cx.runs(), run);
        if case.is_flaky() && successes < case.required_successes() {
            if attempts < case.max_attempts() {
                debug!(
                    test_name = run.test_name(),
                    attempts, successes, "flaky test passed, running again"
                );
                self.write_status(
                    StatusLevel::Retry,
                    &format!("TRY {attempts} PASS"),
                    self.styles.retry,
                    run,
                    format_args!(
                        " ({successes} of {} required successes)",
                        case.required_successes()
                    ),
                );
                cx.request_rerun(run.id());
            } else {
                self.attempts_exhausted(run, attempts, successes, cx);
            }
            return;
        }

        let policy = run.retry_policy();
        if !case.is_flaky()
            && policy.halt_on_failure()
            && policy.has_retries()
            && policy.has_attempts_left(attempts, successes)
        {
            debug!(
                test_name = run.test_name(),
                attempts, "test passed, repeating until it fails"
            );
            let suffix = match policy.max_attempts() {
                Some(max) => {
                    let left = max.saturating_sub(attempts);
                    format!(" ({left} {} left)", plural::attempts_str(left))
                }
                None => String::new(),
            };
            self.write_status(
                StatusLevel::Retry,
                &format!("TRY {attempts} PASS"),
                self.styles.retry,
                run,
                suffix,
            );
            cx.request_rerun(run.id());
            return;
        }

        self.write_status(
            StatusLevel::Pass,
            &Self::attempt_status(run, "PASS"),
            self.styles.pass,
            run,
            "",
        );
    }

    fn on_failed(&mut self, run: &TestRun, cx: &mut ListenerContext<'_>) {
        let case = run.case();
        if let Some(origin) = run.origin() {
            let marker = if case.is_required() {
                Marker::FailedRequired
            } else {
                Marker::FailedOptional
            };
            cx.world().place_marker(origin, marker);
        }

        let error = match run.error() {
            Some(error) => error.clone(),
            None => panic!(
                "illegal state transition: `{}` failed without an error",
                run.test_name()
            ),
        };
        let (attempts, successes) = attempt_counts(cx.runs(), run);

        let rerun = if case.is_flaky() {
            let remaining = (case.max_attempts() + successes).saturating_sub(attempts);
            if remaining < case.required_successes() {
                self.attempts_exhausted(run, attempts, successes, cx);
                return;
            }
            true
        } else {
            run.retry_policy().has_retries()
                && run.retry_policy().has_attempts_left(attempts, successes)
        };

        if rerun {
            debug!(
                test_name = run.test_name(),
                attempts, successes, "test failed, running again"
            );
            self.write_status(
                StatusLevel::Retry,
                &format!("TRY {attempts} FAIL"),
                self.styles.retry,
                run,
                format_args!(": {error}"),
            );
            cx.request_rerun(run.id());
        } else {
            self.finalize_failure(run, error.into());
        }
    }

    fn on_rerun_added(&mut self, previous: &TestRun, next: &TestRun, _cx: &mut ListenerContext<'_>) {
        debug!(
            test_name = next.test_name(),
            previous = %previous.id(),
            next = %next.id(),
            attempt = next.attempt(),
            "rerun added"
        );
    }

    fn on_placement_failed(
        &mut self,
        run: &TestRun,
        error: &PlacementError,
        _cx: &mut ListenerContext<'_>,
    ) {
        self.write_status(
            StatusLevel::Fail,
            "NOT PLACED",
            self.styles.fail,
            run,
            format_args!(": {error}"),
        );
    }
}
