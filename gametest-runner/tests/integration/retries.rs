// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use gametest_runner::{
    config::RetryPolicy,
    errors::{AttemptsExhaustedError, GameTestError},
    reporter::StatusLevel,
    runner::{RunSpec, SchedulerBuilder, TestRunState},
};
use pretty_assertions::assert_eq;
use test_case::test_case;

#[test]
fn retry_policy_reruns_until_pass() {
    test_init();

    let (reporter, buffer) = buffered_reporter(StatusLevel::Pass);
    let events = Events::default();
    let case = scripted("hopper", &[Outcome::Fail, Outcome::Fail, Outcome::Pass])
        .build()
        .expect("valid test case");
    let mut builder = SchedulerBuilder::from_cases([case]);
    builder
        .set_retry_policy(RetryPolicy::new(3, false))
        .add_test_listener(Box::new(reporter))
        .add_test_listener(Box::new(events.clone()))
        .add_batch_listener(Box::new(events.clone()));
    let mut scheduler = builder.build(world());
    run_to_completion(&mut scheduler);

    assert_eq!(
        normalized_lines(&buffer),
        vec![
            "  TRY 1 FAIL hopper: attempt 1 failed",
            "  TRY 2 FAIL hopper: attempt 2 failed",
            "  TRY 3 PASS hopper",
        ]
    );
    assert_eq!(
        events.take(),
        vec![
            "start defaultBatch:0",
            "failed hopper #1",
            "rerun hopper #1 -> #2",
            "finish defaultBatch:0",
            "start defaultBatch:0",
            "failed hopper #2",
            "rerun hopper #2 -> #3",
            "finish defaultBatch:0",
            "start defaultBatch:0",
            "passed hopper #3",
            "finish defaultBatch:0",
        ]
    );

    assert_eq!(scheduler.runs().len(), 3);
    let first = scheduler.runs().iter().next().expect("first attempt");
    let chain: Vec<_> = scheduler
        .runs()
        .chain(first.id())
        .iter()
        .map(|run| (run.attempt(), run.state()))
        .collect();
    assert_eq!(
        chain,
        vec![
            (1, TestRunState::Failed),
            (2, TestRunState::Failed),
            (3, TestRunState::Passed),
        ]
    );

    // Only the latest attempt is tracked.
    let summary = scheduler.tracker().summary();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.passed, 1);
    assert!(summary.is_success());
}

#[test]
fn halt_on_failure_policy_stops_after_first_failure() {
    test_init();

    let (reporter, buffer) = buffered_reporter(StatusLevel::Retry);
    let case = scripted("hopper", &[Outcome::Fail, Outcome::Pass])
        .build()
        .expect("valid test case");
    let mut builder = SchedulerBuilder::from_runs([
        RunSpec::new(case).with_retry_policy(RetryPolicy::new(3, true))
    ]);
    builder.add_test_listener(Box::new(reporter));
    let mut scheduler = builder.build(world());
    run_to_completion(&mut scheduler);

    assert_eq!(
        normalized_lines(&buffer),
        vec!["        FAIL hopper: attempt 1 failed"]
    );
    assert_eq!(scheduler.runs().len(), 1);
    assert_eq!(scheduler.tracker().summary().failed_required, vec!["hopper"]);
}

#[test]
fn halt_on_failure_policy_repeats_until_failure() {
    test_init();

    let (reporter, buffer) = buffered_reporter(StatusLevel::Retry);
    let case = scripted(
        "dropper",
        &[Outcome::Pass, Outcome::Pass, Outcome::Fail, Outcome::Pass],
    )
    .build()
    .expect("valid test case");
    let mut builder = SchedulerBuilder::from_runs([
        RunSpec::new(case).with_retry_policy(RetryPolicy::new(5, true))
    ]);
    builder.add_test_listener(Box::new(reporter));
    let mut scheduler = builder.build(world());
    run_to_completion(&mut scheduler);

    assert_eq!(
        normalized_lines(&buffer),
        vec![
            "  TRY 1 PASS dropper (4 attempts left)",
            "  TRY 2 PASS dropper (3 attempts left)",
            "  TRY 3 FAIL dropper: attempt 3 failed",
        ]
    );
    assert_eq!(scheduler.runs().len(), 3);
    assert_eq!(scheduler.tracker().summary().failed_required, vec!["dropper"]);
}

#[test]
fn flaky_test_reaches_required_successes() {
    test_init();

    let (reporter, buffer) = buffered_reporter(StatusLevel::Pass);
    let case = scripted("piston", &[Outcome::Pass, Outcome::Fail, Outcome::Pass])
        .set_attempts(3, 2)
        .build()
        .expect("valid test case");
    let mut builder = SchedulerBuilder::from_cases([case]);
    builder.add_test_listener(Box::new(reporter));
    let mut scheduler = builder.build(world());
    run_to_completion(&mut scheduler);

    assert_eq!(
        normalized_lines(&buffer),
        vec![
            "  TRY 1 PASS piston (1 of 2 required successes)",
            "  TRY 2 FAIL piston: attempt 2 failed",
            "  TRY 3 PASS piston",
        ]
    );
    assert_eq!(scheduler.runs().len(), 3);
    assert!(scheduler.tracker().summary().is_success());
}

#[test_case(&[Outcome::Pass, Outcome::Fail], 5, 1 ; "one success then failures")]
#[test_case(&[Outcome::Fail], 4, 0 ; "failures only")]
fn flaky_test_runs_out_of_attempts(script: &[Outcome], attempts: u32, successes: u32) {
    test_init();

    let (reporter, buffer) = buffered_reporter(StatusLevel::Fail);
    let case = scripted("comparator", script)
        .set_attempts(5, 2)
        .build()
        .expect("valid test case");
    let mut builder = SchedulerBuilder::from_cases([case]);
    builder.add_test_listener(Box::new(reporter));
    let mut scheduler = builder.build(world());
    run_to_completion(&mut scheduler);

    assert_eq!(scheduler.runs().len(), attempts as usize);
    let exhausted = AttemptsExhaustedError {
        attempts,
        successes,
        required: 2,
        max_attempts: 5,
    };
    assert_eq!(
        normalized_lines(&buffer),
        vec![format!("  TRY {attempts} FAIL comparator: {exhausted}")]
    );
    let summary = scheduler.tracker().summary();
    assert_eq!(summary.failed_required, vec!["comparator"]);
    assert_eq!(summary.attempts_exhausted, vec!["comparator"]);
    let last = scheduler.runs().iter().last().expect("at least one attempt");
    assert_eq!(last.attempts_exhausted(), Some(&exhausted));
}

#[test]
fn rerun_prevents_halt() {
    test_init();

    let (reporter, _buffer) = buffered_reporter(StatusLevel::None);
    let events = Events::default();
    let flaky = scripted("observer", &[Outcome::Fail, Outcome::Pass])
        .set_batch("first")
        .build()
        .expect("valid test case");
    let mut builder = SchedulerBuilder::from_cases([flaky, passing("later", "second")]);
    builder
        .set_halt_on_error(true)
        .set_retry_policy(RetryPolicy::new(2, false))
        .add_test_listener(Box::new(reporter))
        .add_batch_listener(Box::new(events.clone()));
    let mut scheduler = builder.build(world());
    run_to_completion(&mut scheduler);

    assert!(!scheduler.is_halted());
    // The rerun waits until every original batch is done.
    assert_eq!(
        events.take(),
        vec![
            "start first:0",
            "finish first:0",
            "start second:0",
            "finish second:0",
            "start first:0",
            "finish first:0",
        ]
    );
    let summary = scheduler.tracker().summary();
    assert_eq!(summary.passed, 2);
    assert!(summary.is_success());
}

#[test]
fn manual_rerun_after_stop() {
    test_init();

    let events = Events::default();
    let case = scripted("dropper", &[Outcome::Fail, Outcome::Pass])
        .build()
        .expect("valid test case");
    let mut builder = SchedulerBuilder::from_cases([case]);
    builder.add_test_listener(Box::new(events.clone()));
    let mut scheduler = builder.build(world());
    run_to_completion(&mut scheduler);

    let first = scheduler.runs().iter().next().expect("first attempt").id();
    assert_eq!(scheduler.runs()[first].state(), TestRunState::Failed);
    assert!(matches!(
        scheduler.runs()[first].error(),
        Some(GameTestError::Assertion { .. })
    ));
    assert!(!scheduler.tracker().summary().is_success());

    let second = scheduler.rerun_test(first);
    assert!(!scheduler.is_stopped());
    drive(&mut scheduler);

    assert_eq!(scheduler.runs()[second].attempt(), 2);
    assert_eq!(scheduler.runs()[second].previous(), Some(first));
    assert_eq!(scheduler.runs()[second].state(), TestRunState::Passed);
    assert_eq!(
        events.take(),
        vec![
            "failed dropper #1",
            "rerun dropper #1 -> #2",
            "passed dropper #2",
        ]
    );
    assert!(scheduler.tracker().summary().is_success());
}
