// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use gametest_runner::{
    config::{GameTestConfig, GridLayout, RetryPolicy},
    errors::FindTestsError,
    geometry::BlockPos,
    list::TestRegistry,
    reporter::{RememberFailures, StatusLevel},
    runner::SchedulerBuilder,
    test_filter::{TestFinder, TestSelector},
};
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::{collections::BTreeSet, fs, num::NonZeroU32};

fn temp_workspace(config_contents: &str) -> Utf8TempDir {
    let temp_dir = camino_tempfile::tempdir().expect("error creating temp dir");
    let config_path = temp_dir.path().join(GameTestConfig::CONFIG_PATH);
    fs::create_dir_all(config_path.parent().expect("config path has a parent"))
        .expect("error creating config dir");
    fs::write(&config_path, config_contents).expect("error writing config file");
    temp_dir
}

fn registry() -> TestRegistry {
    let mut registry = TestRegistry::new();
    for case in [
        passing("lamp", "redstone"),
        failing("door", "redstone"),
        failing("chest", "items"),
        passing("hopper", "items"),
    ] {
        registry.register(case).expect("unique name");
    }
    registry
}

#[test]
fn profile_settings_reach_the_scheduler() {
    test_init();

    let workspace = temp_workspace(indoc! {r#"
        [profile.ci]
        batch-size = 1
        retries = 2
        status-level = "retry"

        [profile.ci.grid]
        origin = [100, 64, -100]
        tests-per-row = 1
    "#});
    let config =
        GameTestConfig::from_sources(workspace.path(), None).expect("config is valid");
    let profile = config.profile("ci").expect("ci profile exists");

    assert_eq!(profile.retries(), RetryPolicy::new(2, false));
    assert_eq!(profile.status_level(), StatusLevel::Retry);
    assert!(!profile.halt_on_error());
    assert_eq!(
        profile.grid(),
        GridLayout::new(BlockPos::new(100, 64, -100))
            .with_tests_per_row(NonZeroU32::new(1).expect("non-zero"))
    );

    let registry = registry();
    let cases = TestFinder::new(&registry)
        .find_cases(&TestSelector::Batch("redstone".to_owned()))
        .expect("batch exists");
    let mut builder = SchedulerBuilder::from_cases(cases);
    builder.apply_profile(&profile);
    let mut scheduler = builder.build(world());
    run_to_completion(&mut scheduler);

    let batch_ids: Vec<_> = scheduler.batches().iter().map(|batch| batch.id()).collect();
    assert_eq!(batch_ids, vec!["redstone:0", "redstone:1"]);
    let origins: Vec<_> = scheduler.runs().iter().map(|run| run.origin()).collect();
    assert_eq!(
        origins,
        vec![
            Some(BlockPos::new(100, 64, -100)),
            Some(BlockPos::new(100, 64, -100)),
        ]
    );
}

#[test]
fn integer_retries_rerun_failed_tests() {
    test_init();

    let workspace = temp_workspace(indoc! {r#"
        [profile.default]
        retries = 3
    "#});
    let config =
        GameTestConfig::from_sources(workspace.path(), None).expect("config is valid");
    let profile = config
        .profile(GameTestConfig::DEFAULT_PROFILE)
        .expect("default profile exists");

    let (reporter, buffer) = buffered_reporter(StatusLevel::Pass);
    let case = scripted("hopper", &[Outcome::Fail, Outcome::Pass])
        .build()
        .expect("valid test case");
    let mut builder = SchedulerBuilder::from_cases([case]);
    builder
        .apply_profile(&profile)
        .add_test_listener(Box::new(reporter));
    let mut scheduler = builder.build(world());
    run_to_completion(&mut scheduler);

    assert_eq!(
        normalized_lines(&buffer),
        vec!["  TRY 1 FAIL hopper: attempt 1 failed", "  TRY 2 PASS hopper"]
    );
    assert_eq!(scheduler.runs().len(), 2);
    assert!(scheduler.tracker().summary().is_success());
}

#[test]
fn failed_tests_are_remembered_across_runs() {
    test_init();

    let workspace = temp_workspace("");
    let config =
        GameTestConfig::from_sources(workspace.path(), None).expect("config is valid");
    let profile = config
        .profile(GameTestConfig::DEFAULT_PROFILE)
        .expect("default profile exists");
    let store = profile.last_failed_store();
    assert_eq!(
        store.path(),
        workspace
            .path()
            .join("target/gametest/default-last-failed.json")
            .as_path()
    );

    // First run: everything.
    let mut registry = registry();
    let finder = TestFinder::new(&registry);
    assert_eq!(
        finder.find_cases(&TestSelector::LastFailed).map(|cases| cases.len()),
        Err(FindTestsError::NoFailedTests)
    );
    let cases = finder.find_cases(&TestSelector::All).expect("tests exist");

    let remember = RememberFailures::new();
    let mut builder = SchedulerBuilder::from_cases(cases);
    builder
        .apply_profile(&profile)
        .add_failure_listener(remember.failure_listener());
    let mut scheduler = builder.build(world());
    run_to_completion(&mut scheduler);

    assert_eq!(
        remember.failed_tests(),
        BTreeSet::from(["chest".to_owned(), "door".to_owned()])
    );
    store
        .save(&remember.snapshot(profile.name()))
        .expect("snapshot saved");
    remember.apply_to(&mut registry);
    assert_eq!(registry.last_failed().count(), 2);

    // Second run, in a fresh process: only what failed last time.
    let mut registry = self::registry();
    assert_eq!(store.load_into(&mut registry).expect("snapshot loaded"), 2);
    let cases = TestFinder::new(&registry)
        .find_cases(&TestSelector::LastFailed)
        .expect("failed tests were remembered");
    let names: Vec<_> = cases.iter().map(|case| case.name()).collect();
    // Registration order, not alphabetical.
    assert_eq!(names, vec!["door", "chest"]);

    let snapshot = store.load().expect("loaded").expect("snapshot exists");
    assert_eq!(snapshot.profile_name, "default");
}

#[test]
fn unknown_profile_is_an_error() {
    let config = GameTestConfig::default_config("/nonexistent");
    let error = config.profile("nightly").expect_err("nightly isn't defined");
    assert_eq!(
        error.to_string(),
        "profile `nightly` not found (known profiles: default)"
    );
}

#[test]
fn invalid_config_is_an_error() {
    let workspace = temp_workspace(indoc! {r#"
        [profile.default]
        batch-size = 0
    "#});
    let error = GameTestConfig::from_sources(workspace.path(), None)
        .expect_err("batch size must be non-zero");
    assert!(
        error.to_string().contains(".config/gametest.toml"),
        "error names the config file: {error}"
    );
}
