// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use gametest_runner::{
    config::GridLayout,
    errors::GameTestError,
    geometry::{BlockPos, BoundingBox},
    list::{BatchHookMap, TestCase},
    reporter::{ReporterBuilder, ReporterOutput, SharedBuffer, StatusLevel},
    runner::{RunSpec, Scheduler, SchedulerBuilder, TestRunState},
    world::{Marker, MemoryWorld, StructurePlacement, World},
};
use pretty_assertions::assert_eq;
use std::{
    num::{NonZeroU32, NonZeroUsize},
    sync::Arc,
};

#[test]
fn shared_batch_name_runs_first() {
    test_init();

    let events = Events::default();
    let mut builder = SchedulerBuilder::from_cases([
        passing("piston", "redstone"),
        passing("hopper", "items"),
        passing("repeater", "redstone"),
    ]);
    builder.add_batch_listener(Box::new(events.clone()));
    let mut scheduler = builder.build(world());
    run_to_completion(&mut scheduler);

    let batch_ids: Vec<_> = scheduler.batches().iter().map(|batch| batch.id()).collect();
    assert_eq!(batch_ids, vec!["redstone:0", "items:0"]);
    assert_eq!(scheduler.batches()[0].runs().len(), 2);
    assert_eq!(
        events.take(),
        vec![
            "start redstone:0",
            "finish redstone:0",
            "start items:0",
            "finish items:0",
        ]
    );
    assert_eq!(scheduler.tracker().passed_count(), 3);
}

#[test]
fn oversized_group_is_chunked() {
    test_init();

    let cases: Vec<_> = (0..5)
        .map(|i| passing(&format!("t{i}"), "big"))
        .collect();
    let mut builder = SchedulerBuilder::from_cases(cases);
    builder.set_batch_size(NonZeroUsize::new(2).expect("non-zero"));
    let mut scheduler = builder.build(world());
    run_to_completion(&mut scheduler);

    let batch_ids: Vec<_> = scheduler.batches().iter().map(|batch| batch.id()).collect();
    assert_eq!(batch_ids, vec!["big:0", "big:1", "big:2"]);
    assert!(scheduler.tracker().summary().is_success());
}

#[test]
fn grid_rows_of_two() {
    test_init();

    let grid = GridLayout::new(BlockPos::ZERO)
        .with_tests_per_row(NonZeroU32::new(2).expect("non-zero"));
    let mut builder = SchedulerBuilder::from_cases([
        passing("a", "grid"),
        passing("b", "grid"),
        passing("c", "grid"),
    ]);
    builder.set_grid(grid);
    let mut scheduler = builder.build(world());
    run_to_completion(&mut scheduler);

    let origins: Vec<_> = scheduler
        .runs()
        .iter()
        .map(|run| run.origin().expect("placed"))
        .collect();
    // 3-wide footprints: 0 + 3 + 5 = 8, then a new row at z = 3 + 6.
    assert_eq!(
        origins,
        vec![
            BlockPos::new(0, 0, 0),
            BlockPos::new(8, 0, 0),
            BlockPos::new(0, 0, 9),
        ]
    );

    let bounds: Vec<_> = scheduler
        .runs()
        .iter()
        .map(|run| run.bounds().expect("placed"))
        .collect();
    for (i, a) in bounds.iter().enumerate() {
        for b in &bounds[i + 1..] {
            assert!(!a.intersects(b), "{a} overlaps {b}");
        }
    }
}

#[test]
fn previous_batch_is_cleared() {
    test_init();

    let mut scheduler =
        SchedulerBuilder::from_cases([passing("a", "first"), passing("b", "second")])
            .build(world());
    run_to_completion(&mut scheduler);

    let first_bounds = scheduler.runs().iter().next().and_then(|run| run.bounds());
    assert_eq!(
        scheduler.world().cleared_regions().first().copied(),
        first_bounds
    );
    // Both batches started at the grid origin.
    let origins: Vec<_> = scheduler.runs().iter().map(|run| run.origin()).collect();
    assert_eq!(origins, vec![Some(BlockPos::ZERO), Some(BlockPos::ZERO)]);
}

#[test]
fn halt_on_required_failure() {
    test_init();

    let events = Events::default();
    let mut hooks = BatchHookMap::new();
    hooks.set_after(
        "first",
        Arc::new(|world: &mut dyn World| world.set_block(BlockPos::new(0, -1, 0), "after_first")),
    );
    let mut builder = SchedulerBuilder::from_cases([
        failing("broken", "first"),
        passing("fine", "first"),
        passing("never", "second"),
    ]);
    builder
        .set_halt_on_error(true)
        .set_batch_hooks(hooks)
        .add_batch_listener(Box::new(events.clone()));
    let mut scheduler = builder.build(world());
    run_to_completion(&mut scheduler);

    assert!(scheduler.is_halted());
    assert!(scheduler.is_stopped());
    assert_eq!(events.take(), vec!["start first:0", "finish first:0"]);
    assert!(scheduler.world().forced_chunks().is_empty());
    assert_eq!(
        scheduler.world().block_at(BlockPos::new(0, -1, 0)),
        Some("after_first")
    );

    let state_of = |scheduler: &Scheduler<MemoryWorld>, name: &str| {
        scheduler
            .runs()
            .iter()
            .find(|run| run.test_name() == name)
            .map(|run| run.state())
            .expect("run exists")
    };
    assert_eq!(state_of(&scheduler, "never"), TestRunState::Created);
    // The halt interrupted the rest of the batch.
    assert_eq!(state_of(&scheduler, "fine"), TestRunState::Running);
    assert_eq!(scheduler.tracker().summary().in_progress, 2);

    // Ticking a halted scheduler does nothing.
    scheduler.tick();
    assert_eq!(state_of(&scheduler, "fine"), TestRunState::Running);
}

#[test]
fn optional_failure_does_not_halt() {
    test_init();

    let optional = scripted("optional", &[Outcome::Fail])
        .set_batch("first")
        .set_required(false)
        .build()
        .expect("valid test case");
    let mut builder =
        SchedulerBuilder::from_cases([optional, passing("later", "second")]);
    builder.set_halt_on_error(true);
    let mut scheduler = builder.build(world());
    run_to_completion(&mut scheduler);

    assert!(!scheduler.is_halted());
    let summary = scheduler.tracker().summary();
    assert_eq!(summary.passed, 1);
    assert_eq!(summary.failed_optional, vec!["optional"]);
    assert!(summary.is_success());
}

#[test]
fn reporter_and_summary_output() {
    test_init();

    let (reporter, buffer) = buffered_reporter(StatusLevel::Pass);
    let summary_buffer = SharedBuffer::new();
    let summary = ReporterBuilder::default()
        .set_status_level(StatusLevel::Pass)
        .build_summary(ReporterOutput::Buffer(summary_buffer.clone()));

    let mut builder = SchedulerBuilder::from_cases([
        passing("lamp", "defaultBatch"),
        failing("door", "defaultBatch"),
    ]);
    builder
        .add_test_listener(Box::new(reporter))
        .add_tracker_listener(Box::new(summary));
    let mut scheduler = builder.build(world());
    run_to_completion(&mut scheduler);

    assert_eq!(
        normalized_lines(&buffer),
        vec!["        PASS lamp", "        FAIL door: attempt 1 failed"]
    );
    assert_eq!(
        summary_buffer.contents(),
        "     Summary 2 tests run: 1 passed, 1 failed\n        FAIL door\n"
    );

    // Both structures were placed in the same batch, so both markers survive.
    let lamp = scheduler.runs().iter().next().expect("lamp ran");
    let door = scheduler.runs().iter().nth(1).expect("door ran");
    let lamp_origin = lamp.origin().expect("placed");
    let door_origin = door.origin().expect("placed");
    assert_eq!(scheduler.world().marker_at(lamp_origin), Some(Marker::Passed));
    assert_eq!(
        scheduler.world().marker_at(door_origin),
        Some(Marker::FailedRequired)
    );
}

#[test]
fn sequences_drive_world_changes() {
    test_init();

    let lamp = TestCase::builder("lamp_lights_up", |helper| {
        let lamp = BlockPos::new(1, 0, 1);
        helper.assert_block(lamp, "lamp")?;
        helper.run_after_delay(3, move |helper| {
            helper.set_block(lamp, "lit_lamp");
            Ok(())
        });
        helper.succeed_when(move |helper| helper.assert_block(lamp, "lit_lamp"));
        Ok(())
    })
    .set_template(TEMPLATE)
    .build()
    .expect("valid test case");

    let never_lit = TestCase::builder("never_lit", |helper| {
        helper.succeed_when(|helper| helper.assert_block(BlockPos::new(1, 0, 1), "lit_lamp"));
        Ok(())
    })
    .set_template(TEMPLATE)
    .set_timeout_ticks(10)
    .build()
    .expect("valid test case");

    let mut scheduler = SchedulerBuilder::from_cases([lamp, never_lit]).build(world());
    run_to_completion(&mut scheduler);

    let lamp = scheduler.runs().iter().next().expect("lamp ran");
    assert_eq!(lamp.state(), TestRunState::Passed);
    assert_eq!(lamp.tick(), 3);

    let never_lit = scheduler.runs().iter().nth(1).expect("never_lit ran");
    assert_eq!(never_lit.state(), TestRunState::TimedOut);
    let origin = never_lit.origin().expect("placed");
    assert_eq!(
        never_lit.error(),
        Some(&GameTestError::PositionalAssertion {
            message: "Expected lit_lamp, got lamp".to_owned(),
            absolute: origin + BlockPos::new(1, 0, 1),
            relative: BlockPos::new(1, 0, 1),
            tick: 10,
        })
    );
}

#[test]
fn pinned_runs_place_in_existing_structures() {
    test_init();

    let mut world = world();
    let bounds = world
        .place_structure(StructurePlacement {
            test_name: "pinned",
            template: TEMPLATE,
            origin: BlockPos::new(-20, 4, 7),
            rotation: Default::default(),
        })
        .expect("template exists");
    assert_eq!(
        bounds,
        BoundingBox::from_corner_and_size(BlockPos::new(-20, 4, 7), BlockPos::new(3, 2, 3))
    );

    let mut builder = SchedulerBuilder::from_runs([RunSpec::new(passing(
        "pinned",
        "defaultBatch",
    ))
    .at(BlockPos::new(-20, 4, 7), Default::default())]);
    builder.set_grid(GridLayout::new(BlockPos::new(500, 0, 0)));
    let mut scheduler = builder.build(world);
    run_to_completion(&mut scheduler);

    let run = scheduler.runs().iter().next().expect("one run");
    assert_eq!(run.origin(), Some(BlockPos::new(-20, 4, 7)));
    assert_eq!(run.state(), TestRunState::Passed);
}
