// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{GameTestSequence, TestRun};
use crate::{
    errors::GameTestError,
    geometry::{BlockPos, BoundingBox},
    world::World,
};

/// The context handle passed to a test body and to every callback it schedules.
///
/// Positions passed to and returned from the helper are relative to the test's structure: the
/// helper translates them to world space through the run's origin and rotation.
pub struct TestHelper<'a> {
    run: &'a mut TestRun,
    world: &'a mut dyn World,
    origin: BlockPos,
    bounds: BoundingBox,
}

impl<'a> TestHelper<'a> {
    /// Creates a helper for a run whose structure has been placed.
    pub(crate) fn new(
        run: &'a mut TestRun,
        world: &'a mut dyn World,
    ) -> Result<Self, GameTestError> {
        let (Some(origin), Some(bounds)) = (run.origin(), run.bounds()) else {
            return Err(GameTestError::NotPlaced {
                test_name: run.test_name().to_owned(),
            });
        };
        Ok(Self {
            run,
            world,
            origin,
            bounds,
        })
    }

    /// Returns the name of the running test.
    pub fn test_name(&self) -> &str {
        self.run.test_name()
    }

    /// Returns the number of ticks since the body ran.
    pub fn tick(&self) -> u64 {
        self.run.tick()
    }

    /// Returns the world-space origin of the test's structure.
    pub fn origin(&self) -> BlockPos {
        self.origin
    }

    /// Returns the world-space footprint of the test's structure.
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Returns true if the test has already passed or failed.
    pub fn is_done(&self) -> bool {
        self.run.is_done()
    }

    /// Gives direct access to the world.
    pub fn world(&mut self) -> &mut dyn World {
        &mut *self.world
    }

    // ---
    // Positions
    // ---

    /// Translates a position relative to the structure into world space.
    pub fn absolute_pos(&self, relative: BlockPos) -> BlockPos {
        let rotation = self.run.rotation();
        self.origin() + rotation.rotate_within(relative, self.bounds().size())
    }

    /// Translates a world-space position into a position relative to the structure.
    pub fn relative_pos(&self, absolute: BlockPos) -> BlockPos {
        let rotation = self.run.rotation();
        rotation.unrotate_within(absolute - self.origin(), self.bounds().size())
    }

    // ---
    // Blocks and assertions
    // ---

    /// Sets a block at a position relative to the structure.
    pub fn set_block(&mut self, relative: BlockPos, block: &str) {
        let pos = self.absolute_pos(relative);
        self.world.set_block(pos, block);
    }

    /// Returns the block at a position relative to the structure.
    pub fn block_at(&self, relative: BlockPos) -> Option<&str> {
        self.world.block_at(self.absolute_pos(relative))
    }

    /// Checks that the block at `relative` is `expected`.
    pub fn assert_block(&self, relative: BlockPos, expected: &str) -> Result<(), GameTestError> {
        match self.block_at(relative) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(self.fail_at(
                relative,
                format!("Expected {expected}, got {actual}"),
            )),
            None => Err(self.fail_at(relative, format!("Expected {expected}, got air"))),
        }
    }

    /// Checks that there is no block at `relative`.
    pub fn assert_no_block(&self, relative: BlockPos) -> Result<(), GameTestError> {
        match self.block_at(relative) {
            None => Ok(()),
            Some(actual) => Err(self.fail_at(relative, format!("Expected air, got {actual}"))),
        }
    }

    /// Checks a condition, failing with `message` if it doesn't hold.
    pub fn assert_true(
        &self,
        condition: bool,
        message: impl Into<String>,
    ) -> Result<(), GameTestError> {
        if condition {
            Ok(())
        } else {
            Err(self.fail(message))
        }
    }

    /// Creates a plain assertion error. Return it from the body or a callback to fail the test.
    pub fn fail(&self, message: impl Into<String>) -> GameTestError {
        GameTestError::assertion(message)
    }

    /// Creates an assertion error tied to a position relative to the structure.
    pub fn fail_at(&self, relative: BlockPos, message: impl Into<String>) -> GameTestError {
        GameTestError::PositionalAssertion {
            message: message.into(),
            absolute: self.absolute_pos(relative),
            relative,
            tick: self.tick(),
        }
    }

    // ---
    // Completion
    // ---

    /// Marks the test as passed.
    ///
    /// # Panics
    ///
    /// Panics if the test has already passed or failed.
    pub fn succeed(&mut self) {
        self.run.succeed();
    }

    /// Runs `check` now and passes the test if it succeeds.
    pub fn succeed_if<F>(&mut self, check: F) -> Result<(), GameTestError>
    where
        F: FnOnce(&mut TestHelper<'_>) -> Result<(), GameTestError>,
    {
        check(self)?;
        self.succeed();
        Ok(())
    }

    /// Polls `check` every tick and passes the test once it succeeds.
    pub fn succeed_when<F>(&mut self, check: F)
    where
        F: FnMut(&mut TestHelper<'_>) -> Result<(), GameTestError> + 'static,
    {
        self.start_sequence().then_wait_until(check).then_succeed();
    }

    /// Checks `check` exactly `tick` ticks from now and passes the test if it succeeds.
    ///
    /// The test fails if `check` succeeds earlier or still fails at that tick.
    pub fn succeed_on_tick_when<F>(&mut self, tick: u64, check: F)
    where
        F: FnMut(&mut TestHelper<'_>) -> Result<(), GameTestError> + 'static,
    {
        self.start_sequence()
            .then_wait_until_exactly(tick, check)
            .then_succeed();
    }

    // ---
    // Scheduling
    // ---

    /// Runs `callback` when the test's tick count reaches `tick`.
    pub fn run_at_tick_time<F>(&mut self, tick: u64, callback: F)
    where
        F: FnOnce(&mut TestHelper<'_>) -> Result<(), GameTestError> + 'static,
    {
        self.run.schedule(tick, Box::new(callback));
    }

    /// Runs `callback` `delay` ticks from now. Delays past the end of time never run.
    pub fn run_after_delay<F>(&mut self, delay: u64, callback: F)
    where
        F: FnOnce(&mut TestHelper<'_>) -> Result<(), GameTestError> + 'static,
    {
        let tick = self.tick().saturating_add(delay);
        self.run_at_tick_time(tick, callback);
    }

    /// Starts a sequence of steps, polled once per tick after the tick's scheduled callbacks.
    pub fn start_sequence(&mut self) -> &mut GameTestSequence {
        self.run.start_sequence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RetryPolicy,
        geometry::Rotation,
        list::TestCase,
        runner::{
            TestRunState, TestRuns,
            test_run::test_helpers::{TEMPLATE, case, started_run, tick_until_done, world},
        },
        world::MemoryWorld,
    };
    use test_case::test_case;

    #[test_case(Rotation::None, BlockPos::new(1, 0, 0) => BlockPos::new(11, 0, 20) ; "none")]
    #[test_case(Rotation::Clockwise90, BlockPos::new(1, 0, 0) => BlockPos::new(12, 0, 21) ; "clockwise 90")]
    #[test_case(Rotation::Clockwise180, BlockPos::new(1, 0, 0) => BlockPos::new(11, 0, 22) ; "clockwise 180")]
    fn absolute_pos(rotation: Rotation, relative: BlockPos) -> BlockPos {
        let mut world = world();
        let mut runs = TestRuns::default();
        let case = TestCase::builder("rotated", |_| Ok(()))
            .set_template(TEMPLATE)
            .set_rotation(rotation)
            .build()
            .expect("valid test case");
        let id = runs.create(case, RetryPolicy::no_retries(), None);
        runs[id]
            .prepare_structure(&mut world, BlockPos::new(10, 0, 20))
            .expect("template exists");
        runs[id].start_execution();

        let helper = TestHelper::new(&mut runs[id], &mut world).expect("run is placed");
        let absolute = helper.absolute_pos(relative);
        assert_eq!(helper.relative_pos(absolute), relative, "round trip");
        absolute
    }

    #[test]
    fn positional_failure_renders_context() {
        let mut world = world();
        let mut runs = TestRuns::default();
        let id = started_run(
            &mut runs,
            &mut world,
            case("lamp", |helper| {
                helper.run_after_delay(2, |helper| {
                    helper.assert_block(BlockPos::new(1, 1, 1), "lit_lamp")
                });
                Ok(())
            }),
        );
        tick_until_done(&mut runs[id], &mut world, 10);

        assert_eq!(runs[id].state(), TestRunState::Failed);
        assert_eq!(
            runs[id].error().map(|err| err.to_string()),
            Some("Expected lit_lamp, got air at 1, 1, 1 (relative: 1, 1, 1) (t=2)".to_owned())
        );
    }

    #[test]
    fn succeed_when_polls_until_condition_holds() {
        let mut world = world();
        let mut runs = TestRuns::default();
        let id = started_run(
            &mut runs,
            &mut world,
            case("door", |helper| {
                helper.run_after_delay(4, |helper| {
                    helper.set_block(BlockPos::ZERO, "open_door");
                    Ok(())
                });
                helper.succeed_when(|helper| helper.assert_block(BlockPos::ZERO, "open_door"));
                Ok(())
            }),
        );
        tick_until_done(&mut runs[id], &mut world, 10);

        assert_eq!(runs[id].state(), TestRunState::Passed);
        assert_eq!(runs[id].tick(), 4);
    }

    #[test]
    fn succeed_on_tick_when_rejects_early_success() {
        let mut world = world();
        let mut runs = TestRuns::default();
        let id = started_run(
            &mut runs,
            &mut world,
            case("early", |helper| {
                helper.set_block(BlockPos::ZERO, "stone");
                helper.succeed_on_tick_when(5, |helper| helper.assert_block(BlockPos::ZERO, "stone"));
                Ok(())
            }),
        );
        tick_until_done(&mut runs[id], &mut world, 10);

        assert_eq!(runs[id].state(), TestRunState::Failed);
        assert_eq!(
            runs[id].error(),
            Some(&GameTestError::SequenceInvalidTick {
                expected: 5,
                actual: 0
            })
        );
    }

    #[test]
    fn assert_no_block() {
        let mut world = MemoryWorld::new();
        world.add_template(
            "filled",
            crate::world::StructureTemplate::new(BlockPos::new(2, 2, 2))
                .with_block(BlockPos::ZERO, "dirt"),
        );
        let mut runs = TestRuns::default();
        let case = TestCase::builder("filled", |helper| {
            helper.assert_no_block(BlockPos::new(1, 1, 1))?;
            helper.assert_no_block(BlockPos::ZERO)
        })
        .build()
        .expect("valid test case");
        let id = started_run(&mut runs, &mut world, case);
        runs[id].tick_once(&mut world);

        assert_eq!(
            runs[id].error().map(|err| err.message().into_owned()),
            Some("Expected air, got dirt".to_owned())
        );
    }

    #[test]
    fn delay_past_the_end_of_time_never_runs() {
        let mut world = world();
        let mut runs = TestRuns::default();
        let id = started_run(
            &mut runs,
            &mut world,
            case("patient", |helper| {
                helper.run_after_delay(1, |helper| {
                    helper.run_after_delay(u64::MAX, |helper| Err(helper.fail("ran too soon")));
                    helper.run_after_delay(2, |helper| {
                        helper.succeed();
                        Ok(())
                    });
                    Ok(())
                });
                Ok(())
            }),
        );
        tick_until_done(&mut runs[id], &mut world, 10);

        assert_eq!(runs[id].state(), TestRunState::Passed, "{:?}", runs[id].error());
        assert_eq!(runs[id].tick(), 3);
    }

    #[test]
    fn helper_requires_a_placed_structure() {
        let mut world = world();
        let mut runs = TestRuns::default();
        let id = runs.create(case("loose", |_| Ok(())), RetryPolicy::no_retries(), None);

        let error = TestHelper::new(&mut runs[id], &mut world).err();
        assert_eq!(
            error,
            Some(GameTestError::NotPlaced {
                test_name: "loose".to_owned()
            })
        );
    }
}
