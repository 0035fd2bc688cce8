// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestHelper;
use crate::errors::GameTestError;
use debug_ignore::DebugIgnore;
use std::collections::VecDeque;

type Check = Box<dyn FnMut(&mut TestHelper<'_>) -> Result<(), GameTestError>>;
type Action = Box<dyn FnOnce(&mut TestHelper<'_>) -> Result<(), GameTestError>>;

#[derive(Debug)]
enum Step {
    WaitUntil {
        expected_delay: Option<u64>,
        check: DebugIgnore<Check>,
    },
    Execute {
        delay: u64,
        action: DebugIgnore<Action>,
    },
    Idle {
        ticks: u64,
    },
    Succeed,
    Fail(GameTestError),
}

/// A chain of steps polled once per tick, created by [`TestHelper::start_sequence`].
///
/// Each poll runs as many steps as can complete on the current tick, stopping at the first step
/// that has to wait. Delays are counted from the tick the previous step completed on.
#[derive(Debug)]
pub struct GameTestSequence {
    steps: VecDeque<Step>,
    last_tick: u64,
    last_error: Option<GameTestError>,
}

impl GameTestSequence {
    pub(crate) fn new(tick: u64) -> Self {
        Self {
            steps: VecDeque::new(),
            last_tick: tick,
            last_error: None,
        }
    }

    /// Waits until `check` stops returning an error.
    pub fn then_wait_until<F>(&mut self, check: F) -> &mut Self
    where
        F: FnMut(&mut TestHelper<'_>) -> Result<(), GameTestError> + 'static,
    {
        self.push(Step::WaitUntil {
            expected_delay: None,
            check: DebugIgnore(Box::new(check)),
        })
    }

    /// Waits until `check` stops returning an error, which must happen exactly `delay` ticks
    /// after the previous step.
    pub fn then_wait_until_exactly<F>(&mut self, delay: u64, check: F) -> &mut Self
    where
        F: FnMut(&mut TestHelper<'_>) -> Result<(), GameTestError> + 'static,
    {
        self.push(Step::WaitUntil {
            expected_delay: Some(delay),
            check: DebugIgnore(Box::new(check)),
        })
    }

    /// Runs `action` once. An error fails the test.
    pub fn then_execute<F>(&mut self, action: F) -> &mut Self
    where
        F: FnOnce(&mut TestHelper<'_>) -> Result<(), GameTestError> + 'static,
    {
        self.then_execute_after(0, action)
    }

    /// Runs `action` once, `delay` ticks after the previous step. An error fails the test.
    pub fn then_execute_after<F>(&mut self, delay: u64, action: F) -> &mut Self
    where
        F: FnOnce(&mut TestHelper<'_>) -> Result<(), GameTestError> + 'static,
    {
        self.push(Step::Execute {
            delay,
            action: DebugIgnore(Box::new(action)),
        })
    }

    /// Waits for `ticks` ticks.
    pub fn then_idle(&mut self, ticks: u64) -> &mut Self {
        self.push(Step::Idle { ticks })
    }

    /// Passes the test.
    pub fn then_succeed(&mut self) -> &mut Self {
        self.push(Step::Succeed)
    }

    /// Fails the test with `message`.
    pub fn then_fail(&mut self, message: impl Into<String>) -> &mut Self {
        self.push(Step::Fail(GameTestError::assertion(message)))
    }

    /// Returns true once every step has run.
    pub fn is_complete(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step that can complete on this tick.
    ///
    /// Returns an error if a step failed the test outright. A check that is still failing is not
    /// an error: it is remembered and retried on the next tick.
    pub(crate) fn tick_and_continue(
        &mut self,
        helper: &mut TestHelper<'_>,
    ) -> Result<(), GameTestError> {
        let result = self.run_steps(helper);
        if result.is_err() {
            self.steps.clear();
        }
        result
    }

    /// Fails if any step is left. Called after the last poll before a timeout.
    ///
    /// The error is the last check's error, if one was failing.
    pub(crate) fn fail_if_not_complete(
        &mut self,
        helper: &TestHelper<'_>,
    ) -> Result<(), GameTestError> {
        if self.is_complete() || helper.is_done() {
            return Ok(());
        }
        self.steps.clear();
        Err(self.last_error.take().unwrap_or_else(|| {
            GameTestError::assertion("Test timed out before sequence completed")
        }))
    }

    fn push(&mut self, step: Step) -> &mut Self {
        self.steps.push_back(step);
        self
    }

    fn run_steps(&mut self, helper: &mut TestHelper<'_>) -> Result<(), GameTestError> {
        while !helper.is_done() {
            let Some(step) = self.steps.pop_front() else {
                return Ok(());
            };
            let now = helper.tick();
            let elapsed = now.saturating_sub(self.last_tick);

            match step {
                Step::WaitUntil {
                    expected_delay,
                    mut check,
                } => match (check.0)(helper) {
                    Ok(()) => {
                        self.last_error = None;
                        self.complete_step(now, elapsed, expected_delay)?;
                    }
                    Err(error) => {
                        self.last_error = Some(error);
                        self.steps.push_front(Step::WaitUntil {
                            expected_delay,
                            check,
                        });
                        return Ok(());
                    }
                },
                Step::Execute { delay, action } => {
                    if elapsed < delay {
                        self.steps.push_front(Step::Execute { delay, action });
                        return Ok(());
                    }
                    (action.0)(helper)?;
                    self.complete_step(now, elapsed, (delay > 0).then_some(delay))?;
                }
                Step::Idle { ticks } => {
                    if elapsed < ticks {
                        self.steps.push_front(Step::Idle { ticks });
                        return Ok(());
                    }
                    self.last_tick = now;
                }
                Step::Succeed => {
                    self.steps.clear();
                    helper.succeed();
                }
                Step::Fail(error) => return Err(error),
            }
        }
        Ok(())
    }

    fn complete_step(
        &mut self,
        now: u64,
        elapsed: u64,
        expected_delay: Option<u64>,
    ) -> Result<(), GameTestError> {
        let previous = self.last_tick;
        self.last_tick = now;
        match expected_delay {
            Some(expected) if expected != elapsed => Err(GameTestError::SequenceInvalidTick {
                expected: previous.saturating_add(expected),
                actual: now,
            }),
            _ => Ok(()),
        }
    }
}
