// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{GameTestError, TestCaseBuildError},
    geometry::Rotation,
    runner::TestHelper,
};
use debug_ignore::DebugIgnore;
use std::{fmt, sync::Arc};

/// The body of a test.
///
/// The body runs once, on the first tick after setup. It can finish the test directly (with
/// [`TestHelper::succeed`] or by returning an error) or schedule work for later ticks.
pub type TestFunction = Arc<dyn Fn(&mut TestHelper<'_>) -> Result<(), GameTestError> + Send + Sync>;

/// The immutable declaration of a single test.
///
/// Test cases are created once, at registration time, and shared by every run of the test.
#[derive(Clone, Debug)]
pub struct TestCase {
    batch_name: String,
    name: String,
    template: String,
    rotation: Rotation,
    timeout_ticks: u64,
    setup_ticks: u64,
    required: bool,
    manual_only: bool,
    max_attempts: u32,
    required_successes: u32,
    function: DebugIgnore<TestFunction>,
}

impl TestCase {
    /// The batch tests are placed in when none is specified.
    pub const DEFAULT_BATCH: &'static str = "defaultBatch";

    /// The default number of ticks a test may run before timing out.
    pub const DEFAULT_TIMEOUT_TICKS: u64 = 100;

    /// Starts declaring a test with the given name and body.
    ///
    /// The template defaults to the test's name.
    pub fn builder<F>(name: impl Into<String>, function: F) -> TestCaseBuilder
    where
        F: Fn(&mut TestHelper<'_>) -> Result<(), GameTestError> + Send + Sync + 'static,
    {
        TestCaseBuilder::new(name.into(), Arc::new(function))
    }

    /// Returns the name of the batch this test belongs to.
    pub fn batch_name(&self) -> &str {
        &self.batch_name
    }

    /// Returns the name of the test.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name of the structure template the test runs in.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns the orientation the test's structure is placed in.
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Returns the number of ticks the test may run before timing out.
    pub fn timeout_ticks(&self) -> u64 {
        self.timeout_ticks
    }

    /// Returns the number of ticks to wait after placement before running the body.
    pub fn setup_ticks(&self) -> u64 {
        self.setup_ticks
    }

    /// Returns true if a failure of this test fails the run as a whole.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Returns true if this test only runs when selected by name.
    pub fn is_manual_only(&self) -> bool {
        self.manual_only
    }

    /// Returns the maximum number of attempts for a flaky test.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the number of attempts that must pass for a flaky test to pass.
    pub fn required_successes(&self) -> u32 {
        self.required_successes
    }

    /// Returns true if the test is expected to need several attempts.
    pub fn is_flaky(&self) -> bool {
        self.max_attempts > 1
    }

    /// Returns the test's body.
    pub fn function(&self) -> &TestFunction {
        &self.function
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Builder for a [`TestCase`], returned by [`TestCase::builder`].
#[derive(Clone, Debug)]
pub struct TestCaseBuilder {
    name: String,
    batch_name: Option<String>,
    template: Option<String>,
    rotation: Rotation,
    timeout_ticks: u64,
    setup_ticks: u64,
    required: bool,
    manual_only: bool,
    max_attempts: u32,
    required_successes: u32,
    function: DebugIgnore<TestFunction>,
}

impl TestCaseBuilder {
    fn new(name: String, function: TestFunction) -> Self {
        Self {
            name,
            batch_name: None,
            template: None,
            rotation: Rotation::None,
            timeout_ticks: TestCase::DEFAULT_TIMEOUT_TICKS,
            setup_ticks: 0,
            required: true,
            manual_only: false,
            max_attempts: 1,
            required_successes: 1,
            function: DebugIgnore(function),
        }
    }

    /// Sets the batch the test belongs to.
    pub fn set_batch(&mut self, batch_name: impl Into<String>) -> &mut Self {
        self.batch_name = Some(batch_name.into());
        self
    }

    /// Sets the structure template the test runs in.
    pub fn set_template(&mut self, template: impl Into<String>) -> &mut Self {
        self.template = Some(template.into());
        self
    }

    /// Sets the orientation of the test's structure.
    pub fn set_rotation(&mut self, rotation: Rotation) -> &mut Self {
        self.rotation = rotation;
        self
    }

    /// Sets the number of ticks the test may run before timing out.
    pub fn set_timeout_ticks(&mut self, timeout_ticks: u64) -> &mut Self {
        self.timeout_ticks = timeout_ticks;
        self
    }

    /// Sets the number of ticks to wait after placement before running the body.
    pub fn set_setup_ticks(&mut self, setup_ticks: u64) -> &mut Self {
        self.setup_ticks = setup_ticks;
        self
    }

    /// Sets whether the test is required.
    pub fn set_required(&mut self, required: bool) -> &mut Self {
        self.required = required;
        self
    }

    /// Sets whether the test only runs when selected by name.
    pub fn set_manual_only(&mut self, manual_only: bool) -> &mut Self {
        self.manual_only = manual_only;
        self
    }

    /// Marks the test as flaky: it gets up to `max_attempts` attempts, and passes once
    /// `required_successes` of them have passed.
    pub fn set_attempts(&mut self, max_attempts: u32, required_successes: u32) -> &mut Self {
        self.max_attempts = max_attempts;
        self.required_successes = required_successes;
        self
    }

    /// Builds the test case.
    pub fn build(&self) -> Result<Arc<TestCase>, TestCaseBuildError> {
        if self.name.is_empty() {
            return Err(TestCaseBuildError::EmptyName);
        }
        for (field, value) in [
            ("max-attempts", self.max_attempts),
            ("required-successes", self.required_successes),
        ] {
            if value == 0 {
                return Err(TestCaseBuildError::ZeroCount {
                    name: self.name.clone(),
                    field,
                });
            }
        }
        if self.required_successes > self.max_attempts {
            return Err(TestCaseBuildError::SuccessesExceedAttempts {
                name: self.name.clone(),
                required_successes: self.required_successes,
                max_attempts: self.max_attempts,
            });
        }

        Ok(Arc::new(TestCase {
            batch_name: self
                .batch_name
                .clone()
                .unwrap_or_else(|| TestCase::DEFAULT_BATCH.to_owned()),
            name: self.name.clone(),
            template: self.template.clone().unwrap_or_else(|| self.name.clone()),
            rotation: self.rotation,
            timeout_ticks: self.timeout_ticks,
            setup_ticks: self.setup_ticks,
            required: self.required,
            manual_only: self.manual_only,
            max_attempts: self.max_attempts,
            required_successes: self.required_successes,
            function: self.function.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn noop(_: &mut TestHelper<'_>) -> Result<(), GameTestError> {
        Ok(())
    }

    #[test]
    fn defaults() {
        let case = TestCase::builder("piston_push", noop)
            .build()
            .expect("valid test case");
        assert_eq!(case.batch_name(), TestCase::DEFAULT_BATCH);
        assert_eq!(case.template(), "piston_push");
        assert_eq!(case.rotation(), Rotation::None);
        assert_eq!(case.timeout_ticks(), 100);
        assert_eq!(case.setup_ticks(), 0);
        assert!(case.is_required());
        assert!(!case.is_manual_only());
        assert!(!case.is_flaky());
    }

    #[test]
    fn flaky() {
        let case = TestCase::builder("hopper", noop)
            .set_batch("redstone")
            .set_template("hopper_chain")
            .set_attempts(5, 2)
            .build()
            .expect("valid test case");
        assert_eq!(case.batch_name(), "redstone");
        assert_eq!(case.template(), "hopper_chain");
        assert!(case.is_flaky());
        assert_eq!(case.required_successes(), 2);
    }

    #[test_case("", 1, 1 => matches Err(TestCaseBuildError::EmptyName) ; "empty name")]
    #[test_case("t", 0, 1 => matches Err(TestCaseBuildError::ZeroCount { field: "max-attempts", .. }) ; "zero attempts")]
    #[test_case("t", 1, 0 => matches Err(TestCaseBuildError::ZeroCount { field: "required-successes", .. }) ; "zero successes")]
    #[test_case("t", 2, 3 => matches Err(TestCaseBuildError::SuccessesExceedAttempts { .. }) ; "too many successes")]
    #[test_case("t", 3, 3 => matches Ok(_) ; "all attempts must pass")]
    fn build_validation(
        name: &str,
        max_attempts: u32,
        required_successes: u32,
    ) -> Result<Arc<TestCase>, TestCaseBuildError> {
        TestCase::builder(name, noop)
            .set_attempts(max_attempts, required_successes)
            .build()
    }
}
