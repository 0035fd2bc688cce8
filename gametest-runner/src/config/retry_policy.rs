// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::Deserialize;
use std::fmt;

/// How many attempts a test gets, and whether a failed attempt stops further attempts.
///
/// This is the type of the `retries` config key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub struct RetryPolicy {
    // 0 means unlimited.
    max_attempts: u32,
    halt_on_failure: bool,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self::no_retries()
    }
}

impl RetryPolicy {
    /// Creates a new policy. A `max_attempts` of 0 means attempts are unlimited.
    pub const fn new(max_attempts: u32, halt_on_failure: bool) -> Self {
        Self {
            max_attempts,
            halt_on_failure,
        }
    }

    /// The canonical single-attempt policy.
    pub const fn no_retries() -> Self {
        Self::new(1, true)
    }

    /// A policy that never runs out of attempts.
    pub const fn unlimited(halt_on_failure: bool) -> Self {
        Self::new(0, halt_on_failure)
    }

    /// Returns the maximum number of attempts, or `None` if unlimited.
    pub fn max_attempts(&self) -> Option<u32> {
        (self.max_attempts > 0).then_some(self.max_attempts)
    }

    /// Returns true if a failed attempt stops further attempts.
    pub fn halt_on_failure(&self) -> bool {
        self.halt_on_failure
    }

    /// Returns true if this policy allows more than one attempt.
    pub fn has_retries(&self) -> bool {
        self.max_attempts != 1
    }

    /// Returns true if another attempt should be made after `attempts` attempts, `successes` of
    /// which passed.
    pub fn has_attempts_left(&self, attempts: u32, successes: u32) -> bool {
        let below_max = match self.max_attempts() {
            Some(max) => attempts < max,
            None => true,
        };
        below_max && (attempts == successes || !self.halt_on_failure)
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max_attempts() {
            Some(max) => write!(f, "{max} max attempts")?,
            None => write!(f, "unlimited attempts")?,
        }
        if self.halt_on_failure {
            write!(f, ", halting on failure")?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RetryPolicyTable {
    max_attempts: i64,
    #[serde(default = "default_halt_on_failure")]
    halt_on_failure: bool,
}

fn default_halt_on_failure() -> bool {
    true
}

fn max_attempts_from_i64<E: serde::de::Error>(v: i64) -> Result<u32, E> {
    if v <= 0 {
        return Ok(0);
    }
    u32::try_from(v).map_err(|_| {
        serde::de::Error::invalid_value(serde::de::Unexpected::Signed(v), &"an attempt count")
    })
}

pub(super) fn deserialize_retry_policy<'de, D>(
    deserializer: D,
) -> Result<Option<RetryPolicy>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct V;

    impl<'de2> serde::de::Visitor<'de2> for V {
        type Value = Option<RetryPolicy>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(
                formatter,
                "a table ({{ max-attempts = 3, halt-on-failure = false }}) or a number (3)"
            )
        }

        // Note that TOML uses i64, not u64. A bare number retries failed attempts.
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(RetryPolicy::new(max_attempts_from_i64(v)?, false)))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            let v = i64::try_from(v).map_err(|_| {
                serde::de::Error::invalid_value(serde::de::Unexpected::Unsigned(v), &self)
            })?;
            self.visit_i64(v)
        }

        fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::MapAccess<'de2>,
        {
            let table =
                RetryPolicyTable::deserialize(serde::de::value::MapAccessDeserializer::new(map))?;
            Ok(Some(RetryPolicy::new(
                max_attempts_from_i64(table.max_attempts)?,
                table.halt_on_failure,
            )))
        }
    }

    deserializer.deserialize_any(V)
}

pub(super) fn require_deserialize_retry_policy<'de, D>(
    deserializer: D,
) -> Result<RetryPolicy, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match deserialize_retry_policy(deserializer) {
        Ok(None) => Err(serde::de::Error::missing_field("field missing or null")),
        Err(e) => Err(e),
        Ok(Some(policy)) => Ok(policy),
    }
}
