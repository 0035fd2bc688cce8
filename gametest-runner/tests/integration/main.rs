// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests driving the scheduler against an in-memory world.

mod fixtures;
mod persistence;
mod retries;
mod scheduling;
