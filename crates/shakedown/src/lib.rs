// Copyright 2025 The Shakedown Authors
// SPDX-License-Identifier: Apache-2.0

//! Shakedown: a failure-injection test harness for replicated object-storage
//! clusters.
//!
//! The harness kills storage devices on live nodes, verifies that the
//! cluster's replication machinery restores the configured redundancy within
//! a bounded time, and rolls the fleet back to a clean baseline before the
//! next scenario.

pub mod cli;
pub mod driver;
