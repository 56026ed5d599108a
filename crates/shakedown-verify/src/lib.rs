// Copyright 2025 The Shakedown Authors
// SPDX-License-Identifier: Apache-2.0

//! Replica consistency verification.
//!
//! The verifier answers one question: does every container and object under
//! the test account currently have the expected number of live replicas?
//! It asks the placement ring (through a proxy node) where each entity's
//! replicas may live, probes those locations over HTTP, and wraps the whole
//! check in a deadline-bounded polling loop so an eventually-consistent
//! repair process becomes something a test can block on.

pub mod error;
mod ring;
mod storage;
mod verifier;

pub use error::{Result, VerifyError};
pub use ring::{parse_replica_urls, ring_lookup_command, RingKind};
pub use storage::StorageApi;
pub use verifier::{ConvergenceOpts, ReplicaVerifier};
