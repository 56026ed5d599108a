// Copyright 2025 The Shakedown Authors
// SPDX-License-Identifier: Apache-2.0

//! Verification errors.

use std::time::Duration;

use thiserror::Error;

/// A specialized `Result` for replica verification.
pub type Result<T> = std::result::Result<T, VerifyError>;

/// Errors that can occur during replica verification.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Convergence was not reached within the deadline.
    ///
    /// This is a test failure, not a harness bug: the cluster did not
    /// restore redundancy in time. It is kept distinct from every other
    /// error so reporting can tell the two apart.
    #[error("replicas were not consistent within {deadline:?} (waited {elapsed:?})")]
    ConsistencyTimeout {
        /// The configured deadline.
        deadline: Duration,
        /// How long the verifier actually waited.
        elapsed: Duration,
    },

    /// The storage API rejected an enumeration request.
    #[error("storage API request to {url} failed with status {status}")]
    Storage {
        /// The request URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The storage API could not be reached at all. Unlike replica probes,
    /// enumeration has no failure-is-an-answer reading: if the account
    /// cannot be listed the harness cannot verify anything.
    #[error("storage API transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// No node with the storage-proxy role is available for ring lookups.
    #[error("fleet has no storage proxy node")]
    NoProxy,

    /// A ring lookup command failed on the proxy.
    #[error(transparent)]
    Exec(#[from] shakedown_exec::ExecError),
}
