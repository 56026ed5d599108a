// Copyright 2025 The Shakedown Authors
// SPDX-License-Identifier: Apache-2.0

//! State restoration errors.

use std::time::Duration;

use thiserror::Error;

/// A specialized `Result` for state restoration.
pub type Result<T> = std::result::Result<T, RestoreError>;

/// Errors that can occur while saving or restoring fleet state.
#[derive(Debug, Error)]
pub enum RestoreError {
    /// A restore was requested but no matching snapshot exists.
    #[error("no snapshot named '{name}' found")]
    SnapshotNotFound {
        /// The computed snapshot name.
        name: String,
    },

    /// Two nodes computed the same snapshot name. Restoring either one
    /// would be ambiguous, so this fails at save time before any image is
    /// created.
    #[error("snapshot name '{name}' is computed by more than one node")]
    SnapshotCollision {
        /// The colliding computed name.
        name: String,
    },

    /// A node's address matched more than one compute instance, so the
    /// configuration cannot uniquely address either one. Give the node an
    /// explicit `instance_id`.
    #[error("found two instances with the IP '{ip}'; set instance_id to disambiguate")]
    AmbiguousInstance {
        /// The ambiguous address.
        ip: String,
    },

    /// A node could not be matched to any compute instance.
    #[error("no compute instance found for node '{node}'")]
    InstanceNotFound {
        /// The node name.
        node: String,
    },

    /// The control plane did not reach the expected state within the
    /// deadline.
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout {
        /// What was being waited on.
        what: String,
        /// How long the engine waited.
        waited: Duration,
    },

    /// The restoration backend is misconfigured.
    #[error("restoration configuration error: {0}")]
    Config(String),

    /// The compute API answered with an error status.
    #[error("compute API request to {url} failed with status {status}: {message}")]
    Compute {
        /// The request URL.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The response body, as far as it was readable.
        message: String,
    },

    /// The compute API could not be reached.
    #[error("compute API transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A command on a node failed.
    #[error(transparent)]
    Exec(#[from] shakedown_exec::ExecError),

    /// A disk operation failed during a manual restore.
    #[error(transparent)]
    Fault(#[from] shakedown_fleet::FaultError),
}
