// Copyright 2025 The Shakedown Authors
// SPDX-License-Identifier: Apache-2.0

//! Fleet and fault-injection errors.

use thiserror::Error;

/// A specialized `Result` for fleet operations.
pub type Result<T> = std::result::Result<T, FaultError>;

/// Errors that can occur during fault injection.
#[derive(Debug, Error)]
pub enum FaultError {
    /// Fault injection was requested but no managed disk is mounted.
    #[error("no mounted managed disk left on {node}")]
    NoAvailableDisk {
        /// The node that ran out of disks.
        node: String,
    },

    /// A disk operation was called in a state it does not allow. This is a
    /// programming error in the caller, not a recoverable fault.
    #[error("disk precondition violated on {node}/{disk}: {reason}")]
    DiskPrecondition {
        /// The node the disk belongs to.
        node: String,
        /// The device name.
        disk: String,
        /// Which precondition was violated.
        reason: String,
    },

    /// Partitioning found an unexpected number of existing partitions.
    /// Guessing which partitions belong to the storage layer would risk
    /// destroying data, so this is fatal.
    #[error("disk {disk} on {node} has {found} partitions, expected 0 or {expected}")]
    PartitionState {
        /// The node the disk belongs to.
        node: String,
        /// The device name.
        disk: String,
        /// Number of partitions found.
        found: usize,
        /// Number of partitions a normalized disk carries.
        expected: usize,
    },

    /// A command on the node failed.
    #[error(transparent)]
    Exec(#[from] shakedown_exec::ExecError),
}
