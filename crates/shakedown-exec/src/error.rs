// Copyright 2025 The Shakedown Authors
// SPDX-License-Identifier: Apache-2.0

//! Command execution errors.

use thiserror::Error;

/// A specialized `Result` for command execution.
pub type Result<T> = std::result::Result<T, ExecError>;

/// Errors that can occur while executing a command on a node.
#[derive(Debug, Error)]
pub enum ExecError {
    /// A command exited non-zero when failure was not tolerated.
    #[error("command failed on {target}: `{command}`: {stderr}")]
    Command {
        /// The node the command ran on.
        target: String,
        /// The command text.
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// The command could not be spawned at all.
    #[error("failed to spawn command on {target}: {source}")]
    Spawn {
        /// The node the command was intended for.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
