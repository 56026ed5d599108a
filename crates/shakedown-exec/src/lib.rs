// Copyright 2025 The Shakedown Authors
// SPDX-License-Identifier: Apache-2.0

//! Command execution on fleet nodes.
//!
//! Everything the harness does to a node goes through the [`Executor`]
//! trait: one method, one command, captured output. Two real
//! implementations exist — [`LocalExecutor`] for the machine the driver
//! runs on and [`SshExecutor`] for remote nodes — plus a
//! [`ScriptedExecutor`] that replays canned output for tests. The rest of
//! the workspace is executor-agnostic.

pub mod error;
mod local;
mod output;
mod scripted;
mod ssh;

use async_trait::async_trait;
pub use error::{ExecError, Result};
pub use local::LocalExecutor;
pub use output::{CommandOutput, ExecOptions};
pub use scripted::ScriptedExecutor;
pub use ssh::SshExecutor;

/// Executes shell commands against a single target.
///
/// Implementations own their transport exclusively: no two logical
/// operations may interleave commands on the same session, so `execute`
/// holds the session for the duration of one call.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The target this executor runs commands on, for logging.
    fn target(&self) -> &str;

    /// Executes a shell command and returns its captured output.
    ///
    /// With `opts.ignore_failure` unset, a non-zero exit status becomes
    /// [`ExecError::Command`]; the caller never has to inspect the result
    /// to learn that something went wrong. With it set, the result is
    /// returned as-is and the caller reads `exit_code` itself.
    async fn execute(&self, command: &str, opts: &ExecOptions) -> Result<CommandOutput>;

    /// Executes a command with default options.
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        self.execute(command, &ExecOptions::default()).await
    }
}

/// Applies the failure policy shared by all executor implementations.
///
/// Logs the command up front, and on an unexpected failure logs the
/// captured output even when `log_output` is off — a failed command is
/// exactly the moment the output matters.
pub(crate) fn check_result(
    target: &str,
    command: &str,
    opts: &ExecOptions,
    output: CommandOutput,
) -> Result<CommandOutput> {
    if opts.log_output {
        tracing::debug!(
            target_node = %target,
            stdout = %output.stdout_str(),
            stderr = %output.stderr_str(),
            "command output"
        );
    }
    if !opts.ignore_failure && !output.ok() {
        if opts.log_command {
            tracing::info!(target_node = %target, command, "command failed");
            tracing::info!(target_node = %target, stdout = %output.stdout_str(), "command stdout");
            tracing::error!(target_node = %target, stderr = %output.stderr_str(), "command stderr");
        }
        return Err(ExecError::Command {
            target: target.to_string(),
            command: command.to_string(),
            stderr: output.stderr_str(),
        });
    }
    Ok(output)
}
