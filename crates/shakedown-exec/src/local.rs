//! Command execution on the driver's own machine.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ExecError, Result};
use crate::output::{split_lines, CommandOutput, ExecOptions};
use crate::{check_result, Executor};

/// Runs commands on the machine the harness itself runs on.
#[derive(Debug)]
pub struct LocalExecutor {
    target: String,
}

impl LocalExecutor {
    /// Creates a local executor.
    #[must_use]
    pub fn new() -> Self {
        Self { target: "localhost".to_string() }
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    fn target(&self) -> &str {
        &self.target
    }

    async fn execute(&self, command: &str, opts: &ExecOptions) -> Result<CommandOutput> {
        if opts.log_command {
            debug!(target_node = %self.target, command, "running local command");
        }
        let out = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|source| ExecError::Spawn { target: self.target.clone(), source })?;

        let output = CommandOutput {
            exit_code: out.status.code().unwrap_or(-1),
            stdout: split_lines(&out.stdout),
            stderr: split_lines(&out.stderr),
        };
        check_result(&self.target, command, opts, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout() {
        let exec = LocalExecutor::new();
        let out = exec.run("echo one && echo two").await.unwrap();
        assert!(out.ok());
        assert_eq!(out.stdout, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let exec = LocalExecutor::new();
        let err = exec.run("echo oops >&2; exit 3").await.unwrap_err();
        match err {
            ExecError::Command { target, stderr, .. } => {
                assert_eq!(target, "localhost");
                assert_eq!(stderr, "oops");
            }
            other => panic!("expected Command error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ignore_failure_returns_result() {
        let exec = LocalExecutor::new();
        let out = exec.execute("exit 7", &ExecOptions::tolerant()).await.unwrap();
        assert_eq!(out.exit_code, 7);
    }
}
