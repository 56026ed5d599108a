//! Command execution on remote nodes over SSH.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ExecError, Result};
use crate::output::{split_lines, CommandOutput, ExecOptions};
use crate::{check_result, Executor};

/// How long the multiplexed SSH session stays alive between commands.
const CONTROL_PERSIST_SECS: u32 = 600;

/// Runs commands on a remote node through the system `ssh` client.
///
/// The first command opens a ControlMaster session; subsequent commands
/// multiplex over it, so the per-command cost is one local `ssh` process,
/// not a fresh TCP+auth handshake. If the node reboots (e.g. after a
/// snapshot rebuild) the stale session dies and the next command
/// re-establishes it transparently.
pub struct SshExecutor {
    target: String,
    username: String,
    key_path: Option<PathBuf>,
    control_path: PathBuf,
    /// One command at a time per session.
    session: Mutex<()>,
}

impl SshExecutor {
    /// Creates an executor for `username@hostname`.
    #[must_use]
    pub fn new(hostname: &str, username: &str, key_path: Option<PathBuf>) -> Self {
        let control_path =
            std::env::temp_dir().join(format!("shakedown-ssh-{username}-{hostname}.sock"));
        Self {
            target: hostname.to_string(),
            username: username.to_string(),
            key_path,
            control_path,
            session: Mutex::new(()),
        }
    }

    fn ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            "ControlMaster=auto".to_string(),
            "-o".to_string(),
            format!("ControlPath={}", self.control_path.display()),
            "-o".to_string(),
            format!("ControlPersist={CONTROL_PERSIST_SECS}"),
        ];
        if let Some(key) = &self.key_path {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args.push(format!("{}@{}", self.username, self.target));
        args.push("--".to_string());
        args.push(command.to_string());
        args
    }
}

#[async_trait]
impl Executor for SshExecutor {
    fn target(&self) -> &str {
        &self.target
    }

    async fn execute(&self, command: &str, opts: &ExecOptions) -> Result<CommandOutput> {
        let _session = self.session.lock().await;
        if opts.log_command {
            debug!(target_node = %self.target, command, "running remote command");
        }
        let out = Command::new("ssh")
            .args(self.ssh_args(command))
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

    #[test]
    fn test_ssh_args_include_session_options() {
        let exec = SshExecutor::new("node1.example.com", "root", None);
        let args = exec.ssh_args("uptime");
        assert!(args.contains(&"ControlMaster=auto".to_string()));
        assert!(args.contains(&"root@node1.example.com".to_string()));
        assert_eq!(args.last().unwrap(), "uptime");
    }

    #[test]
    fn test_ssh_args_include_identity_file() {
        let exec =
            SshExecutor::new("node1", "admin", Some(PathBuf::from("/home/admin/.ssh/id_ed25519")));
        let args = exec.ssh_args("true");
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "/home/admin/.ssh/id_ed25519");
    }

    #[test]
    fn test_control_paths_distinct_per_target() {
        let a = SshExecutor::new("node1", "root", None);
        let b = SshExecutor::new("node2", "root", None);
        assert_ne!(a.control_path, b.control_path);
    }
}
