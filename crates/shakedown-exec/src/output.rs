//! Command output and execution options.

/// Captured result of one command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit status of the command.
    pub exit_code: i32,
    /// Captured stdout, split into lines.
    pub stdout: Vec<String>,
    /// Captured stderr, split into lines.
    pub stderr: Vec<String>,
}

impl CommandOutput {
    /// A successful output with the given stdout lines.
    #[must_use]
    pub fn success(stdout: Vec<String>) -> Self {
        Self { exit_code: 0, stdout, stderr: Vec::new() }
    }

    /// A failed output with the given exit code and stderr.
    #[must_use]
    pub fn failure(exit_code: i32, stderr: &str) -> Self {
        Self {
            exit_code,
            stdout: Vec::new(),
            stderr: stderr.lines().map(str::to_string).collect(),
        }
    }

    /// Whether the command exited zero.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout re-joined into one string.
    #[must_use]
    pub fn stdout_str(&self) -> String {
        self.stdout.join("\n")
    }

    /// Stderr re-joined into one string.
    #[must_use]
    pub fn stderr_str(&self) -> String {
        self.stderr.join("\n")
    }
}

/// Options controlling one command execution.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Return the result even when the command exits non-zero. The caller
    /// inspects `exit_code` itself.
    pub ignore_failure: bool,
    /// Log the command before running it.
    pub log_command: bool,
    /// Log captured output after the command completes. Failures log their
    /// output regardless of this flag.
    pub log_output: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self { ignore_failure: false, log_command: true, log_output: false }
    }
}

impl ExecOptions {
    /// Options that tolerate a non-zero exit status.
    #[must_use]
    pub fn tolerant() -> Self {
        Self { ignore_failure: true, ..Self::default() }
    }

    /// Options that tolerate failure and keep the log quiet. Used for
    /// probe-style commands whose failure is an answer, not an event.
    #[must_use]
    pub fn quiet_probe() -> Self {
        Self { ignore_failure: true, log_command: false, log_output: false }
    }
}

/// Splits raw command output into lines, dropping a trailing empty line.
pub(crate) fn split_lines(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw).lines().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = ExecOptions::default();
        assert!(!opts.ignore_failure);
        assert!(opts.log_command);
        assert!(!opts.log_output);
    }

    #[test]
    fn test_output_helpers() {
        let out = CommandOutput::success(vec!["a".into(), "b".into()]);
        assert!(out.ok());
        assert_eq!(out.stdout_str(), "a\nb");

        let err = CommandOutput::failure(2, "boom\nbang");
        assert!(!err.ok());
        assert_eq!(err.stderr, vec!["boom", "bang"]);
    }

    #[test]
    fn test_split_lines_drops_trailing_newline() {
        assert_eq!(split_lines(b"one\ntwo\n"), vec!["one", "two"]);
        assert_eq!(split_lines(b""), Vec::<String>::new());
    }
}
