//! A scripted executor for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::output::{CommandOutput, ExecOptions};
use crate::{check_result, Executor};

struct Rule {
    pattern: String,
    output: CommandOutput,
    once: bool,
}

/// An [`Executor`] that replays canned responses instead of touching a real
/// node. Commands are matched by substring; unmatched commands succeed with
/// empty output. Every executed command is recorded in order.
///
/// Shipped in the library (not behind `cfg(test)`) so downstream crates can
/// drive fleets of fake nodes in their own tests.
pub struct ScriptedExecutor {
    target: String,
    rules: Mutex<Vec<Rule>>,
    recorded: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    /// Creates a scripted executor pretending to be `target`.
    #[must_use]
    pub fn new(target: &str) -> Self {
        Self { target: target.to_string(), rules: Mutex::new(Vec::new()), recorded: Mutex::new(Vec::new()) }
    }

    /// Registers a persistent response for commands containing `pattern`.
    /// Later registrations win over earlier ones.
    pub fn respond(&self, pattern: &str, output: CommandOutput) {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            output,
            once: false,
        });
    }

    /// Registers a response consumed by the first matching command. One-shot
    /// rules take priority over persistent ones, oldest first, so a sequence
    /// of `respond_once` calls plays back in order.
    pub fn respond_once(&self, pattern: &str, output: CommandOutput) {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            output,
            once: true,
        });
    }

    /// Shorthand: persistent success with the given stdout lines.
    pub fn succeed_with(&self, pattern: &str, stdout: &[&str]) {
        self.respond(pattern, CommandOutput::success(stdout.iter().map(|s| (*s).to_string()).collect()));
    }

    /// Shorthand: persistent failure with the given exit code and stderr.
    pub fn fail_with(&self, pattern: &str, exit_code: i32, stderr: &str) {
        self.respond(pattern, CommandOutput::failure(exit_code, stderr));
    }

    /// Every command executed so far, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.recorded.lock().unwrap().clone()
    }

    /// Whether any executed command contained `pattern`.
    #[must_use]
    pub fn saw(&self, pattern: &str) -> bool {
        self.recorded.lock().unwrap().iter().any(|c| c.contains(pattern))
    }

    fn lookup(&self, command: &str) -> CommandOutput {
        let mut rules = self.rules.lock().unwrap();
        // One-shot rules first, in registration order.
        if let Some(i) = rules.iter().position(|r| r.once && command.contains(&r.pattern)) {
            return rules.remove(i).output;
        }
        // Persistent rules, newest registration wins.
        rules
            .iter()
            .rev()
            .find(|r| !r.once && command.contains(&r.pattern))
            .map(|r| r.output.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    fn target(&self) -> &str {
        &self.target
    }

    async fn execute(&self, command: &str, opts: &ExecOptions) -> Result<CommandOutput> {
        debug!(target_node = %self.target, command, "scripted command");
        self.recorded.lock().unwrap().push(command.to_string());
        let output = self.lookup(command);
        check_result(&self.target, command, opts, output)
    }
}
