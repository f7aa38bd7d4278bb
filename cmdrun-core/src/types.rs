//! Command status vocabulary and the execution outcome record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a command.
///
/// The executor only ever produces `Success`, `Failed` and `Timeout`; the rest
/// exist for callers orchestrating several commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Success,
    Failed,
    Skipped,
    Running,
    Cancelled,
    Pending,
    Interrupted,
    Timeout,
}

impl CommandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Success => "success",
            CommandStatus::Failed => "failed",
            CommandStatus::Skipped => "skipped",
            CommandStatus::Running => "running",
            CommandStatus::Cancelled => "cancelled",
            CommandStatus::Pending => "pending",
            CommandStatus::Interrupted => "interrupted",
            CommandStatus::Timeout => "timeout",
        }
    }

    /// Whether nothing further can happen to a command in this state.
    pub fn is_terminal(self) -> bool {
        !matches!(self, CommandStatus::Running | CommandStatus::Pending)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one execution attempt. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub status: CommandStatus,
    /// `-1` when there is no real exit code (timeout or launch failure).
    /// A process killed by a signal it was not sent by us reports
    /// `128 + signal` (shell convention), not a negative signal number.
    pub exit_code: i32,
    /// Final argv joined by single spaces. For logs, not for re-execution.
    pub rendered_command: String,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_seconds: f64,
    /// Always present unless `status` is `Success`.
    pub error_detail: Option<String>,
}

impl CommandResult {
    pub const NO_EXIT_CODE: i32 = -1;
    pub const TIMEOUT_MESSAGE: &'static str = "Command timed out";

    pub fn succeeded(&self) -> bool {
        self.status == CommandStatus::Success
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
