//! Fake HAL implementation for testing.
//!
//! Records every launch request without spawning anything and answers from a
//! queue of scripted replies, so executor behaviour can be checked in CI
//! without real binaries, root, or wall-clock waits.

use super::{ProcessExit, ProcessOps, ProcessRequest};
use crate::{HalError, HalResult};
use std::collections::VecDeque;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Output};
use std::sync::{Arc, Mutex, MutexGuard};

/// Operation records for testing and verification.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Command {
        argv: Vec<String>,
        cwd: Option<PathBuf>,
        shell: Option<PathBuf>,
        env_replaced: bool,
        timeout_ms: Option<u128>,
    },
}

/// Scripted answer for the next recorded command.
#[derive(Debug, Clone)]
pub enum FakeReply {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    /// Terminated by a signal the HAL did not send.
    Signaled(i32),
    Timeout,
    NotFound,
    PermissionDenied,
}

impl FakeReply {
    pub fn ok(stdout: impl Into<String>) -> Self {
        FakeReply::Exit {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn fail(code: i32, stderr: impl Into<String>) -> Self {
        FakeReply::Exit {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

#[derive(Debug, Default)]
struct FakeHalState {
    operations: Vec<Operation>,
    replies: VecDeque<FakeReply>,
}

/// Fake HAL that records operations and replays scripted outcomes.
///
/// With no scripted replies left every command "succeeds" with empty output.
#[derive(Debug, Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

impl FakeHal {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeHalState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queue the reply for the next unanswered command.
    pub fn push_reply(&self, reply: FakeReply) -> &Self {
        self.state().replies.push_back(reply);
        self
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.state().operations.clone()
    }

    /// Argument vectors of every recorded command, in order.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.state()
            .operations
            .iter()
            .map(|op| match op {
                Operation::Command { argv, .. } => argv.clone(),
            })
            .collect()
    }

    pub fn operation_count(&self) -> usize {
        self.state().operations.len()
    }

    /// Clear recorded operations and pending replies.
    pub fn clear(&self) {
        let mut state = self.state();
        state.operations.clear();
        state.replies.clear();
    }
}

fn exit_status(code: i32) -> ExitStatus {
    // Wait status layout: exit code lives in the second byte.
    ExitStatus::from_raw((code & 0xff) << 8)
}

impl ProcessOps for FakeHal {
    fn run(&self, request: &ProcessRequest) -> HalResult<ProcessExit> {
        let reply = {
            let mut state = self.state();
            state.operations.push(Operation::Command {
                argv: request.argv.clone(),
                cwd: request.cwd.clone(),
                shell: request.shell.clone(),
                env_replaced: request.env.is_some(),
                timeout_ms: request.timeout.map(|t| t.as_millis()),
            });
            state.replies.pop_front().unwrap_or_else(|| FakeReply::ok(""))
        };

        match reply {
            FakeReply::Exit {
                code,
                stdout,
                stderr,
            } => Ok(ProcessExit::Completed(Output {
                status: exit_status(code),
                stdout: stdout.into_bytes(),
                stderr: stderr.into_bytes(),
            })),
            FakeReply::Signaled(signal) => Ok(ProcessExit::Completed(Output {
                status: ExitStatus::from_raw(signal & 0x7f),
                stdout: Vec::new(),
                stderr: Vec::new(),
            })),
            FakeReply::Timeout => Ok(ProcessExit::TimedOut),
            FakeReply::NotFound => Err(HalError::CommandNotFound(request.program())),
            FakeReply::PermissionDenied => Err(HalError::PermissionDenied(request.program())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn records_requests_and_defaults_to_success() {
        let hal = FakeHal::new();
        let mut req = ProcessRequest::new(vec!["ls".into(), "-la".into()]);
        req.timeout = Some(Duration::from_secs(2));

        let exit = hal.run(&req).unwrap();
        match exit {
            ProcessExit::Completed(out) => assert_eq!(out.status.code(), Some(0)),
            ProcessExit::TimedOut => panic!("unexpected timeout"),
        }
        assert_eq!(
            hal.operations(),
            vec![Operation::Command {
                argv: vec!["ls".into(), "-la".into()],
                cwd: None,
                shell: None,
                env_replaced: false,
                timeout_ms: Some(2000),
            }]
        );
    }

    #[test]
    fn replies_are_consumed_in_order() {
        let hal = FakeHal::new();
        hal.push_reply(FakeReply::fail(2, "bad"))
            .push_reply(FakeReply::Timeout)
            .push_reply(FakeReply::NotFound);
        let req = ProcessRequest::new(vec!["x".into()]);

        match hal.run(&req).unwrap() {
            ProcessExit::Completed(out) => {
                assert_eq!(out.status.code(), Some(2));
                assert_eq!(out.stderr, b"bad");
            }
            ProcessExit::TimedOut => panic!("expected exit"),
        }
        assert!(matches!(hal.run(&req).unwrap(), ProcessExit::TimedOut));
        assert!(matches!(hal.run(&req), Err(HalError::CommandNotFound(ref p)) if p == "x"));
        assert_eq!(hal.operation_count(), 3);
    }

    #[test]
    fn signaled_reply_has_no_exit_code() {
        let hal = FakeHal::new();
        hal.push_reply(FakeReply::Signaled(15));
        match hal.run(&ProcessRequest::new(vec!["x".into()])).unwrap() {
            ProcessExit::Completed(out) => {
                assert_eq!(out.status.code(), None);
                assert_eq!(out.status.signal(), Some(15));
            }
            ProcessExit::TimedOut => panic!("expected exit"),
        }
    }

    #[test]
    fn clear_drops_history_and_replies() {
        let hal = FakeHal::new();
        hal.push_reply(FakeReply::Timeout);
        hal.run(&ProcessRequest::new(vec!["a".into()])).unwrap();
        hal.push_reply(FakeReply::Timeout);
        hal.clear();
        assert_eq!(hal.operation_count(), 0);
        assert!(matches!(
            hal.run(&ProcessRequest::new(vec!["b".into()])).unwrap(),
            ProcessExit::Completed(_)
        ));
    }
}
