//! Process execution trait and its request/outcome types.

use crate::HalResult;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

/// One launch of an external program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessRequest {
    /// Final argument vector; `argv[0]` is the program.
    pub argv: Vec<String>,
    /// When set, replaces the inherited environment entirely.
    pub env: Option<BTreeMap<String, String>>,
    pub cwd: Option<PathBuf>,
    /// Run `<shell> -c "<argv joined by spaces>"` instead of exec'ing argv directly.
    pub shell: Option<PathBuf>,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl ProcessRequest {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            ..Self::default()
        }
    }

    /// Name used in logs and errors for the thing actually exec'd.
    pub fn program(&self) -> String {
        match &self.shell {
            Some(shell) => shell.display().to_string(),
            None => self.argv.first().cloned().unwrap_or_default(),
        }
    }
}

/// How a launched process ended.
#[derive(Debug, Clone)]
pub enum ProcessExit {
    /// Terminated on its own; both streams captured in full.
    Completed(Output),
    /// The timeout elapsed; the process was killed and reaped, output discarded.
    TimedOut,
}

/// Process execution trait (external command runner).
pub trait ProcessOps: Send + Sync {
    /// Launch `request`, wait for it (bounded by its timeout) and collect output.
    ///
    /// `Err` is reserved for launch or wait failures; a non-zero exit is
    /// still `Ok(ProcessExit::Completed(..))`.
    fn run(&self, request: &ProcessRequest) -> HalResult<ProcessExit>;
}

impl<T: ProcessOps + ?Sized> ProcessOps for &T {
    fn run(&self, request: &ProcessRequest) -> HalResult<ProcessExit> {
        (**self).run(request)
    }
}

impl<T: ProcessOps + ?Sized> ProcessOps for std::sync::Arc<T> {
    fn run(&self, request: &ProcessRequest) -> HalResult<ProcessExit> {
        (**self).run(request)
    }
}
