//! Leveled message sink used by the executor.
//!
//! [`ConsoleManager`] renders `[app] [prefix] message` lines and forwards them
//! to the `log` facade. [`MemoryConsole`] keeps lines in memory.

use crate::config::ConsoleConfig;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleLevel {
    Info,
    Debug,
    Warning,
    Error,
    Critical,
}

/// Leveled logging capability. Implementations must not panic on normal input.
pub trait Console: Send + Sync {
    fn info(&self, message: &str, prefix: Option<&str>);
    fn debug(&self, message: &str, prefix: Option<&str>);
    fn warning(&self, message: &str, prefix: Option<&str>);
    fn error(&self, message: &str, prefix: Option<&str>);
    fn critical(&self, message: &str, prefix: Option<&str>);
}

const DEFAULT_APP_NAME: &str = "App";

fn render_line(app_name: &str, message: &str, prefix: Option<&str>) -> String {
    match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => format!("[{}] [{}] {}", app_name, prefix, message),
        None => format!("[{}] {}", app_name, message),
    }
}

/// Console backed by the `log` crate.
#[derive(Debug, Clone)]
pub struct ConsoleManager {
    app_name: String,
    debug: bool,
}

impl ConsoleManager {
    pub fn new(app_name: impl Into<String>, debug: bool) -> Self {
        let app_name = app_name.into();
        Self {
            app_name: if app_name.is_empty() {
                DEFAULT_APP_NAME.to_string()
            } else {
                app_name
            },
            debug,
        }
    }

    pub fn from_config(cfg: &ConsoleConfig) -> Self {
        Self::new(cfg.app_name.clone(), cfg.debug)
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// The exact text a message is emitted as.
    pub fn format(&self, message: &str, prefix: Option<&str>) -> String {
        render_line(&self.app_name, message, prefix)
    }
}

impl Console for ConsoleManager {
    fn info(&self, message: &str, prefix: Option<&str>) {
        log::info!("{}", self.format(message, prefix));
    }

    fn debug(&self, message: &str, prefix: Option<&str>) {
        if self.debug {
            log::debug!("{}", self.format(message, prefix));
        }
    }

    fn warning(&self, message: &str, prefix: Option<&str>) {
        log::warn!("{}", self.format(message, prefix));
    }

    fn error(&self, message: &str, prefix: Option<&str>) {
        log::error!("{}", self.format(message, prefix));
    }

    fn critical(&self, message: &str, prefix: Option<&str>) {
        log::error!("CRITICAL {}", self.format(message, prefix));
    }
}

/// Console that records every emitted line.
#[derive(Debug)]
pub struct MemoryConsole {
    app_name: String,
    debug: bool,
    lines: Mutex<Vec<(ConsoleLevel, String)>>,
}

impl Default for MemoryConsole {
    fn default() -> Self {
        Self::new(false)
    }
}

impl MemoryConsole {
    pub fn new(debug: bool) -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            debug,
            lines: Mutex::new(Vec::new()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Vec<(ConsoleLevel, String)>> {
        match self.lines.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn push(&self, level: ConsoleLevel, message: &str, prefix: Option<&str>) {
        let line = render_line(&self.app_name, message, prefix);
        self.guard().push((level, line));
    }

    pub fn lines(&self) -> Vec<(ConsoleLevel, String)> {
        self.guard().clone()
    }

    /// Lines recorded at `level`, in order.
    pub fn at(&self, level: ConsoleLevel) -> Vec<String> {
        self.guard()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

impl Console for MemoryConsole {
    fn info(&self, message: &str, prefix: Option<&str>) {
        self.push(ConsoleLevel::Info, message, prefix);
    }

    fn debug(&self, message: &str, prefix: Option<&str>) {
        if self.debug {
            self.push(ConsoleLevel::Debug, message, prefix);
        }
    }

    fn warning(&self, message: &str, prefix: Option<&str>) {
        self.push(ConsoleLevel::Warning, message, prefix);
    }

    fn error(&self, message: &str, prefix: Option<&str>) {
        self.push(ConsoleLevel::Error, message, prefix);
    }

    fn critical(&self, message: &str, prefix: Option<&str>) {
        self.push(ConsoleLevel::Critical, message, prefix);
    }
}
