//! Executor configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) is valid.
//! `CMDRUN_CONFIG` points [`ExecutorConfig::load_default`] at a file.

use crate::command::{Elevation, DEFAULT_ELEVATION_PROGRAM};
use crate::errors::{ConfigError, Result};
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "CMDRUN_CONFIG";
pub const DEFAULT_SHELL: &str = "/bin/sh";
pub const DEFAULT_APP_NAME: &str = "cmdrun";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    pub elevation: ElevationConfig,
    pub execution: ExecutionConfig,
    pub console: ConsoleConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ElevationConfig {
    pub enabled: bool,
    pub user: Option<String>,
    /// Elevation invoker placed in front of every elevated command.
    pub program: String,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            user: None,
            program: DEFAULT_ELEVATION_PROGRAM.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Applied only when a call does not pass its own timeout.
    pub default_timeout_secs: Option<f64>,
    pub shell: PathBuf,
    /// Start children in their own process group so a timeout also kills
    /// their descendants. Such children can no longer prompt on the
    /// terminal (they get SIGTTIN), which rules this out for `sudo` calls
    /// that may ask for a password.
    pub kill_process_group: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: None,
            shell: PathBuf::from(DEFAULT_SHELL),
            kill_process_group: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleConfig {
    pub app_name: String,
    pub debug: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            debug: false,
        }
    }
}

impl ExecutorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(text).context("failed to parse executor config TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Load from `$CMDRUN_CONFIG` when set, otherwise use defaults.
    pub fn load_default() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.elevation.program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "elevation.program must not be empty".into(),
            ));
        }
        if self.execution.shell.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("execution.shell must not be empty".into()));
        }
        if let Some(secs) = self.execution.default_timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "execution.default_timeout_secs must be a positive number, got {}",
                    secs
                )));
            }
        }
        Ok(())
    }

    pub fn elevation_defaults(&self) -> Elevation {
        Elevation::new(self.elevation.enabled, self.elevation.user.clone())
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.execution
            .default_timeout_secs
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64)
    }
}
