//! Command construction: tokenizing, sudo prefixing and per-call options.
//!
//! Everything here is pure. Nothing is spawned until the executor hands a
//! [`CommandSpec`] to the HAL.

use cmdrun_error::ConstructionError;
use cmdrun_hal::ProcessRequest;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ELEVATION_PROGRAM: &str = "sudo";
/// Flag that makes the elevation program switch to a specific user.
pub const USER_SELECTOR: &str = "-u";

/// A command as the caller handed it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandInput {
    /// Whitespace-delimited line. No quoting or escaping: an argument
    /// containing spaces needs [`CommandInput::Tokens`].
    Line(String),
    Tokens(Vec<String>),
}

impl CommandInput {
    pub fn tokens(&self) -> Vec<String> {
        match self {
            CommandInput::Line(line) => tokenize(line),
            CommandInput::Tokens(tokens) => tokens.clone(),
        }
    }
}

impl From<&str> for CommandInput {
    fn from(line: &str) -> Self {
        CommandInput::Line(line.to_string())
    }
}

impl From<String> for CommandInput {
    fn from(line: String) -> Self {
        CommandInput::Line(line)
    }
}

impl From<Vec<String>> for CommandInput {
    fn from(tokens: Vec<String>) -> Self {
        CommandInput::Tokens(tokens)
    }
}

impl From<Vec<&str>> for CommandInput {
    fn from(tokens: Vec<&str>) -> Self {
        CommandInput::Tokens(tokens.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for CommandInput {
    fn from(tokens: &[&str]) -> Self {
        CommandInput::Tokens(tokens.iter().map(|t| t.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for CommandInput {
    fn from(tokens: [&str; N]) -> Self {
        CommandInput::Tokens(tokens.iter().map(|t| t.to_string()).collect())
    }
}

/// Whether (and as whom) to run through the elevation program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Elevation {
    pub enabled: bool,
    /// `None` means the elevation program's default identity (root).
    pub user: Option<String>,
}

impl Elevation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn root() -> Self {
        Self {
            enabled: true,
            user: None,
        }
    }

    pub fn as_user(user: impl Into<String>) -> Self {
        Self::new(true, Some(user.into()))
    }

    /// An empty user name counts as "no user".
    pub fn new(enabled: bool, user: Option<String>) -> Self {
        Self {
            enabled,
            user: user.filter(|u| !u.is_empty()),
        }
    }
}

/// Split on whitespace. Quotes and backslashes are ordinary characters.
pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Single-space join of the final tokens.
pub fn render(tokens: &[String]) -> String {
    tokens.join(" ")
}

/// Build the final argument vector, prefixed for elevation when enabled.
pub fn assemble(
    input: &CommandInput,
    elevation: &Elevation,
    invoker: &str,
) -> Result<Vec<String>, ConstructionError> {
    let tokens = input.tokens();
    validate_tokens(&tokens)?;

    if !elevation.enabled {
        return Ok(tokens);
    }

    let mut argv = Vec::with_capacity(tokens.len() + 3);
    argv.push(invoker.to_string());
    if let Some(user) = elevation.user.as_deref().filter(|u| !u.is_empty()) {
        argv.push(USER_SELECTOR.to_string());
        argv.push(user.to_string());
    }
    argv.extend(tokens);
    Ok(argv)
}

fn validate_tokens(tokens: &[String]) -> Result<(), ConstructionError> {
    let program = tokens.first().ok_or(ConstructionError::EmptyCommand)?;
    if program.is_empty() {
        return Err(ConstructionError::EmptyProgram);
    }
    if let Some((index, token)) = tokens.iter().enumerate().find(|(_, t)| t.contains('\0')) {
        return Err(ConstructionError::InvalidToken {
            index,
            token: token.clone(),
        });
    }
    Ok(())
}

/// Per-call execution options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOptions {
    pub timeout: Option<Duration>,
    /// Replaces (not merges with) the inherited environment.
    pub env: Option<BTreeMap<String, String>>,
    pub cwd: Option<PathBuf>,
    /// Hand the rendered line to the system shell instead of exec'ing argv.
    pub shell: bool,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fractional seconds. Infinity (or NaN) leaves the call unbounded.
    pub fn timeout_secs(self, secs: f64) -> Self {
        if !secs.is_finite() {
            return self;
        }
        self.timeout(Duration::from_secs_f64(secs.max(0.0)))
    }

    pub fn env<K, V, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }
}

/// A fully assembled command, ready to launch. Owns no OS resources.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program_and_args: Vec<String>,
    pub elevation: Elevation,
    pub timeout: Option<Duration>,
    pub env: Option<BTreeMap<String, String>>,
    pub cwd: Option<PathBuf>,
    pub use_native_shell: bool,
}

impl CommandSpec {
    pub fn build(
        input: &CommandInput,
        elevation: &Elevation,
        invoker: &str,
        options: &ExecOptions,
    ) -> Result<Self, ConstructionError> {
        Ok(Self {
            program_and_args: assemble(input, elevation, invoker)?,
            elevation: elevation.clone(),
            timeout: options.timeout,
            env: options.env.clone(),
            cwd: options.cwd.clone(),
            use_native_shell: options.shell,
        })
    }

    pub fn rendered(&self) -> String {
        render(&self.program_and_args)
    }

    pub fn into_request(self, shell: &Path) -> ProcessRequest {
        ProcessRequest {
            argv: self.program_and_args,
            env: self.env,
            cwd: self.cwd,
            shell: self.use_native_shell.then(|| shell.to_path_buf()),
            timeout: self.timeout,
        }
    }
}
