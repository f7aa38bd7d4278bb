use std::io;
use thiserror::Error;

pub type HalResult<T> = Result<T, HalError>;

/// Failures launching or waiting on an external process.
#[derive(Error, Debug)]
pub enum HalError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed waiting for process: {0}")]
    Wait(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl HalError {
    /// Classify a spawn failure the way callers care about it.
    pub fn from_spawn(program: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => HalError::CommandNotFound(program.to_string()),
            io::ErrorKind::PermissionDenied => HalError::PermissionDenied(program.to_string()),
            _ => HalError::Spawn {
                program: program.to_string(),
                source: err,
            },
        }
    }
}

/// Problems with the command itself, detected before anything is spawned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("Command is empty")]
    EmptyCommand,

    #[error("Command program is an empty string")]
    EmptyProgram,

    #[error("Command token {index} contains a NUL byte: {token:?}")]
    InvalidToken { index: usize, token: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
