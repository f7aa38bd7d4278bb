//! cmdrun core library.
//!
//! Runs external commands (optionally through `sudo`), bounds them with a
//! timeout and turns whatever happened into a [`CommandResult`]. Command-level
//! failures never surface as errors; only a malformed command does.

pub mod command;
pub mod config;
pub mod console;
pub mod errors;
pub mod executor;
pub mod logging;
pub mod registry;
pub mod types;

pub use command::{CommandInput, CommandSpec, Elevation, ExecOptions};
pub use config::ExecutorConfig;
pub use console::{Console, ConsoleLevel, ConsoleManager, MemoryConsole};
pub use errors::{ConfigError, ConstructionError};
pub use executor::CommandManager;
pub use registry::ServiceRegistry;
pub use types::{CommandResult, CommandStatus};
