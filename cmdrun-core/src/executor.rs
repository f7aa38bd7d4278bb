//! Blocking command executor.
//!
//! One call runs one process to completion (or to its timeout) on the calling
//! thread and always comes back with a [`CommandResult`]. The only error a
//! caller sees is a [`ConstructionError`] for a command that could never run.

use crate::command::{self, CommandInput, CommandSpec, Elevation, ExecOptions};
use crate::config::ExecutorConfig;
use crate::console::Console;
use crate::errors::ConstructionError;
use crate::registry::ServiceRegistry;
use crate::types::{CommandResult, CommandStatus};
use cmdrun_hal::{HalError, LinuxHal, ProcessExit, ProcessOps};
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Output};
use std::sync::Arc;
use std::time::{Duration, Instant};

const LOG_PREFIX: &str = "command";

/// Runs commands through a [`ProcessOps`] backend.
///
/// Elevation defaults are fixed at construction. [`execute_sudo`] passes its
/// elevation down as a value instead of swapping the defaults, so a shared
/// `CommandManager` can serve elevated and plain calls from many threads.
///
/// [`execute_sudo`]: CommandManager::execute_sudo
pub struct CommandManager<P: ProcessOps = LinuxHal> {
    hal: P,
    elevation: Elevation,
    elevation_program: String,
    shell: PathBuf,
    default_timeout: Option<Duration>,
    console: Option<Arc<dyn Console>>,
}

impl CommandManager<LinuxHal> {
    /// Real process backend with the given elevation defaults.
    pub fn new(elevation: Elevation) -> Self {
        Self::with_hal(LinuxHal::new(), elevation)
    }

    pub fn from_config(cfg: &ExecutorConfig) -> Self {
        let hal = LinuxHal::new().with_process_group(cfg.execution.kill_process_group);
        Self::with_config(hal, cfg)
    }
}

impl Default for CommandManager<LinuxHal> {
    fn default() -> Self {
        Self::new(Elevation::none())
    }
}

impl<P: ProcessOps> CommandManager<P> {
    pub fn with_hal(hal: P, elevation: Elevation) -> Self {
        Self {
            hal,
            elevation,
            elevation_program: command::DEFAULT_ELEVATION_PROGRAM.to_string(),
            shell: PathBuf::from(crate::config::DEFAULT_SHELL),
            default_timeout: None,
            console: None,
        }
    }

    pub fn with_config(hal: P, cfg: &ExecutorConfig) -> Self {
        Self {
            hal,
            elevation: cfg.elevation_defaults(),
            elevation_program: cfg.elevation.program.clone(),
            shell: cfg.execution.shell.clone(),
            default_timeout: cfg.default_timeout(),
            console: None,
        }
    }

    /// Pick up an `Arc<dyn Console>` registered in `registry`, if there is one.
    pub fn wire_from(mut self, registry: &ServiceRegistry) -> Self {
        self.console = registry.get::<Arc<dyn Console>>();
        self
    }

    pub fn with_console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = Some(console);
        self
    }

    pub fn set_console(&mut self, console: Arc<dyn Console>) {
        self.console = Some(console);
    }

    pub fn hal(&self) -> &P {
        &self.hal
    }

    /// Elevation applied by [`CommandManager::execute`].
    pub fn elevation(&self) -> &Elevation {
        &self.elevation
    }

    pub fn elevation_program(&self) -> &str {
        &self.elevation_program
    }

    /// Final argv for `input` under the default elevation.
    pub fn build_command(
        &self,
        input: impl Into<CommandInput>,
    ) -> Result<Vec<String>, ConstructionError> {
        command::assemble(&input.into(), &self.elevation, &self.elevation_program)
    }

    pub fn execute(
        &self,
        input: impl Into<CommandInput>,
        options: &ExecOptions,
    ) -> Result<CommandResult, ConstructionError> {
        self.execute_with(input, &self.elevation, options)
    }

    /// Run elevated, as `user` or the invoker's default identity.
    ///
    /// The instance defaults are never touched, so [`CommandManager::elevation`]
    /// reads the same before and after, whatever the outcome.
    pub fn execute_sudo(
        &self,
        input: impl Into<CommandInput>,
        user: Option<&str>,
        options: &ExecOptions,
    ) -> Result<CommandResult, ConstructionError> {
        let elevation = Elevation::new(true, user.map(str::to_string));
        self.execute_with(input, &elevation, options)
    }

    /// Run with an explicit elevation for this call only.
    pub fn execute_with(
        &self,
        input: impl Into<CommandInput>,
        elevation: &Elevation,
        options: &ExecOptions,
    ) -> Result<CommandResult, ConstructionError> {
        let started = Instant::now();
        let spec = CommandSpec::build(&input.into(), elevation, &self.elevation_program, options)?;
        let rendered = spec.rendered();
        self.debug(&format!("Executing command: {}", rendered));

        let mut request = spec.into_request(&self.shell);
        if request.timeout.is_none() {
            request.timeout = self.default_timeout;
        }
        let timeout = request.timeout;

        let outcome = self.hal.run(&request);
        let elapsed_seconds = started.elapsed().as_secs_f64();

        Ok(match outcome {
            Ok(ProcessExit::Completed(output)) => self.completed(rendered, output, elapsed_seconds),
            Ok(ProcessExit::TimedOut) => self.timed_out(rendered, timeout, elapsed_seconds),
            Err(err) => self.launch_failed(rendered, &err, elapsed_seconds),
        })
    }

    fn completed(&self, rendered: String, output: Output, elapsed_seconds: f64) -> CommandResult {
        let exit_code = exit_code(output.status);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let (status, error_detail) = if output.status.success() {
            self.debug(&format!(
                "Command {} completed successfully in {:.2}s",
                rendered, elapsed_seconds
            ));
            (CommandStatus::Success, None)
        } else {
            self.error(&format!(
                "Command {} failed with return code {}",
                rendered, exit_code
            ));
            (CommandStatus::Failed, Some(stderr.clone()))
        };

        CommandResult {
            status,
            exit_code,
            rendered_command: rendered,
            stdout,
            stderr,
            elapsed_seconds,
            error_detail,
        }
    }

    fn timed_out(
        &self,
        rendered: String,
        timeout: Option<Duration>,
        elapsed_seconds: f64,
    ) -> CommandResult {
        let limit = timeout.map(|t| t.as_secs_f64()).unwrap_or(elapsed_seconds);
        self.error(&format!("Command {} timed out after {:.2}s", rendered, limit));
        CommandResult {
            status: CommandStatus::Timeout,
            exit_code: CommandResult::NO_EXIT_CODE,
            rendered_command: rendered,
            stdout: String::new(),
            stderr: String::new(),
            elapsed_seconds,
            error_detail: Some(CommandResult::TIMEOUT_MESSAGE.to_string()),
        }
    }

    fn launch_failed(&self, rendered: String, err: &HalError, elapsed_seconds: f64) -> CommandResult {
        let description = err.to_string();
        self.error(&format!("Command {} failed with error: {}", rendered, description));
        CommandResult {
            status: CommandStatus::Failed,
            exit_code: CommandResult::NO_EXIT_CODE,
            rendered_command: rendered,
            stdout: String::new(),
            stderr: description.clone(),
            elapsed_seconds,
            error_detail: Some(description),
        }
    }

    fn debug(&self, message: &str) {
        if let Some(console) = &self.console {
            console.debug(message, Some(LOG_PREFIX));
        }
    }

    fn error(&self, message: &str) {
        if let Some(console) = &self.console {
            console.error(message, Some(LOG_PREFIX));
        }
    }
}

impl<P: ProcessOps + fmt::Debug> fmt::Debug for CommandManager<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandManager")
            .field("hal", &self.hal)
            .field("elevation", &self.elevation)
            .field("elevation_program", &self.elevation_program)
            .field("shell", &self.shell)
            .field("default_timeout", &self.default_timeout)
            .field("console", &self.console.is_some())
            .finish()
    }
}

/// Real exit code, or `128 + signal` for a signal-terminated process.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(CommandResult::NO_EXIT_CODE)
}
