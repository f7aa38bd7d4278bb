//! Linux HAL implementation spawning real processes.

use super::{ProcessExit, ProcessOps, ProcessRequest};
use crate::{HalError, HalResult};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io::{self, Read};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Output, Stdio};
use std::thread::JoinHandle;
use wait_timeout::ChildExt;

/// Real process backend for Linux systems.
///
/// Children stay in the caller's process group unless
/// [`LinuxHal::with_process_group`] says otherwise, so they can still read the
/// controlling terminal (a `sudo` password prompt) and receive Ctrl-C.
#[derive(Debug, Clone, Default)]
pub struct LinuxHal {
    kill_process_group: bool,
}

impl LinuxHal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn each child in its own process group so a timeout kill reaches
    /// its descendants too. Off by default: a child in a background group is
    /// stopped with SIGTTIN as soon as it reads the terminal, and terminal
    /// signals no longer reach it.
    pub fn with_process_group(mut self, enabled: bool) -> Self {
        self.kill_process_group = enabled;
        self
    }

    fn build_command(&self, request: &ProcessRequest) -> HalResult<Command> {
        let mut cmd = match &request.shell {
            Some(shell) => {
                let mut cmd = Command::new(shell);
                cmd.arg("-c").arg(request.argv.join(" "));
                cmd
            }
            None => {
                let (program, args) = request.argv.split_first().ok_or_else(|| {
                    HalError::Io(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "empty argument vector",
                    ))
                })?;
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
        };

        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(env) = &request.env {
            cmd.env_clear();
            cmd.envs(env);
        }

        // Avoid commands hanging waiting for input.
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if self.kill_process_group {
            cmd.process_group(0);
        }
        Ok(cmd)
    }
}

/// Read a pipe to EOF on its own thread so neither stream can fill up and
/// block the child.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// RAII guard that kills and reaps a child when dropped.
#[derive(Debug)]
struct ChildGuard {
    child: Child,
    process_group: bool,
    active: bool,
}

impl ChildGuard {
    fn new(child: Child, process_group: bool) -> Self {
        Self {
            child,
            process_group,
            active: true,
        }
    }

    /// The child exited on its own; nothing left to clean up.
    fn release(&mut self) {
        self.active = false;
    }

    /// Send a single SIGKILL (to the whole group when possible) and reap.
    fn kill(&mut self) {
        self.active = false;
        let pid = self.child.id();
        let mut signalled = false;
        if self.process_group {
            match i32::try_from(pid) {
                Ok(raw) => match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
                    Ok(()) => signalled = true,
                    Err(err) => log::warn!("killpg({}) failed: {}; killing leader only", raw, err),
                },
                Err(_) => log::warn!("pid {} does not fit a process group id", pid),
            }
        }
        if !signalled {
            if let Err(err) = self.child.kill() {
                log::warn!("failed to kill pid {}: {}", pid, err);
            }
        }
        if let Err(err) = self.child.wait() {
            log::warn!("failed to reap pid {}: {}", pid, err);
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.active {
            self.kill();
        }
    }
}

impl ProcessOps for LinuxHal {
    fn run(&self, request: &ProcessRequest) -> HalResult<ProcessExit> {
        let program = request.program();
        let mut cmd = self.build_command(request)?;
        let mut child = cmd
            .spawn()
            .map_err(|e| HalError::from_spawn(&program, e))?;

        let stdout_handle = drain(child.stdout.take());
        let stderr_handle = drain(child.stderr.take());
        let mut guard = ChildGuard::new(child, self.kill_process_group);

        let status = match request.timeout {
            Some(timeout) => match guard.child.wait_timeout(timeout).map_err(HalError::Wait)? {
                Some(status) => status,
                None => {
                    log::debug!("{} exceeded {:?}, killing", program, timeout);
                    guard.kill();
                    // Output is discarded here. A surviving descendant may
                    // still hold the pipes, so the readers are left detached.
                    drop(stdout_handle);
                    drop(stderr_handle);
                    return Ok(ProcessExit::TimedOut);
                }
            },
            None => guard.child.wait().map_err(HalError::Wait)?,
        };
        guard.release();

        let stdout = stdout_handle.join().unwrap_or_default();
        let stderr = stderr_handle.join().unwrap_or_default();
        Ok(ProcessExit::Completed(Output {
            status,
            stdout,
            stderr,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::{Duration, Instant};

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn completed(exit: ProcessExit) -> Output {
        match exit {
            ProcessExit::Completed(output) => output,
            ProcessExit::TimedOut => panic!("unexpected timeout"),
        }
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let hal = LinuxHal::new();
        let out = completed(hal.run(&ProcessRequest::new(argv(&["echo", "hello"]))).unwrap());
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout), "hello\n");
        assert!(out.stderr.is_empty());
    }

    #[test]
    fn captures_stderr_and_nonzero_exit() {
        let hal = LinuxHal::new();
        let req = ProcessRequest::new(argv(&["/bin/sh", "-c", "echo oops >&2; exit 3"]));
        let out = completed(hal.run(&req).unwrap());
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&out.stderr), "oops\n");
    }

    #[test]
    fn missing_program_is_command_not_found() {
        let hal = LinuxHal::new();
        let req = ProcessRequest::new(argv(&["definitely-not-a-real-binary-cmdrun"]));
        let err = hal.run(&req).unwrap_err();
        assert!(matches!(err, HalError::CommandNotFound(_)), "got {err:?}");
    }

    #[test]
    fn empty_argv_is_rejected() {
        let hal = LinuxHal::new();
        assert!(hal.run(&ProcessRequest::new(Vec::new())).is_err());
    }

    #[test]
    fn timeout_kills_and_reports_timed_out() {
        let hal = LinuxHal::new();
        let mut req = ProcessRequest::new(argv(&["sleep", "10"]));
        req.timeout = Some(Duration::from_millis(300));

        let started = Instant::now();
        let exit = hal.run(&req).unwrap();
        assert!(matches!(exit, ProcessExit::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    fn pid_is_gone(pid: i32) -> bool {
        // A killed grandchild is reaped by init, not by us; give it a moment.
        for _ in 0..50 {
            let stat = match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
                Ok(stat) => stat,
                Err(_) => return true,
            };
            // State follows the parenthesised command name.
            if stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z'))
            {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        false
    }

    fn read_pid(path: &std::path::Path) -> i32 {
        std::fs::read_to_string(path).unwrap().trim().parse().unwrap()
    }

    #[test]
    fn children_share_the_callers_process_group_by_default() {
        let hal = LinuxHal::new();
        let req = ProcessRequest::new(argv(&["/bin/sh", "-c", "cut -d' ' -f5 /proc/$$/stat"]));
        let out = completed(hal.run(&req).unwrap());
        let child_pgrp: i32 = String::from_utf8_lossy(&out.stdout).trim().parse().unwrap();
        assert_eq!(child_pgrp, nix::unistd::getpgrp().as_raw());
    }

    #[test]
    fn process_group_mode_isolates_the_child() {
        let hal = LinuxHal::new().with_process_group(true);
        let req = ProcessRequest::new(argv(&["/bin/sh", "-c", "cut -d' ' -f5 /proc/$$/stat"]));
        let out = completed(hal.run(&req).unwrap());
        let child_pgrp: i32 = String::from_utf8_lossy(&out.stdout).trim().parse().unwrap();
        assert_ne!(child_pgrp, nix::unistd::getpgrp().as_raw());
    }

    #[test]
    fn timeout_does_not_wait_on_surviving_descendants() {
        // The backgrounded sleep inherits the pipes and outlives the shell
        // when only the shell is killed; the timeout must not wait for it.
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("bg.pid");
        let hal = LinuxHal::new();
        let script = format!("sleep 3 & echo $! > {}; wait", pid_file.display());
        let mut req = ProcessRequest::new(argv(&["/bin/sh", "-c", &script]));
        req.timeout = Some(Duration::from_millis(300));

        let started = Instant::now();
        let exit = hal.run(&req).unwrap();
        assert!(matches!(exit, ProcessExit::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn group_timeout_kills_background_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("bg.pid");
        let hal = LinuxHal::new().with_process_group(true);
        let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());
        let mut req = ProcessRequest::new(argv(&["/bin/sh", "-c", &script]));
        req.timeout = Some(Duration::from_millis(300));

        let started = Instant::now();
        let exit = hal.run(&req).unwrap();
        assert!(matches!(exit, ProcessExit::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(pid_is_gone(read_pid(&pid_file)), "background sleep survived");
    }

    #[test]
    fn env_overrides_replace_inherited_environment() {
        let hal = LinuxHal::new();
        let mut env = BTreeMap::new();
        env.insert("CMDRUN_ONLY".to_string(), "1".to_string());
        let mut req = ProcessRequest::new(argv(&["/usr/bin/env"]));
        req.env = Some(env);

        let out = completed(hal.run(&req).unwrap());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "CMDRUN_ONLY=1");
    }

    #[test]
    fn runs_in_requested_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();

        let hal = LinuxHal::new();
        let mut req = ProcessRequest::new(argv(&["ls"]));
        req.cwd = Some(dir.path().to_path_buf());

        let out = completed(hal.run(&req).unwrap());
        assert!(String::from_utf8_lossy(&out.stdout).contains("marker.txt"));
    }

    #[test]
    fn shell_mode_interprets_the_joined_line() {
        let hal = LinuxHal::new();
        let mut req = ProcessRequest::new(argv(&["echo", "$((1+2))"]));
        req.shell = Some("/bin/sh".into());

        let out = completed(hal.run(&req).unwrap());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "3");
    }

    #[test]
    fn large_output_does_not_deadlock() {
        let hal = LinuxHal::new();
        let mut req = ProcessRequest::new(argv(&[
            "/bin/sh",
            "-c",
            "i=0; while [ $i -lt 20000 ]; do echo line-$i; echo err-$i >&2; i=$((i+1)); done",
        ]));
        req.timeout = Some(Duration::from_secs(30));

        let out = completed(hal.run(&req).unwrap());
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).lines().count(), 20000);
        assert_eq!(String::from_utf8_lossy(&out.stderr).lines().count(), 20000);
    }

    const TTY_HELPER_ENV: &str = "CMDRUN_TTY_HELPER";

    #[test]
    #[ignore = "driven under a pseudo-terminal by terminal_prompt_is_answered"]
    fn tty_prompt_helper() {
        if std::env::var_os(TTY_HELPER_ENV).is_none() {
            return;
        }
        let hal = LinuxHal::new();
        let mut req = ProcessRequest::new(argv(&[
            "/bin/sh",
            "-c",
            "read x < /dev/tty; echo got:$x",
        ]));
        req.timeout = Some(Duration::from_secs(10));
        match hal.run(&req).unwrap() {
            ProcessExit::Completed(out) => {
                println!("TTY_RESULT {}", String::from_utf8_lossy(&out.stdout).trim())
            }
            ProcessExit::TimedOut => println!("TTY_RESULT timed-out"),
        }
    }

    #[test]
    fn terminal_prompt_is_answered() {
        // A child that reads /dev/tty (like a sudo password prompt) must stay
        // in the foreground group. `script` provides the pseudo-terminal.
        use std::io::Write;

        let exe = std::env::current_exe().unwrap();
        let inner = format!(
            "{} --exact hal::linux_hal::tests::tty_prompt_helper --ignored --nocapture --test-threads=1",
            exe.display()
        );
        let mut script = Command::new("script");
        script
            .args(["-qec", &inner, "/dev/null"])
            .env(TTY_HELPER_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        let mut child = match script.spawn() {
            Ok(child) => child,
            Err(err) => {
                eprintln!("skipping: `script` unavailable: {}", err);
                return;
            }
        };

        std::thread::sleep(Duration::from_secs(1));
        let mut stdin = child.stdin.take().unwrap();
        stdin.write_all(b"secret\n").unwrap();
        stdin.flush().unwrap();
        let stdout_handle = drain(child.stdout.take());

        let finished = child.wait_timeout(Duration::from_secs(30)).unwrap();
        if finished.is_none() {
            let _ = child.kill();
            let _ = child.wait();
            panic!("pseudo-terminal session hung");
        }
        drop(stdin);
        let stdout = String::from_utf8_lossy(&stdout_handle.join().unwrap()).into_owned();
        if !stdout.contains("TTY_RESULT") {
            eprintln!("skipping: no pseudo-terminal available: {:?}", stdout);
            return;
        }
        assert!(stdout.contains("TTY_RESULT got:secret"), "got {:?}", stdout);
    }
}
