use super::error::{CommandError, LaunchError};
use super::output::OutputCapture;
use crate::config::WorkerConfig;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::ffi::OsStr;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
// Time given to the pipes to close once an early exit has been detected.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
// Wait for the kernel to tear the process down after SIGKILL.
const KILL_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

////////////////////////////////////////////////////////////////////////////////////
// Not started worker
////////////////////////////////////////////////////////////////////////////////////

/// The worker invocation, reusable for every relaunch.
pub struct WorkerCommand {
    cmd: Command,
    startup_grace: Duration,
}

impl WorkerCommand {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        let mut cmd = Command::new(program);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Own process group, so the worker and its children are signalled together.
            .process_group(0);

        Self {
            cmd,
            startup_grace: Duration::ZERO,
        }
    }

    /// Builds the worker invocation: the script, handed to the interpreter when there is one.
    pub fn from_config(worker: &WorkerConfig, startup_grace: Duration) -> Self {
        let command = match &worker.interpreter {
            Some(interpreter) => Self::new(interpreter).arg(&worker.script),
            None => Self::new(&worker.script),
        };
        let command = match &worker.working_dir {
            Some(dir) => command.current_dir(dir),
            None => command,
        };
        command.with_startup_grace(startup_grace)
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.cmd.arg(arg);
        self
    }

    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cmd.current_dir(dir);
        self
    }

    pub fn with_startup_grace(mut self, startup_grace: Duration) -> Self {
        self.startup_grace = startup_grace;
        self
    }

    /// Starts the worker and watches it for the startup grace period.
    ///
    /// Output is captured during that period; if the worker exits before it elapses the
    /// launch fails with the exit code and whatever the worker printed.
    pub fn launch(&mut self) -> Result<WorkerProcess, LaunchError> {
        let mut child = self.cmd.spawn().map_err(CommandError::from)?;
        let pid = child.id();

        let mut capture = OutputCapture::new();
        let stdout = child
            .stdout
            .take()
            .ok_or(CommandError::StreamPipeError("stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(CommandError::StreamPipeError("stderr".to_string()))?;
        capture.read(stdout, "stdout", pid);
        capture.read(stderr, "stderr", pid);

        debug!(worker_pid = pid, "Worker spawned, waiting {:?} for startup", self.startup_grace);

        let deadline = Instant::now() + self.startup_grace;
        loop {
            if let Some(status) = child.try_wait().map_err(CommandError::from)? {
                // Children left in the group could keep the pipes open.
                if let Err(err) = signal_group(pid, Signal::SIGKILL) {
                    debug!(worker_pid = pid, "Cleaning up worker group failed: {err}");
                }
                return Err(LaunchError::ExitedEarly {
                    exit_code: status.code(),
                    captured_output: capture.drain(OUTPUT_DRAIN_TIMEOUT),
                });
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
        }

        let startup_output = capture.finish();
        info!(worker_pid = pid, "Worker started");

        Ok(WorkerProcess {
            child: Mutex::new(child),
            pid,
            launched_at: Instant::now(),
            launched_at_wall: SystemTime::now(),
            startup_output,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////
// Started worker
////////////////////////////////////////////////////////////////////////////////////

/// How a worker ended up stopped after `terminate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    AlreadyExited,
    Graceful,
    Forced,
}

/// A live worker, leader of its own process group.
#[derive(Debug)]
pub struct WorkerProcess {
    child: Mutex<Child>,
    pid: u32,
    launched_at: Instant,
    launched_at_wall: SystemTime,
    startup_output: String,
}

impl WorkerProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The worker leads its own group, so the group id is its pid.
    pub fn process_group(&self) -> u32 {
        self.pid
    }

    pub fn launched_at(&self) -> SystemTime {
        self.launched_at_wall
    }

    pub fn uptime(&self) -> Duration {
        self.launched_at.elapsed()
    }

    /// Output printed by the worker during the startup grace period.
    pub fn startup_output(&self) -> &str {
        &self.startup_output
    }

    /// Whether the OS still has a live process with the worker pid.
    ///
    /// An exited child is reaped first so a zombie is never reported as alive.
    pub fn is_alive(&self) -> bool {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        match child.try_wait() {
            Ok(Some(_)) => false,
            Ok(None) => pid_exists(self.pid),
            Err(err) => {
                warn!(worker_pid = self.pid, "Unable to query worker status: {err}");
                pid_exists(self.pid)
            }
        }
    }

    pub fn signal_group(&self, signal: Signal) -> Result<(), CommandError> {
        signal_group(self.process_group(), signal)
    }

    /// Stops the worker group: SIGTERM, then SIGKILL if it is still alive after `timeout`.
    pub fn terminate(&self, timeout: Duration) -> Result<Termination, CommandError> {
        if !self.is_alive() {
            // Anything the worker left behind in its group goes too.
            let _ = self.signal_group(Signal::SIGKILL);
            return Ok(Termination::AlreadyExited);
        }

        if let Err(err) = self.signal_group(Signal::SIGTERM) {
            warn!(worker_pid = self.pid, "Graceful shutdown failed: {err}");
        } else if !self.is_alive_after_timeout(timeout) {
            let _ = self.signal_group(Signal::SIGKILL);
            return Ok(Termination::Graceful);
        }

        warn!(
            worker_pid = self.pid,
            "Worker did not stop within {timeout:?}, killing its process group"
        );
        self.signal_group(Signal::SIGKILL)?;
        if self.is_alive_after_timeout(KILL_WAIT_TIMEOUT) {
            return Err(CommandError::StillAlive(self.pid));
        }
        Ok(Termination::Forced)
    }

    fn is_alive_after_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            if !self.is_alive() {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        self.is_alive()
    }
}

/// Signals a whole process group. A group that no longer exists is not an error.
pub fn signal_group(pgid: u32, signal: Signal) -> Result<(), CommandError> {
    match signal::killpg(Pid::from_raw(pgid as i32), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(CommandError::NixError(err.to_string())),
    }
}

/// Signals a single process. A process that no longer exists is not an error.
pub fn signal_process(pid: u32, signal: Signal) -> Result<(), CommandError> {
    match signal::kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(CommandError::NixError(err.to_string())),
    }
}

/// OS level existence check, a process we are not allowed to signal still exists.
pub fn pid_exists(pid: u32) -> bool {
    matches!(
        signal::kill(Pid::from_raw(pid as i32), None),
        Ok(()) | Err(Errno::EPERM)
    )
}
