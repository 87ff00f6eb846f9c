pub mod error;
pub mod restart_policy;
pub mod state;

use crate::command::command_os::{WorkerCommand, WorkerProcess};
use crate::command::competing::kill_competing_instances;
use crate::command::error::LaunchError;
use crate::command::worker_slot::WorkerSlot;
use crate::config::{SupervisorConfig, WatchdogConfig};
use crate::event::channel::EventConsumer;
use crate::event::ApplicationEvent;
use crate::health::health_checker::{spawn_health_checker, HealthChecker, WorkerHealthChecker};
use crate::health::log_inspector::LogHealthInspector;
use crate::health::verdict::HealthState;
use crate::pid_file::{PidFileError, PidFileStore};
use chrono::{DateTime, Local};
use error::SupervisorError;
use restart_policy::RestartPolicy;
use state::SupervisorState;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Outcome of a supervision step that may be cut short by a stop request.
#[derive(Debug, PartialEq)]
enum Step {
    Proceed,
    Stop,
}

/// Keeps one worker process running and healthy until a stop is requested.
pub struct Supervisor<H>
where
    H: HealthChecker + Send + 'static,
{
    command: WorkerCommand,
    health_checker: H,
    worker: Arc<WorkerSlot>,
    health_state: Arc<HealthState>,
    health_interval: Duration,
    restart_policy: RestartPolicy,
    max_failed_restarts: Option<u32>,
    pid_store: PidFileStore,
    match_pattern: String,
    config: SupervisorConfig,
    stop_consumer: EventConsumer<ApplicationEvent>,
    state: SupervisorState,
}

impl Supervisor<WorkerHealthChecker> {
    pub fn from_config(
        config: &WatchdogConfig,
        stop_consumer: EventConsumer<ApplicationEvent>,
    ) -> Self {
        let worker = Arc::new(WorkerSlot::default());
        let health_checker = WorkerHealthChecker::new(
            worker.clone(),
            LogHealthInspector::new(&config.log_file, &config.health),
        );
        let command = WorkerCommand::from_config(&config.worker, config.supervisor.startup_grace);

        Supervisor::new(command, health_checker, worker, config, stop_consumer)
    }
}

impl<H> Supervisor<H>
where
    H: HealthChecker + Send + 'static,
{
    pub fn new(
        command: WorkerCommand,
        health_checker: H,
        worker: Arc<WorkerSlot>,
        config: &WatchdogConfig,
        stop_consumer: EventConsumer<ApplicationEvent>,
    ) -> Self {
        Self {
            command,
            health_checker,
            worker,
            health_state: Arc::new(HealthState::new_paused()),
            health_interval: config.health.interval,
            restart_policy: RestartPolicy::new(&config.restart),
            max_failed_restarts: config.restart.max_failed_restarts,
            pid_store: PidFileStore::new(&config.pid_file),
            match_pattern: config.worker.match_pattern(),
            config: config.supervisor.clone(),
            stop_consumer,
            state: SupervisorState::Stopped,
        }
    }

    /// Supervises the worker until a stop request arrives or supervision can not go on.
    ///
    /// The pid file is held for the whole run and the worker is always terminated on the
    /// way out, whatever the outcome.
    pub fn run(self) -> Result<(), SupervisorError> {
        match self.pid_store.store(std::process::id()) {
            Ok(()) => {}
            Err(err @ PidFileError::RunningProcessAlreadyStored(_)) => return Err(err.into()),
            Err(err) => warn!(path = %self.pid_store.path().display(), "Unable to store pid file: {err}"),
        }

        let health_checker_context = spawn_health_checker(
            self.health_checker,
            self.health_state.clone(),
            self.health_interval,
        );

        let mut run = Run {
            command: self.command,
            worker: self.worker,
            health_state: self.health_state,
            restart_policy: self.restart_policy,
            max_failed_restarts: self.max_failed_restarts,
            match_pattern: self.match_pattern,
            config: self.config,
            stop_consumer: self.stop_consumer,
            state: self.state,
            started_at: Instant::now(),
            last_status: Instant::now(),
        };
        let result = run.supervise();

        // Health checks must not see the worker going down as a failure.
        run.health_state.pause();
        let thread_name = health_checker_context.thread_name().to_string();
        match health_checker_context.stop_blocking() {
            Ok(()) => debug!("{thread_name} stopped"),
            Err(err) => error!("Stopping '{thread_name}': {err}"),
        }

        run.stop_worker();
        run.set_state(SupervisorState::Stopped);

        if let Err(err) = self.pid_store.remove() {
            warn!(path = %self.pid_store.path().display(), "Unable to remove pid file: {err}");
        }
        info!("Watchdog stopped");
        result
    }
}

/// State owned by the main loop once the health checker thread is running.
struct Run {
    command: WorkerCommand,
    worker: Arc<WorkerSlot>,
    health_state: Arc<HealthState>,
    restart_policy: RestartPolicy,
    max_failed_restarts: Option<u32>,
    match_pattern: String,
    config: SupervisorConfig,
    stop_consumer: EventConsumer<ApplicationEvent>,
    state: SupervisorState,
    started_at: Instant,
    last_status: Instant,
}

impl Run {
    fn supervise(&mut self) -> Result<(), SupervisorError> {
        if self.start()? == Step::Stop {
            return Ok(());
        }

        loop {
            if self.is_stop_requested(self.config.main_loop_interval) {
                info!("Stop requested");
                return Ok(());
            }
            self.log_status_if_due();

            match self.health_state.consecutive_failures() {
                0 => self.set_state(SupervisorState::Running),
                _ => self.set_state(SupervisorState::Unhealthy),
            }

            if let Some(failures) = self
                .health_state
                .take_failures_at_least(self.config.failure_threshold)
            {
                warn!("Worker failed {failures} consecutive health checks, restarting it");
                if self.restart()? == Step::Stop {
                    return Ok(());
                }
            }
        }
    }

    /// Initial launch, retried a bounded number of times.
    fn start(&mut self) -> Result<Step, SupervisorError> {
        self.set_state(SupervisorState::Starting);
        let attempts = self.config.max_startup_attempts.max(1);

        let mut attempt = 1;
        loop {
            match self.launch() {
                Ok(worker) => {
                    self.install(worker);
                    return Ok(Step::Proceed);
                }
                Err(err) if attempt >= attempts => {
                    error!(attempt, "Worker failed to start: {err}");
                    return Err(SupervisorError::StartupFailed {
                        attempts,
                        last_error: err,
                    });
                }
                Err(err) => {
                    error!(attempt, "Worker failed to start: {err}");
                    if self.is_stop_requested(self.config.restart_delay) {
                        return Ok(Step::Stop);
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Replaces an unhealthy worker, going through a cooldown when the hourly cap is hit
    /// and backing off while relaunching keeps failing.
    fn restart(&mut self) -> Result<Step, SupervisorError> {
        self.health_state.pause();
        self.set_state(SupervisorState::Restarting);

        let mut failure_streak: u32 = 0;
        loop {
            if self.restart_policy.is_rate_limited(Instant::now()) {
                self.set_state(SupervisorState::Cooldown);
                let cooldown = self.restart_policy.cooldown_after_rate_limit();
                warn!(
                    "Restart limit reached ({} in the last hour), cooling down for {cooldown:?}",
                    self.restart_policy.restarts_in_window(Instant::now())
                );
                if self.is_stop_requested(cooldown) {
                    return Ok(Step::Stop);
                }
                self.restart_policy.clear_history();
                info!("Cooldown finished, restart history cleared");
                self.set_state(SupervisorState::Restarting);
            }

            self.restart_policy.record_restart(Instant::now());
            self.stop_worker();
            if self.is_stop_requested(self.config.restart_delay) {
                return Ok(Step::Stop);
            }

            self.set_state(SupervisorState::Starting);
            let err = match self.launch() {
                Ok(worker) => {
                    self.install(worker);
                    return Ok(Step::Proceed);
                }
                Err(err) => err,
            };

            failure_streak += 1;
            error!(failure_streak, "Worker failed to restart: {err}");
            if self
                .max_failed_restarts
                .is_some_and(|max| failure_streak >= max)
            {
                return Err(SupervisorError::GaveUp(failure_streak));
            }

            let backoff = self
                .restart_policy
                .backoff_for_failed_restart(failure_streak - 1);
            warn!("Retrying worker restart in {backoff:?}");
            self.set_state(SupervisorState::Restarting);
            if self.is_stop_requested(backoff) {
                return Ok(Step::Stop);
            }
        }
    }

    fn launch(&mut self) -> Result<WorkerProcess, LaunchError> {
        let killed = kill_competing_instances(&self.match_pattern);
        if killed > 0 {
            warn!("Killed {killed} competing worker instances before launching");
        }
        info!("Starting worker");
        self.command.launch()
    }

    fn install(&mut self, worker: WorkerProcess) {
        info!(worker_pid = worker.pid(), "Worker running");
        if !worker.startup_output().is_empty() {
            debug!(worker_pid = worker.pid(), "Worker startup output:\n{}", worker.startup_output());
        }
        if let Some(previous) = self.worker.replace(worker) {
            // Not expected: the previous worker is always taken out before relaunching.
            warn!(worker_pid = previous.pid(), "Replacing a worker that was still tracked");
            self.terminate(&previous);
        }
        self.health_state.resume();
        self.set_state(SupervisorState::Running);
    }

    /// Takes the worker out of the slot and terminates it.
    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.terminate(&worker);
        }
    }

    fn terminate(&self, worker: &WorkerProcess) {
        info!(worker_pid = worker.pid(), "Stopping worker");
        match worker.terminate(self.config.termination_timeout) {
            Ok(termination) => {
                info!(worker_pid = worker.pid(), ?termination, "Worker terminated")
            }
            Err(err) => error!(
                worker_pid = worker.pid(),
                "Failed to terminate worker, discarding it: {err}"
            ),
        }
    }

    fn is_stop_requested(&self, timeout: Duration) -> bool {
        self.stop_consumer.is_stop_requested_within(timeout)
    }

    fn set_state(&mut self, state: SupervisorState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Supervisor state changed");
            self.state = state;
        }
    }

    fn log_status_if_due(&mut self) {
        if self.last_status.elapsed() < self.config.status_interval {
            return;
        }
        self.last_status = Instant::now();
        let worker = self.worker.get();
        let last_health = self
            .health_state
            .last_verdict()
            .map(|verdict| verdict.report.to_string());
        info!(
            state = %self.state,
            uptime_secs = self.started_at.elapsed().as_secs(),
            worker_pid = ?self.worker.pid(),
            worker_uptime_secs = ?worker.as_ref().map(|w| w.uptime().as_secs()),
            worker_launched_at = ?worker.as_ref().map(|w| DateTime::<Local>::from(w.launched_at())),
            restarts_last_hour = self.restart_policy.restarts_in_window(Instant::now()),
            last_health = last_health.as_deref().unwrap_or("unknown"),
            "Watchdog status"
        );
    }
}
