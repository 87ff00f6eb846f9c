pub mod presets;
pub mod store;

use crate::defaults::{
    default_error_patterns, BACKOFF_BASE, BACKOFF_CAP_EXPONENT, BACKOFF_MAX,
    ERROR_RECENCY_WINDOW, FAILURE_THRESHOLD, HEALTH_CHECK_INTERVAL, LOG_MAX_AGE, LOG_TAIL_BYTES,
    LOG_TIMESTAMP_FORMAT, MAIN_LOOP_INTERVAL, MAX_RESTARTS_PER_HOUR, MAX_STARTUP_ATTEMPTS,
    RATE_LIMIT_COOLDOWN, RESTART_DELAY, STARTUP_GRACE, STATUS_INTERVAL, TERMINATION_TIMEOUT,
    WATCHDOG_PID_FILE_PATH,
};
use crate::logging::config::LoggingConfig;
use duration_str::deserialize_duration;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum WatchdogConfigError {
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Full configuration of the watchdog.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct WatchdogConfig {
    pub worker: WorkerConfig,
    /// Log file written by the worker, inspected by the health checks.
    pub log_file: PathBuf,
    /// Where the watchdog records its own pid.
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub restart: RestartConfig,
    #[serde(default)]
    pub log: LoggingConfig,
}

fn default_pid_file() -> PathBuf {
    PathBuf::from(WATCHDOG_PID_FILE_PATH)
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct WorkerConfig {
    /// Interpreter the script is handed to. The script is executed directly when absent.
    #[serde(default)]
    pub interpreter: Option<PathBuf>,
    pub script: PathBuf,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Substring identifying leftover worker processes in the OS process table.
    #[serde(default)]
    pub match_pattern: Option<String>,
    /// Environment variables that must be set before the worker can be started.
    #[serde(default)]
    pub required_env: Vec<String>,
}

impl WorkerConfig {
    /// Pattern used to find competing worker instances, defaulting to the script file name.
    pub fn match_pattern(&self) -> String {
        self.match_pattern.clone().unwrap_or_else(|| {
            self.script
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.script.to_string_lossy().into_owned())
        })
    }

    /// Script path as the worker sees it, relative paths are resolved against the working dir.
    pub fn resolved_script(&self) -> PathBuf {
        match &self.working_dir {
            Some(dir) if self.script.is_relative() => dir.join(&self.script),
            _ => self.script.clone(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct HealthConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub log_max_age: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub error_recency: Duration,
    pub tail_bytes: u64,
    pub error_patterns: Vec<String>,
    /// chrono format of the timestamp each worker log line starts with.
    pub timestamp_format: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: HEALTH_CHECK_INTERVAL,
            log_max_age: LOG_MAX_AGE,
            error_recency: ERROR_RECENCY_WINDOW,
            tail_bytes: LOG_TAIL_BYTES,
            error_patterns: default_error_patterns(),
            timestamp_format: LOG_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct SupervisorConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub main_loop_interval: Duration,
    pub failure_threshold: u32,
    #[serde(deserialize_with = "deserialize_duration")]
    pub startup_grace: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub termination_timeout: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub restart_delay: Duration,
    pub max_startup_attempts: u32,
    #[serde(deserialize_with = "deserialize_duration")]
    pub status_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            main_loop_interval: MAIN_LOOP_INTERVAL,
            failure_threshold: FAILURE_THRESHOLD,
            startup_grace: STARTUP_GRACE,
            termination_timeout: TERMINATION_TIMEOUT,
            restart_delay: RESTART_DELAY,
            max_startup_attempts: MAX_STARTUP_ATTEMPTS,
            status_interval: STATUS_INTERVAL,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct RestartConfig {
    pub max_restarts_per_hour: usize,
    #[serde(deserialize_with = "deserialize_duration")]
    pub rate_limit_cooldown: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub backoff_base: Duration,
    pub backoff_cap_exponent: u32,
    #[serde(deserialize_with = "deserialize_duration")]
    pub backoff_max: Duration,
    /// Consecutive failed relaunches tolerated before giving up. Unbounded when absent.
    pub max_failed_restarts: Option<u32>,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            max_restarts_per_hour: MAX_RESTARTS_PER_HOUR,
            rate_limit_cooldown: RATE_LIMIT_COOLDOWN,
            backoff_base: BACKOFF_BASE,
            backoff_cap_exponent: BACKOFF_CAP_EXPONENT,
            backoff_max: BACKOFF_MAX,
            max_failed_restarts: None,
        }
    }
}

impl WatchdogConfig {
    /// Checks the configuration and the environment the worker will run in.
    ///
    /// Every problem found is reported, not only the first one.
    pub fn validate(&self) -> Result<(), WatchdogConfigError> {
        self.validate_with_env(|name| std::env::var_os(name))
    }

    pub(crate) fn validate_with_env<E>(&self, env: E) -> Result<(), WatchdogConfigError>
    where
        E: Fn(&str) -> Option<OsString>,
    {
        let mut problems = Vec::new();

        let periods = [
            ("health.interval", self.health.interval),
            ("health.log_max_age", self.health.log_max_age),
            ("health.error_recency", self.health.error_recency),
            ("supervisor.main_loop_interval", self.supervisor.main_loop_interval),
            ("supervisor.termination_timeout", self.supervisor.termination_timeout),
            ("supervisor.status_interval", self.supervisor.status_interval),
            ("restart.backoff_base", self.restart.backoff_base),
        ];
        for (name, value) in periods {
            if value.is_zero() {
                problems.push(format!("`{name}` must be greater than zero"));
            }
        }

        let counters = [
            ("supervisor.failure_threshold", self.supervisor.failure_threshold as u64),
            ("supervisor.max_startup_attempts", self.supervisor.max_startup_attempts as u64),
            ("restart.max_restarts_per_hour", self.restart.max_restarts_per_hour as u64),
            ("health.tail_bytes", self.health.tail_bytes),
        ];
        for (name, value) in counters {
            if value == 0 {
                problems.push(format!("`{name}` must be greater than zero"));
            }
        }

        if self.restart.backoff_max < self.restart.backoff_base {
            problems.push("`restart.backoff_max` must not be lower than `restart.backoff_base`".into());
        }
        if self.health.timestamp_format.trim().is_empty() {
            problems.push("`health.timestamp_format` must not be empty".into());
        }

        if let Some(dir) = &self.worker.working_dir {
            if !dir.is_dir() {
                problems.push(format!("worker working dir `{}` is not a directory", dir.display()));
            }
        }
        check_file_exists(&mut problems, "worker script", &self.worker.resolved_script());
        if let Some(interpreter) = &self.worker.interpreter {
            check_file_exists(&mut problems, "worker interpreter", interpreter);
        }

        for name in &self.worker.required_env {
            match env(name) {
                Some(value) if !value.is_empty() => {}
                _ => problems.push(format!("required environment variable `{name}` is not set")),
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(WatchdogConfigError::Invalid(problems))
        }
    }
}

fn check_file_exists(problems: &mut Vec<String>, what: &str, path: &Path) {
    if !path.is_file() {
        problems.push(format!("{what} `{}` not found", path.display()));
    }
}
