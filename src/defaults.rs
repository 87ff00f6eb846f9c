use std::time::Duration;

pub const WATCHDOG_NAME: &str = "worker-watchdog";
pub const WATCHDOG_VERSION: &str = env!("CARGO_PKG_VERSION");

// Paths
pub const WATCHDOG_CONFIG_PATH: &str = "/etc/worker-watchdog/config.yaml";
pub const WATCHDOG_PID_FILE_PATH: &str = "/var/run/worker-watchdog/worker-watchdog.pid";
pub const WATCHDOG_CONFIG_ENV_VAR_PREFIX: &str = "WATCHDOG";

// Health checks
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);
pub const LOG_MAX_AGE: Duration = Duration::from_secs(5 * 60);
pub const ERROR_RECENCY_WINDOW: Duration = Duration::from_secs(2 * 60);
pub const LOG_TAIL_BYTES: u64 = 5000;
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn default_error_patterns() -> Vec<String> {
    [
        "dispatch_failed",
        "ClientConnectorError",
        "Connection refused",
        "Network is unreachable",
        "SSL: CERTIFICATE_VERIFY_FAILED",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

// Supervisor loop
pub const MAIN_LOOP_INTERVAL: Duration = Duration::from_secs(10);
pub const FAILURE_THRESHOLD: u32 = 3;
pub const STARTUP_GRACE: Duration = Duration::from_secs(5);
pub const TERMINATION_TIMEOUT: Duration = Duration::from_secs(10);
pub const RESTART_DELAY: Duration = Duration::from_secs(30);
pub const MAX_STARTUP_ATTEMPTS: u32 = 3;
pub const STATUS_INTERVAL: Duration = Duration::from_secs(60 * 60);

// Restart policy
pub const MAX_RESTARTS_PER_HOUR: usize = 12;
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(5 * 60);
pub const BACKOFF_BASE: Duration = Duration::from_secs(30);
pub const BACKOFF_CAP_EXPONENT: u32 = 5;
pub const BACKOFF_MAX: Duration = Duration::from_secs(300);
pub const RESTART_WINDOW: Duration = Duration::from_secs(60 * 60);
