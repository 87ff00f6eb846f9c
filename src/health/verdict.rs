use std::fmt::Display;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

/// Monitoring generation a health check was started in.
pub type Generation = u64;

/// Outcome of the individual signals of one health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub alive: bool,
    pub log_fresh: bool,
    pub error_free: bool,
}

impl HealthReport {
    pub fn healthy() -> Self {
        Self {
            alive: true,
            log_fresh: true,
            error_free: true,
        }
    }

    /// The remaining signals are not inspected for a dead worker.
    pub fn dead() -> Self {
        Self {
            alive: false,
            ..Self::healthy()
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.alive && self.log_fresh && self.error_free
    }
}

impl Display for HealthReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_healthy() {
            return write!(f, "healthy");
        }
        let problems: Vec<&str> = [
            (!self.alive).then_some("worker not running"),
            (!self.log_fresh).then_some("log file stale"),
            (!self.error_free).then_some("recent errors in log"),
        ]
        .into_iter()
        .flatten()
        .collect();
        write!(f, "{}", problems.join(", "))
    }
}

/// A recorded health check.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthVerdict {
    pub report: HealthReport,
    /// Failed checks in a row, this one included.
    pub consecutive_failures: u32,
    /// The check passed after at least one failure.
    pub recovered: bool,
    pub checked_at: SystemTime,
}

#[derive(Debug, Default)]
struct Inner {
    last_verdict: Option<HealthVerdict>,
    consecutive_failures: u32,
    paused: bool,
    generation: Generation,
}

/// Health observations shared by the health-check thread and the supervisor loop.
///
/// Only the health-check thread records verdicts; the supervisor reads them, resets the
/// failure counter when it acts on it and pauses monitoring around restarts. Every bump
/// of the generation invalidates the checks that were in flight.
#[derive(Debug, Default)]
pub struct HealthState {
    inner: Mutex<Inner>,
}

impl HealthState {
    pub fn new_paused() -> Self {
        let state = Self::default();
        state.lock().paused = true;
        state
    }

    /// Returns the current generation, or `None` when monitoring is paused.
    pub fn begin_check(&self) -> Option<Generation> {
        let inner = self.lock();
        (!inner.paused).then_some(inner.generation)
    }

    /// Records the report of a check started in `generation`.
    ///
    /// Reports from a paused or outdated generation are discarded and `None` is returned.
    pub fn record(&self, generation: Generation, report: HealthReport) -> Option<HealthVerdict> {
        let mut inner = self.lock();
        if inner.paused || inner.generation != generation {
            return None;
        }

        let recovered = report.is_healthy() && inner.consecutive_failures > 0;
        inner.consecutive_failures = if report.is_healthy() {
            0
        } else {
            inner.consecutive_failures.saturating_add(1)
        };

        let verdict = HealthVerdict {
            report,
            consecutive_failures: inner.consecutive_failures,
            recovered,
            checked_at: SystemTime::now(),
        };
        inner.last_verdict = Some(verdict.clone());
        Some(verdict)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Resets the counter and returns its value if it reached `threshold`. No-op otherwise.
    pub fn take_failures_at_least(&self, threshold: u32) -> Option<u32> {
        let mut inner = self.lock();
        if inner.consecutive_failures < threshold {
            return None;
        }
        Some(std::mem::take(&mut inner.consecutive_failures))
    }

    pub fn pause(&self) {
        let mut inner = self.lock();
        inner.paused = true;
        inner.generation += 1;
    }

    /// Starts monitoring a new incarnation of the worker from a clean slate.
    pub fn resume(&self) {
        let mut inner = self.lock();
        inner.paused = false;
        inner.generation += 1;
        inner.consecutive_failures = 0;
        inner.last_verdict = None;
    }

    pub fn last_verdict(&self) -> Option<HealthVerdict> {
        self.lock().last_verdict.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
