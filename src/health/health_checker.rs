use super::log_inspector::LogHealthInspector;
use super::verdict::{HealthReport, HealthState};
use crate::command::worker_slot::WorkerSlot;
use crate::event::cancellation::CancellationMessage;
use crate::event::channel::EventConsumer;
use crate::utils::thread_context::{NotStartedThreadContext, StartedThreadContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, dispatcher, info, warn, Dispatch};

pub const HEALTH_CHECKER_THREAD_NAME: &str = "health_checker";

/// A type that implements a health checking mechanism.
pub trait HealthChecker {
    fn check_health(&self) -> HealthReport;
}

/// Checks the supervised worker: liveness first, then log freshness, then recent errors.
pub struct WorkerHealthChecker {
    worker: Arc<WorkerSlot>,
    inspector: LogHealthInspector,
}

impl WorkerHealthChecker {
    pub fn new(worker: Arc<WorkerSlot>, inspector: LogHealthInspector) -> Self {
        Self { worker, inspector }
    }
}

impl HealthChecker for WorkerHealthChecker {
    fn check_health(&self) -> HealthReport {
        if !self.worker.is_alive() {
            return HealthReport::dead();
        }

        // Unreadable logs are an unknown signal, not a failing one.
        let log_fresh = self.inspector.is_log_fresh().unwrap_or_else(|err| {
            warn!("Unable to check log freshness: {err}");
            true
        });
        if !log_fresh {
            return HealthReport {
                log_fresh,
                ..HealthReport::healthy()
            };
        }

        let error_free = self
            .inspector
            .has_recent_error()
            .map(|found| !found)
            .unwrap_or_else(|err| {
                warn!("Unable to scan log for errors: {err}");
                true
            });
        HealthReport {
            error_free,
            ..HealthReport::healthy()
        }
    }
}

/// Runs `health_checker` every `interval` until the returned context is stopped.
///
/// Checks are skipped while monitoring is paused and their results are recorded
/// against the generation they started in.
pub fn spawn_health_checker<H>(
    health_checker: H,
    health_state: Arc<HealthState>,
    interval: Duration,
) -> StartedThreadContext
where
    H: HealthChecker + Send + 'static,
{
    // Keep the caller's subscriber and span, so health logs read like the rest.
    let dispatch = dispatcher::get_default(|d: &Dispatch| d.clone());
    let span = tracing::Span::current();

    let callback = move |stop_consumer: EventConsumer<CancellationMessage>| {
        let _guard = dispatcher::set_default(&dispatch);
        let _enter = span.enter();

        loop {
            if let Some(generation) = health_state.begin_check() {
                let report = health_checker.check_health();

                match health_state.record(generation, report) {
                    Some(verdict) if verdict.recovered => info!("Worker health restored"),
                    Some(verdict) if !verdict.report.is_healthy() => warn!(
                        consecutive_failures = verdict.consecutive_failures,
                        "Worker health check failed: {}", verdict.report
                    ),
                    Some(_) => debug!("Worker is healthy"),
                    None => debug!("Discarding health check that finished after a restart"),
                }
            }

            if stop_consumer.is_cancelled_with_timeout(interval) {
                debug!("Health checker stopped");
                break;
            }
        }
    };

    NotStartedThreadContext::new(HEALTH_CHECKER_THREAD_NAME, callback).start()
}
