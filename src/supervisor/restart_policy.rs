use crate::config::RestartConfig;
use crate::defaults::RESTART_WINDOW;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Decides whether a restart is allowed right now and how long to wait around it.
///
/// The restart history is the only input to rate limiting. Entries older than the
/// one hour window are pruned every time it is read or written.
#[derive(Clone, Debug)]
pub struct RestartPolicy {
    history: VecDeque<Instant>,
    window: Duration,
    max_restarts_per_hour: usize,
    rate_limit_cooldown: Duration,
    backoff: Backoff,
}

impl RestartPolicy {
    pub fn new(config: &RestartConfig) -> Self {
        Self {
            history: VecDeque::new(),
            window: RESTART_WINDOW,
            max_restarts_per_hour: config.max_restarts_per_hour,
            rate_limit_cooldown: config.rate_limit_cooldown,
            backoff: Backoff {
                base: config.backoff_base,
                cap_exponent: config.backoff_cap_exponent,
                max: config.backoff_max,
            },
        }
    }

    pub fn record_restart(&mut self, now: Instant) {
        self.history.push_back(now);
        self.prune(now);
    }

    pub fn is_rate_limited(&mut self, now: Instant) -> bool {
        self.restarts_in_window(now) >= self.max_restarts_per_hour
    }

    pub fn restarts_in_window(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.history.len()
    }

    pub fn cooldown_after_rate_limit(&self) -> Duration {
        self.rate_limit_cooldown
    }

    /// Forgets every restart, once a cooldown has been served.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Delay after the `failure_streak`-th consecutive failed relaunch, counted from zero.
    pub fn backoff_for_failed_restart(&self, failure_streak: u32) -> Duration {
        exponential(failure_streak, &self.backoff)
    }

    fn prune(&mut self, now: Instant) {
        while self
            .history
            .front()
            .is_some_and(|restart| now.saturating_duration_since(*restart) > self.window)
        {
            self.history.pop_front();
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Backoff {
    base: Duration,
    cap_exponent: u32,
    max: Duration,
}

/// exponential returns a delay growing in base 2 up to the capped exponent, clamped to the maximum
fn exponential(tries: u32, backoff: &Backoff) -> Duration {
    let base: u32 = 2;
    base.checked_pow(tries.min(backoff.cap_exponent))
        .and_then(|factor| backoff.base.checked_mul(factor))
        .map_or(backoff.max, |delay| delay.min(backoff.max))
}
