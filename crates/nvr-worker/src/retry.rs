//! Failure tracking and bounded retry budgets for long-running loops.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Consecutive-failure counter that rate limits failure logs.
///
/// Monitor loops run continuously, so a failure that repeats every poll
/// would flood the log. The tracker allows the first few failures through
/// and suppresses the rest until a success resets it.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    /// Log at most `max_logged_failures` failures in a row.
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    /// End the current failure streak.
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 && self.suppressed {
            debug!(
                "Recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Count a failure. Returns whether the caller should log it.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.consecutive_failures <= self.max_logged_failures {
            true
        } else if self.consecutive_failures == self.max_logged_failures + 1 {
            self.suppressed = true;
            warn!(
                "{} failures in a row, further failures are not logged until recovery",
                self.max_logged_failures
            );
            false
        } else {
            false
        }
    }

    /// Length of the current failure streak.
    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }

    /// Forget the failure streak without logging a recovery.
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.suppressed = false;
    }
}

/// A fixed number of attempts separated by a fixed interval.
///
/// Used for model loading: the caller asks `can_attempt` every loop
/// iteration instead of sleeping inside a retry helper, so shutdown stays
/// responsive.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    max_attempts: u32,
    interval: Duration,
    attempts: u32,
    last_attempt: Option<Instant>,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            attempts: 0,
            last_attempt: None,
        }
    }

    /// Whether an attempt is allowed at `now`.
    pub fn can_attempt(&self, now: Instant) -> bool {
        !self.is_exhausted() && self.interval_elapsed(now)
    }

    /// Whether `interval` has passed since the last attempt.
    pub fn interval_elapsed(&self, now: Instant) -> bool {
        match self.last_attempt {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }

    pub fn record_attempt(&mut self, now: Instant) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt = Some(now);
    }

    /// Mark that the interval restarted without consuming an attempt.
    pub fn touch(&mut self, now: Instant) {
        self.last_attempt = Some(now);
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_attempt = None;
    }
}
