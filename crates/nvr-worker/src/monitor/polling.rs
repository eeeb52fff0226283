use std::time::Duration;

/// Poll interval backoff for segment scanning.
///
/// The interval widens after repeated scans that found nothing new and
/// snaps back to `fast` as soon as a segment is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingPolicy {
    pub fast: Duration,
    pub medium: Duration,
    pub slow: Duration,
    /// Empty scans before switching to `medium`
    pub medium_after: u32,
    /// Empty scans before switching to `slow`
    pub slow_after: u32,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            fast: Duration::from_millis(250),
            medium: Duration::from_millis(500),
            slow: Duration::from_millis(1000),
            medium_after: 5,
            slow_after: 10,
        }
    }
}

impl PollingPolicy {
    pub fn interval_for(&self, empty_checks: u32) -> Duration {
        if empty_checks > self.slow_after {
            self.slow
        } else if empty_checks > self.medium_after {
            self.medium
        } else {
            self.fast
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_widens_with_empty_checks() {
        let policy = PollingPolicy::default();
        assert_eq!(policy.interval_for(0), Duration::from_millis(250));
        assert_eq!(policy.interval_for(5), Duration::from_millis(250));
        assert_eq!(policy.interval_for(6), Duration::from_millis(500));
        assert_eq!(policy.interval_for(11), Duration::from_millis(1000));
        assert_eq!(policy.interval_for(u32::MAX), Duration::from_millis(1000));
    }
}
