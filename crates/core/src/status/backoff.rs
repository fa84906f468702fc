//! Escalating backoff schedules.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded exponential schedule: `initial * factor^(failures - 1)`, capped at `max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffSchedule {
    pub initial_secs: u64,
    pub factor: u32,
    pub max_secs: u64,
}

impl BackoffSchedule {
    pub const fn new(initial_secs: u64, factor: u32, max_secs: u64) -> Self {
        Self {
            initial_secs,
            factor,
            max_secs,
        }
    }

    /// Delay after the given number of consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let mut secs = self.initial_secs.min(self.max_secs);
        for _ in 1..failures {
            if secs >= self.max_secs {
                break;
            }
            secs = secs.saturating_mul(u64::from(self.factor)).min(self.max_secs);
        }
        Duration::from_secs(secs)
    }
}

/// Backoff configuration for one status tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Schedule for generic failures (default: 5 min doubling, capped at 24 h).
    #[serde(default = "default_failure_schedule")]
    pub failure: BackoffSchedule,
    /// Schedule for connect/name-resolution failures (default: 1 min doubling, capped at 1 h).
    #[serde(default = "default_connection_schedule")]
    pub connection: BackoffSchedule,
    /// Suspension applied to rate-limit signals without a retry-after value.
    #[serde(default = "default_rate_limit_secs")]
    pub rate_limit_secs: u64,
}

fn default_failure_schedule() -> BackoffSchedule {
    BackoffSchedule::new(5 * 60, 2, 24 * 60 * 60)
}

fn default_connection_schedule() -> BackoffSchedule {
    BackoffSchedule::new(60, 2, 60 * 60)
}

fn default_rate_limit_secs() -> u64 {
    60 * 60
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            failure: default_failure_schedule(),
            connection: default_connection_schedule(),
            rate_limit_secs: default_rate_limit_secs(),
        }
    }
}

impl BackoffConfig {
    pub fn rate_limit(&self) -> Duration {
        Duration::from_secs(self.rate_limit_secs)
    }

    /// Upper bound on any collaborator-supplied retry-after.
    pub fn max_retry_after(&self) -> Duration {
        Duration::from_secs(self.failure.max_secs.max(self.rate_limit_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_failures_no_delay() {
        assert_eq!(default_failure_schedule().delay(0), Duration::ZERO);
    }

    #[test]
    fn test_doubling_until_cap() {
        let schedule = BackoffSchedule::new(60, 2, 600);
        let delays: Vec<u64> = (1..=6).map(|n| schedule.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![60, 120, 240, 480, 600, 600]);
    }

    #[test]
    fn test_default_schedule_monotonic() {
        let schedule = default_failure_schedule();
        let mut previous = Duration::ZERO;
        for n in 1..=64 {
            let delay = schedule.delay(n);
            assert!(delay >= previous, "delay decreased at failure {}", n);
            assert!(delay <= Duration::from_secs(24 * 60 * 60));
            previous = delay;
        }
    }

    #[test]
    fn test_huge_failure_count_saturates() {
        let schedule = BackoffSchedule::new(1, 10, u64::MAX);
        assert_eq!(schedule.delay(u32::MAX), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_default_schedules_differ() {
        let config = BackoffConfig::default();
        assert_ne!(config.failure.delay(1), config.connection.delay(1));
        assert_eq!(config.rate_limit(), Duration::from_secs(3600));
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
rate_limit_secs = 1800

[connection]
initial_secs = 10
factor = 3
max_secs = 90
"#;
        let config: BackoffConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.rate_limit_secs, 1800);
        assert_eq!(config.connection.delay(3), Duration::from_secs(90));
        assert_eq!(config.failure, default_failure_schedule());
    }
}
