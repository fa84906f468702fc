use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health of an externally reachable collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Eligible, no consecutive failures.
    Healthy,
    /// Eligible, failing but the backoff has elapsed.
    Degraded,
    /// Not eligible until the earliest retry time.
    Suspended,
}

/// How a failure should be weighed by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Connect, name-resolution or transport timeout.
    Connection,
    /// Explicit too-many-requests signal.
    RateLimited { retry_after: Option<Duration> },
    /// Unexpected status, content type or payload.
    Generic,
    /// Anything not anticipated by the integration.
    Unclassified,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::RateLimited { .. } => "rate_limited",
            Self::Generic => "generic",
            Self::Unclassified => "unclassified",
        }
    }
}

/// Errors that can be reduced to a failure class.
pub trait Classify {
    fn failure_class(&self) -> FailureClass;
}

/// Mutable health record of one collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_failure: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_recent_failure: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest_retry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_reason: Option<String>,
}

impl ProviderStatus {
    pub fn state_at(&self, now: DateTime<Utc>) -> HealthState {
        if self.consecutive_failures == 0 {
            return HealthState::Healthy;
        }
        match self.earliest_retry {
            Some(retry) if now < retry => HealthState::Suspended,
            _ => HealthState::Degraded,
        }
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) != HealthState::Suspended
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn fail(&mut self, now: DateTime<Utc>, backoff: Duration, reason: &str) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.initial_failure.get_or_insert(now);
        self.most_recent_failure = Some(now);
        let retry = chrono::Duration::from_std(backoff)
            .ok()
            .and_then(|b| now.checked_add_signed(b))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.earliest_retry = Some(retry);
        self.last_failure_reason = Some(reason.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_default_is_healthy() {
        assert_eq!(ProviderStatus::default().state_at(t0()), HealthState::Healthy);
    }

    #[test]
    fn test_fail_suspends_then_degrades() {
        let mut status = ProviderStatus::default();
        status.fail(t0(), Duration::from_secs(60), "HTTP 503");

        assert_eq!(status.consecutive_failures, 1);
        assert_eq!(status.state_at(t0()), HealthState::Suspended);
        assert!(!status.is_eligible(t0() + chrono::Duration::seconds(59)));
        assert_eq!(
            status.state_at(t0() + chrono::Duration::seconds(60)),
            HealthState::Degraded
        );
        assert_eq!(status.last_failure_reason.as_deref(), Some("HTTP 503"));
    }

    #[test]
    fn test_huge_backoff_saturates() {
        let mut status = ProviderStatus::default();
        status.fail(t0(), Duration::from_secs(u64::MAX), "x");
        assert_eq!(status.earliest_retry, Some(DateTime::<Utc>::MAX_UTC));
        assert_eq!(status.state_at(t0()), HealthState::Suspended);
    }

    #[test]
    fn test_initial_failure_kept() {
        let mut status = ProviderStatus::default();
        status.fail(t0(), Duration::from_secs(1), "a");
        status.fail(t0() + chrono::Duration::hours(1), Duration::from_secs(1), "b");
        assert_eq!(status.initial_failure, Some(t0()));
        assert_eq!(status.most_recent_failure, Some(t0() + chrono::Duration::hours(1)));
    }
}
