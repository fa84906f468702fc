//! Per-collaborator health tracking with escalating backoff.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::metrics;

use super::{BackoffConfig, Clock, FailureClass, HealthState, ProviderStatus, SystemClock};

type Record = Arc<Mutex<ProviderStatus>>;

/// Health state machine for any externally reachable collaborator.
///
/// Records are created lazily on first failure. Each record has its own lock;
/// the outer map lock is only held to look up or insert a record, never
/// while a record is updated.
pub struct StatusTracker<K> {
    name: &'static str,
    config: BackoffConfig,
    clock: Arc<dyn Clock>,
    records: RwLock<HashMap<K, Record>>,
}

impl<K> StatusTracker<K>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    /// Create a tracker using the system clock.
    pub fn new(name: &'static str, config: BackoffConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    pub fn with_clock(name: &'static str, config: BackoffConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            config,
            clock,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    fn existing(&self, key: &K) -> Option<Record> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(key).cloned()
    }

    fn record(&self, key: &K) -> Record {
        if let Some(record) = self.existing(key) {
            return record;
        }
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(records.entry(key.clone()).or_default())
    }

    /// Any state to Healthy.
    pub fn record_success(&self, key: &K) {
        let Some(record) = self.existing(key) else {
            return;
        };
        let mut status = record.lock().unwrap_or_else(PoisonError::into_inner);
        if status.consecutive_failures > 0 {
            info!(
                tracker = self.name,
                key = %key,
                failures = status.consecutive_failures,
                "Recovered after consecutive failures"
            );
        }
        status.reset();
    }

    fn clamp(&self, retry_after: Option<Duration>) -> Option<Duration> {
        retry_after.map(|d| d.min(self.config.max_retry_after()))
    }

    fn fail_with<F>(&self, key: &K, class: FailureClass, reason: &str, backoff_for: F) -> Duration
    where
        F: FnOnce(u32) -> Duration,
    {
        let record = self.record(key);
        let mut status = record.lock().unwrap_or_else(PoisonError::into_inner);
        let failures = status.consecutive_failures.saturating_add(1);
        let backoff = backoff_for(failures);

        status.fail(self.clock.now(), backoff, reason);
        metrics::STATUS_FAILURES
            .with_label_values(&[self.name, class.as_str()])
            .inc();
        debug!(
            tracker = self.name,
            key = %key,
            failures = failures,
            backoff_secs = backoff.as_secs(),
            class = class.as_str(),
            "Recorded failure"
        );
        backoff
    }

    /// Generic failure. The backoff is the larger of the schedule and `retry_after`.
    pub fn record_failure(&self, key: &K, retry_after: Option<Duration>, reason: &str) -> Duration {
        let schedule = &self.config.failure;
        let retry_after = self.clamp(retry_after);
        self.fail_with(key, FailureClass::Generic, reason, |failures| {
            schedule.delay(failures).max(retry_after.unwrap_or_default())
        })
    }

    /// Connect or name-resolution failure, on the connection schedule.
    pub fn record_connection_failure(&self, key: &K, reason: &str) -> Duration {
        let schedule = &self.config.connection;
        self.fail_with(key, FailureClass::Connection, reason, |failures| {
            schedule.delay(failures)
        })
    }

    /// Rate-limit signal: the explicit retry-after wins, else the configured minimum.
    pub fn record_rate_limited(&self, key: &K, retry_after: Option<Duration>, reason: &str) -> Duration {
        let minimum = self.config.rate_limit();
        let retry_after = self.clamp(retry_after);
        self.fail_with(key, FailureClass::RateLimited { retry_after }, reason, |_| {
            retry_after.unwrap_or(minimum)
        })
    }

    /// Route a classified failure to its tracker method.
    pub fn record_classified(&self, key: &K, class: FailureClass, reason: &str) -> Duration {
        match class {
            FailureClass::Connection => self.record_connection_failure(key, reason),
            FailureClass::RateLimited { retry_after } => {
                warn!(tracker = self.name, key = %key, "Rate limited");
                self.record_rate_limited(key, retry_after, reason)
            }
            FailureClass::Generic | FailureClass::Unclassified => {
                self.record_failure(key, None, reason)
            }
        }
    }

    pub fn is_eligible(&self, key: &K, now: DateTime<Utc>) -> bool {
        self.state_at(key, now) != HealthState::Suspended
    }

    pub fn state_at(&self, key: &K, now: DateTime<Utc>) -> HealthState {
        match self.existing(key) {
            Some(record) => record
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .state_at(now),
            None => HealthState::Healthy,
        }
    }

    /// Snapshot of one record, if the key ever failed.
    pub fn status(&self, key: &K) -> Option<ProviderStatus> {
        self.existing(key)
            .map(|record| record.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    pub fn all_statuses(&self) -> Vec<(K, ProviderStatus)> {
        let records: Vec<(K, Record)> = {
            let map = self.records.read().unwrap_or_else(PoisonError::into_inner);
            map.iter().map(|(k, r)| (k.clone(), Arc::clone(r))).collect()
        };
        records
            .into_iter()
            .map(|(k, r)| {
                let status = r.lock().unwrap_or_else(PoisonError::into_inner).clone();
                (k, status)
            })
            .collect()
    }

    /// Forget a collaborator that was removed from configuration.
    pub fn remove(&self, key: &K) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.remove(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::BackoffSchedule;
    use crate::testing::ManualClock;

    fn tracker() -> (StatusTracker<u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let config = BackoffConfig {
            failure: BackoffSchedule::new(300, 2, 86_400),
            connection: BackoffSchedule::new(60, 2, 3_600),
            rate_limit_secs: 3_600,
        };
        let tracker = StatusTracker::with_clock("test", config, clock.clone());
        (tracker, clock)
    }

    #[test]
    fn test_unknown_key_is_healthy() {
        let (tracker, clock) = tracker();
        assert_eq!(tracker.state_at(&1, clock.now()), HealthState::Healthy);
        assert!(tracker.is_eligible(&1, clock.now()));
        assert!(tracker.status(&1).is_none());
    }

    #[test]
    fn test_success_on_unknown_key_creates_nothing() {
        let (tracker, _) = tracker();
        tracker.record_success(&1);
        assert!(tracker.all_statuses().is_empty());
    }

    #[test]
    fn test_failure_suspends() {
        let (tracker, clock) = tracker();
        let backoff = tracker.record_failure(&1, None, "HTTP 503");

        assert_eq!(backoff, Duration::from_secs(300));
        assert_eq!(tracker.state_at(&1, clock.now()), HealthState::Suspended);
        assert!(!tracker.is_eligible(&1, clock.now()));

        clock.advance(Duration::from_secs(300));
        assert_eq!(tracker.state_at(&1, clock.now()), HealthState::Degraded);
        assert!(tracker.is_eligible(&1, clock.now()));
    }

    #[test]
    fn test_success_resets_from_any_state() {
        let (tracker, clock) = tracker();

        // Suspended
        tracker.record_failure(&1, None, "x");
        tracker.record_success(&1);
        let status = tracker.status(&1).unwrap();
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.earliest_retry.is_none());
        assert_eq!(tracker.state_at(&1, clock.now()), HealthState::Healthy);

        // Degraded
        tracker.record_connection_failure(&1, "x");
        clock.advance(Duration::from_secs(3_600));
        assert_eq!(tracker.state_at(&1, clock.now()), HealthState::Degraded);
        tracker.record_success(&1);
        assert_eq!(tracker.status(&1).unwrap().consecutive_failures, 0);

        // Healthy stays healthy
        tracker.record_success(&1);
        assert_eq!(tracker.state_at(&1, clock.now()), HealthState::Healthy);
    }

    #[test]
    fn test_consecutive_failures_non_decreasing() {
        let (tracker, _) = tracker();
        let mut previous = Duration::ZERO;
        for _ in 0..20 {
            let backoff = tracker.record_failure(&1, None, "x");
            assert!(backoff >= previous);
            previous = backoff;
        }
        assert_eq!(previous, Duration::from_secs(86_400));
        assert_eq!(tracker.status(&1).unwrap().consecutive_failures, 20);
    }

    #[test]
    fn test_connection_schedule_differs() {
        let (tracker, _) = tracker();
        let generic = tracker.record_failure(&1, None, "x");
        let connection = tracker.record_connection_failure(&2, "dns");
        assert_eq!(generic, Duration::from_secs(300));
        assert_eq!(connection, Duration::from_secs(60));
    }

    #[test]
    fn test_explicit_retry_after_takes_larger() {
        let (tracker, clock) = tracker();
        let backoff = tracker.record_failure(&1, Some(Duration::from_secs(7_200)), "x");
        assert_eq!(backoff, Duration::from_secs(7_200));

        let backoff = tracker.record_failure(&2, Some(Duration::from_secs(10)), "x");
        assert_eq!(backoff, Duration::from_secs(300));

        let status = tracker.status(&1).unwrap();
        assert_eq!(
            status.earliest_retry,
            Some(clock.now() + chrono::Duration::seconds(7_200))
        );
    }

    #[test]
    fn test_rate_limit_default_one_hour() {
        let (tracker, clock) = tracker();
        let start = clock.now();
        let backoff = tracker.record_rate_limited(&1, None, "429");
        assert_eq!(backoff, Duration::from_secs(3_600));
        assert_eq!(
            tracker.status(&1).unwrap().earliest_retry,
            Some(start + chrono::Duration::hours(1))
        );
    }

    #[test]
    fn test_rate_limit_explicit_thirty_minutes() {
        let (tracker, clock) = tracker();
        let start = clock.now();
        let backoff = tracker.record_rate_limited(&1, Some(Duration::from_secs(1_800)), "429");
        assert_eq!(backoff, Duration::from_secs(1_800));
        assert_eq!(
            tracker.status(&1).unwrap().earliest_retry,
            Some(start + chrono::Duration::minutes(30))
        );
    }

    #[test]
    fn test_retry_after_is_capped() {
        let (tracker, clock) = tracker();
        let backoff = tracker.record_rate_limited(&1, Some(Duration::from_secs(99_999_999_999_999)), "429");
        assert_eq!(backoff, Duration::from_secs(86_400));

        let backoff = tracker.record_failure(&2, Some(Duration::MAX), "x");
        assert_eq!(backoff, Duration::from_secs(86_400));
        assert_eq!(
            tracker.status(&2).unwrap().earliest_retry,
            Some(clock.now() + chrono::Duration::days(1))
        );
    }

    #[test]
    fn test_is_eligible_is_idempotent() {
        let (tracker, clock) = tracker();
        tracker.record_failure(&1, None, "x");
        let before = tracker.status(&1).unwrap();
        for _ in 0..10 {
            assert!(!tracker.is_eligible(&1, clock.now()));
        }
        assert_eq!(tracker.status(&1).unwrap(), before);
        assert!(tracker.is_eligible(&1, clock.now() + chrono::Duration::hours(1)));
        assert_eq!(tracker.status(&1).unwrap(), before);
    }

    #[test]
    fn test_record_classified_routes() {
        let (tracker, _) = tracker();
        assert_eq!(
            tracker.record_classified(&1, FailureClass::Connection, "x"),
            Duration::from_secs(60)
        );
        assert_eq!(
            tracker.record_classified(&2, FailureClass::Generic, "x"),
            Duration::from_secs(300)
        );
        assert_eq!(
            tracker.record_classified(&3, FailureClass::Unclassified, "x"),
            Duration::from_secs(300)
        );
        assert_eq!(
            tracker.record_classified(&4, FailureClass::RateLimited { retry_after: None }, "x"),
            Duration::from_secs(3_600)
        );
    }

    #[test]
    fn test_remove() {
        let (tracker, _) = tracker();
        tracker.record_failure(&1, None, "x");
        assert!(tracker.remove(&1));
        assert!(!tracker.remove(&1));
        assert!(tracker.status(&1).is_none());
    }

    #[test]
    fn test_concurrent_failures_not_lost() {
        let (tracker, _) = tracker();
        let tracker = Arc::new(tracker);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        tracker.record_connection_failure(&1, "x");
                        tracker.record_failure(&2, None, "y");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.status(&1).unwrap().consecutive_failures, 400);
        assert_eq!(tracker.status(&2).unwrap().consecutive_failures, 400);
    }
}
