//! Health tracking for indexers and downstream applications.
//!
//! A single `StatusTracker` implementation serves both kinds of collaborator;
//! it decides whether a collaborator may be contacted and how long it stays
//! suspended after failures.

mod backoff;
mod clock;
mod tracker;
mod types;

pub use backoff::{BackoffConfig, BackoffSchedule};
pub use clock::{Clock, SystemClock};
pub use tracker::StatusTracker;
pub use types::{Classify, FailureClass, HealthState, ProviderStatus};
