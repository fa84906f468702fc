use std::collections::HashSet;

use super::{types::Config, ConfigError};
use crate::status::BackoffSchedule;

/// Validate configuration
/// Currently validates:
/// - Implementation kinds are known (enforced by serde)
/// - Orchestrator concurrency, timeout and page cap are not 0
/// - Backoff factors are at least 1
/// - Indexer and application ids are unique
/// - Every indexer and application has a base URL
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let orchestrator = &config.orchestrator;
    if orchestrator.max_concurrent_requests == 0 {
        return Err(invalid("orchestrator.max_concurrent_requests cannot be 0"));
    }
    if orchestrator.search_timeout_secs == 0 {
        return Err(invalid("orchestrator.search_timeout_secs cannot be 0"));
    }
    if orchestrator.max_pages == 0 {
        return Err(invalid("orchestrator.max_pages cannot be 0"));
    }

    check_schedule("backoff.failure", &config.backoff.failure)?;
    check_schedule("backoff.connection", &config.backoff.connection)?;

    if config.sync.buffer_size == 0 {
        return Err(invalid("sync.buffer_size cannot be 0"));
    }

    let mut seen = HashSet::new();
    for indexer in &config.indexers {
        if !seen.insert(indexer.id) {
            return Err(invalid(format!("duplicate indexer id {}", indexer.id)));
        }
        if indexer.base_url().is_empty() {
            return Err(invalid(format!("indexer '{}' has no base URL", indexer.name)));
        }
    }

    let mut seen = HashSet::new();
    for application in &config.applications {
        if !seen.insert(application.id) {
            return Err(invalid(format!("duplicate application id {}", application.id)));
        }
        if application.base_url.trim().is_empty() {
            return Err(invalid(format!(
                "application '{}' has no base URL",
                application.name
            )));
        }
    }

    Ok(())
}

fn check_schedule(name: &str, schedule: &BackoffSchedule) -> Result<(), ConfigError> {
    if schedule.factor == 0 {
        return Err(invalid(format!("{}.factor must be at least 1", name)));
    }
    if schedule.initial_secs > schedule.max_secs {
        return Err(invalid(format!("{}.initial_secs exceeds max_secs", name)));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}
