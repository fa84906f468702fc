//! Session cookie side-channel for indexers that authenticate by cookie.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Invoked whenever cookies are replaced, so a collaborator can persist them.
pub type CookieCallback = Arc<dyn Fn(&HashMap<String, String>, Option<DateTime<Utc>>) + Send + Sync>;

#[derive(Debug, Default)]
struct SessionState {
    cookies: HashMap<String, String>,
    expiry: Option<DateTime<Utc>>,
}

/// Cookies shared between a request generator and whoever logs in.
#[derive(Default)]
pub struct SessionCookies {
    state: RwLock<SessionState>,
    on_update: Option<CookieCallback>,
}

impl std::fmt::Debug for SessionCookies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookies")
            .field("cookies", &"<redacted>")
            .field("on_update", &self.on_update.is_some())
            .finish()
    }
}

impl SessionCookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: CookieCallback) -> Self {
        Self {
            state: RwLock::default(),
            on_update: Some(callback),
        }
    }

    /// Cookies valid at `now`; empty once expired.
    pub fn current(&self, now: DateTime<Utc>) -> HashMap<String, String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match state.expiry {
            Some(expiry) if now >= expiry => HashMap::new(),
            _ => state.cookies.clone(),
        }
    }

    pub fn update(&self, cookies: HashMap<String, String>, expiry: Option<DateTime<Utc>>) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.cookies = cookies;
            state.expiry = expiry;
        }
        if let Some(callback) = &self.on_update {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            callback(&state.cookies, state.expiry);
        }
    }

    /// `Cookie` header value, names sorted for stable output.
    pub fn header_value(&self, now: DateTime<Utc>) -> Option<String> {
        let cookies = self.current(now);
        if cookies.is_empty() {
            return None;
        }
        let mut pairs: Vec<_> = cookies.into_iter().collect();
        pairs.sort();
        Some(
            pairs
                .into_iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}
