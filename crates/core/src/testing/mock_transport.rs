//! Mock transport for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::indexer::{IndexerRequest, ResponseEnvelope};
use crate::transport::{Transport, TransportError};

#[derive(Debug, Clone)]
enum Reply {
    Envelope {
        status: u16,
        headers: Vec<(String, String)>,
        body: String,
    },
    Error(TransportError),
}

#[derive(Debug, Clone)]
struct Route {
    pattern: String,
    reply: Reply,
}

/// Mock implementation of the Transport trait.
///
/// Replies are matched by URL substring; the most recently configured
/// matching route wins. Every executed request is recorded.
///
/// # Example
///
/// ```rust,ignore
/// let transport = MockTransport::new();
/// transport.respond_json("/indexers/one/", json!({"Results": []})).await;
/// transport.fail("/indexers/two/", TransportError::Timeout).await;
/// ```
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Arc<RwLock<Vec<Route>>>,
    delays: Arc<RwLock<HashMap<String, Duration>>>,
    requests: Arc<RwLock<Vec<IndexerRequest>>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn respond(&self, pattern: &str, status: u16, content_type: &str, body: &str) {
        self.respond_with_headers(pattern, status, vec![("Content-Type", content_type)], body)
            .await;
    }

    /// 200 with a JSON body.
    pub async fn respond_json(&self, pattern: &str, body: serde_json::Value) {
        self.respond(pattern, 200, "application/json", &body.to_string())
            .await;
    }

    pub async fn respond_with_headers(
        &self,
        pattern: &str,
        status: u16,
        headers: Vec<(&str, &str)>,
        body: &str,
    ) {
        self.routes.write().await.push(Route {
            pattern: pattern.to_string(),
            reply: Reply::Envelope {
                status,
                headers: headers
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                body: body.to_string(),
            },
        });
    }

    pub async fn fail(&self, pattern: &str, error: TransportError) {
        self.routes.write().await.push(Route {
            pattern: pattern.to_string(),
            reply: Reply::Error(error),
        });
    }

    /// Delay every matching request before replying.
    pub async fn set_delay(&self, pattern: &str, delay: Duration) {
        self.delays.write().await.insert(pattern.to_string(), delay);
    }

    pub async fn requests(&self) -> Vec<IndexerRequest> {
        self.requests.read().await.clone()
    }

    pub async fn request_count(&self, pattern: &str) -> usize {
        self.requests
            .read()
            .await
            .iter()
            .filter(|r| r.url.contains(pattern))
            .count()
    }

    /// Highest number of requests executing at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// Counts a request as in flight until dropped, including on cancellation.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(transport: &'a MockTransport) -> Self {
        let current = transport.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        transport.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        Self(&transport.in_flight)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: &IndexerRequest) -> Result<ResponseEnvelope, TransportError> {
        self.requests.write().await.push(request.clone());
        let _guard = InFlight::enter(self);

        let delay = self
            .delays
            .read()
            .await
            .iter()
            .filter(|(pattern, _)| request.url.contains(pattern.as_str()))
            .map(|(_, d)| *d)
            .max();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .routes
            .read()
            .await
            .iter()
            .rev()
            .find(|route| request.url.contains(route.pattern.as_str()))
            .map(|route| route.reply.clone());

        match reply {
            Some(Reply::Envelope {
                status,
                headers,
                body,
            }) => {
                let mut envelope = ResponseEnvelope::new(request.clone(), status, body);
                for (name, value) in headers {
                    envelope = envelope.with_header(&name, value);
                }
                Ok(envelope)
            }
            Some(Reply::Error(e)) => Err(e),
            None => Err(TransportError::Connect(format!("no route for {}", request.url))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_matching_route_wins() {
        let transport = MockTransport::new();
        transport.respond("/a", 500, "text/plain", "old").await;
        transport.respond("/a", 200, "text/plain", "new").await;

        let envelope = transport
            .execute(&IndexerRequest::get("http://x/a"))
            .await
            .unwrap();
        assert_eq!(envelope.status, 200);
        assert_eq!(envelope.body, "new");
        assert_eq!(envelope.content_type().as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_unrouted_request_fails_and_is_recorded() {
        let transport = MockTransport::new();
        let err = transport
            .execute(&IndexerRequest::get("http://x/none"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
        assert_eq!(transport.request_count("/none").await, 1);
    }
}
