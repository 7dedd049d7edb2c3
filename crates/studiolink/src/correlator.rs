//! Request/response correlation.
//!
//! Every outbound request gets a fresh `message-id`; the studio echoes it in
//! the reply. Pending requests wait on a oneshot until the reply, a timeout,
//! or connection loss resolves them.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

use studiolink_telemetry::{log_request_failed, MetricsRegistry};

use crate::connection::Transport;
use crate::error::RequestError;
use crate::protocol::{Request, Response};

/// Default time to wait for a reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type Resolver = oneshot::Sender<Result<Response, RequestError>>;

/// A request waiting for its reply.
struct PendingRequest {
    request_type: String,
    resolver: Resolver,
}

/// Matches replies to the requests that caused them.
pub struct RequestCorrelator {
    client_name: String,
    timeout: Option<Duration>,
    pending: DashMap<String, PendingRequest>,
    metrics: Arc<MetricsRegistry>,
}

impl RequestCorrelator {
    /// `timeout` of `None` waits forever.
    pub fn new(
        client_name: impl Into<String>,
        timeout: Option<Duration>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            timeout,
            pending: DashMap::new(),
            metrics,
        }
    }

    /// A correlation id unique for the life of the process.
    pub fn next_id(&self) -> String {
        format!("{}_{}", self.client_name, Uuid::new_v4())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Send a request and wait for its reply.
    ///
    /// A non-ok reply fails with [`RequestError::Rejected`]. Dropping the
    /// returned future forgets the pending entry.
    pub async fn send(
        &self,
        transport: &dyn Transport,
        mut request: Request,
    ) -> Result<Response, RequestError> {
        let request_type = request.request_type().to_string();
        let result = self.exchange(transport, &mut request).await;

        match &result {
            Ok(_) => self.metrics.record_request(&request_type, "ok"),
            Err(RequestError::NotConnected) => {
                self.metrics.record_request(&request_type, "not_connected");
                tracing::debug!(request_type = %request_type, "Request skipped, not connected");
            }
            Err(e) => {
                self.metrics.record_request(&request_type, e.outcome());
                log_request_failed!(request_type = %request_type, error = %e, "Request failed");
            }
        }
        result
    }

    async fn exchange(
        &self,
        transport: &dyn Transport,
        request: &mut Request,
    ) -> Result<Response, RequestError> {
        let id = self.next_id();
        request.set_message_id(&id);
        let text = request.to_text()?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id.clone(),
            PendingRequest {
                request_type: request.request_type().to_string(),
                resolver: tx,
            },
        );
        let _entry = PendingEntry {
            pending: &self.pending,
            id: &id,
        };

        transport.transmit(text)?;

        let reply = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    return Err(RequestError::Timeout {
                        request_type: request.request_type().to_string(),
                        timeout_ms: limit.as_millis() as u64,
                    })
                }
            },
            None => rx.await,
        };

        reply.unwrap_or_else(|_| {
            Err(RequestError::ConnectionLost {
                request_type: request.request_type().to_string(),
                reason: "request abandoned".to_string(),
            })
        })
    }

    /// Fulfil the pending request the reply belongs to.
    ///
    /// Returns `false` when no request is waiting for this id.
    pub fn resolve(&self, response: &Response) -> bool {
        let Some(id) = response.message_id() else {
            return false;
        };
        let Some((_, pending)) = self.pending.remove(id) else {
            return false;
        };

        let result = if response.is_ok() {
            Ok(response.clone())
        } else {
            Err(RequestError::Rejected {
                request_type: pending.request_type,
                payload: response.value().clone(),
            })
        };
        if pending.resolver.send(result).is_err() {
            tracing::debug!(message_id = %id, "Reply arrived after the caller gave up");
        }
        true
    }

    /// Fail every pending request with [`RequestError::ConnectionLost`].
    pub fn fail_all(&self, reason: &str) -> usize {
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                let _ = pending.resolver.send(Err(RequestError::ConnectionLost {
                    request_type: pending.request_type,
                    reason: reason.to_string(),
                }));
                failed += 1;
            }
        }
        if failed > 0 {
            tracing::debug!(failed, reason, "Failed pending requests");
        }
        failed
    }
}

/// Removes the pending entry when the exchange ends for any reason.
struct PendingEntry<'a> {
    pending: &'a DashMap<String, PendingRequest>,
    id: &'a str,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}
