//! Request/response correlation.
//!
//! A request is one outbound JSON object carrying a `requestId`. The slot for
//! that id is registered before the frame is written, the wait is hosted on
//! the bounded [`WorkerPool`], and the response is classified right here so
//! callers only ever see a [`ClientError`].

use std::sync::Arc;
use std::time::Duration;

use hive_core::constants::REQUEST_ID_MEMBER;
use hive_core::errors::ClientError;
use hive_core::ids::RequestId;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::envelope::ResponseEnvelope;
use super::policy::Extract;
use super::registry::ResponseRegistry;
use crate::pool::WorkerPool;
use crate::websocket::Transport;

/// Sends requests and waits for their correlated responses.
pub struct RequestCorrelator {
    transport: Arc<dyn Transport>,
    registry: Arc<ResponseRegistry>,
    pool: Arc<WorkerPool>,
    timeout: Duration,
}

impl RequestCorrelator {
    /// Correlate over `transport`; responses must already be routed into
    /// `registry`.
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<ResponseRegistry>,
        pool: Arc<WorkerPool>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            registry,
            pool,
            timeout,
        }
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a request whose response carries no member of interest.
    #[instrument(skip_all, fields(request_id))]
    pub async fn send_command(&self, message: Value) -> Result<(), ClientError> {
        let _ = self.exchange(message).await?;
        Ok(())
    }

    /// Send a request and decode one member of the successful response.
    #[instrument(skip_all, fields(request_id, member = extract.member_name()))]
    pub async fn send_request<T>(&self, message: Value, extract: &Extract<T>) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let envelope = self.exchange(message).await?;
        extract.decode(&envelope.payload).map_err(|message| {
            warn!(policy = extract.policy().name(), error = %message, "response member did not decode");
            ClientError::MalformedResponse {
                request_id: envelope.request_id.clone(),
                message,
            }
        })
    }

    async fn exchange(&self, mut message: Value) -> Result<ResponseEnvelope, ClientError> {
        let request_id = assign_request_id(&mut message)?;
        let _ = tracing::Span::current().record("request_id", request_id.as_str());

        let slot = self.registry.register(request_id.clone())?;
        let started = Instant::now();
        let wait = self.pool.submit(slot.wait(self.timeout)).await?;

        if let Err(e) = self.transport.send_text(message.to_string()).await {
            // The slot lives in the wait task; it is released once the
            // aborted task has been dropped.
            wait.abort();
            let _ = wait.await;
            warn!(error = %e, "request not sent");
            return Err(e.into());
        }

        let response = match wait.await {
            Ok(Some(response)) => response,
            Ok(None) | Err(_) => return Err(ClientError::Shutdown),
        };
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let payload = match response {
            Ok(payload) => payload,
            Err(err) => {
                if matches!(err, ClientError::Timeout { .. }) {
                    warn!(elapsed_ms, "request timed out");
                } else {
                    debug!(error = %err, "request released without a response");
                }
                return Err(err);
            }
        };

        let envelope = ResponseEnvelope::from_value(request_id.as_str(), payload)?;
        match envelope.classify() {
            Ok(()) => {
                debug!(elapsed_ms, "request succeeded");
                Ok(envelope)
            }
            Err(err) => {
                warn!(code = err.status_code(), error = %err, elapsed_ms, "request failed");
                Err(err)
            }
        }
    }
}

/// Read the request id, assigning a fresh one when the message has none.
fn assign_request_id(message: &mut Value) -> Result<RequestId, ClientError> {
    let Some(object) = message.as_object_mut() else {
        return Err(ClientError::InvalidRequest {
            message: "request must be a JSON object".into(),
        });
    };
    match object.get(REQUEST_ID_MEMBER) {
        Some(Value::String(id)) if !id.is_empty() => Ok(RequestId::from(id.as_str())),
        Some(Value::String(_)) => Err(ClientError::InvalidRequest {
            message: format!("`{REQUEST_ID_MEMBER}` is empty"),
        }),
        None | Some(Value::Null) => {
            let id = RequestId::new();
            let _ = object.insert(REQUEST_ID_MEMBER.to_owned(), Value::String(id.to_string()));
            Ok(id)
        }
        Some(other) => Err(ClientError::InvalidRequest {
            message: format!("`{REQUEST_ID_MEMBER}` must be a string, got {other}"),
        }),
    }
}
