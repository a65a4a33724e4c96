//! Inbound frame routing.
//!
//! Every text frame is parsed once. Frames carrying a string `requestId` go
//! to the [`ResponseRegistry`]; frames without one are server pushes and are
//! broadcast to subscribers. Nothing here may fail the caller: bad frames
//! are logged and dropped.

use std::sync::Arc;

use hive_core::constants::REQUEST_ID_MEMBER;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use super::transport::FrameHandler;
use crate::correlation::{ResolveOutcome, ResponseRegistry};

/// What happened to one inbound frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered to a waiting request.
    Resolved,
    /// Correlated, but nobody was waiting.
    Orphaned,
    /// A second response for an already answered request.
    Duplicate,
    /// Uncorrelated server push, broadcast to subscribers.
    Pushed,
    /// Unparseable or unroutable.
    Dropped,
}

/// Inbound handler feeding the response registry.
pub struct MessageDispatcher {
    registry: Arc<ResponseRegistry>,
    pushes: broadcast::Sender<Arc<Value>>,
}

impl MessageDispatcher {
    /// Create a dispatcher that broadcasts pushes on `pushes`.
    pub fn new(registry: Arc<ResponseRegistry>, pushes: broadcast::Sender<Arc<Value>>) -> Self {
        Self { registry, pushes }
    }

    /// Route one frame.
    pub fn dispatch(&self, frame: &str) -> DispatchOutcome {
        let value: Value = match serde_json::from_str(frame) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, len = frame.len(), "dropping unparseable frame");
                return DispatchOutcome::Dropped;
            }
        };
        if !value.is_object() {
            warn!(kind = json_kind(&value), "dropping non-object frame");
            return DispatchOutcome::Dropped;
        }

        match value.get(REQUEST_ID_MEMBER) {
            Some(Value::String(id)) => {
                let id = id.clone();
                match self.registry.resolve(&id, value) {
                    ResolveOutcome::Delivered => {
                        trace!(request_id = %id, "response delivered");
                        DispatchOutcome::Resolved
                    }
                    ResolveOutcome::Orphaned => DispatchOutcome::Orphaned,
                    ResolveOutcome::Duplicate => DispatchOutcome::Duplicate,
                }
            }
            None | Some(Value::Null) => {
                // No receivers is normal when nobody subscribed.
                let receivers = self.pushes.send(Arc::new(value)).unwrap_or(0);
                debug!(receivers, "server push");
                DispatchOutcome::Pushed
            }
            Some(other) => {
                warn!(kind = json_kind(other), "dropping frame with non-string requestId");
                DispatchOutcome::Dropped
            }
        }
    }
}

impl FrameHandler for MessageDispatcher {
    fn on_frame(&self, frame: &str) {
        let _ = self.dispatch(frame);
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
