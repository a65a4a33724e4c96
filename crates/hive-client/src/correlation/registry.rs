//! Response slots keyed by request id.
//!
//! A slot is created before the request frame is written, so a response can
//! never arrive for an id nobody is waiting on unless the waiter already gave
//! up. Those late or unsolicited responses are kept as orphans until they
//! expire.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hive_core::errors::{ClientError, ConnectionError};
use hive_core::ids::RequestId;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::websocket::CloseReason;

type Delivery = Result<Value, ConnectionError>;

enum Slot {
    Awaiting(oneshot::Sender<Delivery>),
    Resolved,
    Orphan { value: Value, received_at: Instant },
}

/// What [`ResponseRegistry::resolve`] did with a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Handed to the waiting request.
    Delivered,
    /// A response for this id was already delivered; dropped.
    Duplicate,
    /// Nobody is waiting; stored until it expires.
    Orphaned,
}

/// Concurrent map from request id to response slot.
pub struct ResponseRegistry {
    slots: Mutex<HashMap<RequestId, Slot>>,
    orphan_ttl: Duration,
}

impl ResponseRegistry {
    /// Create an empty registry. Orphans older than `orphan_ttl` are swept.
    pub fn new(orphan_ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            orphan_ttl,
        }
    }

    /// Create the slot for `request_id`.
    ///
    /// Fails if the id is still outstanding. An orphaned response stored
    /// under the same id is discarded.
    pub fn register(self: &Arc<Self>, request_id: RequestId) -> Result<PendingSlot, ClientError> {
        let (tx, rx) = oneshot::channel();
        let mut slots = self.slots.lock();
        match slots.get(request_id.as_str()) {
            Some(Slot::Awaiting(_) | Slot::Resolved) => {
                return Err(ClientError::DuplicateRequest {
                    request_id: request_id.into_inner(),
                });
            }
            Some(Slot::Orphan { value, received_at }) => {
                warn!(
                    request_id = %request_id,
                    age_ms = u64::try_from(received_at.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "discarding orphaned response for re-registered id"
                );
                debug!(request_id = %request_id, %value, "discarded orphan");
            }
            None => {}
        }
        let _ = slots.insert(request_id.clone(), Slot::Awaiting(tx));
        drop(slots);

        Ok(PendingSlot {
            request_id,
            rx,
            registry: Arc::clone(self),
        })
    }

    /// Route one response to its slot.
    pub fn resolve(&self, request_id: &str, value: Value) -> ResolveOutcome {
        let mut slots = self.slots.lock();
        match slots.get_mut(request_id) {
            Some(slot) if matches!(slot, Slot::Awaiting(_)) => {
                if let Slot::Awaiting(tx) = std::mem::replace(slot, Slot::Resolved) {
                    if tx.send(Ok(value)).is_err() {
                        debug!(request_id, "waiter gone before delivery");
                    }
                }
                ResolveOutcome::Delivered
            }
            Some(_) => {
                warn!(request_id, "duplicate response, ignoring");
                ResolveOutcome::Duplicate
            }
            None => {
                self.sweep_expired(&mut slots);
                let _ = slots.insert(
                    RequestId::from(request_id),
                    Slot::Orphan {
                        value,
                        received_at: Instant::now(),
                    },
                );
                debug!(request_id, "no waiter for response, stored as orphan");
                ResolveOutcome::Orphaned
            }
        }
    }

    /// Fail every waiting request with the close reason. Returns how many.
    pub fn fail_all(&self, reason: &CloseReason) -> usize {
        let mut slots = self.slots.lock();
        let mut failed = 0;
        for slot in slots.values_mut() {
            if !matches!(slot, Slot::Awaiting(_)) {
                continue;
            }
            if let Slot::Awaiting(tx) = std::mem::replace(slot, Slot::Resolved) {
                let _ = tx.send(Err(reason.to_error()));
                failed += 1;
            }
        }
        if failed > 0 {
            debug!(failed, %reason, "failed pending requests on close");
        }
        failed
    }

    /// Whether any slot (waiting, resolved or orphaned) exists for the id.
    pub fn contains(&self, request_id: &str) -> bool {
        self.slots.lock().contains_key(request_id)
    }

    /// Requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|s| matches!(s, Slot::Awaiting(_)))
            .count()
    }

    /// Unexpired orphaned responses.
    pub fn orphan_count(&self) -> usize {
        let mut slots = self.slots.lock();
        self.sweep_expired(&mut slots);
        slots
            .values()
            .filter(|s| matches!(s, Slot::Orphan { .. }))
            .count()
    }

    /// Total slots.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether the registry holds no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    fn sweep_expired(&self, slots: &mut HashMap<RequestId, Slot>) {
        let ttl = self.orphan_ttl;
        slots.retain(|_, slot| match slot {
            Slot::Orphan { received_at, .. } => received_at.elapsed() <= ttl,
            _ => true,
        });
    }

    fn release(&self, request_id: &RequestId) {
        let mut slots = self.slots.lock();
        if matches!(
            slots.get(request_id.as_str()),
            Some(Slot::Awaiting(_) | Slot::Resolved)
        ) {
            let _ = slots.remove(request_id.as_str());
        }
    }
}

/// A registered slot. Dropping it removes the slot from the registry.
pub struct PendingSlot {
    request_id: RequestId,
    rx: oneshot::Receiver<Delivery>,
    registry: Arc<ResponseRegistry>,
}

impl PendingSlot {
    /// The id this slot waits on.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Wait up to `timeout` for the response, then release the slot.
    pub async fn wait(mut self, timeout: Duration) -> Result<Value, ClientError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(closed))) => Err(closed.into()),
            Ok(Err(_)) => Err(ClientError::Shutdown),
            Err(_) => Err(ClientError::Timeout {
                request_id: self.request_id.to_string(),
                timeout,
            }),
        }
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.registry.release(&self.request_id);
    }
}
