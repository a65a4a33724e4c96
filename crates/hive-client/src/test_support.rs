//! Test doubles for unit tests.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use hive_core::errors::ConnectionError;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::WebSocketStream;

use crate::websocket::{CloseReason, ConnectionState, FrameHandler, PongObserver, Transport};

type Responder = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// In-memory [`Transport`] that records outbound frames and can script
/// replies.
pub(crate) struct MockTransport {
    state: watch::Sender<ConnectionState>,
    sent: Mutex<Vec<String>>,
    pings: Mutex<Vec<Vec<u8>>>,
    handler: Mutex<Option<Arc<dyn FrameHandler>>>,
    pong_observer: Mutex<Option<Arc<dyn PongObserver>>>,
    responder: Mutex<Option<Responder>>,
    auto_pong: AtomicBool,
    failing_pings: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            state: watch::channel(ConnectionState::Open).0,
            sent: Mutex::new(Vec::new()),
            pings: Mutex::new(Vec::new()),
            handler: Mutex::new(None),
            pong_observer: Mutex::new(None),
            responder: Mutex::new(None),
            auto_pong: AtomicBool::new(false),
            failing_pings: AtomicUsize::new(0),
        }
    }

    /// Answer each parsed outbound frame with `responder`'s reply, if any.
    pub(crate) fn with_responder(
        responder: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        let mock = Self::new();
        *mock.responder.lock() = Some(Arc::new(responder));
        mock
    }

    pub(crate) fn set_auto_pong(&self, enabled: bool) {
        self.auto_pong.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_pings(&self, count: usize) {
        self.failing_pings.store(count, Ordering::SeqCst);
    }

    /// Successfully sent pings.
    pub(crate) fn ping_count(&self) -> usize {
        self.pings.lock().len()
    }

    pub(crate) fn pings(&self) -> Vec<Vec<u8>> {
        self.pings.lock().clone()
    }

    /// Outbound text frames, parsed.
    pub(crate) fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// Feed an inbound frame to the registered handler.
    pub(crate) fn deliver(&self, frame: &str) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler.on_frame(frame);
        }
    }

    pub(crate) fn deliver_pong(&self, payload: &[u8]) {
        let observer = self.pong_observer.lock().clone();
        if let Some(observer) = observer {
            observer.on_pong(payload);
        }
    }

    /// Simulate the peer closing the connection.
    pub(crate) fn peer_close(&self, reason: CloseReason) {
        self.mark_closed(reason);
    }

    fn mark_closed(&self, reason: CloseReason) {
        let _ = self.state.send_if_modified(|state| {
            if state.is_closed() {
                false
            } else {
                *state = ConnectionState::Closed(reason);
                true
            }
        });
    }

    fn ensure_open(&self) -> Result<(), ConnectionError> {
        let state = self.state();
        if state.is_open() {
            Ok(())
        } else {
            Err(state.not_open_error())
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(&self, frame: String) -> Result<(), ConnectionError> {
        self.ensure_open()?;
        let responder = self.responder.lock().clone();
        let reply = responder.and_then(|respond| {
            serde_json::from_str::<Value>(&frame)
                .ok()
                .and_then(|request| respond(&request))
        });
        self.sent.lock().push(frame);

        let handler = self.handler.lock().clone();
        if let (Some(reply), Some(handler)) = (reply, handler) {
            // Replies arrive after the send returns, as on a real socket.
            let _ = tokio::spawn(async move { handler.on_frame(&reply.to_string()) });
        }
        Ok(())
    }

    async fn send_ping(&self, payload: Vec<u8>) -> Result<(), ConnectionError> {
        self.ensure_open()?;
        let failed = self
            .failing_pings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ConnectionError::NotOpen {
                state: "ping rejected".into(),
            });
        }
        self.pings.lock().push(payload.clone());
        if self.auto_pong.load(Ordering::SeqCst) {
            self.deliver_pong(&payload);
        }
        Ok(())
    }

    fn register_handler(&self, handler: Arc<dyn FrameHandler>) -> Result<(), ConnectionError> {
        let mut slot = self.handler.lock();
        if slot.is_some() {
            return Err(ConnectionError::HandlerAlreadyRegistered);
        }
        *slot = Some(handler);
        Ok(())
    }

    fn set_pong_observer(&self, observer: Arc<dyn PongObserver>) {
        *self.pong_observer.lock() = Some(observer);
    }

    fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    async fn close(&self, reason: CloseReason) {
        self.mark_closed(reason);
    }

    fn force_close(&self, reason: CloseReason) {
        self.mark_closed(reason);
    }

    async fn closed(&self) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(ConnectionState::is_closed).await;
    }
}

/// Handler forwarding every frame to a channel.
pub(crate) struct CollectingHandler {
    tx: mpsc::UnboundedSender<String>,
}

impl CollectingHandler {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl FrameHandler for CollectingHandler {
    fn on_frame(&self, frame: &str) {
        let _ = self.tx.send(frame.to_owned());
    }
}

/// Pong observer that records payloads.
#[derive(Default)]
pub(crate) struct CountingPongs {
    payloads: Mutex<Vec<Vec<u8>>>,
}

impl CountingPongs {
    pub(crate) fn count(&self) -> usize {
        self.payloads.lock().len()
    }

    pub(crate) fn last_payload(&self) -> Vec<u8> {
        self.payloads.lock().last().cloned().unwrap_or_default()
    }
}

impl PongObserver for CountingPongs {
    fn on_pong(&self, payload: &[u8]) {
        self.payloads.lock().push(payload.to_vec());
    }
}

/// Serve one WebSocket connection on a loopback port with `script`.
///
/// Returns the `ws://` URL to connect to.
pub(crate) async fn spawn_ws_server<F, Fut>(script: F) -> String
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _ = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        script(ws).await;
    });
    format!("ws://{addr}")
}

/// A loopback port with nothing listening on it.
pub(crate) async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
