//! WebSocket connection endpoint.
//!
//! Owns the socket. One task writes queued outbound frames, one task reads
//! inbound frames; text frames are queued for the registered
//! [`FrameHandler`], pongs go to the [`PongObserver`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use hive_core::constants::close_code;
use hive_core::errors::ConnectionError;
use hive_core::ids::ConnectionId;
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::transport::{
    CloseReason, ConnectionState, FrameHandler, PongObserver, Transport,
};

/// How long [`Transport::close`] waits for the peer's close frame.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared between the endpoint and its I/O tasks.
struct Shared {
    state: watch::Sender<ConnectionState>,
    pong_observer: RwLock<Option<Arc<dyn PongObserver>>>,
    shutdown: CancellationToken,
}

impl Shared {
    /// Move to `Closed`. A close we initiated keeps its own reason.
    ///
    /// Returns `false` if the connection was already closed.
    fn mark_closed(&self, reason: CloseReason) -> bool {
        self.state.send_if_modified(|state| match state {
            ConnectionState::Closed(_) => false,
            ConnectionState::Closing(initiated) => {
                let initiated = initiated.clone();
                *state = ConnectionState::Closed(initiated);
                true
            }
            ConnectionState::Open => {
                *state = ConnectionState::Closed(reason);
                true
            }
        })
    }

    fn observe_pong(&self, payload: &[u8]) {
        let observer = self.pong_observer.read().clone();
        if let Some(observer) = observer {
            observer.on_pong(payload);
        }
    }
}

/// A client WebSocket connection.
pub struct ConnectionEndpoint {
    id: ConnectionId,
    url: String,
    outbound: mpsc::Sender<Message>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    shared: Arc<Shared>,
}

impl ConnectionEndpoint {
    /// Connect to `url` and start the socket I/O tasks.
    pub async fn open(url: &str, outbound_queue: usize) -> Result<Self, ConnectionError> {
        let (ws, response) = connect_async(url)
            .await
            .map_err(|e| ConnectionError::Connect {
                url: url.to_owned(),
                message: e.to_string(),
            })?;
        let endpoint = Self::from_stream(url, ws, outbound_queue);
        info!(
            connection_id = %endpoint.id,
            url,
            status = response.status().as_u16(),
            "websocket connected"
        );
        Ok(endpoint)
    }

    /// Wrap an already negotiated WebSocket stream.
    pub fn from_stream<S>(url: &str, ws: WebSocketStream<S>, outbound_queue: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = ConnectionId::new();
        let (state, _) = watch::channel(ConnectionState::Open);
        let shared = Arc::new(Shared {
            state,
            pong_observer: RwLock::new(None),
            shutdown: CancellationToken::new(),
        });

        let (sink, stream) = ws.split();
        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_queue.max(1));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let span = info_span!("ws", connection_id = %id);
        let _ = tokio::spawn(write_loop(sink, outbound_rx, shared.clone()).instrument(span.clone()));
        let _ = tokio::spawn(read_loop(stream, inbound_tx, shared.clone()).instrument(span));

        Self {
            id,
            url: url.to_owned(),
            outbound: outbound_tx,
            inbound: Mutex::new(Some(inbound_rx)),
            shared,
        }
    }

    /// Connection identifier.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// URL this endpoint connected to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    async fn enqueue(&self, message: Message) -> Result<(), ConnectionError> {
        let state = self.state();
        if !state.is_open() {
            return Err(state.not_open_error());
        }
        self.outbound
            .send(message)
            .await
            .map_err(|_| self.state().not_open_error())
    }
}

#[async_trait]
impl Transport for ConnectionEndpoint {
    async fn send_text(&self, frame: String) -> Result<(), ConnectionError> {
        self.enqueue(Message::text(frame)).await
    }

    async fn send_ping(&self, payload: Vec<u8>) -> Result<(), ConnectionError> {
        self.enqueue(Message::Ping(payload.into())).await
    }

    fn register_handler(&self, handler: Arc<dyn FrameHandler>) -> Result<(), ConnectionError> {
        let mut inbound = self
            .inbound
            .lock()
            .take()
            .ok_or(ConnectionError::HandlerAlreadyRegistered)?;
        let span = info_span!("dispatch", connection_id = %self.id);
        let _ = tokio::spawn(
            async move {
                while let Some(frame) = inbound.recv().await {
                    handler.on_frame(&frame);
                }
                debug!("inbound queue closed");
            }
            .instrument(span),
        );
        Ok(())
    }

    fn set_pong_observer(&self, observer: Arc<dyn PongObserver>) {
        *self.shared.pong_observer.write() = Some(observer);
    }

    fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    async fn close(&self, reason: CloseReason) {
        let initiated = self.shared.state.send_if_modified(|state| {
            if state.is_open() {
                *state = ConnectionState::Closing(reason.clone());
                true
            } else {
                false
            }
        });
        if !initiated {
            return;
        }

        debug!(connection_id = %self.id, %reason, "closing connection");
        let frame = CloseFrame {
            code: CloseCode::from(reason.code),
            reason: reason.reason.clone().into(),
        };
        if self.outbound.try_send(Message::Close(Some(frame))).is_ok()
            && tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, self.closed())
                .await
                .is_err()
        {
            warn!(connection_id = %self.id, "peer did not complete the close handshake");
        }

        let _ = self.shared.mark_closed(reason);
        self.shared.shutdown.cancel();
    }

    fn force_close(&self, reason: CloseReason) {
        if self.shared.mark_closed(reason.clone()) {
            info!(connection_id = %self.id, code = reason.code, reason = %reason.reason, "connection force-closed");
        }
        self.shared.shutdown.cancel();
    }

    async fn closed(&self) {
        let mut state = self.shared.state.subscribe();
        let _ = state.wait_for(ConnectionState::is_closed).await;
    }
}

impl Drop for ConnectionEndpoint {
    fn drop(&mut self) {
        let _ = self
            .shared
            .mark_closed(CloseReason::going_away("endpoint dropped"));
        self.shared.shutdown.cancel();
    }
}

async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outbound: mpsc::Receiver<Message>,
    shared: Arc<Shared>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let message = tokio::select! {
            message = outbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
            () = shared.shutdown.cancelled() => break,
        };

        let is_close = matches!(message, Message::Close(_));
        let sent = tokio::select! {
            sent = sink.send(message) => sent,
            () = shared.shutdown.cancelled() => break,
        };
        if let Err(e) = sent {
            warn!(error = %e, "websocket write failed");
            let _ = shared.mark_closed(CloseReason::abnormal(format!("write failed: {e}")));
            shared.shutdown.cancel();
            break;
        }
        if is_close {
            break;
        }
    }
}

async fn read_loop<S>(
    mut stream: SplitStream<WebSocketStream<S>>,
    inbound: mpsc::UnboundedSender<String>,
    shared: Arc<Shared>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut peer_close: Option<CloseReason> = None;

    let reason = loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            () = shared.shutdown.cancelled() => return,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                let _ = inbound.send(text.as_str().to_owned());
            }
            Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    let _ = inbound.send(text.to_owned());
                }
                Err(_) => debug!(len = data.len(), "dropping non-UTF8 binary frame"),
            },
            Some(Ok(Message::Pong(payload))) => shared.observe_pong(&payload),
            Some(Ok(Message::Ping(_) | Message::Frame(_))) => {}
            // Keep polling so the close reply is flushed; the stream ends next.
            Some(Ok(Message::Close(frame))) => {
                peer_close = Some(frame.map_or_else(
                    || CloseReason::new(close_code::NO_STATUS, ""),
                    |f| CloseReason::new(u16::from(f.code), f.reason.as_str()),
                ));
            }
            Some(Err(e)) => {
                break peer_close.unwrap_or_else(|| CloseReason::abnormal(e.to_string()));
            }
            None => break peer_close.unwrap_or_else(|| CloseReason::abnormal("connection dropped")),
        }
    };

    if shared.mark_closed(reason.clone()) {
        info!(code = reason.code, reason = %reason.reason, "connection closed by peer");
    }
    shared.shutdown.cancel();
}
