//! Connection state and the seam between the socket and its consumers.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hive_core::constants::close_code;
use hive_core::errors::ConnectionError;

/// Close code and reason of a connection that is no longer open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code.
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
}

impl CloseReason {
    /// Create a close reason.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// `1000` normal closure.
    pub fn normal(reason: impl Into<String>) -> Self {
        Self::new(close_code::NORMAL, reason)
    }

    /// `1001` going away.
    pub fn going_away(reason: impl Into<String>) -> Self {
        Self::new(close_code::GOING_AWAY, reason)
    }

    /// `1006` abnormal closure (no close handshake).
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(close_code::ABNORMAL, reason)
    }

    /// Error handed to requests still waiting when the connection closed.
    pub fn to_error(&self) -> ConnectionError {
        ConnectionError::Closed {
            code: self.code,
            reason: self.reason.clone(),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

/// Lifecycle of one connection. `Closed` is terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Frames may be sent.
    Open,
    /// A close handshake is in progress.
    Closing(CloseReason),
    /// The socket is gone.
    Closed(CloseReason),
}

impl ConnectionState {
    /// Whether frames may be sent.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether the connection reached its terminal state.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    /// Close reason once the connection is closing or closed.
    pub fn close_reason(&self) -> Option<&CloseReason> {
        match self {
            Self::Open => None,
            Self::Closing(reason) | Self::Closed(reason) => Some(reason),
        }
    }

    pub(crate) fn not_open_error(&self) -> ConnectionError {
        ConnectionError::NotOpen {
            state: self.to_string(),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Closing(reason) => write!(f, "closing ({reason})"),
            Self::Closed(reason) => write!(f, "closed ({reason})"),
        }
    }
}

/// Receives every inbound text frame, once, in arrival order.
///
/// Implementations must not panic; a failing frame is logged and dropped.
pub trait FrameHandler: Send + Sync + 'static {
    /// Handle one inbound text frame.
    fn on_frame(&self, frame: &str);
}

/// Notified of every inbound pong control frame.
pub trait PongObserver: Send + Sync + 'static {
    /// Handle one pong.
    fn on_pong(&self, payload: &[u8]);
}

/// A duplex, frame-oriented connection.
///
/// [`ConnectionEndpoint`](super::connection::ConnectionEndpoint) is the
/// WebSocket implementation; correlation and heartbeat code depend only on
/// this trait.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Write one text frame.
    async fn send_text(&self, frame: String) -> Result<(), ConnectionError>;

    /// Write one ping control frame.
    async fn send_ping(&self, payload: Vec<u8>) -> Result<(), ConnectionError>;

    /// Attach the single inbound frame handler.
    fn register_handler(&self, handler: Arc<dyn FrameHandler>) -> Result<(), ConnectionError>;

    /// Attach the pong observer, replacing any previous one.
    fn set_pong_observer(&self, observer: Arc<dyn PongObserver>);

    /// Current state.
    fn state(&self) -> ConnectionState;

    /// Whether frames may be sent.
    fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Close with a handshake. Closing a non-open connection is a no-op.
    async fn close(&self, reason: CloseReason);

    /// Tear the connection down immediately without a close handshake.
    fn force_close(&self, reason: CloseReason);

    /// Resolve once the connection is closed.
    async fn closed(&self);
}
