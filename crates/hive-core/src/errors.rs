//! Error taxonomy for the Hive WebSocket client.
//!
//! - [`ConnectionError`]: the socket could not be opened, is not open, or
//!   closed while a request was outstanding
//! - [`ClientError`]: the single error type returned by request correlation;
//!   every classified outcome of a request other than success maps to one
//!   variant, so callers never see a raw transport error

use std::time::Duration;

use thiserror::Error;

use crate::status::StatusFamily;

// ─────────────────────────────────────────────────────────────────────────────
// ConnectionError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of the physical duplex connection.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// The endpoint was unreachable or the WebSocket handshake failed.
    #[error("failed to connect to {url}: {message}")]
    Connect {
        /// Target URL.
        url: String,
        /// Underlying transport message.
        message: String,
    },

    /// A frame was sent while the socket was not open.
    #[error("connection is not open (state: {state})")]
    NotOpen {
        /// Rendered connection state at the time of the attempt.
        state: String,
    },

    /// An inbound handler was already attached to this connection.
    #[error("an inbound frame handler is already registered")]
    HandlerAlreadyRegistered,

    /// The connection closed while a response was still awaited.
    #[error("connection closed ({code}): {reason}")]
    Closed {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// ClientError
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a correlated request that did not succeed.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection was unavailable or closed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The request id is already outstanding on this connection.
    #[error("request id {request_id} is already awaiting a response")]
    DuplicateRequest {
        /// Offending request id.
        request_id: String,
    },

    /// No response arrived within the per-request window.
    #[error("request {request_id} timed out after {timeout:?}")]
    Timeout {
        /// Request id that timed out.
        request_id: String,
        /// The window that elapsed.
        timeout: Duration,
    },

    /// A response arrived but could not be decoded into the requested shape.
    #[error("malformed response to {request_id}: {message}")]
    MalformedResponse {
        /// Request id of the response.
        request_id: String,
        /// Decoder message.
        message: String,
    },

    /// The server rejected the request with a 4xx code.
    #[error("client error {code}: {message}")]
    Client {
        /// Originating status code.
        code: u16,
        /// Originating error message.
        message: String,
    },

    /// The server failed the request with a 5xx code.
    #[error("server error {code}: {message}")]
    Server {
        /// Originating status code.
        code: u16,
        /// Originating error message.
        message: String,
    },

    /// The outbound message cannot be sent as a correlated request.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// What is wrong with the message.
        message: String,
    },

    /// The worker pool is shut down or cancelled the wait.
    #[error("client is shutting down")]
    Shutdown,
}

impl ClientError {
    /// Build the error matching a failed response's status family.
    ///
    /// Returns `None` for codes outside the 4xx/5xx families.
    #[must_use]
    pub fn from_status(code: u16, message: impl Into<String>) -> Option<Self> {
        match StatusFamily::of(code) {
            StatusFamily::ClientError => Some(Self::Client {
                code,
                message: message.into(),
            }),
            StatusFamily::ServerError => Some(Self::Server {
                code,
                message: message.into(),
            }),
            _ => None,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::DuplicateRequest { .. } => "DUPLICATE_REQUEST",
            Self::Timeout { .. } => "TIMEOUT",
            Self::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            Self::Client { .. } => "CLIENT_ERROR",
            Self::Server { .. } => "SERVER_ERROR",
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::Shutdown => "SHUTDOWN",
        }
    }

    /// Originating status code for 4xx/5xx outcomes.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Client { code, .. } | Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout { .. } | Self::Server { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
