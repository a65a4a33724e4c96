//! Wire-protocol member names and fixed markers.

/// Correlation identifier member carried by every request and response.
pub const REQUEST_ID_MEMBER: &str = "requestId";

/// Response status member.
pub const STATUS_MEMBER: &str = "status";

/// Numeric status code member of an error response.
pub const CODE_MEMBER: &str = "code";

/// Human-readable error member of an error response.
pub const ERROR_MEMBER: &str = "error";

/// Value of [`STATUS_MEMBER`] for a successful response.
pub const STATUS_SUCCESS: &str = "success";

/// Payload of the client's ping control frames.
pub const DEFAULT_PING_PAYLOAD: &str = "devicehive-client-ping";

/// Close reason recorded when the liveness watchdog terminates a session.
pub const WATCHDOG_CLOSE_REASON: &str = "No pings from server";

/// WebSocket close codes used by the client.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away (client dropped).
    pub const GOING_AWAY: u16 = 1001;
    /// Peer closed without a status code.
    pub const NO_STATUS: u16 = 1005;
    /// Connection lost without a close handshake.
    pub const ABNORMAL: u16 = 1006;
}
