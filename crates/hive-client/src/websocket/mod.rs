//! WebSocket connection, inbound dispatch, and heartbeat.

pub mod connection;
pub mod dispatcher;
pub mod heartbeat;
pub mod transport;

pub use connection::ConnectionEndpoint;
pub use dispatcher::{DispatchOutcome, MessageDispatcher};
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor, Liveness};
pub use transport::{CloseReason, ConnectionState, FrameHandler, PongObserver, Transport};
