//! # hive-client
//!
//! Client-side WebSocket messaging core for Hive.
//!
//! - **Connection**: [`websocket::ConnectionEndpoint`] owns the socket; inbound
//!   text frames go to one [`websocket::FrameHandler`], pongs to one
//!   [`websocket::PongObserver`]
//! - **Dispatch**: [`websocket::MessageDispatcher`] routes correlated responses
//!   into the [`correlation::ResponseRegistry`] and broadcasts server pushes
//! - **Correlation**: [`correlation::RequestCorrelator`] sends a request, waits
//!   on a bounded [`pool::WorkerPool`] and classifies the response
//! - **Heartbeat**: [`websocket::HeartbeatMonitor`] pings on one timer and
//!   force-closes the connection from another when pongs stop
//! - **Facade**: [`HiveClient`] wires all of the above to one connection

#![deny(unsafe_code)]

pub mod client;
pub mod correlation;
pub mod pool;
pub mod websocket;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::HiveClient;
pub use correlation::{Extract, ExtractionPolicy, FieldPolicy, RequestCorrelator, ResponseRegistry};
pub use hive_core::errors::{ClientError, ConnectionError};
pub use pool::WorkerPool;
pub use websocket::{CloseReason, ConnectionEndpoint, ConnectionState, HeartbeatMonitor, Liveness};
