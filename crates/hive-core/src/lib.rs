//! # hive-core
//!
//! Foundation types shared by the Hive WebSocket client crates.
//!
//! - **Branded IDs**: [`ids::RequestId`] and [`ids::ConnectionId`] newtypes
//! - **Wire constants**: member names and fixed markers of the JSON protocol
//! - **Status families**: HTTP-style classification of response codes
//! - **Errors**: [`errors::ClientError`] / [`errors::ConnectionError`] via `thiserror`
//! - **Logging**: `tracing` subscriber setup and in-memory capture for tests

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod status;

pub use errors::{ClientError, ConnectionError};
pub use ids::{ConnectionId, RequestId};
pub use status::StatusFamily;
