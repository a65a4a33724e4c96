//! # hive-settings
//!
//! Configuration for the Hive WebSocket client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ClientSettings::default()`]
//! 2. **User file**: `~/.hive/client.json` (deep-merged over defaults)
//! 3. **Environment variables**: `HIVE_*` overrides (highest priority)
//!
//! The heartbeat and request-timeout defaults are the protocol's fixed
//! values; they remain configurable so embedders and tests can shorten them.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
