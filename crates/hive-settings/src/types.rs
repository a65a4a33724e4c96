//! Settings types.

use std::time::Duration;

use hive_core::constants::DEFAULT_PING_PAYLOAD;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Ping/pong liveness monitoring.
    pub heartbeat: HeartbeatSettings,
    /// Request correlation.
    pub request: RequestSettings,
    /// Socket buffering.
    pub connection: ConnectionSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ClientSettings {
    /// Reject values that would stall or disable the client.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("heartbeat.pingIntervalSecs", self.heartbeat.ping_interval_secs),
            ("heartbeat.watchdogIntervalSecs", self.heartbeat.watchdog_interval_secs),
            ("heartbeat.pongTimeoutMinutes", self.heartbeat.pong_timeout_minutes),
            ("request.timeoutSecs", self.request.timeout_secs),
            ("request.poolCapacity", self.request.pool_capacity as u64),
            ("connection.outboundQueueSize", self.connection.outbound_queue_size as u64),
            ("connection.pushBufferSize", self.connection.push_buffer_size as u64),
        ];
        if let Some((key, _)) = checks.iter().find(|(_, v)| *v == 0) {
            return Err(SettingsError::InvalidValue(format!("{key} must be > 0")));
        }
        Ok(())
    }
}

/// Heartbeat timer settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatSettings {
    /// Seconds between ping frames.
    pub ping_interval_secs: u64,
    /// Seconds between liveness checks.
    pub watchdog_interval_secs: u64,
    /// Minutes without a pong before the session is force-closed.
    pub pong_timeout_minutes: u64,
    /// ASCII payload of each ping frame.
    pub ping_payload: String,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            ping_interval_secs: 30,
            watchdog_interval_secs: 60,
            pong_timeout_minutes: 3,
            ping_payload: DEFAULT_PING_PAYLOAD.to_string(),
        }
    }
}

impl HeartbeatSettings {
    /// Ping period.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Watchdog period.
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }

    /// Pong staleness threshold.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_minutes.saturating_mul(60))
    }
}

/// Request correlation settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestSettings {
    /// Seconds to wait for a matching response.
    pub timeout_secs: u64,
    /// Maximum concurrently hosted response waits.
    pub pool_capacity: usize,
    /// Seconds the pool may drain on shutdown before cancelling waits.
    pub shutdown_grace_secs: u64,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            pool_capacity: 100,
            shutdown_grace_secs: 10,
        }
    }
}

impl RequestSettings {
    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Shutdown grace period.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Socket buffering settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Capacity of the outbound frame queue.
    pub outbound_queue_size: usize,
    /// Capacity of the server-push broadcast buffer.
    pub push_buffer_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            outbound_queue_size: 1024,
            push_buffer_size: 256,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter level (overridden by `RUST_LOG`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}
