//! Heartbeat ping/pong liveness monitoring.
//!
//! Two timers run independently: the ping emitter and the liveness watchdog.
//! A slow or failing ping send never delays the watchdog check.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hive_core::constants::WATCHDOG_CLOSE_REASON;
use hive_settings::HeartbeatSettings;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::transport::{CloseReason, PongObserver, Transport};

/// Heartbeat timings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Time between pings.
    pub ping_interval: Duration,
    /// Time between liveness checks.
    pub watchdog_interval: Duration,
    /// Longest tolerated gap since the last pong.
    pub pong_timeout: Duration,
    /// Ping frame payload.
    pub ping_payload: Vec<u8>,
}

impl From<&HeartbeatSettings> for HeartbeatConfig {
    fn from(settings: &HeartbeatSettings) -> Self {
        Self {
            ping_interval: settings.ping_interval(),
            watchdog_interval: settings.watchdog_interval(),
            pong_timeout: settings.pong_timeout(),
            ping_payload: settings.ping_payload.as_bytes().to_vec(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self::from(&HeartbeatSettings::default())
    }
}

/// Last-pong timestamp. Only the pong observer writes it.
pub struct HeartbeatState {
    epoch: Instant,
    last_pong_ms: AtomicU64,
}

impl HeartbeatState {
    /// Start with the clock at "pong received now".
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_pong_ms: AtomicU64::new(0),
        }
    }

    /// Reset the timestamp to now.
    fn record_pong(&self) {
        self.last_pong_ms.store(millis(self.epoch.elapsed()), Ordering::Release);
    }

    /// Time since the last pong (or since creation).
    pub fn last_pong_elapsed(&self) -> Duration {
        let last = Duration::from_millis(self.last_pong_ms.load(Ordering::Acquire));
        self.epoch.elapsed().saturating_sub(last)
    }
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl PongObserver for HeartbeatState {
    fn on_pong(&self, _payload: &[u8]) {
        self.record_pong();
    }
}

/// Liveness of the monitored session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    /// Last pong within the threshold.
    Alive,
    /// Threshold exceeded; the watchdog closes on its next tick unless a
    /// pong arrives first.
    Stale,
    /// Terminal.
    Closed,
}

/// Why a heartbeat loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The watchdog closed the connection.
    TimedOut,
    /// The connection closed for another reason.
    ConnectionClosed,
    /// The monitor was stopped.
    Cancelled,
}

/// Pings the peer and closes the connection when pongs stop.
pub struct HeartbeatMonitor {
    transport: Arc<dyn Transport>,
    state: Arc<HeartbeatState>,
    pong_timeout: Duration,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    /// Attach to `transport` and start both timers.
    pub fn start(transport: Arc<dyn Transport>, config: HeartbeatConfig) -> Self {
        let state = Arc::new(HeartbeatState::new());
        transport.set_pong_observer(state.clone());
        let cancel = CancellationToken::new();

        let _ = tokio::spawn(
            run_ping_loop(
                transport.clone(),
                config.ping_interval,
                config.ping_payload.clone(),
                cancel.clone(),
            )
            .instrument(info_span!("heartbeat_ping")),
        );
        let _ = tokio::spawn(
            run_watchdog(
                transport.clone(),
                state.clone(),
                config.watchdog_interval,
                config.pong_timeout,
                cancel.clone(),
            )
            .instrument(info_span!("heartbeat_watchdog")),
        );

        Self {
            transport,
            state,
            pong_timeout: config.pong_timeout,
            cancel,
        }
    }

    /// Current liveness.
    pub fn liveness(&self) -> Liveness {
        if self.transport.state().is_closed() {
            Liveness::Closed
        } else if self.state.last_pong_elapsed() > self.pong_timeout {
            Liveness::Stale
        } else {
            Liveness::Alive
        }
    }

    /// Time since the last pong.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.state.last_pong_elapsed()
    }

    /// Stop both timers. The connection is left as is.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether [`stop`](Self::stop) was called.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Send a ping every `interval`, starting immediately.
///
/// Send failures are logged and retried on the next tick.
pub async fn run_ping_loop(
    transport: Arc<dyn Transport>,
    interval: Duration,
    payload: Vec<u8>,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if transport.state().is_closed() {
                    return HeartbeatResult::ConnectionClosed;
                }
                match transport.send_ping(payload.clone()).await {
                    Ok(()) => debug!("ping sent"),
                    Err(e) => warn!(error = %e, "ping send failed"),
                }
            }
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
        }
    }
}

/// Every `interval`, force-close the connection if the last pong is older
/// than `pong_timeout`.
pub async fn run_watchdog(
    transport: Arc<dyn Transport>,
    state: Arc<HeartbeatState>,
    interval: Duration,
    pong_timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let elapsed = state.last_pong_elapsed();
                if elapsed > pong_timeout {
                    info!(
                        elapsed_ms = millis(elapsed),
                        threshold_ms = millis(pong_timeout),
                        "no pong within threshold, closing connection"
                    );
                    transport.force_close(CloseReason::abnormal(WATCHDOG_CLOSE_REASON));
                    return HeartbeatResult::TimedOut;
                }
            }
            () = transport.closed() => return HeartbeatResult::ConnectionClosed,
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
