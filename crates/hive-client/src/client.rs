//! The assembled client: one connection, its dispatcher, correlator and
//! heartbeat.

use std::sync::Arc;
use std::time::Duration;

use hive_core::errors::{ClientError, ConnectionError};
use hive_settings::ClientSettings;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::correlation::{Extract, RequestCorrelator, ResponseRegistry};
use crate::pool::WorkerPool;
use crate::websocket::{
    CloseReason, ConnectionEndpoint, ConnectionState, HeartbeatConfig, HeartbeatMonitor, Liveness,
    MessageDispatcher, Transport,
};

/// A connected Hive client.
///
/// Dropping the client stops its heartbeat and background tasks; call
/// [`close`](Self::close) for an orderly shutdown.
pub struct HiveClient {
    transport: Arc<dyn Transport>,
    registry: Arc<ResponseRegistry>,
    pool: Arc<WorkerPool>,
    correlator: RequestCorrelator,
    heartbeat: HeartbeatMonitor,
    pushes: broadcast::Sender<Arc<Value>>,
    shutdown_grace: Duration,
    close_watcher: JoinHandle<()>,
}

impl HiveClient {
    /// Connect to `url` and start the heartbeat.
    pub async fn connect(url: &str, settings: &ClientSettings) -> Result<Self, ConnectionError> {
        let endpoint =
            ConnectionEndpoint::open(url, settings.connection.outbound_queue_size).await?;
        Self::over(Arc::new(endpoint), settings)
    }

    /// Build the client over an already open transport.
    pub fn over(transport: Arc<dyn Transport>, settings: &ClientSettings) -> Result<Self, ConnectionError> {
        let registry = Arc::new(ResponseRegistry::new(settings.request.timeout()));
        let (pushes, _) = broadcast::channel(settings.connection.push_buffer_size.max(1));
        transport.register_handler(Arc::new(MessageDispatcher::new(
            registry.clone(),
            pushes.clone(),
        )))?;

        let pool = Arc::new(WorkerPool::new(settings.request.pool_capacity));
        let correlator = RequestCorrelator::new(
            transport.clone(),
            registry.clone(),
            pool.clone(),
            settings.request.timeout(),
        );
        let heartbeat =
            HeartbeatMonitor::start(transport.clone(), HeartbeatConfig::from(&settings.heartbeat));

        let close_watcher = tokio::spawn({
            let transport = transport.clone();
            let registry = registry.clone();
            async move {
                transport.closed().await;
                if let Some(reason) = transport.state().close_reason() {
                    let failed = registry.fail_all(reason);
                    info!(%reason, failed, "connection closed");
                }
            }
        });

        Ok(Self {
            transport,
            registry,
            pool,
            correlator,
            heartbeat,
            pushes,
            shutdown_grace: settings.request.shutdown_grace(),
            close_watcher,
        })
    }

    /// Send a request and decode one member of the response.
    pub async fn send_request<T>(&self, message: Value, extract: &Extract<T>) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        self.correlator.send_request(message, extract).await
    }

    /// Send a request and check only its status.
    pub async fn send_command(&self, message: Value) -> Result<(), ClientError> {
        self.correlator.send_command(message).await
    }

    /// Receive uncorrelated server pushes.
    pub fn subscribe_pushes(&self) -> broadcast::Receiver<Arc<Value>> {
        self.pushes.subscribe()
    }

    /// Connection state.
    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Heartbeat liveness.
    pub fn liveness(&self) -> Liveness {
        self.heartbeat.liveness()
    }

    /// Time since the last pong.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.heartbeat.last_pong_elapsed()
    }

    /// Response slots, for diagnostics.
    pub fn registry(&self) -> &ResponseRegistry {
        &self.registry
    }

    /// Response waits currently hosted by the pool.
    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    /// Wait until the connection closes.
    pub async fn closed(&self) {
        self.transport.closed().await;
    }

    /// Orderly shutdown.
    ///
    /// Stops the heartbeat, closes the socket with `1000`, fails requests
    /// still waiting and drains the worker pool.
    pub async fn close(&self) {
        self.heartbeat.stop();
        self.transport.close(CloseReason::normal("client closed")).await;

        let reason = self
            .transport
            .state()
            .close_reason()
            .cloned()
            .unwrap_or_else(|| CloseReason::normal("client closed"));
        let failed = self.registry.fail_all(&reason);
        debug!(failed, "released pending requests");

        let _ = self.pool.shutdown(self.shutdown_grace).await;
    }
}

impl Drop for HiveClient {
    fn drop(&mut self) {
        self.heartbeat.stop();
        self.close_watcher.abort();
        self.transport.force_close(CloseReason::going_away("client dropped"));
    }
}
