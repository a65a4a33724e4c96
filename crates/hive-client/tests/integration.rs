//! End-to-end tests against an in-process WebSocket server.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use hive_client::websocket::{HeartbeatConfig, Transport};
use hive_client::{
    ClientError, CloseReason, ConnectionEndpoint, ConnectionError, ConnectionState, Extract,
    FieldPolicy, HeartbeatMonitor, HiveClient, Liveness,
};
use hive_settings::ClientSettings;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Bind a loopback listener and serve one connection with `script`.
async fn serve<F, Fut>(script: F) -> String
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        script(ws).await;
    });
    format!("ws://{addr}")
}

/// Scripted device-API server. Reports the close code it receives.
async fn device_server(closes: mpsc::UnboundedSender<u16>) -> String {
    serve(|mut ws| async move {
        let mut batch: Vec<Value> = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            let request: Value = match msg {
                Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
                Message::Close(frame) => {
                    let _ = closes.send(frame.map_or(1005, |f| u16::from(f.code)));
                    continue;
                }
                _ => continue,
            };
            let id = request["requestId"].clone();
            let replies = match request["action"].as_str().unwrap_or_default() {
                "device/get" => vec![json!({
                    "requestId": id,
                    "status": "success",
                    "device": {"id": "d1", "name": "lamp", "networkKey": "secret"},
                })],
                "echo" => vec![json!({"requestId": id, "status": "success", "x": 1})],
                "missing" => vec![json!({"requestId": id, "status": "error", "code": 404, "error": "not found"})],
                "broken" => vec![json!({"requestId": id, "status": "error", "code": 500, "error": "boom"})],
                "notify" => vec![
                    json!({"action": "notification/insert", "notification": {"id": 9}}),
                    json!({"requestId": id, "status": "success"}),
                ],
                "batch" => {
                    batch.push(request);
                    if batch.len() < 10 {
                        continue;
                    }
                    // Answer in reverse arrival order.
                    batch
                        .drain(..)
                        .rev()
                        .map(|r| json!({"requestId": r["requestId"], "status": "success", "n": r["n"]}))
                        .collect()
                }
                _ => Vec::new(),
            };
            for reply in replies {
                if ws.send(Message::text(reply.to_string())).await.is_err() {
                    return;
                }
            }
        }
    })
    .await
}

async fn connect() -> (HiveClient, mpsc::UnboundedReceiver<u16>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let url = device_server(tx).await;
    let client = HiveClient::connect(&url, &ClientSettings::default()).await.unwrap();
    (client, rx)
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Device {
    id: String,
    name: String,
    network_key: Option<String>,
}

const DEVICE_PUBLISHED: FieldPolicy = FieldPolicy::new("device_published", &["id", "name"]);

// ── correlation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn request_receives_its_response() {
    let (client, _closes) = connect().await;
    let x: i64 = timeout(
        TIMEOUT,
        client.send_request(json!({"action": "echo", "requestId": "r1"}), &Extract::member("x")),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(x, 1);
    assert!(client.registry().is_empty());
}

#[tokio::test]
async fn policy_hides_fields() {
    let (client, _closes) = connect().await;
    let full: Device = client
        .send_request(json!({"action": "device/get"}), &Extract::member("device"))
        .await
        .unwrap();
    assert_eq!(full.network_key.as_deref(), Some("secret"));

    let published: Device = client
        .send_request(
            json!({"action": "device/get"}),
            &Extract::member("device").with_policy(DEVICE_PUBLISHED),
        )
        .await
        .unwrap();
    assert_eq!(published.network_key, None);
    assert_eq!(published.name, "lamp");
}

#[tokio::test]
async fn error_statuses_are_classified() {
    let (client, _closes) = connect().await;

    let err = client.send_command(json!({"action": "missing"})).await.unwrap_err();
    assert_matches!(err, ClientError::Client { code: 404, ref message } if message == "not found");
    assert!(!err.is_retryable());

    let err = client.send_command(json!({"action": "broken"})).await.unwrap_err();
    assert_matches!(err, ClientError::Server { code: 500, ref message } if message == "boom");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn out_of_order_responses_reach_their_requests() {
    let (client, _closes) = connect().await;
    let client = Arc::new(client);

    let tasks: Vec<_> = (0..10_u64)
        .map(|n| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .send_request::<u64>(json!({"action": "batch", "n": n}), &Extract::member("n"))
                    .await
            })
        })
        .collect();

    for (n, task) in (0_u64..).zip(tasks) {
        let got = timeout(TIMEOUT, task).await.unwrap().unwrap().unwrap();
        assert_eq!(got, n);
    }
}

#[tokio::test]
async fn silent_server_times_out() {
    let (tx, _closes) = mpsc::unbounded_channel();
    let url = device_server(tx).await;
    let mut settings = ClientSettings::default();
    settings.request.timeout_secs = 1;
    let client = HiveClient::connect(&url, &settings).await.unwrap();

    let err = client
        .send_command(json!({"action": "ignored", "requestId": "r2"}))
        .await
        .unwrap_err();
    assert_matches!(err, ClientError::Timeout { ref request_id, .. } if request_id == "r2");
    assert_eq!(err.code(), "TIMEOUT");
}

#[tokio::test]
async fn pushes_are_broadcast() {
    let (client, _closes) = connect().await;
    let mut pushes = client.subscribe_pushes();

    client.send_command(json!({"action": "notify"})).await.unwrap();
    let push = timeout(TIMEOUT, pushes.recv()).await.unwrap().unwrap();
    assert_eq!(push["notification"]["id"], 9);
}

#[tokio::test]
async fn unreachable_server_fails_to_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = HiveClient::connect(&format!("ws://{addr}"), &ClientSettings::default())
        .await
        .err()
        .unwrap();
    assert_matches!(err, ConnectionError::Connect { .. });
}

// ── lifecycle ───────────────────────────────────────────────────────────

#[tokio::test]
async fn close_sends_normal_closure() {
    let (client, mut closes) = connect().await;
    client.close().await;

    assert_eq!(timeout(TIMEOUT, closes.recv()).await.unwrap(), Some(1000));
    assert_eq!(client.state(), ConnectionState::Closed(CloseReason::normal("client closed")));
    assert_eq!(client.liveness(), Liveness::Closed);
}

#[tokio::test]
async fn server_close_fails_pending_request() {
    let url = serve(|mut ws| async move {
        // Wait for the request, then hang up instead of answering.
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_text() {
                let _ = ws.close(None).await;
            }
        }
    })
    .await;
    let client = HiveClient::connect(&url, &ClientSettings::default()).await.unwrap();

    let err = timeout(TIMEOUT, client.send_command(json!({"action": "anything"})))
        .await
        .unwrap()
        .unwrap_err();
    assert_matches!(err, ClientError::Connection(ConnectionError::Closed { code: 1005, .. }));
}

// ── heartbeat ───────────────────────────────────────────────────────────

fn fast_heartbeat() -> HeartbeatConfig {
    HeartbeatConfig {
        ping_interval: Duration::from_millis(50),
        watchdog_interval: Duration::from_millis(100),
        pong_timeout: Duration::from_millis(300),
        ping_payload: b"devicehive-client-ping".to_vec(),
    }
}

#[tokio::test]
async fn responsive_server_keeps_connection_open() {
    let url = serve(|mut ws| async move { while ws.next().await.is_some() {} }).await;
    let endpoint: Arc<dyn Transport> = Arc::new(ConnectionEndpoint::open(&url, 16).await.unwrap());
    let monitor = HeartbeatMonitor::start(endpoint.clone(), fast_heartbeat());

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(endpoint.is_open());
    assert_eq!(monitor.liveness(), Liveness::Alive);
}

#[tokio::test]
async fn unresponsive_server_is_force_closed() {
    // Never reads, so pings are never answered.
    let url = serve(|ws| async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(ws);
    })
    .await;
    let endpoint: Arc<dyn Transport> = Arc::new(ConnectionEndpoint::open(&url, 16).await.unwrap());
    let monitor = HeartbeatMonitor::start(endpoint.clone(), fast_heartbeat());

    timeout(TIMEOUT, endpoint.closed()).await.unwrap();
    assert_eq!(
        endpoint.state(),
        ConnectionState::Closed(CloseReason::abnormal("No pings from server"))
    );
    assert_eq!(monitor.liveness(), Liveness::Closed);

    let err = endpoint.send_text("{}".into()).await.unwrap_err();
    assert_matches!(err, ConnectionError::NotOpen { .. });
}
