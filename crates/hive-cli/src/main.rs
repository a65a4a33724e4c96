//! # hive-ws
//!
//! Connects to a Hive WebSocket endpoint, sends one JSON request, and prints
//! the requested response member (or `ok`).

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use hive_client::{ClientError, ConnectionError, Extract, HiveClient};
use hive_core::logging::{init_json_subscriber, init_subscriber};
use hive_settings::{ClientSettings, load_settings, load_settings_from_path};
use serde_json::Value;
use tracing::debug;

/// Send one request over the Hive WebSocket API.
#[derive(Parser, Debug)]
#[command(name = "hive-ws", about = "Send one request over the Hive WebSocket API")]
struct Cli {
    /// WebSocket endpoint.
    #[arg(long, default_value = "ws://127.0.0.1:8080/api/websocket")]
    url: String,

    /// Settings file (defaults to `~/.hive/client.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Response member to decode and print. Without it only the status is
    /// checked.
    #[arg(long)]
    member: Option<String>,

    /// Log filter level (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    /// Request object, e.g. `{"action":"server/info"}`.
    message: String,
}

fn load(args: &Cli) -> Result<ClientSettings> {
    let settings = match &args.settings {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => load_settings().context("Failed to load settings")?,
    };
    Ok(settings)
}

async fn run(args: Cli) -> Result<String> {
    let settings = load(&args)?;

    let level = args.log_level.as_deref().unwrap_or(&settings.logging.level);
    if args.json_logs || settings.logging.json {
        init_json_subscriber(level);
    } else {
        init_subscriber(level);
    }

    let message: Value =
        serde_json::from_str(&args.message).context("Request is not valid JSON")?;

    let client = HiveClient::connect(&args.url, &settings)
        .await
        .with_context(|| format!("Failed to connect to {}", args.url))?;
    debug!(url = %args.url, "connected");

    let outcome = match args.member {
        Some(member) => client
            .send_request::<Value>(message, &Extract::member(member))
            .await
            .map(|value| serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())),
        None => client.send_command(message).await.map(|()| "ok".to_owned()),
    };

    client.close().await;
    Ok(outcome?)
}

/// Stable error code for the exit message.
fn error_code(err: &anyhow::Error) -> &'static str {
    if let Some(err) = err.downcast_ref::<ClientError>() {
        err.code()
    } else if err.downcast_ref::<ConnectionError>().is_some() {
        "CONNECTION_ERROR"
    } else {
        "ERROR"
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    match run(args).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error [{}]: {err:#}", error_code(&err));
            ExitCode::FAILURE
        }
    }
}
