//! Kite Stream Client Binary
//!
//! Connects to the feed, subscribes to the tokens given on the command
//! line and logs everything it receives.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p kite-stream-client -- 408065 884737
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `KITE_USER_ID`: Kite user id
//! - `KITE_ENCTOKEN`: session token from the browser login
//!
//! ## Optional
//! - `KITE_WS_ROOT`: WebSocket root URL (default: wss://ws.zerodha.com/)
//! - `KITE_READ_TIMEOUT_SECS`: silence window (default: 5)
//! - `KITE_RECONNECT_ENABLED`: "false"/"0" to disable (default: enabled)
//! - `KITE_RECONNECT_MAX_RETRIES`: attempt cap (default: 50, max 300)
//! - `KITE_RECONNECT_MAX_DELAY_SECS`: backoff cap (default: 60, min 5)
//! - `RUST_LOG`: log level (default: info)

use std::sync::Arc;

use kite_stream_client::{TickerClient, TickerConfig, TickerEvent};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let tokens: Vec<u32> = std::env::args()
        .skip(1)
        .filter_map(|arg| arg.parse().ok())
        .collect();

    let config = TickerConfig::from_env()?;
    tracing::info!(
        root_url = %config.root_url,
        read_timeout_secs = config.read_timeout.as_secs(),
        reconnect_enabled = config.reconnect.enabled,
        "starting kite stream client"
    );

    let shutdown = CancellationToken::new();
    let client = Arc::new(TickerClient::new(config, shutdown.clone()));

    client.on("connect", |_| tracing::info!("connected"));
    client.on("ticks", |event| {
        if let TickerEvent::Ticks(ticks) = event {
            for tick in ticks {
                tracing::info!(
                    token = tick.instrument_token,
                    mode = tick.mode.as_str(),
                    price = %tick.last_price,
                    "tick"
                );
            }
        }
    });
    client.on("order_update", |event| {
        if let TickerEvent::OrderUpdate(payload) = event {
            tracing::info!(%payload, "order update");
        }
    });
    client.on("error", |event| {
        if let TickerEvent::Error(reason) = event {
            tracing::warn!(%reason, "feed error");
        }
    });
    client.on("disconnect", |_| tracing::warn!("disconnected"));
    client.on("reconnect", |event| {
        if let TickerEvent::Reconnect { attempt, delay } = event {
            tracing::info!(attempt, delay_secs = delay.as_secs(), "retrying");
        }
    });
    client.on("noreconnect", |_| tracing::error!("giving up"));

    let runner = {
        let client = Arc::clone(&client);
        tokio::spawn(client.run())
    };

    // Subscribe once the connection is up
    if !tokens.is_empty() {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            loop {
                if client.connected() {
                    client.subscribe(tokens.clone());
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
        });
    }

    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("shutting down");
            shutdown.cancel();
        }
        result = runner => {
            if let Ok(Err(e)) = result {
                tracing::error!(error = %e, "client stopped");
            }
        }
    }

    Ok(())
}

fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(_) => tracing::debug!("no .env file found"),
    }
}
