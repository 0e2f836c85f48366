//! Alpaca Ingest Binary
//!
//! Starts the market data ingestion pipeline.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin alpaca-ingest
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `ALPACA_KEY`: Alpaca API key
//! - `ALPACA_SECRET`: Alpaca API secret
//! - `INGEST_SYMBOLS`: Comma-separated symbol allow-list (e.g. "AAPL,MSFT")
//!
//! ## Optional
//! - `ALPACA_FEED`: Market data feed - "iex" | "sip" (default: iex)
//! - `INGEST_HEARTBEAT_INTERVAL_SECS`: Ping interval (default: 20)
//! - `INGEST_HEARTBEAT_TIMEOUT_SECS`: Pong timeout (default: 20)
//! - `INGEST_RECONNECT_DELAY_INITIAL_MS`: Initial backoff (default: 1000)
//! - `INGEST_RECONNECT_DELAY_MAX_SECS`: Backoff cap (default: 60)
//! - `INGEST_MAX_RECONNECT_ATTEMPTS`: 0 = unlimited (default: 0)
//! - `INGEST_MESSAGE_BUFFER`: Decoded-message channel capacity (default: 4096)
//! - `INGEST_TOPIC_CAPACITY`: Per-topic broadcast capacity (default: 256)
//! - `INGEST_REPORT_WINDOW_SECS`: Throughput report window (default: 60)
//! - `INGEST_SUBSCRIBE_DELAY_MS`: Post-auth subscribe delay (default: 1000)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use alpaca_ingest::application::coordinator::SubscriptionCoordinator;
use alpaca_ingest::application::dispatch::Dispatcher;
use alpaca_ingest::domain::cache::LatestValueCache;
use alpaca_ingest::domain::subscription::SubscriptionSet;
use alpaca_ingest::infrastructure::alpaca::heartbeat::HeartbeatConfig;
use alpaca_ingest::infrastructure::alpaca::reconnect::ReconnectConfig;
use alpaca_ingest::infrastructure::alpaca::{StreamClient, StreamClientConfig};
use alpaca_ingest::infrastructure::broadcast::{CONNECTION_TOPIC, EventHub};
use alpaca_ingest::infrastructure::telemetry;
use alpaca_ingest::{CanonicalMessage, IngestConfig};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    telemetry::init()?;

    tracing::info!("Starting Alpaca ingest pipeline");

    let config = IngestConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let cache = Arc::new(LatestValueCache::new());
    let hub = Arc::new(EventHub::new(config.channels.topic_capacity));

    // Subscribed before the client starts so no lifecycle event is missed.
    let connection_rx = hub.subscribe(CONNECTION_TOPIC);

    let (msg_tx, msg_rx) = mpsc::channel::<CanonicalMessage>(config.channels.message_buffer);

    let stream_config = StreamClientConfig {
        url: config.stream_url(),
        credentials: config.credentials.clone(),
        reconnect: ReconnectConfig::new(
            config.websocket.reconnect_delay_initial,
            config.websocket.reconnect_delay_max,
            config.websocket.reconnect_delay_multiplier,
            0.0,
            config.websocket.max_reconnect_attempts,
        ),
        heartbeat: HeartbeatConfig::new(
            config.websocket.heartbeat_interval,
            config.websocket.heartbeat_timeout,
        ),
    };
    let (client, handle) = StreamClient::new(stream_config, msg_tx, shutdown_token.clone());

    let dispatcher = Dispatcher::new(
        Arc::clone(&cache),
        config.symbols.clone(),
        config.pipeline.report_window,
    );
    let dispatcher_hub = Arc::clone(&hub);
    let dispatcher_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        dispatcher.run(msg_rx, dispatcher_hub, dispatcher_shutdown).await;
    });

    let desired = SubscriptionSet::desired_for(&config.symbols);
    let coordinator = SubscriptionCoordinator::new(
        desired,
        Arc::new(handle),
        config.pipeline.subscribe_delay,
    );
    let coordinator_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        coordinator.run(connection_rx, coordinator_shutdown).await;
    });

    let client_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = client.run().await {
            tracing::error!(error = %e, "stream client stopped");
            // Fatal client errors (auth rejection, exhausted reconnect
            // budget) bring the whole pipeline down.
            client_shutdown.cancel();
        }
    });

    tracing::info!("Ingest pipeline ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("Ingest pipeline stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &IngestConfig) {
    tracing::info!(
        feed = config.feed.as_str(),
        symbols = config.symbols.len(),
        report_window_secs = config.pipeline.report_window.as_secs(),
        "Configuration loaded"
    );
    tracing::debug!(stream_url = %config.stream_url(), "WebSocket endpoint");
}

/// Wait for a shutdown signal (SIGTERM, SIGINT) or internal cancellation.
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => {
            tracing::info!("Internal shutdown requested");
        }
    }

    shutdown_token.cancel();
}
