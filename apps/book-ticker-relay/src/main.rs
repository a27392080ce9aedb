//! Book Ticker Relay Binary
//!
//! Starts the relay, the universe refresher and the health server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin book-ticker-relay
//! ```
//!
//! # Environment Variables
//!
//! - `RELAY_LISTEN_ADDR`: WebSocket listen address (default: 0.0.0.0:8080)
//! - `RELAY_WS_PATH`: WebSocket upgrade path (default: /ws)
//! - `RELAY_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `RELAY_CLIENT_QUEUE_CAPACITY`: Frames buffered per client (default: 1024)
//! - `RELAY_UNIVERSE_SIZE`: Instruments kept after ranking (default: 150)
//! - `RELAY_QUOTE_SUFFIX`: Quote-currency suffix (default: USDT)
//! - `RELAY_REFRESH_INTERVAL_SECS`: Universe refresh period (default: 600)
//! - `BINANCE_STREAM_URL`: Raw stream base URL (default: <wss://fstream.binance.com/ws>)
//! - `BINANCE_REST_URL`: REST base URL (default: <https://fapi.binance.com>)
//! - `BINANCE_HTTP_TIMEOUT_SECS`: REST timeout (default: 10)
//! - `RELAY_RECONNECT_DELAY_INITIAL_MS`, `RELAY_RECONNECT_DELAY_MAX_SECS`,
//!   `RELAY_RECONNECT_DELAY_MULTIPLIER`, `RELAY_MAX_RECONNECT_ATTEMPTS`:
//!   Upstream reconnect backoff
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: book-ticker-relay)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use book_ticker_relay::infrastructure::binance::{
    BinanceFeedSpawner, BinanceUniverseSource, FeedConfig, ReconnectConfig,
};
use book_ticker_relay::infrastructure::health::{HealthServer, HealthServerState};
use book_ticker_relay::infrastructure::server::RelayServer;
use book_ticker_relay::infrastructure::telemetry;
use book_ticker_relay::{RelayConfig, SubscriptionHub, UniverseRefresher, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP export)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Book Ticker Relay");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Hub owns every upstream feed; feeds start on first subscriber
    let spawner = Arc::new(BinanceFeedSpawner::new(FeedConfig {
        stream_base_url: config.binance.stream_url.clone(),
        reconnect: ReconnectConfig::from_websocket_settings(&config.websocket),
    }));
    let hub = Arc::new(SubscriptionHub::new(spawner, shutdown_token.clone()));

    // Universe refresher
    let source = Arc::new(BinanceUniverseSource::new(
        &config.binance,
        &config.universe,
    )?);
    let refresher = UniverseRefresher::new(
        Arc::clone(&hub),
        source,
        config.universe.refresh_interval,
    );
    let refresh_status = refresher.status();

    // Downstream relay server
    let relay_server = RelayServer::new(&config.server, Arc::clone(&hub), shutdown_token.clone());

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&hub),
        refresh_status,
        relay_server.connected_clients(),
    ));
    let health_server = HealthServer::new(
        config.health_addr(),
        health_state,
        shutdown_token.clone(),
    );

    let refresher_handle = tokio::spawn(refresher.run(shutdown_token.clone()));

    let relay_handle = tokio::spawn(async move {
        if let Err(e) = relay_server.run().await {
            tracing::error!(error = %e, "Relay server error");
        }
    });

    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Book ticker relay ready");

    await_shutdown(shutdown_token).await;

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = tokio::join!(refresher_handle, relay_handle, health_handle);
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out, exiting anyway"
        );
    }

    tracing::info!("Book ticker relay stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        listen_addr = %config.server.listen_addr,
        ws_path = %config.server.ws_path,
        health_port = config.server.health_port,
        universe_size = config.universe.size,
        quote_suffix = %config.universe.quote_suffix,
        refresh_interval_secs = config.universe.refresh_interval.as_secs(),
        "Configuration loaded"
    );
    tracing::debug!(
        stream_url = %config.binance.stream_url,
        rest_url = %config.binance.rest_url,
        "Binance endpoints"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
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

/// Wait for shutdown signal (SIGTERM or SIGINT).
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
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
