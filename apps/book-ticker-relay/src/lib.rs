#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::items_after_statements
    )
)]

//! Book Ticker Relay - Demand-Driven Market Data Fan-Out
//!
//! A WebSocket relay that keeps one Binance `bookTicker` stream open per
//! instrument with at least one downstream subscriber, and fans best bid/ask
//! updates out to every subscribed client. The set of instruments clients may
//! subscribe to is the top of the 24h quote-volume ranking, refreshed
//! periodically.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core relay types and bookkeeping
//!   - `streaming`: Book ticker payload
//!   - `protocol`: Client requests, notices and outbound frames
//!   - `subscription`: Eligible universe and subscriber indexes
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Universe source, feed spawner, ticker sink
//!   - `services`: Subscription hub, client sessions, universe refresher
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: Per-instrument stream feeds and universe ranking
//!   - `server`: Downstream WebSocket listener
//!   - `config`: Configuration from the environment
//!   - `health`: Health check and metrics HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                         ┌──────────────────┐
//! Binance REST 24hr ────► │ UniverseRefresher│──── admit / evict ───┐
//!                         └──────────────────┘                      ▼
//! Binance WS btcusdt ──┐                                  ┌──────────────────┐
//! Binance WS ethusdt ──┼──► UpstreamFeed ──── publish ───►│ SubscriptionHub  │
//! (one per subscribed  │                                  └──────────────────┘
//!  instrument)        ─┘                                      │ try_send
//!                                                  ┌──────────┼──────────┐
//!                                                  ▼          ▼          ▼
//!                                              Client 1   Client 2   Client N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core relay types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::protocol::{ClientRequest, ForcedReason, Notice, ServerMessage};
pub use domain::streaming::BookTicker;
pub use domain::subscription::{ConsumerId, Instrument, SubscriptionBook, SubscriptionStats};

// Application services
pub use application::ports::{FeedSpawner, TickerSink, UniverseError, UniverseSource};
pub use application::services::{
    ClientHandle, ClientSession, HubStats, RefreshStatus, SubscriptionHub, UniverseRefresher,
};

// Infrastructure config
pub use infrastructure::config::{
    BinanceSettings, ConfigError, RelayConfig, ServerSettings, UniverseSettings,
    WebSocketSettings,
};

// Binance adapters
pub use infrastructure::binance::{
    BinanceFeedSpawner, BinanceUniverseSource, FeedConfig, ReconnectConfig, UpstreamFeed,
};

// Servers
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::server::{RelayServer, RelayServerError};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
