//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `UniverseSource`: Computes the current eligible instrument set
//! - `FeedSpawner`: Starts one upstream feed task for an instrument
//!
//! ## Driver Ports (Inbound)
//!
//! - `TickerSink`: Where a running feed delivers tickers and reports that it
//!   gave up

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::streaming::BookTicker;
use crate::domain::subscription::Instrument;

// =============================================================================
// Universe Source
// =============================================================================

/// Errors produced while computing the eligible universe.
#[derive(Debug, thiserror::Error)]
pub enum UniverseError {
    /// Request could not be sent or the connection failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Upstream answered with a non-success status.
    #[error("unexpected HTTP status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },

    /// Response body could not be decoded.
    #[error("failed to decode market snapshot: {0}")]
    Decode(String),

    /// No instrument qualified.
    #[error("eligible universe is empty")]
    Empty,
}

/// Source of the eligible instrument universe.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UniverseSource: Send + Sync {
    /// Compute the current eligible set.
    async fn fetch_universe(&self) -> Result<HashSet<Instrument>, UniverseError>;
}

// =============================================================================
// Feeds
// =============================================================================

/// Receiver of tickers produced by a running feed.
pub trait TickerSink: Send + Sync {
    /// Deliver a distinct ticker for `instrument`.
    ///
    /// Returns `false` if `cancel` was already fired; nothing is delivered in
    /// that case and the feed should stop.
    fn publish(&self, instrument: &str, ticker: &BookTicker, cancel: &CancellationToken) -> bool;

    /// The feed for `instrument` stopped on its own (reconnects exhausted).
    ///
    /// Ignored if `cancel` was already fired.
    fn feed_terminated(&self, instrument: &str, cancel: &CancellationToken);
}

/// Starts upstream feeds.
///
/// Implementations must not block and must not call back into the sink
/// synchronously; the hub invokes this while holding its lock.
pub trait FeedSpawner: Send + Sync {
    /// Start a feed for `instrument` that runs until `cancel` fires.
    fn spawn(&self, instrument: Instrument, cancel: CancellationToken, sink: Arc<dyn TickerSink>);
}
