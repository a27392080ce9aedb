//! Prometheus Metrics Module
//!
//! Exposes relay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Tickers**: Upstream tickers received, deduplicated, fanned out, dropped
//! - **Feeds**: Live upstream feeds, feed errors and reconnects
//! - **Clients**: Connected downstream clients and notices sent to them
//! - **Universe**: Eligible universe size and refresh outcomes
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)] // Startup only; the process cannot report metrics without it
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Ticker counters
    describe_counter!(
        "book_ticker_relay_tickers_received_total",
        "Total tickers received from upstream feeds"
    );
    describe_counter!(
        "book_ticker_relay_tickers_deduplicated_total",
        "Total upstream tickers dropped as identical to the previous one"
    );
    describe_counter!(
        "book_ticker_relay_messages_sent_total",
        "Total frames enqueued for downstream clients"
    );
    describe_counter!(
        "book_ticker_relay_messages_dropped_total",
        "Total frames dropped due to full or closed client queues"
    );

    // Feed gauges and counters
    describe_gauge!(
        "book_ticker_relay_live_feeds",
        "Number of live upstream bookTicker feeds"
    );
    describe_counter!(
        "book_ticker_relay_feed_errors_total",
        "Total upstream feed errors by type"
    );
    describe_counter!(
        "book_ticker_relay_reconnects_total",
        "Total upstream reconnection attempts"
    );

    // Client gauges and counters
    describe_gauge!(
        "book_ticker_relay_clients",
        "Number of connected downstream clients"
    );
    describe_counter!(
        "book_ticker_relay_notices_total",
        "Total plain-text notices sent to clients by kind"
    );

    // Universe
    describe_gauge!(
        "book_ticker_relay_universe_size",
        "Number of instruments in the eligible universe"
    );
    describe_counter!(
        "book_ticker_relay_universe_refreshes_total",
        "Total universe refresh ticks by outcome"
    );
    describe_histogram!(
        "book_ticker_relay_universe_refresh_seconds",
        "Time to fetch and reconcile the eligible universe"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for dropped downstream frames.
#[derive(Debug, Clone, Copy)]
pub enum DropReason {
    /// Client queue was full.
    QueueFull,
    /// Client queue was closed (client disconnecting).
    QueueClosed,
    /// Socket write failed.
    WriteFailed,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::QueueClosed => "queue_closed",
            Self::WriteFailed => "write_failed",
        }
    }
}

/// Metric labels for universe refresh outcomes.
#[derive(Debug, Clone, Copy)]
pub enum RefreshOutcome {
    /// Universe fetched and reconciled.
    Success,
    /// Universe source failed; tick aborted.
    Failure,
}

impl RefreshOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Record a ticker received from an upstream feed.
pub fn record_ticker_received() {
    counter!("book_ticker_relay_tickers_received_total").increment(1);
}

/// Record an upstream ticker dropped by deduplication.
pub fn record_ticker_deduplicated() {
    counter!("book_ticker_relay_tickers_deduplicated_total").increment(1);
}

/// Record frames enqueued for downstream clients.
pub fn record_messages_sent(count: u64) {
    counter!("book_ticker_relay_messages_sent_total").increment(count);
}

/// Record frames dropped for a client.
pub fn record_messages_dropped(reason: DropReason, count: u64) {
    counter!(
        "book_ticker_relay_messages_dropped_total",
        "reason" => reason.as_str()
    )
    .increment(count);
}

/// Update the live feed count.
pub fn set_live_feeds(count: f64) {
    gauge!("book_ticker_relay_live_feeds").set(count);
}

/// Record an upstream feed error.
pub fn record_feed_error(error_type: &str) {
    counter!(
        "book_ticker_relay_feed_errors_total",
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record an upstream reconnection attempt.
pub fn record_reconnect() {
    counter!("book_ticker_relay_reconnects_total").increment(1);
}

/// Update the connected client count.
pub fn set_clients(count: f64) {
    gauge!("book_ticker_relay_clients").set(count);
}

/// Record a notice sent to a client.
pub fn record_notice(kind: &'static str) {
    counter!(
        "book_ticker_relay_notices_total",
        "kind" => kind
    )
    .increment(1);
}

/// Update the eligible universe size.
pub fn set_universe_size(count: f64) {
    gauge!("book_ticker_relay_universe_size").set(count);
}

/// Record a universe refresh tick.
pub fn record_refresh(outcome: RefreshOutcome, duration: Duration) {
    counter!(
        "book_ticker_relay_universe_refreshes_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!("book_ticker_relay_universe_refresh_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
