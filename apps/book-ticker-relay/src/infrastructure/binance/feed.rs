//! Upstream Book Ticker Feed
//!
//! One WebSocket connection to Binance per instrument with subscribers.
//!
//! # Lifecycle
//!
//! ```text
//! connect ──► send SUBSCRIBE ──► receive loop ──► (error) ──► backoff ──► connect
//!                                     │
//!                                     └──► cancel fired ──► Close frame ──► exit
//! ```
//!
//! The feed never touches the registry when cancelled: whoever fired the
//! token has already done the bookkeeping. When the reconnect policy gives up,
//! the feed reports to its sink so subscribers are released.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::messages::{SubscribeCommand, UpstreamFrame, stream_url};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{FeedSpawner, TickerSink};
use crate::domain::streaming::BookTicker;
use crate::domain::subscription::Instrument;
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in an upstream feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Subscribe command could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Connection closed by the server or the stream ended.
    #[error("connection closed")]
    ConnectionClosed,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

impl FeedError {
    /// Metric label for this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::WebSocket(_) => "websocket",
            Self::Serialization(_) => "serialization",
            Self::ConnectionClosed => "closed",
            Self::MaxReconnectAttemptsExceeded => "max_reconnects",
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Settings shared by every feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Base URL of the raw stream endpoint (e.g., `wss://fstream.binance.com/ws`).
    pub stream_base_url: String,
    /// Reconnection behavior.
    pub reconnect: ReconnectConfig,
}

// =============================================================================
// Upstream Feed
// =============================================================================

/// Book ticker feed for a single instrument.
pub struct UpstreamFeed {
    instrument: Instrument,
    url: String,
    reconnect: ReconnectConfig,
    sink: Arc<dyn TickerSink>,
    cancel: CancellationToken,
    last_delivered: Option<BookTicker>,
}

impl UpstreamFeed {
    /// Create a feed.
    #[must_use]
    pub fn new(
        instrument: Instrument,
        config: &FeedConfig,
        sink: Arc<dyn TickerSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            url: stream_url(&config.stream_base_url, &instrument),
            instrument,
            reconnect: config.reconnect.clone(),
            sink,
            cancel,
            last_delivered: None,
        }
    }

    /// Run until cancelled or the reconnect policy gives up.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::MaxReconnectAttemptsExceeded`] after reporting the
    /// termination to the sink.
    pub async fn run(mut self) -> Result<(), FeedError> {
        let mut policy = ReconnectPolicy::new(self.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.connect_and_run(&mut policy).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(instrument = %self.instrument, error = %e, "Upstream feed error");
                    metrics::record_feed_error(e.kind());

                    let delay = match policy.on_failure() {
                        Ok(delay) => delay,
                        Err(give_up) => {
                            tracing::error!(
                                instrument = %self.instrument,
                                failures = policy.failures(),
                                "Upstream feed giving up"
                            );
                            self.sink.feed_terminated(&self.instrument, &self.cancel);
                            return Err(give_up);
                        }
                    };

                    metrics::record_reconnect();
                    tracing::info!(
                        instrument = %self.instrument,
                        attempt = policy.failures(),
                        delay_ms = delay.as_millis(),
                        "Reconnecting upstream feed"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        tracing::info!(instrument = %self.instrument, "Upstream feed exited");
        Ok(())
    }

    /// Connect, subscribe and relay until error, cancellation or refusal.
    async fn connect_and_run(&mut self, policy: &mut ReconnectPolicy) -> Result<(), FeedError> {
        tracing::debug!(instrument = %self.instrument, url = %self.url, "Connecting upstream feed");

        let (ws_stream, _response) = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(()),
            result = tokio_tungstenite::connect_async(self.url.as_str()) => result?,
        };

        let (mut write, mut read) = ws_stream.split();

        let subscribe = SubscribeCommand::book_ticker(&self.instrument).to_json()?;
        write.send(Message::Text(subscribe.into())).await?;
        policy.on_connected();

        tracing::info!(instrument = %self.instrument, "Upstream feed subscribed");

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !self.handle_text(text.as_str()) {
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            let Ok(text) = std::str::from_utf8(&bytes) else {
                                tracing::warn!(instrument = %self.instrument, "Non-UTF-8 binary frame, skipping");
                                continue;
                            };
                            if !self.handle_text(text) {
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(instrument = %self.instrument, ?frame, "Server sent close frame");
                            return Err(FeedError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // tungstenite queues the Pong for each Ping itself
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!(instrument = %self.instrument, "WebSocket stream ended");
                            return Err(FeedError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Handle one text frame. Returns `false` once the sink refuses delivery.
    fn handle_text(&mut self, text: &str) -> bool {
        match UpstreamFrame::parse(text) {
            Ok(UpstreamFrame::Ticker(ticker)) => {
                metrics::record_ticker_received();

                if self
                    .last_delivered
                    .as_ref()
                    .is_some_and(|last| last.same_payload(&ticker))
                {
                    metrics::record_ticker_deduplicated();
                    return true;
                }

                if !self.sink.publish(&self.instrument, &ticker, &self.cancel) {
                    return false;
                }
                self.last_delivered = Some(ticker);
                true
            }
            Ok(UpstreamFrame::Ack) => {
                tracing::debug!(instrument = %self.instrument, "Subscription acknowledged");
                true
            }
            Ok(UpstreamFrame::Rejected(error)) => {
                tracing::warn!(
                    instrument = %self.instrument,
                    code = error.code,
                    msg = %error.msg,
                    "Subscription rejected"
                );
                true
            }
            Err(e) => {
                tracing::warn!(instrument = %self.instrument, error = %e, "Malformed upstream payload, skipping");
                metrics::record_feed_error("parse");
                true
            }
        }
    }
}

impl std::fmt::Debug for UpstreamFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamFeed")
            .field("instrument", &self.instrument)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Spawner
// =============================================================================

/// Starts one [`UpstreamFeed`] task per requested instrument.
#[derive(Debug, Clone)]
pub struct BinanceFeedSpawner {
    config: FeedConfig,
}

impl BinanceFeedSpawner {
    /// Create a spawner.
    #[must_use]
    pub const fn new(config: FeedConfig) -> Self {
        Self { config }
    }
}

impl FeedSpawner for BinanceFeedSpawner {
    fn spawn(&self, instrument: Instrument, cancel: CancellationToken, sink: Arc<dyn TickerSink>) {
        let feed = UpstreamFeed::new(instrument, &self.config, sink, cancel);
        tokio::spawn(async move {
            if let Err(e) = feed.run().await {
                tracing::error!(error = %e, "Upstream feed terminated");
            }
        });
    }
}
