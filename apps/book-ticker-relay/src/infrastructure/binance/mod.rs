//! Binance Adapters
//!
//! Clients for the Binance USDⓈ-M futures public endpoints:
//!
//! - **Feed**: Per-instrument `bookTicker` WebSocket stream
//! - **Universe**: 24h quote-volume ranking over REST

pub mod feed;
pub mod messages;
pub mod reconnect;
pub mod universe;

pub use feed::{BinanceFeedSpawner, FeedConfig, FeedError, UpstreamFeed};
pub use messages::{BOOK_TICKER_STREAM, CommandError, SubscribeCommand, UpstreamFrame, stream_url};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use universe::{BinanceUniverseSource, TICKER_24H_PATH, Ticker24h, rank_by_quote_volume};
