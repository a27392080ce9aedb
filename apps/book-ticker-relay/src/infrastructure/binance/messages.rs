//! Binance Stream Messages
//!
//! Frames exchanged with the Binance USDⓈ-M futures raw stream endpoint.
//!
//! # Outbound
//!
//! ```json
//! {"method": "SUBSCRIBE", "params": ["BTCUSDT@bookTicker"]}
//! ```
//!
//! # Inbound
//!
//! - `bookTicker` events (`s`, `b`, `a` consumed; the rest ignored)
//! - Command acknowledgements: `{"result": null, "id": 1}`
//! - Command errors: `{"error": {"code": 2, "msg": "..."}, "id": 1}`

use serde::{Deserialize, Serialize};

use crate::domain::streaming::BookTicker;

/// Stream name suffix for best bid/ask updates.
pub const BOOK_TICKER_STREAM: &str = "@bookTicker";

/// URL of the per-instrument raw stream.
#[must_use]
pub fn stream_url(base_url: &str, instrument: &str) -> String {
    format!(
        "{}/{}{BOOK_TICKER_STREAM}",
        base_url.trim_end_matches('/'),
        instrument.to_lowercase()
    )
}

// =============================================================================
// Outbound
// =============================================================================

/// Live subscription command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeCommand {
    method: &'static str,
    params: Vec<String>,
}

impl SubscribeCommand {
    /// Subscribe to one instrument's book ticker stream.
    #[must_use]
    pub fn book_ticker(instrument: &str) -> Self {
        Self {
            method: "SUBSCRIBE",
            params: vec![format!("{instrument}{BOOK_TICKER_STREAM}")],
        }
    }

    /// Encode as a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Inbound
// =============================================================================

/// Error body of a rejected command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandError {
    /// Binance error code.
    pub code: i64,
    /// Error message.
    pub msg: String,
}

#[derive(Deserialize)]
struct CommandReply {
    #[serde(default)]
    error: Option<CommandError>,
    #[allow(dead_code)]
    id: serde_json::Value,
}

/// A decoded upstream text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamFrame {
    /// Best bid/ask update.
    Ticker(BookTicker),
    /// Command accepted.
    Ack,
    /// Command rejected.
    Rejected(CommandError),
}

impl UpstreamFrame {
    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns the ticker decode error if the frame is neither a ticker nor a
    /// command reply.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        match BookTicker::from_json(text) {
            Ok(ticker) => Ok(Self::Ticker(ticker)),
            Err(ticker_err) => match serde_json::from_str::<CommandReply>(text) {
                Ok(CommandReply {
                    error: Some(error), ..
                }) => Ok(Self::Rejected(error)),
                Ok(_) => Ok(Self::Ack),
                Err(_) => Err(ticker_err),
            },
        }
    }
}
