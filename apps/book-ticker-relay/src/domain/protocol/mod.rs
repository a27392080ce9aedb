//! Downstream Client Protocol
//!
//! Frames exchanged with downstream WebSocket clients.
//!
//! # Inbound
//!
//! ```json
//! {"method": "SUBSCRIBE", "pairs": ["BTCUSDT", "ETHUSDT"]}
//! ```
//!
//! # Outbound
//!
//! - Ticker frames, serialized once per upstream update (see
//!   [`BookTicker`](crate::domain::streaming::BookTicker))
//! - Plain-text notices (see [`Notice`])

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

/// The only request method the relay acts on.
pub const SUBSCRIBE_METHOD: &str = "SUBSCRIBE";

// =============================================================================
// Inbound
// =============================================================================

/// A request sent by a downstream client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientRequest {
    /// Request method; only `SUBSCRIBE` is handled.
    pub method: String,
    /// Instruments to toggle.
    #[serde(default)]
    pub pairs: Vec<String>,
}

impl ClientRequest {
    /// Decode a request from a client frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object with a string
    /// `method` and an optional array of strings `pairs`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        // Derived struct decoding also accepts sequences; requests must be objects
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(bytes)?;
        serde_json::from_value(serde_json::Value::Object(object))
    }

    /// Whether this is a SUBSCRIBE request.
    #[must_use]
    pub fn is_subscribe(&self) -> bool {
        self.method == SUBSCRIBE_METHOD
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// Why a client lost a subscription it did not ask to drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedReason {
    /// The instrument fell out of the eligible universe.
    EvictedFromUniverse,
    /// The upstream feed gave up reconnecting.
    FeedUnavailable,
}

/// Plain-text notice sent to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Subscribe attempt for an instrument outside the universe.
    InvalidInstrument(String),
    /// Subscription removed by the relay.
    ForcedUnsubscribe {
        /// Instrument the client was removed from.
        instrument: String,
        /// Cause of the removal.
        reason: ForcedReason,
    },
    /// The client sent a frame that could not be decoded.
    ParseError(String),
}

impl Notice {
    /// Metric label for this notice kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInstrument(_) => "invalid_instrument",
            Self::ForcedUnsubscribe { .. } => "forced_unsubscribe",
            Self::ParseError(_) => "parse_error",
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInstrument(instrument) => write!(f, "Invalid pair: {instrument}"),
            Self::ForcedUnsubscribe {
                instrument,
                reason: ForcedReason::EvictedFromUniverse,
            } => write!(
                f,
                "Unsubscribed from {instrument} since pair is no longer in top set"
            ),
            Self::ForcedUnsubscribe {
                instrument,
                reason: ForcedReason::FeedUnavailable,
            } => write!(
                f,
                "Unsubscribed from {instrument} since upstream feed is unavailable"
            ),
            Self::ParseError(details) => write!(f, "Error unmarshalling message: {details}"),
        }
    }
}

/// A frame queued for a downstream client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Serialized ticker, shared by every recipient of one broadcast.
    Ticker(Arc<str>),
    /// Plain-text notice.
    Notice(Notice),
}

impl ServerMessage {
    /// Text body of the frame.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Ticker(json) => json.to_string(),
            Self::Notice(notice) => notice.to_string(),
        }
    }
}
