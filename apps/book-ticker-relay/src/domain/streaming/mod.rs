//! Book Ticker Payload
//!
//! The best bid/ask update relayed from the exchange to subscribers. Only the
//! symbol and the two prices are kept; every other upstream field is dropped
//! on decode, so the downstream frame is the same three-field shape.
//!
//! # Wire Format (JSON)
//!
//! ```json
//! {"s": "BTCUSDT", "b": "65000.10", "a": "65000.20"}
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Best bid/ask snapshot for one instrument.
///
/// `PartialEq` compares prices numerically; upstream deduplication uses
/// [`BookTicker::same_payload`] so `"100.1"` and `"100.10"` stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookTicker {
    /// Instrument symbol (e.g., "BTCUSDT").
    #[serde(rename = "s")]
    pub symbol: String,

    /// Best bid price.
    #[serde(rename = "b", with = "rust_decimal::serde::str")]
    pub bid_price: Decimal,

    /// Best ask price.
    #[serde(rename = "a", with = "rust_decimal::serde::str")]
    pub ask_price: Decimal,
}

impl BookTicker {
    /// Create a new ticker.
    #[must_use]
    pub fn new(symbol: impl Into<String>, bid_price: Decimal, ask_price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            bid_price,
            ask_price,
        }
    }

    /// Whether both tickers encode to the same frame, price scale included.
    #[must_use]
    pub fn same_payload(&self, other: &Self) -> bool {
        self.symbol == other.symbol
            && self.bid_price.serialize() == other.bid_price.serialize()
            && self.ask_price.serialize() == other.ask_price.serialize()
    }

    /// Decode a ticker from an upstream text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not JSON or lacks `s`, `b` or `a`.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode the ticker as a downstream text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn decode_binance_book_ticker() {
        let json = r#"{"e":"bookTicker","u":400900217,"E":1568014460893,"T":1568014460891,
            "s":"BNBUSDT","b":"25.35190000","B":"31.21000000","a":"25.36520000","A":"40.66000000"}"#;

        let ticker = BookTicker::from_json(json).unwrap();

        assert_eq!(ticker.symbol, "BNBUSDT");
        assert_eq!(ticker.bid_price, Decimal::from_str("25.35190000").unwrap());
        assert_eq!(ticker.ask_price, Decimal::from_str("25.36520000").unwrap());
    }

    #[test]
    fn encode_keeps_three_field_shape() {
        let ticker = BookTicker::new(
            "BTCUSDT",
            Decimal::from_str("65000.10").unwrap(),
            Decimal::from_str("65000.20").unwrap(),
        );

        let json = ticker.to_json().unwrap();

        assert_eq!(json, r#"{"s":"BTCUSDT","b":"65000.10","a":"65000.20"}"#);
    }

    #[test]
    fn subscription_ack_is_not_a_ticker() {
        assert!(BookTicker::from_json(r#"{"result":null,"id":1}"#).is_err());
    }

    #[test]
    fn identical_payloads_compare_equal() {
        let a = BookTicker::from_json(r#"{"s":"ETHUSDT","b":"3000.01","a":"3000.02"}"#).unwrap();
        let b = BookTicker::from_json(r#"{"s":"ETHUSDT","b":"3000.01","a":"3000.02"}"#).unwrap();
        let c = BookTicker::from_json(r#"{"s":"ETHUSDT","b":"3000.01","a":"3000.03"}"#).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.same_payload(&b));
        assert!(!a.same_payload(&c));
    }

    #[test]
    fn trailing_zeros_make_a_different_payload() {
        let padded = BookTicker::from_json(r#"{"s":"ETHUSDT","b":"3000.10","a":"3000.20"}"#).unwrap();
        let short = BookTicker::from_json(r#"{"s":"ETHUSDT","b":"3000.1","a":"3000.20"}"#).unwrap();

        assert_eq!(padded, short);
        assert!(!padded.same_payload(&short));
        assert!(padded.same_payload(&padded.clone()));
    }
}
