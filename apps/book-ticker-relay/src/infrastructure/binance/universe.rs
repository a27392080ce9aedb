//! Binance Universe Source
//!
//! Ranks USDⓈ-M futures symbols by 24h quote volume using the public
//! `GET /fapi/v1/ticker/24hr` snapshot.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::{UniverseError, UniverseSource};
use crate::domain::subscription::Instrument;
use crate::infrastructure::config::{BinanceSettings, UniverseSettings};

/// Path of the 24h rolling ticker snapshot.
pub const TICKER_24H_PATH: &str = "/fapi/v1/ticker/24hr";

const MAX_ERROR_BODY: usize = 256;

/// One entry of the 24h ticker snapshot; other fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    /// Instrument symbol.
    pub symbol: String,
    /// Traded quote-currency volume over the last 24h.
    #[serde(with = "rust_decimal::serde::str")]
    pub quote_volume: Decimal,
}

/// Keep symbols ending in `suffix`, highest quote volume first, at most `limit`.
///
/// Ties are broken by symbol so the result is deterministic.
#[must_use]
pub fn rank_by_quote_volume(mut tickers: Vec<Ticker24h>, suffix: &str, limit: usize) -> Vec<Instrument> {
    tickers.retain(|t| t.symbol.ends_with(suffix));
    tickers.sort_by(|a, b| {
        b.quote_volume
            .cmp(&a.quote_volume)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    tickers.into_iter().take(limit).map(|t| t.symbol).collect()
}

/// [`UniverseSource`] backed by the Binance REST API.
#[derive(Debug, Clone)]
pub struct BinanceUniverseSource {
    client: Client,
    url: String,
    quote_suffix: String,
    limit: usize,
}

impl BinanceUniverseSource {
    /// Create a source from relay settings.
    ///
    /// # Errors
    ///
    /// Returns [`UniverseError::Http`] if the HTTP client cannot be built.
    pub fn new(binance: &BinanceSettings, universe: &UniverseSettings) -> Result<Self, UniverseError> {
        let client = Client::builder()
            .timeout(binance.http_timeout)
            .build()
            .map_err(|e| UniverseError::Http(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}{TICKER_24H_PATH}", binance.rest_url.trim_end_matches('/')),
            quote_suffix: universe.quote_suffix.clone(),
            limit: universe.size,
        })
    }

    async fn fetch_snapshot(&self) -> Result<Vec<Ticker24h>, UniverseError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| UniverseError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UniverseError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        response
            .json::<Vec<Ticker24h>>()
            .await
            .map_err(|e| UniverseError::Decode(e.to_string()))
    }
}

#[async_trait]
impl UniverseSource for BinanceUniverseSource {
    async fn fetch_universe(&self) -> Result<HashSet<Instrument>, UniverseError> {
        let snapshot = self.fetch_snapshot().await?;
        let total = snapshot.len();

        let ranked = rank_by_quote_volume(snapshot, &self.quote_suffix, self.limit);
        tracing::debug!(total, selected = ranked.len(), "Ranked 24h ticker snapshot");

        if ranked.is_empty() {
            return Err(UniverseError::Empty);
        }
        Ok(ranked.into_iter().collect())
    }
}
