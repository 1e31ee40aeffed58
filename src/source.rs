//! Market-data source for consecutive candle pairs.
//!
//! [`BinanceClient`] reads klines from the public Binance REST API; no
//! authentication is required.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::models::{CandlePair, Timeframe};

/// Default public REST endpoint.
pub const DEFAULT_BINANCE_URL: &str = "https://api.binance.com";

const KLINES_PATH: &str = "/api/v3/klines";

/// Per-request timeout for kline fetches.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Supplies the previous and current period for an asset and timeframe.
pub trait CandleSource: Send + Sync {
    /// Fetches the latest two periods.
    ///
    /// # Errors
    ///
    /// Any error means "skip this pair this tick".
    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> impl Future<Output = crate::Result<CandlePair>> + Send;
}

/// Kline client for the Binance spot REST API.
#[derive(Debug, Clone)]
pub struct BinanceClient {
    base_url: String,
    http: reqwest::Client,
}

impl BinanceClient {
    /// Creates a client rooted at `base_url` (no trailing slash needed).
    ///
    /// # Errors
    ///
    /// Returns [`VolwatchError::Http`](crate::VolwatchError::Http) if the
    /// HTTP client cannot be built.
    pub fn new(base_url: &str) -> crate::Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Requests the last `limit` klines for a symbol, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is not 2xx, or the
    /// body is not a JSON array of rows.
    pub async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u16,
    ) -> crate::Result<Vec<serde_json::Value>> {
        let url = format!("{}{KLINES_PATH}", self.base_url);
        let limit = limit.to_string();
        let response = self
            .http
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("interval", interval),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let rows: Vec<serde_json::Value> = response.json().await?;
        debug!(symbol, interval, rows = rows.len(), "fetched klines");
        Ok(rows)
    }
}

impl CandleSource for BinanceClient {
    async fn fetch(&self, symbol: &str, timeframe: Timeframe) -> crate::Result<CandlePair> {
        let rows = self.klines(symbol, timeframe.upstream_interval(), 2).await?;
        CandlePair::from_klines(&rows, symbol, timeframe)
    }
}
