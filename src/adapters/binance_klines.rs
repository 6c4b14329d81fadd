//! Binance K-line (candlestick) REST API client
//!
//! Fetches the bounded candle window the dashboard charts. No caching: every
//! call is a fresh request.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{Candle, Granularity};
use crate::error::{HiveError, Result};

pub const BINANCE_API_URL: &str = "https://api.binance.com";

/// Source of OHLC candle windows
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Fetch the most recent `limit` candles at the granularity's sub-interval
    async fn fetch_candles(&self, granularity: Granularity, limit: usize) -> Result<Vec<Candle>>;
}

/// Binance K-line API client for a fixed symbol
#[derive(Clone)]
pub struct BinanceKlineClient {
    client: reqwest::Client,
    base_url: String,
    symbol: String,
}

impl BinanceKlineClient {
    /// Create a new K-line client
    pub fn new(base_url: &str, symbol: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            symbol: symbol.to_string(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    fn klines_url(&self, interval: &str, limit: usize) -> String {
        format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            self.symbol,
            interval,
            limit.min(1000)
        )
    }
}

impl Default for BinanceKlineClient {
    fn default() -> Self {
        Self::new(BINANCE_API_URL, "BTCUSDT")
    }
}

#[async_trait]
impl MarketFeed for BinanceKlineClient {
    async fn fetch_candles(&self, granularity: Granularity, limit: usize) -> Result<Vec<Candle>> {
        let url = self.klines_url(granularity.interval(), limit);

        debug!("Fetching K-lines: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| HiveError::feed(format!("K-line request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(HiveError::feed(format!(
                "K-line API error: {}",
                response.status()
            )));
        }

        let data: Vec<Vec<serde_json::Value>> = response
            .json()
            .await
            .map_err(|e| HiveError::feed(format!("K-line parse error: {}", e)))?;

        parse_klines(&data)
    }
}

/// Parse a kline response body, rejecting the whole window if any row is malformed.
pub fn parse_klines(rows: &[Vec<serde_json::Value>]) -> Result<Vec<Candle>> {
    let mut candles = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let candle = Candle::from_kline_row(row)
            .ok_or_else(|| HiveError::feed(format!("malformed K-line row {}", idx)))?;
        candles.push(candle);
    }

    candles.sort_by_key(|c| c.open_time);
    debug!("Parsed {} K-lines", candles.len());
    Ok(candles)
}
