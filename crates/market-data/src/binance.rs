//! Binance public klines client (no authentication required)

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine::{Bar, Series};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::BarSource;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";
/// Weekly bars, as the analysis is tuned for
pub const DEFAULT_INTERVAL: &str = "1w";
/// Roughly five years of weekly bars
pub const DEFAULT_BARS: usize = 260;

const MAX_KLINES_PER_REQUEST: usize = 1000;

const INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

/// Raw kline row from Binance (array of mixed values)
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct RawKline(
    i64,    // 0: Open time
    String, // 1: Open
    String, // 2: High
    String, // 3: Low
    String, // 4: Close
    String, // 5: Volume
    i64,    // 6: Close time
    String, // 7: Quote asset volume
    u64,    // 8: Number of trades
    String, // 9: Taker buy base
    String, // 10: Taker buy quote
    String, // 11: Ignore
);

impl RawKline {
    /// Bar stamped with the kline close time (period end)
    fn into_bar(self) -> Result<Bar> {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(self.6)
            .with_context(|| format!("kline close time {} out of range", self.6))?;
        Ok(Bar {
            timestamp,
            open: parse_price(&self.1, "open")?,
            high: parse_price(&self.2, "high")?,
            low: parse_price(&self.3, "low")?,
            close: parse_price(&self.4, "close")?,
            volume: parse_price(&self.5, "volume")?,
        })
    }
}

fn parse_price(raw: &str, field: &str) -> Result<f64> {
    raw.parse::<f64>()
        .with_context(|| format!("invalid {field} value {raw:?}"))
}

/// Binance public market data client
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
}

impl Default for BinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BinanceClient {
    /// Create a new Binance client with default base URL
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch up to 1000 bars ending at `end_time` (ms), oldest first
    pub async fn get_bars(
        &self,
        symbol: &str,
        interval: &str,
        end_time: Option<i64>,
        limit: usize,
    ) -> Result<Vec<(i64, Bar)>> {
        let mut url = format!(
            "{}/api/v3/klines?symbol={}&interval={}",
            self.base_url, symbol, interval
        );
        if let Some(end) = end_time {
            url.push_str(&format!("&endTime={}", end));
        }
        let limit = limit.clamp(1, MAX_KLINES_PER_REQUEST);
        url.push_str(&format!("&limit={}", limit));

        debug!(symbol, interval, limit, "Fetching klines from Binance");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error {}: {}", status, body);
        }

        let raw_klines: Vec<RawKline> = response.json().await?;
        let bars = raw_klines
            .into_iter()
            .map(|raw| {
                let open_time = raw.0;
                raw.into_bar().map(|bar| (open_time, bar))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(count = bars.len(), "Fetched klines");
        Ok(bars)
    }

    /// Fetch the latest `count` bars, paging backwards past the 1000-row limit
    pub async fn get_recent_bars(
        &self,
        symbol: &str,
        interval: &str,
        count: usize,
    ) -> Result<Vec<Bar>> {
        if !INTERVALS.contains(&interval) {
            anyhow::bail!("Unsupported Binance interval {interval:?}");
        }

        info!(symbol, interval, count, "Fetching recent bars from Binance");

        let mut pages: Vec<Vec<Bar>> = Vec::new();
        let mut remaining = count;
        let mut end_time: Option<i64> = None;

        while remaining > 0 {
            let page = self
                .get_bars(symbol, interval, end_time, remaining.min(MAX_KLINES_PER_REQUEST))
                .await?;
            let Some(&(first_open, _)) = page.first() else {
                break;
            };
            let fetched = page.len();
            remaining = remaining.saturating_sub(fetched);
            pages.push(page.into_iter().map(|(_, bar)| bar).collect());

            if fetched < MAX_KLINES_PER_REQUEST {
                break;
            }
            // Next page ends just before the oldest kline we have
            end_time = Some(first_open - 1);
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        let bars: Vec<Bar> = pages.into_iter().rev().flatten().collect();
        info!(total = bars.len(), "Recent bar fetch complete");
        Ok(bars)
    }
}

/// Bar source backed by the Binance klines endpoint
pub struct BinanceSource {
    client: BinanceClient,
    symbol: String,
    interval: String,
    bars: usize,
}

impl BinanceSource {
    pub fn new(client: BinanceClient, symbol: &str, interval: &str, bars: usize) -> Self {
        Self {
            client,
            symbol: symbol.to_uppercase(),
            interval: interval.to_string(),
            bars,
        }
    }
}

#[async_trait]
impl BarSource for BinanceSource {
    fn describe(&self) -> String {
        format!("binance:{}@{}", self.symbol, self.interval)
    }

    async fn fetch(&self) -> Result<Series> {
        let bars = self
            .client
            .get_recent_bars(&self.symbol, &self.interval, self.bars)
            .await?;
        Series::new(bars).with_context(|| format!("invalid bars from {}", self.describe()))
    }
}
