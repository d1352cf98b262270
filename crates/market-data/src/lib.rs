//! Market data sources for the technical-signal engine
//!
//! Everything with I/O lives here; the engine only ever sees a validated
//! [`engine::Series`].

pub mod binance;
pub mod file;

use anyhow::Result;
use async_trait::async_trait;
use engine::Series;

pub use binance::{BinanceClient, BinanceSource, DEFAULT_BARS, DEFAULT_INTERVAL};
pub use file::{parse_bars, JsonFileSource};

/// Something that can produce one instrument's bar history
#[async_trait]
pub trait BarSource: Send + Sync {
    /// Short human-readable label for logs and reports
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<Series>;
}
