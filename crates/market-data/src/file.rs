//! Bar history from a JSON file: an array of `{timestamp, open, high, low,
//! close, volume}` objects in chronological order.

use anyhow::{Context, Result};
use async_trait::async_trait;
use engine::{Bar, Series};
use std::path::PathBuf;
use tracing::debug;

use crate::BarSource;

pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Parse a JSON array of bars into a validated series
pub fn parse_bars(json: &str) -> Result<Series> {
    let bars: Vec<Bar> = serde_json::from_str(json).context("malformed bar JSON")?;
    Ok(Series::new(bars)?)
}

#[async_trait]
impl BarSource for JsonFileSource {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn fetch(&self) -> Result<Series> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let series =
            parse_bars(&raw).with_context(|| format!("invalid bars in {}", self.path.display()))?;
        debug!(path = %self.path.display(), bars = series.len(), "Loaded bars from file");
        Ok(series)
    }
}
