//! Core data types: bars, validated series and classifier outputs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EngineError, EngineResult};

/// A single period observation (OHLCV), stamped with the period end
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Chronologically ordered, validated sequence of bars.
///
/// The engine only ever reads a `Series`; derived values are returned as
/// separate structures aligned index-for-index with `bars()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Series {
    bars: Vec<Bar>,
}

impl Series {
    /// Validate and wrap a list of bars.
    ///
    /// Timestamps must be strictly ascending, prices positive and finite,
    /// volume finite and non-negative.
    pub fn new(bars: Vec<Bar>) -> EngineResult<Self> {
        for (i, bar) in bars.iter().enumerate() {
            let prices = [
                ("open", bar.open),
                ("high", bar.high),
                ("low", bar.low),
                ("close", bar.close),
            ];
            for (field, value) in prices {
                if !value.is_finite() || value <= 0.0 {
                    return Err(EngineError::InvalidSeries(format!(
                        "bar {i}: {field} must be positive and finite, got {value}"
                    )));
                }
            }
            if !bar.volume.is_finite() || bar.volume < 0.0 {
                return Err(EngineError::InvalidSeries(format!(
                    "bar {i}: volume must be non-negative and finite, got {}",
                    bar.volume
                )));
            }
        }

        if let Some(i) = bars
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(EngineError::InvalidSeries(format!(
                "bar {} at {} is not after bar {} at {}",
                i + 1,
                bars[i + 1].timestamp,
                i,
                bars[i].timestamp
            )));
        }

        Ok(Self { bars })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Close prices in chronological order
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Latest close, the reference price for level partitioning
    pub fn current_price(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    /// Close of the bar before the latest one
    pub fn previous_close(&self) -> Option<f64> {
        self.bars.len().checked_sub(2).map(|i| self.bars[i].close)
    }

    /// Highest close observed in the series (ATH)
    pub fn all_time_high(&self) -> Option<f64> {
        self.bars.iter().map(|b| b.close).reduce(f64::max)
    }

    /// Fail with `InsufficientData` unless the series holds `required` bars.
    pub fn require(&self, required: usize) -> EngineResult<()> {
        if self.bars.len() < required {
            return Err(EngineError::InsufficientData {
                required,
                actual: self.bars.len(),
            });
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for Series {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bars = Vec::<Bar>::deserialize(deserializer)?;
        Series::new(bars).map_err(serde::de::Error::custom)
    }
}

/// Categorical direction of a single classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Bullish => "bullish",
            Verdict::Bearish => "bearish",
            Verdict::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

/// Actionable call derived from one or more verdicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Recommendation {
    pub fn verdict(&self) -> Verdict {
        match self {
            Recommendation::StrongBuy | Recommendation::Buy => Verdict::Bullish,
            Recommendation::Sell | Recommendation::StrongSell => Verdict::Bearish,
            Recommendation::Hold => Verdict::Neutral,
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::StrongBuy => "strong buy",
            Recommendation::Buy => "buy",
            Recommendation::Hold => "no actionable signal",
            Recommendation::Sell => "sell",
            Recommendation::StrongSell => "strong sell",
        };
        f.write_str(s)
    }
}

/// Output of one classifier: the narrative plus a verdict callers can branch on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub indicator: String,
    pub interpretation: String,
    pub verdict: Verdict,
}

impl ClassificationResult {
    pub fn new(indicator: &str, interpretation: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            indicator: indicator.to_string(),
            interpretation: interpretation.into(),
            verdict,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::{Duration, TimeZone};

    /// Weekly bars with the given closes; open/high/low hug the close.
    pub fn make_series(closes: &[f64]) -> Series {
        let start = Utc.with_ymd_and_hms(2020, 1, 3, 0, 0, 0).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: start + Duration::weeks(i as i64),
                open: c,
                high: c * 1.01,
                low: c * 0.99,
                close: c,
                volume: 1_000.0,
            })
            .collect();
        Series::new(bars).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::make_series;
    use super::*;
    use chrono::TimeZone;

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn test_series_accessors() {
        let series = make_series(&[10.0, 30.0, 20.0]);
        assert_eq!(series.len(), 3);
        assert_eq!(series.current_price(), Some(20.0));
        assert_eq!(series.previous_close(), Some(30.0));
        assert_eq!(series.all_time_high(), Some(30.0));
        assert_eq!(series.closes(), vec![10.0, 30.0, 20.0]);
    }

    #[test]
    fn test_empty_series_has_no_prices() {
        let series = Series::new(Vec::new()).unwrap();
        assert!(series.is_empty());
        assert_eq!(series.current_price(), None);
        assert_eq!(series.previous_close(), None);
        assert_eq!(series.all_time_high(), None);
    }

    #[test]
    fn test_rejects_duplicate_timestamps() {
        let err = Series::new(vec![bar(1, 10.0), bar(1, 11.0)]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSeries(_)));
    }

    #[test]
    fn test_rejects_unordered_timestamps() {
        let err = Series::new(vec![bar(2, 10.0), bar(1, 11.0)]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSeries(_)));
    }

    #[test]
    fn test_rejects_non_positive_prices() {
        assert!(Series::new(vec![bar(1, 0.0)]).is_err());
        assert!(Series::new(vec![bar(1, f64::NAN)]).is_err());
        assert!(Series::new(vec![bar(1, -3.0)]).is_err());
    }

    #[test]
    fn test_require_reports_lengths() {
        let series = make_series(&[1.0, 2.0]);
        assert!(series.require(2).is_ok());
        assert_eq!(
            series.require(50),
            Err(EngineError::InsufficientData {
                required: 50,
                actual: 2
            })
        );
    }

    #[test]
    fn test_deserialize_validates() {
        let json = r#"[
            {"timestamp":"2024-01-02T00:00:00Z","open":1.0,"high":1.0,"low":1.0,"close":1.0,"volume":0.0},
            {"timestamp":"2024-01-01T00:00:00Z","open":1.0,"high":1.0,"low":1.0,"close":1.0,"volume":0.0}
        ]"#;
        assert!(serde_json::from_str::<Series>(json).is_err());
    }

    #[test]
    fn test_recommendation_verdicts() {
        assert_eq!(Recommendation::StrongBuy.verdict(), Verdict::Bullish);
        assert_eq!(Recommendation::Sell.verdict(), Verdict::Bearish);
        assert_eq!(Recommendation::Hold.verdict(), Verdict::Neutral);
        assert_eq!(Recommendation::Hold.to_string(), "no actionable signal");
    }
}
