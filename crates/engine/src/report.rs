//! End-to-end technical report
//!
//! Series → indicators → levels → clusters → classifiers → composite call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::classify::{
    build_classifiers, rsi_extremes, AnalysisContext, ClassifierConfig, MacdVotes, RsiExtremes,
    TREND,
};
use crate::cluster::{cluster_levels, ClusterConfig, ClusteredLevel};
use crate::error::{EngineError, EngineResult};
use crate::indicators::{compute_indicators_with, IndicatorConfig, IndicatorSnapshot};
use crate::levels::{detect_levels, LevelConfig};
use crate::types::{ClassificationResult, Recommendation, Series, Verdict};

/// Count thresholds for turning a list of verdicts into one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteThresholds {
    /// Agreeing verdicts for a strong call (default: 3)
    pub strong: usize,
    /// Agreeing verdicts for a plain call, which must also outnumber the other side (default: 2)
    pub weak: usize,
}

impl Default for VoteThresholds {
    fn default() -> Self {
        Self { strong: 3, weak: 2 }
    }
}

impl VoteThresholds {
    pub fn tally<I>(&self, verdicts: I) -> Recommendation
    where
        I: IntoIterator<Item = Verdict>,
    {
        let (mut bullish, mut bearish) = (0usize, 0usize);
        for verdict in verdicts {
            match verdict {
                Verdict::Bullish => bullish += 1,
                Verdict::Bearish => bearish += 1,
                Verdict::Neutral => {}
            }
        }

        if bullish >= self.strong {
            Recommendation::StrongBuy
        } else if bearish >= self.strong {
            Recommendation::StrongSell
        } else if bullish >= self.weak && bullish > bearish {
            Recommendation::Buy
        } else if bearish >= self.weak && bearish > bullish {
            Recommendation::Sell
        } else {
            Recommendation::Hold
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub indicators: IndicatorConfig,
    pub levels: LevelConfig,
    pub clusters: ClusterConfig,
    pub classifiers: ClassifierConfig,
    pub votes: VoteThresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalReport {
    pub symbol: Option<String>,
    pub as_of: DateTime<Utc>,
    pub bars: usize,
    pub current_price: f64,
    pub all_time_high: f64,
    pub snapshot: IndicatorSnapshot,
    pub supports: Vec<ClusteredLevel>,
    pub resistances: Vec<ClusteredLevel>,
    pub raw_supports: usize,
    pub raw_resistances: usize,
    pub signals: Vec<ClassificationResult>,
    pub macd_votes: MacdVotes,
    pub rsi_extremes: RsiExtremes,
    pub recommendation: Recommendation,
}

impl TechnicalReport {
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn signal(&self, indicator: &str) -> Option<&ClassificationResult> {
        self.signals.iter().find(|s| s.indicator == indicator)
    }
}

fn cluster_side(
    levels: &[f64],
    interval_size: f64,
    config: &ClusterConfig,
) -> EngineResult<Vec<ClusteredLevel>> {
    if levels.is_empty() {
        return Ok(Vec::new());
    }
    cluster_levels(levels, interval_size, config.max_intervals)
}

/// Run the full pipeline over one series.
pub fn analyze(series: &Series, config: &AnalysisConfig) -> EngineResult<TechnicalReport> {
    let indicators = compute_indicators_with(series, &config.indicators)?;
    let (Some(last), Some(all_time_high)) = (series.last(), series.all_time_high()) else {
        return Err(EngineError::InsufficientData {
            required: config.indicators.required_bars(),
            actual: 0,
        });
    };
    let current_price = last.close;

    info!(
        bars = series.len(),
        price = current_price,
        as_of = %last.timestamp,
        "Starting technical analysis"
    );

    let level_set = detect_levels(series, &config.levels);
    let interval_size = config.clusters.interval_size(current_price);
    let supports = cluster_side(&level_set.supports, interval_size, &config.clusters)?;
    let resistances = cluster_side(&level_set.resistances, interval_size, &config.clusters)?;

    debug!(
        raw_supports = level_set.supports.len(),
        raw_resistances = level_set.resistances.len(),
        supports = supports.len(),
        resistances = resistances.len(),
        "Levels clustered"
    );

    let merged = level_set.merged();
    let ctx = AnalysisContext {
        series,
        indicators: &indicators,
        levels: &merged,
    };
    // Trend needs the SMA column; without a window it is left out of the vote
    let with_trend = config.indicators.sma_window.is_some();
    let signals = build_classifiers(&config.classifiers)
        .iter()
        .filter(|classifier| with_trend || classifier.name() != TREND)
        .map(|classifier| classifier.classify(&ctx))
        .collect::<EngineResult<Vec<_>>>()?;

    let snapshot = indicators.latest()?;
    let recommendation = config.votes.tally(signals.iter().map(|s| s.verdict));

    info!(
        supports = supports.len(),
        resistances = resistances.len(),
        recommendation = %recommendation,
        "Technical analysis complete"
    );

    Ok(TechnicalReport {
        symbol: None,
        as_of: last.timestamp,
        bars: series.len(),
        current_price,
        all_time_high,
        snapshot,
        supports,
        resistances,
        raw_supports: level_set.supports.len(),
        raw_resistances: level_set.resistances.len(),
        signals,
        macd_votes: MacdVotes::from_snapshot(&snapshot),
        rsi_extremes: rsi_extremes(
            series,
            &indicators,
            config.classifiers.rsi_overbought,
            config.classifiers.rsi_oversold,
        ),
        recommendation,
    })
}

fn fmt_levels(levels: &[ClusteredLevel]) -> String {
    if levels.is_empty() {
        return "none".to_string();
    }
    levels
        .iter()
        .map(|l| format!("{:.2} (x{})", l.price, l.members))
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for TechnicalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = self.symbol.as_deref().unwrap_or("series");
        writeln!(
            f,
            "=== Technical analysis: {} ({} bars, as of {}) ===",
            title,
            self.bars,
            self.as_of.format("%Y-%m-%d")
        )?;
        writeln!(f, "Price:        {:.2}", self.current_price)?;
        writeln!(f, "ATH:          {:.2}", self.all_time_high)?;
        writeln!(
            f,
            "MACD:         {:.4} (signal {:.4}, histogram {:.4})",
            self.snapshot.macd, self.snapshot.signal, self.snapshot.histogram
        )?;
        if let Some(rsi) = self.snapshot.rsi {
            writeln!(f, "RSI:          {rsi:.1}")?;
        }
        if let Some(sma) = self.snapshot.sma {
            writeln!(f, "SMA:          {sma:.2}")?;
        }
        writeln!(f, "Supports:     {}", fmt_levels(&self.supports))?;
        writeln!(f, "Resistances:  {}", fmt_levels(&self.resistances))?;
        if let Some(ts) = self.rsi_extremes.last_overbought {
            writeln!(f, "Last RSI>70:  {}", ts.format("%Y-%m-%d"))?;
        }
        if let Some(ts) = self.rsi_extremes.last_oversold {
            writeln!(f, "Last RSI<30:  {}", ts.format("%Y-%m-%d"))?;
        }
        writeln!(f)?;
        for signal in &self.signals {
            writeln!(
                f,
                "[{:<7}] {:<6} {}",
                signal.verdict, signal.indicator, signal.interpretation
            )?;
        }
        writeln!(f)?;
        write!(f, "Recommendation: {}", self.recommendation)
    }
}
