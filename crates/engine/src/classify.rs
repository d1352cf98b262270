//! Signal classifier
//!
//! Stateless rules turning the latest indicator values and detected levels
//! into [`ClassificationResult`]s. Each rule is a free function; the
//! [`Classifier`] trait wraps them so a report can run a configurable set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{EngineError, EngineResult};
use crate::indicators::{IndicatorSet, IndicatorSnapshot, MIN_BARS};
use crate::types::{ClassificationResult, Recommendation, Series, Verdict};

pub const RSI: &str = "RSI";
pub const MACD: &str = "MACD";
pub const TREND: &str = "Trend";
pub const LEVELS: &str = "Levels";

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// RSI above this is overbought (default: 70)
    pub rsi_overbought: f64,
    /// RSI below this is oversold (default: 30)
    pub rsi_oversold: f64,
    /// Max distance to a level, as a fraction of price (default: 0.02)
    pub proximity_tolerance: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            proximity_tolerance: 0.02,
        }
    }
}

// ============================================================================
// RSI
// ============================================================================

/// Classify the latest RSI with the default 70/30 thresholds.
pub fn classify_rsi(indicators: &IndicatorSet) -> EngineResult<ClassificationResult> {
    RsiClassifier::default().evaluate(indicators)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RsiClassifier {
    pub overbought: f64,
    pub oversold: f64,
}

impl Default for RsiClassifier {
    fn default() -> Self {
        let config = ClassifierConfig::default();
        Self {
            overbought: config.rsi_overbought,
            oversold: config.rsi_oversold,
        }
    }
}

impl RsiClassifier {
    pub fn evaluate(&self, indicators: &IndicatorSet) -> EngineResult<ClassificationResult> {
        let rsi = indicators
            .latest()?
            .rsi
            .ok_or(EngineError::InsufficientData {
                required: MIN_BARS,
                actual: indicators.len(),
            })?;

        let result = if rsi > self.overbought {
            ClassificationResult::new(
                RSI,
                format!(
                    "RSI at {rsi:.1} is overbought (>{:.0}); a bearish reversal may follow.",
                    self.overbought
                ),
                Verdict::Bearish,
            )
        } else if rsi < self.oversold {
            ClassificationResult::new(
                RSI,
                format!(
                    "RSI at {rsi:.1} is oversold (<{:.0}); a bullish reversal may follow.",
                    self.oversold
                ),
                Verdict::Bullish,
            )
        } else {
            ClassificationResult::new(
                RSI,
                format!(
                    "RSI at {rsi:.1} is neutral, between {:.0} and {:.0}.",
                    self.oversold, self.overbought
                ),
                Verdict::Neutral,
            )
        };
        Ok(result)
    }
}

/// When RSI was last beyond each threshold
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RsiExtremes {
    pub last_overbought: Option<DateTime<Utc>>,
    pub last_oversold: Option<DateTime<Utc>>,
}

pub fn rsi_extremes(
    series: &Series,
    indicators: &IndicatorSet,
    overbought: f64,
    oversold: f64,
) -> RsiExtremes {
    let mut extremes = RsiExtremes::default();
    for (bar, rsi) in series.bars().iter().zip(indicators.rsi.iter()) {
        match rsi {
            Some(v) if *v > overbought => extremes.last_overbought = Some(bar.timestamp),
            Some(v) if *v < oversold => extremes.last_oversold = Some(bar.timestamp),
            _ => {}
        }
    }
    extremes
}

// ============================================================================
// MACD
// ============================================================================

/// The three MACD sub-signals. `Some(true)` votes bullish, `Some(false)`
/// bearish, `None` abstains on an exact tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacdVotes {
    /// Histogram rising vs. falling against the previous bar
    pub momentum: Option<bool>,
    /// MACD above or below zero
    pub zero_line: Option<bool>,
    /// MACD above or below its signal line
    pub crossover: Option<bool>,
}

fn vote(a: f64, b: f64) -> Option<bool> {
    match a.partial_cmp(&b) {
        Some(Ordering::Greater) => Some(true),
        Some(Ordering::Less) => Some(false),
        _ => None,
    }
}

impl MacdVotes {
    pub fn from_values(macd: f64, signal: f64, histogram: f64, previous_histogram: f64) -> Self {
        Self {
            momentum: vote(histogram, previous_histogram),
            zero_line: vote(macd, 0.0),
            crossover: vote(macd, signal),
        }
    }

    pub fn from_snapshot(snapshot: &IndicatorSnapshot) -> Self {
        Self::from_values(
            snapshot.macd,
            snapshot.signal,
            snapshot.histogram,
            snapshot.previous_histogram,
        )
    }

    fn all(&self) -> [Option<bool>; 3] {
        [self.momentum, self.zero_line, self.crossover]
    }

    pub fn bullish(&self) -> usize {
        self.all().iter().filter(|v| **v == Some(true)).count()
    }

    pub fn bearish(&self) -> usize {
        self.all().iter().filter(|v| **v == Some(false)).count()
    }

    pub fn abstentions(&self) -> usize {
        self.all().iter().filter(|v| v.is_none()).count()
    }

    /// Two agreeing votes out of three are needed for a call.
    pub fn recommendation(&self) -> Recommendation {
        match (self.bullish(), self.bearish()) {
            (3, _) => Recommendation::StrongBuy,
            (2, _) => Recommendation::Buy,
            (_, 3) => Recommendation::StrongSell,
            (_, 2) => Recommendation::Sell,
            _ => Recommendation::Hold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdAnalysis {
    pub votes: MacdVotes,
    pub recommendation: Recommendation,
    pub result: ClassificationResult,
}

/// Classify MACD from its zero-line position, signal cross and histogram slope.
pub fn classify_macd(indicators: &IndicatorSet) -> EngineResult<MacdAnalysis> {
    let snapshot = indicators.latest()?;
    let votes = MacdVotes::from_snapshot(&snapshot);
    let recommendation = votes.recommendation();

    let trend = match votes.zero_line {
        Some(true) => "MACD is above zero, the underlying averages point up.",
        Some(false) => "MACD is below zero, the underlying averages point down.",
        None => "MACD sits at zero.",
    };
    let cross = match votes.crossover {
        Some(true) => "MACD is above its signal line (bullish momentum).",
        Some(false) => "MACD is below its signal line (bearish momentum).",
        None => "MACD equals its signal line.",
    };
    let momentum = match votes.momentum {
        Some(true) => "Momentum is accelerating (histogram rising).",
        Some(false) => "Momentum is slowing (histogram falling).",
        None => "Momentum is unchanged (histogram flat).",
    };
    let interpretation = format!(
        "{trend} {cross} {momentum} Recommendation: {recommendation} ({} bullish / {} bearish).",
        votes.bullish(),
        votes.bearish()
    );

    Ok(MacdAnalysis {
        votes,
        recommendation,
        result: ClassificationResult::new(MACD, interpretation, recommendation.verdict()),
    })
}

// ============================================================================
// Trend
// ============================================================================

/// Latest close against the SMA. Equality counts as bearish.
pub fn classify_trend(
    series: &Series,
    indicators: &IndicatorSet,
) -> EngineResult<ClassificationResult> {
    let Some(window) = indicators.sma_window else {
        return Err(EngineError::InvalidParameter(
            "trend classification needs indicators computed with an SMA window".to_string(),
        ));
    };
    let sma = indicators.latest()?.sma.ok_or(EngineError::InsufficientData {
        required: window,
        actual: series.len(),
    })?;
    let price = series.current_price().ok_or(EngineError::InsufficientData {
        required: MIN_BARS,
        actual: 0,
    })?;

    let result = if price > sma {
        ClassificationResult::new(
            TREND,
            format!("Price {price:.2} is above the {window}-period SMA ({sma:.2}): bullish trend."),
            Verdict::Bullish,
        )
    } else {
        ClassificationResult::new(
            TREND,
            format!(
                "Price {price:.2} is not above the {window}-period SMA ({sma:.2}): bearish trend."
            ),
            Verdict::Bearish,
        )
    };
    Ok(result)
}

// ============================================================================
// Level proximity
// ============================================================================

/// Which side of the price the nearest level sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelKind {
    Support,
    Resistance,
}

/// Level closest to `price`; the first one wins on equal distance.
pub fn nearest_level(levels: &[f64], price: f64) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for &level in levels {
        let distance = (level - price).abs();
        match best {
            Some((_, d)) if distance >= d => {}
            _ => best = Some((level, distance)),
        }
    }
    best.map(|(level, _)| level)
}

/// Classify the price against the nearest level within `tolerance` (fraction
/// of the current price), using the last two closes to spot breaks and
/// rejections.
pub fn classify_level_proximity(
    series: &Series,
    levels: &[f64],
    tolerance: f64,
) -> EngineResult<ClassificationResult> {
    series.require(MIN_BARS)?;
    let (Some(current), Some(previous)) = (series.current_price(), series.previous_close()) else {
        return Err(EngineError::InsufficientData {
            required: MIN_BARS,
            actual: series.len(),
        });
    };

    let Some(level) = nearest_level(levels, current) else {
        return Ok(ClassificationResult::new(
            LEVELS,
            "No support or resistance level identified.",
            Verdict::Neutral,
        ));
    };

    if (level - current).abs() > current * tolerance {
        return Ok(ClassificationResult::new(
            LEVELS,
            format!("Price {current:.2} is not near any key level (nearest {level:.2})."),
            Verdict::Neutral,
        ));
    }

    let kind = if level > current {
        LevelKind::Resistance
    } else {
        LevelKind::Support
    };

    let result = match kind {
        LevelKind::Resistance if current < level && previous >= level => {
            ClassificationResult::new(
                LEVELS,
                format!("Rejected at resistance {level:.2}: potential sell signal."),
                Verdict::Bearish,
            )
        }
        LevelKind::Resistance if current > level => ClassificationResult::new(
            LEVELS,
            format!("Broke through resistance {level:.2}: potential buy signal."),
            Verdict::Bullish,
        ),
        LevelKind::Resistance => ClassificationResult::new(
            LEVELS,
            format!("Price is near resistance {level:.2}."),
            Verdict::Neutral,
        ),
        LevelKind::Support if current > level && previous <= level => ClassificationResult::new(
            LEVELS,
            format!("Bounced off support {level:.2}: potential buy signal."),
            Verdict::Bullish,
        ),
        LevelKind::Support if current < level => ClassificationResult::new(
            LEVELS,
            format!("Broke below support {level:.2}: potential sell signal."),
            Verdict::Bearish,
        ),
        LevelKind::Support => ClassificationResult::new(
            LEVELS,
            format!("Price is near support {level:.2}."),
            Verdict::Neutral,
        ),
    };
    Ok(result)
}

// ============================================================================
// Classifier trait
// ============================================================================

/// Inputs shared by every classifier for one report
pub struct AnalysisContext<'a> {
    pub series: &'a Series,
    pub indicators: &'a IndicatorSet,
    /// Merged supports and resistances
    pub levels: &'a [f64],
}

pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;
    fn classify(&self, ctx: &AnalysisContext<'_>) -> EngineResult<ClassificationResult>;
}

impl Classifier for RsiClassifier {
    fn name(&self) -> &str {
        RSI
    }

    fn classify(&self, ctx: &AnalysisContext<'_>) -> EngineResult<ClassificationResult> {
        self.evaluate(ctx.indicators)
    }
}

pub struct MacdClassifier;

impl Classifier for MacdClassifier {
    fn name(&self) -> &str {
        MACD
    }

    fn classify(&self, ctx: &AnalysisContext<'_>) -> EngineResult<ClassificationResult> {
        classify_macd(ctx.indicators).map(|analysis| analysis.result)
    }
}

pub struct TrendClassifier;

impl Classifier for TrendClassifier {
    fn name(&self) -> &str {
        TREND
    }

    fn classify(&self, ctx: &AnalysisContext<'_>) -> EngineResult<ClassificationResult> {
        classify_trend(ctx.series, ctx.indicators)
    }
}

pub struct LevelProximityClassifier {
    pub tolerance: f64,
}

impl Classifier for LevelProximityClassifier {
    fn name(&self) -> &str {
        LEVELS
    }

    fn classify(&self, ctx: &AnalysisContext<'_>) -> EngineResult<ClassificationResult> {
        classify_level_proximity(ctx.series, ctx.levels, self.tolerance)
    }
}

/// The standard classifier set, in report order
pub fn build_classifiers(config: &ClassifierConfig) -> Vec<Box<dyn Classifier>> {
    vec![
        Box::new(RsiClassifier {
            overbought: config.rsi_overbought,
            oversold: config.rsi_oversold,
        }),
        Box::new(MacdClassifier),
        Box::new(TrendClassifier),
        Box::new(LevelProximityClassifier {
            tolerance: config.proximity_tolerance,
        }),
    ]
}
