//! Indicator engine
//!
//! Computes EMA(12/26), MACD/Signal/Histogram, RSI and SMA(50) over the closes
//! of a [`Series`]. Every column is aligned index-for-index with the series and
//! value `i` only depends on closes `0..=i`.
//!
//! EMA, MACD and SMA are driven through the `ta` crate's streaming indicators.
//! `ta`'s EMA seeds with the first input (`EMA[0] = Close[0]`) and then applies
//! `α·x + (1−α)·prev` with `α = 2/(span+1)`, which is the recursive average we
//! want. RSI smoothing uses the same recursion with `α = 1/(1+com)`, i.e. an
//! EMA of span `2·com + 1`.

use serde::{Deserialize, Serialize};
use ta::indicators::{
    ExponentialMovingAverage, MovingAverageConvergenceDivergence, SimpleMovingAverage,
};
use ta::Next;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::types::Series;

/// Minimum number of bars for EMA/MACD/RSI to be meaningful
pub const MIN_BARS: usize = 2;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    /// Fast EMA span (default: 12)
    pub ema_fast: usize,
    /// Slow EMA span (default: 26)
    pub ema_slow: usize,
    /// Signal line span over MACD (default: 9)
    pub signal: usize,
    /// RSI center of mass; smoothing factor is 1/(1+com) (default: 13)
    pub rsi_com: usize,
    /// SMA window; `None` skips the SMA column and its length requirement
    pub sma_window: Option<usize>,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_fast: 12,
            ema_slow: 26,
            signal: 9,
            rsi_com: 13,
            sma_window: Some(50),
        }
    }
}

impl IndicatorConfig {
    /// Bars required before `compute_indicators_with` will run
    pub fn required_bars(&self) -> usize {
        self.sma_window.map_or(MIN_BARS, |w| w.max(MIN_BARS))
    }

    fn validate(&self) -> EngineResult<()> {
        if self.ema_fast >= self.ema_slow {
            return Err(EngineError::InvalidParameter(format!(
                "fast EMA span ({}) must be shorter than slow span ({})",
                self.ema_fast, self.ema_slow
            )));
        }
        if self.sma_window == Some(0) {
            return Err(EngineError::InvalidParameter(
                "SMA window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Output
// ============================================================================

/// Derived per-bar columns, same length and order as the source series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub ema_fast: Vec<f64>,
    pub ema_slow: Vec<f64>,
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
    /// Undefined at index 0 (no price change yet)
    pub rsi: Vec<Option<f64>>,
    /// Undefined until the window is full, or everywhere when not requested
    pub sma: Vec<Option<f64>>,
    pub sma_window: Option<usize>,
}

/// The most recent values the classifiers look at
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
    pub previous_histogram: f64,
    pub rsi: Option<f64>,
    pub sma: Option<f64>,
}

impl IndicatorSet {
    pub fn len(&self) -> usize {
        self.macd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macd.is_empty()
    }

    /// Latest values plus the previous histogram bar.
    pub fn latest(&self) -> EngineResult<IndicatorSnapshot> {
        let n = self.len();
        if n < MIN_BARS {
            return Err(EngineError::InsufficientData {
                required: MIN_BARS,
                actual: n,
            });
        }
        let last = n - 1;
        Ok(IndicatorSnapshot {
            macd: self.macd[last],
            signal: self.signal[last],
            histogram: self.histogram[last],
            previous_histogram: self.histogram[last - 1],
            rsi: self.rsi[last],
            sma: self.sma[last],
        })
    }
}

// ============================================================================
// RSI
// ============================================================================

/// Streaming RSI with Wilder-style recursive smoothing
struct SmoothedRsi {
    up: ExponentialMovingAverage,
    down: ExponentialMovingAverage,
    prev_close: Option<f64>,
}

impl SmoothedRsi {
    fn new(com: usize) -> EngineResult<Self> {
        let span = 2 * com + 1;
        Ok(Self {
            up: ExponentialMovingAverage::new(span)?,
            down: ExponentialMovingAverage::new(span)?,
            prev_close: None,
        })
    }

    fn next(&mut self, close: f64) -> Option<f64> {
        let prev = self.prev_close.replace(close)?;
        let delta = close - prev;
        let avg_up = self.up.next(delta.max(0.0));
        let avg_down = self.down.next((-delta).max(0.0));
        Some(rsi_from_averages(avg_up, avg_down))
    }
}

/// RSI from smoothed up/down moves.
///
/// Zero downward movement saturates to 100, flat series included.
pub fn rsi_from_averages(avg_up: f64, avg_down: f64) -> f64 {
    if avg_down <= 0.0 {
        return 100.0;
    }
    let rs = avg_up / avg_down;
    100.0 - 100.0 / (1.0 + rs)
}

// ============================================================================
// Computation
// ============================================================================

/// Compute the default indicator set (EMA 12/26, MACD 9, RSI com 13, SMA 50).
pub fn compute_indicators(series: &Series) -> EngineResult<IndicatorSet> {
    compute_indicators_with(series, &IndicatorConfig::default())
}

/// Compute indicators with explicit spans.
///
/// Fails with `InsufficientData` below two bars, or below the SMA window when
/// one is requested. Never returns a partially filled set.
pub fn compute_indicators_with(
    series: &Series,
    config: &IndicatorConfig,
) -> EngineResult<IndicatorSet> {
    config.validate()?;
    series.require(MIN_BARS)?;
    series.require(config.required_bars())?;

    let mut ema_fast = ExponentialMovingAverage::new(config.ema_fast)?;
    let mut ema_slow = ExponentialMovingAverage::new(config.ema_slow)?;
    let mut macd =
        MovingAverageConvergenceDivergence::new(config.ema_fast, config.ema_slow, config.signal)?;
    let mut rsi = SmoothedRsi::new(config.rsi_com)?;
    let mut sma = config
        .sma_window
        .map(|w| SimpleMovingAverage::new(w).map(|ind| (w, ind)))
        .transpose()?;

    let n = series.len();
    let mut out = IndicatorSet {
        ema_fast: Vec::with_capacity(n),
        ema_slow: Vec::with_capacity(n),
        macd: Vec::with_capacity(n),
        signal: Vec::with_capacity(n),
        histogram: Vec::with_capacity(n),
        rsi: Vec::with_capacity(n),
        sma: Vec::with_capacity(n),
        sma_window: config.sma_window,
    };

    for (i, bar) in series.bars().iter().enumerate() {
        let close = bar.close;
        out.ema_fast.push(ema_fast.next(close));
        out.ema_slow.push(ema_slow.next(close));

        let m = macd.next(close);
        out.macd.push(m.macd);
        out.signal.push(m.signal);
        out.histogram.push(m.histogram);

        out.rsi.push(rsi.next(close));

        // ta averages over the bars seen so far until the window fills
        let sma_val = match sma.as_mut() {
            Some((window, ind)) => {
                let v = ind.next(close);
                (i + 1 >= *window).then_some(v)
            }
            None => None,
        };
        out.sma.push(sma_val);
    }

    debug!(
        bars = n,
        ema_fast = config.ema_fast,
        ema_slow = config.ema_slow,
        sma_window = ?config.sma_window,
        "Computed indicators"
    );

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::make_series;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_walk(seed: u64, n: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut price = 100.0;
        (0..n)
            .map(|_| {
                price *= 1.0 + rng.gen_range(-0.05..0.05);
                price
            })
            .collect()
    }

    fn no_sma() -> IndicatorConfig {
        IndicatorConfig {
            sma_window: None,
            ..Default::default()
        }
    }

    #[test]
    fn test_constant_series() {
        let series = make_series(&[42.0; 60]);
        let ind = compute_indicators(&series).unwrap();
        assert_eq!(ind.len(), 60);
        for i in 0..60 {
            assert!(ind.macd[i].abs() < 1e-12);
            assert!(ind.histogram[i].abs() < 1e-12);
        }
        assert_eq!(ind.rsi[0], None);
        assert!(ind.rsi[1..].iter().all(|r| *r == Some(100.0)));
        assert!((ind.sma[59].unwrap() - 42.0).abs() < 1e-9);
    }

    #[test]
    fn test_ema_recursion_seeded_with_first_close() {
        let closes = [10.0, 11.0, 9.5, 12.0, 12.5];
        let ind = compute_indicators_with(&make_series(&closes), &no_sma()).unwrap();
        let alpha = 2.0 / 13.0;
        let mut expected = closes[0];
        assert!((ind.ema_fast[0] - expected).abs() < 1e-12);
        for i in 1..closes.len() {
            expected = alpha * closes[i] + (1.0 - alpha) * expected;
            assert!((ind.ema_fast[i] - expected).abs() < 1e-9, "index {i}");
        }
    }

    #[test]
    fn test_macd_signal_histogram_relationships() {
        let closes = random_walk(7, 80);
        let ind = compute_indicators(&make_series(&closes)).unwrap();
        for i in 0..closes.len() {
            assert!((ind.macd[i] - (ind.ema_fast[i] - ind.ema_slow[i])).abs() < 1e-9);
            assert!((ind.histogram[i] - (ind.macd[i] - ind.signal[i])).abs() < 1e-9);
        }
        assert!((ind.signal[0] - ind.macd[0]).abs() < 1e-12);
    }

    #[test]
    fn test_rsi_known_values() {
        let ind = compute_indicators_with(&make_series(&[1.0, 2.0, 1.0]), &no_sma()).unwrap();
        assert_eq!(ind.rsi[0], None);
        assert_eq!(ind.rsi[1], Some(100.0));
        // up = 13/14, down = 1/14 => RS = 13
        let expected = 100.0 - 100.0 / 14.0;
        assert!((ind.rsi[2].unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_falling_series_is_zero() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let ind = compute_indicators_with(&make_series(&closes), &no_sma()).unwrap();
        for v in ind.rsi.iter().skip(1) {
            assert!(v.unwrap().abs() < 1e-10);
        }
    }

    #[test]
    fn test_rsi_bounded_on_random_walks() {
        for seed in 0..20 {
            let ind = compute_indicators(&make_series(&random_walk(seed, 120))).unwrap();
            for v in ind.rsi.iter().flatten() {
                assert!((0.0..=100.0).contains(v), "RSI {v} out of range");
            }
        }
    }

    #[test]
    fn test_ema_monotonic_and_bounded_on_rising_series() {
        let closes: Vec<f64> = (0..100).map(|i| 50.0 + (i as f64).powf(1.3)).collect();
        let ind = compute_indicators(&make_series(&closes)).unwrap();
        for i in 1..closes.len() {
            assert!(ind.ema_fast[i] > ind.ema_fast[i - 1]);
            assert!(ind.ema_slow[i] > ind.ema_slow[i - 1]);
            assert!(ind.ema_fast[i] <= closes[i]);
            assert!(ind.ema_slow[i] <= closes[i]);
        }
    }

    #[test]
    fn test_sma_linear_series() {
        let closes: Vec<f64> = (100..160).map(|x| x as f64).collect();
        let ind = compute_indicators(&make_series(&closes)).unwrap();
        assert!(ind.sma[..49].iter().all(Option::is_none));
        assert!((ind.sma[49].unwrap() - 124.5).abs() < 1e-9);
        assert!((ind.sma[59].unwrap() - 134.5).abs() < 1e-9);
    }

    #[test]
    fn test_indicators_are_causal() {
        let closes = random_walk(99, 90);
        let full = compute_indicators(&make_series(&closes)).unwrap();
        let prefix = compute_indicators(&make_series(&closes[..60])).unwrap();
        for i in 0..60 {
            assert_eq!(full.macd[i], prefix.macd[i]);
            assert_eq!(full.signal[i], prefix.signal[i]);
            assert_eq!(full.rsi[i], prefix.rsi[i]);
            assert_eq!(full.sma[i], prefix.sma[i]);
        }
    }

    #[test]
    fn test_insufficient_data() {
        let err = compute_indicators(&make_series(&[100.0])).unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientData {
                required: 2,
                actual: 1
            }
        );

        let err = compute_indicators(&make_series(&[100.0; 30])).unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientData {
                required: 50,
                actual: 30
            }
        );
    }

    #[test]
    fn test_sma_not_requested() {
        let ind = compute_indicators_with(&make_series(&[100.0; 30]), &no_sma()).unwrap();
        assert!(ind.sma.iter().all(Option::is_none));
        assert_eq!(ind.latest().unwrap().sma, None);
    }

    #[test]
    fn test_invalid_spans() {
        let series = make_series(&[1.0, 2.0, 3.0]);
        let bad = IndicatorConfig {
            ema_fast: 26,
            ema_slow: 12,
            sma_window: None,
            ..Default::default()
        };
        assert!(matches!(
            compute_indicators_with(&series, &bad),
            Err(EngineError::InvalidParameter(_))
        ));

        let zero_signal = IndicatorConfig {
            signal: 0,
            sma_window: None,
            ..Default::default()
        };
        assert!(matches!(
            compute_indicators_with(&series, &zero_signal),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_latest_snapshot() {
        let closes = random_walk(3, 55);
        let ind = compute_indicators(&make_series(&closes)).unwrap();
        let snap = ind.latest().unwrap();
        assert_eq!(snap.histogram, ind.histogram[54]);
        assert_eq!(snap.previous_histogram, ind.histogram[53]);
        assert_eq!(snap.sma, ind.sma[54]);
    }
}
