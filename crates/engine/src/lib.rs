//! Technical-signal engine
//!
//! Pure computation over a closed batch of OHLCV bars:
//! - Indicator engine: EMA 12/26, MACD/Signal/Histogram, RSI, SMA 50
//! - Level detector: retouched support/resistance prices
//! - Interval clusterer: a few representative prices per side
//! - Signal classifier: RSI/MACD/trend/level verdicts and a composite call
//!
//! No I/O and no shared state; every operation is a function of its inputs.

pub mod classify;
pub mod cluster;
pub mod error;
pub mod indicators;
pub mod levels;
pub mod report;
pub mod types;

// Re-exports for convenience
pub use classify::{
    build_classifiers, classify_level_proximity, classify_macd, classify_rsi, classify_trend,
    nearest_level, rsi_extremes, AnalysisContext, Classifier, ClassifierConfig, LevelKind,
    MacdAnalysis, MacdVotes, RsiExtremes,
};
pub use cluster::{cluster_levels, ClusterConfig, ClusteredLevel};
pub use error::{EngineError, EngineResult};
pub use indicators::{
    compute_indicators, compute_indicators_with, IndicatorConfig, IndicatorSet, IndicatorSnapshot,
};
pub use levels::{count_retouches, detect_levels, find_levels, LevelConfig, LevelSet};
pub use report::{analyze, AnalysisConfig, TechnicalReport, VoteThresholds};
pub use types::*;
