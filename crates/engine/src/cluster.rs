//! Interval clustering of raw levels into a few representative prices

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Bucket width as a fraction of the current price (default: 0.05)
    pub interval_pct: f64,
    /// Buckets kept per side (default: 3)
    pub max_intervals: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            interval_pct: 0.05,
            max_intervals: 3,
        }
    }
}

impl ClusterConfig {
    pub fn interval_size(&self, current_price: f64) -> f64 {
        current_price * self.interval_pct
    }
}

/// Mean price of one populated bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusteredLevel {
    pub price: f64,
    pub members: usize,
    pub lower_bound: f64,
}

/// Group levels into `interval_size` buckets stepping up from the lowest level
/// and return the means of the `max_intervals` most populated ones.
///
/// Output is ordered by population, ties going to the lower bucket. Empty
/// buckets never appear. An empty input is an error: callers skip clustering
/// for a side with no levels.
pub fn cluster_levels(
    levels: &[f64],
    interval_size: f64,
    max_intervals: usize,
) -> EngineResult<Vec<ClusteredLevel>> {
    if levels.is_empty() {
        return Err(EngineError::EmptyLevels);
    }
    if !interval_size.is_finite() || interval_size <= 0.0 {
        return Err(EngineError::InvalidParameter(format!(
            "interval size must be positive and finite, got {interval_size}"
        )));
    }

    let min_level = levels.iter().copied().fold(f64::INFINITY, f64::min);
    let max_level = levels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // A width below the float resolution at the top level cannot separate buckets
    if max_level + interval_size == max_level {
        return Err(EngineError::InvalidParameter(format!(
            "interval size {interval_size} is below the price resolution at {max_level}"
        )));
    }

    let mut buckets: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
    for &level in levels {
        let index = bucket_index(level, min_level, interval_size);
        buckets.entry(index).or_default().push(level);
    }

    let mut ranked: Vec<(usize, Vec<f64>)> = buckets.into_iter().collect();
    // stable: equal populations stay in ascending price order
    ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let clustered: Vec<ClusteredLevel> = ranked
        .into_iter()
        .take(max_intervals)
        .map(|(index, members)| ClusteredLevel {
            price: members.iter().sum::<f64>() / members.len() as f64,
            members: members.len(),
            lower_bound: min_level + index as f64 * interval_size,
        })
        .collect();

    debug!(
        levels = levels.len(),
        interval_size,
        kept = clustered.len(),
        "Clustered levels"
    );

    Ok(clustered)
}

/// Index `k` of the bucket `[min + k·size, min + (k+1)·size)` holding `level`
fn bucket_index(level: f64, min_level: f64, interval_size: f64) -> usize {
    let k = ((level - min_level) / interval_size).floor().max(0.0) as usize;
    // The division can land one bucket off the stepped bounds; nudge once
    if k > 0 && level < min_level + k as f64 * interval_size {
        k - 1
    } else if level >= min_level + (k + 1) as f64 * interval_size {
        k + 1
    } else {
        k
    }
}
