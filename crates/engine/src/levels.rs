//! Support / resistance detection by retouch counting
//!
//! Every interior close is a candidate. A candidate becomes a level when at
//! least `min_retouch` closes of the whole series (itself included) fall in
//! `[price·(1−tol), price·(1+tol)]`. This is O(N²) over the series, fine for a
//! few hundred weekly bars but worth replacing with a sorted-price sweep before
//! pointing it at intraday data.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::Series;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelConfig {
    /// Band half-width as a fraction of the candidate price (default: 0.01)
    pub tolerance: f64,
    /// Closes required inside the band (default: 3)
    pub min_retouch: usize,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            min_retouch: 3,
        }
    }
}

/// Detected levels split around the latest close.
///
/// Levels equal to the latest close belong to neither side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelSet {
    pub supports: Vec<f64>,
    pub resistances: Vec<f64>,
}

impl LevelSet {
    pub fn is_empty(&self) -> bool {
        self.supports.is_empty() && self.resistances.is_empty()
    }

    pub fn len(&self) -> usize {
        self.supports.len() + self.resistances.len()
    }

    /// Supports followed by resistances
    pub fn merged(&self) -> Vec<f64> {
        self.supports
            .iter()
            .chain(self.resistances.iter())
            .copied()
            .collect()
    }
}

/// Number of closes inside the inclusive tolerance band around `price`
pub fn count_retouches(closes: &[f64], price: f64, tolerance: f64) -> usize {
    let lower = price * (1.0 - tolerance);
    let upper = price * (1.0 + tolerance);
    closes.iter().filter(|&&c| c >= lower && c <= upper).count()
}

/// Raw level prices, one entry per qualifying interior bar, in bar order.
///
/// Nearby duplicates are kept; the clusterer merges them.
pub fn find_levels(closes: &[f64], config: &LevelConfig) -> Vec<f64> {
    if closes.len() < 3 {
        return Vec::new();
    }
    closes[1..closes.len() - 1]
        .iter()
        .copied()
        .filter(|&price| count_retouches(closes, price, config.tolerance) >= config.min_retouch)
        .collect()
}

/// Detect levels and partition them relative to the latest close.
///
/// Series shorter than three bars yield an empty set.
pub fn detect_levels(series: &Series, config: &LevelConfig) -> LevelSet {
    let closes = series.closes();
    let Some(&current) = closes.last() else {
        return LevelSet::default();
    };

    let mut set = LevelSet::default();
    for level in find_levels(&closes, config) {
        if level > current {
            set.resistances.push(level);
        } else if level < current {
            set.supports.push(level);
        }
    }

    debug!(
        bars = closes.len(),
        tolerance = config.tolerance,
        min_retouch = config.min_retouch,
        supports = set.supports.len(),
        resistances = set.resistances.len(),
        "Detected levels"
    );

    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::make_series;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn oscillating() -> Vec<f64> {
        vec![
            98.0, 100.0, 102.0, 100.0, 98.0, 100.0, 102.0, 100.0, 98.0, 100.0, 101.5,
        ]
    }

    #[test]
    fn test_recurring_price_is_detected() {
        let closes = oscillating();
        assert_eq!(count_retouches(&closes, 100.0, 0.01), 5);

        let levels = find_levels(&closes, &LevelConfig::default());
        assert!(levels.contains(&100.0));
        assert_eq!(levels.iter().filter(|&&l| l == 100.0).count(), 5);
    }

    #[test]
    fn test_band_is_inclusive() {
        // 101 sits exactly on the upper bound of a 1% band around 100
        let closes = [100.0, 101.0, 99.0];
        assert_eq!(count_retouches(&closes, 100.0, 0.01), 3);
    }

    #[test]
    fn test_boundary_bars_are_not_candidates() {
        // 50 recurs three times but only at the edges and once inside
        let closes = [50.0, 80.0, 50.0, 90.0, 50.0];
        let levels = find_levels(&closes, &LevelConfig::default());
        assert_eq!(levels, vec![50.0]);
    }

    #[test]
    fn test_short_series_yields_empty_set() {
        assert!(detect_levels(&make_series(&[]), &LevelConfig::default()).is_empty());
        assert!(detect_levels(&make_series(&[10.0, 10.0]), &LevelConfig::default()).is_empty());
    }

    #[test]
    fn test_partition_around_current_price() {
        let closes = [
            100.0, 100.5, 99.8, 120.0, 120.4, 119.9, 110.0, 80.0, 80.3, 79.9, 110.0,
        ];
        let set = detect_levels(&make_series(&closes), &LevelConfig::default());
        assert!(!set.supports.is_empty());
        assert!(!set.resistances.is_empty());
        assert!(set.supports.iter().all(|&l| l < 110.0));
        assert!(set.resistances.iter().all(|&l| l > 110.0));
    }

    #[test]
    fn test_level_at_current_price_is_excluded() {
        let closes = [100.0, 100.0, 100.0, 100.0];
        let set = detect_levels(&make_series(&closes), &LevelConfig::default());
        assert!(set.is_empty());
        assert_eq!(find_levels(&closes, &LevelConfig::default()).len(), 2);
    }

    #[test]
    fn test_partition_is_exhaustive_and_disjoint() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..10 {
            let closes: Vec<f64> = (0..150).map(|_| rng.gen_range(90.0..110.0)).collect();
            let config = LevelConfig::default();
            let series = make_series(&closes);
            let current = *closes.last().unwrap();
            let set = detect_levels(&series, &config);
            let raw = find_levels(&closes, &config);
            let at_current = raw.iter().filter(|&&l| l == current).count();
            assert_eq!(set.len() + at_current, raw.len());
            assert!(set.resistances.iter().all(|&l| l > current));
            assert!(set.supports.iter().all(|&l| l < current));
        }
    }

    #[test]
    fn test_detection_is_idempotent() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + ((i * 7) % 13) as f64).collect();
        let series = make_series(&closes);
        let config = LevelConfig::default();
        assert_eq!(detect_levels(&series, &config), detect_levels(&series, &config));
    }

    #[test]
    fn test_min_retouch_threshold() {
        let closes = [10.0, 20.0, 20.1, 30.0, 40.0];
        let strict = LevelConfig {
            tolerance: 0.01,
            min_retouch: 3,
        };
        assert!(find_levels(&closes, &strict).is_empty());
        let loose = LevelConfig {
            tolerance: 0.01,
            min_retouch: 2,
        };
        assert_eq!(find_levels(&closes, &loose), vec![20.0, 20.1]);
    }
}
