//! Streaming min/max/average over scalar series.

use std::collections::BTreeMap;

/// Running statistics for one scalar series.
///
/// `min` and `max` are seeded from the first value, so an all-positive series
/// never reports a minimum of zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatAccumulator {
    count: u64,
    min: f64,
    max: f64,
    total: f64,
    avg: f64,
}

impl StatAccumulator {
    pub fn aggregate(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.total += value;
        self.avg = self.total / self.count as f64;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn avg(&self) -> f64 {
        self.avg
    }
}

/// Named series accumulated under one dimension key.
#[derive(Debug, Clone, Default)]
pub struct SeriesStats {
    series: BTreeMap<&'static str, StatAccumulator>,
}

impl SeriesStats {
    pub fn add(&mut self, series: &'static str, value: f64) {
        self.series.entry(series).or_default().aggregate(value);
    }

    /// Accumulator for `series`; an empty one if the series was never fed.
    pub fn get(&self, series: &str) -> StatAccumulator {
        self.series.get(series).copied().unwrap_or_default()
    }
}

/// Dimension key -> series accumulators, rebuilt every aggregation cycle.
#[derive(Debug, Clone)]
pub struct KeyedStats<K: Ord> {
    keys: BTreeMap<K, SeriesStats>,
}

impl<K: Ord> Default for KeyedStats<K> {
    fn default() -> Self {
        Self {
            keys: BTreeMap::new(),
        }
    }
}

impl<K: Ord> KeyedStats<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&mut self, key: K) -> &mut SeriesStats {
        self.keys.entry(key).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &SeriesStats)> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_seeds_from_first_value() {
        let mut acc = StatAccumulator::default();
        for v in [10.0, 50.0, 30.0] {
            acc.aggregate(v);
        }
        assert_eq!(acc.count(), 3);
        assert_eq!(acc.total(), 90.0);
        assert_eq!(acc.avg(), 30.0);
        assert_eq!(acc.max(), 50.0);
        assert_eq!(acc.min(), 10.0);
    }

    #[test]
    fn test_aggregate_negative_series() {
        let mut acc = StatAccumulator::default();
        for v in [-4.0, -1.0, -9.0] {
            acc.aggregate(v);
        }
        assert_eq!(acc.max(), -1.0);
        assert_eq!(acc.min(), -9.0);
    }

    #[test]
    fn test_matches_independent_computation() {
        let values = [0.25, 17.5, 3.125, 99.0, 42.0, 0.5];
        let mut acc = StatAccumulator::default();
        values.iter().for_each(|v| acc.aggregate(*v));

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        assert!((acc.min() - min).abs() < 1e-9);
        assert!((acc.max() - max).abs() < 1e-9);
        assert!((acc.avg() - avg).abs() < 1e-9);
    }

    #[test]
    fn test_keyed_stats() {
        let mut stats: KeyedStats<String> = KeyedStats::new();
        stats.entry("sda".to_string()).add("reads", 1.0);
        stats.entry("sda".to_string()).add("reads", 3.0);
        stats.entry("nvme0n1".to_string()).add("reads", 7.0);

        let keys: Vec<&String> = stats.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["nvme0n1", "sda"]);
        let sda = stats.entry("sda".to_string()).get("reads");
        assert_eq!((sda.min(), sda.max(), sda.avg()), (1.0, 3.0, 2.0));
        assert_eq!(stats.entry("sda".to_string()).get("writes").count(), 0);
    }
}
