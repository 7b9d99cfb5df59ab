//! Operation latency tracking

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Latency percentiles in microseconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct LatencyPercentiles {
    /// Minimum
    pub min: f64,
    /// Median
    pub p50: f64,
    /// 90th percentile
    pub p90: f64,
    /// 99th percentile
    pub p99: f64,
    /// Maximum
    pub max: f64,
    /// Arithmetic mean
    pub mean: f64,
}

/// In-memory histogram of operation latencies
///
/// Microsecond precision, values up to one hour.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    histogram: hdrhistogram::Histogram<u64>,
}

impl LatencyHistogram {
    /// Create a new histogram
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 3_600_000_000, 3)
            .expect("constant histogram bounds are valid");
        Self { histogram }
    }

    /// Record one operation's duration
    pub fn record(&mut self, duration: Duration) {
        self.record_micros(duration.as_micros() as u64);
    }

    /// Record a value already in microseconds
    pub fn record_micros(&mut self, micros: u64) {
        // Sub-microsecond operations land in the lowest bucket.
        let _ = self.histogram.record(micros.max(1));
    }

    /// Number of recorded values
    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    /// Fold another histogram into this one
    pub fn merge(&mut self, other: &LatencyHistogram) {
        let _ = self.histogram.add(&other.histogram);
    }

    /// Calculate percentiles
    pub fn percentiles(&self) -> LatencyPercentiles {
        if self.histogram.is_empty() {
            return LatencyPercentiles::default();
        }

        LatencyPercentiles {
            min: self.histogram.min() as f64,
            p50: self.histogram.value_at_quantile(0.50) as f64,
            p90: self.histogram.value_at_quantile(0.90) as f64,
            p99: self.histogram.value_at_quantile(0.99) as f64,
            max: self.histogram.max() as f64,
            mean: self.histogram.mean(),
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_histogram() {
        let h = LatencyHistogram::new();
        assert!(h.is_empty());
        assert_eq!(h.percentiles(), LatencyPercentiles::default());
    }

    #[test]
    fn test_percentiles() {
        let mut h = LatencyHistogram::new();
        for micros in 1..=100 {
            h.record_micros(micros);
        }
        let p = h.percentiles();
        assert_eq!(h.len(), 100);
        assert_eq!(p.min, 1.0);
        assert_eq!(p.max, 100.0);
        assert!((p.p50 - 50.0).abs() <= 1.0);
        assert!((p.mean - 50.5).abs() < 0.5);
    }

    #[test]
    fn test_zero_duration_is_recorded() {
        let mut h = LatencyHistogram::new();
        h.record(Duration::ZERO);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn test_merge() {
        let mut a = LatencyHistogram::new();
        a.record(Duration::from_micros(10));
        let mut b = LatencyHistogram::new();
        b.record(Duration::from_micros(20));
        b.record(Duration::from_micros(30));

        a.merge(&b);
        assert_eq!(a.len(), 3);
        assert_eq!(a.percentiles().max, 30.0);
    }
}
