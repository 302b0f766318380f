//! Latency statistics.
//!
//! [`RunningStats`] keeps a fixed-size summary of every observed duration:
//! exact count/min/max, mean and variance via Welford's online update, and an
//! HDR histogram for percentiles. The histogram covers 1 µs to 1 hour with 3
//! significant digits and is allocated once up front, so memory does not grow
//! with the number of samples. Samples beyond one hour saturate at the upper
//! bound for percentile purposes (min/max/mean stay exact).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Upper histogram bound in microseconds (one hour).
const HISTOGRAM_MAX_US: u64 = 3_600_000_000;
const HISTOGRAM_SIGFIGS: u8 = 3;

/// Fixed-memory aggregate of durations in milliseconds.
#[derive(Debug, Clone)]
pub struct RunningStats {
    histogram: Histogram<u64>,
    count: u64,
    min: f64,
    max: f64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new_with_bounds(1, HISTOGRAM_MAX_US, HISTOGRAM_SIGFIGS)
                .expect("Failed to create histogram"),
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            mean: 0.0,
            m2: 0.0,
        }
    }

    /// Record one duration in milliseconds. Negative or NaN input counts as 0.
    pub fn observe(&mut self, duration_ms: f64) {
        let x = if duration_ms.is_nan() { 0.0 } else { duration_ms.max(0.0) };

        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);

        self.min = self.min.min(x);
        self.max = self.max.max(x);

        let micros = (x * 1000.0).round();
        let micros = if micros >= HISTOGRAM_MAX_US as f64 {
            HISTOGRAM_MAX_US
        } else {
            micros as u64
        };
        self.histogram.saturating_record(micros);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    /// Sample (n - 1) variance.
    pub fn sample_variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Approximate percentile in milliseconds, clamped into `[min, max]`.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let value = self.histogram.value_at_percentile(p) as f64 / 1000.0;
        value.clamp(self.min, self.max)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        if self.count == 0 {
            return StatsSnapshot::default();
        }

        // Each percentile is at least the previous one, so ordering survives
        // the clamp even when histogram buckets overlap the exact extremes.
        let mut floor = self.min;
        let mut pct = |p: f64| {
            floor = self.percentile(p).max(floor);
            floor
        };
        let p50 = pct(50.0);
        let p75 = pct(75.0);
        let p90 = pct(90.0);
        let p95 = pct(95.0);
        let p99 = pct(99.0);
        let p999 = pct(99.9);

        StatsSnapshot {
            count: self.count,
            min: self.min,
            max: self.max,
            mean: self.mean,
            stddev: self.stddev(),
            variance: self.variance(),
            percentiles: Percentiles {
                p50,
                p75,
                p90,
                p95,
                p99,
                p999,
            },
        }
    }
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of [`RunningStats`], in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub variance: f64,
    pub percentiles: Percentiles,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
}

/// Statistics shared by concurrently resolving tasks.
///
/// Successful samples go through the mutex-guarded [`RunningStats`]; failures
/// are only counted.
#[derive(Debug, Clone, Default)]
pub struct SharedStats {
    inner: Arc<Mutex<RunningStats>>,
    failures: Arc<AtomicU64>,
}

impl SharedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn observe(&self, duration_ms: f64) {
        self.inner.lock().await.observe(duration_ms);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        self.inner.lock().await.snapshot()
    }

    pub async fn count(&self) -> u64 {
        self.inner.lock().await.count()
    }
}
