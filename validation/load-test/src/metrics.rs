//! Metrics collection and statistics.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Collects per-tile outcomes during a batch.
pub struct MetricsCollector {
    histogram: Histogram<u64>,
    requests_total: u64,
    requests_success: u64,
    requests_failed: u64,
    requests_timed_out: u64,
    bytes_total: u64,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new(3).expect("Failed to create histogram"),
            requests_total: 0,
            requests_success: 0,
            requests_failed: 0,
            requests_timed_out: 0,
            bytes_total: 0,
        }
    }

    /// Record a successful request.
    pub fn record_success(&mut self, latency_us: u64, bytes: usize) {
        self.requests_total += 1;
        self.requests_success += 1;
        self.bytes_total += bytes as u64;
        self.histogram.record(latency_us).ok();
    }

    /// Record a failed request.
    pub fn record_failure(&mut self, timed_out: bool) {
        self.requests_total += 1;
        self.requests_failed += 1;
        if timed_out {
            self.requests_timed_out += 1;
        }
    }

    /// Generate final batch results.
    ///
    /// `elapsed` is the wall-clock time from the first submission until the
    /// executor went idle.
    pub fn results(
        &self,
        label: String,
        grid: GridShape,
        concurrency: usize,
        elapsed: Duration,
    ) -> BatchResults {
        let duration_secs = elapsed.as_secs_f64();
        let per_second = |n: f64| if duration_secs > 0.0 { n / duration_secs } else { 0.0 };

        // Empty histograms report zero.
        let ms = |us: u64| us as f64 / 1000.0;

        BatchResults {
            timestamp: chrono::Utc::now().to_rfc3339(),
            label,
            grid,
            concurrency,
            duration_secs,
            total_requests: self.requests_total,
            successful_requests: self.requests_success,
            failed_requests: self.requests_failed,
            timed_out_requests: self.requests_timed_out,
            total_bytes: self.bytes_total,
            requests_per_second: per_second(self.requests_total as f64),
            bytes_per_second: per_second(self.bytes_total as f64),
            latency_p50: ms(self.histogram.value_at_percentile(50.0)),
            latency_p75: ms(self.histogram.value_at_percentile(75.0)),
            latency_p90: ms(self.histogram.value_at_percentile(90.0)),
            latency_p95: ms(self.histogram.value_at_percentile(95.0)),
            latency_p99: ms(self.histogram.value_at_percentile(99.0)),
            latency_min: ms(self.histogram.min()),
            latency_max: ms(self.histogram.max()),
            latency_avg: self.histogram.mean() / 1000.0,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Shape of the requested tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub level: u32,
    pub cols: u32,
    pub rows: u32,
}

/// Final batch results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    pub timestamp: String,
    pub label: String,
    pub grid: GridShape,
    pub concurrency: usize,
    pub duration_secs: f64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub timed_out_requests: u64,
    pub total_bytes: u64,
    pub requests_per_second: f64,
    pub bytes_per_second: f64,

    // Latency of successful requests (ms)
    pub latency_p50: f64,
    pub latency_p75: f64,
    pub latency_p90: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub latency_min: f64,
    pub latency_max: f64,
    pub latency_avg: f64,
}

impl BatchResults {
    /// Percentage of requests that succeeded; 0 for an empty batch.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64 * 100.0
        }
    }
}
