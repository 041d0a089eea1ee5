//! Sync metrics recorder
//!
//! Implements the core `SyncMetricsPort`: per-stream run counters, a run
//! duration ring buffer, and DLQ gauges. Counters use atomics; the duration
//! buffer sits behind a `parking_lot` mutex with O(1) eviction.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use jobfeed_core::SyncMetricsPort;
use jobfeed_domain::{SyncReport, SyncType};
use parking_lot::Mutex;
use tracing::warn;

use super::MetricsResult;

const DURATION_BUFFER_CAPACITY: usize = 256;

/// Counters for one sync stream.
#[derive(Debug, Default)]
struct StreamCounters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time view of the recorder, for tests and operator surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncMetricsSnapshot {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub avg_run_duration_ms: f64,
    pub dlq_depth: u64,
    pub exhausted_count: u64,
}

/// Thread-safe sync metrics recorder.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    streams: [StreamCounters; SyncType::ALL.len()],
    durations: Mutex<VecDeque<Duration>>,
    dlq_depth: AtomicU64,
    exhausted_count: AtomicU64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a run start for a stream.
    ///
    /// Currently always succeeds. Future versions may enforce quotas.
    pub fn record_started(&self, sync_type: SyncType) -> MetricsResult<()> {
        // Relaxed OK: independent counter
        self.stream(sync_type).total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Record a successful run and its duration.
    pub fn record_success(&self, sync_type: SyncType, duration: Duration) -> MetricsResult<()> {
        self.stream(sync_type).successful.fetch_add(1, Ordering::Relaxed);

        let mut durations = self.durations.lock();
        if durations.len() >= DURATION_BUFFER_CAPACITY {
            durations.pop_front();
        }
        durations.push_back(duration);
        Ok(())
    }

    /// Record a failed run for a stream.
    pub fn record_failed(&self, sync_type: SyncType) -> MetricsResult<()> {
        self.stream(sync_type).failed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Update the DLQ depth gauge.
    pub fn set_dlq_depth(&self, depth: u64) -> MetricsResult<()> {
        self.dlq_depth.store(depth, Ordering::Relaxed);
        Ok(())
    }

    /// Update the exhausted-retry gauge.
    pub fn set_exhausted_count(&self, count: u64) -> MetricsResult<()> {
        self.exhausted_count.store(count, Ordering::Relaxed);
        Ok(())
    }

    /// Per-stream counter triple `(total, successful, failed)`.
    pub fn stream_counts(&self, sync_type: SyncType) -> (u64, u64, u64) {
        let counters = self.stream(sync_type);
        (
            counters.total.load(Ordering::Relaxed),
            counters.successful.load(Ordering::Relaxed),
            counters.failed.load(Ordering::Relaxed),
        )
    }

    /// Aggregate view across all streams.
    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        let mut total = 0;
        let mut successful = 0;
        let mut failed = 0;
        for counters in &self.streams {
            total += counters.total.load(Ordering::Relaxed);
            successful += counters.successful.load(Ordering::Relaxed);
            failed += counters.failed.load(Ordering::Relaxed);
        }

        let durations = self.durations.lock();
        let avg_ms = if durations.is_empty() {
            0.0
        } else {
            let total_micros: u128 = durations.iter().map(Duration::as_micros).sum();
            (total_micros as f64 / durations.len() as f64) / 1_000.0
        };

        SyncMetricsSnapshot {
            total_runs: total,
            successful_runs: successful,
            failed_runs: failed,
            avg_run_duration_ms: avg_ms,
            dlq_depth: self.dlq_depth.load(Ordering::Relaxed),
            exhausted_count: self.exhausted_count.load(Ordering::Relaxed),
        }
    }

    fn stream(&self, sync_type: SyncType) -> &StreamCounters {
        let index = match sync_type {
            SyncType::JobListings => 0,
            SyncType::Categories => 1,
            SyncType::Skills => 2,
        };
        &self.streams[index]
    }
}

impl SyncMetricsPort for SyncMetrics {
    fn record_run_started(&self, sync_type: SyncType) {
        log_metric(self.record_started(sync_type), "sync.total");
    }

    fn record_run_success(&self, report: &SyncReport) {
        log_metric(self.record_success(report.sync_type, report.duration), "sync.successful");
    }

    fn record_run_failure(&self, sync_type: SyncType) {
        log_metric(self.record_failed(sync_type), "sync.failed");
    }

    fn record_dlq_depth(&self, depth: u64) {
        log_metric(self.set_dlq_depth(depth), "dlq.depth");
    }

    fn record_exhausted_count(&self, count: u64) {
        log_metric(self.set_exhausted_count(count), "dlq.exhausted");
    }
}

/// Log-and-continue handling for metric recording failures.
pub fn log_metric(result: MetricsResult<()>, metric: &'static str) {
    if let Err(err) = result {
        warn!(metric = metric, error = ?err, "Failed to record metric");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_stream() {
        let metrics = SyncMetrics::new();

        metrics.record_started(SyncType::JobListings).expect("recorded");
        metrics.record_started(SyncType::JobListings).expect("recorded");
        metrics.record_started(SyncType::Skills).expect("recorded");
        metrics
            .record_success(SyncType::JobListings, Duration::from_millis(10))
            .expect("recorded");
        metrics.record_failed(SyncType::Skills).expect("recorded");

        assert_eq!(metrics.stream_counts(SyncType::JobListings), (2, 1, 0));
        assert_eq!(metrics.stream_counts(SyncType::Skills), (1, 0, 1));
        assert_eq!(metrics.stream_counts(SyncType::Categories), (0, 0, 0));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_runs, 3);
        assert_eq!(snapshot.successful_runs, 1);
        assert_eq!(snapshot.failed_runs, 1);
    }

    #[test]
    fn average_duration_reflects_recorded_runs() {
        let metrics = SyncMetrics::new();
        metrics.record_success(SyncType::Categories, Duration::from_millis(10)).expect("recorded");
        metrics.record_success(SyncType::Categories, Duration::from_millis(30)).expect("recorded");

        let snapshot = metrics.snapshot();
        assert!((snapshot.avg_run_duration_ms - 20.0).abs() < 0.01);
    }

    #[test]
    fn duration_buffer_evicts_oldest() {
        let metrics = SyncMetrics::new();
        for _ in 0..(DURATION_BUFFER_CAPACITY + 16) {
            metrics
                .record_success(SyncType::JobListings, Duration::from_millis(5))
                .expect("recorded");
        }
        assert_eq!(metrics.durations.lock().len(), DURATION_BUFFER_CAPACITY);
    }

    #[test]
    fn gauges_hold_latest_value() {
        let metrics = SyncMetrics::new();
        metrics.set_dlq_depth(7).expect("recorded");
        metrics.set_dlq_depth(3).expect("recorded");
        metrics.set_exhausted_count(2).expect("recorded");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.dlq_depth, 3);
        assert_eq!(snapshot.exhausted_count, 2);
    }
}
