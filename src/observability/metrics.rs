//! Thread-safe metrics collection system
//!
//! Provides atomic counters and mutex-protected collections for tracking
//! task processing, per-strategy hand-offs and worker lifecycle.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const MAX_TIMING_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    // Task processing metrics (atomic for high frequency)
    tasks_received: AtomicU64,
    tasks_in_flight: AtomicU64,
    requests_submitted: AtomicU64,
    requests_failed: AtomicU64,
    requests_skipped: AtomicU64,
    fatal_errors: AtomicU64,
    conflicts: AtomicU64,
    cleanup_failures: AtomicU64,

    // Processing times (mutex protected for complex operations)
    processing_times: Mutex<Vec<u64>>, // in milliseconds

    // Per-strategy statistics
    strategy_stats: Mutex<HashMap<String, StrategyStats>>,

    // Lifecycle metrics
    worker_state: Mutex<String>,
    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tasks_received: AtomicU64::new(0),
            tasks_in_flight: AtomicU64::new(0),
            requests_submitted: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            requests_skipped: AtomicU64::new(0),
            fatal_errors: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            cleanup_failures: AtomicU64::new(0),
            processing_times: Mutex::new(Vec::new()),
            strategy_stats: Mutex::new(HashMap::new()),
            worker_state: Mutex::new("initializing".to_string()),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // Task processing metrics
    pub fn task_received(&self) {
        self.tasks_received.fetch_add(1, Ordering::Relaxed);
        self.tasks_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// A strategy accepted the request and the transition was committed
    pub fn request_submitted(&self, strategy: &str, duration: Duration) {
        self.requests_submitted.fetch_add(1, Ordering::Relaxed);
        self.finish_task(duration);
        self.record_strategy(strategy, duration, true);
    }

    /// A strategy rejected the request and the transition was committed
    pub fn request_failed(&self, strategy: &str, duration: Duration) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        self.finish_task(duration);
        self.record_strategy(strategy, duration, false);
    }

    /// The request was not pending, nothing was done
    pub fn request_skipped(&self, duration: Duration) {
        self.requests_skipped.fetch_add(1, Ordering::Relaxed);
        self.finish_task(duration);
    }

    /// The attempt aborted without committing a transition
    pub fn fatal_error(&self, duration: Duration) {
        self.fatal_errors.fetch_add(1, Ordering::Relaxed);
        self.finish_task(duration);
    }

    pub fn conflict_detected(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cleanup_failed(&self) {
        self.cleanup_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn finish_task(&self, duration: Duration) {
        // Saturate so a reset while tasks are in flight cannot wrap around
        let _ = self
            .tasks_in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
        self.record_processing_time(duration);
    }

    fn record_processing_time(&self, duration: Duration) {
        if let Ok(mut times) = self.processing_times.lock() {
            times.push(duration.as_millis() as u64);

            // Limit to last 1000 measurements to prevent unbounded growth
            if times.len() > MAX_TIMING_SAMPLES {
                times.remove(0);
            }
        }
    }

    fn record_strategy(&self, strategy: &str, duration: Duration, accepted: bool) {
        if let Ok(mut stats) = self.strategy_stats.lock() {
            let entry = stats
                .entry(strategy.to_string())
                .or_insert_with(|| StrategyStats::new(strategy));
            entry.submissions += 1;
            if !accepted {
                entry.rejections += 1;
            }
            entry.submit_times.push(duration.as_millis() as u64);
            if entry.submit_times.len() > MAX_TIMING_SAMPLES {
                entry.submit_times.remove(0);
            }
        }
    }

    // Lifecycle metrics
    pub fn set_worker_state(&self, state: &str) {
        if let Ok(mut current_state) = self.worker_state.lock() {
            *current_state = state.to_string();
        }
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.tasks_received,
            &self.tasks_in_flight,
            &self.requests_submitted,
            &self.requests_failed,
            &self.requests_skipped,
            &self.fatal_errors,
            &self.conflicts,
            &self.cleanup_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        if let Ok(mut times) = self.processing_times.lock() {
            times.clear();
        }
        if let Ok(mut stats) = self.strategy_stats.lock() {
            stats.clear();
        }
        if let Ok(mut state) = self.worker_state.lock() {
            *state = "initializing".to_string();
        }
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
    }

    /// Calculate processing time statistics (pure function)
    fn processing_time_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(times) = self.processing_times.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted_times = times.clone();
        sorted_times.sort_unstable();

        let avg = sorted_times.iter().sum::<u64>() as f64 / sorted_times.len() as f64;
        (
            avg,
            percentile(&sorted_times, 50.0),
            percentile(&sorted_times, 95.0),
            percentile(&sorted_times, 99.0),
        )
    }

    fn strategy_snapshots(&self) -> HashMap<String, StrategyStatsSnapshot> {
        self.strategy_stats
            .lock()
            .map(|stats| {
                stats
                    .iter()
                    .map(|(name, stats)| (name.clone(), stats.snapshot()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get complete metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg_processing_time_ms, p50, p95, p99) = self.processing_time_statistics();

        MetricsSnapshot {
            tasks: TaskMetrics {
                tasks_received: self.tasks_received.load(Ordering::Relaxed),
                tasks_in_flight: self.tasks_in_flight.load(Ordering::Relaxed),
                requests_submitted: self.requests_submitted.load(Ordering::Relaxed),
                requests_failed: self.requests_failed.load(Ordering::Relaxed),
                requests_skipped: self.requests_skipped.load(Ordering::Relaxed),
                fatal_errors: self.fatal_errors.load(Ordering::Relaxed),
                conflicts: self.conflicts.load(Ordering::Relaxed),
                cleanup_failures: self.cleanup_failures.load(Ordering::Relaxed),
                avg_processing_time_ms,
                processing_time_p50_ms: p50,
                processing_time_p95_ms: p95,
                processing_time_p99_ms: p99,
            },
            strategies: self.strategy_snapshots(),
            lifecycle: LifecycleMetrics {
                current_state: self
                    .worker_state
                    .lock()
                    .map(|s| s.clone())
                    .unwrap_or_else(|_| "unknown".to_string()),
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            },
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// Internal strategy statistics (with timing data)
#[derive(Debug)]
struct StrategyStats {
    name: String,
    submissions: u64,
    rejections: u64,
    submit_times: Vec<u64>, // milliseconds
}

impl StrategyStats {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            submissions: 0,
            rejections: 0,
            submit_times: Vec::new(),
        }
    }

    fn snapshot(&self) -> StrategyStatsSnapshot {
        let avg_submit_time_ms = if self.submit_times.is_empty() {
            0.0
        } else {
            self.submit_times.iter().sum::<u64>() as f64 / self.submit_times.len() as f64
        };

        let acceptance_rate = if self.submissions == 0 {
            0.0
        } else {
            (self.submissions - self.rejections) as f64 / self.submissions as f64
        };

        StrategyStatsSnapshot {
            name: self.name.clone(),
            submissions: self.submissions,
            rejections: self.rejections,
            avg_submit_time_ms,
            acceptance_rate,
        }
    }
}

// Public metrics structures
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub tasks: TaskMetrics,
    pub strategies: HashMap<String, StrategyStatsSnapshot>,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct TaskMetrics {
    pub tasks_received: u64,
    pub tasks_in_flight: u64,
    pub requests_submitted: u64,
    pub requests_failed: u64,
    pub requests_skipped: u64,
    pub fatal_errors: u64,
    pub conflicts: u64,
    pub cleanup_failures: u64,
    pub avg_processing_time_ms: f64,
    pub processing_time_p50_ms: f64,
    pub processing_time_p95_ms: f64,
    pub processing_time_p99_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct StrategyStatsSnapshot {
    pub name: String,
    pub submissions: u64,
    pub rejections: u64,
    pub avg_submit_time_ms: f64,
    pub acceptance_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct LifecycleMetrics {
    pub current_state: String,
    pub uptime_seconds: u64,
}

// Helper functions
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower_index = index.floor() as usize;
        let upper_index = index.ceil() as usize;
        let lower_value = sorted_data[lower_index] as f64;
        let upper_value = sorted_data[upper_index] as f64;

        lower_value + (upper_value - lower_value) * index.fract()
    }
}
