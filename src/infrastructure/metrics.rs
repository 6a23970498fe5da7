//! Tiering metrics
//!
//! Named counters and timing series shared by the dispatcher and the compile
//! workers of one runtime. Timings keep running totals and a fixed window of
//! recent samples, so memory stays flat however long the runtime runs.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Most recent samples kept per timing for percentiles
pub const TIMING_WINDOW: usize = 1024;

/// Metric names recorded by the tiering layer
pub mod names {
    pub const DISPATCH_TOTAL: &str = "dispatch.total";
    pub const DISPATCH_EXECUTED: &str = "dispatch.executed";
    pub const DISPATCH_INTERPRETED: &str = "dispatch.interpreted";
    pub const DISPATCH_DEGRADED: &str = "dispatch.degraded";

    pub const POLICY_ASYNC: &str = "policy.async";
    pub const POLICY_SYNC: &str = "policy.sync";

    pub const JOB_SUBMITTED: &str = "job.submitted";
    pub const JOB_COALESCED: &str = "job.coalesced";
    pub const JOB_SKIPPED: &str = "job.skipped";

    pub const COMPILE_OK: &str = "compile.ok";
    pub const COMPILE_FAILED: &str = "compile.failed";
    pub const COMPILE_TIME: &str = "compile.time";

    pub const INSTALL_ACCEPTED: &str = "install.accepted";
    pub const INSTALL_REJECTED: &str = "install.rejected";

    pub const WAIT_INTERRUPTED: &str = "wait.interrupted";
    pub const WAIT_TIME: &str = "wait.time";

    pub const COUNTERS: [&str; 14] = [
        DISPATCH_TOTAL,
        DISPATCH_EXECUTED,
        DISPATCH_INTERPRETED,
        DISPATCH_DEGRADED,
        POLICY_ASYNC,
        POLICY_SYNC,
        JOB_SUBMITTED,
        JOB_COALESCED,
        JOB_SKIPPED,
        COMPILE_OK,
        COMPILE_FAILED,
        INSTALL_ACCEPTED,
        INSTALL_REJECTED,
        WAIT_INTERRUPTED,
    ];
}

/// Running totals for one timing plus a window of recent samples
#[derive(Debug)]
struct TimingSeries {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
    recent: VecDeque<Duration>,
}

impl TimingSeries {
    fn new() -> Self {
        Self {
            count: 0,
            total: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
            recent: VecDeque::with_capacity(TIMING_WINDOW),
        }
    }

    fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total += duration;
        self.min = self.min.min(duration);
        self.max = self.max.max(duration);
        if self.recent.len() == TIMING_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(duration);
    }

    fn stats(&self) -> TimingStats {
        if self.count == 0 {
            return TimingStats::empty();
        }

        let mut sorted: Vec<Duration> = self.recent.iter().copied().collect();
        sorted.sort();
        let sampled = sorted.len();
        let percentile = |p: f64| sorted[((sampled as f64 * p) as usize).min(sampled - 1)];

        TimingStats {
            count: self.count,
            sampled,
            total: self.total,
            mean: self.total.div_f64(self.count as f64),
            min: self.min,
            max: self.max,
            p50: percentile(0.50),
            p95: percentile(0.95),
            p99: percentile(0.99),
        }
    }
}

/// Counters are plain atomics; the known names are registered up front so
/// the dispatch path never takes a write lock.
pub struct TieringMetrics {
    counters: DashMap<&'static str, AtomicU64>,
    timings: DashMap<&'static str, Mutex<TimingSeries>>,
    start_time: Instant,
}

impl TieringMetrics {
    pub fn new() -> Self {
        let counters = DashMap::with_capacity(names::COUNTERS.len());
        for name in names::COUNTERS {
            counters.insert(name, AtomicU64::new(0));
        }
        Self {
            counters,
            timings: DashMap::new(),
            start_time: Instant::now(),
        }
    }

    pub fn record_timing(&self, name: &'static str, duration: Duration) {
        if let Some(series) = self.timings.get(name) {
            series.lock().record(duration);
            return;
        }
        self.timings
            .entry(name)
            .or_insert_with(|| Mutex::new(TimingSeries::new()))
            .lock()
            .record(duration);
    }

    pub fn increment(&self, name: &'static str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &'static str, value: u64) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(value, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(name)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    pub fn get_counter(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn get_timing_stats(&self, name: &str) -> Option<TimingStats> {
        self.timings.get(name).map(|series| series.lock().stats())
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn reset(&self) {
        self.timings.clear();
        for counter in self.counters.iter() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Counters that were never touched are left out.
    pub fn summary(&self) -> MetricsSummary {
        let timings = self
            .timings
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().lock().stats()))
            .collect();
        let counters = self
            .counters
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().load(Ordering::Relaxed)))
            .filter(|(_, value)| *value > 0)
            .collect();

        MetricsSummary {
            uptime: self.uptime(),
            timings,
            counters,
        }
    }
}

impl Default for TieringMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TieringMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieringMetrics")
            .field("counters", &self.counters.len())
            .field("timings", &self.timings.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimingStats {
    /// Samples ever recorded.
    pub count: u64,
    /// Recent samples the percentiles were taken from.
    pub sampled: usize,
    pub total: Duration,
    pub mean: Duration,
    pub min: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

impl TimingStats {
    fn empty() -> Self {
        Self {
            count: 0,
            sampled: 0,
            total: Duration::ZERO,
            mean: Duration::ZERO,
            min: Duration::ZERO,
            max: Duration::ZERO,
            p50: Duration::ZERO,
            p95: Duration::ZERO,
            p99: Duration::ZERO,
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "count": self.count,
            "sampled": self.sampled,
            "total_us": self.total.as_micros() as u64,
            "mean_us": self.mean.as_micros() as u64,
            "min_us": self.min.as_micros() as u64,
            "max_us": self.max.as_micros() as u64,
            "p50_us": self.p50.as_micros() as u64,
            "p95_us": self.p95.as_micros() as u64,
            "p99_us": self.p99.as_micros() as u64,
        })
    }
}

/// Point-in-time copy of all metrics, sorted by name
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub uptime: Duration,
    pub timings: BTreeMap<String, TimingStats>,
    pub counters: BTreeMap<String, u64>,
}

impl MetricsSummary {
    pub fn report(&self) -> String {
        let mut lines = vec![
            format!("Uptime: {:.2?}", self.uptime),
            String::new(),
            "=== Counters ===".to_string(),
        ];

        for (name, value) in &self.counters {
            lines.push(format!("{:<24} {}", name, value));
        }

        lines.push(String::new());
        lines.push("=== Timings ===".to_string());

        for (name, stats) in &self.timings {
            lines.push(format!(
                "{:<24} n={} mean={:.2?} p50={:.2?} p95={:.2?} p99={:.2?} max={:.2?}",
                name, stats.count, stats.mean, stats.p50, stats.p95, stats.p99, stats.max
            ));
        }

        lines.join("\n")
    }

    pub fn to_json(&self) -> Value {
        let timings: serde_json::Map<String, Value> = self
            .timings
            .iter()
            .map(|(name, stats)| (name.clone(), stats.to_json()))
            .collect();

        json!({
            "uptime_ms": self.uptime.as_millis() as u64,
            "counters": self.counters,
            "timings": timings,
        })
    }
}

/// Records the elapsed time under `name` when dropped
pub struct Timer<'a> {
    metrics: &'a TieringMetrics,
    name: &'static str,
    start: Instant,
}

impl<'a> Timer<'a> {
    pub fn new(metrics: &'a TieringMetrics, name: &'static str) -> Self {
        Self {
            metrics,
            name,
            start: Instant::now(),
        }
    }
}

impl<'a> Drop for Timer<'a> {
    fn drop(&mut self) {
        self.metrics.record_timing(self.name, self.start.elapsed());
    }
}
