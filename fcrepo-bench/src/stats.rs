//! Aggregation of worker results into run statistics.
//!
//! All aggregates are sums over the collected results and therefore independent of the order in
//! which workers finished.

use std::time::Duration;

use serde::Serialize;
use sketches_ddsketch::DDSketch;

use crate::worker::WorkResult;

const MIB: f64 = 1024.0 * 1024.0;

/// Average throughput in MiB/s of a single worker.
///
/// Computed as `size * count * 1000 / (1024 * 1024 * total_duration_ms)`. Returns `None` if the
/// summed duration is zero, in which case no meaningful rate can be derived.
pub fn base_throughput(size: u64, count: usize, total_duration_ms: u64) -> Option<f64> {
    if total_duration_ms == 0 {
        return None;
    }
    Some(size as f64 * count as f64 * 1000.0 / (MIB * total_duration_ms as f64))
}

/// Throughput figures of a run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Throughput {
    /// Throughput of all workers together, in MiB/s.
    pub aggregate_mbps: Option<f64>,
    /// Throughput of a single worker, in MiB/s. Only reported for more than one worker.
    pub per_thread_mbps: Option<f64>,
}

impl Throughput {
    /// Scales the single-worker throughput to `threads` workers.
    pub fn new(base: Option<f64>, threads: usize) -> Self {
        if threads <= 1 {
            Self {
                aggregate_mbps: base,
                per_thread_mbps: None,
            }
        } else {
            Self {
                aggregate_mbps: base.map(|base| base * threads as f64),
                per_thread_mbps: base,
            }
        }
    }
}

/// Distribution of the per-object action durations.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LatencySummary {
    pub avg_ms: f64,
    pub min_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl LatencySummary {
    /// Summarizes the durations of `results`, or returns `None` if there are none.
    pub fn from_results(results: &[WorkResult]) -> Option<Self> {
        let mut sketch = DDSketch::default();
        for result in results {
            sketch.add(result.duration_ms as f64);
        }

        let count = sketch.count();
        if count == 0 {
            return None;
        }

        let quantile = |q| sketch.quantile(q).ok().flatten();
        Some(Self {
            avg_ms: sketch.sum()? / count as f64,
            min_ms: sketch.min()?,
            p50_ms: quantile(0.5)?,
            p90_ms: quantile(0.9)?,
            p99_ms: quantile(0.99)?,
            max_ms: sketch.max()?,
        })
    }
}

/// Aggregate statistics of a benchmark run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AggregateStats {
    /// Number of results the statistics are based on.
    pub completed: usize,
    /// Sum of all action durations.
    pub total_duration_ms: u64,
    /// Sum of all byte sizes.
    pub total_bytes: u64,
    /// Wall-clock span of the entire run, including preparation and cleanup.
    pub overall_ms: u64,
    /// Wall-clock span of the harvest phase.
    pub runtime_ms: u64,
    /// Summed durations divided by the number of threads.
    pub runtime_without_overhead_ms: u64,
    /// Harvest span minus the per-thread normalized duration. Negative if the workers overlapped
    /// better than the normalization assumes.
    pub thread_overhead_ms: i64,
    pub throughput: Throughput,
    pub latency: Option<LatencySummary>,
}

impl AggregateStats {
    /// Computes the statistics for a run of `count` objects of `size` bytes on `threads` workers.
    ///
    /// `count` is the configured number of objects, even if fewer results were collected.
    pub fn compute(
        results: &[WorkResult],
        size: u64,
        count: usize,
        threads: usize,
        overall: Duration,
        runtime: Duration,
    ) -> Self {
        let total_duration_ms: u64 = results.iter().map(|r| r.duration_ms).sum();
        let total_bytes: u64 = results.iter().map(|r| r.byte_size).sum();

        let threads = threads.max(1);
        let runtime_ms = runtime.as_millis() as u64;
        let runtime_without_overhead_ms = (total_duration_ms as f64 / threads as f64) as u64;

        Self {
            completed: results.len(),
            total_duration_ms,
            total_bytes,
            overall_ms: overall.as_millis() as u64,
            runtime_ms,
            runtime_without_overhead_ms,
            thread_overhead_ms: runtime_ms as i64 - runtime_without_overhead_ms as i64,
            throughput: Throughput::new(base_throughput(size, count, total_duration_ms), threads),
            latency: LatencySummary::from_results(results),
        }
    }
}
