//! The summary of a benchmark run and its rendering.

use serde::Serialize;
use yansi::Paint;

use crate::config::{Action, RepositoryVariant};
use crate::stats::{AggregateStats, LatencySummary};

const SIZE_UNITS: &[u8] = b"KMGTPE";

/// Formats a byte count with binary multiples, e.g. `1.0 KB` for 1024 bytes.
///
/// Counts below 1024 are printed verbatim (`1023 B`), everything else with one decimal and the
/// largest unit that keeps the value at or above 1.
pub fn convert_size(size: u64) -> String {
    const UNIT: u64 = 1024;
    if size < UNIT {
        return format!("{size} B");
    }

    let mut exp = 0;
    let mut remaining = size;
    while remaining >= UNIT && exp < SIZE_UNITS.len() {
        remaining /= UNIT;
        exp += 1;
    }

    let value = size as f64 / (UNIT as f64).powi(exp as i32);
    format!("{value:.1} {}B", SIZE_UNITS[exp - 1] as char)
}

/// Formats a value with at most two decimals, dropping trailing zeros.
pub fn format_decimal(value: f64) -> String {
    let formatted = format!("{value:.2}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        return "0".to_owned();
    }
    trimmed.to_owned()
}

fn format_throughput(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{} mb/sec", format_decimal(value)),
        None => "n/a".to_owned(),
    }
}

/// Result of a completed benchmark run.
///
/// A report is produced even if the harvest stopped early; [`Report::harvest_error`] then describes
/// why, and the statistics are based on the results collected up to that point.
#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub action: Action,
    pub variant: RepositoryVariant,
    pub num_binaries: usize,
    pub size: u64,
    pub threads: usize,
    pub stats: AggregateStats,
    /// Number of cluster nodes before the run, if known.
    pub cluster_size_before: Option<u32>,
    /// Number of cluster nodes after the run, if known.
    pub cluster_size_after: Option<u32>,
    /// The reason the harvest stopped early, if it did.
    pub harvest_error: Option<String>,
    /// The reason cleanup failed, if it did.
    pub purge_error: Option<String>,
}

impl Report {
    /// Returns `true` if every object was processed and cleaned up.
    pub fn is_complete(&self) -> bool {
        self.harvest_error.is_none()
            && self.purge_error.is_none()
            && self.stats.completed == self.num_binaries
    }

    /// Prints the report in human readable form to stdout.
    pub fn print(&self) {
        println!();
        println!(
            "{} {} {} action(s) against {} ({} each, {} thread(s))",
            "## Completed".bold(),
            self.stats.completed.bold(),
            self.action.blue().bold(),
            self.variant,
            convert_size(self.size),
            self.threads.bold()
        );

        if let Some(error) = &self.harvest_error {
            println!(
                "{}",
                format!(
                    "HARVEST STOPPED EARLY after {} of {} actions: {error}",
                    self.stats.completed, self.num_binaries
                )
                .bold()
                .red()
            );
        }
        if let Some(error) = &self.purge_error {
            println!("{}", format!("CLEANUP FAILED: {error}").bold().red());
        }

        let stats = &self.stats;
        println!("-------------------------------------------------");
        println!("Overall runtime:\t\t\t{} ms", stats.overall_ms);
        println!("Benchmark runtime:\t\t\t{} ms", stats.runtime_ms);
        println!(
            "Benchmark runtime w/o thread overhead\t{} ms",
            stats.runtime_without_overhead_ms
        );
        println!("Thread overhead:\t\t\t{} ms", stats.thread_overhead_ms);
        println!(
            "Avg. throughput:\t\t\t{}",
            format_throughput(stats.throughput.aggregate_mbps).bold()
        );
        if self.threads > 1 {
            println!(
                "Avg. throughput/thread:\t\t\t{}",
                format_throughput(stats.throughput.per_thread_mbps)
            );
        }
        println!("-------------------------------------------------");

        if let Some(latency) = &stats.latency {
            print_latency(latency);
        }
    }
}

fn print_latency(latency: &LatencySummary) {
    println!(
        "  latency avg: {} ms; min: {}; p50: {}; p90: {}; p99: {}; max: {}",
        format_decimal(latency.avg_ms).bold(),
        format_decimal(latency.min_ms),
        format_decimal(latency.p50_ms),
        format_decimal(latency.p90_ms),
        format_decimal(latency.p99_ms),
        format_decimal(latency.max_ms),
    );
}
