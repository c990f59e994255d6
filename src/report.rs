//! Report generation: turning a final [`MetricsSnapshot`] into output.
//!
//! [`RunReport`] is a pure function of the snapshot — identical snapshots
//! always render identical text, and the serde form is the machine-readable
//! summary. A [`Reporter`] consumes the report and sends it somewhere
//! (stdout, a file, or wherever a custom implementation wants).

use std::fmt::Write as _;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::metrics::{LatencySummary, MetricsSnapshot};

/// The rendered summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// True when no iteration failed and the harness itself never broke.
    /// Aborted iterations from a graceful stop do not fail a run.
    pub passed: bool,
    pub snapshot: MetricsSnapshot,
}

impl From<MetricsSnapshot> for RunReport {
    fn from(snapshot: MetricsSnapshot) -> Self {
        Self {
            passed: snapshot.passed(),
            snapshot,
        }
    }
}

fn ms(us: u64) -> f64 {
    us as f64 / 1000.0
}

fn latency_line(out: &mut String, label: &str, latency: &LatencySummary) {
    let _ = writeln!(
        out,
        "  {label:<24} n={:<8} p50={:>9.2}ms p95={:>9.2}ms p99={:>9.2}ms max={:>9.2}ms",
        latency.count,
        ms(latency.p50_us),
        ms(latency.p95_us),
        ms(latency.p99_us),
        ms(latency.max_us),
    );
}

impl RunReport {
    /// Render the human-readable summary. Deterministic: the output is a
    /// pure function of the snapshot, with no timestamps.
    pub fn render(&self) -> String {
        let snap = &self.snapshot;
        let mut out = String::new();

        let verdict = if self.passed { "PASSED" } else { "FAILED" };
        let _ = writeln!(out, "run {verdict}");
        let _ = writeln!(
            out,
            "iterations: {} total, {} completed, {} failed, {} aborted",
            snap.total_iterations, snap.completed, snap.failed, snap.aborted
        );
        let _ = writeln!(
            out,
            "throughput: {:.2} iterations/s over {:.2}s (peak {} concurrent users)",
            snap.throughput,
            snap.observed.as_secs_f64(),
            snap.peak_concurrency
        );

        if snap.session_launch_failures > 0 {
            let _ = writeln!(
                out,
                "session launch failures: {} (driver could not open a session)",
                snap.session_launch_failures
            );
        }
        if !snap.step_failures_by_kind.is_empty() {
            let _ = writeln!(out, "step failures by kind:");
            for (kind, count) in &snap.step_failures_by_kind {
                let _ = writeln!(out, "  {kind:<24} {count}");
            }
        }

        let _ = writeln!(out, "latency:");
        latency_line(&mut out, "overall (iteration)", &snap.overall_latency);
        for (name, step) in &snap.per_step {
            let mut label = name.clone();
            if step.failures > 0 {
                let _ = write!(label, " ({} failed)", step.failures);
            }
            latency_line(&mut out, &label, &step.latency);
        }

        out
    }

    /// The machine-readable summary.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Consumes a finished report and delivers it to a destination.
#[async_trait]
pub trait Reporter {
    async fn report(&self, report: &RunReport) -> Result<(), Box<dyn std::error::Error>>;
}

/// Prints the rendered report to stdout.
pub struct StdoutReporter;

#[async_trait]
impl Reporter for StdoutReporter {
    async fn report(&self, report: &RunReport) -> Result<(), Box<dyn std::error::Error>> {
        println!("{}", report.render());
        Ok(())
    }
}

/// Writes the machine-readable JSON summary to a file.
pub struct JsonFileReporter {
    pub path: PathBuf,
}

#[async_trait]
impl Reporter for JsonFileReporter {
    async fn report(&self, report: &RunReport) -> Result<(), Box<dyn std::error::Error>> {
        let json = report.to_json()?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
