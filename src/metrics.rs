//! Shared metrics accumulation.
//!
//! One [`MetricsRecorder`] is created per run and written by every runner.
//! It keeps running counters and streaming latency histograms, never the
//! raw sample list, so memory stays bounded across tens of thousands of
//! iterations. Counts and histogram increments are commutative, so the
//! interleaving of runner hand-offs cannot affect the final snapshot.
//!
//! [`MetricsRecorder::snapshot`] is a point-in-time copy-on-read: percentile
//! extraction happens inside a short read-lock critical section and the
//! result is an owned [`MetricsSnapshot`]; formatting never holds the lock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::outcome::{IterationOutcome, StepOutcome, TerminalStatus};

/// Latency histograms use 3 significant digits, recorded in microseconds.
const SIGFIG: u8 = 3;

fn new_histogram() -> Histogram<u64> {
    Histogram::new(SIGFIG).expect("histogram sigfig out of range")
}

fn micros(d: Duration) -> u64 {
    // hdrhistogram cannot record zero; clamp sub-microsecond samples up.
    (d.as_micros() as u64).max(1)
}

struct StepStats {
    executions: u64,
    failures: u64,
    latency: Histogram<u64>,
}

impl StepStats {
    fn new() -> Self {
        Self {
            executions: 0,
            failures: 0,
            latency: new_histogram(),
        }
    }
}

struct Inner {
    started: Instant,
    last_record: Instant,
    ended: Option<Instant>,
    in_flight: u64,
    peak_in_flight: u64,
    iterations: u64,
    completed: u64,
    failed: u64,
    aborted: u64,
    launch_failures: u64,
    step_failures_by_kind: BTreeMap<ErrorKind, u64>,
    steps: BTreeMap<String, StepStats>,
    overall: Histogram<u64>,
}

impl Inner {
    fn observed(&self) -> Duration {
        let end = self.ended.unwrap_or(self.last_record);
        end.saturating_duration_since(self.started)
    }
}

/// Concurrency-safe accumulator for step and iteration outcomes.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct MetricsRecorder {
    inner: Arc<RwLock<Inner>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            inner: Arc::new(RwLock::new(Inner {
                started: now,
                last_record: now,
                ended: None,
                in_flight: 0,
                peak_in_flight: 0,
                iterations: 0,
                completed: 0,
                failed: 0,
                aborted: 0,
                launch_failures: 0,
                step_failures_by_kind: BTreeMap::new(),
                steps: BTreeMap::new(),
                overall: new_histogram(),
            })),
        }
    }

    /// Ingest one step attempt. Called synchronously by runners after every
    /// step transition, so the aggregate reflects progress even for
    /// iterations that never reach a terminal state within the run window.
    pub fn record_step(&self, outcome: &StepOutcome) {
        let mut inner = self.inner.write();
        {
            let stats = inner
                .steps
                .entry(outcome.step_name.clone())
                .or_insert_with(StepStats::new);
            stats.executions += 1;
            let _ = stats.latency.record(micros(outcome.elapsed));
            if !outcome.success {
                stats.failures += 1;
            }
        }
        if !outcome.success {
            if let Some(kind) = outcome.error_kind {
                *inner.step_failures_by_kind.entry(kind).or_insert(0) += 1;
            }
        }
        inner.last_record = Instant::now();
    }

    /// Ingest a finished iteration. Its step outcomes were already recorded
    /// one by one; this only counts the terminal status and the end-to-end
    /// latency. Iterations that never executed a step (cancelled before the
    /// first one) carry no meaningful latency and stay out of the overall
    /// histogram.
    pub fn record_iteration(&self, outcome: &IterationOutcome) {
        let mut inner = self.inner.write();
        inner.iterations += 1;
        match outcome.status {
            TerminalStatus::Completed => inner.completed += 1,
            TerminalStatus::Failed(_) => inner.failed += 1,
            TerminalStatus::Aborted => inner.aborted += 1,
        }
        if !outcome.step_outcomes.is_empty() {
            let _ = inner.overall.record(micros(outcome.total_elapsed));
        }
        inner.last_record = Instant::now();
    }

    /// Ingest a failed session launch: the harness could not even start a
    /// runner. Counted as a session failure, never as an iteration.
    pub fn record_launch_failure(&self) {
        let mut inner = self.inner.write();
        inner.launch_failures += 1;
        inner.last_record = Instant::now();
    }

    /// A runner became active.
    pub fn user_started(&self) {
        let mut inner = self.inner.write();
        inner.in_flight += 1;
        inner.peak_in_flight = inner.peak_in_flight.max(inner.in_flight);
    }

    /// A runner finished (any terminal state).
    pub fn user_finished(&self) {
        let mut inner = self.inner.write();
        inner.in_flight = inner.in_flight.saturating_sub(1);
    }

    /// Number of runners currently active.
    pub fn active_users(&self) -> u64 {
        self.inner.read().in_flight
    }

    /// Freeze the observed wall-clock duration. Called once by the scheduler
    /// at end of run; afterwards repeated snapshots are identical.
    pub fn finish(&self) {
        let mut inner = self.inner.write();
        if inner.ended.is_none() {
            inner.ended = Some(Instant::now());
        }
    }

    /// Point-in-time read of the aggregate.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read();
        let observed = inner.observed();
        let completed = inner.completed;
        let throughput = if observed.is_zero() {
            0.0
        } else {
            completed as f64 / observed.as_secs_f64()
        };
        MetricsSnapshot {
            total_iterations: inner.iterations,
            completed,
            failed: inner.failed,
            aborted: inner.aborted,
            session_launch_failures: inner.launch_failures,
            step_failures_by_kind: inner.step_failures_by_kind.clone(),
            per_step: inner
                .steps
                .iter()
                .map(|(name, stats)| {
                    (
                        name.clone(),
                        StepSummary {
                            executions: stats.executions,
                            failures: stats.failures,
                            latency: LatencySummary::from_histogram(&stats.latency),
                        },
                    )
                })
                .collect(),
            overall_latency: LatencySummary::from_histogram(&inner.overall),
            peak_concurrency: inner.peak_in_flight,
            observed,
            throughput,
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentile summary derived from one histogram, in microseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

impl LatencySummary {
    fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.is_empty() {
            return Self {
                count: 0,
                min_us: 0,
                max_us: 0,
                mean_us: 0.0,
                p50_us: 0,
                p95_us: 0,
                p99_us: 0,
            };
        }
        Self {
            count: hist.len(),
            min_us: hist.min(),
            max_us: hist.max(),
            mean_us: hist.mean(),
            p50_us: hist.value_at_quantile(0.50),
            p95_us: hist.value_at_quantile(0.95),
            p99_us: hist.value_at_quantile(0.99),
        }
    }
}

/// Per-step aggregate in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub executions: u64,
    pub failures: u64,
    pub latency: LatencySummary,
}

/// A point-in-time view of the run's aggregated metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_iterations: u64,
    pub completed: u64,
    pub failed: u64,
    pub aborted: u64,
    /// Sessions the driver refused to open mid-run. These never became
    /// iterations, so they appear here instead of in the iteration counts.
    pub session_launch_failures: u64,
    pub step_failures_by_kind: BTreeMap<ErrorKind, u64>,
    pub per_step: BTreeMap<String, StepSummary>,
    pub overall_latency: LatencySummary,
    pub peak_concurrency: u64,
    pub observed: Duration,
    /// Completed iterations per second over the observed duration. Derived
    /// at snapshot time against the frozen run clock, never incrementally.
    pub throughput: f64,
}

impl MetricsSnapshot {
    /// A run passes when nothing failed and nothing was cut short by the
    /// harness breaking. Aborted iterations from a graceful stop do not
    /// fail the run.
    pub fn passed(&self) -> bool {
        self.failed == 0 && self.session_failures() == 0
    }

    pub fn session_failures(&self) -> u64 {
        let in_steps = self
            .step_failures_by_kind
            .get(&ErrorKind::Session)
            .copied()
            .unwrap_or(0);
        in_steps + self.session_launch_failures
    }
}
