//! Outcome records: the samples produced by runners and consumed by the
//! metrics recorder.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// The result of one executed step attempt. Retries produce one outcome per
/// attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_name: String,
    pub success: bool,
    pub elapsed: Duration,
    pub error_kind: Option<ErrorKind>,
}

impl StepOutcome {
    pub fn success(step_name: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            step_name: step_name.into(),
            success: true,
            elapsed,
            error_kind: None,
        }
    }

    pub fn failure(step_name: impl Into<String>, elapsed: Duration, kind: ErrorKind) -> Self {
        Self {
            step_name: step_name.into(),
            success: false,
            elapsed,
            error_kind: Some(kind),
        }
    }
}

/// How an iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalStatus {
    /// Every step ran (skipped failures included); the journey finished.
    Completed,
    /// A business-rule failure ended the iteration early.
    Failed(ErrorKind),
    /// The harness stopped the iteration: cancellation, deadline, or an
    /// unusable session. Distinct from `Failed` so operators can tell
    /// "the system under test failed a check" from "the harness broke".
    Aborted,
}

/// The record of one complete scenario execution by one virtual user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationOutcome {
    pub user_id: u64,
    pub scenario_name: String,
    pub started_at: SystemTime,
    pub total_elapsed: Duration,
    pub step_outcomes: Vec<StepOutcome>,
    pub status: TerminalStatus,
}
