//! Error taxonomy for the engine.
//!
//! Step-level failures ([`StepError`]) are recoverable and routed through the
//! step's `OnFailure` policy; they never escape a runner. [`ConfigError`] and
//! driver-initialization failures are fatal and abort the run before (or
//! instead of) simulating any user.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a step failure, used for metrics bucketing.
///
/// `Session` is the one kind that means "the harness broke" rather than
/// "the system under test failed a check"; runners escalate it to an
/// aborted iteration instead of consulting the failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The action exceeded its timeout bound.
    Timeout,
    /// Observed page state did not match the expectation.
    Assertion,
    /// The target element could not be located.
    ElementNotFound,
    /// The driver or its transport failed; the session is unusable.
    Session,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Assertion => "assertion",
            ErrorKind::ElementNotFound => "element-not-found",
            ErrorKind::Session => "session",
        };
        f.write_str(s)
    }
}

/// A failure produced while executing a single step.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("step '{step}' timed out after {limit:?}")]
    Timeout { step: String, limit: Duration },

    #[error("step '{step}' assertion failed: expected {expected:?}, got {actual:?}")]
    Assertion {
        step: String,
        expected: String,
        actual: String,
    },

    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("session error: {0}")]
    Session(String),
}

impl StepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::Timeout { .. } => ErrorKind::Timeout,
            StepError::Assertion { .. } => ErrorKind::Assertion,
            StepError::ElementNotFound { .. } => ErrorKind::ElementNotFound,
            StepError::Session(_) => ErrorKind::Session,
        }
    }
}

/// Errors returned by driver capabilities. The engine maps these onto
/// [`StepError`]s with the failing step's identity attached.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("driver timed out")]
    Timeout,
    #[error("session failure: {0}")]
    Session(String),
}

/// A malformed scenario or load profile, caught before any runner launches.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("scenario '{0}' has no steps")]
    EmptyScenario(String),
    #[error("step '{0}' has a zero timeout")]
    ZeroTimeout(String),
    #[error("load profile requires at least one user")]
    ZeroUsers,
    #[error("load profile has a zero duration")]
    ZeroDuration,
    #[error("ramping profile has no stages")]
    NoStages,
    #[error("fixed-iteration profile requires at least one iteration")]
    ZeroIterations,
    #[error("fixed-iteration profile requires a concurrency of at least one")]
    ZeroConcurrency,
}

/// Fatal, run-level errors. Step failures never surface here; they are
/// recorded in metrics instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("automation driver could not be initialized: {0}")]
    DriverInit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_error_maps_to_kind() {
        let err = StepError::Timeout {
            step: "login".into(),
            limit: Duration::from_secs(5),
        };
        assert_eq!(err.kind(), ErrorKind::Timeout);

        let err = StepError::Session("connection reset".into());
        assert_eq!(err.kind(), ErrorKind::Session);
    }

    #[test]
    fn kinds_order_deterministically() {
        let mut kinds = vec![
            ErrorKind::Session,
            ErrorKind::Timeout,
            ErrorKind::Assertion,
        ];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                ErrorKind::Timeout,
                ErrorKind::Assertion,
                ErrorKind::Session
            ]
        );
    }
}
