//! Scenario definitions: the declarative script a virtual user executes.
//!
//! A [`Scenario`] is an immutable, ordered list of [`Step`]s plus the session
//! state to establish before the first step. Scenarios are defined once and
//! shared read-only by every runner executing them; per-user state lives in
//! the runner's context, never here.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::driver::{Selector, SessionState};
use crate::error::ConfigError;

/// What to do when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnFailure {
    /// Stop the iteration immediately; remaining steps are skipped.
    Abort,
    /// Record the failure and continue with the next step.
    Skip,
    /// Re-attempt the step up to this many additional times, with no backoff
    /// beyond the step's own timeout. Exhausting the retries behaves as
    /// `Abort`.
    Retry(u32),
}

impl Default for OnFailure {
    fn default() -> Self {
        OnFailure::Abort
    }
}

/// The interaction a step performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Navigate to a URL. Paths starting with `/` are resolved against the
    /// scenario's base URL.
    Navigate(String),
    WaitVisible(Selector),
    WaitHidden(Selector),
    Click(Selector),
    Type(Selector, String),
    ReadText(Selector),
    AssertEquals(Selector, String),
    /// Think time between interactions.
    Sleep(Duration),
}

/// A single named, bounded interaction with the system under test.
#[derive(Debug, Clone, PartialEq, TypedBuilder, Serialize, Deserialize)]
pub struct Step {
    #[builder(setter(into))]
    pub name: String,
    pub action: ActionKind,
    /// Upper bound on the whole action, enforced by the runner regardless of
    /// what the driver does internally.
    #[builder(default = Duration::from_secs(30))]
    pub timeout: Duration,
    #[builder(default)]
    pub on_failure: OnFailure,
}

/// An ordered user journey: session state, base URL, and the steps to run.
#[derive(Debug, Clone, PartialEq, TypedBuilder, Serialize, Deserialize)]
pub struct Scenario {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default, setter(into))]
    pub base_url: String,
    #[builder(default)]
    pub session: SessionState,
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Check the definition before any runner launches. A scenario that
    /// fails here never simulates a user.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps.is_empty() {
            return Err(ConfigError::EmptyScenario(self.name.clone()));
        }
        for step in &self.steps {
            if step.timeout.is_zero() {
                return Err(ConfigError::ZeroTimeout(step.name.clone()));
            }
        }
        Ok(())
    }

    /// Resolve a step's target URL against the scenario base.
    pub(crate) fn resolve_url(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{}", self.base_url.trim_end_matches('/'), url)
        } else {
            url.to_owned()
        }
    }
}
