//! Load profiles: the target concurrency policy for a run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One stage of a ramping profile: hold `target` concurrent users for
/// `duration`. The concurrency target changes at stage boundaries only;
/// runners already in flight are never killed, only new launches are
/// throttled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStage {
    pub duration: Duration,
    pub target: usize,
}

impl UserStage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// How many virtual users to run, and for how long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoadProfile {
    /// Keep `users` runners active for `duration`: each completed iteration
    /// is immediately replaced by a new one (closed loop).
    ConstantUsers { users: usize, duration: Duration },
    /// Step the concurrency target through the given stages.
    RampingUsers { stages: Vec<UserStage> },
    /// Perform exactly `iterations` scenario executions across at most
    /// `concurrency` runners, or stop when `max_duration` elapses.
    FixedIterations {
        iterations: u64,
        concurrency: usize,
        max_duration: Duration,
    },
}

impl LoadProfile {
    /// Reject malformed profiles before any runner launches.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            LoadProfile::ConstantUsers { users, duration } => {
                if *users == 0 {
                    return Err(ConfigError::ZeroUsers);
                }
                if duration.is_zero() {
                    return Err(ConfigError::ZeroDuration);
                }
            }
            LoadProfile::RampingUsers { stages } => {
                if stages.is_empty() {
                    return Err(ConfigError::NoStages);
                }
                if stages.iter().all(|s| s.target == 0) {
                    return Err(ConfigError::ZeroUsers);
                }
            }
            LoadProfile::FixedIterations {
                iterations,
                concurrency,
                max_duration,
            } => {
                if *iterations == 0 {
                    return Err(ConfigError::ZeroIterations);
                }
                if *concurrency == 0 {
                    return Err(ConfigError::ZeroConcurrency);
                }
                if max_duration.is_zero() {
                    return Err(ConfigError::ZeroDuration);
                }
            }
        }
        Ok(())
    }

    /// The highest concurrency this profile can reach.
    pub(crate) fn max_concurrency(&self) -> usize {
        match self {
            LoadProfile::ConstantUsers { users, .. } => *users,
            LoadProfile::RampingUsers { stages } => {
                stages.iter().map(|s| s.target).max().unwrap_or(0)
            }
            LoadProfile::FixedIterations {
                iterations,
                concurrency,
                ..
            } => (*concurrency).min(usize::try_from(*iterations).unwrap_or(usize::MAX)),
        }
    }
}
