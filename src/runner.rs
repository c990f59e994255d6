//! The virtual-user runner: executes one scenario for one simulated user.
//!
//! The runner is a small state machine over the scenario's step list. Each
//! step is executed against the user's own session, bounded by the step's
//! timeout; a failure consults the step's `OnFailure` policy. Session
//! failures and cooperative cancellation both end the iteration as
//! `Aborted`, distinct from the `Failed` state a business-rule failure
//! produces.
//!
//! Every step attempt is handed to the recorder synchronously, before the
//! next transition begins, so aggregated metrics reflect progress even for
//! iterations that never reach a terminal state within the run window. The
//! session is closed exactly once on every exit path: `run_iteration` owns
//! the context and closing consumes the session by value.

use std::time::{Duration, Instant, SystemTime};

use tokio::sync::watch;
use tokio::time::timeout;

use crate::driver::Session;
use crate::error::{DriverError, ErrorKind, StepError};
use crate::metrics::MetricsRecorder;
use crate::outcome::{IterationOutcome, StepOutcome, TerminalStatus};
use crate::scenario::{ActionKind, OnFailure, Scenario, Step};

/// Per-runner mutable state. Exclusively owned by one runner, never shared.
pub struct VirtualUserContext<S: Session> {
    pub user_id: u64,
    /// Sequence number of this iteration within its worker slot.
    pub iteration: u64,
    session: S,
}

impl<S: Session> VirtualUserContext<S> {
    pub fn new(user_id: u64, iteration: u64, session: S) -> Self {
        Self {
            user_id,
            iteration,
            session,
        }
    }
}

/// Run one complete scenario iteration for one virtual user.
///
/// Cancellation is cooperative: the shutdown signal is observed before each
/// step, never mid-action. A step already in flight when the signal fires
/// runs to completion (bounded by its own timeout) and no further step
/// starts.
pub async fn run_iteration<S: Session>(
    scenario: &Scenario,
    ctx: VirtualUserContext<S>,
    recorder: &MetricsRecorder,
    shutdown: &watch::Receiver<bool>,
) -> IterationOutcome {
    tracing::debug!(
        user = ctx.user_id,
        iteration = ctx.iteration,
        scenario = %scenario.name,
        "starting iteration"
    );
    let started_at = SystemTime::now();
    let started = Instant::now();
    let mut step_outcomes = Vec::with_capacity(scenario.steps.len());
    let mut status = TerminalStatus::Completed;
    let mut session = ctx.session;

    'steps: for step in &scenario.steps {
        if *shutdown.borrow() {
            tracing::debug!(user = ctx.user_id, step = %step.name, "cancelled before step");
            status = TerminalStatus::Aborted;
            break;
        }

        let mut retries_left = match step.on_failure {
            OnFailure::Retry(n) => n,
            _ => 0,
        };

        loop {
            let attempt_start = Instant::now();
            let result = execute_step(scenario, step, &mut session).await;
            let elapsed = attempt_start.elapsed();

            match result {
                Ok(()) => {
                    let outcome = StepOutcome::success(step.name.clone(), elapsed);
                    recorder.record_step(&outcome);
                    step_outcomes.push(outcome);
                    break;
                }
                Err(err) => {
                    let kind = err.kind();
                    tracing::debug!(
                        user = ctx.user_id,
                        step = %step.name,
                        %err,
                        "step failed"
                    );
                    let outcome = StepOutcome::failure(step.name.clone(), elapsed, kind);
                    recorder.record_step(&outcome);
                    step_outcomes.push(outcome);

                    // The session itself is broken: infrastructure, not a
                    // failed check. No policy applies.
                    if kind == ErrorKind::Session {
                        status = TerminalStatus::Aborted;
                        break 'steps;
                    }

                    match step.on_failure {
                        OnFailure::Abort => {
                            status = TerminalStatus::Failed(kind);
                            break 'steps;
                        }
                        OnFailure::Skip => break,
                        OnFailure::Retry(_) => {
                            if retries_left == 0 {
                                status = TerminalStatus::Failed(kind);
                                break 'steps;
                            }
                            retries_left -= 1;
                        }
                    }
                }
            }
        }
    }

    let total_elapsed = started.elapsed();
    if let Err(err) = session.close().await {
        tracing::warn!(user = ctx.user_id, %err, "session close failed");
    }

    let outcome = IterationOutcome {
        user_id: ctx.user_id,
        scenario_name: scenario.name.clone(),
        started_at,
        total_elapsed,
        step_outcomes,
        status,
    };
    recorder.record_iteration(&outcome);
    outcome
}

/// Execute one step attempt, bounded by the step's timeout.
async fn execute_step<S: Session>(
    scenario: &Scenario,
    step: &Step,
    session: &mut S,
) -> Result<(), StepError> {
    match timeout(step.timeout, perform(scenario, step, session)).await {
        Ok(result) => result,
        Err(_) => Err(StepError::Timeout {
            step: step.name.clone(),
            limit: step.timeout,
        }),
    }
}

async fn perform<S: Session>(
    scenario: &Scenario,
    step: &Step,
    session: &mut S,
) -> Result<(), StepError> {
    use crate::driver::ElementState::{Hidden, Visible};

    match &step.action {
        ActionKind::Navigate(url) => {
            let url = scenario.resolve_url(url);
            session
                .navigate(&url, step.timeout)
                .await
                .map_err(|e| map_driver(step, e))
        }
        ActionKind::WaitVisible(sel) => session
            .wait_for(sel, Visible, step.timeout)
            .await
            .map_err(|e| map_driver(step, e)),
        ActionKind::WaitHidden(sel) => session
            .wait_for(sel, Hidden, step.timeout)
            .await
            .map_err(|e| map_driver(step, e)),
        ActionKind::Click(sel) => session
            .click(sel)
            .await
            .map_err(|e| map_driver(step, e)),
        ActionKind::Type(sel, text) => session
            .type_text(sel, text)
            .await
            .map_err(|e| map_driver(step, e)),
        ActionKind::ReadText(sel) => {
            let text = session
                .text_content(sel)
                .await
                .map_err(|e| map_driver(step, e))?;
            tracing::trace!(step = %step.name, %text, "read text");
            Ok(())
        }
        ActionKind::AssertEquals(sel, expected) => {
            let actual = session
                .text_content(sel)
                .await
                .map_err(|e| map_driver(step, e))?;
            if actual == *expected {
                Ok(())
            } else {
                Err(StepError::Assertion {
                    step: step.name.clone(),
                    expected: expected.clone(),
                    actual,
                })
            }
        }
        ActionKind::Sleep(duration) => {
            tokio::time::sleep(*duration).await;
            Ok(())
        }
    }
}

fn map_driver(step: &Step, err: DriverError) -> StepError {
    match err {
        DriverError::ElementNotFound(selector) => StepError::ElementNotFound { selector },
        DriverError::Timeout => StepError::Timeout {
            step: step.name.clone(),
            limit: step.timeout,
        },
        DriverError::Session(msg) => StepError::Session(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Driver;
    use crate::fake::{FakeDriver, Scripted};

    fn step(name: &str, action: ActionKind) -> Step {
        Step::builder()
            .name(name)
            .action(action)
            .timeout(Duration::from_millis(50))
            .build()
    }

    fn scenario(steps: Vec<Step>) -> Scenario {
        Scenario::builder()
            .name("journey")
            .base_url("https://sut.example")
            .steps(steps)
            .build()
    }

    async fn run(
        driver: &FakeDriver,
        scenario: &Scenario,
        recorder: &MetricsRecorder,
    ) -> IterationOutcome {
        let (_tx, rx) = watch::channel(false);
        let session = driver.new_session(&scenario.session).await.unwrap();
        run_iteration(scenario, VirtualUserContext::new(1, 0, session), recorder, &rx).await
    }

    #[tokio::test]
    async fn all_success_produces_one_outcome_per_step() {
        let driver = FakeDriver::new();
        let scenario = scenario(vec![
            step("open", ActionKind::Navigate("/".into())),
            step("wait", ActionKind::WaitVisible("#form".into())),
            step("submit", ActionKind::Click("#go".into())),
        ]);
        let recorder = MetricsRecorder::new();

        let outcome = run(&driver, &scenario, &recorder).await;

        assert_eq!(outcome.status, TerminalStatus::Completed);
        assert_eq!(outcome.step_outcomes.len(), 3);
        let step_sum: Duration = outcome.step_outcomes.iter().map(|o| o.elapsed).sum();
        assert!(outcome.total_elapsed >= step_sum);
        assert_eq!(driver.closed(), 1);
    }

    #[tokio::test]
    async fn abort_on_first_step_skips_the_rest() {
        let driver = FakeDriver::new();
        driver.script("#form", Scripted::NotFound);
        let scenario = scenario(vec![
            step("wait", ActionKind::WaitVisible("#form".into())),
            step("submit", ActionKind::Click("#go".into())),
            step("check", ActionKind::ReadText("#done".into())),
        ]);
        let recorder = MetricsRecorder::new();

        let outcome = run(&driver, &scenario, &recorder).await;

        assert_eq!(
            outcome.status,
            TerminalStatus::Failed(ErrorKind::ElementNotFound)
        );
        assert_eq!(outcome.step_outcomes.len(), 1);
        assert!(!outcome.step_outcomes[0].success);
        let calls = driver.calls();
        assert!(!calls.iter().any(|c| c.starts_with("click")));
        assert_eq!(driver.closed(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_behave_as_abort() {
        let driver = FakeDriver::new();
        driver.script("#spinner", Scripted::Hang);
        let mut retried = step("spin", ActionKind::WaitVisible("#spinner".into()));
        retried.on_failure = OnFailure::Retry(2);
        let scenario = scenario(vec![
            step("open", ActionKind::Navigate("/".into())),
            retried,
            step("check", ActionKind::ReadText("#done".into())),
        ]);
        let recorder = MetricsRecorder::new();

        let outcome = run(&driver, &scenario, &recorder).await;

        assert_eq!(outcome.status, TerminalStatus::Failed(ErrorKind::Timeout));
        // original attempt + 2 retries, all failed
        let spins: Vec<_> = outcome
            .step_outcomes
            .iter()
            .filter(|o| o.step_name == "spin")
            .collect();
        assert_eq!(spins.len(), 3);
        assert!(spins.iter().all(|o| !o.success));
        assert!(!driver.calls().iter().any(|c| c.starts_with("text")));
    }

    #[tokio::test]
    async fn skip_records_the_failure_and_continues() {
        let driver = FakeDriver::new();
        driver.script("#banner", Scripted::NotFound);
        let mut skipped = step("banner", ActionKind::Click("#banner".into()));
        skipped.on_failure = OnFailure::Skip;
        let scenario = scenario(vec![
            skipped,
            step("check", ActionKind::ReadText("#done".into())),
        ]);
        let recorder = MetricsRecorder::new();

        let outcome = run(&driver, &scenario, &recorder).await;

        assert_eq!(outcome.status, TerminalStatus::Completed);
        assert_eq!(outcome.step_outcomes.len(), 2);
        assert!(!outcome.step_outcomes[0].success);
        assert!(outcome.step_outcomes[1].success);
    }

    #[tokio::test]
    async fn assertion_mismatch_is_an_assertion_failure() {
        let driver = FakeDriver::new();
        driver.set_text("#title", "Welcome");
        let scenario = scenario(vec![step(
            "title",
            ActionKind::AssertEquals("#title".into(), "Goodbye".into()),
        )]);
        let recorder = MetricsRecorder::new();

        let outcome = run(&driver, &scenario, &recorder).await;

        assert_eq!(outcome.status, TerminalStatus::Failed(ErrorKind::Assertion));
    }

    #[tokio::test]
    async fn session_error_aborts_regardless_of_policy() {
        let driver = FakeDriver::new();
        driver.script("#go", Scripted::SessionError);
        let mut tolerant = step("submit", ActionKind::Click("#go".into()));
        tolerant.on_failure = OnFailure::Retry(5);
        let scenario = scenario(vec![
            tolerant,
            step("check", ActionKind::ReadText("#done".into())),
        ]);
        let recorder = MetricsRecorder::new();

        let outcome = run(&driver, &scenario, &recorder).await;

        assert_eq!(outcome.status, TerminalStatus::Aborted);
        assert_eq!(outcome.step_outcomes.len(), 1);
        assert_eq!(driver.closed(), 1);
    }

    #[tokio::test]
    async fn cancellation_is_observed_before_the_next_step() {
        let driver = FakeDriver::new();
        driver.set_action_delay(Duration::from_millis(20));
        let scenario = scenario(vec![
            step("open", ActionKind::Navigate("/".into())),
            step("wait", ActionKind::WaitVisible("#form".into())),
            step("submit", ActionKind::Click("#go".into())),
        ]);
        let recorder = MetricsRecorder::new();

        let (tx, rx) = watch::channel(false);
        let session = driver.new_session(&scenario.session).await.unwrap();
        let ctx = VirtualUserContext::new(7, 0, session);

        let cancel = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            tx.send(true).unwrap();
        };
        let (outcome, ()) = tokio::join!(
            run_iteration(&scenario, ctx, &recorder, &rx),
            cancel
        );

        assert_eq!(outcome.status, TerminalStatus::Aborted);
        // the in-flight navigate finished; nothing started afterwards
        assert!(outcome.step_outcomes.len() <= 1);
        assert!(!driver.calls().iter().any(|c| c.starts_with("click")));
        assert_eq!(driver.closed(), 1);
    }

    #[tokio::test]
    async fn step_outcomes_are_handed_off_before_the_iteration_ends() {
        let driver = FakeDriver::new();
        let scenario = scenario(vec![
            step("open", ActionKind::Navigate("/".into())),
            step("wait", ActionKind::WaitVisible("#form".into())),
        ]);
        let recorder = MetricsRecorder::new();

        run(&driver, &scenario, &recorder).await;

        let snap = recorder.snapshot();
        assert_eq!(snap.per_step["open"].executions, 1);
        assert_eq!(snap.per_step["wait"].executions, 1);
        assert_eq!(snap.total_iterations, 1);
    }
}
