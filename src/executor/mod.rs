//! The scheduler: launches and supervises virtual-user runners according to
//! a load profile.
//!
//! Structure: a shared run context (driver, scenario, recorder, shutdown
//! channel) is cloned into worker slot tasks; a deadline or stage-governor
//! task flips the shutdown channel when the run's clock expires; workers are
//! joined with `join_all` and the recorder is frozen before the final
//! snapshot is taken.
//!
//! Per profile:
//! - `ConstantUsers`: every slot runs a closed iteration loop (a finished
//!   runner is immediately replaced) until the deadline. At the deadline
//!   in-flight runners finish their current step and stop (cooperative
//!   cancellation inside the runner), never a hard abort mid-step.
//! - `RampingUsers`: a governor steps a watch'd concurrency target through
//!   the stages; slots whose index is at or above the current target park
//!   until the target rises again. In-flight runners are never killed.
//! - `FixedIterations`: slots claim work units from a shared counter until
//!   it runs dry or `max_duration` elapses.
//!
//! A runner that fails its scenario never stops the scheduler; failures go
//! to the recorder and the slot launches a replacement. Only a driver that
//! cannot produce a session at all is fatal, checked by a probe before any
//! user is simulated.

pub mod profile;

pub use profile::{LoadProfile, UserStage};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{watch, Semaphore};
use typed_builder::TypedBuilder;

use crate::driver::{Driver, Session};
use crate::error::Error;
use crate::metrics::{MetricsRecorder, MetricsSnapshot};
use crate::runner::{run_iteration, VirtualUserContext};
use crate::scenario::Scenario;

/// Drives a whole run: `run(scenario)` returns the final metrics snapshot.
#[derive(TypedBuilder)]
pub struct Scheduler<D: Driver> {
    pub driver: Arc<D>,
    pub profile: LoadProfile,
    /// Ceiling on concurrently open driver sessions, for remote systems
    /// with a max-session limit. Enforced here, before launch, so the
    /// active-user gauge stays accurate instead of queueing inside the
    /// driver.
    #[builder(default, setter(strip_option))]
    pub max_sessions: Option<usize>,
}

impl<D: Driver> Scheduler<D> {
    pub async fn run(&self, scenario: Scenario) -> Result<MetricsSnapshot, Error> {
        scenario.validate()?;
        self.profile.validate()?;

        // Probe the driver once up front; a driver that cannot open a
        // session aborts the run before any user is simulated.
        let probe = self
            .driver
            .new_session(&scenario.session)
            .await
            .map_err(|e| Error::DriverInit(e.to_string()))?;
        probe
            .close()
            .await
            .map_err(|e| Error::DriverInit(e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);
        let ctx = RunContext {
            driver: Arc::clone(&self.driver),
            scenario: Arc::new(scenario),
            recorder: MetricsRecorder::new(),
            shutdown: shutdown_rx,
            limiter: self.max_sessions.map(|n| Arc::new(Semaphore::new(n))),
            next_user_id: Arc::new(AtomicU64::new(1)),
        };

        tracing::info!(scenario = %ctx.scenario.name, profile = ?self.profile, "starting run");

        let handles = match &self.profile {
            LoadProfile::ConstantUsers { users, duration } => {
                spawn_deadline(Arc::clone(&shutdown_tx), ctx.shutdown.clone(), *duration);
                (0..*users)
                    .map(|_| tokio::spawn(closed_loop(ctx.clone())))
                    .collect::<Vec<_>>()
            }
            LoadProfile::RampingUsers { stages } => {
                let (target_tx, target_rx) = watch::channel(0usize);
                tokio::spawn(stage_governor(
                    target_tx,
                    Arc::clone(&shutdown_tx),
                    ctx.shutdown.clone(),
                    stages.clone(),
                ));
                (0..self.profile.max_concurrency())
                    .map(|slot| tokio::spawn(ramped_loop(ctx.clone(), target_rx.clone(), slot)))
                    .collect()
            }
            LoadProfile::FixedIterations {
                iterations,
                max_duration,
                ..
            } => {
                spawn_deadline(Arc::clone(&shutdown_tx), ctx.shutdown.clone(), *max_duration);
                let remaining = Arc::new(AtomicU64::new(*iterations));
                (0..self.profile.max_concurrency())
                    .map(|_| tokio::spawn(claiming_loop(ctx.clone(), Arc::clone(&remaining))))
                    .collect()
            }
        };

        join_all(handles).await;
        let _ = shutdown_tx.send(true);
        ctx.recorder.finish();

        let snapshot = ctx.recorder.snapshot();
        tracing::info!(
            scenario = %ctx.scenario.name,
            iterations = snapshot.total_iterations,
            completed = snapshot.completed,
            failed = snapshot.failed,
            aborted = snapshot.aborted,
            "run finished"
        );
        Ok(snapshot)
    }
}

/// Shared state handed to every worker slot.
struct RunContext<D: Driver> {
    driver: Arc<D>,
    scenario: Arc<Scenario>,
    recorder: MetricsRecorder,
    shutdown: watch::Receiver<bool>,
    limiter: Option<Arc<Semaphore>>,
    next_user_id: Arc<AtomicU64>,
}

impl<D: Driver> Clone for RunContext<D> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            scenario: Arc::clone(&self.scenario),
            recorder: self.recorder.clone(),
            shutdown: self.shutdown.clone(),
            limiter: self.limiter.clone(),
            next_user_id: Arc::clone(&self.next_user_id),
        }
    }
}

impl<D: Driver> RunContext<D> {
    /// Launch one replacement runner: acquire a session slot, run a single
    /// iteration, release. A failed launch is recorded and retried by the
    /// caller's loop, never escalated.
    async fn run_once(&self, iteration: u64) {
        let _permit = match &self.limiter {
            Some(sem) => match Arc::clone(sem).acquire_owned().await {
                Ok(permit) => Some(permit),
                // The semaphore is never closed while workers run.
                Err(_) => return,
            },
            None => None,
        };

        let user_id = self.next_user_id.fetch_add(1, Ordering::Relaxed);
        let session = match self.driver.new_session(&self.scenario.session).await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(user = user_id, %err, "session launch failed");
                // No iteration ran; this is a harness failure, reported
                // under the session kind so it can never look like a
                // passing run.
                self.recorder.record_launch_failure();
                // Back off briefly so a dead driver doesn't spin the loop.
                tokio::time::sleep(Duration::from_millis(10)).await;
                return;
            }
        };

        self.recorder.user_started();
        let ctx = VirtualUserContext::new(user_id, iteration, session);
        run_iteration(&self.scenario, ctx, &self.recorder, &self.shutdown).await;
        self.recorder.user_finished();
    }
}

fn spawn_deadline(
    shutdown_tx: Arc<watch::Sender<bool>>,
    mut shutdown_rx: watch::Receiver<bool>,
    duration: Duration,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {
                tracing::debug!(?duration, "deadline reached, signalling ramp-down");
                let _ = shutdown_tx.send(true);
            }
            _ = shutdown_rx.wait_for(|stop| *stop) => {}
        }
    });
}

/// Closed iteration loop for one constant-users slot.
async fn closed_loop<D: Driver>(ctx: RunContext<D>) {
    let mut iteration = 0;
    loop {
        if *ctx.shutdown.borrow() {
            break;
        }
        ctx.run_once(iteration).await;
        iteration += 1;
    }
}

/// Steps the concurrency target through the stages, then ends the run.
async fn stage_governor(
    target_tx: watch::Sender<usize>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    mut shutdown_rx: watch::Receiver<bool>,
    stages: Vec<UserStage>,
) {
    for stage in stages {
        tracing::debug!(target = stage.target, duration = ?stage.duration, "entering stage");
        let _ = target_tx.send(stage.target);
        tokio::select! {
            _ = tokio::time::sleep(stage.duration) => {}
            _ = shutdown_rx.wait_for(|stop| *stop) => return,
        }
    }
    let _ = shutdown_tx.send(true);
}

/// Worker slot for ramping profiles: active only while its index is below
/// the current target.
async fn ramped_loop<D: Driver>(
    ctx: RunContext<D>,
    mut target: watch::Receiver<usize>,
    slot: usize,
) {
    let mut iteration = 0;
    let mut shutdown = ctx.shutdown.clone();
    loop {
        if *shutdown.borrow() {
            break;
        }
        if slot >= *target.borrow() {
            // Parked: wake on a target change or shutdown. A dropped
            // governor implies shutdown was already signalled.
            tokio::select! {
                _ = target.changed() => {}
                _ = shutdown.changed() => {}
            }
            continue;
        }
        ctx.run_once(iteration).await;
        iteration += 1;
    }
}

/// Worker slot for fixed-iteration profiles: claims one work unit at a time.
async fn claiming_loop<D: Driver>(ctx: RunContext<D>, remaining: Arc<AtomicU64>) {
    let mut iteration = 0;
    loop {
        if *ctx.shutdown.borrow() {
            break;
        }
        let claimed = remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !claimed {
            break;
        }
        ctx.run_once(iteration).await;
        iteration += 1;
    }
}
