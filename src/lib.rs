//! Sturnus — a scenario engine for UI load testing.
//!
//! Sturnus drives many simulated users concurrently through a scripted
//! sequence of page interactions against a web application, measuring
//! timing, success/failure, and aggregate throughput, then emitting a
//! summary report. It is a driver of an external UI: the browser-automation
//! backend is consumed as an opaque capability, and the page scripts are
//! supplied as declarative data.
//!
//! # Architecture
//!
//! The main building blocks are:
//!
//! - [`Scenario`]: an immutable, ordered list of [`Step`]s representing one
//!   user journey, plus the session state (cookies/headers) to establish
//!   before the first step. Shared read-only by every runner.
//! - [`Driver`] / [`Session`](driver::Session): the automation capability the
//!   engine consumes — navigate, wait for an element, click, type, read
//!   text, close. Any backend implementing these traits plugs in.
//! - The runner ([`run_iteration`](runner::run_iteration)): executes one
//!   scenario for one virtual user — a step state machine with per-step
//!   timeouts, an `OnFailure` policy (abort/skip/retry), and cooperative
//!   cancellation. Sessions are closed exactly once on every exit path.
//! - [`Scheduler`]: launches and supervises runners according to a
//!   [`LoadProfile`] — constant users with closed-loop replacement, ramping
//!   concurrency stages, or a fixed iteration count under a concurrency cap.
//! - [`MetricsRecorder`]: the one shared accumulator. Runners hand off every
//!   step outcome synchronously; it keeps counters and streaming latency
//!   histograms, never raw samples, so memory stays bounded.
//! - [`RunReport`] / [`Reporter`]: a deterministic rendering of the final
//!   [`MetricsSnapshot`] — throughput, p50/p95/p99 latencies per step and
//!   overall, and failure counts by kind — delivered to stdout, a file, or
//!   a custom sink.
//!
//! # Failure semantics
//!
//! A failed check (timeout, assertion, missing element) is local to one step
//! and handled by that step's [`OnFailure`] policy; it is recorded in
//! metrics and never stops the scheduler. A broken session aborts its
//! iteration, separately from business failures, so the report can
//! distinguish "the system under test failed a check" from "the harness
//! broke". Only a malformed configuration or a driver that cannot open a
//! session at all is fatal to the run.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use sturnus::{
//!     ActionKind, LoadProfile, Reporter, RunReport, Scenario, Scheduler, Step, StdoutReporter,
//! };
//!
//! # async fn demo<D: sturnus::Driver>(driver: D) -> Result<(), Box<dyn std::error::Error>> {
//! let scenario = Scenario::builder()
//!     .name("login journey")
//!     .base_url("https://shop.example")
//!     .steps(vec![
//!         Step::builder()
//!             .name("open login page")
//!             .action(ActionKind::Navigate("/login".into()))
//!             .build(),
//!         Step::builder()
//!             .name("fill username")
//!             .action(ActionKind::Type("#username".into(), "testuser".into()))
//!             .build(),
//!         Step::builder()
//!             .name("submit")
//!             .action(ActionKind::Click("#login-button".into()))
//!             .timeout(Duration::from_secs(10))
//!             .build(),
//!         Step::builder()
//!             .name("greeting shown")
//!             .action(ActionKind::AssertEquals("#greeting".into(), "Welcome!".into()))
//!             .build(),
//!     ])
//!     .build();
//!
//! let scheduler = Scheduler::builder()
//!     .driver(Arc::new(driver))
//!     .profile(LoadProfile::ConstantUsers {
//!         users: 10,
//!         duration: Duration::from_secs(30),
//!     })
//!     .build();
//!
//! let snapshot = scheduler.run(scenario).await?;
//! StdoutReporter.report(&RunReport::from(snapshot)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Where to start
//!
//! - Read the docs for [`Scenario`], [`Scheduler`], and [`Driver`]. The
//!   driver traits are the only integration surface; everything else is
//!   configuration.
//! - The `fake` module used by this crate's tests shows the smallest
//!   possible driver implementation.

pub mod driver;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod outcome;
pub mod report;
pub mod runner;
pub mod scenario;

#[cfg(test)]
pub(crate) mod fake;

pub use driver::{Driver, ElementState, Selector, Session, SessionState};
pub use error::{ConfigError, DriverError, Error, ErrorKind, StepError};
pub use executor::{LoadProfile, Scheduler, UserStage};
pub use metrics::{LatencySummary, MetricsRecorder, MetricsSnapshot, StepSummary};
pub use outcome::{IterationOutcome, StepOutcome, TerminalStatus};
pub use report::{JsonFileReporter, Reporter, RunReport, StdoutReporter};
pub use runner::{run_iteration, VirtualUserContext};
pub use scenario::{ActionKind, OnFailure, Scenario, Step};
