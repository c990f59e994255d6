//! The automation-driver capability consumed by the engine.
//!
//! The engine never talks to a browser directly. It drives an opaque
//! [`Driver`] that can open isolated [`Session`]s, and each session exposes
//! the handful of page operations the step machine needs: navigate, wait for
//! an element state, click, type, read text, close. Any backend that can
//! implement these two traits (a WebDriver client, a CDP client, an in-memory
//! fake) plugs in without the engine changing.
//!
//! Every session method is async and accepts or implies a bound: these are
//! the engine's suspension points, and no call may block indefinitely.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// A CSS selector targeting an element on the page under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector(String);

impl Selector {
    pub fn new(css: impl Into<String>) -> Self {
        Self(css.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Selector {
    fn from(css: &str) -> Self {
        Self(css.to_owned())
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Element state a step can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementState {
    Visible,
    Hidden,
}

/// Session state established before a scenario's first step: cookies and
/// extra headers the driver applies when the session is created. Supplied
/// as part of the scenario definition; the engine treats it as opaque.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub cookies: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
}

/// Factory for isolated browsing sessions. One driver is shared by all
/// runners; each runner gets its own session.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    type Session: Session;

    async fn new_session(&self, state: &SessionState) -> Result<Self::Session, DriverError>;
}

/// One isolated browsing session, exclusively owned by a single runner.
///
/// `close` consumes the session, which is how the engine guarantees a
/// session is torn down exactly once on every exit path.
#[async_trait]
pub trait Session: Send + 'static {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), DriverError>;

    async fn wait_for(
        &mut self,
        selector: &Selector,
        state: ElementState,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    async fn click(&mut self, selector: &Selector) -> Result<(), DriverError>;

    async fn type_text(&mut self, selector: &Selector, text: &str) -> Result<(), DriverError>;

    async fn text_content(&mut self, selector: &Selector) -> Result<String, DriverError>;

    async fn close(self) -> Result<(), DriverError>;
}
