//! Scriptable in-memory driver for tests. Selector behaviors, per-action
//! delays, and session accounting are all observable, so tests can assert
//! what the engine did without a real browser.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::driver::{Driver, ElementState, Selector, Session, SessionState};
use crate::error::DriverError;

/// Scripted response for any operation touching a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scripted {
    Ok,
    NotFound,
    /// Never resolves; the runner's step timeout fires first.
    Hang,
    SessionError,
}

#[derive(Default)]
struct FakeInner {
    refuse_sessions: AtomicBool,
    scripts: RwLock<BTreeMap<String, Scripted>>,
    texts: RwLock<BTreeMap<String, String>>,
    /// Delay applied to every navigate and wait_for before resolving.
    action_delay: RwLock<Duration>,
    calls: RwLock<Vec<String>>,
    opened: AtomicU64,
    closed: AtomicU64,
    active: AtomicU64,
    peak_active: AtomicU64,
}

#[derive(Clone, Default)]
pub(crate) struct FakeDriver {
    inner: Arc<FakeInner>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, selector: &str, result: Scripted) {
        self.inner.scripts.write().insert(selector.into(), result);
    }

    pub fn set_text(&self, selector: &str, text: &str) {
        self.inner.texts.write().insert(selector.into(), text.into());
    }

    pub fn set_action_delay(&self, delay: Duration) {
        *self.inner.action_delay.write() = delay;
    }

    pub fn refuse_sessions(&self) {
        self.inner.refuse_sessions.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.read().clone()
    }

    pub fn opened(&self) -> u64 {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u64 {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn peak_active_sessions(&self) -> u64 {
        self.inner.peak_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for FakeDriver {
    type Session = FakeSession;

    async fn new_session(&self, _state: &SessionState) -> Result<FakeSession, DriverError> {
        if self.inner.refuse_sessions.load(Ordering::SeqCst) {
            return Err(DriverError::Session("session refused".into()));
        }
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        let active = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_active.fetch_max(active, Ordering::SeqCst);
        Ok(FakeSession {
            inner: Arc::clone(&self.inner),
        })
    }
}

pub(crate) struct FakeSession {
    inner: Arc<FakeInner>,
}

impl FakeSession {
    fn log(&self, entry: String) {
        self.inner.calls.write().push(entry);
    }

    async fn delay(&self) {
        let d = *self.inner.action_delay.read();
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }

    async fn scripted(&self, selector: &Selector) -> Result<(), DriverError> {
        let script = self
            .inner
            .scripts
            .read()
            .get(selector.as_str())
            .copied()
            .unwrap_or(Scripted::Ok);
        match script {
            Scripted::Ok => Ok(()),
            Scripted::NotFound => Err(DriverError::ElementNotFound(selector.to_string())),
            Scripted::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(DriverError::Timeout)
            }
            Scripted::SessionError => Err(DriverError::Session("scripted failure".into())),
        }
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), DriverError> {
        self.log(format!("navigate:{url}"));
        self.delay().await;
        Ok(())
    }

    async fn wait_for(
        &mut self,
        selector: &Selector,
        state: ElementState,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        self.log(format!("wait:{selector}:{state:?}"));
        self.delay().await;
        self.scripted(selector).await
    }

    async fn click(&mut self, selector: &Selector) -> Result<(), DriverError> {
        self.log(format!("click:{selector}"));
        self.scripted(selector).await
    }

    async fn type_text(&mut self, selector: &Selector, text: &str) -> Result<(), DriverError> {
        self.log(format!("type:{selector}:{text}"));
        self.scripted(selector).await
    }

    async fn text_content(&mut self, selector: &Selector) -> Result<String, DriverError> {
        self.log(format!("text:{selector}"));
        self.scripted(selector).await?;
        Ok(self
            .inner
            .texts
            .read()
            .get(selector.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn close(self) -> Result<(), DriverError> {
        self.inner.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
