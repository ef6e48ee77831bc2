//! One-shot broadcast readiness signal.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How a wait on a gate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessOutcome {
    /// The gate was open before the wait began.
    AlreadyReady,
    /// The gate opened while waiting.
    Ready,
    /// The wait timed out and the gate was forced open.
    ForcedTimeout,
}

impl ReadinessOutcome {
    pub fn was_forced(&self) -> bool {
        matches!(self, ReadinessOutcome::ForcedTimeout)
    }
}

/// What opened a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyCause {
    /// An explicit `mark_ready` call.
    Signal,
    /// The fallback timer armed by `initialize` or `reset`.
    Fallback,
    /// A waiter gave up and forced the gate.
    ForcedTimeout,
}

type ReadyHook = Box<dyn Fn(DateTime<Utc>) + Send + Sync>;

#[derive(Default)]
struct GateState {
    initialized: bool,
    fallback: Option<JoinHandle<()>>,
    ready_at: Option<DateTime<Utc>>,
}

/// A signal that resolves once and wakes every waiter.
///
/// Waiters subscribe to a `watch` channel, so late arrivals observe the same
/// resolution as early ones.
pub struct ReadinessGate {
    name: &'static str,
    ready_tx: watch::Sender<bool>,
    state: Mutex<GateState>,
    on_ready: Option<ReadyHook>,
}

impl ReadinessGate {
    pub fn new(name: &'static str) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            name,
            ready_tx,
            state: Mutex::new(GateState::default()),
            on_ready: None,
        }
    }

    /// Run `hook` with the resolution time every time the gate opens.
    pub fn with_on_ready(mut self, hook: impl Fn(DateTime<Utc>) + Send + Sync + 'static) -> Self {
        self.on_ready = Some(Box::new(hook));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().ready_at
    }

    /// Arm the gate. Only the first call has an effect.
    ///
    /// With `fallback`, the gate opens by itself after that long unless
    /// something else opens it first.
    pub fn initialize(self: &Arc<Self>, fallback: Option<Duration>) {
        let mut state = self.state.lock();
        if state.initialized {
            return;
        }
        state.initialized = true;

        if self.is_ready() {
            return;
        }
        if let Some(after) = fallback {
            state.fallback = Some(self.spawn_fallback(after));
            debug!(gate = self.name, fallback_ms = after.as_millis() as u64, "Readiness gate armed");
        }
    }

    /// Open the gate. Returns whether this call changed anything.
    pub fn mark_ready(&self) -> bool {
        self.resolve(ReadyCause::Signal)
    }

    /// Wait at most `timeout` for the gate; force it open if the time runs out.
    pub async fn wait_until_ready(&self, timeout: Duration) -> ReadinessOutcome {
        let mut ready_rx = self.ready_tx.subscribe();
        if *ready_rx.borrow_and_update() {
            return ReadinessOutcome::AlreadyReady;
        }

        let outcome = match tokio::time::timeout(timeout, ready_rx.wait_for(|ready| *ready)).await {
            Ok(_) => ReadinessOutcome::Ready,
            Err(_) => {
                warn!(
                    gate = self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Readiness wait timed out, forcing gate open"
                );
                self.resolve(ReadyCause::ForcedTimeout);
                ReadinessOutcome::ForcedTimeout
            }
        };
        outcome
    }

    /// Wait without a bound. Only for racing against another bounded wait.
    pub async fn opened(&self) {
        let mut ready_rx = self.ready_tx.subscribe();
        // The sender lives as long as `self`.
        let _ = ready_rx.wait_for(|ready| *ready).await;
    }

    /// Close an open gate again and arm a fresh fallback.
    ///
    /// Has no effect while the gate is still pending. Returns whether the
    /// gate was reset.
    pub fn reset(self: &Arc<Self>, fallback: Duration) -> bool {
        let mut state = self.state.lock();
        if !self.is_ready() {
            debug!(gate = self.name, "Reset ignored, gate still pending");
            return false;
        }

        state.ready_at = None;
        self.ready_tx.send_replace(false);
        state.fallback = Some(self.spawn_fallback(fallback));

        info!(gate = self.name, fallback_ms = fallback.as_millis() as u64, "Readiness gate reset");
        true
    }

    fn resolve(&self, cause: ReadyCause) -> bool {
        let now = Utc::now();
        {
            let mut state = self.state.lock();
            if self.is_ready() {
                return false;
            }
            state.ready_at = Some(now);
            if let Some(fallback) = state.fallback.take() {
                // The fallback task is the caller in that case; let it finish.
                if cause != ReadyCause::Fallback {
                    fallback.abort();
                }
            }
            self.ready_tx.send_replace(true);
        }

        info!(gate = self.name, cause = ?cause, "Readiness gate opened");
        if let Some(hook) = &self.on_ready {
            hook(now);
        }
        true
    }

    fn spawn_fallback(self: &Arc<Self>, after: Duration) -> JoinHandle<()> {
        let gate: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(gate) = gate.upgrade() {
                if gate.resolve(ReadyCause::Fallback) {
                    warn!(gate = gate.name, "Readiness gate opened by fallback timer");
                }
            }
        })
    }
}

impl Drop for ReadinessGate {
    fn drop(&mut self) {
        if let Some(fallback) = self.state.get_mut().fallback.take() {
            fallback.abort();
        }
    }
}
