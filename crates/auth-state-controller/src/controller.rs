//! Auth state controller.
//!
//! Owns the reactive [`AuthSnapshot`], drives the lifecycle machine, keeps the
//! background token refresh scheduled and releases both readiness gates once
//! the first answer about the session is known.

use crate::auth_fsm::{AuthPhase, LifecycleInput, LifecycleMachine};
use auth_gates::{
    ApiRequestGate, ReadinessGate, ReadinessOutcome, RefreshTicket, TokenRefreshCoordinator,
};
use chrono::Utc;
use client_storage::{ClientStorage, StorageArea, StorageKeys, StorageResult};
use parking_lot::Mutex;
use serde::Serialize;
use session_store::{AuthChange, AuthChangeEvent, Session, SessionStore, User};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use summarizer_config_and_utils::AuthTimings;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Reactive view of the auth state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub user: Option<User>,
    pub session: Option<Session>,
    pub is_loading: bool,
    /// Flips to true once per controller and never back.
    pub is_auth_ready: bool,
    pub phase: AuthPhase,
}

impl Default for AuthSnapshot {
    fn default() -> Self {
        Self {
            user: None,
            session: None,
            is_loading: true,
            is_auth_ready: false,
            phase: AuthPhase::Uninitialized,
        }
    }
}

impl AuthSnapshot {
    pub fn is_authenticated(&self) -> bool {
        !self.is_loading && self.user.is_some() && self.session.is_some()
    }
}

/// Result of a manual [`AuthController::refresh_auth_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshAuthOutcome {
    Authenticated,
    Anonymous,
    /// Refused: too many manual refreshes for this controller.
    Throttled,
}

/// Delay before the background refresh of a session expiring at
/// `expires_at` (epoch seconds).
///
/// A quarter of the remaining lifetime, but never less than `min_delay`, and
/// never negative.
pub fn refresh_delay(expires_at: i64, now: i64, min_delay: Duration) -> Duration {
    let until_expiry = expires_at - now;
    let quarter = until_expiry.div_euclid(4);
    let floor = i64::try_from(min_delay.as_secs()).unwrap_or(i64::MAX);
    Duration::from_secs(quarter.max(floor).max(0) as u64)
}

struct ScheduledRefresh {
    generation: u64,
    delay: Duration,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct ControllerTasks {
    started: bool,
    init: Option<JoinHandle<()>>,
    subscription: Option<JoinHandle<()>>,
    refresh_timer: Option<ScheduledRefresh>,
    timer_generation: u64,
}

/// The only writer of [`AuthSnapshot`].
pub struct AuthController {
    store: SessionStore,
    storage: ClientStorage,
    auth_gate: Arc<ReadinessGate>,
    api_gate: Arc<ApiRequestGate>,
    coordinator: Arc<TokenRefreshCoordinator>,
    timings: AuthTimings,
    snapshot_tx: watch::Sender<AuthSnapshot>,
    fsm: Mutex<LifecycleMachine>,
    tasks: Mutex<ControllerTasks>,
    init_started_at: Mutex<Option<Instant>>,
    refresh_auth_state_calls: AtomicU32,
    /// Set at start when no earlier login is recorded; consumed by the
    /// first authenticated session of the run.
    first_login_pending: AtomicBool,
    first_login: AtomicBool,
}

impl AuthController {
    pub fn new(
        store: SessionStore,
        storage: ClientStorage,
        auth_gate: Arc<ReadinessGate>,
        api_gate: Arc<ApiRequestGate>,
        coordinator: Arc<TokenRefreshCoordinator>,
        timings: AuthTimings,
    ) -> Arc<Self> {
        let (snapshot_tx, _) = watch::channel(AuthSnapshot::default());
        Arc::new(Self {
            store,
            storage,
            auth_gate,
            api_gate,
            coordinator,
            timings,
            snapshot_tx,
            fsm: Mutex::new(LifecycleMachine::new()),
            tasks: Mutex::new(ControllerTasks::default()),
            init_started_at: Mutex::new(None),
            refresh_auth_state_calls: AtomicU32::new(0),
            first_login_pending: AtomicBool::new(false),
            first_login: AtomicBool::new(false),
        })
    }

    // ==========================================
    // Reading state
    // ==========================================

    pub fn snapshot(&self) -> AuthSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot_tx.borrow().is_authenticated()
    }

    pub fn is_auth_ready(&self) -> bool {
        self.snapshot_tx.borrow().is_auth_ready
    }

    pub fn phase(&self) -> AuthPhase {
        self.snapshot_tx.borrow().phase
    }

    pub fn user(&self) -> Option<User> {
        self.snapshot_tx.borrow().user.clone()
    }

    /// Whether this run is the first authenticated one on this machine.
    pub fn is_first_login(&self) -> bool {
        self.first_login.load(Ordering::SeqCst)
    }

    /// Delay of the pending background refresh, if one is scheduled.
    pub fn scheduled_refresh_in(&self) -> Option<Duration> {
        self.tasks.lock().refresh_timer.as_ref().map(|timer| timer.delay)
    }

    pub fn refresh_auth_state_calls(&self) -> u32 {
        self.refresh_auth_state_calls.load(Ordering::SeqCst)
    }

    // ==========================================
    // Lifecycle
    // ==========================================

    /// Start initialization and the provider subscription. Only the first
    /// call has an effect.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if tasks.started {
            debug!("Auth controller already started");
            return;
        }
        tasks.started = true;

        info!("Auth initialization started");
        self.transition(&LifecycleInput::Start);
        *self.init_started_at.lock() = Some(Instant::now());
        self.persist(
            StorageKeys::AUTH_INIT_START,
            self.storage
                .set_timestamp(StorageArea::Session, StorageKeys::AUTH_INIT_START, Utc::now()),
        );

        let logged_in_before = self
            .storage
            .flag(StorageArea::Local, StorageKeys::HAS_LOGGED_IN_BEFORE)
            .unwrap_or(true);
        if logged_in_before {
            // A file-backed session area outlives the run that set the flag.
            self.persist(
                StorageKeys::IS_FIRST_LOGIN,
                self.storage
                    .remove_keys(StorageArea::Session, &[StorageKeys::IS_FIRST_LOGIN])
                    .map(|_| ()),
            );
        } else {
            debug!("No previous login recorded on this machine");
            self.first_login_pending.store(true, Ordering::SeqCst);
        }

        self.auth_gate.initialize(Some(self.timings.init_timeout()));
        self.api_gate.initialize();

        // Subscribe before the lookup so no change slips between the two.
        let changes = self.store.on_change();
        tasks.subscription = Some(tokio::spawn(run_subscription(Arc::downgrade(self), changes)));

        let this = Arc::clone(self);
        tasks.init = Some(tokio::spawn(async move {
            this.initialize().await;
        }));
    }

    async fn initialize(self: &Arc<Self>) {
        debug!("Getting session");
        let session = match tokio::time::timeout(
            self.timings.init_timeout(),
            self.store.get_session(),
        )
        .await
        {
            Ok(session) => session,
            Err(_) => {
                warn!(
                    timeout_ms = self.timings.init_timeout_ms,
                    "Session lookup timed out, continuing without a session"
                );
                None
            }
        };

        match session {
            Some(session) => {
                info!(user_id = %session.user.id, "Session found, user is logged in");
                self.note_first_login();
                self.apply_session(session, LifecycleInput::SessionFound);
            }
            None => {
                info!("No session found, user is not logged in");
                self.clear_session(LifecycleInput::NoSession);
            }
        }

        self.mark_auth_ready();
    }

    /// Release everything waiting on auth. Returns whether this call did it.
    pub fn mark_auth_ready(&self) -> bool {
        let changed = self.snapshot_tx.send_if_modified(|snapshot| {
            if snapshot.is_auth_ready {
                return false;
            }
            snapshot.is_loading = false;
            snapshot.is_auth_ready = true;
            true
        });
        if !changed {
            return false;
        }

        self.auth_gate.mark_ready();
        self.api_gate.mark_ready();

        let duration_ms = self
            .init_started_at
            .lock()
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.persist(
            StorageKeys::AUTH_INIT_COMPLETE,
            self.storage
                .set_timestamp(StorageArea::Session, StorageKeys::AUTH_INIT_COMPLETE, Utc::now()),
        );
        self.persist(
            StorageKeys::AUTH_INIT_DURATION,
            self.storage
                .session()
                .set(StorageKeys::AUTH_INIT_DURATION, &duration_ms.to_string()),
        );

        info!(duration_ms, authenticated = self.is_authenticated(), "Auth fully initialized");
        true
    }

    /// Wait for auth to be ready, at most the configured bound.
    pub async fn wait_for_auth_ready(&self) -> ReadinessOutcome {
        if self.is_auth_ready() {
            return ReadinessOutcome::AlreadyReady;
        }
        self.auth_gate
            .wait_until_ready(self.timings.auth_wait_timeout())
            .await
    }

    /// Stop background work. A refresh already in flight still completes.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock();
        for handle in [tasks.init.take(), tasks.subscription.take()].into_iter().flatten() {
            handle.abort();
        }
        if let Some(timer) = tasks.refresh_timer.take() {
            timer.handle.abort();
        }
        info!("Auth controller shut down");
    }

    // ==========================================
    // Provider events
    // ==========================================

    pub(crate) fn handle_change(self: &Arc<Self>, change: AuthChange) {
        info!(
            event = ?change.event,
            has_session = change.session.is_some(),
            "Auth state change event"
        );

        match change.session {
            Some(session) => {
                let input = if change.event == AuthChangeEvent::SignedIn {
                    self.note_sign_in();
                    LifecycleInput::SignedIn
                } else {
                    LifecycleInput::SessionFound
                };
                self.apply_session(session, input);
            }
            None => self.clear_session(LifecycleInput::SignedOut),
        }

        self.mark_auth_ready();
    }

    fn note_sign_in(&self) {
        self.note_first_login();
        self.persist(
            StorageKeys::HAS_LOGGED_IN_BEFORE,
            self.storage
                .set_flag(StorageArea::Local, StorageKeys::HAS_LOGGED_IN_BEFORE),
        );
    }

    fn note_first_login(&self) {
        if self.first_login_pending.swap(false, Ordering::SeqCst) {
            info!("First login detected on this machine");
            self.first_login.store(true, Ordering::SeqCst);
            self.persist(
                StorageKeys::IS_FIRST_LOGIN,
                self.storage
                    .set_flag(StorageArea::Session, StorageKeys::IS_FIRST_LOGIN),
            );
        }
    }

    // ==========================================
    // Manual refresh
    // ==========================================

    /// Re-read the session from the store.
    pub async fn refresh_auth_state(self: &Arc<Self>) -> RefreshAuthOutcome {
        let calls = self.refresh_auth_state_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let limit = self.timings.refresh_auth_state_limit;
        if calls > limit {
            warn!(calls, limit, "Too many auth state refreshes, ignoring");
            return RefreshAuthOutcome::Throttled;
        }

        debug!(calls, "Manually refreshing auth state");
        self.sync_from_store().await
    }

    async fn sync_from_store(self: &Arc<Self>) -> RefreshAuthOutcome {
        match self.store.get_session().await {
            Some(session) => {
                info!(user_id = %session.user.id, "Auth state refreshed, user is logged in");
                self.apply_session(session, LifecycleInput::SessionFound);
                RefreshAuthOutcome::Authenticated
            }
            None => {
                info!("Auth state refreshed, no user is logged in");
                self.clear_session(LifecycleInput::NoSession);
                RefreshAuthOutcome::Anonymous
            }
        }
    }

    // ==========================================
    // Token refresh
    // ==========================================

    /// Refresh the access token, sharing any refresh already in flight.
    pub async fn refresh_token(self: &Arc<Self>) -> bool {
        match self.coordinator.begin() {
            RefreshTicket::Lead(lease) => {
                let ok = self.perform_refresh().await;
                lease.complete(ok);
                ok
            }
            RefreshTicket::InFlight(waiter) => {
                debug!("Token refresh already in progress, waiting");
                waiter.outcome().await
            }
        }
    }

    async fn perform_refresh(self: &Arc<Self>) -> bool {
        info!("Refreshing auth token");
        match self.store.refresh_session().await {
            Some(session) => {
                info!(
                    user_id = %session.user.id,
                    expires_at = session.expires_at,
                    "Token refreshed successfully"
                );
                self.apply_session(session, LifecycleInput::SessionFound);
                true
            }
            None => {
                warn!("Token refresh returned no session");
                false
            }
        }
    }

    /// Replace any pending background refresh with one timed for
    /// `expires_at`.
    pub fn schedule_token_refresh(self: &Arc<Self>, expires_at: i64) {
        let delay = refresh_delay(
            expires_at,
            Utc::now().timestamp(),
            self.timings.min_refresh_delay(),
        );
        info!(delay_secs = delay.as_secs(), "Scheduling token refresh");
        self.arm_refresh_timer(delay);
    }

    pub fn cancel_token_refresh(&self) {
        if let Some(timer) = self.tasks.lock().refresh_timer.take() {
            timer.handle.abort();
            debug!(generation = timer.generation, "Scheduled token refresh cancelled");
        }
    }

    fn arm_refresh_timer(self: &Arc<Self>, delay: Duration) {
        let mut tasks = self.tasks.lock();
        if let Some(previous) = tasks.refresh_timer.take() {
            previous.handle.abort();
        }
        tasks.timer_generation += 1;
        let generation = tasks.timer_generation;

        let controller = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(controller) = controller.upgrade() {
                controller.run_scheduled_refresh(generation).await;
            }
        });

        tasks.refresh_timer = Some(ScheduledRefresh {
            generation,
            delay,
            handle,
        });
    }

    async fn run_scheduled_refresh(self: &Arc<Self>, generation: u64) {
        {
            // Detach first: a successful refresh re-arms the timer, and that
            // must not abort this task.
            let mut tasks = self.tasks.lock();
            let current = tasks.refresh_timer.as_ref().map(|timer| timer.generation);
            if current != Some(generation) {
                return;
            }
            tasks.refresh_timer = None;
        }

        info!("Executing scheduled token refresh");
        if self.refresh_token().await {
            return;
        }

        let still_valid = self
            .snapshot_tx
            .borrow()
            .session
            .as_ref()
            .is_some_and(|session| !session.is_expired(Utc::now()));
        if still_valid && self.tasks.lock().refresh_timer.is_none() {
            let retry = self.timings.scheduled_refresh_retry();
            warn!(
                retry_ms = retry.as_millis() as u64,
                "Scheduled token refresh failed, retrying while the session is valid"
            );
            self.arm_refresh_timer(retry);
        } else if !still_valid {
            warn!("Scheduled token refresh failed and the session has expired");
        }
    }

    // ==========================================
    // Snapshot mutation
    // ==========================================

    fn apply_session(self: &Arc<Self>, session: Session, input: LifecycleInput) {
        let expires_at = session.expires_at;
        self.snapshot_tx.send_modify(|snapshot| {
            snapshot.user = Some(session.user.clone());
            snapshot.session = Some(session);
        });
        self.transition(&input);
        self.schedule_token_refresh(expires_at);
    }

    fn clear_session(&self, input: LifecycleInput) {
        self.snapshot_tx.send_if_modified(|snapshot| {
            let changed = snapshot.user.is_some() || snapshot.session.is_some();
            snapshot.user = None;
            snapshot.session = None;
            changed
        });
        self.transition(&input);
        self.cancel_token_refresh();
    }

    fn transition(&self, input: &LifecycleInput) {
        let mut fsm = self.fsm.lock();
        let old_phase = AuthPhase::from(fsm.state());

        if fsm.consume(input).is_err() {
            debug!(phase = ?old_phase, input = ?input, "Ignoring impossible auth transition");
            return;
        }

        let new_phase = AuthPhase::from(fsm.state());
        drop(fsm);

        if old_phase != new_phase {
            debug!(old_state = ?old_phase, new_state = ?new_phase, "Auth state transition");
            self.snapshot_tx.send_modify(|snapshot| snapshot.phase = new_phase);
        }
    }

    fn persist(&self, key: &str, result: StorageResult<()>) {
        if let Err(e) = result {
            warn!(key, error = %e, "Failed to persist auth marker");
        }
    }
}

impl Drop for AuthController {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut();
        for handle in [tasks.init.take(), tasks.subscription.take()].into_iter().flatten() {
            handle.abort();
        }
        if let Some(timer) = tasks.refresh_timer.take() {
            timer.handle.abort();
        }
    }
}

/// Handle provider changes one at a time, in delivery order.
async fn run_subscription(controller: Weak<AuthController>, mut changes: broadcast::Receiver<AuthChange>) {
    loop {
        match changes.recv().await {
            Ok(change) => {
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                controller.handle_change(change);
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Auth change subscription lagged, resyncing from store");
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                controller.sync_from_store().await;
                controller.mark_auth_ready();
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Auth change subscription closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN_DELAY: Duration = Duration::from_secs(300);

    #[test]
    fn test_refresh_delay_quarter_of_lifetime() {
        let delay = refresh_delay(1_000 + 3_600, 1_000, MIN_DELAY);
        assert_eq!(delay, Duration::from_secs(900));
    }

    #[test]
    fn test_refresh_delay_floor_dominates_short_sessions() {
        let delay = refresh_delay(1_000 + 600, 1_000, MIN_DELAY);
        assert_eq!(delay, Duration::from_secs(300));
    }

    #[test]
    fn test_refresh_delay_rounds_down() {
        let delay = refresh_delay(7_203, 0, MIN_DELAY);
        assert_eq!(delay, Duration::from_secs(1_800));
    }

    #[test]
    fn test_refresh_delay_never_negative() {
        let delay = refresh_delay(0, 10_000, Duration::ZERO);
        assert_eq!(delay, Duration::ZERO);
    }

    #[test]
    fn test_snapshot_not_authenticated_while_loading() {
        let session = session_store::InMemoryAuthProvider::session_for("u1", 3600);
        let mut snapshot = AuthSnapshot {
            user: Some(session.user.clone()),
            session: Some(session),
            ..AuthSnapshot::default()
        };
        assert!(!snapshot.is_authenticated());

        snapshot.is_loading = false;
        assert!(snapshot.is_authenticated());
    }
}
