//! Deterministic in-process provider for tests and offline runs.

use crate::oauth::parse_callback_url;
use crate::{
    AuthChange, AuthChangeEvent, AuthError, AuthProvider, AuthResult, Session, SignOutScope, User,
};
use async_trait::async_trait;
use chrono::Utc;
use client_storage::{ClientStorage, StorageArea, StorageKeys};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::warn;
use url::Url;

const PROJECT_REF: &str = "local";

/// What the next refresh does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshBehavior {
    /// Issue a new session valid for `lifetime_secs`.
    Rotate { lifetime_secs: i64 },
    /// Succeed without a session.
    Empty,
    /// Reject the refresh token.
    Reject,
    /// Fail as if the network were down.
    NetworkError,
}

#[derive(Debug)]
struct ProviderState {
    session: Option<Session>,
    server_accepts_session: bool,
    refresh: RefreshBehavior,
    get_session_delay: Option<Duration>,
    get_session_hangs: bool,
    get_session_fails: bool,
    refresh_delay: Option<Duration>,
    rotation: u32,
}

/// Auth provider backed by memory, with knobs for latency and failures.
///
/// The session is also mirrored into local storage under
/// `sb-local-auth-token` the way a real provider persists it, so storage-level
/// checks see the same thing a browser would.
pub struct InMemoryAuthProvider {
    state: Mutex<ProviderState>,
    storage: ClientStorage,
    events: broadcast::Sender<AuthChange>,
    get_session_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl InMemoryAuthProvider {
    pub fn new(storage: ClientStorage) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            state: Mutex::new(ProviderState {
                session: None,
                server_accepts_session: true,
                refresh: RefreshBehavior::Rotate {
                    lifetime_secs: 3600,
                },
                get_session_delay: None,
                get_session_hangs: false,
                get_session_fails: false,
                refresh_delay: None,
                rotation: 0,
            }),
            storage,
            events,
            get_session_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        }
    }

    /// A session for `user_id` expiring `expires_in` seconds from now.
    pub fn session_for(user_id: &str, expires_in: i64) -> Session {
        Session {
            access_token: format!("access-{}", user_id),
            refresh_token: format!("refresh-{}", user_id),
            expires_at: Utc::now().timestamp() + expires_in,
            user: User {
                id: user_id.to_string(),
                email: Some(format!("{}@example.com", user_id)),
                display_name: None,
                avatar_url: None,
            },
        }
    }

    // ==========================================
    // Knobs
    // ==========================================

    /// Replace the provider's session silently (no event), persisting it.
    pub fn set_session(&self, session: Option<Session>) {
        self.persist(session.as_ref());
        self.state.lock().session = session;
    }

    /// Replace the session without touching persisted storage.
    ///
    /// Models the provider losing its in-memory session while a stale token
    /// record stays behind.
    pub fn set_session_unpersisted(&self, session: Option<Session>) {
        self.state.lock().session = session;
    }

    /// Replace the session and push `event` to subscribers.
    pub fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        self.set_session(session.clone());
        let _ = self.events.send(AuthChange::new(event, session));
    }

    pub fn set_refresh_behavior(&self, behavior: RefreshBehavior) {
        self.state.lock().refresh = behavior;
    }

    pub fn set_get_session_delay(&self, delay: Option<Duration>) {
        self.state.lock().get_session_delay = delay;
    }

    /// Make `get_session` never return.
    pub fn set_get_session_hangs(&self, hangs: bool) {
        self.state.lock().get_session_hangs = hangs;
    }

    pub fn set_get_session_fails(&self, fails: bool) {
        self.state.lock().get_session_fails = fails;
    }

    pub fn set_refresh_delay(&self, delay: Option<Duration>) {
        self.state.lock().refresh_delay = delay;
    }

    /// Whether `get_user` accepts the current session.
    pub fn set_server_accepts_session(&self, accepts: bool) {
        self.state.lock().server_accepts_session = accepts;
    }

    pub fn current_session(&self) -> Option<Session> {
        self.state.lock().session.clone()
    }

    // ==========================================
    // Counters
    // ==========================================

    pub fn get_session_calls(&self) -> usize {
        self.get_session_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    fn persist(&self, session: Option<&Session>) {
        let key = self.persisted_session_key();
        let result = match session {
            Some(session) => self.storage.write_json(StorageArea::Local, &key, session),
            None => self.storage.local().delete(&key).map(|_| ()),
        };
        if let Err(e) = result {
            warn!(key = %key, error = %e, "Failed to persist session record");
        }
    }
}

#[async_trait]
impl AuthProvider for InMemoryAuthProvider {
    async fn get_session(&self) -> AuthResult<Option<Session>> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);

        let (delay, hangs, fails) = {
            let state = self.state.lock();
            (
                state.get_session_delay,
                state.get_session_hangs,
                state.get_session_fails,
            )
        };

        if hangs {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fails {
            return Err(AuthError::NetworkUnavailable);
        }

        Ok(self.state.lock().session.clone())
    }

    async fn get_user(&self) -> AuthResult<Option<User>> {
        let state = self.state.lock();
        match &state.session {
            Some(_) if !state.server_accepts_session => {
                Err(AuthError::SessionInvalid("session revoked".to_string()))
            }
            Some(session) => Ok(Some(session.user.clone())),
            None => Ok(None),
        }
    }

    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> AuthResult<Url> {
        let mut url = Url::parse("http://localhost/auth/v1/authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to);
        Ok(url)
    }

    async fn complete_oauth_callback(&self, callback_url: &Url) -> AuthResult<Session> {
        let tokens = parse_callback_url(callback_url)?;
        let mut session = Self::session_for("oauth-user", tokens.expires_in.unwrap_or(3600));
        session.access_token = tokens.access_token;
        session.refresh_token = tokens.refresh_token;
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, _scope: SignOutScope) -> AuthResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.emit(AuthChangeEvent::SignedOut, None);
        Ok(())
    }

    async fn refresh_session(&self) -> AuthResult<Option<Session>> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.state.lock().refresh_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let behavior = self.state.lock().refresh.clone();
        match behavior {
            RefreshBehavior::Rotate { lifetime_secs } => {
                let next = {
                    let mut state = self.state.lock();
                    let Some(current) = state.session.clone() else {
                        return Err(AuthError::NotLoggedIn);
                    };
                    state.rotation += 1;
                    Session {
                        access_token: format!("{}-r{}", current.user.id, state.rotation),
                        refresh_token: format!("refresh-{}-r{}", current.user.id, state.rotation),
                        expires_at: Utc::now().timestamp() + lifetime_secs,
                        user: current.user,
                    }
                };
                self.emit(AuthChangeEvent::TokenRefreshed, Some(next.clone()));
                Ok(Some(next))
            }
            RefreshBehavior::Empty => Ok(None),
            RefreshBehavior::Reject => {
                Err(AuthError::SessionInvalid("Refresh Token Not Found".to_string()))
            }
            RefreshBehavior::NetworkError => Err(AuthError::NetworkUnavailable),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }

    fn persisted_session_key(&self) -> String {
        StorageKeys::provider_session(PROJECT_REF)
    }
}
