//! Fail-open facade over an [`AuthProvider`].

use crate::{AuthChange, AuthProvider, AuthResult, Session, SignOutScope, User};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;
use url::Url;

/// The session primitives the auth core uses.
///
/// Lookups never fail: provider errors are logged and read as "no session",
/// so callers above this layer only ever branch on presence.
#[derive(Clone)]
pub struct SessionStore {
    provider: Arc<dyn AuthProvider>,
}

impl SessionStore {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn AuthProvider> {
        &self.provider
    }

    pub async fn get_session(&self) -> Option<Session> {
        match self.provider.get_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "Session lookup failed");
                None
            }
        }
    }

    pub async fn refresh_session(&self) -> Option<Session> {
        match self.provider.refresh_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "Session refresh failed");
                None
            }
        }
    }

    /// Server-verified user. Unlike the lookups this surfaces errors, since
    /// a rejection is the answer the caller is asking for.
    pub async fn get_user(&self) -> AuthResult<Option<User>> {
        self.provider.get_user().await
    }

    pub async fn sign_in(&self, provider: &str, redirect_to: &str) -> AuthResult<Url> {
        self.provider.sign_in_with_oauth(provider, redirect_to).await
    }

    pub async fn complete_sign_in(&self, callback_url: &Url) -> AuthResult<Session> {
        self.provider.complete_oauth_callback(callback_url).await
    }

    pub async fn sign_out(&self, scope: SignOutScope) -> AuthResult<()> {
        self.provider.sign_out(scope).await
    }

    pub fn on_change(&self) -> broadcast::Receiver<AuthChange> {
        self.provider.subscribe()
    }

    pub fn persisted_session_key(&self) -> String {
        self.provider.persisted_session_key()
    }
}
