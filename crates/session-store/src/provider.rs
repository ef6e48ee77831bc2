//! The auth provider seam.

use crate::{AuthChange, AuthResult, Session, SignOutScope, User};
use async_trait::async_trait;
use tokio::sync::broadcast;
use url::Url;

/// Session primitives of an external auth provider.
///
/// Implementations own the persisted session record and push every change to
/// subscribers in the order it happened.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The locally stored session, refreshed first if it has expired.
    async fn get_session(&self) -> AuthResult<Option<Session>>;

    /// The user as the provider's server sees it right now.
    async fn get_user(&self) -> AuthResult<Option<User>>;

    /// Where to send the user to sign in with `provider`.
    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> AuthResult<Url>;

    /// Finish an OAuth sign-in from the redirect URL the browser landed on.
    async fn complete_oauth_callback(&self, callback_url: &Url) -> AuthResult<Session>;

    async fn sign_out(&self, scope: SignOutScope) -> AuthResult<()>;

    /// Exchange the stored refresh token for a new session.
    async fn refresh_session(&self) -> AuthResult<Option<Session>>;

    /// Receive every subsequent change.
    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;

    /// Local storage key under which the session record is persisted.
    fn persisted_session_key(&self) -> String;
}
