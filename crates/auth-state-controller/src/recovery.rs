//! Last-resort recovery: validity checks, forced and emergency logout.

use crate::context::AuthContext;
use crate::navigator::{Navigator, Route};
use chrono::Utc;
use client_storage::{StorageArea, StorageKeys};
use serde::Serialize;
use session_store::{ClassifyAuth, SignOutScope};
use std::fmt::Display;
use std::time::Duration;
use tracing::{error, info, warn};

/// How long a recovery redirect suppresses further ones.
pub const ERROR_REDIRECT_TTL: Duration = Duration::from_secs(300);

/// What [`AuthContext::recover_from_auth_error`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// A recovery ran recently; nothing was done.
    Skipped,
    /// The error does not concern credentials.
    NotAuthRelated,
    /// A token refresh cleared the error.
    Recovered,
    /// Refresh failed; the user was sent to emergency logout.
    EmergencyLogout,
}

impl AuthContext {
    /// True only if a session exists and the server still accepts it.
    pub async fn check_auth_validity(&self) -> bool {
        if self.store().get_session().await.is_none() {
            return false;
        }
        match self.store().get_user().await {
            Ok(user) => user.is_some(),
            Err(e) => {
                warn!(error = %e, "Session rejected while checking validity");
                false
            }
        }
    }

    /// Sign out everywhere, wipe client state and go to login.
    pub async fn force_logout(&self, navigator: &dyn Navigator) {
        info!("Forcing logout");
        if let Err(e) = self.store().sign_out(SignOutScope::Global).await {
            error!(error = %e, "Sign-out failed during forced logout, clearing locally");
        }
        self.clear_client_state();
        self.api_gate().reset();
        navigator.navigate(Route::Login);
    }

    /// Forget the local session without talking to the server, wipe
    /// everything and go to login.
    pub async fn emergency_logout(&self, navigator: &dyn Navigator) {
        warn!("Emergency logout");
        if let Err(e) = self.store().sign_out(SignOutScope::Local).await {
            error!(error = %e, "Local sign-out failed during emergency logout");
        }
        self.controller().cancel_token_refresh();
        self.clear_client_state();
        navigator.navigate(Route::Login);
    }

    /// Try to heal an error that reached the top of a flow.
    ///
    /// Only one recovery runs per redirect window. Authorization errors get a
    /// token refresh; if that fails the user is routed to emergency logout.
    pub async fn recover_from_auth_error<E>(&self, err: &E, navigator: &dyn Navigator) -> RecoveryOutcome
    where
        E: ClassifyAuth + Display + ?Sized,
    {
        if !err.is_authorization() {
            return RecoveryOutcome::NotAuthRelated;
        }

        let storage = self.storage();
        let now = Utc::now();
        let recent_redirect = storage
            .is_fresh(
                StorageArea::Session,
                StorageKeys::RECENT_ERROR_REDIRECT,
                ERROR_REDIRECT_TTL,
                now,
            )
            .unwrap_or(false);
        if recent_redirect {
            warn!(error = %err, "Auth error during a recent recovery, not redirecting again");
            return RecoveryOutcome::Skipped;
        }
        if let Err(e) = storage.set_timestamp(StorageArea::Session, StorageKeys::RECENT_ERROR_REDIRECT, now) {
            warn!(error = %e, "Failed to record recovery attempt");
        }

        info!(error = %err, "Attempting token refresh to recover from auth error");
        if self.controller().refresh_token().await {
            if let Err(e) = storage.set_timestamp(StorageArea::Session, StorageKeys::RECENT_AUTH_RECOVERY, Utc::now()) {
                warn!(error = %e, "Failed to record auth recovery");
            }
            info!("Recovered from auth error");
            RecoveryOutcome::Recovered
        } else {
            warn!("Token refresh failed, proceeding to emergency logout");
            navigator.navigate(Route::EmergencyLogout);
            RecoveryOutcome::EmergencyLogout
        }
    }

    /// Whether a recovery succeeded within the configured marker lifetime.
    pub fn recently_recovered(&self) -> bool {
        self.storage()
            .is_fresh(
                StorageArea::Session,
                StorageKeys::RECENT_AUTH_RECOVERY,
                self.timings().recovery_marker_ttl(),
                Utc::now(),
            )
            .unwrap_or(false)
    }

    fn clear_client_state(&self) {
        if let Err(e) = self.storage().clear_all() {
            error!(error = %e, "Failed to clear client storage");
        }
    }
}
