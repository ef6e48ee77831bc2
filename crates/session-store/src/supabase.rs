//! Supabase GoTrue provider.

use crate::oauth::parse_callback_url;
use crate::{
    AuthChange, AuthChangeEvent, AuthError, AuthProvider, AuthResult, Session, SignOutScope, User,
};
use async_trait::async_trait;
use chrono::Utc;
use client_storage::{ClientStorage, StorageArea, StorageError, StorageKeys};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

/// Refresh this many seconds before the recorded expiry.
const EXPIRY_MARGIN_SECS: i64 = 10;

/// Lifetime assumed when a redirect carries no expiry.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: SupabaseUser,
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

impl From<SupabaseUser> for User {
    fn from(user: SupabaseUser) -> Self {
        let UserMetadata {
            full_name,
            name,
            avatar_url,
            picture,
        } = user.user_metadata;
        User {
            id: user.id,
            email: user.email,
            display_name: full_name.or(name),
            avatar_url: avatar_url.or(picture),
        }
    }
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| Utc::now().timestamp() + self.expires_in);
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into(),
        }
    }
}

/// GoTrue error bodies use several field names depending on the endpoint.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn describe(self, status: StatusCode) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .unwrap_or_else(|| status.to_string())
    }
}

/// Supabase auth over its REST API, persisting the session in local storage.
pub struct SupabaseAuthProvider {
    http_client: Client,
    supabase_url: Url,
    anon_key: String,
    project_ref: String,
    storage: ClientStorage,
    events: broadcast::Sender<AuthChange>,
}

impl SupabaseAuthProvider {
    /// Create a provider for a project.
    ///
    /// # Arguments
    /// * `supabase_url` - project URL (e.g., `https://xyz.supabase.co`)
    /// * `anon_key` - the project's public anon key
    /// * `storage` - where the session record is persisted
    pub fn new(supabase_url: Url, anon_key: impl Into<String>, storage: ClientStorage) -> AuthResult<Self> {
        let project_ref = supabase_url
            .host_str()
            .and_then(|host| host.split('.').next())
            .filter(|label| !label.is_empty())
            .map(str::to_string)
            .ok_or(AuthError::InvalidUrl(url::ParseError::EmptyHost))?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            http_client: Client::new(),
            supabase_url,
            anon_key: anon_key.into(),
            project_ref,
            storage,
            events,
        })
    }

    pub fn project_ref(&self) -> &str {
        &self.project_ref
    }

    fn endpoint(&self, path: &str) -> AuthResult<Url> {
        Ok(self.supabase_url.join(path)?)
    }

    // ==========================================
    // Persisted session record
    // ==========================================

    fn stored_session(&self) -> AuthResult<Option<Session>> {
        let key = self.persisted_session_key();
        match self.storage.read_json::<Session>(StorageArea::Local, &key) {
            Ok(session) => Ok(session),
            Err(StorageError::Json(e)) => {
                warn!(key = %key, error = %e, "Ignoring unreadable session record");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn store_session(&self, session: &Session) -> AuthResult<()> {
        self.storage
            .write_json(StorageArea::Local, &self.persisted_session_key(), session)?;
        Ok(())
    }

    fn clear_stored_session(&self) -> AuthResult<()> {
        self.storage
            .local()
            .delete(&self.persisted_session_key())?;
        Ok(())
    }

    fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        debug!(event = ?event, has_session = session.is_some(), "Auth change");
        // No subscribers is fine.
        let _ = self.events.send(AuthChange::new(event, session));
    }

    // ==========================================
    // REST calls
    // ==========================================

    async fn error_from_response(response: reqwest::Response) -> AuthError {
        let status = response.status();
        let body: ErrorBody = response.json().await.unwrap_or_default();
        let message = body.describe(status);

        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                AuthError::SessionInvalid(message)
            }
            _ => AuthError::Provider {
                status: status.as_u16(),
                message,
            },
        }
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> AuthResult<Session> {
        let url = self.endpoint("/auth/v1/token?grant_type=refresh_token")?;
        debug!(url = %url, "Refreshing token");

        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::error_from_response(response).await;
            warn!(error = %err, "Token refresh rejected");
            return Err(err);
        }

        let data: TokenResponse = response.json().await?;
        Ok(data.into_session())
    }

    async fn fetch_user(&self, access_token: &str) -> AuthResult<User> {
        let url = self.endpoint("/auth/v1/user")?;
        let response = self
            .http_client
            .get(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let user: SupabaseUser = response.json().await?;
        Ok(user.into())
    }

    /// Refresh with the stored token and apply the outcome to storage and
    /// subscribers.
    async fn refresh_stored(&self, stored: &Session) -> AuthResult<Session> {
        match self.exchange_refresh_token(&stored.refresh_token).await {
            Ok(session) => {
                self.store_session(&session)?;
                info!(user_id = %session.user.id, "Token refreshed successfully");
                self.emit(AuthChangeEvent::TokenRefreshed, Some(session.clone()));
                Ok(session)
            }
            Err(e) if e.is_session_rejection() => {
                self.clear_stored_session()?;
                self.emit(AuthChangeEvent::SignedOut, None);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuthProvider {
    async fn get_session(&self) -> AuthResult<Option<Session>> {
        let Some(stored) = self.stored_session()? else {
            return Ok(None);
        };

        if stored.seconds_until_expiry(Utc::now()) > EXPIRY_MARGIN_SECS {
            return Ok(Some(stored));
        }

        debug!(user_id = %stored.user.id, "Stored session expired, refreshing");
        match self.refresh_stored(&stored).await {
            Ok(session) => Ok(Some(session)),
            Err(e) if e.is_session_rejection() => Err(AuthError::SessionExpired),
            Err(e) => Err(e),
        }
    }

    async fn get_user(&self) -> AuthResult<Option<User>> {
        let Some(stored) = self.stored_session()? else {
            return Ok(None);
        };
        self.fetch_user(&stored.access_token).await.map(Some)
    }

    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> AuthResult<Url> {
        let mut url = self.endpoint("/auth/v1/authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to);
        info!(provider = %provider, "OAuth sign-in started");
        Ok(url)
    }

    async fn complete_oauth_callback(&self, callback_url: &Url) -> AuthResult<Session> {
        let tokens = parse_callback_url(callback_url)?;
        let user = self.fetch_user(&tokens.access_token).await?;

        let expires_at = tokens.expires_at.unwrap_or_else(|| {
            Utc::now().timestamp() + tokens.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS)
        });
        let session = Session {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at,
            user,
        };

        self.store_session(&session)?;
        info!(user_id = %session.user.id, "OAuth sign-in completed");
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, scope: SignOutScope) -> AuthResult<()> {
        let stored = self.stored_session()?;

        let remote = match &stored {
            Some(session) => {
                let mut url = self.endpoint("/auth/v1/logout")?;
                url.query_pairs_mut().append_pair("scope", scope.as_str());
                let result = self
                    .http_client
                    .post(url)
                    .header("apikey", &self.anon_key)
                    .bearer_auth(&session.access_token)
                    .send()
                    .await;
                match result {
                    Ok(response) if response.status().is_success() => Ok(()),
                    // Already invalid server-side; nothing left to revoke.
                    Ok(response)
                        if matches!(
                            response.status(),
                            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
                        ) =>
                    {
                        Ok(())
                    }
                    Ok(response) => Err(Self::error_from_response(response).await),
                    Err(e) => Err(AuthError::from(e)),
                }
            }
            None => Ok(()),
        };

        self.clear_stored_session()?;
        self.emit(AuthChangeEvent::SignedOut, None);

        match remote {
            Ok(()) => {
                info!(scope = scope.as_str(), "Signed out");
                Ok(())
            }
            Err(e) => {
                warn!(scope = scope.as_str(), error = %e, "Remote sign-out failed, local session cleared");
                Err(e)
            }
        }
    }

    async fn refresh_session(&self) -> AuthResult<Option<Session>> {
        let Some(stored) = self.stored_session()? else {
            return Err(AuthError::NotLoggedIn);
        };
        self.refresh_stored(&stored).await.map(Some)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }

    fn persisted_session_key(&self) -> String {
        StorageKeys::provider_session(&self.project_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> SupabaseAuthProvider {
        SupabaseAuthProvider::new(
            Url::parse("https://abcd1234.supabase.co").unwrap(),
            "anon-key",
            ClientStorage::in_memory(),
        )
        .unwrap()
    }

    fn session(expires_in: i64) -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now().timestamp() + expires_in,
            user: User {
                id: "user-1".to_string(),
                email: Some("reader@example.com".to_string()),
                display_name: None,
                avatar_url: None,
            },
        }
    }

    #[test]
    fn test_project_ref_and_storage_key() {
        let provider = provider();
        assert_eq!(provider.project_ref(), "abcd1234");
        assert_eq!(provider.persisted_session_key(), "sb-abcd1234-auth-token");
    }

    #[tokio::test]
    async fn test_authorize_url() {
        let url = provider()
            .sign_in_with_oauth("google", "http://localhost:9876/callback")
            .await
            .unwrap();

        assert_eq!(url.path(), "/auth/v1/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("provider".to_string(), "google".to_string())));
        assert!(pairs.contains(&(
            "redirect_to".to_string(),
            "http://localhost:9876/callback".to_string()
        )));
    }

    #[tokio::test]
    async fn test_get_session_without_record() {
        assert!(provider().get_session().await.unwrap().is_none());
        assert!(provider().get_user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_session_returns_unexpired_record_without_network() {
        let provider = provider();
        let stored = session(3600);
        provider.store_session(&stored).unwrap();

        assert_eq!(provider.get_session().await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn test_unreadable_record_is_treated_as_absent() {
        let provider = provider();
        provider
            .storage
            .local()
            .set(&provider.persisted_session_key(), "{broken")
            .unwrap();

        assert!(provider.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_without_session_is_not_logged_in() {
        let result = provider().refresh_session().await;
        assert!(matches!(result, Err(AuthError::NotLoggedIn)));
    }

    #[test]
    fn test_token_response_into_session() {
        let json = r#"{
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 3600,
            "expires_at": 1700003600,
            "user": {
                "id": "user-9",
                "email": "nine@example.com",
                "user_metadata": { "name": "Nine", "picture": "https://img/9.png" }
            }
        }"#;
        let session = serde_json::from_str::<TokenResponse>(json)
            .unwrap()
            .into_session();

        assert_eq!(session.expires_at, 1_700_003_600);
        assert_eq!(session.user.display_name.as_deref(), Some("Nine"));
        assert_eq!(session.user.avatar_url.as_deref(), Some("https://img/9.png"));
    }

    #[test]
    fn test_error_body_description_precedence() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error":"invalid_grant","error_description":"Refresh Token Not Found"}"#)
                .unwrap();
        assert_eq!(body.describe(StatusCode::BAD_REQUEST), "Refresh Token Not Found");
    }
}
