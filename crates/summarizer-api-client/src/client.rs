//! Backend client: gate, bearer token, HTTP-level retries.

use crate::error::{ApiError, ApiResult};
use crate::transport::{ApiRequest, HttpTransport, Method, ReqwestTransport};
use auth_state_controller::AuthContext;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// HTTP-level retry schedule, counted per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpRetryPolicy {
    pub max_retries: u32,
    pub auth_base_delay: Duration,
    pub auth_step: Duration,
    pub network_step: Duration,
}

impl Default for HttpRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            auth_base_delay: Duration::from_millis(800),
            auth_step: Duration::from_millis(300),
            network_step: Duration::from_millis(1000),
        }
    }
}

impl HttpRetryPolicy {
    /// `800 + 300 * retry` ms. Retries are numbered from 1, so a request
    /// waits 1100 ms, 1400 ms, 1700 ms.
    pub fn auth_delay(&self, retry: u32) -> Duration {
        self.auth_base_delay + self.auth_step * retry
    }

    /// 1 s, 2 s, 3 s, ...
    pub fn network_delay(&self, retry: u32) -> Duration {
        self.network_step * retry
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummarizeRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SummaryResponse {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AskRequest {
    pub url: String,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AskResponse {
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Client for the summarizer backend.
///
/// Every request waits for the API gate and any in-flight token refresh,
/// then carries the current access token.
#[derive(Clone)]
pub struct ApiClient {
    context: AuthContext,
    base_url: Url,
    transport: Arc<dyn HttpTransport>,
    policy: HttpRetryPolicy,
}

impl ApiClient {
    pub fn new(context: AuthContext, base_url: Url) -> ApiResult<Self> {
        let transport = ReqwestTransport::new(Duration::from_secs(30))?;
        Ok(Self::with_transport(context, base_url, Arc::new(transport)))
    }

    pub fn with_transport(
        context: AuthContext,
        base_url: Url,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            context,
            base_url,
            transport,
            policy: HttpRetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: HttpRetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn summarize(&self, request: &SummarizeRequest) -> ApiResult<SummaryResponse> {
        let body = serde_json::to_value(request).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.request(Method::Post, "/api/summarize", Some(body)).await
    }

    pub async fn ask(&self, request: &AskRequest) -> ApiResult<AskResponse> {
        let body = serde_json::to_value(request).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.request(Method::Post, "/api/ask", Some(body)).await
    }

    pub async fn health(&self) -> ApiResult<HealthResponse> {
        self.request(Method::Get, "/api/health", None).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> ApiResult<T> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ApiError::Validation(format!("Invalid API URL: {}", e)))?;
        let request_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let started = Instant::now();

        let mut retry = 0;
        let mut token_refreshed = false;

        loop {
            debug!(request_id = %request_id, method = ?method, url = %url, retry, "Starting API request");

            let api_gate = self.context.api_gate();
            if !api_gate.is_ready() {
                debug!(request_id = %request_id, "API gate closed, waiting for auth");
                let outcome = api_gate.wait().await;
                debug!(request_id = %request_id, outcome = ?outcome, "API gate released");
            }
            if let Some(refreshed) = self.context.coordinator().wait_for_refresh().await {
                debug!(request_id = %request_id, refreshed, "Waited for token refresh");
            }

            let bearer = self
                .context
                .store()
                .get_session()
                .await
                .map(|session| session.access_token);
            let request = ApiRequest {
                request_id: request_id.clone(),
                method,
                url: url.clone(),
                bearer,
                body: body.clone(),
            };

            let response = match self.transport.send(request).await {
                Ok(response) => response,
                Err(e) if retry < self.policy.max_retries => {
                    retry += 1;
                    let delay = self.policy.network_delay(retry);
                    warn!(
                        request_id = %request_id,
                        retry,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Request error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => {
                    warn!(request_id = %request_id, error = %e, "Request failed");
                    return Err(e);
                }
            };

            if response.is_authorization_failure() {
                if retry >= self.policy.max_retries {
                    warn!(
                        request_id = %request_id,
                        status = response.status,
                        "Maximum retries reached for auth error, giving up"
                    );
                    return Err(ApiError::Authorization {
                        status: response.status,
                    });
                }
                retry += 1;

                if !token_refreshed {
                    token_refreshed = true;
                    info!(request_id = %request_id, status = response.status, "Auth error, refreshing token");
                    let ok = self.context.controller().refresh_token().await;
                    if !ok {
                        warn!(request_id = %request_id, "Token refresh failed, retrying anyway");
                    }
                }

                let delay = self.policy.auth_delay(retry);
                debug!(
                    request_id = %request_id,
                    retry,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after auth error"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            debug!(
                request_id = %request_id,
                status = response.status,
                total_ms = started.elapsed().as_millis() as u64,
                "API request finished"
            );

            if !response.is_success() {
                return Err(ApiError::Http {
                    status: response.status,
                    message: error_message(response.status, &response.body),
                });
            }

            return serde_json::from_str(&response.body).map_err(|e| ApiError::Decode(e.to_string()));
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// `message` from a JSON error body, else the body text, else the status.
fn error_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
    }
    let body = body.trim();
    if body.is_empty() {
        format!("Error {}", status)
    } else {
        body.to_string()
    }
}
