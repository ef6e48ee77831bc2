//! Article flows as the user drives them.

use crate::client::{ApiClient, AskRequest, SummarizeRequest};
use crate::error::{ApiError, ApiResult};
use crate::retry::{with_token_refresh, RetryPolicy};
use auth_state_controller::AuthContext;
use serde::Serialize;
use session_store::{AuthError, ClassifyAuth};
use std::convert::Infallible;
use tracing::{info, warn};
use url::Url;

/// A short message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
}

impl Notice {
    fn new(title: &str, description: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            description: description.into(),
        }
    }

    pub fn analysis_complete() -> Self {
        Self::new("Analysis complete", "Your article has been analyzed successfully.")
    }

    pub fn analysis_failed(err: &ApiError) -> Self {
        Self::new("Analysis failed", err.user_message())
    }

    pub fn question_answered() -> Self {
        Self::new(
            "Question answered",
            "Your question has been answered based on the article.",
        )
    }

    pub fn question_failed(err: &ApiError) -> Self {
        if err.is_authorization() {
            Self::new(
                "Session error",
                "Your session may have expired. Try refreshing the page.",
            )
        } else {
            Self::new("Error answering question", err.user_message())
        }
    }

    pub fn still_initializing() -> Self {
        Self::new(
            "Please wait",
            "The application is still initializing. Please wait a moment.",
        )
    }
}

/// Summary plus the article it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleSummary {
    pub url: String,
    pub title: Option<String>,
    pub summary: String,
}

/// Summarize articles and answer questions about them.
pub struct ArticleAssistant {
    context: AuthContext,
    client: ApiClient,
    retry: RetryPolicy,
}

impl ArticleAssistant {
    pub fn new(context: AuthContext, client: ApiClient) -> Self {
        Self {
            context,
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub async fn analyze(&self, url: &str, instructions: Option<&str>) -> ApiResult<ArticleSummary> {
        let url = validate_url(url)?;
        self.ensure_authenticated().await?;

        let request = SummarizeRequest {
            url: url.to_string(),
            instructions: instructions
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        };
        let controller = self.context.controller().clone();

        let response = with_token_refresh(
            || self.client.summarize(&request),
            || {
                let controller = controller.clone();
                async move { Ok::<_, Infallible>(controller.refresh_token().await) }
            },
            self.retry,
        )
        .await?;

        let Some(summary) = response.summary.filter(|s| !s.is_empty()) else {
            warn!(url = %request.url, "Summarize succeeded without summary data");
            return Err(ApiError::Decode(
                "The API returned a successful response but no summary data".to_string(),
            ));
        };

        info!(url = %request.url, length = summary.len(), "Article analyzed");
        Ok(ArticleSummary {
            url: request.url,
            title: response.title,
            summary,
        })
    }

    pub async fn ask(&self, url: &str, question: &str) -> ApiResult<String> {
        let url = validate_url(url)?;
        let question = question.trim();
        if question.is_empty() {
            return Err(ApiError::Validation("Please enter a question".to_string()));
        }
        self.ensure_authenticated().await?;

        let response = self
            .client
            .ask(&AskRequest {
                url: url.to_string(),
                question: question.to_string(),
            })
            .await?;
        info!(url = %url, "Question answered");
        Ok(response.answer)
    }

    /// Wait for both gates, then require a session, re-reading it once.
    async fn ensure_authenticated(&self) -> ApiResult<()> {
        let controller = self.context.controller();
        controller.wait_for_auth_ready().await;
        self.context.api_gate().wait().await;

        if controller.is_authenticated() {
            return Ok(());
        }
        warn!("Not authenticated, attempting to refresh auth state");
        controller.refresh_auth_state().await;
        if controller.is_authenticated() {
            return Ok(());
        }
        Err(ApiError::Auth(AuthError::NotLoggedIn))
    }
}

fn validate_url(url: &str) -> ApiResult<Url> {
    Url::parse(url.trim())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .ok_or_else(|| ApiError::Validation("Please enter a valid URL".to_string()))
}
