//! Client for the summarizer backend.
//!
//! Two retry layers sit between a user action and the wire:
//!
//! - [`ApiClient`] retries each HTTP request (gate wait, bearer token,
//!   one token refresh on 401/403, network backoff)
//! - [`with_token_refresh`] retries a whole operation after refreshing,
//!   with its own counter
//!
//! [`ArticleAssistant`] strings them together for the summarize and ask
//! flows and maps failures to user-facing [`Notice`]s.

mod assistant;
mod client;
mod error;
mod retry;
mod transport;

#[cfg(test)]
mod tests;

pub use assistant::{ArticleAssistant, ArticleSummary, Notice};
pub use client::{
    ApiClient, AskRequest, AskResponse, HealthResponse, HttpRetryPolicy, SummarizeRequest,
    SummaryResponse,
};
pub use error::{ApiError, ApiResult};
pub use retry::{with_token_refresh, RetryPolicy};
pub use transport::{
    ApiRequest, ApiResponse, HttpTransport, Method, ReqwestTransport, ScriptedTransport,
};
