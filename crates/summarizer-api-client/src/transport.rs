//! HTTP transport seam.

use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outgoing request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub request_id: String,
    pub method: Method,
    pub url: Url,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

/// Status and raw body of an answered request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_authorization_failure(&self) -> bool {
        matches!(self.status, 401 | 403)
    }
}

/// Sends requests. Errors mean no HTTP answer was received.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> ApiResult<ApiResponse>;
}

/// Transport over reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> ApiResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url),
            Method::Post => self.client.post(request.url),
        };
        builder = builder.header("X-Request-Id", &request.request_id);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status, body })
    }
}

/// Transport that replays queued answers and records what was sent.
///
/// Once the queue is empty every request gets `200 {}`.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<ApiResult<ApiResponse>>>,
    sent: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, status: u16, body: impl Into<String>) {
        self.replies
            .lock()
            .push_back(Ok(ApiResponse::new(status, body)));
    }

    pub fn push_network_error(&self, message: &str) {
        self.replies
            .lock()
            .push_back(Err(ApiError::Network(message.to_string())));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.sent.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        self.sent.lock().push(request);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ApiResponse::new(200, "{}")))
    }
}
