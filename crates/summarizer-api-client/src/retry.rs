//! Retry an operation after refreshing the session token.
//!
//! This is the outer layer. [`crate::ApiClient`] has its own HTTP-level
//! retries with a separate counter.

use session_store::ClassifyAuth;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Pause after a successful refresh.
    pub refreshed_delay: Duration,
    /// Pause after a refresh that reported failure.
    pub refresh_failed_delay: Duration,
    /// Pause per retry after the refresher itself errored.
    pub refresh_error_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            refreshed_delay: Duration::from_millis(500),
            refresh_failed_delay: Duration::from_millis(800),
            refresh_error_step: Duration::from_millis(1000),
        }
    }
}

/// Run `op`; on authorization errors refresh the token and try again.
///
/// Non-authorization errors and the last authorization error come back
/// unchanged. With no refresher errors `op` runs at most
/// `max_retries + 1` times.
pub async fn with_token_refresh<T, E, R, Op, OpFut, Refresh, RefreshFut>(
    mut op: Op,
    mut refresher: Refresh,
    policy: RetryPolicy,
) -> Result<T, E>
where
    Op: FnMut() -> OpFut,
    OpFut: Future<Output = Result<T, E>>,
    E: ClassifyAuth + Display,
    Refresh: FnMut() -> RefreshFut,
    RefreshFut: Future<Output = Result<bool, R>>,
    R: Display,
{
    let mut retries = 0;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !err.is_authorization() || retries >= policy.max_retries {
            return Err(err);
        }

        retries += 1;
        info!(
            retry = retries,
            max_retries = policy.max_retries,
            error = %err,
            "Auth error detected, refreshing token and retrying"
        );

        let delay = match refresher().await {
            Ok(true) => policy.refreshed_delay,
            Ok(false) => {
                warn!("Token refresh failed, retrying anyway");
                policy.refresh_failed_delay
            }
            Err(refresh_err) => {
                warn!(error = %refresh_err, "Error refreshing token");
                if retries >= policy.max_retries {
                    return Err(err);
                }
                policy.refresh_error_step * retries
            }
        };
        tokio::time::sleep(delay).await;
    }
}
