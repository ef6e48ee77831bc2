//! Gate that holds outbound API calls until authentication has resolved.

use crate::readiness::{ReadinessGate, ReadinessOutcome};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeouts for the API gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiGateConfig {
    /// Self-release after `initialize`.
    pub fallback: Duration,
    /// Self-release after `reset`.
    pub reset_fallback: Duration,
    /// Default bound for `wait_until_ready`.
    pub wait_timeout: Duration,
}

impl Default for ApiGateConfig {
    fn default() -> Self {
        Self {
            fallback: Duration::from_secs(10),
            reset_fallback: Duration::from_secs(8),
            wait_timeout: Duration::from_secs(5),
        }
    }
}

/// API flavour of [`ReadinessGate`].
///
/// A wait is satisfied by either the auth gate or this gate opening, and
/// always leaves this gate open afterwards.
pub struct ApiRequestGate {
    gate: Arc<ReadinessGate>,
    auth_gate: Arc<ReadinessGate>,
    config: ApiGateConfig,
}

impl ApiRequestGate {
    pub fn new(auth_gate: Arc<ReadinessGate>, config: ApiGateConfig) -> Self {
        Self::from_gate(ReadinessGate::new("api"), auth_gate, config)
    }

    /// Like [`new`](Self::new), calling `hook` each time the gate opens.
    pub fn with_on_ready(
        auth_gate: Arc<ReadinessGate>,
        config: ApiGateConfig,
        hook: impl Fn(DateTime<Utc>) + Send + Sync + 'static,
    ) -> Self {
        Self::from_gate(ReadinessGate::new("api").with_on_ready(hook), auth_gate, config)
    }

    fn from_gate(gate: ReadinessGate, auth_gate: Arc<ReadinessGate>, config: ApiGateConfig) -> Self {
        Self {
            gate: Arc::new(gate),
            auth_gate,
            config,
        }
    }

    pub fn config(&self) -> &ApiGateConfig {
        &self.config
    }

    pub fn initialize(&self) {
        self.gate.initialize(Some(self.config.fallback));
    }

    pub fn mark_ready(&self) -> bool {
        self.gate.mark_ready()
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        self.gate.ready_at()
    }

    /// Hold API calls again, e.g. after a forced logout.
    pub fn reset(&self) -> bool {
        self.gate.reset(self.config.reset_fallback)
    }

    /// Wait with the configured default bound.
    pub async fn wait(&self) -> ReadinessOutcome {
        self.wait_until_ready(self.config.wait_timeout).await
    }

    pub async fn wait_until_ready(&self, timeout: Duration) -> ReadinessOutcome {
        if self.gate.is_ready() {
            return ReadinessOutcome::AlreadyReady;
        }

        let released = async {
            tokio::select! {
                _ = self.auth_gate.opened() => "auth",
                _ = self.gate.opened() => "api",
            }
        };

        match tokio::time::timeout(timeout, released).await {
            Ok(source) => {
                debug!(source, "API gate released");
                self.gate.mark_ready();
                ReadinessOutcome::Ready
            }
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "API gate wait timed out, proceeding anyway"
                );
                self.gate.mark_ready();
                ReadinessOutcome::ForcedTimeout
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    fn gates() -> (Arc<ReadinessGate>, ApiRequestGate) {
        let auth = Arc::new(ReadinessGate::new("auth"));
        let api = ApiRequestGate::new(auth.clone(), ApiGateConfig::default());
        (auth, api)
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_gate_releases_api_wait() {
        let (auth, api) = gates();
        let api = Arc::new(api);

        let waiter = {
            let api = api.clone();
            tokio::spawn(async move { api.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(300)).await;
        auth.mark_ready();

        assert_eq!(waiter.await.unwrap(), ReadinessOutcome::Ready);
        assert!(api.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_never_exceeds_timeout() {
        let (_auth, api) = gates();
        let started = Instant::now();

        let outcome = api.wait().await;

        assert_eq!(outcome, ReadinessOutcome::ForcedTimeout);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert!(api.is_ready());

        assert_eq!(api.wait().await, ReadinessOutcome::AlreadyReady);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_releases_after_ten_seconds() {
        let (_auth, api) = gates();
        api.initialize();

        tokio::time::sleep(Duration::from_millis(9_990)).await;
        assert!(!api.is_ready());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(api.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hook_sees_each_release() {
        let seen: Arc<Mutex<Vec<DateTime<Utc>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let auth = Arc::new(ReadinessGate::new("auth"));
        let api = ApiRequestGate::with_on_ready(auth, ApiGateConfig::default(), move |at| {
            sink.lock().push(at);
        });

        api.mark_ready();
        api.mark_ready();
        assert_eq!(seen.lock().len(), 1);

        assert!(api.reset());
        assert!(!api.is_ready());
        tokio::time::sleep(Duration::from_secs(8)).await;
        tokio::task::yield_now().await;

        assert!(api.is_ready());
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_while_pending_is_ignored() {
        let (_auth, api) = gates();
        api.initialize();
        assert!(!api.reset());
    }
}
