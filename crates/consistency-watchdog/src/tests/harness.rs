//! Test harness for watchdog scenarios.

use crate::ConsistencyWatchdog;
use auth_state_controller::{AuthContext, RecordingNavigator};
use session_store::{InMemoryAuthProvider, Session};
use std::sync::Arc;
use std::time::Duration;
use summarizer_config_and_utils::AuthTimings;

pub struct TestHarness {
    pub context: AuthContext,
    pub provider: Arc<InMemoryAuthProvider>,
    pub navigator: Arc<RecordingNavigator>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_timings(AuthTimings::default())
    }

    /// Manual state refreshes are throttled from the first call, so no
    /// mismatch can be repaired by the first rung.
    pub fn unfixable() -> Self {
        Self::with_timings(AuthTimings {
            refresh_auth_state_limit: 0,
            ..AuthTimings::default()
        })
    }

    pub fn with_timings(timings: AuthTimings) -> Self {
        let (context, provider) = AuthContext::in_memory(timings);
        Self {
            context,
            provider,
            navigator: Arc::new(RecordingNavigator::new()),
        }
    }

    pub fn with_session(self, user_id: &str, expires_in: i64) -> Self {
        self.provider.set_session(Some(session(user_id, expires_in)));
        self
    }

    pub async fn start(&self) {
        self.context.start();
        settle().await;
    }

    pub fn watchdog(&self) -> Arc<ConsistencyWatchdog> {
        ConsistencyWatchdog::new(self.context.clone(), self.navigator.clone())
    }

    /// Provider forgets its session while the token record stays persisted.
    pub fn lose_provider_session(&self) {
        self.provider.set_session_unpersisted(None);
    }
}

pub fn session(user_id: &str, expires_in: i64) -> Session {
    InMemoryAuthProvider::session_for(user_id, expires_in)
}

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
