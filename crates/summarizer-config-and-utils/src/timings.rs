//! Timeouts and bounds used by the auth coordination core.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Every timer the auth core arms, in one place.
///
/// All values are milliseconds unless the field name says otherwise. Missing
/// fields in `config.json` take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthTimings {
    /// Budget for the initial session lookup before assuming anonymous.
    pub init_timeout_ms: u64,
    /// Bound on `wait_for_auth_ready`.
    pub auth_wait_timeout_ms: u64,
    /// API gate force-release after `initialize`.
    pub api_gate_fallback_ms: u64,
    /// API gate force-release after `reset`.
    pub api_gate_reset_fallback_ms: u64,
    /// Bound on the API gate's own wait.
    pub api_gate_wait_timeout_ms: u64,
    /// Bound on waiting for somebody else's in-flight refresh.
    pub refresh_wait_timeout_ms: u64,
    /// Minimum delay before a scheduled background refresh, in seconds.
    pub min_refresh_delay_secs: u64,
    /// Delay before retrying a scheduled refresh that failed.
    pub scheduled_refresh_retry_ms: u64,
    /// Manual `refresh_auth_state` calls allowed per controller.
    pub refresh_auth_state_limit: u32,
    /// Watchdog steady-state check interval.
    pub watchdog_interval_ms: u64,
    /// Watchdog follow-up check after the first one.
    pub watchdog_recheck_delay_ms: u64,
    /// Lifetime of the "recent recovery" marker.
    pub recovery_marker_ttl_ms: u64,
}

impl Default for AuthTimings {
    fn default() -> Self {
        Self {
            init_timeout_ms: 8_000,
            auth_wait_timeout_ms: 5_000,
            api_gate_fallback_ms: 10_000,
            api_gate_reset_fallback_ms: 8_000,
            api_gate_wait_timeout_ms: 5_000,
            refresh_wait_timeout_ms: 3_000,
            min_refresh_delay_secs: 300,
            scheduled_refresh_retry_ms: 30_000,
            refresh_auth_state_limit: 5,
            watchdog_interval_ms: 30_000,
            watchdog_recheck_delay_ms: 1_000,
            recovery_marker_ttl_ms: 60_000,
        }
    }
}

impl AuthTimings {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn auth_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_wait_timeout_ms)
    }

    pub fn api_gate_fallback(&self) -> Duration {
        Duration::from_millis(self.api_gate_fallback_ms)
    }

    pub fn api_gate_reset_fallback(&self) -> Duration {
        Duration::from_millis(self.api_gate_reset_fallback_ms)
    }

    pub fn api_gate_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.api_gate_wait_timeout_ms)
    }

    pub fn refresh_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_wait_timeout_ms)
    }

    pub fn min_refresh_delay(&self) -> Duration {
        Duration::from_secs(self.min_refresh_delay_secs)
    }

    pub fn scheduled_refresh_retry(&self) -> Duration {
        Duration::from_millis(self.scheduled_refresh_retry_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn watchdog_recheck_delay(&self) -> Duration {
        Duration::from_millis(self.watchdog_recheck_delay_ms)
    }

    pub fn recovery_marker_ttl(&self) -> Duration {
        Duration::from_millis(self.recovery_marker_ttl_ms)
    }
}
