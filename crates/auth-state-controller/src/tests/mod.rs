//! Scenario tests for the auth state controller.
//!
//! - `harness.rs`        - Context over an in-memory provider, plus helpers
//! - `initialization.rs` - Startup, readiness and init markers
//! - `scheduling.rs`     - Background refresh timing and retry
//! - `refresh.rs`        - Single-flight token refresh through the controller
//! - `events.rs`         - Provider events, first login, manual refresh throttle
//! - `recovery.rs`       - Validity checks, forced/emergency logout, error recovery

mod initialization;
mod scheduling;
