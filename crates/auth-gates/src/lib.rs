//! One-shot readiness gates and single-flight token refresh.
//!
//! Every wait in this crate is bounded: a gate that never resolves on its own
//! is forced open when its timeout elapses, and the forced path is reported as
//! [`ReadinessOutcome::ForcedTimeout`] rather than hidden.

mod api_gate;
mod readiness;
mod refresh;

pub use api_gate::{ApiGateConfig, ApiRequestGate};
pub use readiness::{ReadinessGate, ReadinessOutcome, ReadyCause};
pub use refresh::{RefreshLease, RefreshTicket, RefreshWaiter, TokenRefreshCoordinator};
