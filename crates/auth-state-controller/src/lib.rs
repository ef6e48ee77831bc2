//! Auth state controller for the summarizer client.
//!
//! This crate provides:
//! - The rust-fsm lifecycle machine behind every auth transition
//! - [`AuthController`], the single writer of the reactive [`AuthSnapshot`]
//! - [`AuthContext`], which builds and owns the gates, coordinator and controller
//! - Recovery paths (forced and emergency logout) behind the [`Navigator`] seam

mod auth_fsm;
mod context;
mod controller;
mod navigator;
mod recovery;

#[cfg(test)]
mod tests;

pub use auth_fsm::auth_lifecycle;
pub use auth_fsm::{AuthPhase, LifecycleInput, LifecycleMachine, LifecycleState};
pub use context::AuthContext;
pub use controller::{refresh_delay, AuthController, AuthSnapshot, RefreshAuthOutcome};
pub use navigator::{NavigationEvent, Navigator, RecordingNavigator, Route};
pub use recovery::{RecoveryOutcome, ERROR_REDIRECT_TTL};
