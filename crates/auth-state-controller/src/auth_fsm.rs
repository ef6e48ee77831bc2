//! Auth lifecycle state machine using rust-fsm.
//!
//! ```text
//!  Uninitialized
//!       │ Start
//!       ▼
//!  Initializing ──── SessionFound / SignedIn ────► ReadyAuthenticated
//!       │                                             ▲        │
//!       │ NoSession / SignedOut          SignedIn /   │        │ SignedOut /
//!       ▼                                SessionFound │        │ NoSession
//!  ReadyAnonymous ────────────────────────────────────┘◄───────┘
//! ```
//!
//! Provider events can arrive at any point after `Start`, so both ready
//! states accept every session input, including ones that keep the state.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_lifecycle(Uninitialized)

    Uninitialized => {
        Start => Initializing
    },
    Initializing => {
        SessionFound => ReadyAuthenticated,
        SignedIn => ReadyAuthenticated,
        NoSession => ReadyAnonymous,
        SignedOut => ReadyAnonymous
    },
    ReadyAuthenticated => {
        SessionFound => ReadyAuthenticated,
        SignedIn => ReadyAuthenticated,
        NoSession => ReadyAnonymous,
        SignedOut => ReadyAnonymous
    },
    ReadyAnonymous => {
        SessionFound => ReadyAuthenticated,
        SignedIn => ReadyAuthenticated,
        NoSession => ReadyAnonymous,
        SignedOut => ReadyAnonymous
    }
}

pub use auth_lifecycle::Input as LifecycleInput;
pub use auth_lifecycle::State as LifecycleState;
pub use auth_lifecycle::StateMachine as LifecycleMachine;

/// Lifecycle phase for snapshots and status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    #[default]
    Uninitialized,
    Initializing,
    ReadyAuthenticated,
    ReadyAnonymous,
}

impl AuthPhase {
    /// Whether initialization has produced an answer.
    pub fn is_resolved(&self) -> bool {
        matches!(self, AuthPhase::ReadyAuthenticated | AuthPhase::ReadyAnonymous)
    }
}

impl From<&LifecycleState> for AuthPhase {
    fn from(state: &LifecycleState) -> Self {
        match state {
            LifecycleState::Uninitialized => AuthPhase::Uninitialized,
            LifecycleState::Initializing => AuthPhase::Initializing,
            LifecycleState::ReadyAuthenticated => AuthPhase::ReadyAuthenticated,
            LifecycleState::ReadyAnonymous => AuthPhase::ReadyAnonymous,
        }
    }
}
