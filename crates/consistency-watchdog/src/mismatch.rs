//! Cross-checking the three views of "am I signed in".

use serde::Serialize;

/// A disagreement between the views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// Reactive state says authenticated, the provider has no session, yet a
    /// token record is persisted. This is the reload-loop pattern.
    PhantomAuthenticated,
    /// The provider has a session the reactive state never picked up.
    StaleAnonymous,
}

impl MismatchKind {
    pub fn is_critical(&self) -> bool {
        matches!(self, MismatchKind::PhantomAuthenticated)
    }
}

/// One observation of all three views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub reactive_authenticated: bool,
    pub reactive_has_user: bool,
    pub reactive_has_session: bool,
    pub provider_has_session: bool,
    pub persisted_token: bool,
}

impl ConsistencyReport {
    pub fn mismatch(&self) -> Option<MismatchKind> {
        if self.reactive_authenticated && !self.provider_has_session && self.persisted_token {
            return Some(MismatchKind::PhantomAuthenticated);
        }
        if self.provider_has_session && !self.reactive_has_user && !self.reactive_has_session {
            return Some(MismatchKind::StaleAnonymous);
        }
        None
    }

    /// Reactive state and provider agree on whether there is a session.
    pub fn is_agreed(&self) -> bool {
        self.reactive_authenticated == self.provider_has_session
    }
}
