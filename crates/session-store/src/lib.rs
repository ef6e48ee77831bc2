//! Session primitives for the summarizer client.
//!
//! This crate provides:
//! - The [`AuthProvider`] seam and its Supabase implementation
//! - An in-memory provider for tests and offline runs
//! - OAuth redirect parsing and a local callback server
//! - [`SessionStore`], the fail-open facade the auth core talks to

mod error;
mod memory;
mod oauth;
mod provider;
mod store;
mod supabase;
mod types;

pub use error::{AuthError, AuthResult, ClassifyAuth};
pub use memory::{InMemoryAuthProvider, RefreshBehavior};
pub use oauth::{
    parse_callback_url, OAuthCallbackServer, OAuthTokens, DEFAULT_OAUTH_PORT, DEFAULT_OAUTH_TIMEOUT,
};
pub use provider::AuthProvider;
pub use store::SessionStore;
pub use supabase::SupabaseAuthProvider;
pub use types::{AuthChange, AuthChangeEvent, Session, SignOutScope, User};
