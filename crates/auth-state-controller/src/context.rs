//! The dependency-injected auth context.

use crate::controller::AuthController;
use auth_gates::{ApiGateConfig, ApiRequestGate, ReadinessGate, TokenRefreshCoordinator};
use client_storage::{ClientStorage, StorageArea, StorageKeys};
use session_store::{AuthProvider, AuthResult, InMemoryAuthProvider, SessionStore, SupabaseAuthProvider};
use std::sync::Arc;
use summarizer_config_and_utils::AuthTimings;
use tracing::warn;
use url::Url;

/// Everything the auth core shares, built once per run.
///
/// Cloning is cheap; every clone refers to the same gates, coordinator and
/// controller.
#[derive(Clone)]
pub struct AuthContext {
    storage: ClientStorage,
    store: SessionStore,
    auth_gate: Arc<ReadinessGate>,
    api_gate: Arc<ApiRequestGate>,
    coordinator: Arc<TokenRefreshCoordinator>,
    controller: Arc<AuthController>,
    timings: AuthTimings,
}

impl AuthContext {
    pub fn new(provider: Arc<dyn AuthProvider>, storage: ClientStorage, timings: AuthTimings) -> Self {
        let store = SessionStore::new(provider);
        let auth_gate = Arc::new(ReadinessGate::new("auth"));

        let gate_config = ApiGateConfig {
            fallback: timings.api_gate_fallback(),
            reset_fallback: timings.api_gate_reset_fallback(),
            wait_timeout: timings.api_gate_wait_timeout(),
        };
        let hook_storage = storage.clone();
        let api_gate = Arc::new(ApiRequestGate::with_on_ready(
            auth_gate.clone(),
            gate_config,
            move |at| {
                if let Err(e) = hook_storage.set_timestamp(
                    StorageArea::Session,
                    StorageKeys::API_LOCK_READY_TIME,
                    at,
                ) {
                    warn!(error = %e, "Failed to record API gate release");
                }
            },
        ));

        let coordinator = Arc::new(TokenRefreshCoordinator::new(timings.refresh_wait_timeout()));
        let controller = AuthController::new(
            store.clone(),
            storage.clone(),
            auth_gate.clone(),
            api_gate.clone(),
            coordinator.clone(),
            timings.clone(),
        );

        Self {
            storage,
            store,
            auth_gate,
            api_gate,
            coordinator,
            controller,
            timings,
        }
    }

    /// Context over a Supabase project.
    pub fn supabase(
        supabase_url: Url,
        anon_key: &str,
        storage: ClientStorage,
        timings: AuthTimings,
    ) -> AuthResult<Self> {
        let provider = SupabaseAuthProvider::new(supabase_url, anon_key, storage.clone())?;
        Ok(Self::new(Arc::new(provider), storage, timings))
    }

    /// Context over an in-memory provider and in-memory storage.
    pub fn in_memory(timings: AuthTimings) -> (Self, Arc<InMemoryAuthProvider>) {
        let storage = ClientStorage::in_memory();
        let provider = Arc::new(InMemoryAuthProvider::new(storage.clone()));
        let context = Self::new(provider.clone(), storage, timings);
        (context, provider)
    }

    pub fn storage(&self) -> &ClientStorage {
        &self.storage
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn auth_gate(&self) -> &Arc<ReadinessGate> {
        &self.auth_gate
    }

    pub fn api_gate(&self) -> &Arc<ApiRequestGate> {
        &self.api_gate
    }

    pub fn coordinator(&self) -> &Arc<TokenRefreshCoordinator> {
        &self.coordinator
    }

    pub fn controller(&self) -> &Arc<AuthController> {
        &self.controller
    }

    pub fn timings(&self) -> &AuthTimings {
        &self.timings
    }

    pub fn start(&self) {
        self.controller.start();
    }

    pub fn shutdown(&self) {
        self.controller.shutdown();
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("phase", &self.controller.phase())
            .field("auth_ready", &self.auth_gate.is_ready())
            .field("api_ready", &self.api_gate.is_ready())
            .finish_non_exhaustive()
    }
}
