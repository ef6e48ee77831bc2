//! Startup, readiness and init markers.

use super::harness::{settle, TestHarness};
use crate::AuthPhase;
use auth_gates::ReadinessOutcome;
use client_storage::{StorageArea, StorageKeys};
use std::time::Duration;
use tokio::time::Instant;

// =============================================================================
// Fresh load with a stored session
// =============================================================================

#[tokio::test(start_paused = true)]
async fn session_found_within_200ms_marks_ready_and_schedules_refresh() {
    let harness = TestHarness::new().with_session("u1", 3600);
    harness
        .provider
        .set_get_session_delay(Some(Duration::from_millis(200)));
    let controller = harness.controller();

    let started = Instant::now();
    harness.context.start();
    let outcome = controller.wait_for_auth_ready().await;

    assert_eq!(outcome, ReadinessOutcome::Ready);
    assert!(started.elapsed() <= Duration::from_millis(201));
    assert!(controller.is_auth_ready());
    assert!(controller.is_authenticated());
    assert_eq!(controller.phase(), AuthPhase::ReadyAuthenticated);

    let delay = controller.scheduled_refresh_in().expect("refresh scheduled");
    assert!(
        delay >= Duration::from_secs(899) && delay <= Duration::from_secs(900),
        "unexpected refresh delay {:?}",
        delay
    );
}

#[tokio::test(start_paused = true)]
async fn no_session_resolves_anonymous() {
    let harness = TestHarness::new();
    harness.start().await;
    let controller = harness.controller();

    assert!(controller.is_auth_ready());
    assert!(!controller.is_authenticated());
    assert_eq!(controller.phase(), AuthPhase::ReadyAnonymous);
    assert!(controller.scheduled_refresh_in().is_none());
    assert!(harness.context.api_gate().is_ready());
}

// =============================================================================
// Hanging provider
// =============================================================================

#[tokio::test(start_paused = true)]
async fn hanging_provider_resolves_anonymous_after_init_budget() {
    let harness = TestHarness::new().with_session("u1", 3600);
    harness.provider.set_get_session_hangs(true);
    let controller = harness.controller();

    let started = Instant::now();
    harness.context.start();

    // The bounded wait gives up first and forces the gate.
    let outcome = controller.wait_for_auth_ready().await;
    assert_eq!(outcome, ReadinessOutcome::ForcedTimeout);
    assert_eq!(started.elapsed(), Duration::from_secs(5));
    assert!(!controller.is_auth_ready());

    tokio::time::sleep(Duration::from_secs(3)).await;
    settle().await;

    assert!(controller.is_auth_ready());
    assert!(!controller.is_authenticated());
    assert_eq!(controller.phase(), AuthPhase::ReadyAnonymous);

    let duration = harness
        .context
        .storage()
        .session()
        .get(StorageKeys::AUTH_INIT_DURATION)
        .unwrap();
    assert_eq!(duration.as_deref(), Some("8000"));
}

// =============================================================================
// Idempotent readiness
// =============================================================================

#[tokio::test(start_paused = true)]
async fn mark_auth_ready_after_first_call_changes_nothing() {
    let harness = TestHarness::new().with_session("u1", 3600);
    harness.start().await;
    let controller = harness.controller();
    let storage = harness.context.storage();

    let complete_at = storage
        .timestamp(StorageArea::Session, StorageKeys::AUTH_INIT_COMPLETE)
        .unwrap();
    let api_ready_at = harness.context.api_gate().ready_at();
    let snapshot = controller.snapshot();
    let mut changes = controller.subscribe();
    changes.borrow_and_update();

    for _ in 0..5 {
        assert!(!controller.mark_auth_ready());
    }

    assert!(!changes.has_changed().unwrap());
    assert_eq!(controller.snapshot(), snapshot);
    assert_eq!(harness.context.api_gate().ready_at(), api_ready_at);
    assert_eq!(
        storage
            .timestamp(StorageArea::Session, StorageKeys::AUTH_INIT_COMPLETE)
            .unwrap(),
        complete_at
    );
    assert_eq!(
        controller.wait_for_auth_ready().await,
        ReadinessOutcome::AlreadyReady
    );
}

#[tokio::test(start_paused = true)]
async fn start_persists_markers_once() {
    let harness = TestHarness::new();
    harness.start().await;
    harness.start().await;
    let storage = harness.context.storage();

    assert_eq!(harness.provider.get_session_calls(), 1);
    for key in [
        StorageKeys::AUTH_INIT_START,
        StorageKeys::AUTH_INIT_COMPLETE,
        StorageKeys::API_LOCK_READY_TIME,
    ] {
        assert!(
            storage.timestamp(StorageArea::Session, key).unwrap().is_some(),
            "missing {}",
            key
        );
    }
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_background_work() {
    let harness = TestHarness::new().with_session("u1", 3600);
    harness.start().await;
    let controller = harness.controller();
    assert!(controller.scheduled_refresh_in().is_some());

    harness.context.shutdown();
    assert!(controller.scheduled_refresh_in().is_none());

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(harness.provider.refresh_calls(), 0);
}
