//! Background refresh timing and retry.

use super::harness::{session, settle, TestHarness};
use session_store::{AuthChangeEvent, RefreshBehavior};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn scheduled_refresh_fires_at_quarter_of_lifetime() {
    let harness = TestHarness::new().with_session("u1", 3600);
    harness.start().await;

    tokio::time::sleep(Duration::from_secs(898)).await;
    assert_eq!(harness.provider.refresh_calls(), 0);

    tokio::time::sleep(Duration::from_secs(3)).await;
    settle().await;
    assert_eq!(harness.provider.refresh_calls(), 1);

    // The rotated session is in place and the next refresh is armed.
    let controller = harness.controller();
    let snapshot = controller.snapshot();
    assert_eq!(
        snapshot.session.map(|s| s.access_token).as_deref(),
        Some("u1-r1")
    );
    assert!(controller.scheduled_refresh_in().is_some());
}

#[tokio::test(start_paused = true)]
async fn short_sessions_use_the_floor() {
    let harness = TestHarness::new().with_session("u1", 600);
    harness.start().await;

    assert_eq!(
        harness.controller().scheduled_refresh_in(),
        Some(Duration::from_secs(300))
    );

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(harness.provider.refresh_calls(), 0);
    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(harness.provider.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_scheduled_refresh_retries_while_session_valid() {
    let harness = TestHarness::new().with_session("u1", 3600);
    harness
        .provider
        .set_refresh_behavior(RefreshBehavior::NetworkError);
    harness.start().await;
    let controller = harness.controller();

    tokio::time::sleep(Duration::from_secs(901)).await;
    settle().await;
    assert_eq!(harness.provider.refresh_calls(), 1);
    assert_eq!(
        controller.scheduled_refresh_in(),
        Some(Duration::from_secs(30))
    );
    // The old session is kept.
    assert!(controller.is_authenticated());

    tokio::time::sleep(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(harness.provider.refresh_calls(), 2);

    harness
        .provider
        .set_refresh_behavior(RefreshBehavior::Rotate { lifetime_secs: 3600 });
    tokio::time::sleep(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(harness.provider.refresh_calls(), 3);

    let delay = controller.scheduled_refresh_in().expect("refresh rescheduled");
    assert!(delay >= Duration::from_secs(899));
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_of_expired_session_is_not_retried() {
    let harness = TestHarness::new().with_session("u1", -10);
    harness.provider.set_refresh_behavior(RefreshBehavior::Reject);
    harness.start().await;

    tokio::time::sleep(Duration::from_secs(301)).await;
    settle().await;
    assert_eq!(harness.provider.refresh_calls(), 1);
    assert!(harness.controller().scheduled_refresh_in().is_none());

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(harness.provider.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn sign_out_cancels_scheduled_refresh() {
    let harness = TestHarness::new().with_session("u1", 3600);
    harness.start().await;
    assert!(harness.controller().scheduled_refresh_in().is_some());

    harness.provider.emit(AuthChangeEvent::SignedOut, None);
    settle().await;

    assert!(harness.controller().scheduled_refresh_in().is_none());
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(harness.provider.refresh_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn new_session_replaces_pending_timer() {
    let harness = TestHarness::new().with_session("u1", 3600);
    harness.start().await;

    harness
        .provider
        .emit(AuthChangeEvent::TokenRefreshed, Some(session("u1", 600)));
    settle().await;

    assert_eq!(
        harness.controller().scheduled_refresh_in(),
        Some(Duration::from_secs(300))
    );
    tokio::time::sleep(Duration::from_secs(301)).await;
    settle().await;
    assert_eq!(harness.provider.refresh_calls(), 1);
}
