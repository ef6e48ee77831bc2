//! Background check cadence.

use super::harness::{session, settle, TestHarness};
use crate::RepairStage;
use session_store::AuthChangeEvent;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn checks_immediately_then_after_recheck_delay() {
    let harness = TestHarness::unfixable().with_session("u1", 3600);
    harness.start().await;
    harness.lose_provider_session();
    let watchdog = harness.watchdog();

    watchdog.start();
    settle().await;
    assert_eq!(watchdog.record().stage, RepairStage::StateRefreshed);
    assert_eq!(harness.navigator.reloads(), 0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(watchdog.record().stage, RepairStage::Reloaded);
    assert_eq!(harness.navigator.reloads(), 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(watchdog.record().stage, RepairStage::Exhausted);
    assert!(watchdog.banner().is_some());

    watchdog.stop();
}

#[tokio::test(start_paused = true)]
async fn snapshot_change_triggers_check() {
    let harness = TestHarness::unfixable();
    harness.start().await;
    let watchdog = harness.watchdog();
    watchdog.start();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(watchdog.record().is_clean());

    // The controller applies the event's session after the provider has
    // already dropped it again.
    harness
        .provider
        .emit(AuthChangeEvent::SignedIn, Some(session("u1", 3600)));
    harness.lose_provider_session();
    settle().await;
    settle().await;

    assert!(harness.context.controller().is_authenticated());
    assert_eq!(watchdog.record().stage, RepairStage::StateRefreshed);
    watchdog.stop();
}

#[tokio::test(start_paused = true)]
async fn stopped_watchdog_no_longer_checks() {
    let harness = TestHarness::unfixable().with_session("u1", 3600);
    harness.start().await;
    let watchdog = harness.watchdog();
    watchdog.start();
    tokio::time::sleep(Duration::from_secs(2)).await;
    watchdog.stop();

    harness.lose_provider_session();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert!(watchdog.record().is_clean());
    assert_eq!(harness.navigator.reloads(), 0);
}
