//! Repair record across watchdog instances.

use super::harness::TestHarness;
use crate::{RepairRecord, RepairStage};
use client_storage::{StorageArea, StorageKeys};

async fn exhausted_harness() -> TestHarness {
    let harness = TestHarness::unfixable().with_session("u1", 3600);
    harness.start().await;
    harness.lose_provider_session();
    let watchdog = harness.watchdog();
    watchdog.check_once().await;
    watchdog.check_once().await;
    harness
}

#[tokio::test(start_paused = true)]
async fn record_survives_intentional_reload() {
    let harness = exhausted_harness().await;
    let storage = harness.context.storage();

    let after_reload = harness.watchdog();

    let record = after_reload.record();
    assert_eq!(record.attempts, RepairRecord::MAX_ATTEMPTS);
    assert_eq!(record.stage, RepairStage::Reloaded);
    assert!(!storage
        .flag(StorageArea::Session, StorageKeys::INTENTIONAL_AUTH_RELOAD)
        .unwrap());

    // The resumed ladder has nothing automated left.
    after_reload.check_once().await;
    assert_eq!(harness.navigator.reloads(), 1);
    assert!(after_reload.banner().is_some());
}

#[tokio::test(start_paused = true)]
async fn record_reset_without_marker() {
    let harness = exhausted_harness().await;
    let storage = harness.context.storage();

    // First instance consumes the marker, the second starts over.
    harness.watchdog();
    let fresh = harness.watchdog();

    assert!(fresh.record().is_clean());
    assert!(storage
        .session()
        .get(StorageKeys::WATCHDOG_REPAIR_RECORD)
        .unwrap()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn unreadable_record_treated_as_fresh() {
    let harness = TestHarness::new();
    let storage = harness.context.storage();
    storage
        .session()
        .set(StorageKeys::WATCHDOG_REPAIR_RECORD, "{not json")
        .unwrap();
    storage
        .set_flag(StorageArea::Session, StorageKeys::INTENTIONAL_AUTH_RELOAD)
        .unwrap();

    assert!(harness.watchdog().record().is_clean());
}

#[tokio::test(start_paused = true)]
async fn record_stored_as_single_json_value() {
    let harness = exhausted_harness().await;

    let raw = harness
        .context
        .storage()
        .session()
        .get(StorageKeys::WATCHDOG_REPAIR_RECORD)
        .unwrap()
        .expect("record persisted");
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

    assert_eq!(value["attempts"], 2);
    assert_eq!(value["stage"], "reloaded");
    assert_eq!(value["reload_attempted"], true);
}
