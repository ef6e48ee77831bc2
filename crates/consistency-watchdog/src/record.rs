//! Persisted repair bookkeeping.

use chrono::{DateTime, Utc};
use client_storage::{ClientStorage, StorageArea, StorageKeys, StorageResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Where the repair ladder stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStage {
    #[default]
    Idle,
    StateRefreshed,
    Reloaded,
    Exhausted,
}

/// The next rung of the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStep {
    RefreshState,
    Reload,
    GiveUp,
}

/// Every piece of repair state, stored as one JSON value in the session
/// area and always read and written whole.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairRecord {
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub stage: RepairStage,
    pub auto_fix_attempted: bool,
    pub reload_attempted: bool,
}

impl RepairRecord {
    pub const MAX_ATTEMPTS: u32 = 2;

    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }

    pub fn next_step(&self) -> RepairStep {
        if self.attempts >= Self::MAX_ATTEMPTS {
            RepairStep::GiveUp
        } else if !self.auto_fix_attempted {
            RepairStep::RefreshState
        } else if !self.reload_attempted {
            RepairStep::Reload
        } else {
            RepairStep::GiveUp
        }
    }

    /// Count an attempt at `step`. Giving up only moves the stage.
    pub fn record(&mut self, step: RepairStep, now: DateTime<Utc>) {
        match step {
            RepairStep::RefreshState => {
                self.attempts += 1;
                self.auto_fix_attempted = true;
                self.stage = RepairStage::StateRefreshed;
                self.last_attempt_at = Some(now);
            }
            RepairStep::Reload => {
                self.attempts += 1;
                self.reload_attempted = true;
                self.stage = RepairStage::Reloaded;
                self.last_attempt_at = Some(now);
            }
            RepairStep::GiveUp => self.stage = RepairStage::Exhausted,
        }
    }

    /// Read the stored record; anything unreadable counts as a fresh one.
    pub fn load(storage: &ClientStorage) -> Self {
        match storage.read_json::<Self>(StorageArea::Session, StorageKeys::WATCHDOG_REPAIR_RECORD) {
            Ok(record) => record.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable repair record");
                Self::default()
            }
        }
    }

    pub fn save(&self, storage: &ClientStorage) -> StorageResult<()> {
        if self.is_clean() {
            storage
                .session()
                .delete(StorageKeys::WATCHDOG_REPAIR_RECORD)
                .map(|_| ())
        } else {
            storage.write_json(StorageArea::Session, StorageKeys::WATCHDOG_REPAIR_RECORD, self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_order() {
        let now = Utc::now();
        let mut record = RepairRecord::default();
        assert_eq!(record.next_step(), RepairStep::RefreshState);

        record.record(RepairStep::RefreshState, now);
        assert_eq!(record.next_step(), RepairStep::Reload);

        record.record(RepairStep::Reload, now);
        assert_eq!(record.attempts, RepairRecord::MAX_ATTEMPTS);
        assert_eq!(record.next_step(), RepairStep::GiveUp);

        record.record(RepairStep::GiveUp, now);
        assert_eq!(record.stage, RepairStage::Exhausted);
        assert_eq!(record.attempts, 2);
    }

    #[test]
    fn test_attempt_cap_wins_over_latches() {
        let record = RepairRecord {
            attempts: 2,
            ..RepairRecord::default()
        };
        assert_eq!(record.next_step(), RepairStep::GiveUp);
    }

    #[test]
    fn test_save_and_load_whole_record() {
        let storage = ClientStorage::in_memory();
        let mut record = RepairRecord::default();
        record.record(RepairStep::RefreshState, Utc::now());

        record.save(&storage).unwrap();
        assert_eq!(RepairRecord::load(&storage), record);

        RepairRecord::default().save(&storage).unwrap();
        assert!(!storage
            .session()
            .has(StorageKeys::WATCHDOG_REPAIR_RECORD)
            .unwrap());
    }

    #[test]
    fn test_unreadable_record_is_fresh() {
        let storage = ClientStorage::in_memory();
        storage
            .session()
            .set(StorageKeys::WATCHDOG_REPAIR_RECORD, "{not json")
            .unwrap();

        assert!(RepairRecord::load(&storage).is_clean());
    }

    #[test]
    fn test_serialized_shape() {
        let record = RepairRecord {
            attempts: 1,
            stage: RepairStage::StateRefreshed,
            auto_fix_attempted: true,
            ..RepairRecord::default()
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["attempts"], 1);
        assert_eq!(json["stage"], "state_refreshed");
        assert!(json["last_attempt_at"].is_null());
    }
}
