//! Consistency watchdog for the summarizer client.
//!
//! Periodically compares what the [`AuthController`] believes, what the
//! session store reports and what is persisted, then walks a short repair
//! ladder:
//!
//! 1. Clear stuck flags and refresh auth state
//! 2. Request one reload, marked as intentional
//! 3. Give up and show a [`MismatchBanner`] with a manual fix
//!
//! The ladder's progress is one [`RepairRecord`] in session storage, so it
//! survives the reload it triggers.
//!
//! [`AuthController`]: auth_state_controller::AuthController

mod mismatch;
mod record;
mod watchdog;

#[cfg(test)]
mod tests;

pub use mismatch::{ConsistencyReport, MismatchKind};
pub use record::{RepairRecord, RepairStage, RepairStep};
pub use watchdog::{CheckOutcome, ConsistencyWatchdog, FixOutcome, MismatchBanner, WatchdogConfig};
