//! Scenario tests for the consistency watchdog.
//!
//! - `harness.rs`     - Started auth context plus watchdog over in-memory parts
//! - `ladder.rs`      - Detection and the bounded repair ladder
//! - `persistence.rs` - Repair record across watchdog instances
//! - `manual_fix.rs`  - Banner dismissal and "Fix Now"
//! - `run_loop.rs`    - Background check cadence

pub(crate) mod harness;
mod persistence;
mod run_loop;
