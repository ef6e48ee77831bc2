//! Scenario tests for the backend client.
//!
//! - `harness.rs`   - Auth context, scripted transport and client wiring
//! - `http.rs`      - Gate waiting, bearer tokens and HTTP-level retries
//! - `assistant.rs` - Summarize/ask flows and their notices
