//! Key/value storage for the summarizer client.
//!
//! The web client kept its auth bookkeeping in two browser stores, one that
//! survives restarts and one scoped to the tab session. This crate models both
//! as [`KeyValueStore`] backends grouped by [`ClientStorage`]:
//!
//! - **Memory**: [`MemoryStorage`], used by tests and offline runs
//! - **File**: [`FileStorage`], one JSON object per area under the state dir

mod client;
mod file;
mod keys;
mod memory;
mod traits;

pub use client::{ClientStorage, StorageArea};
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::KeyValueStore;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Stored value could not be interpreted
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
