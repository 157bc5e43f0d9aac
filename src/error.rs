//! Error types for the store and session subsystems.
//!
//! Absence is never an error: `get` returns `None` and `delete` is a no-op
//! for missing records. `Initialization` is fatal to all store operations
//! until a retry succeeds; `Transaction` is local to one operation and
//! leaves the store usable.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the local persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store initialization failed: {0}")]
    Initialization(String),

    #[error("SQLite error: {0}")]
    Transaction(#[from] rusqlite::Error),

    #[error("failed to encode embedded snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("record has no identifier; identifiers are assigned by the store")]
    MissingId,

    #[error("home directory not found")]
    HomeDirNotFound,

    #[error("failed to create data directory: {0}")]
    CreateDir(std::io::Error),
}

/// Errors from the session metadata slot.
///
/// Only writes surface errors; a missing or malformed slot reads as "no
/// prior session".
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to write session slot {path}: {source}")]
    SlotWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize session record: {0}")]
    SlotEncode(#[from] serde_json::Error),
}
