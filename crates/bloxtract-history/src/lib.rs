//! Dedup state for the extraction engine.
//!
//! Three pieces of shared state keep repeated extraction runs from writing
//! the same asset twice:
//!
//! - [`ExtractionHistory`] — persistent, per-asset-class identity and
//!   content hash sets, stored as JSON in the user's home directory
//! - [`ContentHashCache`] — ephemeral per-run payload hash set
//! - [`ProcessingStats`] — atomic counters snapshotted into the final
//!   extraction report
//!
//! History and hash cache are mutex-guarded and shared by reference across
//! workers; counters are lock-free atomics.

#![warn(missing_docs)]

pub mod hash_cache;
pub mod history;
pub mod stats;

pub use hash_cache::ContentHashCache;
pub use history::{
    AssetClass, ExtractionHistory, HistoryDeltas, HistorySnapshot, embedded_content_hash,
};
pub use stats::{Counter, ProcessingStats, StatsSnapshot};

use std::path::PathBuf;
use thiserror::Error;

/// Result type for history operations
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Errors that can occur while loading or saving history state
#[derive(Debug, Error)]
pub enum HistoryError {
    /// I/O error occurred
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The history file held unparseable JSON
    #[error("malformed history file: {0}")]
    Json(#[from] serde_json::Error),

    /// Both the history file and its backup failed to load
    #[error("history file {path} is corrupt and no usable backup exists")]
    Corrupt {
        /// Location of the unusable history file
        path: PathBuf,
    },

    /// The requested asset class name is not recognized
    #[error("unknown asset class: {0}")]
    UnknownClass(String),
}
