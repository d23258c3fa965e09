//! Roblox client cache discovery and enumeration.
//!
//! The client keeps its HTTP cache in one of two shapes:
//!
//! - a SQLite database (`rbx-storage.db`) whose `files` table maps content
//!   ids to either inline blobs or files in a sibling `rbx-storage/`
//!   two-level tree, or
//! - a flat directory of cache files named by hash (the UWP client and the
//!   temp-directory fallback).
//!
//! [`CacheScanner`] enumerates whichever backend is present and falls back
//! from a damaged database to the best available flat directory, wiping its
//! dedup state first so no database-era identity masks a file.
//!
//! # Example
//!
//! ```rust,ignore
//! use bloxtract_storage::CacheScanner;
//!
//! let scanner = CacheScanner::detect();
//! for entry in scanner.scan() {
//!     println!("{} ({} bytes inline)", entry.identity, entry.inline_len());
//! }
//! ```

#![warn(missing_docs)]

pub mod paths;
pub mod scanner;

mod db;

pub use paths::{CacheLocation, ScanBackend};
pub use scanner::{CacheEntry, CacheScanner, EntryPayload};

use std::path::PathBuf;
use thiserror::Error;

/// Result type for scanner operations
pub type Result<T> = std::result::Result<T, ScanError>;

/// Errors that can occur while scanning the cache
#[derive(Debug, Error)]
pub enum ScanError {
    /// I/O error occurred
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite-level failure (locked, corrupt, unreadable)
    #[error("cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The database opened but has no `files` table
    #[error("cache database has no files table")]
    MissingFilesTable,

    /// No usable cache path exists at all
    #[error("cache path unavailable: {0}")]
    CachePathUnavailable(PathBuf),
}
