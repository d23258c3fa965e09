//! Cache entry enumeration with database-to-directory fallback.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::paths::{self, CacheLocation, ScanBackend};
use crate::{Result, ScanError, db};

/// Where an entry's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPayload {
    /// The database row embedded the content
    Inline(Vec<u8>),
    /// The content sits in a file on disk
    OnDisk(PathBuf),
}

/// One discovered cache item, owned by exactly one worker for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Stable per-source key: lowercase hex for database rows, the file
    /// name for flat-directory entries
    pub identity: String,
    /// Entry bytes or their on-disk location
    pub payload: EntryPayload,
}

impl CacheEntry {
    /// Read the entry body, consuming inline bytes without a copy.
    pub fn into_body(self) -> std::io::Result<Vec<u8>> {
        match self.payload {
            EntryPayload::Inline(bytes) => Ok(bytes),
            EntryPayload::OnDisk(path) => fs::read(path),
        }
    }

    /// On-disk location, when the entry is not inline.
    pub fn source_path(&self) -> Option<&PathBuf> {
        match &self.payload {
            EntryPayload::Inline(_) => None,
            EntryPayload::OnDisk(path) => Some(path),
        }
    }

    /// Inline byte count, zero for on-disk entries.
    pub fn inline_len(&self) -> usize {
        match &self.payload {
            EntryPayload::Inline(bytes) => bytes.len(),
            EntryPayload::OnDisk(_) => 0,
        }
    }
}

/// Scanner over one cache location.
///
/// Entries are deduplicated by identity across the scanner's lifetime, so
/// repeated [`CacheScanner::scan`] calls only yield items that appeared
/// since the previous pass. A database that fails its pre-health check (or
/// corrupts mid-scan) switches the scanner to the best flat-directory
/// candidate after wiping the dedup state; the switch is announced once.
#[derive(Debug)]
pub struct CacheScanner {
    location: Mutex<CacheLocation>,
    known_items: Mutex<HashSet<String>>,
    fallback_warned: AtomicBool,
}

impl CacheScanner {
    /// Scanner over the auto-detected default location.
    pub fn detect() -> Self {
        Self::with_location(paths::detect_default())
    }

    /// Scanner over a user-supplied path (database file, `rbx-storage`
    /// folder, or plain directory).
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self::with_location(paths::resolve_custom(&path.into()))
    }

    /// Scanner over an explicit location.
    pub fn with_location(location: CacheLocation) -> Self {
        Self {
            location: Mutex::new(location),
            known_items: Mutex::new(HashSet::new()),
            fallback_warned: AtomicBool::new(false),
        }
    }

    /// The location the scanner currently points at.
    pub fn location(&self) -> CacheLocation {
        self.location.lock().clone()
    }

    /// Point the scanner somewhere else, resetting the fallback warning.
    pub fn set_location(&self, location: CacheLocation) {
        *self.location.lock() = location;
        self.fallback_warned.store(false, Ordering::Relaxed);
    }

    /// Forget every known identity.
    pub fn clear_known(&self) {
        self.known_items.lock().clear();
    }

    /// Number of identities seen so far.
    pub fn known_count(&self) -> usize {
        self.known_items.lock().len()
    }

    /// Enumerate new entries.
    ///
    /// Catastrophic failures (no usable path at all) return an empty list;
    /// single-row failures are logged and skipped.
    pub fn scan(&self) -> Vec<CacheEntry> {
        self.scan_with(|_| {})
    }

    /// Enumerate new entries, invoking `callback` as each is found.
    pub fn scan_with(&self, mut callback: impl FnMut(&CacheEntry)) -> Vec<CacheEntry> {
        let location = self.location();
        if !location.is_valid() {
            tracing::warn!(path = %location.path.display(), "cache path unavailable");
            return Vec::new();
        }

        if location.backend == ScanBackend::Database {
            if let Err(err) = db::precheck(&location.path) {
                tracing::warn!(%err, "database pre-check failed, falling back to directory scan");
                self.fall_back(&location);
            }
        }

        // Re-read: the pre-check may have switched backends.
        let location = self.location();
        match location.backend {
            ScanBackend::Database => match self.scan_database(&location, &mut callback) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::error!(%err, "database scan failed, falling back to directory scan");
                    self.fall_back(&location);
                    let location = self.location();
                    self.scan_directory(&location, &mut callback)
                        .unwrap_or_default()
                }
            },
            ScanBackend::FileSystem => self
                .scan_directory(&location, &mut callback)
                .unwrap_or_default(),
        }
    }

    /// Switch to the best flat-directory candidate, wiping the dedup state
    /// so database-era identities cannot mask files found there.
    fn fall_back(&self, from: &CacheLocation) {
        if self.fallback_warned.swap(true, Ordering::Relaxed) {
            return;
        }

        self.clear_known();

        match paths::pick_fallback(&from.db_folder) {
            Some(dir) => {
                tracing::warn!(
                    from = %from.path.display(),
                    to = %dir.display(),
                    "cache database unusable, switched to directory scanning"
                );
                *self.location.lock() = CacheLocation::file_system(dir);
            }
            None => {
                tracing::warn!(
                    from = %from.path.display(),
                    "cache database unusable and no fallback directory exists"
                );
                *self.location.lock() = CacheLocation::file_system(PathBuf::new());
            }
        }
    }

    fn scan_database(
        &self,
        location: &CacheLocation,
        callback: &mut impl FnMut(&CacheEntry),
    ) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        let db_folder = location.db_folder.clone();

        db::scan_rows(&location.path, |row| {
            {
                let mut known = self.known_items.lock();
                if !known.insert(row.identity.clone()) {
                    return;
                }
            }

            let entry = if let Some(content) = row.content {
                CacheEntry {
                    identity: row.identity,
                    payload: EntryPayload::Inline(content),
                }
            } else {
                // Blob rows without inline content live in a two-level tree
                // keyed by the first identity byte.
                let shard = row.identity.get(..2).unwrap_or_default();
                let path = db_folder.join(shard).join(&row.identity);
                if !path.is_file() {
                    tracing::debug!(identity = %row.identity, "companion file missing, skipping row");
                    return;
                }
                CacheEntry {
                    identity: row.identity,
                    payload: EntryPayload::OnDisk(path),
                }
            };

            callback(&entry);
            entries.push(entry);
        })?;

        tracing::info!(count = entries.len(), "database scan complete");
        Ok(entries)
    }

    fn scan_directory(
        &self,
        location: &CacheLocation,
        callback: &mut impl FnMut(&CacheEntry),
    ) -> Result<Vec<CacheEntry>> {
        if !location.path.is_dir() {
            tracing::warn!(path = %location.path.display(), "cache directory does not exist");
            return Err(ScanError::CachePathUnavailable(location.path.clone()));
        }

        let mut entries = Vec::new();
        // Deliberately non-recursive: cache files sit directly in the
        // directory, subdirectories belong to other client machinery.
        for dir_entry in fs::read_dir(&location.path)? {
            let dir_entry = match dir_entry {
                Ok(e) => e,
                Err(err) => {
                    tracing::error!(%err, "unreadable directory entry, skipping");
                    continue;
                }
            };
            let path = dir_entry.path();
            if !path.is_file() {
                continue;
            }
            let identity = dir_entry.file_name().to_string_lossy().to_string();

            {
                let mut known = self.known_items.lock();
                if !known.insert(identity.clone()) {
                    continue;
                }
            }

            let entry = CacheEntry {
                identity,
                payload: EntryPayload::OnDisk(path),
            };
            callback(&entry);
            entries.push(entry);
        }

        tracing::info!(count = entries.len(), "directory scan complete");
        Ok(entries)
    }
}
