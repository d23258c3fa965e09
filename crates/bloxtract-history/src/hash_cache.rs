//! Per-run content hash cache.

use std::collections::HashSet;

use parking_lot::Mutex;

/// Ephemeral set of payload hashes seen during the current run.
///
/// Unlike [`crate::ExtractionHistory`] this cache never persists; it exists
/// to collapse identical payloads discovered under different identities
/// within a single extraction pass.
#[derive(Debug, Default)]
pub struct ContentHashCache {
    hashes: Mutex<HashSet<String>>,
}

impl ContentHashCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `hash`, reporting whether it was already present.
    pub fn is_duplicate(&self, hash: &str) -> bool {
        !self.hashes.lock().insert(hash.to_string())
    }

    /// Forget everything; called at run start.
    pub fn clear(&self) {
        self.hashes.lock().clear();
    }

    /// Number of distinct hashes seen so far.
    pub fn len(&self) -> usize {
        self.hashes.lock().len()
    }

    /// True when no hash has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.hashes.lock().is_empty()
    }
}
