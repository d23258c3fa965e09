//! Per-kind asset processors.
//!
//! Processors implement one capability: consume an identified payload and
//! report a terminal [`Outcome`]. They are passive; the orchestrator owns
//! all worker spawning. Shared dedup state reaches a processor through a
//! [`WorkerContext`], which comes in two flavors matching the execution
//! model: a shared view locking the common history, or an isolated view
//! over an immutable snapshot that accumulates deltas for a post-join
//! merge.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;

use bloxtract_formats::AssetKind;
use bloxtract_history::{
    AssetClass, ContentHashCache, Counter, ExtractionHistory, HistoryDeltas, HistorySnapshot,
    ProcessingStats,
};
use bloxtract_storage::{CacheEntry, EntryPayload};

use crate::Result;
use crate::cancel::CancelToken;

pub mod audio;
pub mod font;
pub mod image;
pub mod translation;
pub mod video;

pub use audio::AudioProcessor;
pub use font::FontProcessor;
pub use image::ImageProcessor;
pub use translation::TranslationProcessor;
pub use video::VideoProcessor;

/// Terminal state of one consumed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// An output file was produced
    Processed,
    /// The payload repeated within this run
    Duplicate,
    /// History already knew the entry
    AlreadyKnown,
    /// The payload was recognized but deliberately dropped
    Ignored,
    /// Nothing applied (wrong kind, unresolvable payload)
    Skipped,
}

/// Identity information for one cache entry, computed once by the worker.
#[derive(Debug, Clone)]
pub struct EntryContext {
    /// Scanner identity (hex hash or file name); used as the dump name
    pub identity: String,
    /// On-disk source, when the entry was not inline
    pub source_path: Option<PathBuf>,
    /// Source fingerprint: md5 over path, size and mtime for on-disk
    /// entries, md5 over the identity otherwise
    pub fingerprint: String,
}

impl EntryContext {
    /// Build the context for a scanned entry.
    pub fn for_entry(entry: &CacheEntry) -> Self {
        let source_path = entry.source_path().cloned();
        let fingerprint = match &entry.payload {
            EntryPayload::OnDisk(path) => fingerprint_path(path),
            EntryPayload::Inline(_) => hex_md5(entry.identity.as_bytes()),
        };
        Self {
            identity: entry.identity.clone(),
            source_path,
            fingerprint,
        }
    }

    /// First eight characters of the identity, used in output file names.
    pub fn dump_prefix(&self) -> &str {
        let end = self
            .identity
            .char_indices()
            .nth(8)
            .map_or(self.identity.len(), |(i, _)| i);
        &self.identity[..end]
    }
}

/// Legacy source fingerprint: the file path combined with its size and
/// mtime. Touching a cache file re-admits it; the content hash cache
/// catches the repeat.
fn fingerprint_path(path: &std::path::Path) -> String {
    match std::fs::metadata(path) {
        Ok(metadata) => {
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_secs());
            hex_md5(format!("{}_{}_{}", path.display(), metadata.len(), mtime).as_bytes())
        }
        Err(_) => hex_md5(path.display().to_string().as_bytes()),
    }
}

/// Hex-encoded MD5 digest.
pub fn hex_md5(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// History bucket an asset kind deduplicates against.
pub fn history_class(kind: AssetKind) -> AssetClass {
    match kind {
        AssetKind::Audio(_) => AssetClass::Audio,
        AssetKind::FontList => AssetClass::Font,
        AssetKind::Image(_) => AssetClass::Image,
        AssetKind::KtxTexture => AssetClass::Texture,
        AssetKind::RbxmModel | AssetKind::Mesh => AssetClass::Model,
        AssetKind::Translation => AssetClass::Translation,
        AssetKind::HlsPlaylist => AssetClass::Video,
        AssetKind::Ignored(_) | AssetKind::Unknown => AssetClass::Other,
    }
}

enum HistoryView {
    Shared(Arc<ExtractionHistory>),
    Snapshot(Arc<HistorySnapshot>),
}

/// Per-worker handle to the dedup state, counters and the cancel token.
pub struct WorkerContext {
    history: HistoryView,
    deltas: HistoryDeltas,
    local_identities: HashSet<(AssetClass, String)>,
    local_contents: HashSet<(AssetClass, String)>,
    /// Per-run payload hash cache, shared across workers
    pub hash_cache: Arc<ContentHashCache>,
    /// Counter sink; worker-local in snapshot mode
    pub stats: Arc<ProcessingStats>,
    /// Cooperative cancellation signal
    pub cancel: CancelToken,
}

impl WorkerContext {
    /// Context locking the shared history directly (threaded model).
    pub fn shared(
        history: Arc<ExtractionHistory>,
        hash_cache: Arc<ContentHashCache>,
        stats: Arc<ProcessingStats>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            history: HistoryView::Shared(history),
            deltas: HistoryDeltas::default(),
            local_identities: HashSet::new(),
            local_contents: HashSet::new(),
            hash_cache,
            stats,
            cancel,
        }
    }

    /// Context over an immutable snapshot (process-pool model); new hashes
    /// accumulate as deltas and counters into a worker-local set.
    pub fn isolated(
        snapshot: Arc<HistorySnapshot>,
        hash_cache: Arc<ContentHashCache>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            history: HistoryView::Snapshot(snapshot),
            deltas: HistoryDeltas::default(),
            local_identities: HashSet::new(),
            local_contents: HashSet::new(),
            hash_cache,
            stats: Arc::new(ProcessingStats::new()),
            cancel,
        }
    }

    /// Membership test against the history plus this worker's additions.
    pub fn is_processed(&self, identity: &str, class: AssetClass) -> bool {
        let known = match &self.history {
            HistoryView::Shared(history) => history.is_processed(identity, class),
            HistoryView::Snapshot(snapshot) => snapshot.is_processed(identity, class),
        };
        known || self
            .local_identities
            .contains(&(class, identity.to_string()))
    }

    /// Content-side membership test.
    pub fn is_content_processed(&self, content: &str, class: AssetClass) -> bool {
        let known = match &self.history {
            HistoryView::Shared(history) => history.is_content_processed(content, class),
            HistoryView::Snapshot(snapshot) => snapshot.is_content_processed(content, class),
        };
        known || self.local_contents.contains(&(class, content.to_string()))
    }

    /// Record a freshly processed identity. Identities embedding a content
    /// digest mark the content side too, matching the shared store.
    pub fn record(&mut self, identity: &str, class: AssetClass) {
        match &self.history {
            HistoryView::Shared(history) => history.add(identity, class),
            HistoryView::Snapshot(_) => {
                if self
                    .local_identities
                    .insert((class, identity.to_string()))
                {
                    if let Some(content) = bloxtract_history::embedded_content_hash(identity) {
                        self.local_contents.insert((class, content.to_string()));
                    }
                    self.deltas.push_identity(class, identity);
                }
            }
        }
    }

    /// Record a freshly seen content hash.
    pub fn record_content(&mut self, content: &str, class: AssetClass) {
        match &self.history {
            HistoryView::Shared(history) => history.add_content(content, class),
            HistoryView::Snapshot(_) => {
                if self.local_contents.insert((class, content.to_string())) {
                    self.deltas.push_content(class, content);
                }
            }
        }
    }

    /// Increment one counter.
    #[inline]
    pub fn increment(&self, counter: Counter) {
        self.stats.increment(counter);
    }

    /// Whether cancellation was signalled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Hand back the accumulated deltas (snapshot mode).
    pub fn take_deltas(&mut self) -> HistoryDeltas {
        std::mem::take(&mut self.deltas)
    }
}

/// Capability every processor implements.
#[async_trait]
pub trait AssetProcessor: Send + Sync {
    /// Whether this processor consumes payloads of `kind`.
    fn accepts(&self, kind: AssetKind) -> bool;

    /// Consume one identified payload. Per-entry failures return an error
    /// and are contained by the orchestrator.
    async fn consume(
        &self,
        entry: &EntryContext,
        body: Vec<u8>,
        kind: AssetKind,
        ctx: &mut WorkerContext,
    ) -> Result<Outcome>;
}
