//! Persistent extraction history.
//!
//! The history file maps each asset class to two sets: identity hashes
//! (stable per-source keys) and content hashes (payload digests). The
//! structured on-disk form is
//!
//! ```json
//! { "records": { "audio": { "file_hashes": [...], "content_hashes": [...] } },
//!   "hashes": [...], "content_hashes": [...] }
//! ```
//!
//! where the top-level `hashes`/`content_hashes` arrays mirror the audio
//! bucket for older releases that only understood a single flat set. A file
//! holding only the flat arrays is migrated into the audio bucket on first
//! load. Saves go through a temporary file plus rename, keeping the previous
//! file as a `.bak` rotation.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{HistoryError, Result};

/// Default history location under the user's home directory.
const HISTORY_DIR: &str = ".roblox_audio_extractor";
const HISTORY_FILE: &str = "extracted_history.json";

/// Asset classes tracked independently in the history file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetClass {
    /// Extracted audio payloads
    Audio,
    /// Downloaded font faces
    Font,
    /// Raster images
    Image,
    /// KTX textures
    Texture,
    /// Model documents
    Model,
    /// Translation documents
    Translation,
    /// Assembled videos
    Video,
    /// Anything else
    Other,
}

impl AssetClass {
    /// Every class, in on-disk order.
    pub const ALL: [Self; 8] = [
        Self::Audio,
        Self::Font,
        Self::Image,
        Self::Texture,
        Self::Model,
        Self::Translation,
        Self::Video,
        Self::Other,
    ];

    /// On-disk bucket name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Font => "font",
            Self::Image => "image",
            Self::Texture => "texture",
            Self::Model => "model",
            Self::Translation => "translation",
            Self::Video => "video",
            Self::Other => "other",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Audio => 0,
            Self::Font => 1,
            Self::Image => 2,
            Self::Texture => 3,
            Self::Model => 4,
            Self::Translation => 5,
            Self::Video => 6,
            Self::Other => 7,
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "audio" => Ok(Self::Audio),
            "font" => Ok(Self::Font),
            "image" => Ok(Self::Image),
            "texture" => Ok(Self::Texture),
            "model" => Ok(Self::Model),
            "translation" => Ok(Self::Translation),
            "video" => Ok(Self::Video),
            "other" => Ok(Self::Other),
            other => Err(HistoryError::UnknownClass(other.to_string())),
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Bucket {
    identities: HashSet<String>,
    contents: HashSet<String>,
}

#[derive(Debug, Default)]
struct Inner {
    buckets: [Bucket; 8],
    dirty: bool,
}

/// On-disk representation.
#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    records: BTreeMap<String, RecordEntry>,
    #[serde(default)]
    hashes: Vec<String>,
    #[serde(default)]
    content_hashes: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordEntry {
    #[serde(default)]
    file_hashes: Vec<String>,
    #[serde(default)]
    content_hashes: Vec<String>,
}

/// Persistent cross-run dedup store, shared by reference between workers.
#[derive(Debug)]
pub struct ExtractionHistory {
    path: PathBuf,
    inner: Mutex<Inner>,
}

/// Immutable copy of the history sets handed to snapshot-isolated workers.
#[derive(Debug, Clone, Default)]
pub struct HistorySnapshot {
    buckets: Vec<(AssetClass, HashSet<String>, HashSet<String>)>,
}

impl HistorySnapshot {
    /// Membership test on the identity side.
    pub fn is_processed(&self, identity: &str, class: AssetClass) -> bool {
        self.buckets
            .iter()
            .any(|(c, identities, _)| *c == class && identities.contains(identity))
    }

    /// Membership test on the content side.
    pub fn is_content_processed(&self, content: &str, class: AssetClass) -> bool {
        self.buckets
            .iter()
            .any(|(c, _, contents)| *c == class && contents.contains(content))
    }
}

/// New hashes produced by one snapshot-isolated worker, merged back into the
/// shared history after the pool drains.
#[derive(Debug, Clone, Default)]
pub struct HistoryDeltas {
    /// Newly recorded identities per class
    pub identities: Vec<(AssetClass, String)>,
    /// Newly recorded content hashes per class
    pub contents: Vec<(AssetClass, String)>,
}

impl HistoryDeltas {
    /// Record a fresh identity.
    pub fn push_identity(&mut self, class: AssetClass, identity: impl Into<String>) {
        self.identities.push((class, identity.into()));
    }

    /// Record a fresh content hash.
    pub fn push_content(&mut self, class: AssetClass, content: impl Into<String>) {
        self.contents.push((class, content.into()));
    }

    /// True when the worker produced nothing new.
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty() && self.contents.is_empty()
    }
}

/// An identity of the form `{content}_{suffix}` embeds a content digest;
/// anything else (asset ids, plain digests) does not.
pub fn embedded_content_hash(identity: &str) -> Option<&str> {
    let (prefix, _) = identity.split_once('_')?;
    if prefix.len() >= 32 && prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(prefix)
    } else {
        None
    }
}

impl ExtractionHistory {
    /// Default history path: `~/.roblox_audio_extractor/extracted_history.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(HISTORY_DIR).join(HISTORY_FILE))
    }

    /// Open the history at `path`, loading existing state.
    ///
    /// A missing file yields an empty history. A structurally corrupt file
    /// falls back to the `.bak` rotation; if that also fails the error is
    /// surfaced and the caller must not write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let history = Self {
            inner: Mutex::new(Inner::default()),
            path,
        };
        history.load()?;
        Ok(history)
    }

    /// In-memory history for tests and one-shot runs.
    pub fn in_memory(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            path: path.into(),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        let mut os = self.path.clone().into_os_string();
        os.push(".bak");
        PathBuf::from(os)
    }

    fn load(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        match Self::read_file(&self.path) {
            Ok(file) => {
                self.apply_file(file);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "history file unreadable, trying backup");
                let backup = self.backup_path();
                match Self::read_file(&backup) {
                    Ok(file) => {
                        self.apply_file(file);
                        self.inner.lock().dirty = true;
                        Ok(())
                    }
                    Err(_) => Err(HistoryError::Corrupt {
                        path: self.path.clone(),
                    }),
                }
            }
        }
    }

    fn read_file(path: &Path) -> Result<HistoryFile> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn apply_file(&self, file: HistoryFile) {
        let mut inner = self.inner.lock();

        if file.records.is_empty() {
            // Legacy flat format: everything belonged to audio extraction.
            if !file.hashes.is_empty() || !file.content_hashes.is_empty() {
                let audio = &mut inner.buckets[AssetClass::Audio.index()];
                audio.identities.extend(file.hashes);
                audio.contents.extend(file.content_hashes);
                inner.dirty = true;
                tracing::info!("migrated legacy history into the audio bucket");
            }
            return;
        }

        for (name, entry) in file.records {
            let class = AssetClass::from_str(&name).unwrap_or(AssetClass::Other);
            let bucket = &mut inner.buckets[class.index()];
            bucket.identities.extend(entry.file_hashes);
            bucket.contents.extend(entry.content_hashes);
        }
    }

    /// Record an identity for `class`. When the identity embeds a content
    /// digest (`{content}_{suffix}`), the digest is recorded too.
    pub fn add(&self, identity: &str, class: AssetClass) {
        let mut inner = self.inner.lock();
        let bucket = &mut inner.buckets[class.index()];
        if bucket.identities.insert(identity.to_string()) {
            if let Some(content) = embedded_content_hash(identity) {
                bucket.contents.insert(content.to_string());
            }
            inner.dirty = true;
        }
    }

    /// Record a bare content hash for `class`.
    pub fn add_content(&self, content: &str, class: AssetClass) {
        let mut inner = self.inner.lock();
        let bucket = &mut inner.buckets[class.index()];
        if bucket.contents.insert(content.to_string()) {
            inner.dirty = true;
        }
    }

    /// Membership test on the identity side.
    pub fn is_processed(&self, identity: &str, class: AssetClass) -> bool {
        self.inner.lock().buckets[class.index()]
            .identities
            .contains(identity)
    }

    /// Membership test on the content side.
    pub fn is_content_processed(&self, content: &str, class: AssetClass) -> bool {
        self.inner.lock().buckets[class.index()]
            .contents
            .contains(content)
    }

    /// Number of identities, for one class or in total.
    pub fn size(&self, class: Option<AssetClass>) -> usize {
        let inner = self.inner.lock();
        match class {
            Some(class) => inner.buckets[class.index()].identities.len(),
            None => inner.buckets.iter().map(|b| b.identities.len()).sum(),
        }
    }

    /// Number of content hashes, for one class or in total.
    pub fn content_size(&self, class: Option<AssetClass>) -> usize {
        let inner = self.inner.lock();
        match class {
            Some(class) => inner.buckets[class.index()].contents.len(),
            None => inner.buckets.iter().map(|b| b.contents.len()).sum(),
        }
    }

    /// Wipe one class (or all of them) and persist immediately.
    pub fn clear(&self, class: Option<AssetClass>) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            match class {
                Some(class) => inner.buckets[class.index()] = Bucket::default(),
                None => inner.buckets = Default::default(),
            }
            inner.dirty = true;
        }
        tracing::info!(
            class = class.map_or("all", AssetClass::as_str),
            "history cleared"
        );
        self.save()
    }

    /// Immutable snapshot of every bucket, for snapshot-isolated workers.
    pub fn snapshot(&self) -> HistorySnapshot {
        let inner = self.inner.lock();
        HistorySnapshot {
            buckets: AssetClass::ALL
                .iter()
                .map(|&class| {
                    let bucket = &inner.buckets[class.index()];
                    (class, bucket.identities.clone(), bucket.contents.clone())
                })
                .collect(),
        }
    }

    /// Fold worker deltas back into the shared sets.
    pub fn merge(&self, deltas: HistoryDeltas) {
        for (class, identity) in deltas.identities {
            self.add(&identity, class);
        }
        for (class, content) in deltas.contents {
            self.add_content(&content, class);
        }
    }

    /// Persist the current state if it changed since the last save.
    ///
    /// The write goes to a sibling temporary file first; the previous file
    /// is rotated to `.bak` and the temporary renamed into place.
    pub fn save(&self) -> Result<()> {
        let file = {
            let inner = self.inner.lock();
            if !inner.dirty {
                return Ok(());
            }

            let mut records = BTreeMap::new();
            for class in AssetClass::ALL {
                let bucket = &inner.buckets[class.index()];
                if bucket.identities.is_empty() && bucket.contents.is_empty() {
                    continue;
                }
                let mut file_hashes: Vec<String> = bucket.identities.iter().cloned().collect();
                let mut content_hashes: Vec<String> = bucket.contents.iter().cloned().collect();
                file_hashes.sort();
                content_hashes.sort();
                records.insert(
                    class.as_str().to_string(),
                    RecordEntry {
                        file_hashes,
                        content_hashes,
                    },
                );
            }

            let audio = &inner.buckets[AssetClass::Audio.index()];
            let mut hashes: Vec<String> = audio.identities.iter().cloned().collect();
            let mut content_hashes: Vec<String> = audio.contents.iter().cloned().collect();
            hashes.sort();
            content_hashes.sort();

            HistoryFile {
                records,
                hashes,
                content_hashes,
            }
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_vec(&file)?)?;

        if self.path.exists() {
            // Best-effort rotation; a failed backup must not block the save.
            if let Err(err) = fs::rename(&self.path, self.backup_path()) {
                tracing::debug!(%err, "history backup rotation failed");
            }
        }
        fs::rename(&tmp, &self.path)?;

        self.inner.lock().dirty = false;
        tracing::info!(
            identities = self.size(None),
            contents = self.content_size(None),
            "history saved"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn history_in(dir: &TempDir) -> ExtractionHistory {
        ExtractionHistory::open(dir.path().join("history.json")).expect("history should open")
    }

    #[test]
    fn add_and_query() {
        let dir = TempDir::new().unwrap();
        let history = history_in(&dir);

        history.add("abc123", AssetClass::Audio);
        assert!(history.is_processed("abc123", AssetClass::Audio));
        assert!(!history.is_processed("abc123", AssetClass::Font));
        assert_eq!(history.size(Some(AssetClass::Audio)), 1);
        assert_eq!(history.size(None), 1);
    }

    #[test]
    fn identity_with_embedded_digest_records_content() {
        let dir = TempDir::new().unwrap();
        let history = history_in(&dir);

        let digest = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        history.add(&format!("{digest}_dumpname"), AssetClass::Translation);
        assert!(history.is_content_processed(digest, AssetClass::Translation));

        // Non-hex prefixes (asset ids) do not pollute the content set
        history.add("font_asset_12345", AssetClass::Font);
        assert!(!history.is_content_processed("font", AssetClass::Font));
        assert_eq!(history.content_size(Some(AssetClass::Font)), 0);
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        let history = ExtractionHistory::open(&path).unwrap();
        history.add("id-1", AssetClass::Audio);
        history.add("font_asset_5", AssetClass::Font);
        history.add_content("deadbeef", AssetClass::Font);
        history.save().expect("save should succeed");

        let reloaded = ExtractionHistory::open(&path).unwrap();
        assert!(reloaded.is_processed("id-1", AssetClass::Audio));
        assert!(reloaded.is_processed("font_asset_5", AssetClass::Font));
        assert!(reloaded.is_content_processed("deadbeef", AssetClass::Font));
    }

    #[test]
    fn save_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let history = ExtractionHistory::open(&path).unwrap();
        history.add("x", AssetClass::Audio);
        history.save().unwrap();
        let first = fs::read_to_string(&path).unwrap();

        // No changes since the last save: the file is left alone.
        history.save().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn legacy_flat_format_migrates_into_audio() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(
            &path,
            r#"{"hashes":["legacy-1","legacy-2"],"content_hashes":["cafe"]}"#,
        )
        .unwrap();

        let history = ExtractionHistory::open(&path).unwrap();
        assert!(history.is_processed("legacy-1", AssetClass::Audio));
        assert!(history.is_content_processed("cafe", AssetClass::Audio));

        // The migration is persisted in the structured form.
        history.save().unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"records\""));
        assert!(text.contains("\"audio\""));
        // Legacy arrays still mirror the audio bucket.
        assert!(text.contains("\"hashes\":[\"legacy-1\",\"legacy-2\"]"));
    }

    #[test]
    fn corrupt_file_falls_back_to_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        let history = ExtractionHistory::open(&path).unwrap();
        history.add("kept", AssetClass::Audio);
        history.save().unwrap();
        // Second save rotates the good file into .bak before corruption
        history.add("kept-2", AssetClass::Audio);
        history.save().unwrap();

        fs::write(&path, "{ not json").unwrap();
        let reloaded = ExtractionHistory::open(&path).unwrap();
        assert!(reloaded.is_processed("kept", AssetClass::Audio));
    }

    #[test]
    fn corrupt_file_without_backup_refuses() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ not json").unwrap();

        let err = ExtractionHistory::open(&path).unwrap_err();
        assert!(matches!(err, HistoryError::Corrupt { .. }));
    }

    #[test]
    fn clear_one_class_saves_immediately() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let history = ExtractionHistory::open(&path).unwrap();
        history.add("a", AssetClass::Audio);
        history.add("f", AssetClass::Font);
        history.clear(Some(AssetClass::Audio)).unwrap();

        assert_eq!(history.size(Some(AssetClass::Audio)), 0);
        assert_eq!(history.size(Some(AssetClass::Font)), 1);

        let reloaded = ExtractionHistory::open(&path).unwrap();
        assert!(reloaded.is_processed("f", AssetClass::Font));
        assert!(!reloaded.is_processed("a", AssetClass::Audio));
    }

    #[test]
    fn snapshot_and_merge_deltas() {
        let dir = TempDir::new().unwrap();
        let history = history_in(&dir);
        history.add("seen", AssetClass::Video);

        let snapshot = history.snapshot();
        assert!(snapshot.is_processed("seen", AssetClass::Video));
        assert!(!snapshot.is_processed("new", AssetClass::Video));

        let mut deltas = HistoryDeltas::default();
        deltas.push_identity(AssetClass::Video, "new");
        deltas.push_content(AssetClass::Video, "beef");
        history.merge(deltas);

        assert!(history.is_processed("new", AssetClass::Video));
        assert!(history.is_content_processed("beef", AssetClass::Video));
        // The snapshot is unaffected by later mutation
        assert!(!snapshot.is_processed("new", AssetClass::Video));
    }

    #[test]
    fn unknown_record_types_land_in_other() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(
            &path,
            r#"{"records":{"shader":{"file_hashes":["s1"],"content_hashes":[]}}}"#,
        )
        .unwrap();

        let history = ExtractionHistory::open(&path).unwrap();
        assert!(history.is_processed("s1", AssetClass::Other));
    }
}
