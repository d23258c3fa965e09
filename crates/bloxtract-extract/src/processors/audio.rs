//! Audio extraction.
//!
//! OGG payloads occasionally carry junk ahead of the first `OggS` page
//! (and, rarely, arrive gzip-wrapped), so the processor salvages the real
//! stream before validating. Output lands in a temporary file first; the
//! category folder is only known after the optional duration probe.

use std::io::Read;
use std::path::PathBuf;

use async_trait::async_trait;

use bloxtract_formats::{AssetKind, AudioFormat};
use bloxtract_history::{AssetClass, Counter};

use crate::classify;
use crate::config::AudioClassification;
use crate::media_tool::MediaTool;
use crate::processors::{AssetProcessor, EntryContext, Outcome, WorkerContext, hex_md5};
use crate::{ExtractError, Result};

/// How far into a payload the salvage scan looks before reading the rest.
const SALVAGE_WINDOW: usize = 2048;

/// Writes OGG/MP3 payloads into duration or size category folders.
pub struct AudioProcessor {
    output_dir: PathBuf,
    classification: AudioClassification,
    tool: MediaTool,
}

impl AudioProcessor {
    /// Processor writing under `output_dir` (the `Audio` kind folder).
    pub fn new(output_dir: PathBuf, classification: AudioClassification, tool: MediaTool) -> Self {
        Self {
            output_dir,
            classification,
            tool,
        }
    }
}

/// Locate the audible stream inside a payload identified as OGG.
///
/// Scans the head for an `OggS` page, then the whole body, then attempts a
/// gzip unwrap and rescans. `None` means no stream exists after all.
fn salvage_ogg(body: &[u8]) -> Option<Vec<u8>> {
    let window = &body[..body.len().min(SALVAGE_WINDOW)];
    if let Some(at) = find(window, b"OggS") {
        return Some(body[at..].to_vec());
    }
    if let Some(at) = find(body, b"OggS") {
        return Some(body[at..].to_vec());
    }

    let mut decoder = flate2::read::GzDecoder::new(body);
    let mut inflated = Vec::new();
    if decoder.read_to_end(&mut inflated).is_ok() {
        if let Some(at) = find(&inflated, b"OggS") {
            return Some(inflated[at..].to_vec());
        }
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[async_trait]
impl AssetProcessor for AudioProcessor {
    fn accepts(&self, kind: AssetKind) -> bool {
        matches!(kind, AssetKind::Audio(_))
    }

    async fn consume(
        &self,
        entry: &EntryContext,
        body: Vec<u8>,
        kind: AssetKind,
        ctx: &mut WorkerContext,
    ) -> Result<Outcome> {
        let identity = entry.fingerprint.clone();
        if ctx.is_processed(&identity, AssetClass::Audio) {
            ctx.increment(Counter::AlreadyProcessed);
            return Ok(Outcome::AlreadyKnown);
        }

        let payload = match kind {
            AssetKind::Audio(AudioFormat::Ogg) => match salvage_ogg(&body) {
                Some(payload) => payload,
                None => return Ok(Outcome::Skipped),
            },
            _ => body,
        };

        let content_hash = hex_md5(&payload);
        if ctx.hash_cache.is_duplicate(&content_hash) {
            ctx.increment(Counter::DuplicateFiles);
            return Ok(Outcome::Duplicate);
        }

        let extension = kind.extension().unwrap_or("ogg");
        let file_name = classify::output_file_name(&entry.identity, extension);

        // Written to a temp name first: the duration probe needs a file on
        // disk before the category folder is known.
        let temp_path = self.output_dir.join(format!("temp_{file_name}"));
        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::write(&temp_path, &payload).await?;

        let category = match self.classification {
            AudioClassification::Duration => {
                if ctx.is_cancelled() {
                    let _ = tokio::fs::remove_file(&temp_path).await;
                    return Err(ExtractError::Cancelled);
                }
                classify::duration_category(self.tool.probe_duration(&temp_path).await)
            }
            AudioClassification::Size => classify::size_category(payload.len() as u64),
        };

        let category_dir = self.output_dir.join(category);
        let final_path = category_dir.join(&file_name);
        let moved: Result<()> = async {
            tokio::fs::create_dir_all(&category_dir).await?;
            tokio::fs::rename(&temp_path, &final_path).await?;
            Ok(())
        }
        .await;
        if let Err(err) = moved {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(err);
        }

        ctx.record(&identity, AssetClass::Audio);
        ctx.increment(Counter::ProcessedFiles);
        tracing::debug!(path = %final_path.display(), "audio written");
        Ok(Outcome::Processed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use bloxtract_history::{ContentHashCache, ProcessingStats};
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::TempDir;

    use crate::cancel::CancelToken;

    fn context() -> (TempDir, WorkerContext) {
        let dir = TempDir::new().unwrap();
        let history = Arc::new(
            bloxtract_history::ExtractionHistory::open(dir.path().join("h.json")).unwrap(),
        );
        let ctx = WorkerContext::shared(
            history,
            Arc::new(ContentHashCache::new()),
            Arc::new(ProcessingStats::new()),
            CancelToken::new(),
        );
        (dir, ctx)
    }

    fn entry(name: &str) -> EntryContext {
        EntryContext {
            identity: name.to_string(),
            source_path: None,
            fingerprint: format!("fp-{name}"),
        }
    }

    #[tokio::test]
    async fn writes_ogg_into_size_band() {
        let (dir, mut ctx) = context();
        let processor = AudioProcessor::new(
            dir.path().join("Audio"),
            AudioClassification::Size,
            MediaTool::default(),
        );

        // 73 KiB payload lands in the small band
        let mut body = b"OggS".to_vec();
        body.resize(73 * 1024, 0xAB);

        let outcome = processor
            .consume(&entry("e1"), body, AssetKind::Audio(AudioFormat::Ogg), &mut ctx)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Processed);

        let band = dir.path().join("Audio").join("small_50-200KB");
        let files: Vec<_> = std::fs::read_dir(&band).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(ctx.stats.get(Counter::ProcessedFiles), 1);
        // No temp file left behind
        let stray: Vec<_> = std::fs::read_dir(dir.path().join("Audio"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .collect();
        assert!(stray.is_empty());
    }

    #[tokio::test]
    async fn identical_bodies_deduplicate_by_content() {
        let (dir, mut ctx) = context();
        let processor = AudioProcessor::new(
            dir.path().join("Audio"),
            AudioClassification::Size,
            MediaTool::default(),
        );

        let body = b"OggS-same-bytes".to_vec();
        let first = processor
            .consume(&entry("a"), body.clone(), AssetKind::Audio(AudioFormat::Ogg), &mut ctx)
            .await
            .unwrap();
        let second = processor
            .consume(&entry("b"), body, AssetKind::Audio(AudioFormat::Ogg), &mut ctx)
            .await
            .unwrap();

        assert_eq!(first, Outcome::Processed);
        assert_eq!(second, Outcome::Duplicate);
        assert_eq!(ctx.stats.get(Counter::ProcessedFiles), 1);
        assert_eq!(ctx.stats.get(Counter::DuplicateFiles), 1);
    }

    #[tokio::test]
    async fn known_identity_short_circuits() {
        let (dir, mut ctx) = context();
        let processor = AudioProcessor::new(
            dir.path().join("Audio"),
            AudioClassification::Size,
            MediaTool::default(),
        );

        let e = entry("seen");
        ctx.record(&e.fingerprint, AssetClass::Audio);

        let outcome = processor
            .consume(&e, b"OggS....".to_vec(), AssetKind::Audio(AudioFormat::Ogg), &mut ctx)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::AlreadyKnown);
        assert_eq!(ctx.stats.get(Counter::AlreadyProcessed), 1);
    }

    #[test]
    fn salvage_trims_junk_and_unwraps_gzip() {
        let mut junked = vec![0u8; 100];
        junked.extend_from_slice(b"OggS rest of stream");
        assert!(salvage_ogg(&junked).unwrap().starts_with(b"OggS"));

        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"prefix OggS stream").unwrap();
        let gzipped = encoder.finish().unwrap();
        assert!(salvage_ogg(&gzipped).unwrap().starts_with(b"OggS"));

        assert!(salvage_ogg(b"nothing here").is_none());
    }
}
