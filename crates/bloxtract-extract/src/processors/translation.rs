//! Translation extraction.

use std::path::PathBuf;

use async_trait::async_trait;

use bloxtract_formats::{AssetKind, TranslationDocument};
use bloxtract_history::{AssetClass, Counter};
use sha2::{Digest, Sha256};

use crate::config::TranslationClassification;
use crate::processors::{AssetProcessor, EntryContext, Outcome, WorkerContext};
use crate::Result;

/// Writes locale documents into locale/content-type partitions.
pub struct TranslationProcessor {
    output_dir: PathBuf,
    classification: TranslationClassification,
}

impl TranslationProcessor {
    /// Processor writing under `output_dir` (the `Translations` kind folder).
    pub fn new(output_dir: PathBuf, classification: TranslationClassification) -> Self {
        Self {
            output_dir,
            classification,
        }
    }

    fn partition(&self, locale: &str, content_type: &str) -> PathBuf {
        match self.classification {
            TranslationClassification::Locale => self.output_dir.join(locale),
            TranslationClassification::ContentType => self.output_dir.join(content_type),
            TranslationClassification::Combined => self.output_dir.join(locale).join(content_type),
            TranslationClassification::None => self.output_dir.clone(),
        }
    }
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[async_trait]
impl AssetProcessor for TranslationProcessor {
    fn accepts(&self, kind: AssetKind) -> bool {
        matches!(kind, AssetKind::Translation)
    }

    async fn consume(
        &self,
        entry: &EntryContext,
        body: Vec<u8>,
        _kind: AssetKind,
        ctx: &mut WorkerContext,
    ) -> Result<Outcome> {
        ctx.increment(Counter::TranslationFound);

        let document = TranslationDocument::parse(&body)?;
        let locale = document.locale.clone();
        let content_type = document.content_type().as_str();

        let content_hash = hex_sha256(&body);
        if ctx.is_content_processed(&content_hash, AssetClass::Translation) {
            ctx.increment(Counter::AlreadyProcessed);
            return Ok(Outcome::AlreadyKnown);
        }

        let file_hash = format!("{content_hash}_{}", entry.identity);
        if ctx.is_processed(&file_hash, AssetClass::Translation) {
            ctx.increment(Counter::AlreadyProcessed);
            return Ok(Outcome::AlreadyKnown);
        }

        let file_name = format!("{locale}_{content_type}_{}.json", entry.dump_prefix());
        let partition = self.partition(&locale, content_type);
        tokio::fs::create_dir_all(&partition).await?;
        let path = partition.join(&file_name);
        let pretty = serde_json::to_vec_pretty(&document).map_err(std::io::Error::other)?;
        tokio::fs::write(&path, pretty).await?;

        ctx.record(&file_hash, AssetClass::Translation);
        ctx.increment(Counter::TranslationSaved);
        tracing::debug!(%locale, content_type, path = %path.display(), "translation written");
        Ok(Outcome::Processed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use bloxtract_history::{ContentHashCache, ExtractionHistory, ProcessingStats};
    use std::sync::Arc;
    use tempfile::TempDir;

    use crate::cancel::CancelToken;

    fn context(dir: &TempDir) -> WorkerContext {
        let history =
            Arc::new(ExtractionHistory::open(dir.path().join("h.json")).unwrap());
        WorkerContext::shared(
            history,
            Arc::new(ContentHashCache::new()),
            Arc::new(ProcessingStats::new()),
            CancelToken::new(),
        )
    }

    fn entry(name: &str) -> EntryContext {
        EntryContext {
            identity: name.to_string(),
            source_path: None,
            fingerprint: format!("fp-{name}"),
        }
    }

    const DOC: &[u8] =
        br#"{"locale":"zh-cn","entries":{"ui.ok":"OK","ui.cancel":"Cancel","menu.file":"File"}}"#;

    #[tokio::test]
    async fn writes_locale_partition_with_inferred_type() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir);
        let processor = TranslationProcessor::new(
            dir.path().join("Translations"),
            TranslationClassification::Combined,
        );

        let outcome = processor
            .consume(
                &entry("cafebabe01"),
                DOC.to_vec(),
                AssetKind::Translation,
                &mut ctx,
            )
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Processed);
        assert_eq!(ctx.stats.get(Counter::TranslationSaved), 1);

        let partition = dir.path().join("Translations").join("zh-cn").join("UI");
        let names: Vec<String> = std::fs::read_dir(&partition)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("zh-cn_UI_cafebabe"));
        assert!(names[0].ends_with(".json"));
    }

    #[tokio::test]
    async fn identical_content_is_skipped_on_second_sight() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir);
        let processor = TranslationProcessor::new(
            dir.path().join("Translations"),
            TranslationClassification::Locale,
        );

        processor
            .consume(&entry("one"), DOC.to_vec(), AssetKind::Translation, &mut ctx)
            .await
            .unwrap();
        let second = processor
            .consume(&entry("two"), DOC.to_vec(), AssetKind::Translation, &mut ctx)
            .await
            .unwrap();

        assert_eq!(second, Outcome::AlreadyKnown);
        assert_eq!(ctx.stats.get(Counter::TranslationSaved), 1);
        assert_eq!(ctx.stats.get(Counter::AlreadyProcessed), 1);
    }

    #[tokio::test]
    async fn malformed_document_errors() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir);
        let processor = TranslationProcessor::new(
            dir.path().join("Translations"),
            TranslationClassification::Locale,
        );

        let result = processor
            .consume(
                &entry("bad"),
                b"{\"locale\": 42}".to_vec(),
                AssetKind::Translation,
                &mut ctx,
            )
            .await;
        assert!(result.is_err());
    }
}
