//! Image extraction.
//!
//! Raster payloads are written verbatim under a format or size category.
//! WEBP payloads flagged as avatar renders are dropped when avatar
//! blocking is on; with the flag off the identifier tags them safe and
//! they flow through like any other image.

use std::path::PathBuf;

use async_trait::async_trait;

use bloxtract_formats::{AssetKind, ImageFormat};
use bloxtract_history::{AssetClass, Counter};

use crate::classify;
use crate::config::ImageClassification;
use crate::processors::{AssetProcessor, EntryContext, Outcome, WorkerContext, hex_md5};
use crate::Result;

/// Writes raster images into format or size category folders.
pub struct ImageProcessor {
    output_dir: PathBuf,
    classification: ImageClassification,
}

impl ImageProcessor {
    /// Processor writing under `output_dir` (the `Images` kind folder).
    pub fn new(output_dir: PathBuf, classification: ImageClassification) -> Self {
        Self {
            output_dir,
            classification,
        }
    }

    fn format_folder(format: ImageFormat) -> &'static str {
        match format {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Gif => "GIF",
            ImageFormat::WebpSafe | ImageFormat::WebpAvatar => "WebP",
        }
    }
}

#[async_trait]
impl AssetProcessor for ImageProcessor {
    fn accepts(&self, kind: AssetKind) -> bool {
        matches!(kind, AssetKind::Image(_))
    }

    async fn consume(
        &self,
        entry: &EntryContext,
        body: Vec<u8>,
        kind: AssetKind,
        ctx: &mut WorkerContext,
    ) -> Result<Outcome> {
        let AssetKind::Image(format) = kind else {
            return Ok(Outcome::Skipped);
        };

        // The identifier only emits WebpAvatar while blocking is on.
        if format == ImageFormat::WebpAvatar {
            ctx.increment(Counter::IgnoredFiles);
            return Ok(Outcome::Ignored);
        }

        let identity = entry.fingerprint.clone();
        if ctx.is_processed(&identity, AssetClass::Image) {
            ctx.increment(Counter::AlreadyProcessed);
            return Ok(Outcome::AlreadyKnown);
        }

        let content_hash = hex_md5(&body);
        if ctx.hash_cache.is_duplicate(&content_hash) {
            ctx.increment(Counter::DuplicateFiles);
            return Ok(Outcome::Duplicate);
        }

        let category = match self.classification {
            ImageClassification::Format => Self::format_folder(format).to_string(),
            ImageClassification::Size => classify::size_category(body.len() as u64).to_string(),
        };

        let extension = kind.extension().unwrap_or("bin");
        let file_name = classify::output_file_name(&entry.identity, extension);
        let category_dir = self.output_dir.join(&category);
        tokio::fs::create_dir_all(&category_dir).await?;
        let final_path = category_dir.join(&file_name);
        tokio::fs::write(&final_path, &body).await?;

        ctx.record(&identity, AssetClass::Image);
        ctx.increment(Counter::ProcessedFiles);
        tracing::debug!(path = %final_path.display(), "image written");
        Ok(Outcome::Processed)
    }
}
