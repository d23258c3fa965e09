//! Font-list resolution.
//!
//! A font-list payload names a family and its faces. The JSON document is
//! saved verbatim next to the downloads; each `rbxassetid://` face is then
//! fetched from the delivery CDN in declaration order. `rbxasset://`
//! references are bundled with the client and count as skipped, not
//! failed. A face whose output file already exists on disk still records
//! its identity, so replays converge instead of re-downloading.

use std::path::PathBuf;

use async_trait::async_trait;

use bloxtract_formats::{AssetKind, FontAssetRef, FontList};
use bloxtract_history::{AssetClass, Counter};

use crate::classify;
use crate::config::FontClassification;
use crate::fonts::FontResolver;
use crate::processors::{AssetProcessor, EntryContext, Outcome, WorkerContext, hex_md5};
use crate::{ExtractError, Result};

/// Resolves font-list documents into downloaded TTF faces.
pub struct FontProcessor {
    output_dir: PathBuf,
    classification: FontClassification,
    resolver: FontResolver,
}

impl FontProcessor {
    /// Processor writing under `output_dir` (the `Fonts` kind folder).
    pub fn new(
        output_dir: PathBuf,
        classification: FontClassification,
        resolver: FontResolver,
    ) -> Self {
        Self {
            output_dir,
            classification,
            resolver,
        }
    }

    fn category(&self, family: &str, face: &str, size: usize) -> String {
        match self.classification {
            FontClassification::Family => classify::sanitize_name(family),
            FontClassification::Style => classify::style_category(face),
            FontClassification::Size => classify::size_category(size as u64).to_string(),
            FontClassification::None => String::new(),
        }
    }
}

/// Keep family/face names usable as file names.
fn file_safe(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

#[async_trait]
impl AssetProcessor for FontProcessor {
    fn accepts(&self, kind: AssetKind) -> bool {
        matches!(kind, AssetKind::FontList)
    }

    async fn consume(
        &self,
        _entry: &EntryContext,
        body: Vec<u8>,
        _kind: AssetKind,
        ctx: &mut WorkerContext,
    ) -> Result<Outcome> {
        let list = FontList::parse(&body)?;
        ctx.increment(Counter::FontlistFound);
        tracing::debug!(family = %list.name, faces = list.faces.len(), "font list found");

        // The document itself is kept verbatim alongside the downloads.
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let json_path = self
            .output_dir
            .join(format!("{}.json", file_safe(&list.name)));
        tokio::fs::write(&json_path, &body).await?;

        // Faces download in declaration order; a failed face is charged to
        // the download counter and the remaining faces continue.
        for face in &list.faces {
            if ctx.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }

            let asset_id = match face.asset_ref() {
                FontAssetRef::Remote(id) => id,
                FontAssetRef::Local => {
                    tracing::debug!(family = %list.name, face = %face.name, "skipping bundled asset");
                    continue;
                }
                FontAssetRef::Invalid => {
                    tracing::debug!(family = %list.name, face = %face.name, "skipping invalid asset id");
                    continue;
                }
            };

            let identity = format!("font_asset_{asset_id}");
            if ctx.is_processed(&identity, AssetClass::Font) {
                ctx.increment(Counter::AlreadyProcessed);
                continue;
            }

            let bytes = match self.resolver.fetch_face(&asset_id, &ctx.cancel).await {
                Ok(bytes) => bytes,
                Err(ExtractError::Cancelled) => return Err(ExtractError::Cancelled),
                Err(err) => {
                    tracing::warn!(family = %list.name, face = %face.name, %err, "face download failed");
                    ctx.increment(Counter::DownloadFailures);
                    continue;
                }
            };

            let content_hash = hex_md5(&bytes);
            if ctx.is_content_processed(&content_hash, AssetClass::Font) {
                // Same bytes under a different asset id: record and move on.
                ctx.record(&identity, AssetClass::Font);
                ctx.increment(Counter::AlreadyProcessed);
                continue;
            }

            let category = self.category(&list.name, &face.name, bytes.len());
            let target_dir = if category.is_empty() {
                self.output_dir.clone()
            } else {
                self.output_dir.join(&category)
            };
            tokio::fs::create_dir_all(&target_dir).await?;

            let file_name = format!("{}-{}.ttf", file_safe(&list.name), file_safe(&face.name));
            let path = target_dir.join(&file_name);
            if path.exists() {
                // Prior run got here first; treat as success.
                ctx.record(&identity, AssetClass::Font);
                ctx.increment(Counter::AlreadyProcessed);
                continue;
            }

            tokio::fs::write(&path, &bytes).await?;
            ctx.record(&identity, AssetClass::Font);
            ctx.record_content(&content_hash, AssetClass::Font);
            ctx.increment(Counter::FontsDownloaded);
            tracing::debug!(path = %path.display(), "font face written");
        }

        Ok(Outcome::Processed)
    }
}
