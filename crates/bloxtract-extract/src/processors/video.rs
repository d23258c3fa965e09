//! Video extraction.

use async_trait::async_trait;

use bloxtract_formats::AssetKind;
use bloxtract_formats::hls::RBX_BASE_URI;
use bloxtract_history::{AssetClass, Counter};

use crate::assembler::{AssembleOutcome, HlsAssembler};
use crate::processors::{AssetProcessor, EntryContext, Outcome, WorkerContext, hex_md5};
use crate::{ExtractError, Result};

/// Assembles Roblox HLS playlists into merged videos.
///
/// The video's identity is the MD5 of the raw playlist bytes, checked
/// against the video history bucket before any network traffic. Playlists
/// without the `RBX-BASE-URI` marker belong to other origins and are
/// skipped outright.
pub struct VideoProcessor {
    assembler: HlsAssembler,
}

impl VideoProcessor {
    /// Processor delegating assembly to `assembler`.
    pub fn new(assembler: HlsAssembler) -> Self {
        Self { assembler }
    }
}

#[async_trait]
impl AssetProcessor for VideoProcessor {
    fn accepts(&self, kind: AssetKind) -> bool {
        matches!(kind, AssetKind::HlsPlaylist)
    }

    async fn consume(
        &self,
        _entry: &EntryContext,
        body: Vec<u8>,
        _kind: AssetKind,
        ctx: &mut WorkerContext,
    ) -> Result<Outcome> {
        let text = String::from_utf8_lossy(&body).into_owned();
        if !text.contains(RBX_BASE_URI) {
            tracing::debug!("skipping non-Roblox playlist");
            return Ok(Outcome::Skipped);
        }

        let video_hash = hex_md5(&body);
        if ctx.is_processed(&video_hash, AssetClass::Video) {
            ctx.increment(Counter::AlreadyProcessed);
            return Ok(Outcome::AlreadyKnown);
        }

        match self
            .assembler
            .assemble(&text, &video_hash, &ctx.stats, &ctx.cancel)
            .await
        {
            Ok(AssembleOutcome::Merged { path, segments }) => {
                ctx.record(&video_hash, AssetClass::Video);
                ctx.increment(Counter::ProcessedVideos);
                tracing::info!(path = %path.display(), segments, "video assembled");
                Ok(Outcome::Processed)
            }
            Ok(AssembleOutcome::Exists) => {
                ctx.record(&video_hash, AssetClass::Video);
                ctx.increment(Counter::DuplicateFiles);
                Ok(Outcome::Duplicate)
            }
            Err(ExtractError::Cancelled) => Err(ExtractError::Cancelled),
            Err(err) => {
                // Failure counters were charged at the failure site; the
                // remaining videos in the queue continue.
                tracing::warn!(%video_hash, %err, "video assembly failed");
                Ok(Outcome::Skipped)
            }
        }
    }
}
