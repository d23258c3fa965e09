//! HLS video assembly.
//!
//! A Roblox video arrives as a master playlist in the cache; the actual
//! media lives on the CDN as WEBM segments. Assembly selects a variant
//! stream, downloads its media playlist, fetches every segment in playlist
//! order, optionally rewrites segment timestamps, and concat-merges the
//! results into `{Videos}/{resolution}/{hash}.webm`.
//!
//! Failure counters are charged here, next to the failure: an exhausted
//! segment download marks `download_failures`, a repair or concat failure
//! marks `merge_failures`. Either way only the current video dies.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use bloxtract_formats::hls::{self, MasterPlaylist, QualityPreference};
use bloxtract_history::{Counter, ProcessingStats};

use crate::cancel::CancelToken;
use crate::config::VideoClassification;
use crate::media_tool::MediaTool;
use crate::retry::RetryPolicy;
use crate::{ExtractError, Result, USER_AGENT};

/// Per-request timeout for playlist and segment fetches.
const SEGMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// What assembly produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembleOutcome {
    /// A merged video was written
    Merged {
        /// Final video location
        path: PathBuf,
        /// Segments downloaded for it
        segments: u64,
    },
    /// The target file already existed on disk
    Exists,
}

/// Downloads and merges one HLS video at a time.
pub struct HlsAssembler {
    videos_dir: PathBuf,
    temp_root: PathBuf,
    classification: VideoClassification,
    quality: QualityPreference,
    timestamp_repair: bool,
    auto_cleanup: bool,
    tool: MediaTool,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HlsAssembler {
    /// Assembler writing videos under `videos_dir` with per-video scratch
    /// directories under `temp_root`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        videos_dir: PathBuf,
        temp_root: PathBuf,
        classification: VideoClassification,
        quality: QualityPreference,
        timestamp_repair: bool,
        auto_cleanup: bool,
        tool: MediaTool,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(SEGMENT_TIMEOUT)
            .build()?;
        Ok(Self {
            videos_dir,
            temp_root,
            classification,
            quality,
            timestamp_repair,
            auto_cleanup,
            tool,
            client,
            retry,
        })
    }

    /// Assemble one video from its master playlist text.
    pub async fn assemble(
        &self,
        playlist: &str,
        video_hash: &str,
        stats: &ProcessingStats,
        cancel: &CancelToken,
    ) -> Result<AssembleOutcome> {
        let master = MasterPlaylist::parse(playlist)?;
        let stream = master
            .select(self.quality)
            .ok_or(ExtractError::Playlist(
                bloxtract_formats::PlaylistError::NoStreams,
            ))?
            .clone();

        let resolution = hls::resolution_folder(&stream.resolution);
        let target_dir = match self.classification {
            VideoClassification::Resolution => self.videos_dir.join(&resolution),
            VideoClassification::None => self.videos_dir.clone(),
        };
        let final_path = target_dir.join(format!("{video_hash}.webm"));
        if final_path.exists() {
            tracing::debug!(path = %final_path.display(), "video already on disk");
            return Ok(AssembleOutcome::Exists);
        }

        tracing::info!(%video_hash, %resolution, "assembling video");

        let temp_dir = self.temp_root.join(format!("VideoFrame-{video_hash}"));
        tokio::fs::create_dir_all(&temp_dir).await?;

        let result = self
            .download_and_merge(&stream.url, &temp_dir, &target_dir, &final_path, stats, cancel)
            .await;

        // Scratch space goes away on success and failure alike.
        if self.auto_cleanup {
            let _ = tokio::fs::remove_dir_all(&temp_dir).await;
        }

        result.map(|segments| AssembleOutcome::Merged {
            path: final_path,
            segments,
        })
    }

    async fn fetch_text(&self, url: &str, cancel: &CancelToken) -> Result<String> {
        self.retry
            .execute(cancel, || {
                let client = self.client.clone();
                let url = url.to_string();
                async move {
                    let response = client.get(&url).send().await?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(ExtractError::HttpStatus(status.as_u16()));
                    }
                    Ok(response.text().await?)
                }
            })
            .await
    }

    async fn fetch_bytes(&self, url: &str, cancel: &CancelToken) -> Result<Vec<u8>> {
        self.retry
            .execute(cancel, || {
                let client = self.client.clone();
                let url = url.to_string();
                async move {
                    let response = client.get(&url).send().await?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(ExtractError::HttpStatus(status.as_u16()));
                    }
                    Ok(response.bytes().await?.to_vec())
                }
            })
            .await
    }

    async fn download_and_merge(
        &self,
        stream_url: &str,
        temp_dir: &Path,
        target_dir: &Path,
        final_path: &Path,
        stats: &ProcessingStats,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let media = match self.fetch_text(stream_url, cancel).await {
            Ok(media) => media,
            Err(ExtractError::Cancelled) => return Err(ExtractError::Cancelled),
            Err(err) => {
                stats.increment(Counter::DownloadFailures);
                return Err(err);
            }
        };

        let segments = hls::parse_media_playlist(&media);
        if segments.is_empty() {
            stats.increment(Counter::DownloadFailures);
            return Err(ExtractError::NetworkTransient(
                "media playlist lists no segments".to_string(),
            ));
        }

        let base = Url::parse(stream_url)
            .map_err(|err| ExtractError::NetworkTransient(err.to_string()))?;

        let mut list_lines = Vec::with_capacity(segments.len());
        let mut downloaded = 0u64;

        // Strict playlist order; cancellation is observed between segments.
        for segment in &segments {
            if cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }

            let segment_url = base
                .join(segment)
                .map_err(|err| ExtractError::NetworkTransient(err.to_string()))?;
            let file_name = segment.rsplit('/').next().unwrap_or(segment);
            let segment_path = temp_dir.join(file_name);

            match self.fetch_bytes(segment_url.as_str(), cancel).await {
                Ok(bytes) => tokio::fs::write(&segment_path, bytes).await?,
                Err(ExtractError::Cancelled) => return Err(ExtractError::Cancelled),
                Err(err) => {
                    tracing::error!(segment = %file_name, %err, "segment download failed");
                    stats.increment(Counter::DownloadFailures);
                    return Err(err);
                }
            }
            stats.increment(Counter::DownloadedSegments);

            // The repaired name is used either way so the concat list stays
            // uniform; with repair disabled the segment is just renamed.
            let repaired_name = if file_name.ends_with(".webm") {
                file_name.replace(".webm", "-repaired.webm")
            } else {
                format!("{file_name}-repaired")
            };
            let repaired_path = temp_dir.join(&repaired_name);

            if self.timestamp_repair && self.tool.available() {
                if cancel.is_cancelled() {
                    return Err(ExtractError::Cancelled);
                }
                if let Err(err) = self.tool.repair_segment(&segment_path, &repaired_path).await {
                    tracing::error!(segment = %file_name, %err, "segment repair failed");
                    stats.increment(Counter::MergeFailures);
                    return Err(err);
                }
                let _ = tokio::fs::remove_file(&segment_path).await;
            } else {
                tokio::fs::rename(&segment_path, &repaired_path).await?;
            }

            list_lines.push(format!("file '{repaired_name}'"));
            downloaded += 1;
        }

        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let list_file = temp_dir.join("videos.txt");
        tokio::fs::write(&list_file, list_lines.join("\n")).await?;

        tokio::fs::create_dir_all(target_dir).await?;
        if let Err(err) = self.tool.concat(&list_file, final_path).await {
            tracing::error!(%err, "video merge failed");
            stats.increment(Counter::MergeFailures);
            return Err(err);
        }
        stats.increment(Counter::MergedVideos);

        Ok(downloaded)
    }
}
