//! Extraction configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;

use serde::Serialize;

use bloxtract_formats::QualityPreference;

use crate::media_tool::MediaTool;
use crate::retry::RetryPolicy;

/// Which asset kind an extraction pass targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractTarget {
    /// OGG/MP3 payloads
    Audio,
    /// Font-list documents and their downloadable faces
    Fonts,
    /// Raster images
    Images,
    /// Locale translation documents
    Translations,
    /// HLS playlists assembled into videos
    Videos,
}

impl ExtractTarget {
    /// Output folder under the extraction root.
    pub fn folder(self) -> &'static str {
        match self {
            Self::Audio => "Audio",
            Self::Fonts => "Fonts",
            Self::Images => "Images",
            Self::Translations => "Translations",
            Self::Videos => "Videos",
        }
    }

    /// Lowercase name used on the command line and in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Fonts => "fonts",
            Self::Images => "images",
            Self::Translations => "translations",
            Self::Videos => "videos",
        }
    }
}

impl fmt::Display for ExtractTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractTarget {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "audio" => Ok(Self::Audio),
            "fonts" | "font" => Ok(Self::Fonts),
            "images" | "image" => Ok(Self::Images),
            "translations" | "translation" => Ok(Self::Translations),
            "videos" | "video" => Ok(Self::Videos),
            other => Err(format!("unknown extraction target: {other}")),
        }
    }
}

/// Worker execution model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParallelModel {
    /// Workers share history, hash cache and counters behind locks
    #[default]
    Threaded,
    /// Workers run against an immutable history snapshot and return deltas
    /// that are merged after the pool drains
    ProcessPool,
}

/// Audio output categorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioClassification {
    /// Duration bands measured by the external probe
    #[default]
    Duration,
    /// Payload size bands
    Size,
}

/// Font output categorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontClassification {
    /// One folder per sanitized family name
    #[default]
    Family,
    /// Canonical style folders derived from face names
    Style,
    /// Payload size bands
    Size,
    /// Everything in the kind root
    None,
}

/// Translation output categorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranslationClassification {
    /// One folder per locale
    #[default]
    Locale,
    /// One folder per inferred content type
    ContentType,
    /// Locale folder containing content-type folders
    Combined,
    /// Everything in the kind root
    None,
}

/// Video output categorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoClassification {
    /// One folder per resolution (`1080p`, `720p`, ...)
    #[default]
    Resolution,
    /// Everything in the kind root
    None,
}

/// Image output categorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageClassification {
    /// One folder per image format
    #[default]
    Format,
    /// Payload size bands
    Size,
}

/// Per-kind classification choices, bundled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classification {
    /// Audio scheme
    pub audio: AudioClassification,
    /// Font scheme
    pub font: FontClassification,
    /// Translation scheme
    pub translation: TranslationClassification,
    /// Video scheme
    pub video: VideoClassification,
    /// Image scheme
    pub image: ImageClassification,
}

/// Options for one extraction pass.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Output root; defaults to `{input}/extracted`
    pub output_dir: Option<PathBuf>,
    /// Worker count; defaults to the CPU core count
    pub num_workers: usize,
    /// Worker execution model
    pub parallel: ParallelModel,
    /// Per-kind classification choices
    pub classification: Classification,
    /// Drop WEBP payloads assumed to be avatar renders
    pub block_avatar_images: bool,
    /// Stream quality preference for HLS assembly
    pub quality: QualityPreference,
    /// Rewrite segment timestamps through the media tool before merging
    pub timestamp_repair: bool,
    /// Delete per-video temporary directories after assembly
    pub auto_cleanup: bool,
    /// Font asset delivery endpoint (overridable for tests)
    pub font_endpoint: String,
    /// Retry policy for network fetches
    pub retry: RetryPolicy,
    /// Media tool override; located on `PATH` when absent
    pub media_tool: Option<MediaTool>,
}

/// Production asset delivery endpoint.
pub const DEFAULT_FONT_ENDPOINT: &str = "https://assetdelivery.roblox.com/v1/asset";

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            output_dir: None,
            num_workers: thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            parallel: ParallelModel::default(),
            classification: Classification::default(),
            block_avatar_images: true,
            quality: QualityPreference::Auto,
            timestamp_repair: true,
            auto_cleanup: true,
            font_endpoint: DEFAULT_FONT_ENDPOINT.to_string(),
            retry: RetryPolicy::default(),
            media_tool: None,
        }
    }
}
