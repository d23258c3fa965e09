//! HLS playlist parsing and stream selection.
//!
//! Roblox serves video through plain HLS with one extension: the master
//! playlist defines `#EXT-X-DEFINE:NAME="RBX-BASE-URI"` and stream URIs
//! reference it as `{$RBX-BASE-URI}`. Master playlists enumerate variant
//! streams by `BANDWIDTH`/`RESOLUTION`; media playlists enumerate segment
//! URIs, one per `#EXTINF` entry.

// Hardcoded regexes cannot fail to compile.
#![allow(clippy::expect_used)]

use std::sync::LazyLock;

use regex::Regex;

use crate::PlaylistError;

/// Marker distinguishing Roblox playlists from generic HLS documents.
pub const RBX_BASE_URI: &str = "RBX-BASE-URI";

static DEFINE_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"VALUE="([^"]*)""#).expect("regex compiles"));
static BANDWIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"BANDWIDTH=(\d+)").expect("regex compiles"));
static RESOLUTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"RESOLUTION=([^,\s]+)").expect("regex compiles"));
static HEIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"x(\d+)").expect("regex compiles"));

/// One variant stream declared by a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoStream {
    /// Declared bandwidth in bits per second
    pub bandwidth: u64,
    /// Declared resolution string, e.g. `1920x1080`, or `Unknown`
    pub resolution: String,
    /// Fully substituted stream URL
    pub url: String,
}

impl VideoStream {
    /// Pixel height parsed out of the resolution string.
    pub fn height(&self) -> Option<u32> {
        HEIGHT
            .captures(&self.resolution)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

/// A parsed master playlist.
#[derive(Debug, Clone)]
pub struct MasterPlaylist {
    /// Value of the `RBX-BASE-URI` definition
    pub base_uri: String,
    /// Variant streams in declaration order
    pub streams: Vec<VideoStream>,
}

/// Desired stream quality when a master playlist offers several variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityPreference {
    /// Highest declared bandwidth
    #[default]
    Auto,
    /// Closest to 1080 pixels high, preferring streams at or below
    P1080,
    /// Closest to 720 pixels high, preferring streams at or below
    P720,
    /// Closest to 480 pixels high, preferring streams at or below
    P480,
    /// Lowest declared bandwidth
    Lowest,
}

impl QualityPreference {
    /// Target height for the fixed preferences.
    pub fn target_height(self) -> Option<u32> {
        match self {
            Self::P1080 => Some(1080),
            Self::P720 => Some(720),
            Self::P480 => Some(480),
            Self::Auto | Self::Lowest => None,
        }
    }
}

impl MasterPlaylist {
    /// Parse a master playlist, substituting `{$RBX-BASE-URI}` into stream
    /// URIs.
    pub fn parse(text: &str) -> Result<Self, PlaylistError> {
        if !text.contains(RBX_BASE_URI) {
            return Err(PlaylistError::MissingBaseUri);
        }

        let mut base_uri = String::new();
        let mut streams = Vec::new();
        let mut pending: Option<(u64, String)> = None;

        for line in text.lines().map(str::trim) {
            if line.starts_with("#EXT-X-DEFINE:") {
                if line.contains("NAME=\"RBX-BASE-URI\"") {
                    if let Some(captures) = DEFINE_VALUE.captures(line) {
                        base_uri = captures[1].to_string();
                    }
                }
            } else if line.starts_with("#EXT-X-STREAM-INF:") {
                if let Some(captures) = BANDWIDTH.captures(line) {
                    let bandwidth = captures[1].parse().unwrap_or(0);
                    let resolution = RESOLUTION
                        .captures(line)
                        .map_or_else(|| "Unknown".to_string(), |c| c[1].to_string());
                    pending = Some((bandwidth, resolution));
                }
            } else if !line.is_empty() && !line.starts_with('#') {
                if let Some((bandwidth, resolution)) = pending.take() {
                    streams.push(VideoStream {
                        bandwidth,
                        resolution,
                        url: line.replace("{$RBX-BASE-URI}", &base_uri),
                    });
                }
            }
        }

        if streams.is_empty() {
            return Err(PlaylistError::NoStreams);
        }

        Ok(Self { base_uri, streams })
    }

    /// Choose a stream according to the quality preference.
    pub fn select(&self, preference: QualityPreference) -> Option<&VideoStream> {
        select_stream(&self.streams, preference)
    }
}

/// Choose a stream from `streams` according to `preference`.
///
/// `Auto` picks the highest bandwidth and `Lowest` the lowest. A fixed
/// target picks the stream whose height lands nearest the target, with
/// heights at or below the target preferred over overshooting ones.
pub fn select_stream(
    streams: &[VideoStream],
    preference: QualityPreference,
) -> Option<&VideoStream> {
    if streams.is_empty() {
        return None;
    }

    let highest = streams.iter().max_by_key(|s| s.bandwidth)?;
    match preference {
        QualityPreference::Auto => Some(highest),
        QualityPreference::Lowest => streams.iter().min_by_key(|s| s.bandwidth),
        _ => {
            let target = preference.target_height().unwrap_or(1080);
            let mut best = highest;
            let mut best_diff = u32::MAX;
            for stream in streams {
                if let Some(height) = stream.height() {
                    let diff = height.abs_diff(target);
                    if diff < best_diff || (height <= target && diff <= best_diff) {
                        best_diff = diff;
                        best = stream;
                    }
                }
            }
            Some(best)
        }
    }
}

/// Extract segment URIs from a media playlist, in declaration order.
///
/// A URI counts only when it immediately follows an `#EXTINF` line.
pub fn parse_media_playlist(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut next_is_segment = false;
    for line in text.lines().map(str::trim) {
        if next_is_segment && !line.is_empty() && !line.starts_with('#') {
            segments.push(line.to_string());
            next_is_segment = false;
        } else if line.starts_with("#EXTINF:") {
            next_is_segment = true;
        }
    }
    segments
}

/// Map a resolution string to its output folder name.
///
/// `1920x1080` becomes `1080p`; strings without a height component are used
/// as-is; an unknown resolution falls back to `Unknown_Resolution`.
pub fn resolution_folder(resolution: &str) -> String {
    if resolution.is_empty() || resolution == "Unknown" {
        return "Unknown_Resolution".to_string();
    }
    HEIGHT.captures(resolution).map_or_else(
        || resolution.to_string(),
        |captures| format!("{}p", &captures[1]),
    )
}
