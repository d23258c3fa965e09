//! Payload classification.
//!
//! Cache bodies carry no content-type metadata, so the asset kind is
//! recognized from the payload itself: a lossily decoded prefix of at most
//! 48 bytes, the raw leading bytes, and a little-endian magic word. The
//! rules live in an ordered table and the first match wins; the table order
//! is load-bearing (for example the `{"translations` ignore must fire
//! before the `{"locale":"` match).

use std::borrow::Cow;

/// Options honored during identification.
#[derive(Debug, Clone, Copy)]
pub struct IdentifyOptions {
    /// Treat WEBP payloads as avatar images (which downstream drops)
    pub block_avatar_images: bool,
}

impl Default for IdentifyOptions {
    fn default() -> Self {
        Self {
            block_avatar_images: true,
        }
    }
}

/// Raster image flavors the cache contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// PNG
    Png,
    /// JPEG (JFIF or Exif)
    Jpeg,
    /// GIF (87a or 89a)
    Gif,
    /// WEBP kept for extraction
    WebpSafe,
    /// WEBP assumed to be an avatar render
    WebpAvatar,
}

/// Audio container flavors the cache contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    /// Ogg Vorbis
    Ogg,
    /// MPEG layer III (ID3 tag or bare frame sync)
    Mp3,
}

/// The closed set of payload kinds the engine recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// Binary Roblox model/place document
    RbxmModel,
    /// Roblox mesh geometry
    Mesh,
    /// Locale translation document
    Translation,
    /// Font family document listing faces and asset ids
    FontList,
    /// Raster image
    Image(ImageFormat),
    /// Audio payload
    Audio(AudioFormat),
    /// Khronos KTX texture
    KtxTexture,
    /// HLS playlist
    HlsPlaylist,
    /// Recognized but deliberately skipped payload
    Ignored(&'static str),
    /// Nothing matched
    Unknown,
}

impl AssetKind {
    /// Preferred output file extension, if the kind is written verbatim.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::RbxmModel => Some("rbxm"),
            Self::Image(ImageFormat::Png) => Some("png"),
            Self::Image(ImageFormat::Jpeg) => Some("jfif"),
            Self::Image(ImageFormat::Gif) => Some("gif"),
            Self::Image(ImageFormat::WebpSafe | ImageFormat::WebpAvatar) => Some("webp"),
            Self::Audio(AudioFormat::Ogg) => Some("ogg"),
            Self::Audio(AudioFormat::Mp3) => Some("mp3"),
            Self::Translation | Self::FontList => Some("json"),
            _ => None,
        }
    }

    /// Target category bucket for direct writes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::RbxmModel => "RBXM",
            Self::Image(_) | Self::KtxTexture => "Textures",
            Self::Audio(_) => "Sounds",
            Self::Translation => "Translations",
            Self::FontList => "Fonts",
            Self::HlsPlaylist => "Videos",
            Self::Mesh | Self::Ignored(_) | Self::Unknown => "",
        }
    }

    /// Short human-readable label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::RbxmModel => "RBXM",
            Self::Mesh => "mesh",
            Self::Translation => "translation",
            Self::FontList => "font list",
            Self::Image(ImageFormat::Png) => "PNG",
            Self::Image(ImageFormat::Jpeg) => "JPEG",
            Self::Image(ImageFormat::Gif) => "GIF",
            Self::Image(ImageFormat::WebpSafe) => "WEBP",
            Self::Image(ImageFormat::WebpAvatar) => "WEBP avatar",
            Self::Audio(AudioFormat::Ogg) => "OGG",
            Self::Audio(AudioFormat::Mp3) => "MP3",
            Self::KtxTexture => "KTX",
            Self::HlsPlaylist => "HLS playlist",
            Self::Ignored(reason) => reason,
            Self::Unknown => "unknown",
        }
    }
}

/// Probe over the head of a payload, shared by every rule.
struct Probe<'a> {
    prefix: Cow<'a, str>,
    bytes: &'a [u8],
    magic: u32,
}

impl<'a> Probe<'a> {
    fn new(body: &'a [u8]) -> Self {
        let head = &body[..body.len().min(48)];
        let magic = if body.len() >= 4 {
            u32::from_le_bytes([body[0], body[1], body[2], body[3]])
        } else {
            0
        };
        Self {
            prefix: String::from_utf8_lossy(head),
            bytes: body,
            magic,
        }
    }
}

struct Rule {
    matches: fn(&Probe<'_>) -> bool,
    kind: fn(&Probe<'_>, &IdentifyOptions) -> AssetKind,
}

macro_rules! rule {
    ($matches:expr, $kind:expr) => {
        Rule {
            matches: $matches,
            kind: $kind,
        }
    };
}

/// Ordered rule table; the first matching row decides the kind.
static RULES: &[Rule] = &[
    rule!(
        |p| p.prefix.contains("<roblox!"),
        |_, _| AssetKind::RbxmModel
    ),
    rule!(
        |p| p.prefix.contains("<roblox xml"),
        |_, _| AssetKind::Ignored("unsupported XML")
    ),
    rule!(
        |p| p.prefix.starts_with("version") && !p.prefix.starts_with("\"version"),
        |_, _| AssetKind::Mesh
    ),
    rule!(
        |p| p.prefix.starts_with("{\"translations"),
        |_, _| AssetKind::Ignored("translation list JSON")
    ),
    rule!(
        |p| p.prefix.contains("{\"locale\":\""),
        |_, _| AssetKind::Translation
    ),
    rule!(
        |p| p.prefix.contains("PNG\r\n"),
        |_, _| AssetKind::Image(ImageFormat::Png)
    ),
    rule!(
        |p| p.prefix.starts_with("GIF87a") || p.prefix.starts_with("GIF89a"),
        |_, _| AssetKind::Image(ImageFormat::Gif)
    ),
    rule!(
        |p| p.prefix.contains("JFIF") || p.prefix.contains("Exif"),
        |_, _| AssetKind::Image(ImageFormat::Jpeg)
    ),
    rule!(
        |p| p.prefix.starts_with("RIFF") && p.prefix.contains("WEBP"),
        |_, options| {
            if options.block_avatar_images {
                AssetKind::Image(ImageFormat::WebpAvatar)
            } else {
                AssetKind::Image(ImageFormat::WebpSafe)
            }
        }
    ),
    rule!(
        |p| p.prefix.starts_with("OggS"),
        |_, _| AssetKind::Audio(AudioFormat::Ogg)
    ),
    rule!(
        |p| {
            p.prefix.starts_with("ID3")
                || (p.bytes.len() >= 2 && p.bytes[0] == 0xFF && p.bytes[1] & 0xE0 == 0xE0)
        },
        |_, _| AssetKind::Audio(AudioFormat::Mp3)
    ),
    rule!(|p| p.prefix.contains("KTX 11"), |_, _| AssetKind::KtxTexture),
    rule!(
        |p| p.prefix.starts_with("#EXTM3U"),
        |_, _| AssetKind::HlsPlaylist
    ),
    rule!(
        |p| p.prefix.contains("\"name\": \""),
        |_, _| AssetKind::FontList
    ),
    rule!(
        |p| p.prefix.contains("{\"applicationSettings"),
        |_, _| AssetKind::Ignored("flags JSON")
    ),
    rule!(
        |p| p.prefix.contains("{\"version"),
        |_, _| AssetKind::Ignored("client version JSON")
    ),
    rule!(
        |p| p.prefix.contains("GDEF") || p.prefix.contains("GPOS") || p.prefix.contains("GSUB"),
        |_, _| AssetKind::Ignored("bare font")
    ),
    rule!(|p| p.magic == 0xFD2F_B528, |_, _| AssetKind::Ignored("zstd")),
    rule!(
        |p| p.bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]),
        |_, _| AssetKind::Ignored("matroska fragment")
    ),
];

/// Classify a payload body.
///
/// Deterministic: the same body and options always yield the same kind.
pub fn identify(body: &[u8], options: &IdentifyOptions) -> AssetKind {
    if body.is_empty() {
        return AssetKind::Unknown;
    }
    let probe = Probe::new(body);
    for rule in RULES {
        if (rule.matches)(&probe) {
            return (rule.kind)(&probe, options);
        }
    }
    AssetKind::Unknown
}


#[cfg(test)]
mod identify_props {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // No input crashes the rule table, and the verdict is stable.
        #[test]
        fn identification_is_total_and_stable(
            body in proptest::collection::vec(any::<u8>(), 0..128),
        ) {
            let options = IdentifyOptions::default();
            let first = identify(&body, &options);
            prop_assert_eq!(identify(&body, &options), first);
        }
    }
}
