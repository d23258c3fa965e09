//! Font family documents.
//!
//! A font-list payload is JSON declaring one family and its faces:
//!
//! ```json
//! { "name": "Roboto", "faces": [ { "name": "Regular", "assetId": "rbxassetid://12345" } ] }
//! ```
//!
//! Face asset ids come in three flavors: `rbxassetid://N` points at the
//! asset delivery CDN, `rbxasset://...` names a file shipped with the
//! client (never downloaded), and anything else is malformed.

use serde::{Deserialize, Serialize};

use crate::DocumentError;

/// Scheme prefix for downloadable font assets.
pub const REMOTE_ASSET_SCHEME: &str = "rbxassetid://";

/// Scheme prefix for assets bundled with the client.
pub const LOCAL_ASSET_SCHEME: &str = "rbxasset://";

/// A parsed font family document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontList {
    /// Family name, e.g. `Roboto`
    pub name: String,
    /// Declared faces
    #[serde(default)]
    pub faces: Vec<FontFace>,
}

/// One face of a font family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontFace {
    /// Face name, e.g. `Regular` or `Bold Italic`
    #[serde(default = "default_face_name")]
    pub name: String,
    /// Asset reference string
    #[serde(rename = "assetId", default)]
    pub asset_id: String,
}

fn default_face_name() -> String {
    "Regular".to_string()
}

/// Where a face's asset reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontAssetRef {
    /// Downloadable asset with its numeric id
    Remote(String),
    /// Bundled with the client; nothing to fetch
    Local,
    /// Unrecognized reference
    Invalid,
}

impl FontFace {
    /// Classify this face's asset reference.
    pub fn asset_ref(&self) -> FontAssetRef {
        if let Some(id) = self.asset_id.strip_prefix(REMOTE_ASSET_SCHEME) {
            let id = id.trim();
            if id.is_empty() {
                FontAssetRef::Invalid
            } else {
                FontAssetRef::Remote(id.to_string())
            }
        } else if self.asset_id.starts_with(LOCAL_ASSET_SCHEME) {
            FontAssetRef::Local
        } else {
            FontAssetRef::Invalid
        }
    }
}

impl FontList {
    /// Parse a font-list payload. Invalid UTF-8 is decoded lossily first,
    /// matching how the client itself treats these documents.
    pub fn parse(bytes: &[u8]) -> Result<Self, DocumentError> {
        let text = String::from_utf8_lossy(bytes);
        Ok(serde_json::from_str(&text)?)
    }
}
