//! Parsers for the on-disk formats found in the Roblox client HTTP cache.
//!
//! The client wraps every cached HTTP response in a small binary frame
//! (magic `RBXH`) that carries the request URL, the response status, the
//! response headers and the body. This crate decodes that frame, classifies
//! the body into an [`AssetKind`], and parses the compound document formats
//! that some payloads contain:
//!
//! - [`rbxh`] — the RBXH cache frame codec
//! - [`identify`] — payload classification from prefixes and magic numbers
//! - [`hls`] — master/media HLS playlists with the `RBX-BASE-URI` extension
//! - [`fontlist`] — font family documents mapping faces to asset ids
//! - [`translation`] — locale documents with content-type inference
//!
//! # Example
//!
//! ```rust,ignore
//! use bloxtract_formats::{RbxhFrame, identify, IdentifyOptions};
//!
//! let frame = RbxhFrame::parse(&cache_bytes)?;
//! let kind = identify(&frame.body, &IdentifyOptions::default());
//! ```

#![warn(missing_docs)]

pub mod fontlist;
pub mod hls;
pub mod identify;
pub mod rbxh;
pub mod translation;

pub use fontlist::{FontAssetRef, FontFace, FontList};
pub use hls::{MasterPlaylist, QualityPreference, VideoStream};
pub use identify::{AssetKind, AudioFormat, IdentifyOptions, ImageFormat, identify};
pub use rbxh::{RbxhError, RbxhFrame, RbxhParser};
pub use translation::{ContentType, TranslationDocument};

use thiserror::Error;

/// Errors raised while decoding a JSON-bearing cache payload.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The payload was not valid JSON of the expected shape
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while parsing an HLS playlist.
#[derive(Debug, Error)]
pub enum PlaylistError {
    /// The playlist does not carry the Roblox base-URI definition
    #[error("playlist has no RBX-BASE-URI definition")]
    MissingBaseUri,

    /// The master playlist declares no usable streams
    #[error("playlist declares no streams")]
    NoStreams,
}
