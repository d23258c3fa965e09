//! Extraction pipeline for the Roblox client cache.
//!
//! One [`Extractor::extract`] call runs a complete pass: the cache scanner
//! enumerates entries, workers decode each RBXH frame, identify its payload
//! and hand it to the processor for the requested asset kind. Audio and
//! image payloads are written directly; font lists resolve their faces
//! against the asset delivery CDN; HLS playlists are assembled into merged
//! videos through the external media tool. Extraction history, the per-run
//! hash cache and the counters are shared across workers.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bloxtract_extract::{ExtractOptions, ExtractTarget, Extractor};
//! use bloxtract_history::ExtractionHistory;
//! use bloxtract_storage::CacheScanner;
//!
//! # async fn run() -> bloxtract_extract::Result<()> {
//! let history = Arc::new(ExtractionHistory::open(
//!     ExtractionHistory::default_path().unwrap_or_default(),
//! )?);
//! let extractor = Extractor::new(CacheScanner::detect(), history, ExtractOptions::default());
//! let report = extractor.extract(ExtractTarget::Audio).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod assembler;
pub mod cancel;
pub mod classify;
pub mod config;
pub mod error;
pub mod fonts;
pub mod media_tool;
pub mod pipeline;
pub mod processors;
pub mod progress;
pub mod report;
pub mod retry;

pub use cancel::CancelToken;
pub use config::{
    AudioClassification, Classification, ExtractOptions, ExtractTarget, FontClassification,
    ImageClassification, ParallelModel, TranslationClassification, VideoClassification,
};
pub use error::{ExtractError, Result};
pub use fonts::FontResolver;
pub use media_tool::MediaTool;
pub use pipeline::Extractor;
pub use processors::Outcome;
pub use progress::{LogLevel, NullSink, ProgressSink, ProgressUpdate};
pub use report::ExtractionReport;
pub use retry::RetryPolicy;

/// User-Agent sent on every outbound request.
pub const USER_AGENT: &str = concat!("bloxtract/", env!("CARGO_PKG_VERSION"));
