//! Extraction error taxonomy.
//!
//! Per-entry failures are contained by the orchestrator: a bad frame, an
//! unwritable output file or an exhausted retry budget costs one counter
//! and the run continues. Only an uncreatable output root, a refused
//! history load or cancellation abort a run.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for extraction operations
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Errors that can occur during extraction
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No usable cache input exists
    #[error("cache path unavailable: {0}")]
    CachePathUnavailable(PathBuf),

    /// The output root could not be created
    #[error("cannot create output directory {path}: {source}")]
    OutputUnavailable {
        /// Directory that failed to materialize
        path: PathBuf,
        /// Underlying filesystem error
        source: std::io::Error,
    },

    /// A cache frame failed to decode
    #[error(transparent)]
    Frame(#[from] bloxtract_formats::RbxhError),

    /// A JSON document payload failed to parse
    #[error(transparent)]
    Document(#[from] bloxtract_formats::DocumentError),

    /// A playlist failed to parse
    #[error(transparent)]
    Playlist(#[from] bloxtract_formats::PlaylistError),

    /// History store failure
    #[error(transparent)]
    History(#[from] bloxtract_history::HistoryError),

    /// Filesystem failure while writing an output
    #[error("write failure: {0}")]
    Write(#[from] std::io::Error),

    /// Transient network failure, eligible for retry
    #[error("network error: {0}")]
    NetworkTransient(String),

    /// The remote answered with a non-success status
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// The external media tool is not installed
    #[error("media tool not found on this system")]
    ToolMissing,

    /// The external media tool failed or timed out
    #[error("media tool failure: {0}")]
    ToolFailure(String),

    /// The run was cancelled cooperatively
    #[error("operation cancelled")]
    Cancelled,
}

impl ExtractError {
    /// Whether a retry may succeed.
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            Self::NetworkTransient(_) | Self::HttpStatus(_)
        )
    }
}

impl From<reqwest::Error> for ExtractError {
    fn from(err: reqwest::Error) -> Self {
        Self::NetworkTransient(err.to_string())
    }
}
