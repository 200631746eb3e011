//! Typed errors for the crawler library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so the orchestrator can
//! tell task-level failures from run-level ones by type alone.

use thiserror::Error;

/// Errors raised by a [`Renderer`](crate::traits::renderer::Renderer).
///
/// The orchestrator treats every variant as a fetch failure; the variant only
/// shapes the recorded `error_detail`.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Network or protocol failure before a response arrived
    #[error("transport error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Render did not finish in time
    #[error("timed out after {seconds}s rendering {url}")]
    Timeout { url: String, seconds: u64 },

    /// Anti-bot challenge or block page
    #[error("blocked at {url}: {reason}")]
    Blocked { url: String, reason: String },

    /// Non-success HTTP status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Invalid URL format
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },
}

/// Errors raised while turning rendered content into structured fields.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// A field the project document cannot exist without
    #[error("required field missing: {field}")]
    MissingField { field: &'static str },

    /// A CSS selector failed to compile
    #[error("invalid selector {selector}: {reason}")]
    Selector { selector: String, reason: String },
}

/// Per-image download failures.
#[derive(Debug, Error)]
pub enum AssetError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Non-success HTTP status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Payload was neither an image nor a resolvable gallery page
    #[error("not an image payload (content type: {content_type})")]
    NotAnImage { content_type: String },

    /// Gallery page did not name a downloadable image
    #[error("could not resolve gallery image: {reason}")]
    Unresolvable { reason: String },

    /// Fetch did not finish in time
    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Writing the image to disk failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssetError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::NotAnImage { .. } | Self::Unresolvable { .. } | Self::Io(_) => false,
        }
    }
}

/// Checkpoint store failures. All of them are fatal to a run.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store is unreadable or malformed
    #[error("corrupt checkpoint state in {location}: {reason}")]
    CorruptState { location: String, reason: String },

    /// Underlying I/O failed
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding failed
    #[error("checkpoint CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl StoreError {
    pub(crate) fn corrupt(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptState {
            location: location.into(),
            reason: reason.into(),
        }
    }
}

/// Failures loading the injected session bundle.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot read session file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid session file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Run-level errors. Any of these aborts the batch.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Checkpoint store load or commit failed
    #[error("checkpoint store failure: {0}")]
    Store(#[from] StoreError),

    /// Session bundle could not be loaded
    #[error("session failure: {0}")]
    Session(#[from] SessionError),

    /// Output root is unusable
    #[error("output directory {path}: {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for render operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// Result type alias for extraction operations.
pub type ExtractionResult<T> = std::result::Result<T, ExtractionError>;

/// Result type alias for asset operations.
pub type AssetResult<T> = std::result::Result<T, AssetError>;

/// Result type alias for checkpoint store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for run-level operations.
pub type Result<T> = std::result::Result<T, CrawlError>;
