use std::sync::Arc;

/// Error delivered to listeners or returned from blocking loads.
///
/// Cloneable so a single outcome can be handed to every subscriber of a
/// coalesced operation.
#[derive(Debug, thiserror::Error, Clone)]
pub enum LoadError {
    #[error("Resource not found: {source_id} ({reason})")]
    NotFound { source_id: String, reason: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Loader has been shut down")]
    Shutdown,

    #[error("Blocking load called from a single-threaded runtime")]
    BlockingInRuntime,
}

impl LoadError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::NotFound { .. })
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, LoadError::Decode(_))
    }
}

/// Failure raised by a content fetcher while opening or streaming a source.
#[derive(Debug, thiserror::Error, Clone)]
pub enum FetchError {
    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid source identifier: {0}")]
    InvalidSource(String),

    #[error("Server returned status code {0}")]
    StatusCode(reqwest::StatusCode),

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("HTTP error: {source}")]
    Http {
        #[from]
        source: Arc<reqwest::Error>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: Arc<std::io::Error>,
    },
}

// Manual From impls because of the Arc wrapping.
impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http {
            source: Arc::new(err),
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            return FetchError::NotFound(err.to_string());
        }
        FetchError::Io {
            source: Arc::new(err),
        }
    }
}

/// Failure raised by an image codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed image payload: {0}")]
    Malformed(String),

    #[error("Unsupported image: {0}")]
    Unsupported(String),

    #[error("Encoding failed: {0}")]
    Encode(String),
}

/// Cache tier failure. Never surfaced to callers; the offending tier logs it
/// and degrades.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Cache metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Cache worker failed: {0}")]
    Join(String),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        CacheError::Join(err.to_string())
    }
}

/// Failure while assembling a [`Loader`](crate::Loader).
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to create fetcher: {0}")]
    Fetcher(#[from] FetchError),

    #[error("Loader must be built inside a Tokio runtime")]
    NoRuntime,
}
