//! Error types for the fetch pipeline.

use thiserror::Error;

/// Main error type for all resolution, download and tagging operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The source URL could not be interpreted (e.g. no trailing track id).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The session credential (ARL cookie) was rejected or has expired.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// No platform link or no track record was found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The media endpoint reported an error; the provider's message is preserved.
    #[error("Media resolution failed: {0}")]
    MediaResolution(String),

    /// HTTP request failed at the network level.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Status code returned by the server.
        status: reqwest::StatusCode,
        /// URL that was requested.
        url: String,
    },

    /// JSON parsing failed.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Every candidate platform was tried and none produced audio.
    #[error("All {attempts} download attempts failed, last error: {last}")]
    AllPlatformsFailed {
        /// Number of downloads that were actually attempted.
        attempts: usize,
        /// The final underlying error.
        #[source]
        last: Box<FetchError>,
    },

    /// No registered downloader can handle the link.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Cryptographic operation failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// A tag block could not be built.
    #[error("Tagging error: {0}")]
    Tagging(String),

    /// Invalid configuration (credentials, endpoints).
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Whether this is a network or HTTP status failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Request(_) | FetchError::HttpStatus { .. })
    }

    /// Whether the operation was aborted by the caller.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;
