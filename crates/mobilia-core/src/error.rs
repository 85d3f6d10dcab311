//! Error types for the mobilia catalog pipeline.

use thiserror::Error;

/// Result type alias using mobilia's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for catalog ingestion operations.
///
/// The pipeline distinguishes four classes of failure:
/// - *transient* service errors (rate limits, timeouts) that are retried
///   and, on exhaustion, skip only the affected chunk/record/step;
/// - *validation* errors that silently drop a single extracted candidate;
/// - *persistence* errors that skip a single record;
/// - everything else, which fails the whole job.
#[derive(Error, Debug)]
pub enum Error {
    /// Rate-limit or timeout from an external AI/recognition/embedding call.
    #[error("Transient service error: {0}")]
    Transient(String),

    /// An extracted candidate is missing required fields or has a bad anchor.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A record failed to save to the record store.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The declared catalog format is not supported.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The source file could not be parsed as a binary archive container.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Document text-recognition failed.
    #[error("Recognition error: {0}")]
    Recognition(String),

    /// LLM inference/generation failed.
    #[error("Inference error: {0}")]
    Inference(String),

    /// Embedding generation failed.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Blob store operation failed.
    #[error("Blob error: {0}")]
    Blob(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP/network request failed.
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is worth retrying with backoff.
    ///
    /// Only transient service errors qualify; everything else either
    /// skips the item or fails the job outright.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Transient(format!("request timed out: {}", e))
        } else {
            Error::Request(e.to_string())
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Error::Archive(e.to_string())
    }
}
