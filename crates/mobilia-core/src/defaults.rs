//! Centralized default constants for the mobilia pipeline.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers. Organized by domain area; document the rationale for any
//! new value.

// =============================================================================
// TABULAR EXTRACTION
// =============================================================================

/// Rows per LLM extraction chunk. Sized to stay well inside model context
/// windows while keeping the number of calls (and rate-limit pressure) low.
pub const CHUNK_ROWS: usize = 25;

/// Fixed pause after each chunk, independent of errors, to avoid bursting
/// the completion service's rate limit.
pub const CHUNK_PAUSE_MS: u64 = 1_000;

// =============================================================================
// DOCUMENT EXTRACTION
// =============================================================================

/// Maximum pages processed per document to bound recognition/LLM cost.
pub const MAX_DOCUMENT_PAGES: usize = 50;

/// Maximum whitespace-separated tokens in a pending candidate name.
pub const CANDIDATE_NAME_MAX_TOKENS: usize = 7;

/// Maximum characters in a pending candidate name.
pub const CANDIDATE_NAME_MAX_CHARS: usize = 60;

// =============================================================================
// IMAGE ASSOCIATION
// =============================================================================

/// Fixed pause between vision confirm-match calls for one record.
pub const VISION_PAUSE_MS: u64 = 500;

// =============================================================================
// RETRY
// =============================================================================

/// Maximum attempts for transient external-service errors.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (doubles each attempt).
pub const RETRY_BASE_DELAY_MS: u64 = 2_000;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name.
pub const EMBED_MODEL: &str = "text-embedding-3-small";

/// Default embedding vector dimension.
pub const EMBED_DIMENSION: usize = 1536;

/// Minimum concatenated-text length worth embedding. Shorter strings carry
/// too little signal to be useful for semantic search.
pub const EMBED_MIN_TEXT_LEN: usize = 10;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default OpenAI-compatible API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat/extraction model.
pub const CHAT_MODEL: &str = "gpt-4o-mini";

/// Default vision model for image match confirmation.
pub const VISION_MODEL: &str = "gpt-4o";

/// Timeout for chat/vision requests in seconds.
pub const CHAT_TIMEOUT_SECS: u64 = 120;

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Environment variable for the API key.
pub const ENV_API_KEY: &str = "MOBILIA_API_KEY";

/// Environment variable for the API base URL.
pub const ENV_BASE_URL: &str = "MOBILIA_API_BASE";

// =============================================================================
// RECOGNITION
// =============================================================================

/// Poll interval while waiting for an asynchronous recognition job (ms).
pub const RECOGNITION_POLL_INTERVAL_MS: u64 = 2_000;

/// Maximum polls before a recognition job is considered timed out.
pub const RECOGNITION_MAX_POLLS: u32 = 150;

// =============================================================================
// JOB PROCESSING
// =============================================================================

/// Default worker event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 64;

/// Maximum source file size accepted for ingestion (50 MB).
pub const MAX_SOURCE_SIZE_BYTES: usize = 50 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_defaults_are_bounded() {
        const {
            assert!(RETRY_MAX_ATTEMPTS >= 1);
            assert!(RETRY_MAX_ATTEMPTS <= 10);
            assert!(RETRY_BASE_DELAY_MS > 0);
        }
    }

    #[test]
    fn candidate_name_limits_consistent() {
        // A name of max tokens must be representable within max chars.
        const {
            assert!(CANDIDATE_NAME_MAX_TOKENS < CANDIDATE_NAME_MAX_CHARS);
        }
    }

    #[test]
    fn chunking_defaults_positive() {
        const {
            assert!(CHUNK_ROWS > 0);
            assert!(MAX_DOCUMENT_PAGES > 0);
        }
    }
}
