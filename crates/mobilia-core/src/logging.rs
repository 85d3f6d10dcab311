//! Structured logging schema and field name constants for mobilia.
//!
//! All crates use these constants for consistent structured logging fields.
//! This ensures log aggregation tools (Loki, Elasticsearch) can query by
//! standardized field names across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (job start/finish), stage completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (rows, candidates) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "ingest", "extract", "inference", "store"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "tabular", "document", "archive", "associator", "openai"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "extract_rows", "confirm_match", "embed_texts"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Ingestion job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Catalog UUID the job belongs to.
pub const CATALOG_ID: &str = "catalog_id";

/// Product record UUID being operated on.
pub const RECORD_ID: &str = "record_id";

/// Row or page anchor of the item in the source file (1-based).
pub const ANCHOR: &str = "anchor";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows read from a worksheet.
pub const ROW_COUNT: &str = "row_count";

/// Number of pages recognized in a document.
pub const PAGE_COUNT: &str = "page_count";

/// Number of records produced by an extraction stage.
pub const RECORD_COUNT: &str = "record_count";

/// Number of embedded images found in a container.
pub const IMAGE_COUNT: &str = "image_count";

/// Number of candidate records for an image association.
pub const CANDIDATE_COUNT: &str = "candidate_count";

/// Number of input texts sent to an embedding model.
pub const INPUT_COUNT: &str = "input_count";

/// Retry attempt number (1-based).
pub const ATTEMPT: &str = "attempt";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
