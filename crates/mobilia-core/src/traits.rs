//! Core traits for mobilia abstractions.
//!
//! These traits define the seams between the pipeline and its external
//! collaborators (record store, blob store, AI services), enabling
//! pluggable backends and substitution with test doubles. Every handle
//! is constructed explicitly and injected; nothing is global state.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CatalogJob, JobStatus, ProductRecord};

// =============================================================================
// RECORD STORE
// =============================================================================

/// Store for catalog jobs and product records.
///
/// Implementations must enforce the monotonic job-status state machine:
/// a transition rejected by [`JobStatus::can_transition_to`] is an error,
/// and a terminal job never changes again.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new catalog job.
    async fn create_job(&self, job: CatalogJob) -> Result<()>;

    /// Fetch a job by ID.
    async fn get_job(&self, job_id: Uuid) -> Result<Option<CatalogJob>>;

    /// Move a job through its state machine, optionally recording an error.
    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    /// Persist a new product record.
    async fn create_record(&self, record: ProductRecord) -> Result<Uuid>;

    /// All records belonging to one catalog, in creation order.
    async fn records_for_catalog(&self, catalog_id: Uuid) -> Result<Vec<ProductRecord>>;

    /// Set the associated image URL on a record.
    async fn set_image_url(&self, record_id: Uuid, url: &str) -> Result<()>;

    /// Overwrite a record's price (fusion).
    async fn set_price(&self, record_id: Uuid, price: f64) -> Result<()>;

    /// Attach (or clear) a record's embedding vector.
    async fn set_embedding(&self, record_id: Uuid, embedding: Option<Vec<f32>>) -> Result<()>;
}

// =============================================================================
// BLOB STORE
// =============================================================================

/// Key-addressed binary storage for source files and extracted images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch a blob by key.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Store a blob under a key; returns the externally visible URL.
    async fn put(&self, key: &str, data: &[u8]) -> Result<String>;

    /// Delete a blob. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

// =============================================================================
// INFERENCE
// =============================================================================

/// Backend for structured-output text completion.
///
/// `generate_json` must return the raw JSON string produced by the model;
/// callers parse it into typed candidates. Rate limiting and timeouts
/// surface as [`crate::Error::Transient`] so the shared retry utility
/// can act on them.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Generate a JSON response for the given system and user prompts.
    async fn generate_json(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts, one vector per input.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Expected dimension of the embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}
