//! Core data models for the mobilia catalog pipeline.
//!
//! These types are shared across all mobilia crates and represent the
//! domain entities of catalog ingestion: the job, the transient
//! extraction artifacts, and the persisted product records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// =============================================================================
// JOB TYPES
// =============================================================================

/// Status of a catalog ingestion job.
///
/// Transitions are one-directional: `Pending → Processing → {Completed,
/// Failed}`. Once terminal, a job is never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the monotonic state machine allows moving to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Processing) => true,
            (JobStatus::Pending, JobStatus::Failed) => true,
            (JobStatus::Processing, JobStatus::Completed) => true,
            (JobStatus::Processing, JobStatus::Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Declared format of an uploaded catalog file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogFormat {
    /// Spreadsheet-like source (rows and columns).
    Spreadsheet,
    /// Page-based document source.
    Document,
}

impl CatalogFormat {
    /// Resolve a declared file type or extension to a format.
    pub fn from_file_type(file_type: &str) -> Option<Self> {
        match file_type.trim_start_matches('.').to_lowercase().as_str() {
            "xlsx" | "xls" | "xlsm" | "spreadsheet" => Some(Self::Spreadsheet),
            "pdf" | "docx" | "document" => Some(Self::Document),
            _ => None,
        }
    }
}

/// One asynchronous ingestion run for a single uploaded catalog file.
///
/// Mutated only by the orchestrator; status transitions are monotonic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogJob {
    pub id: Uuid,
    pub catalog_id: Uuid,
    pub user_id: Uuid,
    pub source_blob_key: String,
    pub file_name: String,
    pub format: CatalogFormat,
    pub status: JobStatus,
    /// Optional secondary, price-only source for fusion.
    pub secondary_price_blob_key: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input describing a catalog submission, as handed to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub catalog_id: Uuid,
    pub user_id: Uuid,
    pub source_blob_key: String,
    pub file_name: String,
    pub file_type: String,
    pub upload_mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_price_blob_key: Option<String>,
}

// =============================================================================
// TRANSIENT EXTRACTION TYPES
// =============================================================================

/// Positional representation of one spreadsheet row.
///
/// Exists only during a run; `number` is 1-based and becomes the source
/// anchor of any record extracted from this row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub number: u32,
    /// Column letter → cell value, ordered by column.
    pub cells: BTreeMap<String, String>,
}

impl RawRow {
    /// Whether every cell in the row is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.cells.values().all(|v| v.trim().is_empty())
    }
}

/// Recognized text of one document page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPageText {
    /// 1-based page number; becomes the source anchor.
    pub page: u32,
    pub text: String,
}

/// AI-extracted product candidate, before validation and persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    /// 1-based source row or page number. Mandatory and positive.
    #[serde(default, alias = "row", alias = "page")]
    pub source_anchor: u32,
}

impl ExtractedRecord {
    /// Validate the candidate per the extraction contract.
    ///
    /// Name, code, and a positive anchor are required; anything else is
    /// optional with defaults already applied by serde.
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::Validation("candidate has empty name".into()));
        }
        if self.code.trim().is_empty() {
            return Err(crate::Error::Validation(format!(
                "candidate '{}' has empty code",
                self.name
            )));
        }
        if self.source_anchor == 0 {
            return Err(crate::Error::Validation(format!(
                "candidate '{}' has no positive source anchor",
                self.name
            )));
        }
        Ok(())
    }
}

/// Hints returned by the tabular extractor alongside the records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionHints {
    /// Column letter believed to hold the product code.
    #[serde(default)]
    pub code_column: Option<String>,
    /// Column letter believed to hold embedded images.
    #[serde(default)]
    pub image_column: Option<String>,
}

/// Raster image found inside the source file's binary container.
///
/// Transient: only its storage URL is ever persisted, and only once the
/// image has been associated with a record.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub data: Vec<u8>,
    /// 1-based row (or page) anchor; 0 when the container carried no
    /// positional metadata for this image.
    pub anchor: u32,
    /// Sheet name or page identifier the image came from.
    pub sheet_or_page: String,
    /// Lowercase file extension, e.g. "png".
    pub extension: String,
}

impl EmbeddedImage {
    /// Whether this image carries a usable positional anchor.
    pub fn is_anchored(&self) -> bool {
        self.anchor > 0
    }
}

// =============================================================================
// PERSISTED TYPES
// =============================================================================

/// Persisted product record, scoped to exactly one catalog job.
///
/// Created by the orchestrator after validation; `image_url` is set by
/// the associator, `price` may be overwritten by fusion, `embedding` by
/// the embedding generator. Never deleted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: Uuid,
    pub catalog_id: Uuid,
    pub name: String,
    pub code: String,
    pub price: f64,
    pub description: String,
    pub category: String,
    pub materials: Vec<String>,
    pub colors: Vec<String>,
    pub sizes: Vec<String>,
    pub source_anchor: u32,
    pub image_url: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductRecord {
    /// Build a fresh record from a validated extraction candidate.
    pub fn from_extracted(catalog_id: Uuid, rec: ExtractedRecord) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            catalog_id,
            name: rec.name,
            code: rec.code,
            price: rec.price,
            description: rec.description,
            category: rec.category,
            materials: rec.materials,
            colors: rec.colors,
            sizes: rec.sizes,
            source_anchor: rec.source_anchor,
            image_url: None,
            embedding: None,
            is_edited: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Salient textual detail used for vision comparison and embeddings.
    pub fn detail_text(&self) -> String {
        let mut parts = vec![self.name.clone(), self.code.clone()];
        if !self.description.is_empty() {
            parts.push(self.description.clone());
        }
        if !self.category.is_empty() {
            parts.push(self.category.clone());
        }
        if !self.materials.is_empty() {
            parts.push(self.materials.join(", "));
        }
        if !self.colors.is_empty() {
            parts.push(self.colors.join(", "));
        }
        parts.join(" | ")
    }
}

/// Secondary price-only extraction item.
///
/// Only ever updates existing records; never creates new ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceItem {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
}
