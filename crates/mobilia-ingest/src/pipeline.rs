//! Job orchestration: the end-to-end ingestion run for one uploaded
//! catalog file.
//!
//! The pipeline owns nothing global; every collaborator comes in as an
//! `Arc<dyn Trait>` handle, so any stage can be substituted in tests.
//! A run is best-effort: per-item failures (a skipped chunk, a dropped
//! candidate, a failed embedding) degrade the [`JobReport`] rather than
//! fail the job. Only errors that make the whole run meaningless, a
//! missing source blob, an unreadable workbook, a recognition failure,
//! mark the job failed.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use mobilia_core::defaults;
use mobilia_core::retry::RetryPolicy;
use mobilia_core::{
    BlobStore, CatalogFormat, CatalogJob, ChatBackend, EmbeddingBackend, Error, ExtractedRecord,
    IngestRequest, ItemOutcome, JobReport, JobStatus, ProductRecord, RecordStore, Result,
    StageReport,
};
use mobilia_extract::{extract_images, read_rows, DocumentExtractor, TabularExtractor};
use mobilia_inference::{RecognitionBackend, VisionBackend};

use crate::associate::ImageAssociator;
use crate::embed::generate_embeddings;
use crate::fusion::merge_prices;

/// End-to-end ingestion pipeline for one catalog source file.
pub struct IngestPipeline {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    chat: Arc<dyn ChatBackend>,
    vision: Arc<dyn VisionBackend>,
    embedder: Arc<dyn EmbeddingBackend>,
    recognition: Arc<dyn RecognitionBackend>,
    retry: RetryPolicy,
    chunk_pause: Duration,
    vision_pause: Duration,
}

impl IngestPipeline {
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        chat: Arc<dyn ChatBackend>,
        vision: Arc<dyn VisionBackend>,
        embedder: Arc<dyn EmbeddingBackend>,
        recognition: Arc<dyn RecognitionBackend>,
    ) -> Self {
        Self {
            records,
            blobs,
            chat,
            vision,
            embedder,
            recognition,
            retry: RetryPolicy::default(),
            chunk_pause: Duration::from_millis(defaults::CHUNK_PAUSE_MS),
            vision_pause: Duration::from_millis(defaults::VISION_PAUSE_MS),
        }
    }

    /// Override the retry policy for external service calls.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the pause after each extraction chunk or page.
    pub fn with_chunk_pause(mut self, pause: Duration) -> Self {
        self.chunk_pause = pause;
        self
    }

    /// Override the pause between vision confirmation calls.
    pub fn with_vision_pause(mut self, pause: Duration) -> Self {
        self.vision_pause = pause;
        self
    }

    /// Validate a submission and persist a pending job for it.
    ///
    /// An undeclarable file type is rejected here, before any job
    /// exists to fail.
    pub async fn create_job(&self, request: &IngestRequest) -> Result<CatalogJob> {
        let format = CatalogFormat::from_file_type(&request.file_type)
            .ok_or_else(|| Error::UnsupportedFormat(request.file_type.clone()))?;

        let job = CatalogJob {
            id: Uuid::new_v4(),
            catalog_id: request.catalog_id,
            user_id: request.user_id,
            source_blob_key: request.source_blob_key.clone(),
            file_name: request.file_name.clone(),
            format,
            status: JobStatus::Pending,
            secondary_price_blob_key: request.secondary_price_blob_key.clone(),
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.records.create_job(job.clone()).await?;
        info!(
            component = "pipeline",
            job_id = %job.id,
            catalog_id = %job.catalog_id,
            format = %request.file_type,
            "Job created"
        );
        Ok(job)
    }

    /// Run one job to completion, marking it completed or failed.
    pub async fn run(&self, job: &CatalogJob) -> Result<JobReport> {
        self.records
            .update_job_status(job.id, JobStatus::Processing, None)
            .await?;
        info!(component = "pipeline", job_id = %job.id, "Job processing");

        match self.execute(job).await {
            Ok(report) => {
                self.records
                    .update_job_status(job.id, JobStatus::Completed, None)
                    .await?;
                info!(
                    component = "pipeline",
                    job_id = %job.id,
                    records = report.records_persisted,
                    associations = report.associations_total(),
                    failures = report.item_failures,
                    "Job completed"
                );
                Ok(report)
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(update_err) = self
                    .records
                    .update_job_status(job.id, JobStatus::Failed, Some(&message))
                    .await
                {
                    warn!(
                        component = "pipeline",
                        job_id = %job.id,
                        error = %update_err,
                        "Could not mark job failed"
                    );
                }
                warn!(component = "pipeline", job_id = %job.id, error = %message, "Job failed");
                Err(e)
            }
        }
    }

    /// The run body. The temp directory guard drops on every exit path,
    /// so the working copy never outlives the run.
    async fn execute(&self, job: &CatalogJob) -> Result<JobReport> {
        let mut report = JobReport::default();

        let source = self.blobs.get(&job.source_blob_key).await?;
        if source.len() > defaults::MAX_SOURCE_SIZE_BYTES {
            return Err(Error::InvalidInput(format!(
                "source file is {} bytes, limit is {}",
                source.len(),
                defaults::MAX_SOURCE_SIZE_BYTES
            )));
        }

        let workdir = tempfile::tempdir()?;
        let working_copy = workdir.path().join(sanitize_file_name(&job.file_name));
        tokio::fs::write(&working_copy, &source).await?;

        // Extraction. Validation drops are counted apart from skipped
        // chunks or pages, which only show up as item failures.
        let mut extraction = StageReport::default();
        let (candidates, dropped) = match job.format {
            CatalogFormat::Spreadsheet => self.extract_tabular(&working_copy, &mut extraction).await?,
            CatalogFormat::Document => self.extract_document(job, &source, &mut extraction).await?,
        };
        report.records_dropped = dropped;
        report.absorb_failures(&extraction);

        // Persistence, per record.
        let mut persistence = StageReport::default();
        for candidate in candidates {
            let record = ProductRecord::from_extracted(job.catalog_id, candidate);
            let label = format!("record {} (row {})", record.code, record.source_anchor);
            match self.records.create_record(record).await {
                Ok(_) => {
                    report.records_persisted += 1;
                    persistence.record(ItemOutcome::success(label));
                }
                Err(e) => {
                    warn!(
                        component = "pipeline",
                        job_id = %job.id,
                        error = %e,
                        "Record skipped, could not persist"
                    );
                    persistence.record(ItemOutcome::failure(label, e));
                }
            }
        }
        report.absorb_failures(&persistence);

        let persisted = self.records.records_for_catalog(job.catalog_id).await?;

        // Image association.
        let images = extract_images(&source)?;
        report.images_extracted = images.len();
        let mut association = StageReport::default();
        let associator = ImageAssociator::new(
            self.records.clone(),
            self.blobs.clone(),
            self.vision.clone(),
        )
        .with_vision_pause(self.vision_pause);
        let stats = associator
            .run(job, &persisted, &images, &mut association)
            .await?;
        report.associations_confirmed = stats.confirmed;
        report.associations_fallback = stats.fallback;
        report.absorb_failures(&association);

        // Price fusion from the secondary file, when present.
        if let Some(ref price_key) = job.secondary_price_blob_key {
            let mut fusion = StageReport::default();
            report.prices_fused = self.fuse_prices(price_key, &persisted, &mut fusion).await?;
            report.absorb_failures(&fusion);
        }

        // Embeddings last, over the final persisted state.
        let persisted = self.records.records_for_catalog(job.catalog_id).await?;
        let mut embedding = StageReport::default();
        report.embeddings_stored =
            generate_embeddings(&self.records, &self.embedder, &persisted, &mut embedding).await?;
        report.absorb_failures(&embedding);

        Ok(report)
    }

    async fn extract_tabular(
        &self,
        working_copy: &Path,
        report: &mut StageReport,
    ) -> Result<(Vec<ExtractedRecord>, usize)> {
        let data = tokio::fs::read(working_copy).await?;
        let rows = read_rows(&data)?;
        let extractor = TabularExtractor::new(self.chat.clone())
            .with_retry_policy(self.retry.clone())
            .with_chunk_pause(self.chunk_pause);
        let extraction = extractor.extract(&rows, report).await?;
        if let Some(hints) = extraction.hints {
            info!(
                component = "pipeline",
                code_column = hints.code_column.as_deref().unwrap_or("-"),
                image_column = hints.image_column.as_deref().unwrap_or("-"),
                "Column hints received"
            );
        }
        Ok((extraction.records, extraction.dropped))
    }

    async fn extract_document(
        &self,
        job: &CatalogJob,
        source: &[u8],
        report: &mut StageReport,
    ) -> Result<(Vec<ExtractedRecord>, usize)> {
        let extractor = DocumentExtractor::new(self.chat.clone(), self.recognition.clone())
            .with_retry_policy(self.retry.clone())
            .with_page_pause(self.chunk_pause);
        let extraction = extractor
            .extract(source, content_type_for(&job.file_name), report)
            .await?;
        Ok((extraction.records, extraction.dropped))
    }

    /// Parse the secondary price file and merge prices into existing
    /// records. Only spreadsheet price files are understood; anything
    /// else is skipped with a warning rather than failing the job.
    async fn fuse_prices(
        &self,
        price_key: &str,
        persisted: &[ProductRecord],
        report: &mut StageReport,
    ) -> Result<usize> {
        let data = self.blobs.get(price_key).await?;
        let rows = match read_rows(&data) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    component = "pipeline",
                    error = %e,
                    "Secondary price file is not a readable spreadsheet, skipping fusion"
                );
                return Ok(0);
            }
        };

        let extractor = TabularExtractor::new(self.chat.clone())
            .with_retry_policy(self.retry.clone())
            .with_chunk_pause(self.chunk_pause);
        let items = extractor.extract_price_items(&rows, report).await?;
        merge_prices(&self.records, persisted, &items, report).await
    }
}

/// Strip path separators so a hostile file name cannot escape the
/// temp directory.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        "source".to_string()
    } else {
        cleaned
    }
}

/// Content type handed to the recognition service for a document.
fn content_type_for(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".pdf") {
        "application/pdf"
    } else if lower.ends_with(".docx") {
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    } else {
        "application/octet-stream"
    }
}
