//! Image–record association with vision confirmation and a singleton
//! positional fallback.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use mobilia_core::defaults;
use mobilia_core::{
    BlobStore, CatalogJob, EmbeddedImage, EmbeddingBackend, ItemOutcome, ProductRecord,
    RecordStore, Result, StageReport,
};
use mobilia_inference::VisionBackend;

/// Association totals for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssociationStats {
    /// Associations confirmed by the vision service.
    pub confirmed: usize,
    /// Associations made by the singleton positional fallback.
    pub fallback: usize,
}

/// Binds extracted images to persisted records.
///
/// Per record, in record order: candidates are the unused images on the
/// record's exact anchor. Each candidate gets one vision call, paced by
/// a fixed delay. Exactly one confirmed match associates; two or more
/// is ambiguous and associates nothing; zero confirmed with exactly one
/// unused candidate falls back to that candidate. An image is never
/// consumed by more than one record.
///
/// A vision service that is down for the whole job degrades every call
/// to "not confirmed", which collapses association to the fallback
/// path. The job still completes; the stats keep confirmed and
/// fallback counts separate so the degradation is observable.
pub struct ImageAssociator {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    vision: Arc<dyn VisionBackend>,
    /// Optional post-association embedding side effect; never fatal.
    image_embedder: Option<Arc<dyn EmbeddingBackend>>,
    vision_pause: Duration,
}

impl ImageAssociator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        vision: Arc<dyn VisionBackend>,
    ) -> Self {
        Self {
            records,
            blobs,
            vision,
            image_embedder: None,
            vision_pause: Duration::from_millis(defaults::VISION_PAUSE_MS),
        }
    }

    /// Enable the post-association embedding side effect.
    pub fn with_image_embedder(mut self, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        self.image_embedder = Some(embedder);
        self
    }

    /// Set the pause between vision calls.
    pub fn with_vision_pause(mut self, pause: Duration) -> Self {
        self.vision_pause = pause;
        self
    }

    /// Associate images to the job's records. Runs to completion even
    /// when every vision call fails.
    pub async fn run(
        &self,
        job: &CatalogJob,
        records: &[ProductRecord],
        images: &[EmbeddedImage],
        report: &mut StageReport,
    ) -> Result<AssociationStats> {
        let mut stats = AssociationStats::default();
        if images.is_empty() {
            info!(
                component = "associator",
                job_id = %job.id,
                "No embedded images, nothing to associate"
            );
            return Ok(stats);
        }

        let mut used = vec![false; images.len()];

        for record in records {
            let candidates: Vec<usize> = images
                .iter()
                .enumerate()
                .filter(|(i, img)| {
                    !used[*i] && img.is_anchored() && img.anchor == record.source_anchor
                })
                .map(|(i, _)| i)
                .collect();

            if candidates.is_empty() {
                continue;
            }

            debug!(
                component = "associator",
                record_id = %record.id,
                anchor = record.source_anchor,
                candidate_count = candidates.len(),
                "Confirming candidates"
            );

            let mut confirmed = Vec::new();
            for &idx in &candidates {
                let image = &images[idx];
                match self
                    .vision
                    .confirm_match(&image.data, &mime_for(image), &record.detail_text())
                    .await
                {
                    Ok(verdict) if verdict.is_match => confirmed.push(idx),
                    Ok(_) => {}
                    Err(e) => {
                        // Treated as "not confirmed"; the fallback below can
                        // still associate an unambiguous candidate.
                        debug!(
                            component = "associator",
                            record_id = %record.id,
                            error = %e,
                            "Vision call failed, candidate unconfirmed"
                        );
                    }
                }
                tokio::time::sleep(self.vision_pause).await;
            }

            let label = format!("record {} (row {})", record.id, record.source_anchor);
            let chosen = match confirmed.len() {
                1 => Some((confirmed[0], true)),
                0 if candidates.len() == 1 => Some((candidates[0], false)),
                0 => {
                    debug!(
                        component = "associator",
                        record_id = %record.id,
                        candidate_count = candidates.len(),
                        "No confirmed match and no lone candidate, record keeps no image"
                    );
                    None
                }
                n => {
                    warn!(
                        component = "associator",
                        record_id = %record.id,
                        anchor = record.source_anchor,
                        confirmed = n,
                        "Ambiguous anchor, multiple confirmed matches, associating nothing"
                    );
                    report.record(ItemOutcome::failure(
                        label.clone(),
                        format!("{} confirmed matches on one anchor", n),
                    ));
                    None
                }
            };

            if let Some((idx, was_confirmed)) = chosen {
                // A persistence failure skips this record and leaves the
                // image unused for the ones that follow.
                match self.associate(job, record, &images[idx]).await {
                    Ok(()) => {
                        used[idx] = true;
                        if was_confirmed {
                            stats.confirmed += 1;
                        } else {
                            stats.fallback += 1;
                        }
                        report.record(ItemOutcome::success(label));
                    }
                    Err(e) => {
                        warn!(
                            component = "associator",
                            record_id = %record.id,
                            error = %e,
                            "Record skipped, could not persist association"
                        );
                        report.record(ItemOutcome::failure(label, e));
                    }
                }
            }
        }

        info!(
            component = "associator",
            job_id = %job.id,
            confirmed = stats.confirmed,
            fallback = stats.fallback,
            "Association finished"
        );
        Ok(stats)
    }

    async fn associate(
        &self,
        job: &CatalogJob,
        record: &ProductRecord,
        image: &EmbeddedImage,
    ) -> Result<()> {
        let key = format!(
            "users/{}/catalogs/{}/images/{}_{}.{}",
            job.user_id,
            job.catalog_id,
            record.source_anchor,
            Uuid::new_v4(),
            image.extension
        );
        let url = self.blobs.put(&key, &image.data).await?;
        self.records.set_image_url(record.id, &url).await?;

        if let Some(ref embedder) = self.image_embedder {
            match embedder.embed_texts(&[record.detail_text()]).await {
                Ok(mut vectors) => {
                    if let Some(vector) = vectors.pop() {
                        if let Err(e) = self.records.set_embedding(record.id, Some(vector)).await {
                            warn!(
                                component = "associator",
                                record_id = %record.id,
                                error = %e,
                                "Failed to store image embedding"
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        component = "associator",
                        record_id = %record.id,
                        error = %e,
                        "Image embedding failed, continuing without it"
                    );
                }
            }
        }

        Ok(())
    }
}

/// MIME type for an embedded image, from its extension with a
/// content-sniffing fallback.
fn mime_for(image: &EmbeddedImage) -> String {
    match image.extension.as_str() {
        "png" => "image/png".to_string(),
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "gif" => "image/gif".to_string(),
        "bmp" => "image/bmp".to_string(),
        "webp" => "image/webp".to_string(),
        "tif" | "tiff" => "image/tiff".to_string(),
        _ => infer::get(&image.data)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string()),
    }
}
