//! Text embedding generation for persisted records.
//!
//! Runs once per job after extraction and association. Embedding
//! failures never fail the job and are never retried; a record that
//! cannot be embedded simply keeps a null embedding.

use std::sync::Arc;

use tracing::{debug, info, warn};

use mobilia_core::defaults::EMBED_MIN_TEXT_LEN;
use mobilia_core::{EmbeddingBackend, ItemOutcome, ProductRecord, RecordStore, Result, StageReport};

/// Embed each record's detail text and store the vector.
///
/// Records whose detail text is shorter than [`EMBED_MIN_TEXT_LEN`]
/// are skipped without an outcome. Returns the number of embeddings
/// stored.
pub async fn generate_embeddings(
    store: &Arc<dyn RecordStore>,
    embedder: &Arc<dyn EmbeddingBackend>,
    records: &[ProductRecord],
    report: &mut StageReport,
) -> Result<usize> {
    let mut stored = 0;

    for record in records {
        let text = record.detail_text();
        if text.len() < EMBED_MIN_TEXT_LEN {
            debug!(
                component = "embed",
                record_id = %record.id,
                "Detail text too short, skipping embedding"
            );
            continue;
        }

        let label = format!("record {}", record.id);
        match embedder.embed_texts(&[text]).await {
            Ok(mut vectors) => match vectors.pop() {
                Some(vector) => match store.set_embedding(record.id, Some(vector)).await {
                    Ok(()) => {
                        stored += 1;
                        report.record(ItemOutcome::success(label));
                    }
                    Err(e) => {
                        warn!(
                            component = "embed",
                            record_id = %record.id,
                            error = %e,
                            "Could not store embedding, record keeps null embedding"
                        );
                        report.record(ItemOutcome::failure(label, e));
                    }
                },
                None => {
                    report.record(ItemOutcome::failure(label, "backend returned no vector"));
                }
            },
            Err(e) => {
                warn!(
                    component = "embed",
                    record_id = %record.id,
                    error = %e,
                    "Embedding failed, record keeps null embedding"
                );
                report.record(ItemOutcome::failure(label, e));
            }
        }
    }

    info!(
        component = "embed",
        record_count = records.len(),
        stored,
        model = embedder.model_name(),
        "Embedding generation finished"
    );
    Ok(stored)
}
