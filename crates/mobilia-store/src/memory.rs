//! In-memory record store.
//!
//! Backs tests and single-process deployments. The job state machine is
//! enforced here so orchestrator bugs cannot move a terminal job.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use mobilia_core::{
    CatalogJob, Error, JobStatus, ProductRecord, RecordStore, Result,
};

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<Uuid, CatalogJob>,
    records: HashMap<Uuid, ProductRecord>,
    /// Record IDs in creation order.
    order: Vec<Uuid>,
}

/// Thread-safe in-memory [`RecordStore`].
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    inner: RwLock<Inner>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_record<F>(&self, record_id: Uuid, f: F) -> Result<()>
    where
        F: FnOnce(&mut ProductRecord),
    {
        let mut inner = self.inner.write().unwrap();
        let record = inner
            .records
            .get_mut(&record_id)
            .ok_or_else(|| Error::NotFound(format!("record {}", record_id)))?;
        f(record);
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create_job(&self, job: CatalogJob) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.jobs.insert(job.id, job);
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<CatalogJob>> {
        Ok(self.inner.read().unwrap().jobs.get(&job_id).cloned())
    }

    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;

        if !job.status.can_transition_to(status) {
            return Err(Error::InvalidInput(format!(
                "Illegal job transition {} -> {}",
                job.status, status
            )));
        }

        debug!(
            component = "store",
            job_id = %job_id,
            from = %job.status,
            to = %status,
            "Job status updated"
        );

        job.status = status;
        job.error_message = error_message.map(|e| e.to_string());
        let now = Utc::now();
        match status {
            JobStatus::Processing => job.started_at = Some(now),
            JobStatus::Completed | JobStatus::Failed => job.completed_at = Some(now),
            JobStatus::Pending => {}
        }
        Ok(())
    }

    async fn create_record(&self, record: ProductRecord) -> Result<Uuid> {
        let mut inner = self.inner.write().unwrap();
        let id = record.id;
        inner.records.insert(id, record);
        inner.order.push(id);
        Ok(id)
    }

    async fn records_for_catalog(&self, catalog_id: Uuid) -> Result<Vec<ProductRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id))
            .filter(|r| r.catalog_id == catalog_id)
            .cloned()
            .collect())
    }

    async fn set_image_url(&self, record_id: Uuid, url: &str) -> Result<()> {
        self.with_record(record_id, |r| r.image_url = Some(url.to_string()))
    }

    async fn set_price(&self, record_id: Uuid, price: f64) -> Result<()> {
        self.with_record(record_id, |r| r.price = price)
    }

    async fn set_embedding(&self, record_id: Uuid, embedding: Option<Vec<f32>>) -> Result<()> {
        self.with_record(record_id, |r| r.embedding = embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mobilia_core::{CatalogFormat, ExtractedRecord};

    fn job() -> CatalogJob {
        CatalogJob {
            id: Uuid::new_v4(),
            catalog_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            source_blob_key: "uploads/catalog.xlsx".to_string(),
            file_name: "catalog.xlsx".to_string(),
            format: CatalogFormat::Spreadsheet,
            status: JobStatus::Pending,
            secondary_price_blob_key: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn record(catalog_id: Uuid, name: &str, anchor: u32) -> ProductRecord {
        ProductRecord::from_extracted(
            catalog_id,
            ExtractedRecord {
                name: name.to_string(),
                code: format!("{}-{}", name, anchor),
                source_anchor: anchor,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_job_lifecycle() {
        let store = MemoryRecordStore::new();
        let j = job();
        let id = j.id;
        store.create_job(j).await.unwrap();

        store
            .update_job_status(id, JobStatus::Processing, None)
            .await
            .unwrap();
        store
            .update_job_status(id, JobStatus::Completed, None)
            .await
            .unwrap();

        let stored = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.started_at.is_some());
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_job_never_reopens() {
        let store = MemoryRecordStore::new();
        let j = job();
        let id = j.id;
        store.create_job(j).await.unwrap();
        store
            .update_job_status(id, JobStatus::Processing, None)
            .await
            .unwrap();
        store
            .update_job_status(id, JobStatus::Failed, Some("boom"))
            .await
            .unwrap();

        let err = store
            .update_job_status(id, JobStatus::Processing, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Illegal job transition"));

        let stored = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_records_scoped_and_ordered() {
        let store = MemoryRecordStore::new();
        let catalog_a = Uuid::new_v4();
        let catalog_b = Uuid::new_v4();

        store.create_record(record(catalog_a, "Chair", 1)).await.unwrap();
        store.create_record(record(catalog_b, "Other", 1)).await.unwrap();
        store.create_record(record(catalog_a, "Table", 2)).await.unwrap();

        let records = store.records_for_catalog(catalog_a).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Chair");
        assert_eq!(records[1].name, "Table");
    }

    #[tokio::test]
    async fn test_field_updates() {
        let store = MemoryRecordStore::new();
        let catalog_id = Uuid::new_v4();
        let id = store
            .create_record(record(catalog_id, "Chair", 1))
            .await
            .unwrap();

        store.set_image_url(id, "file:///tmp/x.png").await.unwrap();
        store.set_price(id, 249.0).await.unwrap();
        store.set_embedding(id, Some(vec![0.1, 0.2])).await.unwrap();

        let records = store.records_for_catalog(catalog_id).await.unwrap();
        assert_eq!(records[0].image_url.as_deref(), Some("file:///tmp/x.png"));
        assert_eq!(records[0].price, 249.0);
        assert_eq!(records[0].embedding.as_deref(), Some(&[0.1, 0.2][..]));
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let store = MemoryRecordStore::new();
        let err = store.set_price(Uuid::new_v4(), 1.0).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
