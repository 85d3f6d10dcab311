//! End-to-end pipeline tests over an in-memory workbook fixture and
//! scripted inference backends.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use mobilia_core::retry::RetryPolicy;
use mobilia_core::{
    BlobStore, CatalogJob, Error, IngestRequest, JobStatus, ProductRecord, RawPageText,
    RecordStore, Result,
};
use mobilia_ingest::{IngestPipeline, IngestWorker, WorkerEvent};
use mobilia_inference::mock::MockInference;
use mobilia_store::{FsBlobStore, MemoryRecordStore};

// =============================================================================
// FIXTURES
// =============================================================================

const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Build a minimal xlsx container: three product rows on the first
/// sheet and three images anchored on rows 1..3.
fn catalog_xlsx() -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    let mut add = |name: &str, content: &[u8]| {
        writer.start_file(name, options).unwrap();
        writer.write_all(content).unwrap();
    };

    add(
        "[Content_Types].xml",
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Default Extension="png" ContentType="image/png"/>
  <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
  <Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#,
    );
    add(
        "_rels/.rels",
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#,
    );
    add(
        "xl/workbook.xml",
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#,
    );
    add(
        "xl/_rels/workbook.xml.rels",
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#,
    );
    add(
        "xl/worksheets/sheet1.xml",
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1">
      <c r="A1" t="inlineStr"><is><t>Oak Chair</t></is></c>
      <c r="B1" t="inlineStr"><is><t>AB-102</t></is></c>
      <c r="C1"><v>129</v></c>
    </row>
    <row r="2">
      <c r="A2" t="inlineStr"><is><t>Pine Table</t></is></c>
      <c r="B2" t="inlineStr"><is><t>CD-201</t></is></c>
      <c r="C2"><v>450</v></c>
    </row>
    <row r="3">
      <c r="A3" t="inlineStr"><is><t>Walnut Desk</t></is></c>
      <c r="B3" t="inlineStr"><is><t>EF-330</t></is></c>
      <c r="C3"><v>780</v></c>
    </row>
  </sheetData>
</worksheet>"#,
    );
    // One image per row, anchored on zero-based rows 0..2.
    add(
        "xl/drawings/drawing1.xml",
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <xdr:twoCellAnchor>
    <xdr:from><xdr:col>3</xdr:col><xdr:row>0</xdr:row></xdr:from>
    <xdr:pic><xdr:blipFill><a:blip r:embed="rId1"/></xdr:blipFill></xdr:pic>
  </xdr:twoCellAnchor>
  <xdr:twoCellAnchor>
    <xdr:from><xdr:col>3</xdr:col><xdr:row>1</xdr:row></xdr:from>
    <xdr:pic><xdr:blipFill><a:blip r:embed="rId2"/></xdr:blipFill></xdr:pic>
  </xdr:twoCellAnchor>
  <xdr:twoCellAnchor>
    <xdr:from><xdr:col>3</xdr:col><xdr:row>2</xdr:row></xdr:from>
    <xdr:pic><xdr:blipFill><a:blip r:embed="rId3"/></xdr:blipFill></xdr:pic>
  </xdr:twoCellAnchor>
</xdr:wsDr>"#,
    );
    add(
        "xl/drawings/_rels/drawing1.xml.rels",
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image1.png"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image2.png"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image3.png"/>
</Relationships>"#,
    );
    add("xl/media/image1.png", PNG_BYTES);
    add("xl/media/image2.png", PNG_BYTES);
    add("xl/media/image3.png", PNG_BYTES);

    writer.finish().unwrap().into_inner()
}

/// A bare price spreadsheet: no images, two code/price rows.
fn price_xlsx() -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    let mut add = |name: &str, content: &[u8]| {
        writer.start_file(name, options).unwrap();
        writer.write_all(content).unwrap();
    };

    add(
        "[Content_Types].xml",
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
  <Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#,
    );
    add(
        "_rels/.rels",
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#,
    );
    add(
        "xl/workbook.xml",
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets><sheet name="Prices" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#,
    );
    add(
        "xl/_rels/workbook.xml.rels",
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#,
    );
    add(
        "xl/worksheets/sheet1.xml",
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1">
      <c r="A1" t="inlineStr"><is><t>AB-102</t></is></c>
      <c r="B1"><v>199</v></c>
    </row>
    <row r="2">
      <c r="A2" t="inlineStr"><is><t>CD-201</t></is></c>
      <c r="B2"><v>475</v></c>
    </row>
  </sheetData>
</worksheet>"#,
    );

    writer.finish().unwrap().into_inner()
}

const CATALOG_RECORDS_JSON: &str = r#"{
  "records": [
    {"name": "Oak Chair", "code": "AB-102", "price": 129.0, "description": "solid oak frame", "row": 1},
    {"name": "Pine Table", "code": "CD-201", "price": 450.0, "description": "four seats", "row": 2},
    {"name": "Walnut Desk", "code": "EF-330", "price": 780.0, "description": "two drawers", "row": 3}
  ],
  "hints": {"code_column": "B"}
}"#;

/// Delegates to the in-memory store, but image URL and embedding
/// writes always fail.
struct WriteRejectingStore {
    inner: Arc<MemoryRecordStore>,
}

#[async_trait]
impl RecordStore for WriteRejectingStore {
    async fn create_job(&self, job: CatalogJob) -> Result<()> {
        self.inner.create_job(job).await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<CatalogJob>> {
        self.inner.get_job(job_id).await
    }

    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        self.inner.update_job_status(job_id, status, error_message).await
    }

    async fn create_record(&self, record: ProductRecord) -> Result<Uuid> {
        self.inner.create_record(record).await
    }

    async fn records_for_catalog(&self, catalog_id: Uuid) -> Result<Vec<ProductRecord>> {
        self.inner.records_for_catalog(catalog_id).await
    }

    async fn set_image_url(&self, _record_id: Uuid, _url: &str) -> Result<()> {
        Err(Error::Persistence("image url column rejected write".to_string()))
    }

    async fn set_price(&self, record_id: Uuid, price: f64) -> Result<()> {
        self.inner.set_price(record_id, price).await
    }

    async fn set_embedding(&self, _record_id: Uuid, _embedding: Option<Vec<f32>>) -> Result<()> {
        Err(Error::Persistence("embedding column rejected write".to_string()))
    }
}

struct Harness {
    records: Arc<MemoryRecordStore>,
    blobs: Arc<FsBlobStore>,
    mock: MockInference,
    pipeline: Arc<IngestPipeline>,
    _dir: tempfile::TempDir,
}

fn harness(mock: MockInference) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let records = Arc::new(MemoryRecordStore::new());
    let blobs = Arc::new(FsBlobStore::new(dir.path()));
    let pipeline = Arc::new(
        IngestPipeline::new(
            records.clone(),
            blobs.clone(),
            Arc::new(mock.clone()),
            Arc::new(mock.clone()),
            Arc::new(mock.clone()),
            Arc::new(mock.clone()),
        )
        .with_retry_policy(
            RetryPolicy::default()
                .with_base_delay(Duration::from_millis(0))
                .with_jitter(false),
        )
        .with_chunk_pause(Duration::from_millis(0))
        .with_vision_pause(Duration::from_millis(0)),
    );
    Harness {
        records,
        blobs,
        mock,
        pipeline,
        _dir: dir,
    }
}

fn request(file_type: &str) -> IngestRequest {
    IngestRequest {
        catalog_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        source_blob_key: "uploads/catalog.src".to_string(),
        file_name: format!("catalog.{}", file_type),
        file_type: file_type.to_string(),
        upload_mode: "standard".to_string(),
        secondary_price_blob_key: None,
    }
}

async fn upload(h: &Harness, key: &str, data: &[u8]) {
    h.blobs.put(key, data).await.unwrap();
}

// =============================================================================
// SPREADSHEET PATH
// =============================================================================

#[tokio::test]
async fn test_spreadsheet_job_with_confirmed_associations() -> Result<()> {
    let mock = MockInference::new()
        .with_default_json(CATALOG_RECORDS_JSON)
        .with_default_verdict(true);
    let h = harness(mock);
    upload(&h, "uploads/catalog.src", &catalog_xlsx()).await;

    let job = h.pipeline.create_job(&request("xlsx")).await?;
    let report = h.pipeline.run(&job).await?;

    assert_eq!(report.records_persisted, 3);
    assert_eq!(report.images_extracted, 3);
    assert_eq!(report.associations_confirmed, 3);
    assert_eq!(report.associations_fallback, 0);
    assert_eq!(report.embeddings_stored, 3);
    // One confirmation call per candidate.
    assert_eq!(h.mock.call_count("confirm_match"), 3);

    let stored = h.records.get_job(job.id).await?.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert!(stored.completed_at.is_some());

    let records = h.records.records_for_catalog(job.catalog_id).await?;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.image_url.is_some()));
    assert!(records.iter().all(|r| r.embedding.is_some()));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_vision_degrades_to_fallback_associations() -> Result<()> {
    let mock = MockInference::new()
        .with_default_json(CATALOG_RECORDS_JSON)
        .with_vision_unavailable();
    let h = harness(mock);
    upload(&h, "uploads/catalog.src", &catalog_xlsx()).await;

    let job = h.pipeline.create_job(&request("xlsx")).await?;
    let report = h.pipeline.run(&job).await?;

    // Every anchor has exactly one candidate, so the job still lands all
    // three associations through the fallback path.
    assert_eq!(report.associations_confirmed, 0);
    assert_eq!(report.associations_fallback, 3);
    let stored = h.records.get_job(job.id).await?.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn test_price_fusion_updates_matched_records() -> Result<()> {
    let mock = MockInference::new().with_default_verdict(true);
    // First chat call extracts the catalog, second extracts prices.
    mock.push_json_response(CATALOG_RECORDS_JSON);
    mock.push_json_response(
        r#"{"items": [
            {"code": "AB-102", "name": "", "price": 199.0},
            {"code": "CD-201", "name": "", "price": 475.0},
            {"code": "ZZ-999", "name": "No Such Product", "price": 1.0}
        ]}"#,
    );
    let h = harness(mock);
    upload(&h, "uploads/catalog.src", &catalog_xlsx()).await;
    upload(&h, "uploads/prices.xlsx", &price_xlsx()).await;

    let mut req = request("xlsx");
    req.secondary_price_blob_key = Some("uploads/prices.xlsx".to_string());
    let job = h.pipeline.create_job(&req).await?;
    let report = h.pipeline.run(&job).await?;

    assert_eq!(report.prices_fused, 2);
    let records = h.records.records_for_catalog(job.catalog_id).await?;
    let by_code = |code: &str| records.iter().find(|r| r.code == code).unwrap();
    assert_eq!(by_code("AB-102").price, 199.0);
    assert_eq!(by_code("CD-201").price, 475.0);
    assert_eq!(by_code("EF-330").price, 780.0);
    Ok(())
}

#[tokio::test]
async fn test_document_price_file_skipped_with_job_still_completing() -> Result<()> {
    let mock = MockInference::new()
        .with_default_json(CATALOG_RECORDS_JSON)
        .with_default_verdict(true);
    let h = harness(mock);
    upload(&h, "uploads/catalog.src", &catalog_xlsx()).await;
    upload(&h, "uploads/prices.pdf", b"%PDF-1.4 not a workbook").await;

    let mut req = request("xlsx");
    req.secondary_price_blob_key = Some("uploads/prices.pdf".to_string());
    let job = h.pipeline.create_job(&req).await?;
    let report = h.pipeline.run(&job).await?;

    assert_eq!(report.prices_fused, 0);
    let stored = h.records.get_job(job.id).await?.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    Ok(())
}

// =============================================================================
// DOCUMENT PATH
// =============================================================================

#[tokio::test]
async fn test_document_job_extracts_per_page() -> Result<()> {
    let mock = MockInference::new()
        .with_pages(vec![
            RawPageText {
                page: 1,
                text: "Oak Chair AB-102 solid oak frame".to_string(),
            },
            RawPageText {
                page: 2,
                text: "Pine Table CD-201 seats four".to_string(),
            },
        ])
        .with_default_json(r#"{"records": []}"#);
    mock.push_json_response(
        r#"{"records": [{"name": "Oak Chair", "code": "AB-102", "price": 129.0, "page": 1}]}"#,
    );
    mock.push_json_response(
        r#"{"records": [{"name": "Pine Table", "code": "CD-201", "price": 450.0, "page": 2}]}"#,
    );
    let h = harness(mock);
    upload(&h, "uploads/catalog.src", b"%PDF-1.4 fake scan").await;

    let job = h.pipeline.create_job(&request("pdf")).await?;
    let report = h.pipeline.run(&job).await?;

    assert_eq!(report.records_persisted, 2);
    // A PDF is not an archive container, so no images and no
    // associations.
    assert_eq!(report.images_extracted, 0);
    assert_eq!(report.associations_confirmed + report.associations_fallback, 0);

    let records = h.records.records_for_catalog(job.catalog_id).await?;
    assert_eq!(records[0].source_anchor, 1);
    assert_eq!(records[1].source_anchor, 2);
    Ok(())
}

// =============================================================================
// FAILURE PATHS
// =============================================================================

#[tokio::test]
async fn test_unsupported_file_type_rejected_before_job_exists() {
    let h = harness(MockInference::new());
    let err = h.pipeline.create_job(&request("csv")).await.unwrap_err();
    assert!(err.to_string().contains("Unsupported format"));
}

#[tokio::test]
async fn test_missing_source_blob_fails_job() -> Result<()> {
    let h = harness(MockInference::new());

    let job = h.pipeline.create_job(&request("xlsx")).await?;
    assert!(h.pipeline.run(&job).await.is_err());

    let stored = h.records.get_job(job.id).await?.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.error_message.is_some());
    assert!(stored.completed_at.is_some());
    Ok(())
}

#[tokio::test]
async fn test_unreadable_workbook_fails_job() -> Result<()> {
    let h = harness(MockInference::new());
    upload(&h, "uploads/catalog.src", b"this is not a workbook").await;

    let job = h.pipeline.create_job(&request("xlsx")).await?;
    assert!(h.pipeline.run(&job).await.is_err());

    let stored = h.records.get_job(job.id).await?.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn test_skipped_chunk_degrades_report_not_job() -> Result<()> {
    let mock = MockInference::new()
        .with_default_json(CATALOG_RECORDS_JSON)
        .with_default_verdict(true);
    // Exhaust every retry attempt for the single extraction chunk.
    mock.fail_next_transient(3);
    let h = harness(mock);
    upload(&h, "uploads/catalog.src", &catalog_xlsx()).await;

    let job = h.pipeline.create_job(&request("xlsx")).await?;
    let report = h.pipeline.run(&job).await?;

    assert_eq!(report.records_persisted, 0);
    assert!(report.item_failures >= 1);
    // The skipped chunk is an item failure, not a validation drop.
    assert_eq!(report.records_dropped, 0);
    let stored = h.records.get_job(job.id).await?.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn test_store_write_failures_degrade_report_not_job() -> Result<()> {
    let mock = MockInference::new()
        .with_default_json(CATALOG_RECORDS_JSON)
        .with_default_verdict(true);
    let dir = tempfile::tempdir().unwrap();
    let records = Arc::new(MemoryRecordStore::new());
    let blobs = Arc::new(FsBlobStore::new(dir.path()));
    let flaky = Arc::new(WriteRejectingStore {
        inner: records.clone(),
    });
    let pipeline = IngestPipeline::new(
        flaky,
        blobs.clone(),
        Arc::new(mock.clone()),
        Arc::new(mock.clone()),
        Arc::new(mock.clone()),
        Arc::new(mock.clone()),
    )
    .with_retry_policy(
        RetryPolicy::default()
            .with_base_delay(Duration::from_millis(0))
            .with_jitter(false),
    )
    .with_chunk_pause(Duration::from_millis(0))
    .with_vision_pause(Duration::from_millis(0));
    blobs.put("uploads/catalog.src", &catalog_xlsx()).await.unwrap();

    let job = pipeline.create_job(&request("xlsx")).await?;
    let report = pipeline.run(&job).await?;

    // Image and embedding writes fail per record; the job still completes.
    assert_eq!(report.records_persisted, 3);
    assert_eq!(report.associations_confirmed, 0);
    assert_eq!(report.associations_fallback, 0);
    assert_eq!(report.embeddings_stored, 0);
    assert!(report.item_failures >= 6);

    let stored = records.get_job(job.id).await?.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    let persisted = records.records_for_catalog(job.catalog_id).await?;
    assert!(persisted.iter().all(|r| r.image_url.is_none()));
    assert!(persisted.iter().all(|r| r.embedding.is_none()));
    Ok(())
}

// =============================================================================
// WORKER
// =============================================================================

#[tokio::test]
async fn test_worker_emits_started_and_completed_events() -> Result<()> {
    let mock = MockInference::new()
        .with_default_json(CATALOG_RECORDS_JSON)
        .with_default_verdict(true);
    let h = harness(mock);
    upload(&h, "uploads/catalog.src", &catalog_xlsx()).await;

    let worker = IngestWorker::new(h.pipeline.clone());
    let mut events = worker.events();

    let job_id = worker.submit(request("xlsx")).await?;

    match events.recv().await.unwrap() {
        WorkerEvent::JobStarted { job_id: started, .. } => assert_eq!(started, job_id),
        other => panic!("expected JobStarted, got {:?}", other),
    }
    match events.recv().await.unwrap() {
        WorkerEvent::JobCompleted { job_id: done, report } => {
            assert_eq!(done, job_id);
            assert_eq!(report.records_persisted, 3);
        }
        other => panic!("expected JobCompleted, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_worker_emits_failed_event() -> Result<()> {
    let h = harness(MockInference::new());
    // No source blob uploaded.
    let worker = IngestWorker::new(h.pipeline.clone());
    let mut events = worker.events();

    let job_id = worker.submit(request("xlsx")).await?;

    loop {
        match events.recv().await.unwrap() {
            WorkerEvent::JobFailed { job_id: failed, error } => {
                assert_eq!(failed, job_id);
                assert!(!error.is_empty());
                break;
            }
            WorkerEvent::JobStarted { .. } => continue,
            other => panic!("expected JobFailed, got {:?}", other),
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_worker_rejects_bad_submission_synchronously() {
    let h = harness(MockInference::new());
    let worker = IngestWorker::new(h.pipeline.clone());
    assert!(worker.submit(request("csv")).await.is_err());
}
