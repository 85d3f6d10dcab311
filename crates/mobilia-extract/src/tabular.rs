//! Spreadsheet extraction: workbook rows in, product candidates out.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde::Deserialize;
use tracing::{debug, info, warn};

use mobilia_core::defaults;
use mobilia_core::{
    with_backoff, ChatBackend, Error, ExtractedRecord, ExtractionHints, ItemOutcome, PriceItem,
    RawRow, Result, RetryPolicy, StageReport,
};
use mobilia_inference::clean_json_payload;

use crate::prompts;

/// Extracts product candidates from spreadsheet rows in fixed-size
/// chunks.
///
/// Chunks are sent to the chat backend one at a time, each row annotated
/// with its absolute row number so anchors survive the round trip. A
/// fixed pause follows every chunk, independent of outcome, to avoid
/// bursting the service's rate limit. A chunk whose retries exhaust is
/// skipped, not fatal.
pub struct TabularExtractor {
    chat: Arc<dyn ChatBackend>,
    retry: RetryPolicy,
    chunk_rows: usize,
    chunk_pause: Duration,
}

#[derive(Debug, Deserialize)]
struct ChunkResponse {
    #[serde(default)]
    records: Vec<ExtractedRecord>,
    #[serde(default)]
    hints: Option<ExtractionHints>,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    #[serde(default)]
    items: Vec<PriceItem>,
}

/// Outcome of one tabular extraction pass.
#[derive(Debug, Default)]
pub struct TabularExtraction {
    pub records: Vec<ExtractedRecord>,
    pub hints: Option<ExtractionHints>,
    /// Candidates rejected by validation. Whole chunks skipped after
    /// retry exhaustion are reported separately, not counted here.
    pub dropped: usize,
}

impl TabularExtractor {
    pub fn new(chat: Arc<dyn ChatBackend>) -> Self {
        Self {
            chat,
            retry: RetryPolicy::default(),
            chunk_rows: defaults::CHUNK_ROWS,
            chunk_pause: Duration::from_millis(defaults::CHUNK_PAUSE_MS),
        }
    }

    /// Set the retry policy for chunk requests.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the chunk size in rows (clamped to at least 1).
    pub fn with_chunk_rows(mut self, rows: usize) -> Self {
        self.chunk_rows = rows.max(1);
        self
    }

    /// Set the pause inserted after every chunk.
    pub fn with_chunk_pause(mut self, pause: Duration) -> Self {
        self.chunk_pause = pause;
        self
    }

    /// Extract validated records (and optional column hints) from the
    /// given rows. Blank rows are skipped before chunking.
    pub async fn extract(
        &self,
        rows: &[RawRow],
        report: &mut StageReport,
    ) -> Result<TabularExtraction> {
        let content_rows: Vec<&RawRow> = rows.iter().filter(|r| !r.is_blank()).collect();
        info!(
            component = "tabular",
            row_count = content_rows.len(),
            chunk_rows = self.chunk_rows,
            "Extracting spreadsheet rows"
        );

        let mut records = Vec::new();
        let mut hints: Option<ExtractionHints> = None;
        let mut dropped = 0;

        for chunk in content_rows.chunks(self.chunk_rows) {
            let owned: Vec<RawRow> = chunk.iter().map(|r| (*r).clone()).collect();
            let label = chunk_label(&owned);
            let prompt = prompts::render_rows(&owned);

            match self.request_chunk(&prompt).await {
                Ok(response) => {
                    if hints.is_none() {
                        hints = response.hints;
                    }
                    for candidate in response.records {
                        match candidate.validate() {
                            Ok(()) => {
                                report.record(ItemOutcome::success(format!(
                                    "row {}",
                                    candidate.source_anchor
                                )));
                                records.push(candidate);
                            }
                            Err(e) => {
                                debug!(
                                    component = "tabular",
                                    error = %e,
                                    "Dropping invalid candidate"
                                );
                                dropped += 1;
                                report.record(ItemOutcome::failure(label.clone(), e));
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        component = "tabular",
                        chunk = %label,
                        error = %e,
                        "Chunk skipped after retries"
                    );
                    report.record(ItemOutcome::failure(label, e));
                }
            }

            // Pace the service between chunks regardless of outcome.
            tokio::time::sleep(self.chunk_pause).await;
        }

        info!(
            component = "tabular",
            record_count = records.len(),
            dropped,
            failed = report.failed(),
            "Spreadsheet extraction finished"
        );
        Ok(TabularExtraction {
            records,
            hints,
            dropped,
        })
    }

    /// Extract price items from a secondary pricing spreadsheet.
    ///
    /// Items missing both code and name, or without a positive price,
    /// are dropped.
    pub async fn extract_price_items(
        &self,
        rows: &[RawRow],
        report: &mut StageReport,
    ) -> Result<Vec<PriceItem>> {
        let content_rows: Vec<&RawRow> = rows.iter().filter(|r| !r.is_blank()).collect();
        let mut items = Vec::new();

        for chunk in content_rows.chunks(self.chunk_rows) {
            let owned: Vec<RawRow> = chunk.iter().map(|r| (*r).clone()).collect();
            let label = chunk_label(&owned);
            let prompt = prompts::render_rows(&owned);

            let result = with_backoff(&self.retry, "extract_price_chunk", || {
                self.chat.generate_json(prompts::PRICE_SYSTEM, &prompt)
            })
            .await
            .and_then(|raw| {
                serde_json::from_str::<PriceResponse>(clean_json_payload(&raw))
                    .map_err(Error::from)
            });

            match result {
                Ok(response) => {
                    for item in response.items {
                        if (item.code.trim().is_empty() && item.name.trim().is_empty())
                            || item.price <= 0.0
                        {
                            continue;
                        }
                        items.push(item);
                    }
                    report.record(ItemOutcome::success(label));
                }
                Err(e) => {
                    warn!(
                        component = "tabular",
                        chunk = %label,
                        error = %e,
                        "Price chunk skipped after retries"
                    );
                    report.record(ItemOutcome::failure(label, e));
                }
            }

            tokio::time::sleep(self.chunk_pause).await;
        }

        Ok(items)
    }

    async fn request_chunk(&self, prompt: &str) -> Result<ChunkResponse> {
        let raw = with_backoff(&self.retry, "extract_chunk", || {
            self.chat.generate_json(prompts::TABULAR_SYSTEM, prompt)
        })
        .await?;
        Ok(serde_json::from_str(clean_json_payload(&raw))?)
    }
}

fn chunk_label(rows: &[RawRow]) -> String {
    match (rows.first(), rows.last()) {
        (Some(first), Some(last)) => format!("rows {}-{}", first.number, last.number),
        _ => "rows".to_string(),
    }
}

/// Read the first worksheet of a workbook into positional rows.
///
/// Row numbers are absolute sheet positions (1-based), so anchors line
/// up with the drawing anchors used by the image extractor.
pub fn read_rows(data: &[u8]) -> Result<Vec<RawRow>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data))
        .map_err(|e| Error::UnsupportedFormat(format!("Failed to open workbook: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::UnsupportedFormat("Workbook has no worksheets".to_string()))?
        .map_err(|e| Error::UnsupportedFormat(format!("Failed to read worksheet: {}", e)))?;

    let start_row = range.start().map(|(row, _)| row).unwrap_or(0);
    let start_col = range.start().map(|(_, col)| col).unwrap_or(0);

    let mut rows = Vec::new();
    for (i, cells) in range.rows().enumerate() {
        let mut map = BTreeMap::new();
        for (j, cell) in cells.iter().enumerate() {
            if let Some(value) = cell_to_string(cell) {
                map.insert(column_letter(start_col as usize + j), value);
            }
        }
        rows.push(RawRow {
            number: start_row + i as u32 + 1,
            cells: map,
        });
    }

    debug!(component = "tabular", row_count = rows.len(), "Workbook read");
    Ok(rows)
}

fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Data::Float(f) => {
            if f.fract() == 0.0 {
                Some(format!("{}", *f as i64))
            } else {
                Some(format!("{}", f))
            }
        }
        Data::Int(i) => Some(format!("{}", i)),
        Data::Bool(b) => Some(format!("{}", b)),
        Data::DateTime(_) => Some(format!("{}", cell)),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::Error(_) => None,
    }
}

/// 0-based column index to spreadsheet letter ("A", "B", .., "AA").
fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mobilia_inference::mock::MockInference;
    use serde_json::json;

    fn row(number: u32, pairs: &[(&str, &str)]) -> RawRow {
        let mut cells = BTreeMap::new();
        for (col, value) in pairs {
            cells.insert(col.to_string(), value.to_string());
        }
        RawRow { number, cells }
    }

    fn fast_extractor(mock: &MockInference) -> TabularExtractor {
        TabularExtractor::new(Arc::new(mock.clone()))
            .with_chunk_pause(Duration::from_millis(0))
            .with_retry_policy(
                RetryPolicy::default()
                    .with_base_delay(Duration::from_millis(1))
                    .with_jitter(false),
            )
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(51), "AZ");
        assert_eq!(column_letter(52), "BA");
    }

    #[test]
    fn test_cell_to_string_trims_floats() {
        assert_eq!(cell_to_string(&Data::Float(12.0)), Some("12".to_string()));
        assert_eq!(
            cell_to_string(&Data::Float(12.5)),
            Some("12.5".to_string())
        );
        assert_eq!(cell_to_string(&Data::Empty), None);
        assert_eq!(cell_to_string(&Data::String("  ".to_string())), None);
    }

    #[tokio::test]
    async fn test_extract_validates_and_keeps_anchors() {
        let mock = MockInference::new();
        mock.push_json_response(
            json!({
                "records": [
                    {"name": "Oak Chair", "code": "CH-001", "price": 120.0, "row": 2},
                    {"name": "", "code": "XX", "row": 3},
                    {"name": "Pine Table", "code": "TB-002", "row": 4}
                ],
                "hints": {"code_column": "B", "image_column": "D"}
            })
            .to_string(),
        );

        let rows = vec![
            row(2, &[("A", "Oak Chair"), ("B", "CH-001")]),
            row(3, &[("A", "???")]),
            row(4, &[("A", "Pine Table"), ("B", "TB-002")]),
        ];

        let mut report = StageReport::default();
        let extractor = fast_extractor(&mock);
        let out = extractor.extract(&rows, &mut report).await.unwrap();

        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].source_anchor, 2);
        assert_eq!(out.records[1].source_anchor, 4);
        assert_eq!(out.hints.unwrap().code_column.as_deref(), Some("B"));
        assert_eq!(out.dropped, 1);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
    }

    #[tokio::test]
    async fn test_extract_chunks_rows() {
        let mock = MockInference::new().with_default_json(
            json!({"records": []}).to_string(),
        );
        let rows: Vec<RawRow> = (1..=60).map(|n| row(n, &[("A", "x")])).collect();

        let mut report = StageReport::default();
        let extractor = fast_extractor(&mock).with_chunk_rows(25);
        extractor.extract(&rows, &mut report).await.unwrap();

        // 60 rows at 25 per chunk = 3 requests.
        assert_eq!(mock.call_count("generate_json"), 3);
    }

    #[tokio::test]
    async fn test_blank_rows_skipped_before_chunking() {
        let mock = MockInference::new().with_default_json(
            json!({"records": []}).to_string(),
        );
        let mut rows: Vec<RawRow> = (1..=30).map(|n| row(n, &[("A", "x")])).collect();
        for r in rows.iter_mut().skip(10) {
            r.cells.insert("A".to_string(), "  ".to_string());
        }

        let mut report = StageReport::default();
        let extractor = fast_extractor(&mock).with_chunk_rows(25);
        extractor.extract(&rows, &mut report).await.unwrap();

        // 10 content rows fit in a single chunk.
        assert_eq!(mock.call_count("generate_json"), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_then_succeeds() {
        let mock = MockInference::new().with_default_json(
            json!({"records": [{"name": "Sofa", "code": "SF-1", "row": 1}]}).to_string(),
        );
        mock.fail_next_transient(1);

        let rows = vec![row(1, &[("A", "Sofa")])];
        let mut report = StageReport::default();
        let extractor = fast_extractor(&mock);
        let out = extractor.extract(&rows, &mut report).await.unwrap();

        assert_eq!(out.records.len(), 1);
        assert_eq!(mock.call_count("generate_json"), 2);
    }

    #[tokio::test]
    async fn test_exhausted_chunk_is_skipped_not_fatal() {
        let mock = MockInference::new().with_default_json(
            json!({"records": [{"name": "Sofa", "code": "SF-1", "row": 30}]}).to_string(),
        );
        // First chunk exhausts all three attempts; second chunk succeeds.
        mock.fail_next_transient(3);

        let rows: Vec<RawRow> = (1..=30).map(|n| row(n, &[("A", "x")])).collect();
        let mut report = StageReport::default();
        let extractor = fast_extractor(&mock).with_chunk_rows(25);
        let out = extractor.extract(&rows, &mut report).await.unwrap();

        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].source_anchor, 30);
        // The skipped chunk is a stage failure, not a validation drop.
        assert_eq!(out.dropped, 0);
        assert_eq!(report.failed(), 1);
    }

    #[tokio::test]
    async fn test_price_items_filtered() {
        let mock = MockInference::new();
        mock.push_json_response(
            json!({
                "items": [
                    {"code": "CH-001", "name": "Oak Chair", "price": 99.0},
                    {"code": "", "name": "", "price": 50.0},
                    {"code": "TB-002", "name": "Pine Table", "price": 0.0}
                ]
            })
            .to_string(),
        );

        let rows = vec![row(1, &[("A", "CH-001"), ("B", "99")])];
        let mut report = StageReport::default();
        let extractor = fast_extractor(&mock);
        let items = extractor
            .extract_price_items(&rows, &mut report)
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].code, "CH-001");
    }
}
