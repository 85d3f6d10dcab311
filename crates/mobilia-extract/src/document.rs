//! Page-based document extraction with cross-page name carry-over.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use mobilia_core::defaults;
use mobilia_core::{
    with_backoff, ChatBackend, Error, ExtractedRecord, ItemOutcome, RawPageText, Result,
    RetryPolicy, StageReport,
};
use mobilia_inference::{clean_json_payload, RecognitionBackend};

use crate::prompts;

/// Marker the document prompt uses for products whose name is missing
/// from the current page.
const PLACEHOLDER_MARKER: &str = "see specifications";

/// Trimmed page texts matching one of these are layout labels, never
/// product names.
const NON_NAME_KEYWORDS: &[&str] = &[
    "specifications",
    "dimensions",
    "materials",
    "finishes",
    "colors",
    "index",
    "contents",
    "notes",
];

/// Extracts product candidates from a paginated document.
///
/// The whole document goes to the recognition service once; each
/// recognized page is then handed to the chat backend independently, so
/// the model can only draw on that page's text. Page count is capped to
/// bound cost.
///
/// Catalogs often put a product's name alone on one page and its
/// specifications on the next. When a page yields no products but its
/// text looks like a bare product name, that name is held as a pending
/// candidate and substituted into the next page's placeholder-named
/// product.
pub struct DocumentExtractor {
    chat: Arc<dyn ChatBackend>,
    recognition: Arc<dyn RecognitionBackend>,
    retry: RetryPolicy,
    max_pages: usize,
    page_pause: Duration,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    #[serde(default)]
    records: Vec<ExtractedRecord>,
}

/// Outcome of one document extraction pass.
#[derive(Debug, Default)]
pub struct DocumentExtraction {
    pub records: Vec<ExtractedRecord>,
    /// Candidates rejected by validation. Whole pages skipped after
    /// retry exhaustion are reported separately, not counted here.
    pub dropped: usize,
}

impl DocumentExtractor {
    pub fn new(chat: Arc<dyn ChatBackend>, recognition: Arc<dyn RecognitionBackend>) -> Self {
        Self {
            chat,
            recognition,
            retry: RetryPolicy::default(),
            max_pages: defaults::MAX_DOCUMENT_PAGES,
            page_pause: Duration::from_millis(defaults::CHUNK_PAUSE_MS),
        }
    }

    /// Set the retry policy for page requests.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the page cap (clamped to at least 1).
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Set the pause inserted after every page.
    pub fn with_page_pause(mut self, pause: Duration) -> Self {
        self.page_pause = pause;
        self
    }

    /// Recognize the document and extract validated records, one page at
    /// a time. Recognition failure is fatal for the stage; a single
    /// page's failure is not.
    pub async fn extract(
        &self,
        data: &[u8],
        content_type: &str,
        report: &mut StageReport,
    ) -> Result<DocumentExtraction> {
        let pages = self.recognition.recognize_pages(data, content_type).await?;
        info!(
            component = "document",
            page_count = pages.len(),
            "Document recognized"
        );

        if pages.len() > self.max_pages {
            warn!(
                component = "document",
                page_count = pages.len(),
                max_pages = self.max_pages,
                "Page cap reached, excess pages ignored"
            );
        }

        let mut records = Vec::new();
        let mut dropped = 0;
        let mut pending_name: Option<String> = None;

        for page in pages.iter().take(self.max_pages) {
            let label = format!("page {}", page.page);

            match self.request_page(page, pending_name.as_deref()).await {
                Ok(response) => {
                    if response.records.is_empty() {
                        // A bare name on an otherwise empty page may belong
                        // to the product described on the next page.
                        if let Some(name) = candidate_name(&page.text) {
                            debug!(
                                component = "document",
                                page = page.page,
                                name = %name,
                                "Holding pending product name"
                            );
                            pending_name = Some(name);
                        }
                        tokio::time::sleep(self.page_pause).await;
                        continue;
                    }

                    for mut candidate in response.records {
                        candidate.source_anchor = page.page;
                        if is_placeholder_name(&candidate.name) {
                            if let Some(name) = pending_name.take() {
                                candidate.name = name;
                            }
                        }
                        match candidate.validate() {
                            Ok(()) => {
                                report.record(ItemOutcome::success(label.clone()));
                                records.push(candidate);
                            }
                            Err(e) => {
                                debug!(
                                    component = "document",
                                    page = page.page,
                                    error = %e,
                                    "Dropping invalid candidate"
                                );
                                report.record(ItemOutcome::failure(label.clone(), e));
                                dropped += 1;
                            }
                        }
                    }
                    // Any productive page invalidates a held name.
                    pending_name = None;
                }
                Err(e) => {
                    warn!(
                        component = "document",
                        page = page.page,
                        error = %e,
                        "Page skipped after retries"
                    );
                    report.record(ItemOutcome::failure(label, e));
                }
            }

            tokio::time::sleep(self.page_pause).await;
        }

        info!(
            component = "document",
            record_count = records.len(),
            dropped,
            failed = report.failed(),
            "Document extraction finished"
        );
        Ok(DocumentExtraction { records, dropped })
    }

    async fn request_page(
        &self,
        page: &RawPageText,
        pending_name: Option<&str>,
    ) -> Result<PageResponse> {
        let prompt = prompts::render_page(page.page, &page.text, pending_name);
        let raw = with_backoff(&self.retry, "extract_page", || {
            self.chat.generate_json(prompts::DOCUMENT_SYSTEM, &prompt)
        })
        .await?;
        serde_json::from_str(clean_json_payload(&raw)).map_err(Error::from)
    }
}

/// Whether a page's trimmed text is plausibly a bare product name.
///
/// Short, letter-bearing, limited to name-like characters, and not a
/// known layout keyword.
fn candidate_name(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.len() >= defaults::CANDIDATE_NAME_MAX_CHARS {
        return None;
    }
    if trimmed.split_whitespace().count() > defaults::CANDIDATE_NAME_MAX_TOKENS {
        return None;
    }
    let allowed = trimmed.chars().all(|c| {
        c.is_alphanumeric() || c.is_whitespace() || c == '-' || c == '\'' || c == '\u{2019}'
    });
    if !allowed {
        return None;
    }
    if !trimmed.chars().any(|c| c.is_alphabetic()) {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if NON_NAME_KEYWORDS.contains(&lowered.as_str()) {
        return None;
    }
    Some(trimmed.to_string())
}

/// Whether an extracted name is the generic "<category> (see
/// specifications)" placeholder.
fn is_placeholder_name(name: &str) -> bool {
    name.to_lowercase().contains(PLACEHOLDER_MARKER)
}
