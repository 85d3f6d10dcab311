//! Asynchronous text recognition (OCR) backend for document catalogs.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use mobilia_core::{defaults, Error, RawPageText, Result};

/// Backend that turns a binary document into per-page text.
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Recognize the document and return its pages in order.
    async fn recognize_pages(&self, data: &[u8], content_type: &str) -> Result<Vec<RawPageText>>;

    /// Get the service name being used.
    fn service_name(&self) -> &str;
}

/// HTTP recognition backend with the submit-then-poll shape common to
/// hosted OCR services.
///
/// `POST {base}/analyze` accepts the raw document and answers with an
/// operation ID; `GET {base}/operations/{id}` is polled until the
/// operation succeeds or fails. Poll exhaustion is transient so a retry
/// of the whole document can be attempted.
pub struct HttpRecognitionBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    operation_id: String,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    pages: Vec<RecognizedPage>,
}

#[derive(Debug, Deserialize)]
struct RecognizedPage {
    number: u32,
    #[serde(default)]
    fragments: Vec<RecognizedFragment>,
}

/// One recognized text fragment plus the break detected after it.
#[derive(Debug, Deserialize)]
struct RecognizedFragment {
    text: String,
    #[serde(default, rename = "break")]
    break_type: Option<String>,
}

/// Rebuild a page's text by concatenating fragments and inserting a
/// space or newline per detected break type.
fn reconstruct_text(fragments: &[RecognizedFragment]) -> String {
    let mut text = String::new();
    for fragment in fragments {
        text.push_str(&fragment.text);
        match fragment.break_type.as_deref() {
            Some("space") | Some("sure_space") => text.push(' '),
            Some("line") | Some("line_break") => text.push('\n'),
            _ => {}
        }
    }
    text.trim_end().to_string()
}

impl HttpRecognitionBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            poll_interval: Duration::from_millis(defaults::RECOGNITION_POLL_INTERVAL_MS),
            max_polls: defaults::RECOGNITION_MAX_POLLS,
        }
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the maximum number of status polls before giving up.
    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls.max(1);
        self
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => req.header("Authorization", format!("Bearer {}", key)),
            None => req,
        }
    }

    async fn submit(&self, data: &[u8], content_type: &str) -> Result<String> {
        let url = format!("{}/analyze", self.base_url.trim_end_matches('/'));
        let response = self
            .authorize(self.client.post(&url))
            .header("Content-Type", content_type)
            .body(data.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Recognition(format!(
                "Submit returned {}: {}",
                status, body
            )));
        }

        let submit: SubmitResponse = response
            .json()
            .await
            .map_err(|e| Error::Recognition(format!("Failed to parse submit response: {}", e)))?;
        Ok(submit.operation_id)
    }

    async fn poll_operation(&self, operation_id: &str) -> Result<Vec<RecognizedPage>> {
        let url = format!(
            "{}/operations/{}",
            self.base_url.trim_end_matches('/'),
            operation_id
        );

        for attempt in 0..self.max_polls {
            let response = self.authorize(self.client.get(&url)).send().await?;

            if !response.status().is_success() {
                let status = response.status();
                return Err(Error::Recognition(format!(
                    "Operation poll returned {}",
                    status
                )));
            }

            let operation: OperationResponse = response.json().await.map_err(|e| {
                Error::Recognition(format!("Failed to parse operation response: {}", e))
            })?;

            match operation.status.as_str() {
                "succeeded" => return Ok(operation.pages),
                "failed" => {
                    return Err(Error::Recognition(format!(
                        "Recognition failed: {}",
                        operation.error.unwrap_or_else(|| "unknown".to_string())
                    )))
                }
                other => {
                    debug!(
                        component = "recognition",
                        operation_id = %operation_id,
                        attempt,
                        status = %other,
                        "Operation still running"
                    );
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        warn!(
            component = "recognition",
            operation_id = %operation_id,
            max_polls = self.max_polls,
            "Recognition polling exhausted"
        );
        Err(Error::Transient(format!(
            "Recognition did not finish after {} polls",
            self.max_polls
        )))
    }
}

#[async_trait]
impl RecognitionBackend for HttpRecognitionBackend {
    async fn recognize_pages(&self, data: &[u8], content_type: &str) -> Result<Vec<RawPageText>> {
        let operation_id = self.submit(data, content_type).await?;
        debug!(
            component = "recognition",
            operation_id = %operation_id,
            document_bytes = data.len(),
            "Document submitted"
        );

        let mut pages = self.poll_operation(&operation_id).await?;
        pages.sort_by_key(|p| p.number);

        Ok(pages
            .into_iter()
            .map(|p| RawPageText {
                page: p.number,
                text: reconstruct_text(&p.fragments),
            })
            .collect())
    }

    fn service_name(&self) -> &str {
        "http-recognition"
    }
}
