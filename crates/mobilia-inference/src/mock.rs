//! Mock inference backends for deterministic testing.
//!
//! [`MockInference`] implements every backend trait the pipeline consumes,
//! so one handle can be cloned into each seam. Responses are scripted,
//! embeddings are deterministic, and every call is logged for assertion.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mobilia_core::{ChatBackend, EmbeddingBackend, Error, RawPageText, Result};

use crate::recognition::RecognitionBackend;
use crate::vision::{MatchVerdict, VisionBackend};

/// One recorded backend call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
}

#[derive(Debug)]
struct Inner {
    dimension: usize,
    queued_json: VecDeque<String>,
    default_json: String,
    verdicts: HashMap<String, bool>,
    default_verdict: bool,
    pages: Vec<RawPageText>,
    transient_failures: u32,
    vision_unavailable: bool,
    calls: Vec<MockCall>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            dimension: 1536,
            queued_json: VecDeque::new(),
            default_json: "{\"records\": []}".to_string(),
            verdicts: HashMap::new(),
            default_verdict: false,
            pages: Vec::new(),
            transient_failures: 0,
            vision_unavailable: false,
            calls: Vec::new(),
        }
    }
}

/// Scriptable stand-in for chat, vision, embedding, and recognition
/// backends.
#[derive(Clone, Default)]
pub struct MockInference {
    inner: Arc<Mutex<Inner>>,
}

impl MockInference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the embedding dimension.
    pub fn with_dimension(self, dimension: usize) -> Self {
        self.inner.lock().unwrap().dimension = dimension;
        self
    }

    /// Queue a JSON response; queued responses are served in order before
    /// the default response.
    pub fn push_json_response(&self, json: impl Into<String>) {
        self.inner.lock().unwrap().queued_json.push_back(json.into());
    }

    /// Set the JSON served when the queue is empty.
    pub fn with_default_json(self, json: impl Into<String>) -> Self {
        self.inner.lock().unwrap().default_json = json.into();
        self
    }

    /// Script the vision verdict for a specific product name.
    pub fn with_verdict(self, product_name: impl Into<String>, is_match: bool) -> Self {
        self.inner
            .lock()
            .unwrap()
            .verdicts
            .insert(product_name.into(), is_match);
        self
    }

    /// Set the verdict for products without a scripted answer.
    pub fn with_default_verdict(self, is_match: bool) -> Self {
        self.inner.lock().unwrap().default_verdict = is_match;
        self
    }

    /// Set the pages returned by recognition.
    pub fn with_pages(self, pages: Vec<RawPageText>) -> Self {
        self.inner.lock().unwrap().pages = pages;
        self
    }

    /// Make the next `n` chat or embedding calls fail transiently.
    pub fn fail_next_transient(&self, n: u32) {
        self.inner.lock().unwrap().transient_failures = n;
    }

    /// Make the vision backend unreachable: health checks fail and every
    /// confirmation errors transiently.
    pub fn with_vision_unavailable(self) -> Self {
        self.inner.lock().unwrap().vision_unavailable = true;
        self
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Count calls for one operation name.
    pub fn call_count(&self, operation: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    fn log_call(&self, operation: &str, input: &str) {
        self.inner.lock().unwrap().calls.push(MockCall {
            operation: operation.to_string(),
            input: input.to_string(),
        });
    }

    fn take_transient_failure(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.transient_failures > 0 {
            inner.transient_failures -= 1;
            true
        } else {
            false
        }
    }

    /// Generate a deterministic unit-norm embedding from text.
    pub fn embedding_for(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0f32; dimension];
        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
        vec
    }
}

#[async_trait]
impl ChatBackend for MockInference {
    async fn generate_json(&self, _system: &str, prompt: &str) -> Result<String> {
        self.log_call("generate_json", prompt);
        if self.take_transient_failure() {
            return Err(Error::Transient("scripted chat failure".to_string()));
        }
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .queued_json
            .pop_front()
            .unwrap_or_else(|| inner.default_json.clone()))
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}

#[async_trait]
impl EmbeddingBackend for MockInference {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        for text in texts {
            self.log_call("embed_texts", text);
        }
        if self.take_transient_failure() {
            return Err(Error::Transient("scripted embedding failure".to_string()));
        }
        let dimension = self.inner.lock().unwrap().dimension;
        Ok(texts
            .iter()
            .map(|t| Self::embedding_for(t, dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.inner.lock().unwrap().dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl VisionBackend for MockInference {
    async fn confirm_match(
        &self,
        _image_data: &[u8],
        _mime_type: &str,
        product_name: &str,
    ) -> Result<MatchVerdict> {
        self.log_call("confirm_match", product_name);
        let inner = self.inner.lock().unwrap();
        if inner.vision_unavailable {
            return Err(Error::Transient("vision service unreachable".to_string()));
        }
        let is_match = inner
            .verdicts
            .get(product_name)
            .copied()
            .unwrap_or(inner.default_verdict);
        Ok(MatchVerdict {
            is_match,
            reason: None,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.inner.lock().unwrap().vision_unavailable)
    }

    fn model_name(&self) -> &str {
        "mock-vision"
    }
}

#[async_trait]
impl RecognitionBackend for MockInference {
    async fn recognize_pages(&self, data: &[u8], _content_type: &str) -> Result<Vec<RawPageText>> {
        self.log_call("recognize_pages", &format!("{} bytes", data.len()));
        Ok(self.inner.lock().unwrap().pages.clone())
    }

    fn service_name(&self) -> &str {
        "mock-recognition"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_responses_served_in_order() {
        let mock = MockInference::new().with_default_json("{}");
        mock.push_json_response("{\"a\": 1}");
        mock.push_json_response("{\"b\": 2}");

        assert_eq!(mock.generate_json("", "p1").await.unwrap(), "{\"a\": 1}");
        assert_eq!(mock.generate_json("", "p2").await.unwrap(), "{\"b\": 2}");
        assert_eq!(mock.generate_json("", "p3").await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_transient_failures_consumed() {
        let mock = MockInference::new();
        mock.fail_next_transient(1);

        let err = mock.generate_json("", "p").await.unwrap_err();
        assert!(err.is_transient());
        assert!(mock.generate_json("", "p").await.is_ok());
    }

    #[tokio::test]
    async fn test_scripted_verdicts() {
        let mock = MockInference::new()
            .with_verdict("Oak Chair", true)
            .with_default_verdict(false);

        let verdict = mock.confirm_match(&[], "image/png", "Oak Chair").await.unwrap();
        assert!(verdict.is_match);
        let verdict = mock.confirm_match(&[], "image/png", "Sofa").await.unwrap();
        assert!(!verdict.is_match);
    }

    #[tokio::test]
    async fn test_vision_unavailable() {
        let mock = MockInference::new().with_vision_unavailable();
        assert!(!mock.health_check().await.unwrap());
        let err = mock.confirm_match(&[], "image/png", "Sofa").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_embeddings_deterministic() {
        let mock = MockInference::new().with_dimension(64);
        let a = mock.embed_texts(&["oak chair".to_string()]).await.unwrap();
        let b = mock.embed_texts(&["oak chair".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 64);
    }

    #[tokio::test]
    async fn test_call_log() {
        let mock = MockInference::new();
        mock.generate_json("", "p").await.unwrap();
        mock.confirm_match(&[], "image/png", "Sofa").await.unwrap();
        mock.recognize_pages(b"doc", "application/pdf").await.unwrap();

        assert_eq!(mock.call_count("generate_json"), 1);
        assert_eq!(mock.call_count("confirm_match"), 1);
        assert_eq!(mock.call_count("recognize_pages"), 1);
        assert_eq!(mock.get_calls().len(), 3);
    }
}
