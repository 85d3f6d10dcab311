//! OpenAI-compatible chat and embedding backend.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

use mobilia_core::{ChatBackend, EmbeddingBackend, Error, Result};

use crate::config::InferenceConfig;
use crate::types::*;

/// Backend for an OpenAI-compatible API, covering structured chat
/// completions and embeddings.
///
/// Rate limiting (429) and server errors classify as
/// [`Error::Transient`] so callers can retry with backoff; everything
/// else is terminal for the request.
pub struct OpenAiBackend {
    client: Client,
    config: InferenceConfig,
}

impl OpenAiBackend {
    /// Create a new backend with the given configuration.
    pub fn new(config: InferenceConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            component = "openai",
            base_url = %config.base_url,
            chat_model = %config.chat_model,
            embed_model = %config.embed_model,
            "Initializing OpenAI backend"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(InferenceConfig::from_env())
    }

    /// Get the current configuration.
    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Build a POST request with authentication if configured.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req.header("Content-Type", "application/json")
    }

    /// Read the error body of a failed response and classify the status.
    async fn error_from_response(response: reqwest::Response, context: &str) -> Error {
        let status = response.status();
        let message = match response.json::<ApiErrorResponse>().await {
            Ok(body) => body.error.message,
            Err(_) => "Unknown error".to_string(),
        };

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Error::Transient(format!("{} returned {}: {}", context, status, message))
        } else {
            Error::Inference(format!("{} returned {}: {}", context, status, message))
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn generate_json(&self, system: &str, prompt: &str) -> Result<String> {
        debug!(
            component = "openai",
            model = %self.config.chat_model,
            prompt_len = prompt.len(),
            "Requesting structured completion"
        );

        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(ChatRequestMessage::system(system));
        }
        messages.push(ChatRequestMessage::user(prompt));

        let request = ChatCompletionRequest {
            model: self.config.chat_model.clone(),
            messages,
            temperature: Some(0.0),
            max_tokens: None,
            response_format: Some(ResponseFormat::json_object()),
        };

        let response = self
            .build_request("/chat/completions")
            .timeout(Duration::from_secs(self.config.chat_timeout_secs))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response, "Chat API").await);
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse chat response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if content.is_empty() {
            return Err(Error::Inference("Chat API returned no content".to_string()));
        }

        debug!(
            component = "openai",
            response_len = content.len(),
            "Completion received"
        );
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.config.chat_model
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!(
            component = "openai",
            model = %self.config.embed_model,
            input_count = texts.len(),
            "Embedding texts"
        );

        let request = EmbeddingRequest {
            model: self.config.embed_model.clone(),
            input: texts.to_vec(),
            encoding_format: Some("float".to_string()),
        };

        let response = self
            .build_request("/embeddings")
            .timeout(Duration::from_secs(self.config.embed_timeout_secs))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response, "Embedding API").await);
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        // Sort by index to ensure correct ordering
        let mut data = result.data;
        data.sort_by_key(|d| d.index);

        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}
