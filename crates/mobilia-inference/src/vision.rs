//! Vision backend for confirming product/image matches.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use mobilia_core::{Error, Result};

use crate::config::InferenceConfig;
use crate::json::clean_json_payload;
use crate::types::*;

/// Verdict from a vision model on whether an image depicts a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchVerdict {
    pub is_match: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Backend for visually confirming that an image shows a named product.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Ask whether the image depicts the named product.
    async fn confirm_match(
        &self,
        image_data: &[u8],
        mime_type: &str,
        product_name: &str,
    ) -> Result<MatchVerdict>;

    /// Check if the vision backend is available.
    async fn health_check(&self) -> Result<bool>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Vision backend over an OpenAI-compatible chat completions endpoint.
///
/// Images travel inline as base64 data URLs. The model is asked for a
/// JSON verdict so the answer parses deterministically.
pub struct OpenAiVisionBackend {
    client: reqwest::Client,
    config: InferenceConfig,
}

const VERDICT_SYSTEM_PROMPT: &str = "You verify product catalog images. \
Answer with a JSON object: {\"is_match\": true|false, \"reason\": \"short explanation\"}. \
is_match is true only if the image clearly shows the named product.";

impl OpenAiVisionBackend {
    pub fn new(config: InferenceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(InferenceConfig::from_env())
    }

    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        req.header("Content-Type", "application/json")
    }
}

#[async_trait]
impl VisionBackend for OpenAiVisionBackend {
    async fn confirm_match(
        &self,
        image_data: &[u8],
        mime_type: &str,
        product_name: &str,
    ) -> Result<MatchVerdict> {
        use base64::Engine;
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(image_data);
        let data_url = format!("data:{};base64,{}", mime_type, image_b64);

        debug!(
            component = "vision",
            model = %self.config.vision_model,
            product = %product_name,
            image_bytes = image_data.len(),
            "Requesting match verdict"
        );

        let request = ChatCompletionRequest {
            model: self.config.vision_model.clone(),
            messages: vec![
                ChatRequestMessage::system(VERDICT_SYSTEM_PROMPT),
                ChatRequestMessage::user_parts(vec![
                    ContentPart::Text {
                        text: format!(
                            "Does this image show the product named \"{}\"?",
                            product_name
                        ),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ]),
            ],
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
            let status = response.status();
            let message = match response.json::<ApiErrorResponse>().await {
                Ok(body) => body.error.message,
                Err(_) => "Unknown error".to_string(),
            };
            return if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                Err(Error::Transient(format!(
                    "Vision API returned {}: {}",
                    status, message
                )))
            } else {
                Err(Error::Inference(format!(
                    "Vision API returned {}: {}",
                    status, message
                )))
            };
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse vision response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        let verdict: MatchVerdict =
            serde_json::from_str(clean_json_payload(&content)).map_err(|e| {
                Error::Inference(format!("Vision verdict was not valid JSON: {}", e))
            })?;

        debug!(
            component = "vision",
            is_match = verdict.is_match,
            "Verdict received"
        );
        Ok(verdict)
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.config.base_url.trim_end_matches('/'));
        let mut req = self.client.get(&url).timeout(Duration::from_secs(5));
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        match req.send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn model_name(&self) -> &str {
        &self.config.vision_model
    }
}
