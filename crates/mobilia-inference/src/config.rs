//! Configuration for AI service backends.

use mobilia_core::defaults;

/// Configuration for the OpenAI-compatible backend family.
///
/// One config covers chat, vision, and embeddings because they share the
/// same endpoint and credentials. Construct with [`InferenceConfig::default`]
/// and override with the `with_*` setters, or read everything from the
/// environment with [`InferenceConfig::from_env`].
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    /// Model used for structured text extraction.
    pub chat_model: String,
    /// Model used for image match confirmation.
    pub vision_model: String,
    /// Model used for embeddings.
    pub embed_model: String,
    /// Expected embedding dimension.
    pub embed_dimension: usize,
    /// Timeout for chat and vision requests, in seconds.
    pub chat_timeout_secs: u64,
    /// Timeout for embedding requests, in seconds.
    pub embed_timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OPENAI_BASE_URL.to_string(),
            api_key: None,
            chat_model: defaults::CHAT_MODEL.to_string(),
            vision_model: defaults::VISION_MODEL.to_string(),
            embed_model: defaults::EMBED_MODEL.to_string(),
            embed_dimension: defaults::EMBED_DIMENSION,
            chat_timeout_secs: defaults::CHAT_TIMEOUT_SECS,
            embed_timeout_secs: defaults::EMBED_TIMEOUT_SECS,
        }
    }
}

impl InferenceConfig {
    /// Read configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var(defaults::ENV_BASE_URL)
                .unwrap_or_else(|_| defaults::OPENAI_BASE_URL.to_string()),
            api_key: std::env::var(defaults::ENV_API_KEY).ok(),
            chat_model: std::env::var("MOBILIA_CHAT_MODEL")
                .unwrap_or_else(|_| defaults::CHAT_MODEL.to_string()),
            vision_model: std::env::var("MOBILIA_VISION_MODEL")
                .unwrap_or_else(|_| defaults::VISION_MODEL.to_string()),
            embed_model: std::env::var("MOBILIA_EMBED_MODEL")
                .unwrap_or_else(|_| defaults::EMBED_MODEL.to_string()),
            embed_dimension: std::env::var("MOBILIA_EMBED_DIM")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::EMBED_DIMENSION),
            chat_timeout_secs: std::env::var("MOBILIA_CHAT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::CHAT_TIMEOUT_SECS),
            embed_timeout_secs: std::env::var("MOBILIA_EMBED_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::EMBED_TIMEOUT_SECS),
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the chat model.
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Set the vision model.
    pub fn with_vision_model(mut self, model: impl Into<String>) -> Self {
        self.vision_model = model.into();
        self
    }

    /// Set the embedding model.
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }
}
