//! # mobilia-inference
//!
//! AI service backends for the mobilia pipeline: structured chat
//! completions, image match confirmation, embeddings, and asynchronous
//! text recognition.
//!
//! The trait seams live in `mobilia-core` ([`mobilia_core::ChatBackend`],
//! [`mobilia_core::EmbeddingBackend`]) and in this crate
//! ([`VisionBackend`], [`RecognitionBackend`]); implementations here
//! target OpenAI-compatible endpoints. Enable the `mock` feature for the
//! scriptable test double.

pub mod config;
pub mod json;
pub mod openai;
pub mod recognition;
pub mod types;
pub mod vision;

#[cfg(feature = "mock")]
pub mod mock;

pub use config::InferenceConfig;
pub use json::clean_json_payload;
pub use openai::OpenAiBackend;
pub use recognition::{HttpRecognitionBackend, RecognitionBackend};
pub use vision::{MatchVerdict, OpenAiVisionBackend, VisionBackend};
