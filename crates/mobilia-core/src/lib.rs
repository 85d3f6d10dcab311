//! # mobilia-core
//!
//! Core types, traits, and abstractions for the mobilia catalog pipeline.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other mobilia crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod report;
pub mod retry;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use report::{ItemOutcome, JobReport, StageReport};
pub use retry::{with_backoff, RetryPolicy};
pub use traits::*;
