//! # mobilia-ingest
//!
//! Orchestration for catalog ingestion: the per-job pipeline, image
//! association, price fusion, embeddings, and the background worker.
//!
//! The crate's entry points are [`IngestPipeline`] for a synchronous
//! run and [`IngestWorker`] for fire-and-forget submission with
//! broadcast progress events.

pub mod associate;
pub mod embed;
pub mod fusion;
pub mod pipeline;
pub mod worker;

pub use associate::{AssociationStats, ImageAssociator};
pub use pipeline::IngestPipeline;
pub use worker::{IngestWorker, WorkerEvent};
