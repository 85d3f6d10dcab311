//! # mobilia-store
//!
//! Store implementations for the mobilia pipeline. The traits live in
//! `mobilia-core`; this crate provides the filesystem blob store and
//! the in-memory record store.

pub mod blob;
pub mod memory;

pub use blob::FsBlobStore;
pub use memory::MemoryRecordStore;
