//! # mobilia-extract
//!
//! Extraction stages for the mobilia pipeline: spreadsheet rows and
//! document pages to product candidates, and office-container archives
//! to anchored embedded images.

pub mod archive;
pub mod document;
pub mod prompts;
pub mod tabular;

pub use archive::extract_images;
pub use document::{DocumentExtraction, DocumentExtractor};
pub use tabular::{read_rows, TabularExtraction, TabularExtractor};
