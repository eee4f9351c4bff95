//! Core library: hashing, metadata extraction, the tag catalog, ingestion and watching.

pub mod catalog;
pub mod config;
pub mod error;
pub mod extractor;
pub mod models;
pub mod paths;
pub mod pipeline;
pub mod scanner;
pub mod search;
pub mod watcher;

pub use catalog::Catalog;
pub use error::{CatalogError, Result};
pub use pipeline::{IngestOutcome, Ingestor};
pub use watcher::{WatchController, WatchNotice};
