//! Origin Indexer Library
//!
//! Chain ETL for the Origin marketplace and dshop: polls an Ethereum
//! endpoint, decodes listing and product events, commits them to PostgreSQL
//! together with a per-stream checkpoint and streams them to BigQuery.

pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod pipeline;
pub mod services;

// Re-export commonly used types
pub use config::IndexerConfig;
pub use core::{IndexerError, IndexerResult, StreamId};
pub use pipeline::{CycleOutcome, StreamPipeline};
