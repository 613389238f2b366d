//! Centralized error types for the Origin indexer

use std::time::Duration;
use thiserror::Error;

/// Main indexer error type
#[derive(Error, Debug)]
pub enum IndexerError {
    /// Network failure or timeout talking to the chain endpoint or the warehouse.
    #[error("Transient fetch error: {0}")]
    TransientFetch(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid block range: {lo} > {hi}")]
    InvalidRange { lo: u64, hi: u64 },

    /// A recognized event signature whose payload does not match its schema.
    #[error("Malformed {event} log (tx {tx_hash}, index {log_index}): {reason}")]
    MalformedLog {
        event: String,
        tx_hash: String,
        log_index: u64,
        reason: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Export of {records} {stream} records failed after {attempts} attempts: {last_error}")]
    ExhaustedRetry {
        stream: String,
        records: usize,
        attempts: u32,
        last_error: String,
    },

    /// Permanent warehouse rejection, never retried.
    #[error("Warehouse rejected rows: {0}")]
    WarehouseRejected(String),

    #[error("Dead-letter queue error: {0}")]
    DeadLetter(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IndexerError {
    /// Errors worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IndexerError::TransientFetch(_) | IndexerError::Timeout(_) | IndexerError::Persistence(_)
        )
    }
}

/// Result type alias for indexer operations
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Helper to convert sqlx errors
impl From<sqlx::Error> for IndexerError {
    fn from(err: sqlx::Error) -> Self {
        IndexerError::Persistence(err.to_string())
    }
}

/// Helper to convert rocksdb errors
impl From<rocksdb::Error> for IndexerError {
    fn from(err: rocksdb::Error) -> Self {
        IndexerError::DeadLetter(err.to_string())
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(err: serde_json::Error) -> Self {
        IndexerError::Decode(err.to_string())
    }
}

/// Any ureq failure is network-level from the pipeline's point of view
impl From<ureq::Error> for IndexerError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) if code == 429 || code >= 500 => {
                IndexerError::TransientFetch(format!("HTTP {}", code))
            }
            ureq::Error::Status(code, response) => IndexerError::Decode(format!(
                "HTTP {} from {}",
                code,
                response.get_url()
            )),
            ureq::Error::Transport(transport) => IndexerError::TransientFetch(transport.to_string()),
        }
    }
}

impl From<reqwest::Error> for IndexerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return IndexerError::Decode(err.to_string());
        }
        match err.status() {
            Some(status) if status.is_client_error() && status.as_u16() != 429 => {
                IndexerError::WarehouseRejected(err.to_string())
            }
            _ => IndexerError::TransientFetch(err.to_string()),
        }
    }
}
