//! Log processors - schema-driven decoding of raw logs into domain records

pub mod events;
pub mod listing;
pub mod product;
pub mod registry;

use crate::core::{IndexerError, IndexerResult, RawLog};
use crate::domain::models::DomainRecord;
use alloy_primitives::B256;

pub use listing::{ListingDecoder, OfferDecoder};
pub use product::ProductDecoder;
pub use registry::{EventExtractor, ExtractionReport, SkippedLog};

/// Decoder for one event signature
pub trait LogDecoder: Send + Sync {
    /// Solidity event name
    fn event_name(&self) -> &'static str;

    /// Hash of the event signature (topic 0)
    fn signature(&self) -> B256;

    /// Decode a log carrying this decoder's signature. `Ok(None)` means
    /// the log is valid but irrelevant to the stream.
    fn decode(&self, log: &RawLog) -> IndexerResult<Option<DomainRecord>>;
}

/// Deterministic key from the emitting contract, the event, its indexed
/// arguments and the log's position in the chain.
pub fn natural_key(log: &RawLog, event_name: &str, indexed_args: &[String]) -> String {
    format!(
        "{}:{}:{}:{}:{}",
        log.contract_address,
        event_name,
        indexed_args.join("/"),
        log.tx_hash,
        log.log_index
    )
}

/// Wrap a decoding failure into the malformed-log error of this log
pub(crate) fn malformed(log: &RawLog, event_name: &str, reason: impl ToString) -> IndexerError {
    IndexerError::MalformedLog {
        event: event_name.to_string(),
        tx_hash: log.tx_hash.to_string(),
        log_index: log.log_index,
        reason: reason.to_string(),
    }
}
