//! Signature-keyed decoder table for one stream

use super::{ListingDecoder, LogDecoder, OfferDecoder, ProductDecoder};
use crate::core::{sort_logs, IndexerResult, RawBlock, RawLog, StreamId};
use crate::domain::models::DomainRecord;
use alloy_primitives::{Address, B256};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// A log that was recognized but could not be decoded
#[derive(Debug, Clone)]
pub struct SkippedLog {
    pub block_height: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub reason: String,
}

/// Output of extracting one window
#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// Records in chain order
    pub records: Vec<DomainRecord>,
    pub skipped: Vec<SkippedLog>,
}

/// Turns raw logs into domain records for a single stream.
///
/// Logs from contracts outside the stream's set and logs with unknown
/// signatures are ignored. A recognized log whose payload does not match
/// its schema is skipped and reported; it never aborts the window.
pub struct EventExtractor {
    stream: StreamId,
    contracts: HashSet<Address>,
    decoders: HashMap<B256, Box<dyn LogDecoder>>,
}

impl EventExtractor {
    pub fn new(stream: StreamId, contracts: Vec<Address>, decoders: Vec<Box<dyn LogDecoder>>) -> Self {
        let decoders = decoders.into_iter().map(|d| (d.signature(), d)).collect();
        Self {
            stream,
            contracts: contracts.into_iter().collect(),
            decoders,
        }
    }

    /// Extractor with the decoders belonging to `stream`
    pub fn for_stream(stream: StreamId, contracts: Vec<Address>) -> Self {
        let decoders: Vec<Box<dyn LogDecoder>> = match stream {
            StreamId::Marketplace => {
                let mut decoders: Vec<Box<dyn LogDecoder>> = ListingDecoder::all()
                    .into_iter()
                    .map(|d| Box::new(d) as Box<dyn LogDecoder>)
                    .collect();
                decoders.push(Box::new(OfferDecoder));
                decoders
            }
            StreamId::Dshop => vec![Box::new(ProductDecoder)],
        };
        Self::new(stream, contracts, decoders)
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Contracts whose logs this extractor consumes
    pub fn contracts(&self) -> Vec<Address> {
        let mut contracts: Vec<Address> = self.contracts.iter().copied().collect();
        contracts.sort();
        contracts
    }

    /// Event signature hashes this extractor recognizes
    pub fn signatures(&self) -> Vec<B256> {
        let mut signatures: Vec<B256> = self.decoders.keys().copied().collect();
        signatures.sort();
        signatures
    }

    /// Decode one log. `Ok(None)` for logs this stream does not track.
    pub fn extract(&self, log: &RawLog) -> IndexerResult<Option<DomainRecord>> {
        if !self.contracts.contains(&log.contract_address) {
            return Ok(None);
        }
        let Some(decoder) = log.signature().and_then(|sig| self.decoders.get(&sig)) else {
            return Ok(None);
        };
        decoder.decode(log)
    }

    /// Decode every log of the window in chain order
    pub fn extract_window(&self, blocks: &[RawBlock]) -> ExtractionReport {
        let mut logs: Vec<RawLog> = blocks.iter().flat_map(|b| b.logs.iter().cloned()).collect();
        sort_logs(&mut logs);

        let mut report = ExtractionReport::default();
        for log in &logs {
            match self.extract(log) {
                Ok(Some(record)) => report.records.push(record),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        stream = %self.stream,
                        block = log.block_height,
                        tx_hash = %log.tx_hash,
                        log_index = log.log_index,
                        "Skipping log: {}", e
                    );
                    report.skipped.push(SkippedLog {
                        block_height: log.block_height,
                        tx_hash: log.tx_hash,
                        log_index: log.log_index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!(
            stream = %self.stream,
            logs = logs.len(),
            records = report.records.len(),
            skipped = report.skipped.len(),
            "Extracted window"
        );
        report
    }
}
