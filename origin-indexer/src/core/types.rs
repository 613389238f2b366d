//! Core domain types

use alloy_primitives::{Address, Bytes, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Independent data stream tracked by its own checkpoint and state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum StreamId {
    Marketplace,
    Dshop,
}

impl StreamId {
    pub const ALL: [StreamId; 2] = [StreamId::Marketplace, StreamId::Dshop];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamId::Marketplace => "marketplace",
            StreamId::Dshop => "dshop",
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "marketplace" => Ok(StreamId::Marketplace),
            "dshop" => Ok(StreamId::Dshop),
            other => Err(format!("unknown stream '{}' (expected marketplace or dshop)", other)),
        }
    }
}

/// Last block height fully processed for a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stream_id: StreamId,
    pub last_processed_height: u64,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(stream_id: StreamId, last_processed_height: u64) -> Self {
        Self {
            stream_id,
            last_processed_height,
            updated_at: Utc::now(),
        }
    }
}

/// Inclusive block range `[lo, hi]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockWindow {
    pub lo: u64,
    pub hi: u64,
}

impl BlockWindow {
    pub fn new(lo: u64, hi: u64) -> Self {
        Self { lo, hi }
    }

    pub fn len(&self) -> u64 {
        if self.hi < self.lo {
            0
        } else {
            self.hi - self.lo + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, height: u64) -> bool {
        height >= self.lo && height <= self.hi
    }
}

impl fmt::Display for BlockWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}

/// Block header plus the logs of interest it contains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub height: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub logs: Vec<RawLog>,
}

/// Event log as returned by the chain endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub block_height: u64,
    pub block_hash: B256,
    pub tx_hash: B256,
    pub transaction_index: u64,
    pub log_index: u64,
    pub contract_address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

impl RawLog {
    /// Position of the log in the chain; total order used for replay-stable processing
    pub fn position(&self) -> LogPosition {
        LogPosition {
            block_height: self.block_height,
            transaction_index: self.transaction_index,
            log_index: self.log_index,
        }
    }

    /// Event signature hash (first topic), if any
    pub fn signature(&self) -> Option<B256> {
        self.topics.first().copied()
    }
}

/// Derived Ord gives lexicographic comparison: (block, tx position, log index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPosition {
    pub block_height: u64,
    pub transaction_index: u64,
    pub log_index: u64,
}

/// Sort logs into their canonical processing order
pub fn sort_logs(logs: &mut [RawLog]) {
    logs.sort_by_key(RawLog::position);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_at(block_height: u64, transaction_index: u64, log_index: u64) -> RawLog {
        RawLog {
            block_height,
            block_hash: B256::ZERO,
            tx_hash: B256::repeat_byte(transaction_index as u8),
            transaction_index,
            log_index,
            contract_address: Address::ZERO,
            topics: vec![],
            data: Bytes::new(),
        }
    }

    #[test]
    fn test_log_ordering_is_total() {
        let mut logs = vec![log_at(5, 1, 9), log_at(4, 7, 2), log_at(5, 0, 11), log_at(5, 1, 3)];
        sort_logs(&mut logs);

        let positions: Vec<_> = logs
            .iter()
            .map(|l| (l.block_height, l.transaction_index, l.log_index))
            .collect();
        assert_eq!(positions, vec![(4, 7, 2), (5, 0, 11), (5, 1, 3), (5, 1, 9)]);
    }

    #[test]
    fn test_stream_id_parsing() {
        assert_eq!("Dshop".parse::<StreamId>(), Ok(StreamId::Dshop));
        assert_eq!("marketplace".parse::<StreamId>(), Ok(StreamId::Marketplace));
        assert!("listings".parse::<StreamId>().is_err());
    }

    #[test]
    fn test_block_window_len() {
        assert_eq!(BlockWindow::new(101, 107).len(), 7);
        assert!(BlockWindow::new(5, 4).is_empty());
        assert!(BlockWindow::new(1, 3).contains(3));
    }
}
