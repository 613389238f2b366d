//! Dead-letter artifacts for batches the warehouse never accepted

use super::{DomainRecord, ExportBatch};
use crate::core::{BlockWindow, StreamId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A batch whose export was given up on, kept for manual replay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeadLetter {
    pub stream_id: StreamId,
    pub window: BlockWindow,
    pub batch_seq: u32,
    pub records: Vec<DomainRecord>,
    pub attempts: u32,
    pub last_error: String,
    pub created_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn from_batch(batch: &ExportBatch, last_error: impl Into<String>) -> Self {
        Self {
            stream_id: batch.stream_id,
            window: batch.window,
            batch_seq: batch.batch_seq,
            records: batch.records.clone(),
            attempts: batch.attempt_count,
            last_error: last_error.into(),
            created_at: Utc::now(),
        }
    }

    /// Storage key: stream, checkpoint range and batch position.
    /// Zero padding keeps lexicographic order equal to block order.
    pub fn key(&self) -> String {
        format!(
            "{}/{:020}-{:020}/{:06}",
            self.stream_id, self.window.lo, self.window.hi, self.batch_seq
        )
    }

    /// Rebuild an export batch for replay
    pub fn to_batch(&self) -> ExportBatch {
        ExportBatch::new(self.stream_id, self.window, self.batch_seq, self.records.clone())
    }
}
