//! Warehouse publisher
//!
//! Splits committed records into bounded batches and streams them to the
//! warehouse with exponential retry. A batch that cannot be delivered is
//! parked in the dead-letter queue; the checkpoint has already moved on.

use crate::config::WarehouseConfig;
use crate::core::{BlockWindow, DeadLetterPort, IndexerError, IndexerResult, StreamId, WarehousePort};
use crate::domain::models::{DeadLetter, DomainRecord, ExportBatch};
use crate::pipeline::BackoffPolicy;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Splits records into batches bounded by count and serialized size
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    max_records: usize,
    max_bytes: usize,
}

impl BatchPlanner {
    pub fn new(max_records: usize, max_bytes: usize) -> Self {
        Self {
            max_records: max_records.max(1),
            max_bytes: max_bytes.max(1),
        }
    }

    /// Records keep their order; a record larger than the byte bound ships alone
    pub fn split(&self, stream: StreamId, window: BlockWindow, records: Vec<DomainRecord>) -> Vec<ExportBatch> {
        let mut batches = Vec::new();
        let mut current: Vec<DomainRecord> = Vec::new();
        let mut current_bytes = 0usize;

        for record in records {
            let size = record.row_size();
            let full = current.len() >= self.max_records || current_bytes + size > self.max_bytes;
            if !current.is_empty() && full {
                let seq = batches.len() as u32;
                batches.push(ExportBatch::new(stream, window, seq, std::mem::take(&mut current)));
                current_bytes = 0;
            }
            current_bytes += size;
            current.push(record);
        }

        if !current.is_empty() {
            let seq = batches.len() as u32;
            batches.push(ExportBatch::new(stream, window, seq, current));
        }
        batches
    }
}

/// Fate of one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    Delivered { rows: usize },
    DeadLettered { key: String },
}

/// Summary of publishing one window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub batches: usize,
    pub delivered_rows: usize,
    /// Keys of the dead letters written
    pub dead_lettered: Vec<String>,
    /// Batches neither delivered nor parked
    pub lost: usize,
}

/// Outcome of a manual replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    pub rows: usize,
    pub still_failing: usize,
}

/// Warehouse publisher with retry and dead-letter fallback
pub struct Publisher {
    warehouse: Arc<dyn WarehousePort>,
    dead_letters: Arc<dyn DeadLetterPort>,
    batches: BatchPlanner,
    max_attempts: u32,
    backoff: BackoffPolicy,
}

impl Publisher {
    pub fn new(
        warehouse: Arc<dyn WarehousePort>,
        dead_letters: Arc<dyn DeadLetterPort>,
        config: &WarehouseConfig,
    ) -> Self {
        Self {
            warehouse,
            dead_letters,
            batches: BatchPlanner::new(config.max_batch_records, config.max_batch_bytes),
            max_attempts: config.max_attempts.max(1),
            backoff: BackoffPolicy::new(
                Duration::from_millis(config.initial_backoff_ms),
                Duration::from_millis(config.max_backoff_ms),
            ),
        }
    }

    /// Insert with retries; transient failures back off, permanent ones stop at once
    async fn deliver(&self, batch: &mut ExportBatch) -> IndexerResult<usize> {
        loop {
            batch.attempt_count += 1;
            match self.warehouse.insert_rows(batch).await {
                Ok(rows) => return Ok(rows),
                Err(e) if e.is_transient() && batch.attempt_count < self.max_attempts => {
                    let delay = self.backoff.delay_for(batch.attempt_count);
                    warn!(
                        stream = %batch.stream_id,
                        window = %batch.window,
                        batch = batch.batch_seq,
                        attempt = batch.attempt_count,
                        "Export failed, retrying in {:?}: {}", delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(IndexerError::ExhaustedRetry {
                        stream: batch.stream_id.to_string(),
                        records: batch.len(),
                        attempts: batch.attempt_count,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Deliver one batch, dead-lettering it when delivery is given up on.
    /// Errors only when the dead-letter queue itself fails.
    pub async fn publish(&self, mut batch: ExportBatch) -> IndexerResult<PublishResult> {
        match self.deliver(&mut batch).await {
            Ok(rows) => {
                debug!(
                    stream = %batch.stream_id,
                    batch = batch.batch_seq,
                    rows,
                    attempts = batch.attempt_count,
                    "Batch delivered"
                );
                Ok(PublishResult::Delivered { rows })
            }
            Err(e) => {
                let letter = DeadLetter::from_batch(&batch, e.to_string());
                let key = self.dead_letters.store(&letter).await?;
                error!(
                    stream = %batch.stream_id,
                    window = %batch.window,
                    records = batch.len(),
                    attempts = batch.attempt_count,
                    key = %key,
                    "Batch dead-lettered: {}", e
                );
                Ok(PublishResult::DeadLettered { key })
            }
        }
    }

    /// Publish every record committed for `window`
    pub async fn publish_all(
        &self,
        stream: StreamId,
        window: BlockWindow,
        records: Vec<DomainRecord>,
    ) -> PublishReport {
        let batches = self.batches.split(stream, window, records);
        let mut report = PublishReport {
            batches: batches.len(),
            ..PublishReport::default()
        };

        for batch in batches {
            let seq = batch.batch_seq;
            match self.publish(batch).await {
                Ok(PublishResult::Delivered { rows }) => report.delivered_rows += rows,
                Ok(PublishResult::DeadLettered { key }) => report.dead_lettered.push(key),
                Err(e) => {
                    error!(stream = %stream, window = %window, batch = seq, "Batch lost, dead-letter write failed: {}", e);
                    report.lost += 1;
                }
            }
        }
        report
    }

    /// Retry parked batches, removing those the warehouse now accepts
    pub async fn replay_dead_letters(&self, stream: Option<StreamId>) -> IndexerResult<ReplayReport> {
        let letters = self.dead_letters.list(stream).await?;
        let mut report = ReplayReport::default();

        for (key, letter) in letters {
            let mut batch = letter.to_batch();
            match self.deliver(&mut batch).await {
                Ok(rows) => {
                    self.dead_letters.remove(&key).await?;
                    info!(key = %key, rows, "Dead letter replayed");
                    report.replayed += 1;
                    report.rows += rows;
                }
                Err(e) => {
                    warn!(key = %key, "Dead letter still failing: {}", e);
                    report.still_failing += 1;
                }
            }
        }
        Ok(report)
    }
}
