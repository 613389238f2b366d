//! Core trait abstractions (Ports in Hexagonal Architecture)

use alloy_primitives::{Address, B256};
use async_trait::async_trait;

use super::error::IndexerResult;
use super::types::*;
use crate::domain::models::{DeadLetter, DomainRecord, ExportBatch};

/// Chain port - read-only access to the remote chain endpoint
#[async_trait]
pub trait ChainPort: Send + Sync {
    /// Latest block height known to the endpoint
    async fn head(&self) -> IndexerResult<u64>;

    /// Head minus the caller-supplied confirmation depth
    async fn safe_head(&self, confirmation_depth: u64) -> IndexerResult<u64> {
        Ok(self.head().await?.saturating_sub(confirmation_depth))
    }

    /// Block headers for `[lo, hi]` in ascending order, logs left empty
    async fn block_range(&self, lo: u64, hi: u64) -> IndexerResult<Vec<RawBlock>>;

    /// Logs emitted by `addresses` in `[lo, hi]` whose first topic is one of `topics`
    async fn logs(
        &self,
        addresses: &[Address],
        topics: &[B256],
        lo: u64,
        hi: u64,
    ) -> IndexerResult<Vec<RawLog>>;
}

/// Persistence port - the single writer of checkpoints and records
#[async_trait]
pub trait PersistencePort: Send + Sync {
    /// Current checkpoint of a stream
    async fn checkpoint(&self, stream: StreamId) -> IndexerResult<Option<Checkpoint>>;

    /// Current checkpoint, seeding it at `initial_height` on first run
    async fn ensure_checkpoint(&self, stream: StreamId, initial_height: u64) -> IndexerResult<Checkpoint>;

    /// Atomically upsert `records`, purge records above `superseded_above`
    /// and advance the checkpoint. Either everything is applied or nothing.
    async fn commit(
        &self,
        stream: StreamId,
        new_checkpoint_height: u64,
        records: &[DomainRecord],
        superseded_above: Option<u64>,
    ) -> IndexerResult<()>;

    /// Administrative rewind: purge records above `height` and move the checkpoint there
    async fn reset_checkpoint(&self, stream: StreamId, height: u64) -> IndexerResult<()>;

    /// Every stored record of a stream, ordered by source height then log index
    async fn records(&self, stream: StreamId) -> IndexerResult<Vec<DomainRecord>>;

    /// Health check
    async fn health_check(&self) -> IndexerResult<()>;
}

/// Warehouse port - append/upsert of typed rows into one table per stream
#[async_trait]
pub trait WarehousePort: Send + Sync {
    /// Insert the batch's rows, returning the number accepted
    async fn insert_rows(&self, batch: &ExportBatch) -> IndexerResult<usize>;
}

/// Metadata port - listing documents published on IPFS
#[async_trait]
pub trait MetadataPort: Send + Sync {
    /// JSON document behind a CIDv0 listing hash
    async fn listing_document(&self, ipfs_hash: &str) -> IndexerResult<serde_json::Value>;
}

/// Dead-letter port - durable parking for batches that could not be exported
#[async_trait]
pub trait DeadLetterPort: Send + Sync {
    /// Persist a dead letter, returning its key
    async fn store(&self, letter: &DeadLetter) -> IndexerResult<String>;

    /// Dead letters in key order, optionally for one stream only
    async fn list(&self, stream: Option<StreamId>) -> IndexerResult<Vec<(String, DeadLetter)>>;

    /// Drop a dead letter after a successful replay
    async fn remove(&self, key: &str) -> IndexerResult<()>;

    async fn count(&self, stream: Option<StreamId>) -> IndexerResult<usize> {
        Ok(self.list(stream).await?.len())
    }
}
