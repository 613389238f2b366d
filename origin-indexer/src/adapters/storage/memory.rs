//! In-memory persistence for tests
//!
//! A commit builds the next state on a copy and swaps it in only when every
//! step succeeded, so an injected failure leaves nothing behind.

use crate::core::{Checkpoint, IndexerError, IndexerResult, PersistencePort, StreamId};
use crate::domain::models::DomainRecord;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct StreamState {
    checkpoint: Option<Checkpoint>,
    /// Records keyed by natural key
    records: BTreeMap<String, DomainRecord>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_commits: u32,
    commits: u32,
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    streams: RwLock<HashMap<StreamId, StreamState>>,
    faults: std::sync::Mutex<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` commits before anything is applied
    pub fn fail_commits(&self, times: u32) {
        self.faults().fail_commits = times;
    }

    /// Number of successful commits so far
    pub fn commit_count(&self) -> u32 {
        self.faults().commits
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PersistencePort for MemoryStore {
    async fn checkpoint(&self, stream: StreamId) -> IndexerResult<Option<Checkpoint>> {
        Ok(self
            .streams
            .read()
            .await
            .get(&stream)
            .and_then(|s| s.checkpoint.clone()))
    }

    async fn ensure_checkpoint(&self, stream: StreamId, initial_height: u64) -> IndexerResult<Checkpoint> {
        let mut streams = self.streams.write().await;
        let state = streams.entry(stream).or_default();
        Ok(state
            .checkpoint
            .get_or_insert_with(|| Checkpoint::new(stream, initial_height))
            .clone())
    }

    async fn commit(
        &self,
        stream: StreamId,
        new_checkpoint_height: u64,
        records: &[DomainRecord],
        superseded_above: Option<u64>,
    ) -> IndexerResult<()> {
        let mut streams = self.streams.write().await;
        let mut staged = streams.get(&stream).cloned().unwrap_or_default();

        if let Some(height) = superseded_above {
            staged.records.retain(|_, r| r.source_height() <= height);
        }
        for record in records {
            staged
                .records
                .insert(record.natural_key().to_string(), record.clone());
        }
        staged.checkpoint = Some(Checkpoint::new(stream, new_checkpoint_height));

        {
            let mut faults = self.faults();
            if faults.fail_commits > 0 {
                faults.fail_commits -= 1;
                return Err(IndexerError::Persistence("injected commit failure".to_string()));
            }
            faults.commits += 1;
        }

        streams.insert(stream, staged);
        debug!(stream = %stream, checkpoint = new_checkpoint_height, "Committed window in memory");
        Ok(())
    }

    async fn reset_checkpoint(&self, stream: StreamId, height: u64) -> IndexerResult<()> {
        let mut streams = self.streams.write().await;
        let state = streams.entry(stream).or_default();
        state.records.retain(|_, r| r.source_height() <= height);
        state.checkpoint = Some(Checkpoint::new(stream, height));
        Ok(())
    }

    async fn records(&self, stream: StreamId) -> IndexerResult<Vec<DomainRecord>> {
        let streams = self.streams.read().await;
        let mut records: Vec<DomainRecord> = streams
            .get(&stream)
            .map(|s| s.records.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by_key(|r| (r.source_height(), r.log_index()));
        Ok(records)
    }

    async fn health_check(&self) -> IndexerResult<()> {
        Ok(())
    }
}
