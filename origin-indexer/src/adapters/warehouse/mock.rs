//! Recording warehouse for tests

use crate::core::{IndexerError, IndexerResult, StreamId, WarehousePort};
use crate::domain::models::{DomainRecord, ExportBatch};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// How the mock answers inserts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    Accept,
    /// Transient failure for the next `n` calls, then accept
    FailTransient(u32),
    /// Transient failure forever
    AlwaysFail,
    /// Permanent rejection
    Reject,
}

#[derive(Debug)]
struct MockWarehouseState {
    behavior: MockBehavior,
    calls: u32,
    /// Rows keyed by natural key, per stream
    rows: BTreeMap<StreamId, BTreeMap<String, DomainRecord>>,
}

/// Warehouse that keeps accepted rows in memory, deduplicated by natural key
#[derive(Debug)]
pub struct MockWarehouse {
    state: Mutex<MockWarehouseState>,
}

impl Default for MockWarehouse {
    fn default() -> Self {
        Self::new(MockBehavior::Accept)
    }
}

impl MockWarehouse {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            state: Mutex::new(MockWarehouseState {
                behavior,
                calls: 0,
                rows: BTreeMap::new(),
            }),
        }
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        self.lock().behavior = behavior;
    }

    /// Insert calls received, failed ones included
    pub fn calls(&self) -> u32 {
        self.lock().calls
    }

    /// Accepted rows of a stream in natural-key order
    pub fn rows(&self, stream: StreamId) -> Vec<DomainRecord> {
        self.lock()
            .rows
            .get(&stream)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockWarehouseState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl WarehousePort for MockWarehouse {
    async fn insert_rows(&self, batch: &ExportBatch) -> IndexerResult<usize> {
        let mut state = self.lock();
        state.calls += 1;

        let behavior = state.behavior.clone();
        match behavior {
            MockBehavior::Accept => {}
            MockBehavior::FailTransient(n) => {
                state.behavior = if n <= 1 {
                    MockBehavior::Accept
                } else {
                    MockBehavior::FailTransient(n - 1)
                };
                if n > 0 {
                    return Err(IndexerError::TransientFetch("HTTP 503".to_string()));
                }
            }
            MockBehavior::AlwaysFail => {
                return Err(IndexerError::TransientFetch("HTTP 503".to_string()));
            }
            MockBehavior::Reject => {
                return Err(IndexerError::WarehouseRejected("row 0 (invalid: schema mismatch)".to_string()));
            }
        }

        let rows = state.rows.entry(batch.stream_id).or_default();
        for record in &batch.records {
            rows.insert(record.natural_key().to_string(), record.clone());
        }
        Ok(batch.len())
    }
}
