//! In-memory listing documents for tests

use crate::core::{IndexerError, IndexerResult, MetadataPort};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct MockMetadataState {
    documents: HashMap<String, Value>,
    requests: Vec<String>,
}

/// Metadata source answering from pinned documents; unknown hashes fail
#[derive(Debug, Default)]
pub struct MockMetadata {
    state: Mutex<MockMetadataState>,
}

impl MockMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin(&self, ipfs_hash: impl Into<String>, document: Value) {
        self.lock().documents.insert(ipfs_hash.into(), document);
    }

    /// Hashes requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockMetadataState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MetadataPort for MockMetadata {
    async fn listing_document(&self, ipfs_hash: &str) -> IndexerResult<Value> {
        let mut state = self.lock();
        state.requests.push(ipfs_hash.to_string());
        state
            .documents
            .get(ipfs_hash)
            .cloned()
            .ok_or_else(|| IndexerError::TransientFetch(format!("{} not pinned", ipfs_hash)))
    }
}
