//! In-memory chain for tests
//!
//! Blocks are generated on demand with hashes derived from a fork id, so a
//! reorg is simulated by bumping the fork id above a given height.

use crate::core::{ChainPort, IndexerError, IndexerResult, RawBlock, RawLog};
use alloy_primitives::{keccak256, Address, B256};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct MockChainState {
    head: u64,
    /// Fork id in effect from each height upwards
    forks: BTreeMap<u64, u64>,
    logs: BTreeMap<u64, Vec<RawLog>>,
    fail_head: u32,
    fail_fetch: u32,
    head_calls: u32,
    fetch_calls: u32,
}

impl MockChainState {
    fn fork_at(&self, height: u64) -> u64 {
        self.forks.range(..=height).next_back().map(|(_, f)| *f).unwrap_or(0)
    }

    fn hash_at(&self, height: u64) -> B256 {
        keccak256(format!("{}:{}", self.fork_at(height), height).as_bytes())
    }
}

/// Mock chain endpoint
#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<MockChainState>,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        let chain = Self::default();
        chain.set_head(head);
        chain
    }

    pub fn set_head(&self, head: u64) {
        self.lock().head = head;
    }

    /// Canonical hash at `height`
    pub fn hash_at(&self, height: u64) -> B256 {
        self.lock().hash_at(height)
    }

    /// Add a log to the canonical chain; block hash is filled in
    pub fn push_log(&self, mut log: RawLog) {
        let mut state = self.lock();
        log.block_hash = state.hash_at(log.block_height);
        state.logs.entry(log.block_height).or_default().push(log);
    }

    /// Replace every block from `height` upwards with a new fork, dropping
    /// their logs.
    pub fn reorg_from(&self, height: u64) {
        let mut state = self.lock();
        let next_fork = state.forks.values().max().copied().unwrap_or(0) + 1;
        state.forks.retain(|h, _| *h < height);
        state.forks.insert(height, next_fork);
        state.logs.retain(|h, _| *h < height);
    }

    /// Fail the next `times` head requests
    pub fn fail_head(&self, times: u32) {
        self.lock().fail_head = times;
    }

    /// Fail the next `times` block or log requests
    pub fn fail_fetch(&self, times: u32) {
        self.lock().fail_fetch = times;
    }

    pub fn head_calls(&self) -> u32 {
        self.lock().head_calls
    }

    pub fn fetch_calls(&self) -> u32 {
        self.lock().fetch_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockChainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_fetch(&self) -> IndexerResult<std::sync::MutexGuard<'_, MockChainState>> {
        let mut state = self.lock();
        state.fetch_calls += 1;
        if state.fail_fetch > 0 {
            state.fail_fetch -= 1;
            return Err(IndexerError::TransientFetch("mock fetch failure".to_string()));
        }
        Ok(state)
    }
}

#[async_trait]
impl ChainPort for MockChain {
    async fn head(&self) -> IndexerResult<u64> {
        let mut state = self.lock();
        state.head_calls += 1;
        if state.fail_head > 0 {
            state.fail_head -= 1;
            return Err(IndexerError::TransientFetch("mock head failure".to_string()));
        }
        Ok(state.head)
    }

    async fn block_range(&self, lo: u64, hi: u64) -> IndexerResult<Vec<RawBlock>> {
        if lo > hi {
            return Err(IndexerError::InvalidRange { lo, hi });
        }
        let state = self.begin_fetch()?;
        if hi > state.head {
            return Err(IndexerError::TransientFetch(format!(
                "block {} beyond head {}",
                hi, state.head
            )));
        }

        Ok((lo..=hi)
            .map(|height| RawBlock {
                height,
                hash: state.hash_at(height),
                parent_hash: if height == 0 { B256::ZERO } else { state.hash_at(height - 1) },
                timestamp: 1_500_000_000 + height * 15,
                logs: Vec::new(),
            })
            .collect())
    }

    async fn logs(
        &self,
        addresses: &[Address],
        topics: &[B256],
        lo: u64,
        hi: u64,
    ) -> IndexerResult<Vec<RawLog>> {
        if lo > hi {
            return Err(IndexerError::InvalidRange { lo, hi });
        }
        let state = self.begin_fetch()?;

        Ok(state
            .logs
            .range(lo..=hi)
            .flat_map(|(_, logs)| logs.iter())
            .filter(|log| addresses.contains(&log.contract_address))
            .filter(|log| log.signature().map(|s| topics.contains(&s)).unwrap_or(false))
            .cloned()
            .collect())
    }
}
