//! Chain adapters

pub mod mock;
pub mod rpc;

pub use mock::MockChain;
pub use rpc::JsonRpcChainClient;

use crate::core::{sort_logs, BlockWindow, ChainPort, IndexerError, IndexerResult, RawBlock, RawLog};
use alloy_primitives::{Address, B256};
use std::collections::BTreeMap;

/// Fetch the headers of `window` and attach the matching logs to them
pub async fn fetch_window(
    chain: &dyn ChainPort,
    addresses: &[Address],
    topics: &[B256],
    window: BlockWindow,
) -> IndexerResult<Vec<RawBlock>> {
    let blocks = chain.block_range(window.lo, window.hi).await?;
    let logs = chain.logs(addresses, topics, window.lo, window.hi).await?;
    assemble_blocks(window, blocks, logs)
}

/// Attach logs to their headers.
///
/// A log whose block hash disagrees with the header means the chain moved
/// between the two requests; the window must be fetched again.
pub fn assemble_blocks(
    window: BlockWindow,
    blocks: Vec<RawBlock>,
    logs: Vec<RawLog>,
) -> IndexerResult<Vec<RawBlock>> {
    let mut by_height: BTreeMap<u64, RawBlock> = BTreeMap::new();
    for block in blocks {
        if !window.contains(block.height) {
            return Err(IndexerError::TransientFetch(format!(
                "block {} outside requested window {}",
                block.height, window
            )));
        }
        by_height.insert(block.height, block);
    }
    if by_height.len() as u64 != window.len() {
        return Err(IndexerError::TransientFetch(format!(
            "expected {} headers for {}, got {}",
            window.len(),
            window,
            by_height.len()
        )));
    }

    for log in logs {
        let block = by_height.get_mut(&log.block_height).ok_or_else(|| {
            IndexerError::TransientFetch(format!(
                "log at block {} outside requested window {}",
                log.block_height, window
            ))
        })?;
        if block.hash != log.block_hash {
            return Err(IndexerError::TransientFetch(format!(
                "log references block {} hash {} but header has {}",
                log.block_height, log.block_hash, block.hash
            )));
        }
        block.logs.push(log);
    }

    let mut blocks: Vec<RawBlock> = by_height.into_values().collect();
    for block in &mut blocks {
        sort_logs(&mut block.logs);
    }
    Ok(blocks)
}
