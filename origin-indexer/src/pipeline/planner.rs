//! Block window planning and reorg detection

use crate::core::{BlockWindow, ChainPort, IndexerResult, RawBlock};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

/// What the next cycle should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutcome {
    /// Process this inclusive range
    Window(BlockWindow),
    /// Nothing confirmed beyond the checkpoint yet
    Idle,
    /// Head unavailable; back off before planning again
    RetryLater,
}

/// Compute `[C+1, min(H-D, C+max_batch)]`, or `Idle` when `H-D <= C`
pub fn plan_window(checkpoint: u64, head: u64, confirmation_depth: u64, max_batch: u64) -> PlanOutcome {
    let safe_head = head.saturating_sub(confirmation_depth);
    if safe_head <= checkpoint {
        return PlanOutcome::Idle;
    }

    let lo = checkpoint + 1;
    let hi = safe_head.min(checkpoint.saturating_add(max_batch.max(1)));
    PlanOutcome::Window(BlockWindow::new(lo, hi))
}

/// Rewind signal: the chain no longer agrees with blocks we committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewind {
    /// Highest committed height still canonical
    pub fork_point: u64,
    /// Newest committed height that was replaced
    pub replaced_to: u64,
}

/// Where a fetched window stops chaining onto what we already hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkBreak {
    /// The first block's parent is not the newest committed block
    Tip { height: u64 },
    /// Two adjacent fetched blocks do not link up
    Inside { height: u64 },
}

impl LinkBreak {
    pub fn height(&self) -> u64 {
        match self {
            LinkBreak::Tip { height } | LinkBreak::Inside { height } => *height,
        }
    }
}

/// Verify the parent-hash chain of a freshly fetched window, both against
/// the newest committed block and between its own blocks.
pub fn check_linkage(recent: &RecentBlocks, blocks: &[RawBlock]) -> Result<(), LinkBreak> {
    if let (Some((height, hash)), Some(first)) = (recent.newest(), blocks.first()) {
        if first.height == height + 1 && first.parent_hash != hash {
            return Err(LinkBreak::Tip { height: first.height });
        }
    }

    match blocks
        .windows(2)
        .find(|pair| pair[1].height == pair[0].height + 1 && pair[1].parent_hash != pair[0].hash)
    {
        Some(pair) => Err(LinkBreak::Inside { height: pair[1].height }),
        None => Ok(()),
    }
}

/// Hashes of recently committed blocks, oldest first
#[derive(Debug, Clone)]
pub struct RecentBlocks {
    capacity: usize,
    blocks: VecDeque<(u64, B256)>,
}

impl RecentBlocks {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            blocks: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Remember a committed block, forgetting anything at or above its height
    pub fn record(&mut self, height: u64, hash: B256) {
        self.truncate_above(height.saturating_sub(1));
        if height == 0 {
            self.blocks.clear();
        }
        self.blocks.push_back((height, hash));
        while self.blocks.len() > self.capacity {
            self.blocks.pop_front();
        }
    }

    pub fn record_window(&mut self, blocks: &[RawBlock]) {
        for block in blocks {
            self.record(block.height, block.hash);
        }
    }

    /// Drop every tracked block above `height`
    pub fn truncate_above(&mut self, height: u64) {
        while matches!(self.blocks.back(), Some((h, _)) if *h > height) {
            self.blocks.pop_back();
        }
    }

    pub fn newest(&self) -> Option<(u64, B256)> {
        self.blocks.back().copied()
    }

    pub fn oldest(&self) -> Option<(u64, B256)> {
        self.blocks.front().copied()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Highest tracked height whose hash matches `canonical`, or one below
    /// the oldest tracked height when none do.
    pub fn find_fork_point(&self, canonical: &HashMap<u64, B256>) -> u64 {
        self.blocks
            .iter()
            .rev()
            .find(|(height, hash)| canonical.get(height) == Some(hash))
            .map(|(height, _)| *height)
            .unwrap_or_else(|| self.oldest().map(|(h, _)| h.saturating_sub(1)).unwrap_or(0))
    }
}

/// Block window planner
#[derive(Debug, Clone)]
pub struct Planner {
    confirmation_depth: u64,
    max_batch: u64,
}

impl Planner {
    pub fn new(confirmation_depth: u64, max_batch: u64) -> Self {
        Self {
            confirmation_depth,
            max_batch,
        }
    }

    pub fn max_batch(&self) -> u64 {
        self.max_batch
    }

    /// Plan the next window from the live head
    pub async fn plan(&self, chain: &dyn ChainPort, checkpoint: u64) -> PlanOutcome {
        match chain.head().await {
            Ok(head) => {
                let outcome = plan_window(checkpoint, head, self.confirmation_depth, self.max_batch);
                debug!(checkpoint, head, ?outcome, "Planned window");
                outcome
            }
            Err(e) => {
                warn!("Chain head unavailable: {}", e);
                PlanOutcome::RetryLater
            }
        }
    }

    /// Compare the newest committed hash with the canonical chain
    pub async fn check_reorg(&self, chain: &dyn ChainPort, recent: &RecentBlocks) -> IndexerResult<Option<Rewind>> {
        let (Some((newest_height, newest_hash)), Some((oldest_height, _))) = (recent.newest(), recent.oldest())
        else {
            return Ok(None);
        };

        let canonical = chain.block_range(newest_height, newest_height).await?;
        if canonical.first().map(|b| b.hash) == Some(newest_hash) {
            return Ok(None);
        }

        let span = chain.block_range(oldest_height, newest_height).await?;
        let canonical: HashMap<u64, B256> = span.iter().map(|b| (b.height, b.hash)).collect();
        let fork_point = recent.find_fork_point(&canonical);

        warn!(
            fork_point,
            replaced_to = newest_height,
            "Chain reorganization detected"
        );
        Ok(Some(Rewind {
            fork_point,
            replaced_to: newest_height,
        }))
    }
}
