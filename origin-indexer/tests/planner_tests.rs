//! Block window planning and reorg detection tests

use origin_indexer::adapters::MockChain;
use origin_indexer::core::{BlockWindow, ChainPort};
use origin_indexer::pipeline::{plan_window, PlanOutcome, Planner, RecentBlocks};

#[test]
fn test_concrete_window() {
    assert_eq!(
        plan_window(100, 110, 3, 50),
        PlanOutcome::Window(BlockWindow::new(101, 107))
    );
}

#[test]
fn test_window_bounds_hold_across_inputs() {
    for checkpoint in [0u64, 1, 99, 100, 10_014_454] {
        for head in [0u64, 3, 50, 104, 160, 10_014_500, 20_000_000] {
            for depth in [0u64, 3, 4, 12] {
                for max_batch in [1u64, 50, 100] {
                    let outcome = plan_window(checkpoint, head, depth, max_batch);
                    let safe_head = head.saturating_sub(depth);

                    if safe_head > checkpoint {
                        let PlanOutcome::Window(window) = outcome else {
                            panic!("expected window for C={} H={} D={}", checkpoint, head, depth);
                        };
                        assert_eq!(window.lo, checkpoint + 1);
                        assert!(window.hi <= safe_head);
                        assert!(window.hi <= checkpoint + max_batch);
                        assert!(!window.is_empty());
                    } else {
                        assert_eq!(outcome, PlanOutcome::Idle);
                    }
                }
            }
        }
    }
}

#[tokio::test]
async fn test_head_failure_means_retry_later() {
    let chain = MockChain::new(110);
    let planner = Planner::new(3, 50);

    chain.fail_head(1);
    assert_eq!(planner.plan(&chain, 100).await, PlanOutcome::RetryLater);
    assert_eq!(
        planner.plan(&chain, 100).await,
        PlanOutcome::Window(BlockWindow::new(101, 107))
    );
}

#[tokio::test]
async fn test_no_reorg_when_hashes_match() -> anyhow::Result<()> {
    let chain = MockChain::new(120);
    let planner = Planner::new(3, 50);

    let mut recent = RecentBlocks::new(16);
    recent.record_window(&chain.block_range(101, 110).await?);

    assert_eq!(planner.check_reorg(&chain, &recent).await?, None);
    Ok(())
}

#[tokio::test]
async fn test_reorg_rewinds_to_last_matching_height() -> anyhow::Result<()> {
    let chain = MockChain::new(120);
    let planner = Planner::new(3, 50);

    let mut recent = RecentBlocks::new(16);
    recent.record_window(&chain.block_range(101, 110).await?);

    chain.reorg_from(106);
    let rewind = planner.check_reorg(&chain, &recent).await?.expect("reorg");
    assert_eq!(rewind.fork_point, 105);
    assert_eq!(rewind.replaced_to, 110);
    Ok(())
}

#[tokio::test]
async fn test_reorg_deeper_than_window() -> anyhow::Result<()> {
    let chain = MockChain::new(120);
    let planner = Planner::new(3, 50);

    let mut recent = RecentBlocks::new(4);
    recent.record_window(&chain.block_range(101, 110).await?);

    chain.reorg_from(90);
    let rewind = planner.check_reorg(&chain, &recent).await?.expect("reorg");
    // Only 107..110 are tracked, so the rewind lands below the oldest one
    assert_eq!(rewind.fork_point, 106);
    Ok(())
}
