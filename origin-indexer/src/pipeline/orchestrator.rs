//! Poll-loop orchestrator
//!
//! One `StreamPipeline` per stream, each driven by its own task. A cycle
//! walks Planning -> Fetching -> Extracting -> Committing -> Publishing and
//! lands in Idle; any fetch or commit failure lands in Backoff instead.

use super::backoff::BackoffPolicy;
use super::planner::{check_linkage, PlanOutcome, Planner, RecentBlocks, Rewind};
use super::status::{PipelineStatus, PollState, StatusReporter};
use crate::adapters::chain::fetch_window;
use crate::config::{PipelineConfig, StreamConfig};
use crate::core::{BlockWindow, ChainPort, IndexerError, IndexerResult, PersistencePort, StreamId};
use crate::domain::processors::EventExtractor;
use crate::services::{ListingEnricher, PublishReport, Publisher};
use alloy_primitives::Address;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of one pass of the state machine
#[derive(Debug)]
pub enum CycleOutcome {
    /// Nothing new beyond the confirmation depth
    Idle,
    /// A window was committed and handed to the publisher
    Processed {
        window: BlockWindow,
        records: usize,
        skipped: usize,
        publish: PublishReport,
    },
    /// Committed blocks were replaced; checkpoint moved back
    Rewound(Rewind),
    /// Shutdown requested before a new fetch
    Interrupted,
    Failed { state: PollState, error: IndexerError },
}

/// Parse the configured contract addresses of a stream
pub fn contract_addresses(stream: StreamId, config: &StreamConfig) -> IndexerResult<Vec<Address>> {
    config
        .contracts
        .iter()
        .map(|c| {
            c.parse::<Address>().map_err(|e| {
                IndexerError::Configuration(format!("invalid {} contract {}: {}", stream, c, e))
            })
        })
        .collect()
}

/// Single-writer state machine for one stream
pub struct StreamPipeline {
    stream: StreamId,
    chain: Arc<dyn ChainPort>,
    store: Arc<dyn PersistencePort>,
    publisher: Arc<Publisher>,
    extractor: EventExtractor,
    enricher: Option<ListingEnricher>,
    planner: Planner,
    recent: RecentBlocks,
    backoff: BackoffPolicy,
    poll_interval: Duration,
    initial_checkpoint: u64,
    consecutive_failures: u32,
    status: StatusReporter,
    shutdown: Option<watch::Receiver<bool>>,
}

type StepResult<T> = Result<T, (PollState, IndexerError)>;

impl StreamPipeline {
    pub fn new(
        extractor: EventExtractor,
        chain: Arc<dyn ChainPort>,
        store: Arc<dyn PersistencePort>,
        publisher: Arc<Publisher>,
        config: &PipelineConfig,
    ) -> Self {
        let stream = extractor.stream();
        Self {
            stream,
            chain,
            store,
            publisher,
            extractor,
            enricher: None,
            planner: Planner::new(config.confirmation_depth, config.max_batch_blocks),
            recent: RecentBlocks::new(config.reorg_window),
            backoff: BackoffPolicy::new(
                Duration::from_millis(config.backoff_initial_ms),
                Duration::from_secs(config.backoff_max_secs),
            ),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            // The cursor sits one below the first block to process
            initial_checkpoint: config.start_block.saturating_sub(1),
            consecutive_failures: 0,
            status: StatusReporter::new(stream),
            shutdown: None,
        }
    }

    /// Resolve listing metadata for every window before it is committed
    pub fn with_enricher(mut self, enricher: ListingEnricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Live status feed
    pub fn status(&self) -> watch::Receiver<PipelineStatus> {
        self.status.subscribe()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Stop before the next fetch once `shutdown` flips to true
    pub fn watch_shutdown(&mut self, shutdown: watch::Receiver<bool>) {
        self.shutdown = Some(shutdown);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Run one full pass of the state machine
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let cycle_id = Uuid::new_v4();
        debug!(stream = %self.stream, %cycle_id, "Cycle started");

        match self.cycle(cycle_id).await {
            // Stopped at a safe boundary: not a success, not a failure
            Ok(CycleOutcome::Interrupted) => {
                self.status.set_state(PollState::Idle);
                CycleOutcome::Interrupted
            }
            Ok(outcome) => {
                self.consecutive_failures = 0;
                let rewind = match &outcome {
                    CycleOutcome::Rewound(rewind) => Some(*rewind),
                    _ => None,
                };
                self.status.update(|status| {
                    let now = Utc::now();
                    status.state = PollState::Idle;
                    status.consecutive_failures = 0;
                    status.last_error = None;
                    status.last_success_at = Some(now);
                    if let Some(rewind) = rewind {
                        status.rewinds += 1;
                        status.last_rewind = Some(rewind);
                        status.last_rewind_at = Some(now);
                    }
                });
                outcome
            }
            Err((state, error)) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                let failures = self.consecutive_failures;
                warn!(
                    stream = %self.stream,
                    %cycle_id,
                    state = %state,
                    consecutive_failures = failures,
                    "Cycle failed: {}", error
                );
                let message = error.to_string();
                self.status.update(|status| {
                    status.state = PollState::Backoff;
                    status.consecutive_failures = failures;
                    status.last_error = Some(message);
                });
                CycleOutcome::Failed { state, error }
            }
        }
    }

    async fn cycle(&mut self, cycle_id: Uuid) -> StepResult<CycleOutcome> {
        let stream = self.stream;

        self.status.set_state(PollState::Planning);
        let checkpoint = self
            .store
            .ensure_checkpoint(stream, self.initial_checkpoint)
            .await
            .map_err(|e| (PollState::Planning, e))?
            .last_processed_height;
        self.status.update(|status| status.checkpoint = Some(checkpoint));

        // An administrative reset may have moved the checkpoint below what we track
        self.recent.truncate_above(checkpoint);

        if let Some(rewind) = self
            .planner
            .check_reorg(self.chain.as_ref(), &self.recent)
            .await
            .map_err(|e| (PollState::Planning, e))?
        {
            return self.rewind(rewind, checkpoint, cycle_id).await;
        }

        let window = match self.planner.plan(self.chain.as_ref(), checkpoint).await {
            PlanOutcome::Window(window) => window,
            PlanOutcome::Idle => {
                debug!(stream = %stream, %cycle_id, checkpoint, "Nothing to process");
                return Ok(CycleOutcome::Idle);
            }
            PlanOutcome::RetryLater => {
                return Err((
                    PollState::Planning,
                    IndexerError::TransientFetch("chain head unavailable".to_string()),
                ));
            }
        };

        if self.shutdown_requested() {
            return Ok(CycleOutcome::Interrupted);
        }

        self.status.set_state(PollState::Fetching);
        let blocks = fetch_window(
            self.chain.as_ref(),
            &self.extractor.contracts(),
            &self.extractor.signatures(),
            window,
        )
        .await
        .map_err(|e| (PollState::Fetching, e))?;

        // The chain may have reorganized after the reorg check
        if let Err(link) = check_linkage(&self.recent, &blocks) {
            warn!(
                stream = %stream,
                %cycle_id,
                window = %window,
                height = link.height(),
                "Fetched window does not chain onto committed blocks"
            );
            if let Some(rewind) = self
                .planner
                .check_reorg(self.chain.as_ref(), &self.recent)
                .await
                .map_err(|e| (PollState::Fetching, e))?
            {
                return self.rewind(rewind, checkpoint, cycle_id).await;
            }
            return Err((
                PollState::Fetching,
                IndexerError::TransientFetch(format!(
                    "chain moved while fetching {} (broken link at {})",
                    window,
                    link.height()
                )),
            ));
        }

        self.status.set_state(PollState::Extracting);
        let mut extraction = self.extractor.extract_window(&blocks);
        if let Some(enricher) = &self.enricher {
            enricher.enrich(&mut extraction.records).await;
        }
        let records = extraction.records.len();
        let skipped = extraction.skipped.len();

        self.status.set_state(PollState::Committing);
        self.store
            .commit(stream, window.hi, &extraction.records, None)
            .await
            .map_err(|e| (PollState::Committing, e))?;
        self.recent.record_window(&blocks);
        self.status.update(|status| {
            status.checkpoint = Some(window.hi);
            status.last_window = Some(window);
            status.records_committed += records as u64;
            status.records_skipped += skipped as u64;
        });

        self.status.set_state(PollState::Publishing);
        let publish = self
            .publisher
            .publish_all(stream, window, extraction.records)
            .await;
        let dead_lettered = publish.dead_lettered.len() as u64;
        self.status
            .update(|status| status.batches_dead_lettered += dead_lettered);

        info!(
            stream = %stream,
            %cycle_id,
            window = %window,
            records,
            skipped,
            delivered = publish.delivered_rows,
            dead_lettered,
            "Window processed"
        );

        Ok(CycleOutcome::Processed {
            window,
            records,
            skipped,
            publish,
        })
    }

    async fn rewind(&mut self, rewind: Rewind, checkpoint: u64, cycle_id: Uuid) -> StepResult<CycleOutcome> {
        let target = rewind.fork_point.min(checkpoint);

        self.status.set_state(PollState::Committing);
        self.store
            .commit(self.stream, target, &[], Some(target))
            .await
            .map_err(|e| (PollState::Committing, e))?;
        self.recent.truncate_above(target);
        self.status.update(|status| status.checkpoint = Some(target));

        warn!(
            stream = %self.stream,
            %cycle_id,
            from = checkpoint,
            to = target,
            "Rewound checkpoint after reorg"
        );
        // Streaming inserts cannot be deleted, so rows from the replaced
        // branch stay in the warehouse
        warn!(
            stream = %self.stream,
            %cycle_id,
            lo = target.saturating_add(1),
            hi = rewind.replaced_to,
            "Warehouse rows in rewound range may belong to the replaced branch"
        );
        Ok(CycleOutcome::Rewound(Rewind {
            fork_point: target,
            replaced_to: rewind.replaced_to,
        }))
    }

    /// How long to wait before the next cycle
    pub fn next_delay(&self, outcome: &CycleOutcome) -> Duration {
        match outcome {
            // Catching up: go straight on
            CycleOutcome::Processed { window, .. } if window.len() >= self.planner.max_batch() => Duration::ZERO,
            CycleOutcome::Processed { .. } | CycleOutcome::Idle => self.poll_interval,
            CycleOutcome::Rewound(_) | CycleOutcome::Interrupted => Duration::ZERO,
            CycleOutcome::Failed { .. } => self.backoff.delay_for(self.consecutive_failures),
        }
    }

    /// Drive cycles until `shutdown` flips to true or its sender goes away
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.watch_shutdown(shutdown.clone());
        info!(stream = %self.stream, "Stream pipeline started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = self.run_cycle().await;
            if matches!(outcome, CycleOutcome::Interrupted) {
                break;
            }

            let delay = self.next_delay(&outcome);
            if delay.is_zero() {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.status.set_state(PollState::Idle);
        info!(stream = %self.stream, "Stream pipeline stopped");
    }
}
