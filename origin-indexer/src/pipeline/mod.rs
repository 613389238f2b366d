//! Ingestion pipeline - planning, the poll loop and its observable status

pub mod backoff;
pub mod orchestrator;
pub mod planner;
pub mod status;

pub use backoff::BackoffPolicy;
pub use orchestrator::{contract_addresses, CycleOutcome, StreamPipeline};
pub use planner::{check_linkage, plan_window, LinkBreak, PlanOutcome, Planner, RecentBlocks, Rewind};
pub use status::{watch_health, PipelineStatus, PollState, StatusReporter};
