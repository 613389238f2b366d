//! Observable pipeline status

use super::planner::Rewind;
use crate::core::{BlockWindow, StreamId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;
use tracing::{error, info};

/// Poll-loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Planning,
    Fetching,
    Extracting,
    Committing,
    Publishing,
    Backoff,
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PollState::Idle => "idle",
            PollState::Planning => "planning",
            PollState::Fetching => "fetching",
            PollState::Extracting => "extracting",
            PollState::Committing => "committing",
            PollState::Publishing => "publishing",
            PollState::Backoff => "backoff",
        };
        f.write_str(name)
    }
}

/// Snapshot of one stream's pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub stream: StreamId,
    pub state: PollState,
    pub checkpoint: Option<u64>,
    pub last_window: Option<BlockWindow>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub records_committed: u64,
    pub records_skipped: u64,
    pub batches_dead_lettered: u64,
    pub rewinds: u64,
    /// Range whose warehouse rows may belong to a replaced branch
    pub last_rewind: Option<Rewind>,
    pub last_rewind_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineStatus {
    pub fn new(stream: StreamId) -> Self {
        Self {
            stream,
            state: PollState::Idle,
            checkpoint: None,
            last_window: None,
            consecutive_failures: 0,
            last_error: None,
            records_committed: 0,
            records_skipped: 0,
            batches_dead_lettered: 0,
            rewinds: 0,
            last_rewind: None,
            last_rewind_at: None,
            last_success_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Fetch and commit failures count; export failures only show up as dead letters
    pub fn is_healthy(&self, unhealthy_after_failures: u32) -> bool {
        self.consecutive_failures < unhealthy_after_failures
    }
}

/// Publishing side of a stream's status channel
#[derive(Debug)]
pub struct StatusReporter {
    sender: watch::Sender<PipelineStatus>,
}

impl StatusReporter {
    pub fn new(stream: StreamId) -> Self {
        let (sender, _) = watch::channel(PipelineStatus::new(stream));
        Self { sender }
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> PipelineStatus {
        self.sender.borrow().clone()
    }

    pub fn update<F>(&self, modify: F)
    where
        F: FnOnce(&mut PipelineStatus),
    {
        self.sender.send_modify(|status| {
            modify(status);
            status.updated_at = Utc::now();
        });
    }

    pub fn set_state(&self, state: PollState) {
        self.update(|status| status.state = state);
    }
}

/// Log health transitions of a stream until its pipeline goes away
pub async fn watch_health(mut status: watch::Receiver<PipelineStatus>, unhealthy_after_failures: u32) {
    let mut healthy = true;
    while status.changed().await.is_ok() {
        let snapshot = status.borrow().clone();
        let now_healthy = snapshot.is_healthy(unhealthy_after_failures);
        if now_healthy == healthy {
            continue;
        }
        if now_healthy {
            info!(stream = %snapshot.stream, "Stream recovered");
        } else {
            error!(
                stream = %snapshot.stream,
                consecutive_failures = snapshot.consecutive_failures,
                last_error = snapshot.last_error.as_deref().unwrap_or(""),
                "Stream unhealthy"
            );
        }
        healthy = now_healthy;
    }
}
