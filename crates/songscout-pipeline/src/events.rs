// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{DetectedSong, RunStage};

/// Progress notifications emitted while a run executes.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageStarted {
        stage: RunStage,
    },
    FragmentProcessed {
        index: usize,
        completed: usize,
        total: usize,
    },
    MatchFound {
        song: DetectedSong,
    },
    FragmentFailed {
        index: usize,
        error: String,
    },
    RunFinished {
        status: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub run_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub event: PipelineEvent,
}

impl ProgressEvent {
    pub fn new(run_id: Uuid, event: PipelineEvent) -> Self {
        Self {
            run_id,
            occurred_at: Utc::now(),
            event,
        }
    }
}

/// Observer of pipeline progress.
///
/// Called from recognition workers concurrently; implementations must not block.
pub trait ProgressReporter: Send + Sync + 'static {
    fn report(&self, event: ProgressEvent);
}

/// Writes progress to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: ProgressEvent) {
        let run_id = event.run_id;
        match event.event {
            PipelineEvent::StageStarted { stage } => {
                info!(target: "pipeline", %run_id, %stage, "stage started")
            }
            PipelineEvent::FragmentProcessed {
                index,
                completed,
                total,
            } => debug!(target: "pipeline", %run_id, fragment = index, completed, total, "fragment processed"),
            PipelineEvent::MatchFound { song } => info!(
                target: "pipeline",
                %run_id,
                title = %song.title,
                subtitle = %song.subtitle,
                timestamp = %song.timestamp,
                "match found"
            ),
            PipelineEvent::FragmentFailed { index, error } => {
                warn!(target: "pipeline", %run_id, fragment = index, %error, "fragment recognition failed")
            }
            PipelineEvent::RunFinished { status } => {
                info!(target: "pipeline", %run_id, %status, "run finished")
            }
        }
    }
}

/// Forwards progress to a channel. Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    sender: UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    pub fn new(sender: UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}

/// Stores progress events in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReporter {
    inner: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl InMemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve and clear all captured events.
    pub fn drain(&self) -> Vec<ProgressEvent> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ProgressEvent>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProgressReporter for InMemoryReporter {
    fn report(&self, event: ProgressEvent) {
        self.lock().push(event);
    }
}
