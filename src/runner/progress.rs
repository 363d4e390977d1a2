use tokio::sync::mpsc;

use crate::task::types::{RepositoryTarget, TaskOutcome, TaskStatus};

/// Which half of the batch an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discover,
    Operate,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Discover => "discover",
            Phase::Operate => "operate",
        }
    }
}

/// Lifecycle events tasks post while a batch runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started {
        phase: Phase,
        target: RepositoryTarget,
    },
    Finished {
        phase: Phase,
        outcome: TaskOutcome,
    },
}

/// Collaborator interface for rendering progress (UI, logs, tests).
/// The engine makes no assumption about how, or whether, it is rendered.
pub trait ProgressSink: Send + Sync {
    fn post(&self, event: &ProgressEvent);
}

/// Sink that reports progress through tracing.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn post(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { phase, target } => {
                tracing::debug!(phase = phase.label(), repo = %target.name, "Task started");
            }
            ProgressEvent::Finished { phase, outcome } => match outcome.status {
                TaskStatus::Success => tracing::info!(
                    phase = phase.label(),
                    repo = %outcome.target.name,
                    duration_ms = outcome.duration.as_millis() as u64,
                    "Task succeeded"
                ),
                TaskStatus::Skipped => tracing::debug!(
                    phase = phase.label(),
                    repo = %outcome.target.name,
                    "Task skipped"
                ),
                TaskStatus::Failure | TaskStatus::TimedOut => tracing::warn!(
                    phase = phase.label(),
                    repo = %outcome.target.name,
                    detail = outcome.error_detail.as_deref().unwrap_or(""),
                    "Task did not complete"
                ),
            },
        }
    }
}

/// Sink that drops everything, for callers that only want the report.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn post(&self, _event: &ProgressEvent) {}
}

/// The bounded event channel for one batch: any number of concurrently
/// finishing tasks post, exactly one consumer drains in post order.
pub fn channel(capacity: usize) -> (mpsc::Sender<ProgressEvent>, mpsc::Receiver<ProgressEvent>) {
    mpsc::channel(capacity.max(1))
}
