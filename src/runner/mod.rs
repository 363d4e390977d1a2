pub mod pool;
pub mod progress;
pub mod summary;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::gitcmd::CommandFactory;
use crate::task::types::{
    DiscoveredRepo, ParsedResult, RepositoryTarget, TaskOutcome, TaskStatus,
};
use crate::task::{OperationKind, Task};

use pool::WorkerPool;
use progress::{Phase, ProgressEvent, ProgressSink};
use summary::BatchSummary;

/// Which git operation a batch performs after discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    Pull,
    Push,
}

impl BatchMode {
    fn discovery_kind(self) -> OperationKind {
        match self {
            BatchMode::Pull => OperationKind::DiscoverPull,
            BatchMode::Push => OperationKind::DiscoverPush,
        }
    }

    fn operation_kind(self) -> OperationKind {
        match self {
            BatchMode::Pull => OperationKind::Pull,
            BatchMode::Push => OperationKind::Push,
        }
    }
}

/// Where a batch currently is in its two-phase lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Discovering,
    AwaitingOperationDecision,
    Operating,
    Completed,
    Cancelled,
}

/// Everything one `pull` or `push` batch works with, passed in explicitly
/// at batch start.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub roots: Vec<PathBuf>,
    pub excluded_repos: Vec<String>,
    pub discovery_concurrency: usize,
    pub operation_concurrency: usize,
    pub discovery_timeout: Duration,
    pub operation_timeout: Duration,
}

/// Everything a finished batch produced.
#[derive(Debug)]
pub struct BatchReport {
    pub state: BatchState,
    pub discovery: BatchSummary,
    pub operation: BatchSummary,
    pub candidates: Vec<DiscoveredRepo>,
    pub outcomes: Vec<TaskOutcome>,
}

impl BatchReport {
    /// The distinguished nothing-to-scan result.
    pub fn empty() -> Self {
        Self {
            state: BatchState::Completed,
            discovery: BatchSummary::default(),
            operation: BatchSummary::default(),
            candidates: Vec::new(),
            outcomes: Vec::new(),
        }
    }
}

/// Owns the discovery-then-operate workflow for one batch: builds the
/// tasks, consumes the progress channel, aggregates counts exactly once,
/// and exposes cancellation to the caller.
pub struct Orchestrator {
    config: BatchConfig,
    factory: Arc<dyn CommandFactory>,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    state: BatchState,
}

impl Orchestrator {
    pub fn new(
        config: BatchConfig,
        factory: Arc<dyn CommandFactory>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config,
            factory,
            sink,
            cancel: CancellationToken::new(),
            state: BatchState::Idle,
        }
    }

    /// Token cancelling the whole batch. Cancellation never discards
    /// outcomes: in-flight tasks are still drained, their statuses just
    /// turn `Skipped` going forward.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Run one full discovery-then-operate batch.
    pub async fn run(&mut self, mode: BatchMode) -> BatchReport {
        if self.config.roots.is_empty() {
            tracing::warn!("No search roots configured, nothing to scan");
            self.state = BatchState::Completed;
            return BatchReport::empty();
        }

        // Discovery: one task per search root. A root that fails or times
        // out is recorded, not fatal; partial results are used as-is.
        self.state = BatchState::Discovering;
        let kind = mode.discovery_kind();
        let tasks: Vec<Task> = self
            .config
            .roots
            .iter()
            .map(|root| {
                let target = RepositoryTarget::from_path(root);
                let command = self.factory.command(kind, &target);
                Task::new(
                    target,
                    kind,
                    command,
                    self.config.discovery_timeout,
                    self.cancel.clone(),
                )
            })
            .collect();

        let (discovery, mut outcomes) = self
            .run_phase(Phase::Discover, tasks, self.config.discovery_concurrency)
            .await;

        self.state = BatchState::AwaitingOperationDecision;
        let candidates = self.merge_candidates(&outcomes);
        tracing::info!(
            roots = self.config.roots.len(),
            candidates = candidates.len(),
            "Discovery complete"
        );

        if self.cancel.is_cancelled() {
            self.state = BatchState::Cancelled;
            return BatchReport {
                state: self.state,
                discovery,
                operation: BatchSummary::default(),
                candidates,
                outcomes,
            };
        }

        // Operation: one task per qualifying repository.
        self.state = BatchState::Operating;
        let kind = mode.operation_kind();
        let tasks: Vec<Task> = candidates
            .iter()
            .map(|repo| {
                let target = RepositoryTarget::new(repo.name.clone(), repo.path.clone());
                let command = self.factory.command(kind, &target);
                Task::new(
                    target,
                    kind,
                    command,
                    self.config.operation_timeout,
                    self.cancel.clone(),
                )
            })
            .collect();

        let (operation, op_outcomes) = self
            .run_phase(Phase::Operate, tasks, self.config.operation_concurrency)
            .await;
        outcomes.extend(op_outcomes);

        self.state = if self.cancel.is_cancelled() {
            BatchState::Cancelled
        } else {
            BatchState::Completed
        };
        tracing::info!(summary = %operation, "Batch complete");

        BatchReport {
            state: self.state,
            discovery,
            operation,
            candidates,
            outcomes,
        }
    }

    /// Run one phase and drain it to completion.
    ///
    /// Completion is gated on a count match (outcomes received == tasks
    /// submitted), never on a timer, so slow stragglers are always waited
    /// for. This drain loop is the only writer of the summary.
    async fn run_phase(
        &self,
        phase: Phase,
        tasks: Vec<Task>,
        concurrency: usize,
    ) -> (BatchSummary, Vec<TaskOutcome>) {
        let submitted = tasks.len();
        let (events_tx, mut events_rx) = progress::channel(submitted * 2);
        let pool = WorkerPool::new(concurrency, self.cancel.clone());

        // The pool's outcome stream mirrors the Finished events; holding the
        // receiver open keeps task sends from erroring while we aggregate
        // from the progress channel.
        let _outcomes_rx = pool.submit_all(tasks, phase, events_tx);

        let mut summary = BatchSummary::default();
        let mut outcomes = Vec::with_capacity(submitted);

        while summary.total < submitted {
            match events_rx.recv().await {
                Some(event) => {
                    self.sink.post(&event);
                    if let ProgressEvent::Finished { outcome, .. } = event {
                        summary.record(&outcome);
                        outcomes.push(outcome);
                    }
                }
                None => break,
            }
        }

        (summary, outcomes)
    }

    /// Merge all successful discovery payloads into the candidate list,
    /// dropping externally-excluded repositories.
    fn merge_candidates(&self, outcomes: &[TaskOutcome]) -> Vec<DiscoveredRepo> {
        let mut candidates = Vec::new();
        for outcome in outcomes {
            if outcome.status != TaskStatus::Success {
                continue;
            }
            if let Some(ParsedResult::Discovered(repos)) = &outcome.payload {
                candidates.extend(repos.iter().cloned());
            }
        }

        candidates.retain(|repo| {
            let excluded = self.config.excluded_repos.iter().any(|e| e == &repo.name);
            if excluded {
                tracing::info!(repo = %repo.name, "Excluded from operation phase");
            }
            !excluded
        });

        candidates
    }
}
