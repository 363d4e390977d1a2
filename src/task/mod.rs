pub mod types;

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::parse;
use crate::process::{self, CommandSpec};

use types::{
    OperationStatus, ParsedResult, RepositoryTarget, TaskOutcome, TaskStatus,
};

pub use types::OperationKind;

/// How much stderr a failure outcome keeps.
const STDERR_SNIPPET_LEN: usize = 200;

/// One unit of work: exactly one target, one operation kind, one command.
///
/// `run` consumes the task, so exactly one outcome can ever be produced
/// from it.
pub struct Task {
    target: RepositoryTarget,
    kind: OperationKind,
    command: CommandSpec,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Task {
    pub fn new(
        target: RepositoryTarget,
        kind: OperationKind,
        command: CommandSpec,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            target,
            kind,
            command,
            timeout,
            cancel,
        }
    }

    pub fn target(&self) -> &RepositoryTarget {
        &self.target
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Execute the task and produce its one outcome.
    ///
    /// Every path through here reports: skipped when the batch was already
    /// cancelled, failed on a missing target or spawn/parse error, timed
    /// out when the invoker hit the deadline, success otherwise. A
    /// cancellation that arrives mid-flight forces the status to `Skipped`
    /// on the way out; the work product is ignored, not corrupted.
    pub async fn run(self) -> TaskOutcome {
        let (mut status, payload, error_detail, duration) = self.execute().await;

        if self.cancel.is_cancelled() {
            status = TaskStatus::Skipped;
        }

        if status == TaskStatus::Failure {
            tracing::warn!(
                repo = %self.target.name,
                kind = self.kind.label(),
                detail = error_detail.as_deref().unwrap_or(""),
                "Task failed"
            );
        }

        TaskOutcome {
            target: self.target,
            kind: self.kind,
            status,
            payload,
            error_detail,
            duration,
        }
    }

    async fn execute(
        &self,
    ) -> (TaskStatus, Option<ParsedResult>, Option<String>, Duration) {
        if self.cancel.is_cancelled() {
            return (
                TaskStatus::Skipped,
                None,
                Some("batch cancelled".to_string()),
                Duration::ZERO,
            );
        }

        // Cheap precondition before paying process-spawn cost.
        if !self.target.path.exists() {
            return (
                TaskStatus::Failure,
                None,
                Some("target not found".to_string()),
                Duration::ZERO,
            );
        }

        tracing::debug!(
            repo = %self.target.name,
            kind = self.kind.label(),
            "Running task"
        );

        let started = Instant::now();
        let proc = match process::invoke(&self.command, self.timeout).await {
            Ok(proc) => proc,
            Err(e) => {
                return (
                    TaskStatus::Failure,
                    None,
                    Some(e.to_string()),
                    started.elapsed(),
                )
            }
        };

        if proc.timed_out {
            return (
                TaskStatus::TimedOut,
                None,
                Some("operation took too long".to_string()),
                self.timeout,
            );
        }

        if !proc.success() {
            let detail = if proc.stderr.trim().is_empty() {
                format!("exit code {:?}", proc.exit_code)
            } else {
                truncate(proc.stderr.trim(), STDERR_SNIPPET_LEN)
            };
            return (TaskStatus::Failure, None, Some(detail), started.elapsed());
        }

        let (status, payload, error_detail) = self.interpret(proc.stdout.trim());
        (status, payload, error_detail, started.elapsed())
    }

    fn interpret(&self, stdout: &str) -> (TaskStatus, Option<ParsedResult>, Option<String>) {
        if self.kind.is_discovery() {
            match parse::parse_discovery(stdout) {
                Ok(repos) => (
                    TaskStatus::Success,
                    Some(ParsedResult::Discovered(repos)),
                    None,
                ),
                Err(e) => (TaskStatus::Failure, None, Some(e.to_string())),
            }
        } else {
            match parse::parse_operation(stdout) {
                Ok(report) if report.status == OperationStatus::Success => {
                    (TaskStatus::Success, Some(ParsedResult::Operated(report)), None)
                }
                Ok(report) => {
                    let detail = if report.detail.is_empty() {
                        report.status.label().to_string()
                    } else {
                        report.detail.clone()
                    };
                    (
                        TaskStatus::Failure,
                        Some(ParsedResult::Operated(report)),
                        Some(detail),
                    )
                }
                Err(e) => (TaskStatus::Failure, None, Some(e.to_string())),
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
