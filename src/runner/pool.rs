use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use super::progress::{Phase, ProgressEvent};
use crate::task::types::TaskOutcome;
use crate::task::Task;

/// Executes one batch of tasks with bounded parallelism.
///
/// At most `max_concurrency` tasks run at once; the rest wait and are
/// admitted in submission order as slots free. One-shot: `submit_all`
/// consumes the batch.
pub struct WorkerPool {
    max_concurrency: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(max_concurrency: usize, cancel: CancellationToken) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            cancel,
        }
    }

    /// Request cooperative cancellation of the batch.
    ///
    /// Not-yet-started tasks report `Skipped`; in-flight tasks drain to
    /// their own outcome. Processes are only ever killed by the invoker's
    /// timeout path, never by the pool.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Submit every task for execution.
    ///
    /// Returns a receiver yielding exactly one `TaskOutcome` per task, in
    /// completion order. Lifecycle events go out through `events` as they
    /// happen; a task's slot is freed the moment it finishes, before its
    /// outcome is delivered.
    pub fn submit_all(
        &self,
        tasks: Vec<Task>,
        phase: Phase,
        events: mpsc::Sender<ProgressEvent>,
    ) -> mpsc::Receiver<TaskOutcome> {
        let (tx, rx) = mpsc::channel(tasks.len().max(1));
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let cancel = self.cancel.clone();

        tracing::debug!(
            phase = phase.label(),
            tasks = tasks.len(),
            max_concurrency = self.max_concurrency,
            "Submitting batch"
        );

        tokio::spawn(async move {
            for task in tasks {
                // Admission gate. Once the batch is cancelled the gate is
                // pointless: tasks return Skipped without spawning anything,
                // so stop waiting for slots and let them drain.
                let permit = if cancel.is_cancelled() {
                    None
                } else {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        permit = semaphore.clone().acquire_owned() => permit.ok(),
                    }
                };

                let tx = tx.clone();
                let events = events.clone();
                tokio::spawn(async move {
                    let target = task.target().clone();
                    let _ = events
                        .send(ProgressEvent::Started { phase, target })
                        .await;

                    let outcome = task.run().await;
                    drop(permit);

                    let _ = events
                        .send(ProgressEvent::Finished {
                            phase,
                            outcome: outcome.clone(),
                        })
                        .await;
                    let _ = tx.send(outcome).await;
                });
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::process::CommandSpec;
    use crate::task::types::{RepositoryTarget, TaskStatus};
    use crate::task::OperationKind;

    async fn drain(mut rx: mpsc::Receiver<TaskOutcome>, expected: usize) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::with_capacity(expected);
        while outcomes.len() < expected {
            outcomes.push(rx.recv().await.expect("pool dropped an outcome"));
        }
        outcomes
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let tmp = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();

        // Each subprocess records its own start and end instants; the
        // maximum interval overlap is the number of subprocesses that
        // were ever in flight at once.
        let tasks: Vec<Task> = (0..6)
            .map(|i| {
                let stamp = tmp.path().join(format!("t{i}"));
                Task::new(
                    RepositoryTarget::from_path(tmp.path()),
                    OperationKind::DiscoverPull,
                    CommandSpec::shell(
                        "date +%s%N > \"$1.start\"; sleep 0.2; date +%s%N > \"$1.end\"; printf '[]'",
                        &[stamp.to_str().unwrap()],
                    ),
                    Duration::from_secs(5),
                    cancel.clone(),
                )
            })
            .collect();

        let pool = WorkerPool::new(2, cancel);
        let (events_tx, _events_rx) = super::super::progress::channel(12);
        let rx = pool.submit_all(tasks, Phase::Discover, events_tx);
        let outcomes = drain(rx, 6).await;
        assert!(outcomes.iter().all(|o| o.status == TaskStatus::Success));

        let read_stamp = |name: String| -> u128 {
            std::fs::read_to_string(tmp.path().join(name))
                .unwrap()
                .trim()
                .parse()
                .unwrap()
        };
        let mut events: Vec<(u128, i32)> = Vec::new();
        for i in 0..6 {
            events.push((read_stamp(format!("t{i}.start")), 1));
            events.push((read_stamp(format!("t{i}.end")), -1));
        }
        events.sort();

        let mut in_flight = 0;
        let mut max_in_flight = 0;
        for (_, delta) in events {
            in_flight += delta;
            max_in_flight = max_in_flight.max(in_flight);
        }
        assert!(
            max_in_flight <= 2,
            "{max_in_flight} subprocesses were in flight at once"
        );
    }

    #[tokio::test]
    async fn test_cancel_before_start_skips_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();

        let markers: Vec<_> = (0..10).map(|i| tmp.path().join(format!("m{i}"))).collect();
        let tasks: Vec<Task> = markers
            .iter()
            .map(|m| {
                Task::new(
                    RepositoryTarget::from_path(tmp.path()),
                    OperationKind::Pull,
                    CommandSpec::shell("touch \"$1\"", &[m.to_str().unwrap()]),
                    Duration::from_secs(5),
                    cancel.clone(),
                )
            })
            .collect();

        let pool = WorkerPool::new(4, cancel);
        pool.cancel();

        let (events_tx, _events_rx) = super::super::progress::channel(20);
        let rx = pool.submit_all(tasks, Phase::Operate, events_tx);
        let outcomes = drain(rx, 10).await;

        assert!(outcomes.iter().all(|o| o.status == TaskStatus::Skipped));
        assert!(
            markers.iter().all(|m| !m.exists()),
            "no subprocess may be spawned for a cancelled batch"
        );
    }

    #[tokio::test]
    async fn test_every_task_posts_started_and_finished() {
        let tmp = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let tasks: Vec<Task> = (0..3)
            .map(|_| {
                Task::new(
                    RepositoryTarget::from_path(tmp.path()),
                    OperationKind::DiscoverPull,
                    CommandSpec::shell("printf '[]'", &[]),
                    Duration::from_secs(5),
                    cancel.clone(),
                )
            })
            .collect();

        let pool = WorkerPool::new(2, cancel);
        let (events_tx, mut events_rx) = super::super::progress::channel(6);
        let rx = pool.submit_all(tasks, Phase::Discover, events_tx);
        let _ = drain(rx, 3).await;

        let mut started = 0;
        let mut finished = 0;
        while let Ok(event) = events_rx.try_recv() {
            match event {
                ProgressEvent::Started { .. } => started += 1,
                ProgressEvent::Finished { .. } => finished += 1,
            }
        }
        assert_eq!(started, 3);
        assert_eq!(finished, 3);
    }
}
