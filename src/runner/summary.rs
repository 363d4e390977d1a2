use std::fmt;

use crate::task::types::{TaskOutcome, TaskStatus};

/// Per-phase accumulator of completion counts.
///
/// Mutated only from the orchestrator's drain loop, one outcome at a time,
/// so `total` always equals the number of outcomes recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub timed_out: usize,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &TaskOutcome) {
        self.total += 1;
        match outcome.status {
            TaskStatus::Success => self.succeeded += 1,
            TaskStatus::Failure => self.failed += 1,
            TaskStatus::Skipped => self.skipped += 1,
            TaskStatus::TimedOut => self.timed_out += 1,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.succeeded + self.failed + self.skipped + self.timed_out
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tasks: {} succeeded, {} failed, {} skipped, {} timed out",
            self.total, self.succeeded, self.failed, self.skipped, self.timed_out
        )
    }
}
