use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// A filesystem location to scan or operate on. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryTarget {
    pub name: String,
    pub path: PathBuf,
}

impl RepositoryTarget {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            path: path.to_path_buf(),
        }
    }
}

/// Which external command a task runs and which result shape it expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Scan a root for repositories behind their upstream.
    DiscoverPull,
    /// Scan a root for repositories with uncommitted changes.
    DiscoverPush,
    /// Pull one repository.
    Pull,
    /// Stage, commit, and push one repository.
    Push,
}

impl OperationKind {
    pub fn is_discovery(self) -> bool {
        matches!(self, OperationKind::DiscoverPull | OperationKind::DiscoverPush)
    }

    pub fn label(self) -> &'static str {
        match self {
            OperationKind::DiscoverPull => "discover-pull",
            OperationKind::DiscoverPush => "discover-push",
            OperationKind::Pull => "pull",
            OperationKind::Push => "push",
        }
    }
}

/// One repository found by a discovery scan.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DiscoveredRepo {
    pub name: String,
    #[serde(default)]
    pub path: String,
    /// Commits behind upstream (pull mode) or files changed (push mode).
    #[serde(default)]
    pub pending: u64,
}

/// Verdict reported by an operation script.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationStatus {
    Success,
    Error,
    Conflict,
    Missing,
}

impl OperationStatus {
    pub fn label(self) -> &'static str {
        match self {
            OperationStatus::Success => "success",
            OperationStatus::Error => "error",
            OperationStatus::Conflict => "merge conflict",
            OperationStatus::Missing => "repository missing",
        }
    }
}

/// Structured result of one operation command.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct OperationReport {
    pub status: OperationStatus,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub conflict_files: Vec<String>,
}

/// Typed payload carried by a task outcome, variant per operation kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedResult {
    Discovered(Vec<DiscoveredRepo>),
    Operated(OperationReport),
}

/// Terminal status of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Success,
    Failure,
    Skipped,
    TimedOut,
}

/// The single record every task produces, whatever path it took.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub target: RepositoryTarget,
    pub kind: OperationKind,
    pub status: TaskStatus,
    pub payload: Option<ParsedResult>,
    pub error_detail: Option<String>,
    pub duration: Duration,
}

impl TaskOutcome {
    /// Repositories this outcome contributed to the candidate list.
    pub fn discovered(&self) -> &[DiscoveredRepo] {
        match &self.payload {
            Some(ParsedResult::Discovered(repos)) => repos,
            _ => &[],
        }
    }
}
