use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::runner::BatchConfig;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub push: PushConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Directories whose immediate children are candidate repositories.
    #[serde(default = "default_roots")]
    pub roots: Vec<PathBuf>,
    /// Additional roots scanned on top of `roots`.
    #[serde(default)]
    pub extra_roots: Vec<PathBuf>,
    /// Repository names (not paths) never operated on, per machine.
    #[serde(default)]
    pub excluded_repos: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            extra_roots: Vec::new(),
            excluded_repos: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
    #[serde(default = "default_discovery_concurrency")]
    pub discovery_concurrency: usize,
    #[serde(default = "default_operation_concurrency")]
    pub operation_concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub discovery_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub operation_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            discovery_concurrency: default_discovery_concurrency(),
            operation_concurrency: default_operation_concurrency(),
            discovery_timeout_secs: default_timeout_secs(),
            operation_timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PushConfig {
    /// First word of generated commit messages, e.g. "Sync commit by ...".
    #[serde(default = "default_commit_prefix")]
    pub commit_prefix: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            commit_prefix: default_commit_prefix(),
        }
    }
}

fn default_roots() -> Vec<PathBuf> {
    dirs::home_dir()
        .map(|home| vec![home.join("github")])
        .unwrap_or_default()
}

fn default_discovery_concurrency() -> usize {
    4
}

fn default_operation_concurrency() -> usize {
    8
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_commit_prefix() -> String {
    "Sync".to_string()
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            // Try default paths
            builder = builder.add_source(config::File::with_name("githerd").required(false));
        }

        // Environment variable overrides with GITHERD_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("GITHERD")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))
    }

    /// Settings one batch consumes, resolved at batch start.
    pub fn batch_config(&self) -> BatchConfig {
        let mut roots = self.scan.roots.clone();
        for extra in &self.scan.extra_roots {
            if !roots.contains(extra) {
                roots.push(extra.clone());
            }
        }
        BatchConfig {
            roots,
            excluded_repos: self.scan.excluded_repos.clone(),
            discovery_concurrency: self.runner.discovery_concurrency,
            operation_concurrency: self.runner.operation_concurrency,
            discovery_timeout: Duration::from_secs(self.runner.discovery_timeout_secs),
            operation_timeout: Duration::from_secs(self.runner.operation_timeout_secs),
        }
    }
}
