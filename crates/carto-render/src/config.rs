//! Orchestrator configuration

use crate::cache::DEFAULT_CACHE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How worker processes are started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerCommand {
    /// Worker executable; the current executable when unset
    pub program: Option<PathBuf>,
    /// Arguments passed to the worker
    pub args: Vec<String>,
    /// Start workers with an empty environment
    pub clear_env: bool,
    /// Variables passed through when the environment is cleared
    pub keep_env: Vec<String>,
}

impl WorkerCommand {
    /// Run `program` with `args`
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: Some(program.into()),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// With environment clearing on or off
    #[inline]
    #[must_use]
    pub fn with_clear_env(mut self, clear_env: bool) -> Self {
        self.clear_env = clear_env;
        self
    }
}

impl Default for WorkerCommand {
    fn default() -> Self {
        Self {
            program: None,
            args: vec!["worker".to_string()],
            clear_env: true,
            keep_env: vec!["RUST_LOG".to_string(), "PATH".to_string()],
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum cached artifacts (0 disables caching)
    pub cache_capacity: usize,
    /// Overall wait for one render, in milliseconds
    pub render_timeout_ms: u64,
    /// Wait for a terminated worker to stop, in milliseconds
    pub termination_grace_ms: u64,
    /// Worker process command
    pub worker: WorkerCommand,
}

impl OrchestratorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With cache capacity
    #[inline]
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// With render timeout
    #[inline]
    #[must_use]
    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1);
        self
    }

    /// With termination grace period
    #[inline]
    #[must_use]
    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.termination_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With worker command
    #[inline]
    #[must_use]
    pub fn with_worker(mut self, worker: WorkerCommand) -> Self {
        self.worker = worker;
        self
    }

    /// Render timeout as a duration
    #[inline]
    #[must_use]
    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    /// Termination grace period as a duration
    #[inline]
    #[must_use]
    pub fn termination_grace(&self) -> Duration {
        Duration::from_millis(self.termination_grace_ms)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            render_timeout_ms: 60_000,
            termination_grace_ms: 5000,
            worker: WorkerCommand::default(),
        }
    }
}
