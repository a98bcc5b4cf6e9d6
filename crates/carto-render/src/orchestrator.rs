//! Single-flight render orchestration
//!
//! Each task category owns one slot. Submitting a task terminates whatever
//! worker currently occupies that category's slot, launches a fresh worker,
//! and waits for its terminal message. Finished artifacts are cached by task
//! fingerprint, so resubmitting an identical task answers without a worker.
//!
//! The slot lock is held only while replacing the occupant (terminate,
//! launch, register); waiting for the result happens outside it. A worker
//! clears the slot on completion only if it is still the registered
//! occupant, so a slow worker can never clear its successor's entry.
//! Slots nobody holds are dropped once idle.

use crate::cache::{CacheEntry, RenderCache};
use crate::config::OrchestratorConfig;
use crate::error::{RenderError, RenderResult};
use crate::fingerprint::Fingerprint;
use crate::launcher::{ProcessLauncher, WorkerControl, WorkerLauncher};
use crate::task::{Category, TaskDescriptor, WorkerId};
use crate::worker::WorkerMessage;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, Mutex};

/// Successful render
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    /// Rendered artifact
    pub artifact: Arc<Value>,
    /// Task fingerprint
    pub fingerprint: Fingerprint,
    /// True when answered from the cache
    pub from_cache: bool,
    /// Worker that produced the artifact (none for cache hits)
    pub worker: Option<WorkerId>,
}

impl RenderOutcome {
    fn cached(entry: CacheEntry) -> Self {
        Self {
            artifact: entry.artifact,
            fingerprint: entry.fingerprint,
            from_cache: true,
            worker: None,
        }
    }
}

/// Orchestrator statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorStats {
    /// Tasks submitted
    pub submitted: u64,
    /// Submissions answered from the cache
    pub cache_hits: u64,
    /// Submissions that needed a worker
    pub cache_misses: u64,
    /// Workers launched
    pub workers_spawned: u64,
    /// Running workers terminated to make room for a newer task
    pub superseded: u64,
    /// Renders that hit the timeout
    pub timeouts: u64,
    /// Renders that failed
    pub failures: u64,
    /// Renders cancelled before producing a result
    pub cancelled: u64,
    /// Workers that did not confirm termination in time
    pub termination_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    workers_spawned: AtomicU64,
    superseded: AtomicU64,
    timeouts: AtomicU64,
    failures: AtomicU64,
    cancelled: AtomicU64,
    termination_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> OrchestratorStats {
        OrchestratorStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            workers_spawned: self.workers_spawned.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            termination_failures: self.termination_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct ActiveWorker {
    id: WorkerId,
    control: WorkerControl,
    started_at: Instant,
}

#[derive(Debug, Default)]
struct Slot {
    active: Option<ActiveWorker>,
}

/// Runs render tasks in isolated workers, one per category at a time
pub struct TaskOrchestrator {
    config: OrchestratorConfig,
    launcher: Arc<dyn WorkerLauncher>,
    cache: RenderCache,
    slots: DashMap<Category, Arc<Mutex<Slot>>>,
    counters: Counters,
}

impl std::fmt::Debug for TaskOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskOrchestrator")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("slots", &self.slots.len())
            .finish_non_exhaustive()
    }
}

impl TaskOrchestrator {
    /// Create orchestrator running workers as OS processes
    #[must_use]
    pub fn new(config: OrchestratorConfig) -> Self {
        let launcher = Arc::new(ProcessLauncher::new(config.worker.clone()));
        Self::with_launcher(config, launcher)
    }

    /// Create orchestrator with a custom launcher
    #[must_use]
    pub fn with_launcher(config: OrchestratorConfig, launcher: Arc<dyn WorkerLauncher>) -> Self {
        Self {
            cache: RenderCache::new(config.cache_capacity),
            config,
            launcher,
            slots: DashMap::new(),
            counters: Counters::default(),
        }
    }

    /// Submit a task and wait for its artifact
    ///
    /// Any worker already running in the task's category is terminated
    /// first; its own caller then receives `Cancelled` (or its late result,
    /// which is not cached).
    ///
    /// # Errors
    /// - `RenderError::Launch` if the worker cannot be started
    /// - `RenderError::Failed` if the worker reports a failure or dies
    /// - `RenderError::Timeout` if no result arrives in time
    /// - `RenderError::Cancelled` if a newer task or `stop` displaced this one
    pub async fn submit(&self, task: TaskDescriptor) -> RenderResult<RenderOutcome> {
        Counters::bump(&self.counters.submitted);
        let category = task.category.clone();
        let fingerprint = Fingerprint::of(&task);

        if let Some(entry) = self.cache.get(&fingerprint) {
            Counters::bump(&self.counters.cache_hits);
            metrics::counter!("carto_render_cache_hits_total", "category" => category.to_string()).increment(1);
            tracing::debug!(%category, fingerprint = %fingerprint.short(), "render cache hit");
            return Ok(RenderOutcome::cached(entry));
        }
        Counters::bump(&self.counters.cache_misses);
        metrics::counter!("carto_render_cache_misses_total", "category" => category.to_string()).increment(1);

        let (id, result) = match self.start_worker(&task, &fingerprint).await {
            Ok(started) => started,
            Err(e) => {
                self.record_failure(&category);
                tracing::error!(%category, error = %e, "worker launch failed");
                self.prune(&category);
                return Err(e);
            }
        };

        let timeout = self.config.render_timeout();
        match tokio::time::timeout(timeout, result).await {
            Ok(Ok(WorkerMessage::Success { artifact })) => {
                let artifact = Arc::new(artifact);
                if self.release(&category, id).await {
                    self.cache.put(fingerprint, Arc::clone(&artifact));
                    tracing::info!(%category, worker = %id, "render complete");
                } else {
                    tracing::warn!(%category, worker = %id, "superseded worker finished; result not cached");
                }
                Ok(RenderOutcome {
                    artifact,
                    fingerprint,
                    from_cache: false,
                    worker: Some(id),
                })
            }
            Ok(Ok(WorkerMessage::Failure { reason })) => {
                self.release(&category, id).await;
                self.record_failure(&category);
                tracing::warn!(%category, worker = %id, %reason, "render failed");
                Err(RenderError::Failed { category, reason })
            }
            Ok(Err(_closed)) => {
                if self.release(&category, id).await {
                    self.record_failure(&category);
                    tracing::error!(%category, worker = %id, "worker ended without a result");
                    Err(RenderError::failed(&category, "worker ended without a result"))
                } else {
                    Counters::bump(&self.counters.cancelled);
                    tracing::debug!(%category, worker = %id, "render cancelled");
                    Err(RenderError::Cancelled { category })
                }
            }
            Err(_elapsed) => {
                Counters::bump(&self.counters.timeouts);
                metrics::counter!("carto_render_timeouts_total", "category" => category.to_string()).increment(1);
                tracing::warn!(%category, worker = %id, ?timeout, "render timed out");
                // Terminate under the lock so no successor starts beside it
                {
                    let slot = self.slot(&category);
                    let mut guard = slot.lock().await;
                    if guard.active.as_ref().is_some_and(|w| w.id == id) {
                        if let Some(worker) = guard.active.take() {
                            self.terminate_worker(&category, worker).await;
                        }
                    }
                }
                self.prune(&category);
                Err(RenderError::Timeout {
                    category,
                    after: timeout,
                })
            }
        }
    }

    /// Terminate the worker running in `category`
    ///
    /// Returns whether a worker was running.
    ///
    /// # Errors
    /// Returns `RenderError::TerminationFailed` if the worker did not confirm
    /// termination within the grace period.
    pub async fn stop(&self, category: &Category) -> RenderResult<bool> {
        let Some(slot) = self.slots.get(category).map(|s| Arc::clone(s.value())) else {
            return Ok(false);
        };
        let stopped = {
            let mut guard = slot.lock().await;
            let active = guard.active.take();
            match active {
                Some(worker) => {
                    let id = worker.id;
                    tracing::info!(%category, worker = %id, "stopping worker");
                    Some((id, self.terminate_worker(category, worker).await))
                }
                None => None,
            }
        };
        drop(slot);
        self.prune(category);

        match stopped {
            None => Ok(false),
            Some((_, true)) => Ok(true),
            Some((id, false)) => Err(RenderError::TerminationFailed {
                category: category.clone(),
                worker: id,
            }),
        }
    }

    /// Stop several categories, returning those that had a running worker
    pub async fn stop_many(&self, categories: &[Category]) -> Vec<Category> {
        let mut stopped = Vec::new();
        for category in categories {
            match self.stop(category).await {
                Ok(true) | Err(RenderError::TerminationFailed { .. }) => stopped.push(category.clone()),
                Ok(false) | Err(_) => {}
            }
        }
        stopped
    }

    /// Stop every running worker
    pub async fn shutdown(&self) -> Vec<Category> {
        let categories: Vec<Category> = self.slots.iter().map(|entry| entry.key().clone()).collect();
        let stopped = self.stop_many(&categories).await;
        tracing::info!(stopped = stopped.len(), "orchestrator shut down");
        stopped
    }

    /// Worker currently registered for `category`
    pub async fn current_worker(&self, category: &Category) -> Option<WorkerId> {
        let slot = self.slots.get(category).map(|s| Arc::clone(s.value()))?;
        let guard = slot.lock().await;
        guard.active.as_ref().map(|w| w.id)
    }

    /// True if a worker is registered for `category`
    pub async fn is_running(&self, category: &Category) -> bool {
        self.current_worker(category).await.is_some()
    }

    /// Get orchestrator statistics
    #[must_use]
    pub fn stats(&self) -> OrchestratorStats {
        self.counters.snapshot()
    }

    /// Result cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn slot(&self, category: &Category) -> Arc<Mutex<Slot>> {
        Arc::clone(self.slots.entry(category.clone()).or_default().value())
    }

    /// Replace the slot's occupant with a freshly launched worker
    async fn start_worker(
        &self,
        task: &TaskDescriptor,
        fingerprint: &Fingerprint,
    ) -> RenderResult<(WorkerId, oneshot::Receiver<WorkerMessage>)> {
        let category = &task.category;
        let slot = self.slot(category);
        let mut guard = slot.lock().await;
        if let Some(previous) = guard.active.take() {
            Counters::bump(&self.counters.superseded);
            tracing::debug!(%category, worker = %previous.id, "superseding running worker");
            self.terminate_worker(category, previous).await;
        }

        let id = WorkerId::new();
        let launched = self.launcher.launch(id, task).await?;
        guard.active = Some(ActiveWorker {
            id,
            control: launched.control,
            started_at: Instant::now(),
        });
        Counters::bump(&self.counters.workers_spawned);
        metrics::counter!("carto_render_workers_spawned_total", "category" => category.to_string()).increment(1);
        tracing::info!(%category, worker = %id, fingerprint = %fingerprint.short(), "worker launched");
        Ok((id, launched.result))
    }

    /// Clear the slot if `id` still occupies it; true if it did
    async fn release(&self, category: &Category, id: WorkerId) -> bool {
        let current = {
            let slot = self.slot(category);
            let mut guard = slot.lock().await;
            let current = guard.active.as_ref().is_some_and(|w| w.id == id);
            if current {
                if let Some(worker) = guard.active.take() {
                    tracing::debug!(%category, worker = %id, elapsed = ?worker.started_at.elapsed(), "slot released");
                }
            }
            current
        };
        self.prune(category);
        current
    }

    /// Drop the slot entry when it is empty and no caller holds it
    fn prune(&self, category: &Category) {
        self.slots.remove_if(category, |_, slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|guard| guard.active.is_none())
        });
    }

    async fn terminate_worker(&self, category: &Category, worker: ActiveWorker) -> bool {
        let grace = self.config.termination_grace();
        let confirmed = worker.control.terminate(grace).await;
        if !confirmed {
            Counters::bump(&self.counters.termination_failures);
            metrics::counter!("carto_render_termination_failures_total", "category" => category.to_string())
                .increment(1);
            tracing::warn!(%category, worker = %worker.id, ?grace, "worker did not stop within grace period");
        }
        confirmed
    }

    fn record_failure(&self, category: &Category) {
        Counters::bump(&self.counters.failures);
        metrics::counter!("carto_render_failures_total", "category" => category.to_string()).increment(1);
    }
}
