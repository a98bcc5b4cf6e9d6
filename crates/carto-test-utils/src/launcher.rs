//! Scripted in-process worker launcher
//!
//! Each launch runs a tokio task that waits for the scripted delay and then
//! reports the scripted outcome. Live workers are counted per category from
//! launch until the task has fully stopped, so tests can assert the
//! single-flight invariant directly.

use carto_render::{
    Category, LaunchedWorker, RenderResult, TaskDescriptor, WorkerControl, WorkerId, WorkerLauncher,
    WorkerMessage, WorkerSignals,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// What a scripted worker reports
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Artifact equal to the task payload
    Echo,
    /// Fixed artifact
    Succeed(Value),
    /// Failure message
    Fail(String),
    /// Exit without sending a message
    Crash,
    /// Never finish on its own
    Hang,
}

/// Scripted behaviour of one worker
#[derive(Debug, Clone)]
pub struct Behaviour {
    pub delay: Duration,
    pub outcome: Outcome,
    /// Keep running through termination requests
    pub ignore_termination: bool,
}

impl Behaviour {
    /// Echo the payload after `delay`
    #[must_use]
    pub fn echo(delay: Duration) -> Self {
        Self {
            delay,
            outcome: Outcome::Echo,
            ignore_termination: false,
        }
    }

    /// Report `outcome` after `delay`
    #[must_use]
    pub fn new(delay: Duration, outcome: Outcome) -> Self {
        Self {
            delay,
            outcome,
            ignore_termination: false,
        }
    }

    /// Keep running through termination requests
    #[must_use]
    pub fn ignoring_termination(mut self) -> Self {
        self.ignore_termination = true;
        self
    }
}

type Script = dyn Fn(&TaskDescriptor) -> Behaviour + Send + Sync;

#[derive(Default)]
struct Accounting {
    live: HashMap<Category, usize>,
    max_live: HashMap<Category, usize>,
    launched: Vec<(WorkerId, TaskDescriptor)>,
    terminated: Vec<WorkerId>,
}

/// Launcher whose workers follow a script
#[derive(Clone)]
pub struct ScriptedLauncher {
    script: Arc<Script>,
    accounting: Arc<Mutex<Accounting>>,
}

impl std::fmt::Debug for ScriptedLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedLauncher")
            .field("launched", &self.launch_count())
            .finish_non_exhaustive()
    }
}

impl ScriptedLauncher {
    /// Every worker follows `behaviour`
    #[must_use]
    pub fn uniform(behaviour: Behaviour) -> Self {
        Self::scripted(move |_| behaviour.clone())
    }

    /// Behaviour chosen per task
    #[must_use]
    pub fn scripted(script: impl Fn(&TaskDescriptor) -> Behaviour + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(script),
            accounting: Arc::new(Mutex::new(Accounting::default())),
        }
    }

    /// Workers of `category` currently alive
    #[must_use]
    pub fn live(&self, category: &Category) -> usize {
        self.accounting.lock().live.get(category).copied().unwrap_or(0)
    }

    /// Most workers of `category` ever alive at once
    #[must_use]
    pub fn max_live(&self, category: &Category) -> usize {
        self.accounting.lock().max_live.get(category).copied().unwrap_or(0)
    }

    /// Number of launches
    #[must_use]
    pub fn launch_count(&self) -> usize {
        self.accounting.lock().launched.len()
    }

    /// Launched worker ids in order
    #[must_use]
    pub fn launched_ids(&self) -> Vec<WorkerId> {
        self.accounting.lock().launched.iter().map(|(id, _)| *id).collect()
    }

    /// Workers stopped by a termination request
    #[must_use]
    pub fn terminated_ids(&self) -> Vec<WorkerId> {
        self.accounting.lock().terminated.clone()
    }

    fn started(&self, id: WorkerId, task: &TaskDescriptor) {
        let mut acc = self.accounting.lock();
        acc.launched.push((id, task.clone()));
        let live = {
            let live = acc.live.entry(task.category.clone()).or_insert(0);
            *live += 1;
            *live
        };
        let max = acc.max_live.entry(task.category.clone()).or_insert(0);
        *max = (*max).max(live);
    }

    fn stopped(accounting: &Mutex<Accounting>, id: WorkerId, category: &Category, terminated: bool) {
        let mut acc = accounting.lock();
        if let Some(live) = acc.live.get_mut(category) {
            *live = live.saturating_sub(1);
        }
        if terminated {
            acc.terminated.push(id);
        }
    }
}

#[async_trait::async_trait]
impl WorkerLauncher for ScriptedLauncher {
    async fn launch(&self, id: WorkerId, task: &TaskDescriptor) -> RenderResult<LaunchedWorker> {
        let behaviour = (self.script)(task);
        let (control, signals) = WorkerControl::pair();
        let WorkerSignals { mut terminate, done } = signals;
        let (result_tx, result_rx) = tokio::sync::oneshot::channel();
        self.started(id, task);

        let accounting = Arc::clone(&self.accounting);
        let category = task.category.clone();
        let payload = task.payload.clone();
        let Behaviour {
            delay,
            outcome,
            ignore_termination,
        } = behaviour;
        tokio::spawn(async move {
            let finish = async move {
                tokio::time::sleep(delay).await;
                match outcome {
                    Outcome::Echo => Some(WorkerMessage::Success { artifact: payload }),
                    Outcome::Succeed(artifact) => Some(WorkerMessage::Success { artifact }),
                    Outcome::Fail(reason) => Some(WorkerMessage::Failure { reason }),
                    Outcome::Crash => None,
                    Outcome::Hang => std::future::pending().await,
                }
            };

            let terminated = if ignore_termination {
                if let Some(message) = finish.await {
                    let _ = result_tx.send(message);
                }
                false
            } else {
                tokio::select! {
                    message = finish => {
                        if let Some(message) = message {
                            let _ = result_tx.send(message);
                        }
                        false
                    }
                    _ = &mut terminate => true,
                }
            };

            ScriptedLauncher::stopped(&accounting, id, &category, terminated);
            let _ = done.send(());
        });

        Ok(LaunchedWorker {
            control,
            result: result_rx,
        })
    }
}
