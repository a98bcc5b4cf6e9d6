//! Worker launcher abstraction
//!
//! The orchestrator only sees [`LaunchedWorker`]: a control handle to ask
//! the worker to stop, and a one-shot channel that yields its terminal
//! message. [`ProcessLauncher`] runs each task in a fresh OS process;
//! tests substitute in-process fakes.

use crate::config::WorkerCommand;
use crate::error::{RenderError, RenderResult};
use crate::task::{TaskDescriptor, WorkerId};
use crate::worker::WorkerMessage;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;

/// Orchestrator-side handle used to stop a worker
#[derive(Debug)]
pub struct WorkerControl {
    term_tx: Option<oneshot::Sender<()>>,
    done_rx: oneshot::Receiver<()>,
}

/// Worker-side ends of the control channels
///
/// A launcher watches `terminate` and fires (or drops) `done` once the
/// worker has actually stopped, whether it finished or was killed.
#[derive(Debug)]
pub struct WorkerSignals {
    /// Resolves when termination is requested
    pub terminate: oneshot::Receiver<()>,
    /// Completed when the worker is gone
    pub done: oneshot::Sender<()>,
}

impl WorkerControl {
    /// Create a connected control handle and signal pair
    #[must_use]
    pub fn pair() -> (Self, WorkerSignals) {
        let (term_tx, term_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        (
            Self {
                term_tx: Some(term_tx),
                done_rx,
            },
            WorkerSignals {
                terminate: term_rx,
                done: done_tx,
            },
        )
    }

    /// Request termination and wait up to `grace` for the worker to stop
    ///
    /// Returns false if the worker did not confirm within the grace period.
    pub async fn terminate(mut self, grace: Duration) -> bool {
        if let Some(term_tx) = self.term_tx.take() {
            let _ = term_tx.send(());
        }
        // A dropped sender also means the worker task is gone
        tokio::time::timeout(grace, &mut self.done_rx).await.is_ok()
    }
}

/// A started worker
#[derive(Debug)]
pub struct LaunchedWorker {
    /// Termination control
    pub control: WorkerControl,
    /// Terminal message; closed without a value if the worker was killed
    pub result: oneshot::Receiver<WorkerMessage>,
}

/// Starts isolated workers for render tasks
#[async_trait::async_trait]
pub trait WorkerLauncher: Send + Sync + 'static {
    /// Start a worker for `task`
    ///
    /// # Errors
    /// Returns `RenderError::Launch` if the worker cannot be started.
    async fn launch(&self, id: WorkerId, task: &TaskDescriptor) -> RenderResult<LaunchedWorker>;
}

/// Launcher that runs every task in a fresh OS process
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    command: WorkerCommand,
}

impl ProcessLauncher {
    /// Create launcher for `command`
    #[inline]
    #[must_use]
    pub fn new(command: WorkerCommand) -> Self {
        Self { command }
    }

    /// Worker command
    #[inline]
    #[must_use]
    pub fn command(&self) -> &WorkerCommand {
        &self.command
    }

    fn build_command(&self, task: &TaskDescriptor) -> RenderResult<tokio::process::Command> {
        let program = match &self.command.program {
            Some(program) => program.clone(),
            None => std::env::current_exe()
                .map_err(|e| RenderError::launch(&task.category, format!("cannot locate worker executable: {e}")))?,
        };
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if self.command.clear_env {
            cmd.env_clear();
            for key in &self.command.keep_env {
                if let Some(value) = std::env::var_os(key) {
                    cmd.env(key, value);
                }
            }
        }
        Ok(cmd)
    }
}

#[async_trait::async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, id: WorkerId, task: &TaskDescriptor) -> RenderResult<LaunchedWorker> {
        let input = serde_json::to_vec(task)?;
        let mut child = self
            .build_command(task)?
            .spawn()
            .map_err(|e| {
                tracing::error!(worker = %id, error = %e, "failed to spawn worker process");
                RenderError::launch(&task.category, e.to_string())
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RenderError::launch(&task.category, "worker stdin unavailable"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| RenderError::launch(&task.category, "worker stdout unavailable"))?;

        let (control, signals) = WorkerControl::pair();
        let WorkerSignals {
            terminate: mut term_rx,
            done: done_tx,
        } = signals;
        let (result_tx, result_rx) = oneshot::channel();
        let pid = child.id();

        tokio::spawn(async move {
            let exchange = async {
                // A worker may exit before reading its input
                if let Err(e) = stdin.write_all(&input).await {
                    tracing::debug!(worker = %id, error = %e, "worker closed its input early");
                }
                drop(stdin);
                let mut output = Vec::new();
                stdout.read_to_end(&mut output).await?;
                let status = child.wait().await?;
                Ok::<_, std::io::Error>((output, status))
            };

            tokio::select! {
                res = exchange => {
                    let message = match res {
                        Ok((output, status)) => {
                            let text = String::from_utf8_lossy(&output);
                            match WorkerMessage::parse_output(&text) {
                                Ok(message) => message,
                                Err(_) if text.trim().is_empty() => {
                                    tracing::error!(worker = %id, %status, "worker exited without a result");
                                    WorkerMessage::failure(format!("worker exited with {status} without a result"))
                                }
                                Err(e) => WorkerMessage::failure(e.to_string()),
                            }
                        }
                        Err(e) => WorkerMessage::failure(format!("worker i/o failed: {e}")),
                    };
                    let _ = result_tx.send(message);
                }
                _ = &mut term_rx => {
                    tracing::info!(worker = %id, ?pid, "termination requested, killing worker");
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(worker = %id, error = %e, "failed to signal worker");
                    }
                    let _ = child.wait().await;
                }
            }

            let _ = done_tx.send(());
        });

        Ok(LaunchedWorker {
            control,
            result: result_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn terminate_reports_acknowledgement() {
        let (control, signals) = WorkerControl::pair();
        tokio::spawn(async move {
            let _ = signals.terminate.await;
            let _ = signals.done.send(());
        });
        assert!(control.terminate(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn terminate_times_out_when_ignored() {
        let (control, signals) = WorkerControl::pair();
        let held = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(signals);
        });
        assert!(!control.terminate(Duration::from_millis(100)).await);
        held.abort();
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let launcher = ProcessLauncher::new(WorkerCommand::new("/nonexistent/carto-worker", Vec::<String>::new()));
        let task = TaskDescriptor::new("code", serde_json::Value::Null);
        let err = launcher.launch(WorkerId::new(), &task).await.unwrap_err();
        assert!(matches!(err, RenderError::Launch { .. }));
    }
}
