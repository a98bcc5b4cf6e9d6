//! Worker side of the render protocol
//!
//! A worker reads one JSON [`TaskDescriptor`] from its input, renders it, and
//! writes exactly one JSON line to its output:
//!
//! ```text
//! {"status":"success","artifact":{...}}
//! {"status":"failure","reason":"..."}
//! ```
//!
//! Logs go to stderr; the output stream carries nothing but that line.

use crate::error::{RenderError, RenderResult};
use crate::task::TaskDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Read, Write};

/// Terminal message of a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WorkerMessage {
    /// Render produced an artifact
    Success { artifact: Value },
    /// Render failed
    Failure { reason: String },
}

impl WorkerMessage {
    /// Create failure message
    #[inline]
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    /// Parse the terminal message from captured worker output
    ///
    /// The last non-empty line is the message.
    ///
    /// # Errors
    /// Returns `RenderError::Protocol` if there is no line or it is not a
    /// worker message.
    pub fn parse_output(output: &str) -> RenderResult<Self> {
        let line = output
            .lines()
            .map(str::trim)
            .rev()
            .find(|line| !line.is_empty())
            .ok_or_else(|| RenderError::Protocol("worker wrote no result".to_string()))?;
        serde_json::from_str(line).map_err(|e| RenderError::Protocol(format!("unreadable worker result: {e}")))
    }
}

/// Renders one task inside a worker
pub trait Renderer: Send + Sync {
    /// Render a task into an artifact, or a failure reason
    fn render(&self, task: &TaskDescriptor) -> Result<Value, String>;
}

impl<F> Renderer for F
where
    F: Fn(&TaskDescriptor) -> Result<Value, String> + Send + Sync,
{
    fn render(&self, task: &TaskDescriptor) -> Result<Value, String> {
        self(task)
    }
}

/// Worker entry: read a descriptor, render it, write the terminal message
///
/// Renderer failures and unreadable descriptors are reported in the message;
/// only I/O errors on the streams themselves are returned.
///
/// # Errors
/// Returns `RenderError::Protocol` if the input cannot be read or the message
/// cannot be written.
pub fn run_worker<R, W>(mut reader: R, mut writer: W, renderer: &dyn Renderer) -> RenderResult<WorkerMessage>
where
    R: Read,
    W: Write,
{
    let mut input = String::new();
    reader
        .read_to_string(&mut input)
        .map_err(|e| RenderError::Protocol(format!("failed to read task: {e}")))?;

    let message = match serde_json::from_str::<TaskDescriptor>(&input) {
        Ok(task) => {
            tracing::info!(category = %task.category, "worker rendering task");
            match renderer.render(&task) {
                Ok(artifact) => WorkerMessage::Success { artifact },
                Err(reason) => {
                    tracing::warn!(category = %task.category, %reason, "render failed");
                    WorkerMessage::Failure { reason }
                }
            }
        }
        Err(e) => WorkerMessage::failure(format!("invalid task descriptor: {e}")),
    };

    let line = serde_json::to_string(&message)?;
    writeln!(writer, "{line}")
        .and_then(|()| writer.flush())
        .map_err(|e| RenderError::Protocol(format!("failed to write result: {e}")))?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(task: &TaskDescriptor) -> Result<Value, String> {
        match task.category.as_str() {
            "fail" => Err("nothing to draw".to_string()),
            _ => Ok(json!({ "echo": task.payload })),
        }
    }

    fn run(input: &str) -> (WorkerMessage, String) {
        let mut out = Vec::new();
        let message = run_worker(input.as_bytes(), &mut out, &echo).unwrap();
        (message, String::from_utf8(out).unwrap())
    }

    #[test]
    fn writes_one_success_line() {
        let (message, out) = run(r#"{"category": "code", "payload": {"code": "x"}}"#);
        assert_eq!(out.lines().count(), 1);
        assert_eq!(
            serde_json::from_str::<Value>(out.trim()).unwrap(),
            json!({"status": "success", "artifact": {"echo": {"code": "x"}}})
        );
        assert_eq!(WorkerMessage::parse_output(&out).unwrap(), message);
    }

    #[test]
    fn renderer_failure_is_a_message() {
        let (message, _) = run(r#"{"category": "fail"}"#);
        assert_eq!(message, WorkerMessage::failure("nothing to draw"));
    }

    #[test]
    fn bad_descriptor_is_a_message() {
        let (message, out) = run("not json");
        assert!(matches!(message, WorkerMessage::Failure { ref reason } if reason.starts_with("invalid task descriptor")));
        assert!(out.contains(r#""status":"failure""#));
    }

    #[test]
    fn parse_output_takes_last_line() {
        let out = "noise\n{\"status\":\"failure\",\"reason\":\"x\"}\n\n";
        assert_eq!(WorkerMessage::parse_output(out).unwrap(), WorkerMessage::failure("x"));
        assert!(matches!(WorkerMessage::parse_output("  \n"), Err(RenderError::Protocol(_))));
        assert!(matches!(WorkerMessage::parse_output("garbage"), Err(RenderError::Protocol(_))));
    }
}
