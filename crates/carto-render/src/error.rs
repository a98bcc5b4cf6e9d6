//! Error types for render orchestration

use crate::task::{Category, WorkerId};
use std::time::Duration;

/// Errors returned by render submission and worker control
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The worker did not finish within the render timeout
    #[error("{category} render timed out after {}s", after.as_secs())]
    Timeout { category: Category, after: Duration },

    /// The worker reported a failure or died without a result
    #[error("{category} render failed: {reason}")]
    Failed { category: Category, reason: String },

    /// The worker was superseded or stopped before it produced a result
    #[error("{category} render cancelled")]
    Cancelled { category: Category },

    /// The worker could not be started
    #[error("failed to launch {category} worker: {message}")]
    Launch { category: Category, message: String },

    /// A worker wrote something other than one terminal message
    #[error("worker protocol error: {0}")]
    Protocol(String),

    /// The task payload could not be encoded
    #[error("payload encoding failed: {0}")]
    Payload(#[from] serde_json::Error),

    /// A worker did not acknowledge termination within the grace period
    #[error("{category} worker {worker} did not stop")]
    TerminationFailed { category: Category, worker: WorkerId },
}

impl RenderError {
    /// Create failed render error
    #[inline]
    pub fn failed(category: &Category, reason: impl Into<String>) -> Self {
        Self::Failed {
            category: category.clone(),
            reason: reason.into(),
        }
    }

    /// Create launch error
    #[inline]
    pub fn launch(category: &Category, message: impl Into<String>) -> Self {
        Self::Launch {
            category: category.clone(),
            message: message.into(),
        }
    }

    /// Check if resubmitting the same task may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Cancelled { .. } | Self::Launch { .. }
        )
    }

    /// Category the error belongs to, if any
    #[must_use]
    pub fn category(&self) -> Option<&Category> {
        match self {
            Self::Timeout { category, .. }
            | Self::Failed { category, .. }
            | Self::Cancelled { category }
            | Self::Launch { category, .. }
            | Self::TerminationFailed { category, .. } => Some(category),
            Self::Protocol(_) | Self::Payload(_) => None,
        }
    }
}

/// Result type alias for render operations
pub type RenderResult<T> = Result<T, RenderError>;
