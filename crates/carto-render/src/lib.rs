//! Carto Render - isolated render task orchestration
//!
//! Renders run in separate worker processes so a crashing or hung renderer
//! never takes the host down. The orchestrator guarantees:
//! - at most one live worker per task category (newer tasks supersede older)
//! - a bounded wait for every render
//! - an exact LRU cache of finished artifacts keyed by task fingerprint
//!
//! # Example
//!
//! ```rust,ignore
//! use carto_render::{OrchestratorConfig, TaskDescriptor, TaskOrchestrator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = TaskOrchestrator::new(OrchestratorConfig::new());
//! let task = TaskDescriptor::new("code", serde_json::json!({"code": "xatra.Flag(value=gadm(\"IND\"))"}));
//! let outcome = orchestrator.submit(task).await?;
//! println!("cached: {}", outcome.from_cache);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod launcher;
pub mod orchestrator;
pub mod task;
pub mod worker;

// Re-exports for convenience
pub use cache::{CacheEntry, CacheStats, RenderCache, DEFAULT_CACHE_CAPACITY};
pub use config::{OrchestratorConfig, WorkerCommand};
pub use error::{RenderError, RenderResult};
pub use fingerprint::{canonical_json, Fingerprint};
pub use launcher::{LaunchedWorker, ProcessLauncher, WorkerControl, WorkerLauncher, WorkerSignals};
pub use orchestrator::{OrchestratorStats, RenderOutcome, TaskOrchestrator};
pub use task::{Category, TaskDescriptor, WorkerId};
pub use worker::{run_worker, Renderer, WorkerMessage};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with render orchestration
    pub use crate::{
        Category, OrchestratorConfig, RenderError, RenderOutcome, Renderer, TaskDescriptor,
        TaskOrchestrator, WorkerLauncher,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
