//! Configuration file loading

use anyhow::Context;
use carto_render::OrchestratorConfig;
use carto_territory::ParserConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Top-level configuration
///
/// ```toml
/// log_filter = "carto=debug"
///
/// [render]
/// cache_capacity = 24
/// render_timeout_ms = 60000
///
/// [territory]
/// max_depth = 64
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct CartoConfig {
    /// Default tracing filter; `RUST_LOG` takes precedence
    pub(crate) log_filter: String,
    pub(crate) log_format: LogFormat,
    pub(crate) render: OrchestratorConfig,
    pub(crate) territory: ParserConfig,
}

impl Default for CartoConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            log_format: LogFormat::default(),
            render: OrchestratorConfig::default(),
            territory: ParserConfig::default(),
        }
    }
}

impl CartoConfig {
    /// Load from `path`, or defaults when no file is given
    pub(crate) fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parse TOML text; missing sections keep their defaults
    pub(crate) fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
