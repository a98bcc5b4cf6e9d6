//! Task descriptors and worker identity

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

/// Render task category; at most one worker runs per category
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    /// Location picker map
    pub const PICKER: &'static str = "picker";
    /// Territory library preview
    pub const TERRITORY_LIBRARY: &'static str = "territory_library";
    /// Map rendered from code
    pub const CODE: &'static str = "code";
    /// Map rendered from builder elements
    pub const BUILDER: &'static str = "builder";

    /// Create category
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Category name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The categories an interactive session uses
    #[must_use]
    pub fn well_known() -> [Category; 4] {
        [
            Self::new(Self::PICKER),
            Self::new(Self::TERRITORY_LIBRARY),
            Self::new(Self::CODE),
            Self::new(Self::BUILDER),
        ]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Category {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for Category {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A unit of render work: category plus opaque payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Slot the task runs in
    pub category: Category,
    /// Renderer input
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TaskDescriptor {
    /// Create descriptor
    #[inline]
    #[must_use]
    pub fn new(category: impl Into<Category>, payload: serde_json::Value) -> Self {
        Self {
            category: category.into(),
            payload,
        }
    }
}

/// Unique identifier of one launched worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    /// Generate new worker ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
