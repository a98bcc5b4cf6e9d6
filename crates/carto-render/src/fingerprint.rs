//! Task fingerprints
//!
//! A fingerprint is the Blake3 hash of the task category and its payload in
//! canonical JSON (object keys sorted at every level), so two descriptors
//! that differ only in key order share a cache entry.
//!
//! Library territories referenced by name are not part of the payload; a
//! changed library does not change the fingerprint of a task that uses it.

use crate::task::TaskDescriptor;
use serde_json::Value;
use std::fmt::{self, Display, Formatter};

/// 32-byte Blake3 task fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint of a task descriptor
    #[must_use]
    pub fn of(task: &TaskDescriptor) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(task.category.as_str().as_bytes());
        hasher.update(&[0]);
        let mut canonical = String::new();
        write_canonical(&task.payload, &mut canonical);
        hasher.update(canonical.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Raw bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Canonical JSON text: sorted object keys, no insignificant whitespace
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (idx, (key, item)) in entries.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
