//! Library territory catalog
//!
//! A territory library is a Python module whose top-level assignments name
//! territories (`KURU = gadm("IND.12") | ...`). The catalog records those
//! names without evaluating anything, so builder references can be checked
//! before a render is submitted.

use crate::error::ExpressionResult;
use crate::literal::{named_children, string_list, text};
use crate::model::ExpressionTree;
use crate::syntax::{first_syntax_error, parse_python};
use std::collections::BTreeMap;
use tree_sitter::Node;

/// Assignment target listing the territories a library wants indexed
pub const TERRITORY_INDEX: &str = "__TERRITORY_INDEX__";

/// Names a territory library defines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerritoryCatalog {
    names: Vec<String>,
    index_names: Vec<String>,
    namespaces: BTreeMap<String, TerritoryCatalog>,
}

impl TerritoryCatalog {
    /// Empty catalog
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the top-level names assigned in library source
    ///
    /// Private names (leading `_`) are skipped. A literal
    /// `__TERRITORY_INDEX__ = [...]` list is kept as [`Self::index_names`].
    ///
    /// # Errors
    /// Returns `ExpressionError::Syntax` if the source does not parse.
    pub fn from_library_code(source: &str) -> ExpressionResult<Self> {
        let mut catalog = Self::new();
        if source.trim().is_empty() {
            return Ok(catalog);
        }
        let tree = parse_python(source)?;
        let root = tree.root_node();
        if let Some(err) = first_syntax_error(root, source) {
            return Err(err);
        }

        for stmt in named_children(root) {
            if stmt.kind() != "expression_statement" {
                continue;
            }
            for expr in named_children(stmt) {
                catalog.collect_assignment(expr, source);
            }
        }
        tracing::debug!(
            names = catalog.names.len(),
            indexed = catalog.index_names.len(),
            "read territory library"
        );
        Ok(catalog)
    }

    fn collect_assignment(&mut self, mut node: Node<'_>, source: &str) {
        // `A = B = expr` nests assignments on the right
        while node.kind() == "assignment" {
            let (Some(left), Some(right)) = (
                node.child_by_field_name("left"),
                node.child_by_field_name("right"),
            ) else {
                return;
            };
            if left.kind() == "identifier" {
                let name = text(left, source);
                if name == TERRITORY_INDEX {
                    if let Some(values) = string_list(right, source) {
                        self.index_names = values;
                    }
                } else if !name.starts_with('_') {
                    self.insert(name);
                }
            }
            node = right;
        }
    }

    /// Add a name
    pub fn insert(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.names.contains(&name) {
            self.names.push(name);
        }
    }

    /// Mount an imported library under `prefix` (`indic` → `indic.KURU`)
    #[must_use]
    pub fn with_namespace(mut self, prefix: impl Into<String>, catalog: TerritoryCatalog) -> Self {
        self.namespaces.insert(prefix.into(), catalog);
        self
    }

    /// Names defined at the top level, in source order
    #[inline]
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Names listed in `__TERRITORY_INDEX__`
    #[inline]
    #[must_use]
    pub fn index_names(&self) -> &[String] {
        &self.index_names
    }

    /// All resolvable names, namespaced ones qualified by their prefix
    #[must_use]
    pub fn available_names(&self) -> Vec<String> {
        let mut out = self.names.clone();
        for (prefix, nested) in &self.namespaces {
            out.extend(
                nested
                    .available_names()
                    .into_iter()
                    .map(|name| format!("{prefix}.{name}")),
            );
        }
        out
    }

    /// True if `name` (possibly dotted) resolves
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        if self.names.iter().any(|n| n == name) {
            return true;
        }
        match name.split_once('.') {
            Some((prefix, rest)) => self
                .namespaces
                .get(prefix)
                .is_some_and(|nested| nested.contains(rest)),
            None => false,
        }
    }

    /// Library references in `tree` that do not resolve, deduplicated
    #[must_use]
    pub fn unresolved(&self, tree: &ExpressionTree) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        for name in tree.library_names() {
            if !self.contains(name) && !missing.iter().any(|m| m == name) {
                missing.push(name.to_string());
            }
        }
        missing
    }
}
