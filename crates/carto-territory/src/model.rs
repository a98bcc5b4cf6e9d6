//! Expression tree data model
//!
//! A territory expression is an ordered sequence of [`Part`]s. The first part
//! is the base operand and its operator is ignored; every following part is
//! combined with the running result using its [`SetOp`]. Nested groups are
//! the only place where structure is kept instead of flattened.

use crate::error::ExpressionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Set operator joining a part to everything before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetOp {
    /// `|`
    #[default]
    Union,
    /// `-`
    Difference,
    /// `&`
    Intersection,
}

impl SetOp {
    /// Source token for this operator
    #[inline]
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            SetOp::Union => "|",
            SetOp::Difference => "-",
            SetOp::Intersection => "&",
        }
    }

    /// Operator for a source token, if it is one of the three set operators
    #[inline]
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "|" => Some(SetOp::Union),
            "-" => Some(SetOp::Difference),
            "&" => Some(SetOp::Intersection),
            _ => None,
        }
    }

    /// Name used by the builder JSON schema
    #[inline]
    #[must_use]
    pub const fn builder_name(self) -> &'static str {
        match self {
            SetOp::Union => "union",
            SetOp::Difference => "difference",
            SetOp::Intersection => "intersection",
        }
    }

    /// Parse a builder JSON operator name
    #[must_use]
    pub fn from_builder_name(name: &str) -> Option<Self> {
        match name {
            "union" => Some(SetOp::Union),
            "difference" => Some(SetOp::Difference),
            "intersection" => Some(SetOp::Intersection),
            _ => None,
        }
    }
}

impl fmt::Display for SetOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.builder_name())
    }
}

/// Tag distinguishing the operand variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// Administrative unit identifiers (GADM codes)
    AdminUnit,
    /// Literal polygon of `[lat, lng]` pairs
    Polygon,
    /// Predefined or imported library territories
    LibraryReference,
    /// Nested expression
    Group,
}

impl OperandKind {
    /// Name used by the builder JSON schema
    #[inline]
    #[must_use]
    pub const fn builder_name(self) -> &'static str {
        match self {
            OperandKind::AdminUnit => "gadm",
            OperandKind::Polygon => "polygon",
            OperandKind::LibraryReference => "predefined",
            OperandKind::Group => "group",
        }
    }

    /// Parse a builder JSON type name
    #[must_use]
    pub fn from_builder_name(name: &str) -> Option<Self> {
        match name {
            "gadm" => Some(OperandKind::AdminUnit),
            "polygon" => Some(OperandKind::Polygon),
            "predefined" => Some(OperandKind::LibraryReference),
            "group" => Some(OperandKind::Group),
            _ => None,
        }
    }
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.builder_name())
    }
}

/// Operand value, tagged by kind
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// One or more admin unit identifiers, unioned
    AdminUnit(Vec<String>),
    /// JSON text encoding a list of `[lat, lng]` pairs
    Polygon(String),
    /// One or more library territory names, unioned
    Library(Vec<String>),
    /// Nested expression kept atomic
    Group(ExpressionTree),
}

impl Operand {
    /// Operand kind tag
    #[inline]
    #[must_use]
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::AdminUnit(_) => OperandKind::AdminUnit,
            Operand::Polygon(_) => OperandKind::Polygon,
            Operand::Library(_) => OperandKind::LibraryReference,
            Operand::Group(_) => OperandKind::Group,
        }
    }

    /// Single admin unit
    #[must_use]
    pub fn admin(code: impl Into<String>) -> Self {
        Operand::AdminUnit(vec![code.into()])
    }

    /// Single library reference
    #[must_use]
    pub fn library(name: impl Into<String>) -> Self {
        Operand::Library(vec![name.into()])
    }

    /// True when the operand carries no usable value
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Operand::AdminUnit(values) | Operand::Library(values) => {
                values.iter().all(|v| v.trim().is_empty())
            }
            Operand::Polygon(text) => text.trim().is_empty(),
            Operand::Group(tree) => tree.is_empty(),
        }
    }

    fn is_equivalent(&self, other: &Operand) -> bool {
        match (self, other) {
            (Operand::AdminUnit(a), Operand::AdminUnit(b))
            | (Operand::Library(a), Operand::Library(b)) => {
                let a = a.iter().map(|v| v.trim()).filter(|v| !v.is_empty());
                let b = b.iter().map(|v| v.trim()).filter(|v| !v.is_empty());
                a.eq(b)
            }
            (Operand::Polygon(a), Operand::Polygon(b)) => {
                match (parse_polygon(a), parse_polygon(b)) {
                    (Ok(pa), Ok(pb)) => pa == pb,
                    _ => a.trim() == b.trim(),
                }
            }
            (Operand::Group(a), Operand::Group(b)) => a.is_equivalent(b),
            _ => false,
        }
    }
}

/// One element of an expression sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    /// Operator applied against the preceding parts (ignored on the first)
    pub op: SetOp,
    /// The operand
    pub operand: Operand,
}

impl Part {
    /// Create a part
    #[inline]
    #[must_use]
    pub fn new(op: SetOp, operand: Operand) -> Self {
        Self { op, operand }
    }

    /// Create a base part (operator ignored)
    #[inline]
    #[must_use]
    pub fn base(operand: Operand) -> Self {
        Self::new(SetOp::Union, operand)
    }

    /// Operand kind tag
    #[inline]
    #[must_use]
    pub fn kind(&self) -> OperandKind {
        self.operand.kind()
    }
}

/// Ordered sequence of parts forming a territory expression
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExpressionTree {
    parts: Vec<Part>,
}

impl ExpressionTree {
    /// Empty expression
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parts
    #[inline]
    #[must_use]
    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    /// Parts in order
    #[inline]
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Mutable access for builder edits
    #[inline]
    pub fn parts_mut(&mut self) -> &mut Vec<Part> {
        &mut self.parts
    }

    /// Consume into parts
    #[inline]
    #[must_use]
    pub fn into_parts(self) -> Vec<Part> {
        self.parts
    }

    /// Append a part
    pub fn push(&mut self, part: Part) {
        self.parts.push(part);
    }

    /// Builder-style append
    #[must_use]
    pub fn with(mut self, op: SetOp, operand: Operand) -> Self {
        self.parts.push(Part::new(op, operand));
        self
    }

    /// Number of top-level parts
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// True when there are no parts
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Group nesting depth; a flat expression has depth 1, an empty one 0
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.parts.is_empty() {
            return 0;
        }
        1 + self
            .parts
            .iter()
            .map(|part| match &part.operand {
                Operand::Group(inner) => inner.depth(),
                _ => 0,
            })
            .max()
            .unwrap_or(0)
    }

    /// All library names referenced anywhere in the tree, in order
    #[must_use]
    pub fn library_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_library_names(&mut names);
        names
    }

    fn collect_library_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        for part in &self.parts {
            match &part.operand {
                Operand::Library(values) => {
                    out.extend(values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()));
                }
                Operand::Group(inner) => inner.collect_library_names(out),
                _ => {}
            }
        }
    }

    /// Structural equivalence: same kinds, values and operators, ignoring the
    /// operator of the first part at every level
    #[must_use]
    pub fn is_equivalent(&self, other: &ExpressionTree) -> bool {
        self.parts.len() == other.parts.len()
            && self
                .parts
                .iter()
                .zip(&other.parts)
                .enumerate()
                .all(|(idx, (a, b))| (idx == 0 || a.op == b.op) && a.operand.is_equivalent(&b.operand))
    }
}

impl From<Vec<Part>> for ExpressionTree {
    fn from(parts: Vec<Part>) -> Self {
        Self::from_parts(parts)
    }
}

/// Parse polygon text into `[lat, lng]` pairs
///
/// # Errors
/// Returns `ExpressionError::InvalidPolygon` unless the text is a JSON list of
/// two-number lists.
pub fn parse_polygon(text: &str) -> Result<Vec<[f64; 2]>, ExpressionError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ExpressionError::invalid_polygon(text, e.to_string()))?;
    let points = value
        .as_array()
        .ok_or_else(|| ExpressionError::invalid_polygon(text, "expected a list of points"))?;
    points
        .iter()
        .map(|point| {
            let pair = point.as_array().filter(|p| p.len() == 2).ok_or_else(|| {
                ExpressionError::invalid_polygon(text, "each point must be [lat, lng]")
            })?;
            let lat = pair[0].as_f64();
            let lng = pair[1].as_f64();
            match (lat, lng) {
                (Some(lat), Some(lng)) => Ok([lat, lng]),
                _ => Err(ExpressionError::invalid_polygon(text, "coordinates must be numbers")),
            }
        })
        .collect()
}

/// Canonical compact JSON for polygon text, keeping integer coordinates as
/// integers
///
/// # Errors
/// Same conditions as [`parse_polygon`].
pub fn canonical_polygon(text: &str) -> Result<String, ExpressionError> {
    parse_polygon(text)?;
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ExpressionError::invalid_polygon(text, e.to_string()))?;
    serde_json::to_string(&value).map_err(|e| ExpressionError::invalid_polygon(text, e.to_string()))
}
