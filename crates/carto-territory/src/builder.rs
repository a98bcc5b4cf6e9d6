//! Builder JSON schema for territory values
//!
//! The visual builder stores a territory as a list of
//! `{"op": ..., "type": ..., "value": ...}` elements. Older documents store a
//! bare admin-unit string or a list of bare strings; both are still accepted.

use crate::error::{ExpressionError, ExpressionResult};
use crate::model::{canonical_polygon, ExpressionTree, Operand, OperandKind, Part, SetOp};
use crate::parser::DEFAULT_MAX_DEPTH;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

impl ExpressionTree {
    /// Read a builder JSON value with the default nesting limit
    ///
    /// # Errors
    /// Returns `ExpressionError::InvalidBuilder` for values outside the schema
    /// and `ExpressionError::DepthExceeded` for groups nested too deeply.
    pub fn from_builder_json(value: &Value) -> ExpressionResult<Self> {
        Self::from_builder_json_with_depth(value, DEFAULT_MAX_DEPTH)
    }

    /// Read a builder JSON value, nesting groups at most `max_depth` levels
    ///
    /// # Errors
    /// See [`ExpressionTree::from_builder_json`].
    pub fn from_builder_json_with_depth(value: &Value, max_depth: usize) -> ExpressionResult<Self> {
        read_value(value, 1, max_depth)
    }

    /// Write the builder list form
    ///
    /// Single-value admin and library operands are stored as a plain string.
    #[must_use]
    pub fn to_builder_json(&self) -> Value {
        Value::Array(
            self.parts()
                .iter()
                .enumerate()
                .map(|(idx, part)| write_part(part, idx == 0))
                .collect(),
        )
    }
}

/// Serialized as the builder list form
impl Serialize for ExpressionTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_builder_json().serialize(serializer)
    }
}

/// Accepts every builder form [`ExpressionTree::from_builder_json`] does
impl<'de> Deserialize<'de> for ExpressionTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_builder_json(&value).map_err(serde::de::Error::custom)
    }
}

fn read_value(value: &Value, level: usize, max_depth: usize) -> ExpressionResult<ExpressionTree> {
    if level > max_depth {
        return Err(ExpressionError::depth_exceeded(max_depth, value.to_string()));
    }
    match value {
        Value::Null => Ok(ExpressionTree::new()),
        Value::String(codes) => {
            let codes = split_codes(codes);
            if codes.is_empty() {
                Ok(ExpressionTree::new())
            } else {
                Ok(ExpressionTree::from_parts(vec![Part::base(Operand::AdminUnit(codes))]))
            }
        }
        Value::Array(items) if items.iter().all(Value::is_string) => {
            // Legacy form: union of admin units
            let parts = items
                .iter()
                .filter_map(Value::as_str)
                .map(split_codes)
                .filter(|codes| !codes.is_empty())
                .map(|codes| Part::base(Operand::AdminUnit(codes)))
                .collect();
            Ok(ExpressionTree::from_parts(parts))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| read_part(item, level, max_depth))
            .collect::<ExpressionResult<Vec<_>>>()
            .map(ExpressionTree::from_parts),
        other => Err(ExpressionError::InvalidBuilder(format!(
            "expected a list of territory parts, got {other}"
        ))),
    }
}

fn read_part(item: &Value, level: usize, max_depth: usize) -> ExpressionResult<Part> {
    let Value::Object(fields) = item else {
        return Err(ExpressionError::InvalidBuilder(format!(
            "territory part must be an object, got {item}"
        )));
    };
    let op = match fields.get("op") {
        None | Some(Value::Null) => SetOp::Union,
        Some(Value::String(name)) => SetOp::from_builder_name(name)
            .ok_or_else(|| ExpressionError::InvalidBuilder(format!("unknown operator `{name}`")))?,
        Some(other) => {
            return Err(ExpressionError::InvalidBuilder(format!("operator must be a string, got {other}")))
        }
    };
    let kind = match fields.get("type") {
        None | Some(Value::Null) => OperandKind::AdminUnit,
        Some(Value::String(name)) => OperandKind::from_builder_name(name)
            .ok_or_else(|| ExpressionError::InvalidBuilder(format!("unknown territory type `{name}`")))?,
        Some(other) => {
            return Err(ExpressionError::InvalidBuilder(format!("type must be a string, got {other}")))
        }
    };
    let value = fields.get("value").unwrap_or(&Value::Null);

    let operand = match kind {
        OperandKind::AdminUnit => Operand::AdminUnit(read_strings(value, true)?),
        OperandKind::LibraryReference => Operand::Library(read_strings(value, false)?),
        OperandKind::Polygon => Operand::Polygon(read_polygon(value)?),
        OperandKind::Group => Operand::Group(read_value(value, level + 1, max_depth)?),
    };
    Ok(Part::new(op, operand))
}

fn read_strings(value: &Value, split: bool) -> ExpressionResult<Vec<String>> {
    let expand = |s: &str| {
        if split {
            split_codes(s)
        } else {
            vec![s.trim().to_string()]
        }
    };
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(expand(s).into_iter().filter(|v| !v.is_empty()).collect()),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let s = item.as_str().ok_or_else(|| {
                    ExpressionError::InvalidBuilder(format!("expected a string value, got {item}"))
                })?;
                out.extend(expand(s).into_iter().filter(|v| !v.is_empty()));
            }
            Ok(out)
        }
        other => Err(ExpressionError::InvalidBuilder(format!(
            "expected a string or list of strings, got {other}"
        ))),
    }
}

fn read_polygon(value: &Value) -> ExpressionResult<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) if s.trim().is_empty() => Ok(String::new()),
        Value::String(s) => canonical_polygon(s),
        Value::Array(_) => canonical_polygon(&value.to_string()),
        other => Err(ExpressionError::invalid_polygon(other.to_string(), "expected a list of points")),
    }
}

/// Comma separated admin codes (`"IND.31, IND.32"`)
fn split_codes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn write_part(part: &Part, first: bool) -> Value {
    let op = if first { SetOp::Union } else { part.op };
    let value = match &part.operand {
        Operand::AdminUnit(values) | Operand::Library(values) => match values.as_slice() {
            [single] => Value::String(single.clone()),
            many => Value::Array(many.iter().cloned().map(Value::String).collect()),
        },
        Operand::Polygon(text) => Value::String(text.clone()),
        Operand::Group(inner) => inner.to_builder_json(),
    };
    let mut fields = Map::new();
    fields.insert("op".to_string(), json!(op.builder_name()));
    fields.insert("type".to_string(), json!(part.kind().builder_name()));
    fields.insert("value".to_string(), value);
    Value::Object(fields)
}
