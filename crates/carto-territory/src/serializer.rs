//! [`ExpressionTree`] → expression text
//!
//! The output always parses back to an equivalent tree: groups are wrapped
//! so they stay atomic, multi-value operands use the list-argument form, and
//! blank operands become explicit `None` sentinels.

use crate::error::ExpressionResult;
use crate::literal::{quote, quote_list};
use crate::model::{canonical_polygon, ExpressionTree, Operand, Part};

/// Names that cannot be emitted as bare library references: Python keywords,
/// plus soft keywords and legacy statement words the host grammar treats
/// specially
const RESERVED: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "case", "class",
    "continue", "def", "del", "elif", "else", "except", "exec", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "match", "nonlocal", "not", "or", "pass", "print",
    "raise", "return", "try", "type", "while", "with", "yield",
];

/// Serializer from [`ExpressionTree`] to expression text
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSerializer;

impl TreeSerializer {
    /// Create serializer
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Serialize a tree
    ///
    /// # Errors
    /// Returns `ExpressionError::InvalidPolygon` if a polygon value is not a
    /// list of `[lat, lng]` pairs.
    pub fn serialize(&self, tree: &ExpressionTree) -> ExpressionResult<String> {
        if tree.is_empty() {
            return Ok("None".to_string());
        }
        let mut out = String::new();
        self.write_sequence(tree.parts(), &mut out)?;
        Ok(out)
    }

    fn write_sequence(&self, parts: &[Part], out: &mut String) -> ExpressionResult<()> {
        for (idx, part) in parts.iter().enumerate() {
            if idx > 0 {
                out.push(' ');
                out.push_str(part.op.token());
                out.push(' ');
            }
            self.write_operand(&part.operand, out)?;
        }
        Ok(())
    }

    fn write_operand(&self, operand: &Operand, out: &mut String) -> ExpressionResult<()> {
        match operand {
            Operand::AdminUnit(values) => out.push_str(&constructor_call("gadm", values)),
            Operand::Library(values) => {
                let values = non_blank(values);
                match values.as_slice() {
                    [name] if is_dotted_identifier(name) => out.push_str(name),
                    _ => out.push_str(&constructor_call("predefined", &values)),
                }
            }
            Operand::Polygon(text) => {
                if text.trim().is_empty() {
                    out.push_str("polygon(None)");
                } else {
                    out.push_str("polygon(");
                    out.push_str(&canonical_polygon(text)?);
                    out.push(')');
                }
            }
            Operand::Group(inner) => match inner.len() {
                0 => out.push_str("group(None)"),
                // A single part in parentheses would reparse as a bare operand
                1 => {
                    out.push_str("group(");
                    self.write_sequence(inner.parts(), out)?;
                    out.push(')');
                }
                _ => {
                    out.push('(');
                    self.write_sequence(inner.parts(), out)?;
                    out.push(')');
                }
            },
        }
        Ok(())
    }
}

fn non_blank(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn constructor_call(name: &str, values: &[String]) -> String {
    let values = non_blank(values);
    match values.as_slice() {
        [] => format!("{name}(None)"),
        [single] => format!("{name}({})", quote(single)),
        many => format!("{name}({})", quote_list(many)),
    }
}

/// True for `name` or `module.name` paths that Python reads as attribute access
pub(crate) fn is_dotted_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
                && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
                && !RESERVED.contains(&segment)
        })
        && !matches!(name, "gadm" | "polygon" | "predefined" | "group")
}

/// Serialize a tree with the default serializer
///
/// # Errors
/// See [`TreeSerializer::serialize`].
pub fn serialize_expression(tree: &ExpressionTree) -> ExpressionResult<String> {
    TreeSerializer::new().serialize(tree)
}
