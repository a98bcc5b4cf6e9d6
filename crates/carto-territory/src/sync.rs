//! Map code ↔ builder document synchronisation
//!
//! A map script is a sequence of top-level statements. `xatra.Flag(...)`
//! calls whose `value=` is a territory expression become [`Layer::Flag`]
//! entries the builder can edit; everything else is carried through verbatim
//! as [`Layer::Python`] so nothing is lost going back to code.

use crate::error::{ExpressionError, ExpressionResult};
use crate::literal::{quote, string_value, text};
use crate::model::ExpressionTree;
use crate::parser::{ParserConfig, TreeParser};
use crate::serializer::TreeSerializer;
use crate::syntax::{dotted_name, first_syntax_error, parse_python};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tree_sitter::Node;

/// One builder layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Layer {
    /// Territory flag
    Flag {
        #[serde(default)]
        label: Option<String>,
        value: ExpressionTree,
        /// Remaining keyword arguments as source text
        #[serde(default)]
        args: BTreeMap<String, String>,
    },
    /// Statement kept as written
    Python {
        #[serde(rename = "value")]
        code: String,
    },
}

/// A map script split into imports and layers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapDocument {
    /// Import statements, verbatim
    #[serde(default)]
    pub imports: Vec<String>,
    /// Layers in source order
    #[serde(default, rename = "elements")]
    pub layers: Vec<Layer>,
}

/// Finding raised while converting code to a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncWarning {
    /// 1-based source line
    pub line: usize,
    pub message: String,
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Result of [`code_to_document`]
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedDocument {
    pub document: MapDocument,
    pub warnings: Vec<SyncWarning>,
}

/// Converter between map code and [`MapDocument`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MapSync {
    parser: TreeParser,
}

impl MapSync {
    /// Create converter with default parser limits
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create converter with explicit parser limits
    #[inline]
    #[must_use]
    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            parser: TreeParser::with_config(config),
        }
    }

    /// Split map code into a document
    ///
    /// # Errors
    /// Returns `ExpressionError::Syntax` if the code is not valid Python.
    /// Flags with malformed territory expressions are not errors; they are
    /// kept as Python layers with a warning.
    pub fn code_to_document(&self, source: &str) -> ExpressionResult<SyncedDocument> {
        let mut out = SyncedDocument {
            document: MapDocument::default(),
            warnings: Vec::new(),
        };
        if source.trim().is_empty() {
            return Ok(out);
        }
        let tree = parse_python(source)?;
        let root = tree.root_node();
        if let Some(err) = first_syntax_error(root, source) {
            return Err(err);
        }

        let mut comments: Vec<Node<'_>> = Vec::new();
        let mut cursor = root.walk();
        for stmt in root.named_children(&mut cursor) {
            if stmt.kind() == "comment" {
                // Adjacent comment lines form one block
                if let Some(last) = comments.last() {
                    if stmt.start_position().row > last.end_position().row + 1 {
                        flush_comments(&mut comments, source, &mut out.document);
                    }
                }
                comments.push(stmt);
                continue;
            }
            flush_comments(&mut comments, source, &mut out.document);
            self.statement(stmt, source, &mut out);
        }
        flush_comments(&mut comments, source, &mut out.document);

        tracing::debug!(
            layers = out.document.layers.len(),
            warnings = out.warnings.len(),
            "synced code to builder"
        );
        Ok(out)
    }

    fn statement(&self, stmt: Node<'_>, source: &str, out: &mut SyncedDocument) {
        let code = text(stmt, source).trim().to_string();
        if is_import(stmt, source) {
            out.document.imports.push(code);
            return;
        }
        match self.flag(stmt, source) {
            Ok(Some((layer, warnings))) => {
                let line = stmt.start_position().row + 1;
                out.warnings.extend(warnings.into_iter().map(|message| SyncWarning { line, message }));
                out.document.layers.push(layer);
            }
            Ok(None) => out.document.layers.push(Layer::Python { code }),
            Err(err) => {
                out.warnings.push(SyncWarning {
                    line: stmt.start_position().row + 1,
                    message: format!("flag kept as code: {err}"),
                });
                out.document.layers.push(Layer::Python { code });
            }
        }
    }

    /// Flag layer for `xatra.Flag(value=..., ...)`, `None` for other statements
    fn flag(&self, stmt: Node<'_>, source: &str) -> ExpressionResult<Option<(Layer, Vec<String>)>> {
        let Some(call) = single_call(stmt) else {
            return Ok(None);
        };
        let is_flag = call
            .child_by_field_name("function")
            .and_then(|f| dotted_name(f, source))
            .is_some_and(|name| name == "xatra.Flag" || name == "Flag");
        let Some(arguments) = call.child_by_field_name("arguments").filter(|_| is_flag) else {
            return Ok(None);
        };

        let mut value = None;
        let mut label = None;
        let mut args = BTreeMap::new();
        let mut cursor = arguments.walk();
        for arg in arguments.named_children(&mut cursor) {
            if arg.kind() == "comment" {
                continue;
            }
            let (Some(name), Some(arg_value)) = (
                arg.child_by_field_name("name").filter(|_| arg.kind() == "keyword_argument"),
                arg.child_by_field_name("value"),
            ) else {
                // Positional arguments have no builder field
                return Ok(None);
            };
            match text(name, source) {
                "value" => value = Some(arg_value),
                "label" => match string_value(arg_value, source) {
                    Some(s) => label = Some(s),
                    None => {
                        args.insert("label".to_string(), text(arg_value, source).to_string());
                    }
                },
                key => {
                    args.insert(key.to_string(), text(arg_value, source).to_string());
                }
            }
        }
        let Some(value) = value else {
            return Ok(None);
        };

        let parsed = self.parser.parse_node(value, source)?;
        if parsed.tree.is_empty() {
            return Err(ExpressionError::malformed(text(value, source), "flag has no territory"));
        }
        let warnings = parsed.warnings.iter().map(ToString::to_string).collect();
        Ok(Some((
            Layer::Flag {
                label,
                value: parsed.tree,
                args,
            },
            warnings,
        )))
    }

    /// Render a document back to map code
    ///
    /// # Errors
    /// Returns `ExpressionError::InvalidPolygon` if a flag holds an invalid
    /// polygon.
    pub fn document_to_code(&self, document: &MapDocument) -> ExpressionResult<String> {
        let serializer = TreeSerializer::new();
        let mut lines: Vec<String> = document.imports.clone();
        if !lines.is_empty() && !document.layers.is_empty() {
            lines.push(String::new());
        }
        for layer in &document.layers {
            match layer {
                Layer::Python { code } => lines.push(code.trim_end().to_string()),
                Layer::Flag { label, value, args } => {
                    let mut call_args = Vec::with_capacity(args.len() + 2);
                    if let Some(label) = label {
                        call_args.push(format!("label={}", quote(label)));
                    }
                    call_args.push(format!("value={}", serializer.serialize(value)?));
                    call_args.extend(
                        args.iter()
                            .filter(|(key, _)| key.as_str() != "value" && !(label.is_some() && key.as_str() == "label"))
                            .map(|(key, source)| format!("{key}={source}")),
                    );
                    lines.push(format!("xatra.Flag({})", call_args.join(", ")));
                }
            }
        }
        let mut code = lines.join("\n");
        code.push('\n');
        Ok(code)
    }
}

fn flush_comments(comments: &mut Vec<Node<'_>>, source: &str, document: &mut MapDocument) {
    if comments.is_empty() {
        return;
    }
    let block = comments
        .drain(..)
        .map(|c| text(c, source).trim())
        .collect::<Vec<_>>()
        .join("\n");
    document.layers.push(Layer::Python { code: block });
}

fn is_import(stmt: Node<'_>, source: &str) -> bool {
    match stmt.kind() {
        "import_statement" | "import_from_statement" | "future_import_statement" => true,
        // `indic = xatrahub("...")` loads a shared library
        "expression_statement" => {
            let mut node = stmt.named_child(0);
            if let Some(assign) = node.filter(|n| n.kind() == "assignment") {
                node = assign.child_by_field_name("right");
            }
            node.filter(|n| n.kind() == "call")
                .and_then(|call| call.child_by_field_name("function"))
                .and_then(|f| dotted_name(f, source))
                .is_some_and(|name| name == "xatrahub")
        }
        _ => false,
    }
}

fn single_call(stmt: Node<'_>) -> Option<Node<'_>> {
    if stmt.kind() != "expression_statement" || stmt.named_child_count() != 1 {
        return None;
    }
    stmt.named_child(0).filter(|n| n.kind() == "call")
}

/// Split map code with default parser limits
///
/// # Errors
/// See [`MapSync::code_to_document`].
pub fn code_to_document(source: &str) -> ExpressionResult<SyncedDocument> {
    MapSync::new().code_to_document(source)
}

/// Render a document with the default serializer
///
/// # Errors
/// See [`MapSync::document_to_code`].
pub fn document_to_code(document: &MapDocument) -> ExpressionResult<String> {
    MapSync::new().document_to_code(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Operand, SetOp};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const SCRIPT: &str = r#"import xatra
from xatra.loaders import gadm
indic = xatrahub("/lib/indic")

# Kingdoms
# of the north
xatra.Flag(label="Kuru", value=gadm("IND.12") | indic.PANCALA - (gadm("A") & gadm("B")), color="red")
xatra.TitleBox("<b>Map</b>")
xatra.Flag(label="Broken", value=eval("x"))
"#;

    #[test]
    fn splits_script_into_layers() {
        let synced = code_to_document(SCRIPT).unwrap();
        let doc = &synced.document;
        assert_eq!(doc.imports.len(), 3);
        assert_eq!(doc.layers.len(), 4);
        assert_eq!(
            doc.layers[0],
            Layer::Python {
                code: "# Kingdoms\n# of the north".into()
            }
        );
        let Layer::Flag { label, value, args } = &doc.layers[1] else {
            panic!("expected flag");
        };
        assert_eq!(label.as_deref(), Some("Kuru"));
        assert_eq!(value.len(), 3);
        assert_eq!(value.parts()[1].operand, Operand::library("indic.PANCALA"));
        assert_eq!(value.parts()[2].op, SetOp::Difference);
        assert_eq!(args.get("color").map(String::as_str), Some(r#""red""#));
        assert!(matches!(&doc.layers[2], Layer::Python { code } if code.starts_with("xatra.TitleBox")));
        assert!(matches!(&doc.layers[3], Layer::Python { code } if code.contains("Broken")));
        assert_eq!(synced.warnings.len(), 1);
        assert_eq!(synced.warnings[0].line, 9);
    }

    #[test]
    fn document_renders_back_to_equivalent_code() {
        let first = code_to_document(SCRIPT).unwrap().document;
        let code = document_to_code(&first).unwrap();
        let second = code_to_document(&code).unwrap().document;
        assert_eq!(first.imports, second.imports);
        assert_eq!(first.layers.len(), second.layers.len());
        for (a, b) in first.layers.iter().zip(&second.layers) {
            match (a, b) {
                (Layer::Flag { value: va, label: la, args: aa }, Layer::Flag { value: vb, label: lb, args: ab }) => {
                    assert!(va.is_equivalent(vb));
                    assert_eq!(la, lb);
                    assert_eq!(aa, ab);
                }
                _ => assert_eq!(a, b),
            }
        }
    }

    #[test]
    fn builder_json_shape() {
        let doc = MapDocument {
            imports: vec!["import xatra".into()],
            layers: vec![
                Layer::Flag {
                    label: Some("A".into()),
                    value: ExpressionTree::new().with(SetOp::Union, Operand::admin("IND")),
                    args: BTreeMap::new(),
                },
                Layer::Python {
                    code: "print(1)".into(),
                },
            ],
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            value,
            json!({
                "imports": ["import xatra"],
                "elements": [
                    {"type": "flag", "label": "A", "value": [{"op": "union", "type": "gadm", "value": "IND"}], "args": {}},
                    {"type": "python", "value": "print(1)"},
                ],
            })
        );
        let back: MapDocument = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn legacy_flag_value_deserializes() {
        let layer: Layer = serde_json::from_value(json!({
            "type": "flag", "label": "Old", "value": "IND.31, IND.32", "args": {}
        }))
        .unwrap();
        let Layer::Flag { value, .. } = layer else {
            panic!("expected flag");
        };
        assert_eq!(
            value.parts()[0].operand,
            Operand::AdminUnit(vec!["IND.31".into(), "IND.32".into()])
        );
    }

    #[test]
    fn syntax_errors_fail_the_sync() {
        assert!(matches!(
            code_to_document("xatra.Flag(value=gadm(\"A\")"),
            Err(ExpressionError::Syntax { .. })
        ));
    }
}
