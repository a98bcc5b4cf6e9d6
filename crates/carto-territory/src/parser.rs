//! Expression text → [`ExpressionTree`]
//!
//! Walks the tree-sitter syntax tree of a Python expression and recognises a
//! closed grammar: the operand constructors `gadm`, `polygon`, `predefined`
//! and `group`, bare library names, parentheses, and the set operators
//! `|`, `-` and `&`. Chained operators flatten into one sequence; parenthesised
//! sub-expressions become nested groups.
//!
//! # Example
//!
//! ```rust,ignore
//! use carto_territory::TreeParser;
//!
//! let parsed = TreeParser::new().parse_expression(r#"gadm("IND") | (KURU - polygon([[1, 2], [3, 4]]))"#)?;
//! assert_eq!(parsed.tree.len(), 2);
//! ```

use crate::error::{ExpressionError, ExpressionResult};
use crate::literal::{is_none, literal_json, named_children, string_list, text};
use crate::model::{canonical_polygon, ExpressionTree, Operand, Part, SetOp};
use crate::syntax::{dotted_name, first_syntax_error, parse_python, strip_parens};
use serde::{Deserialize, Serialize};
use std::fmt;
use tree_sitter::Node;

/// Default cap on group nesting
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Parser limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Maximum group nesting, counting the top level as 1
    pub max_depth: usize,
}

impl ParserConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With maximum nesting depth
    #[inline]
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Non-fatal findings while parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    /// An operator had nothing on its left; the right operand still carries
    /// the operator as written
    MissingLeftOperand { op: SetOp, fragment: String },
    /// A blank operand (`None`) on the right of an operator was dropped
    BlankRightOperand { op: SetOp, fragment: String },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingLeftOperand { op, fragment } => write!(
                f,
                "`{}` has no left operand in `{fragment}`; kept as {op}",
                op.token()
            ),
            Self::BlankRightOperand { op, fragment } => {
                write!(f, "blank operand after `{}` dropped in `{fragment}`", op.token())
            }
        }
    }
}

/// Parse result with any warnings raised along the way
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExpression {
    /// The parsed tree
    pub tree: ExpressionTree,
    /// Non-fatal findings
    pub warnings: Vec<ParseWarning>,
}

/// Recognised operand constructors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Constructor {
    Gadm,
    Polygon,
    Predefined,
    Group,
}

impl Constructor {
    fn from_call_name(name: &str) -> Option<Self> {
        match name {
            "gadm" | "loaders.gadm" | "xatra.loaders.gadm" => Some(Self::Gadm),
            "polygon" | "loaders.polygon" | "xatra.loaders.polygon" => Some(Self::Polygon),
            "predefined" => Some(Self::Predefined),
            "group" => Some(Self::Group),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Gadm => "gadm",
            Self::Polygon => "polygon",
            Self::Predefined => "predefined",
            Self::Group => "group",
        }
    }
}

/// Parser from expression text to [`ExpressionTree`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeParser {
    config: ParserConfig,
}

impl TreeParser {
    /// Create parser with default limits
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create parser with explicit limits
    #[inline]
    #[must_use]
    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parser limits
    #[inline]
    #[must_use]
    pub fn config(&self) -> ParserConfig {
        self.config
    }

    /// Parse a single expression
    ///
    /// Blank input yields an empty tree.
    ///
    /// # Errors
    /// - `ExpressionError::Syntax` if the text is not valid Python
    /// - `ExpressionError::Malformed` for anything outside the territory grammar
    /// - `ExpressionError::DepthExceeded` past the nesting limit
    pub fn parse_expression(&self, source: &str) -> ExpressionResult<ParsedExpression> {
        let tree = parse_python(source)?;
        let root = tree.root_node();
        if let Some(err) = first_syntax_error(root, source) {
            return Err(err);
        }

        let statements = named_children(root);
        let expr = match statements.as_slice() {
            [] => {
                return Ok(ParsedExpression {
                    tree: ExpressionTree::new(),
                    warnings: Vec::new(),
                })
            }
            [stmt] if stmt.kind() == "expression_statement" => match named_children(*stmt).as_slice() {
                [expr] => *expr,
                _ => return Err(ExpressionError::malformed(text(*stmt, source), "expected a single expression")),
            },
            [stmt] => {
                return Err(ExpressionError::malformed(
                    text(*stmt, source),
                    "expected an expression, not a statement",
                ))
            }
            _ => return Err(ExpressionError::malformed(source, "expected a single expression")),
        };

        self.parse_node(expr, source)
    }

    /// Parse an expression node from an already parsed module
    pub(crate) fn parse_node(&self, node: Node<'_>, source: &str) -> ExpressionResult<ParsedExpression> {
        let mut walker = Walker {
            source,
            max_depth: self.config.max_depth,
            warnings: Vec::new(),
        };
        let parts = walker.expr(node, 1)?;
        tracing::trace!(parts = parts.len(), "parsed territory expression");
        Ok(ParsedExpression {
            tree: ExpressionTree::from_parts(parts),
            warnings: walker.warnings,
        })
    }
}

struct Walker<'s> {
    source: &'s str,
    max_depth: usize,
    warnings: Vec<ParseWarning>,
}

impl Walker<'_> {
    /// Parse an expression at nesting `level`, flattening chained operators
    fn expr(&mut self, node: Node<'_>, level: usize) -> ExpressionResult<Vec<Part>> {
        if node.kind() != "binary_operator" {
            return self.operand(node, level);
        }

        // Walk the left spine iteratively; collect right operands outermost first
        let mut pending = Vec::new();
        let mut current = node;
        while current.kind() == "binary_operator" {
            let op = self.set_op(current)?;
            let (left, right) = match (
                current.child_by_field_name("left"),
                current.child_by_field_name("right"),
            ) {
                (Some(left), Some(right)) => (left, right),
                _ => return Err(ExpressionError::malformed(text(current, self.source), "incomplete operator")),
            };
            pending.push((op, right, current));
            current = left;
        }

        let mut parts = self.operand(current, level)?;
        for (op, right, whole) in pending.into_iter().rev() {
            let right_parts = self.expr(right, level)?;
            self.append(&mut parts, op, right_parts, whole);
        }
        Ok(parts)
    }

    fn append(&mut self, parts: &mut Vec<Part>, op: SetOp, right: Vec<Part>, whole: Node<'_>) {
        let mut right = right.into_iter();
        let Some(mut first) = right.next() else {
            self.warnings.push(ParseWarning::BlankRightOperand {
                op,
                fragment: text(whole, self.source).to_string(),
            });
            return;
        };
        if parts.is_empty() {
            self.warnings.push(ParseWarning::MissingLeftOperand {
                op,
                fragment: text(whole, self.source).to_string(),
            });
        }
        first.op = op;
        parts.push(first);
        parts.extend(right);
    }

    fn set_op(&self, node: Node<'_>) -> ExpressionResult<SetOp> {
        let operator = node
            .child_by_field_name("operator")
            .ok_or_else(|| ExpressionError::malformed(text(node, self.source), "missing operator"))?;
        let token = operator.kind();
        SetOp::from_token(token).ok_or_else(|| {
            ExpressionError::malformed(
                text(node, self.source),
                format!("unsupported operator `{token}`; use `|`, `-` or `&`"),
            )
        })
    }

    /// Parse one operand position
    fn operand(&mut self, node: Node<'_>, level: usize) -> ExpressionResult<Vec<Part>> {
        match node.kind() {
            "none" => Ok(Vec::new()),
            "parenthesized_expression" => {
                let inner = strip_parens(node);
                if inner.kind() == "parenthesized_expression" {
                    return Err(ExpressionError::malformed(text(node, self.source), "expected one expression in parentheses"));
                }
                if inner.kind() == "binary_operator" {
                    self.group(inner, level, node)
                } else {
                    self.operand(inner, level)
                }
            }
            "identifier" | "attribute" => {
                let name = dotted_name(node, self.source).ok_or_else(|| {
                    ExpressionError::malformed(text(node, self.source), "unsupported attribute access")
                })?;
                Ok(vec![Part::base(Operand::Library(vec![name]))])
            }
            "call" => self.call(node, level).map(|part| vec![part]),
            "binary_operator" => self.expr(node, level),
            kind => Err(ExpressionError::malformed(
                text(node, self.source),
                format!("unsupported operand ({kind})"),
            )),
        }
    }

    /// Parse `inner` as a nested group one level down
    fn group(&mut self, inner: Node<'_>, level: usize, whole: Node<'_>) -> ExpressionResult<Vec<Part>> {
        let nested = level + 1;
        if nested > self.max_depth {
            return Err(ExpressionError::depth_exceeded(self.max_depth, text(whole, self.source)));
        }
        let parts = self.expr(inner, nested)?;
        Ok(vec![Part::base(Operand::Group(ExpressionTree::from_parts(parts)))])
    }

    fn call(&mut self, node: Node<'_>, level: usize) -> ExpressionResult<Part> {
        let whole = text(node, self.source);
        let function = node
            .child_by_field_name("function")
            .ok_or_else(|| ExpressionError::malformed(whole, "call without a function"))?;
        let name = dotted_name(function, self.source)
            .ok_or_else(|| ExpressionError::malformed(whole, "unsupported call target"))?;
        let constructor = Constructor::from_call_name(&name)
            .ok_or_else(|| ExpressionError::malformed(whole, format!("unknown constructor `{name}`")))?;

        let arguments = node
            .child_by_field_name("arguments")
            .filter(|args| args.kind() == "argument_list")
            .ok_or_else(|| ExpressionError::malformed(whole, "unsupported call arguments"))?;
        let arg = match named_children(arguments).as_slice() {
            [arg] if arg.kind() != "keyword_argument"
                && arg.kind() != "list_splat"
                && arg.kind() != "dictionary_splat" =>
            {
                *arg
            }
            _ => {
                return Err(ExpressionError::malformed(
                    whole,
                    format!("`{}` takes exactly one positional argument", constructor.name()),
                ))
            }
        };

        let operand = match constructor {
            Constructor::Gadm | Constructor::Predefined => {
                let values = if is_none(arg) {
                    Vec::new()
                } else {
                    string_list(arg, self.source).ok_or_else(|| {
                        ExpressionError::malformed(
                            whole,
                            format!("`{}` expects a string or a list of strings", constructor.name()),
                        )
                    })?
                };
                if constructor == Constructor::Gadm {
                    Operand::AdminUnit(values)
                } else {
                    Operand::Library(values)
                }
            }
            Constructor::Polygon => {
                if is_none(arg) {
                    Operand::Polygon(String::new())
                } else {
                    let coords = literal_json(arg, self.source)
                        .ok_or_else(|| ExpressionError::malformed(whole, "`polygon` expects a literal list of points"))?;
                    let canonical = canonical_polygon(&coords.to_string())
                        .map_err(|e| ExpressionError::malformed(whole, e.to_string()))?;
                    Operand::Polygon(canonical)
                }
            }
            Constructor::Group => {
                // `group((a | b))` nests the parenthesised group one level down
                if is_none(strip_parens(arg)) {
                    Operand::Group(ExpressionTree::new())
                } else {
                    let mut parts = self.group(arg, level, node)?;
                    parts.pop().map_or_else(|| Operand::Group(ExpressionTree::new()), |part| part.operand)
                }
            }
        };
        Ok(Part::base(operand))
    }
}

/// Parse expression text with default limits
///
/// # Errors
/// See [`TreeParser::parse_expression`].
pub fn parse_expression(source: &str) -> ExpressionResult<ParsedExpression> {
    TreeParser::new().parse_expression(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OperandKind;

    fn parse(source: &str) -> ExpressionTree {
        parse_expression(source).unwrap().tree
    }

    fn ops(tree: &ExpressionTree) -> Vec<SetOp> {
        tree.parts().iter().map(|p| p.op).collect()
    }

    #[test]
    fn single_admin_unit() {
        let tree = parse(r#"gadm("IND")"#);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.parts()[0].operand, Operand::admin("IND"));
    }

    #[test]
    fn chained_operators_flatten() {
        let tree = parse(r#"gadm("A") | gadm("B") - gadm("C") & gadm("D")"#);
        assert_eq!(tree.len(), 4);
        assert_eq!(
            ops(&tree),
            vec![SetOp::Union, SetOp::Union, SetOp::Difference, SetOp::Intersection]
        );
        let codes: Vec<_> = tree
            .parts()
            .iter()
            .map(|p| match &p.operand {
                Operand::AdminUnit(v) => v[0].clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(codes, ["A", "B", "C", "D"]);
    }

    #[test]
    fn parentheses_make_groups() {
        let tree = parse(r#"gadm("A") | (gadm("B") - gadm("C"))"#);
        assert_eq!(tree.len(), 2);
        let Operand::Group(inner) = &tree.parts()[1].operand else {
            panic!("expected group");
        };
        assert_eq!(tree.parts()[1].op, SetOp::Union);
        assert_eq!(inner.len(), 2);
        assert_eq!(inner.parts()[1].op, SetOp::Difference);
    }

    #[test]
    fn redundant_parentheses_unwrap() {
        let tree = parse(r#"((gadm("A"))) | ((gadm("B") & KURU))"#);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.parts()[0].kind(), OperandKind::AdminUnit);
        let Operand::Group(inner) = &tree.parts()[1].operand else {
            panic!("expected group");
        };
        assert_eq!(inner.len(), 2);
    }

    #[test]
    fn explicit_group_constructor() {
        let tree = parse(r#"gadm("A") - group(gadm("B"))"#);
        let Operand::Group(inner) = &tree.parts()[1].operand else {
            panic!("expected group");
        };
        assert_eq!(inner.len(), 1);
        assert_eq!(tree.parts()[1].op, SetOp::Difference);
    }

    #[test]
    fn group_of_parenthesised_group_keeps_both_levels() {
        let tree = parse(r#"group((gadm("A") | gadm("B")))"#);
        let Operand::Group(outer) = &tree.parts()[0].operand else {
            panic!("expected group");
        };
        assert_eq!(outer.len(), 1);
        assert!(matches!(&outer.parts()[0].operand, Operand::Group(inner) if inner.len() == 2));

        let flat = parse(r#"group(gadm("A") | gadm("B"))"#);
        assert!(matches!(&flat.parts()[0].operand, Operand::Group(inner) if inner.len() == 2));
    }

    #[test]
    fn list_argument_collapses() {
        let tree = parse(r#"gadm(["PAK", "BGD"])"#);
        assert_eq!(tree.len(), 1);
        assert_eq!(
            tree.parts()[0].operand,
            Operand::AdminUnit(vec!["PAK".into(), "BGD".into()])
        );
    }

    #[test]
    fn library_names() {
        let tree = parse(r#"KURU | indic.PANCALA - predefined("weird name")"#);
        assert_eq!(tree.library_names(), vec!["KURU", "indic.PANCALA", "weird name"]);
    }

    #[test]
    fn polygon_is_canonicalised() {
        let tree = parse("polygon([[1, 2], [3.5, -4]])");
        assert_eq!(tree.parts()[0].operand, Operand::Polygon("[[1,2],[3.5,-4]]".into()));
    }

    #[test]
    fn none_sentinels() {
        let tree = parse("gadm(None) | polygon(None) | group(None)");
        assert_eq!(tree.len(), 3);
        assert!(tree.parts().iter().all(|p| p.operand.is_blank()));
        assert!(parse("None").is_empty());
        assert!(parse("   ").is_empty());
    }

    #[test]
    fn missing_left_operand_keeps_operator() {
        let parsed = parse_expression(r#"None - gadm("X")"#).unwrap();
        assert_eq!(parsed.tree.len(), 1);
        assert_eq!(parsed.tree.parts()[0].op, SetOp::Difference);
        assert!(matches!(
            parsed.warnings.as_slice(),
            [ParseWarning::MissingLeftOperand { op: SetOp::Difference, .. }]
        ));
    }

    #[test]
    fn unknown_constructor_is_malformed() {
        let err = parse_expression(r#"gadm("A") | evil("rm -rf")"#).unwrap_err();
        match err {
            ExpressionError::Malformed { fragment, message } => {
                assert_eq!(fragment, r#"evil("rm -rf")"#);
                assert!(message.contains("evil"));
            }
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn other_operators_are_malformed() {
        assert!(matches!(
            parse_expression(r#"gadm("A") + gadm("B")"#),
            Err(ExpressionError::Malformed { .. })
        ));
        assert!(matches!(
            parse_expression(r#"gadm("A") ^ gadm("B")"#),
            Err(ExpressionError::Malformed { .. })
        ));
    }

    #[test]
    fn bad_arguments_are_malformed() {
        for source in [
            "gadm()",
            r#"gadm("A", "B")"#,
            "gadm(code=\"A\")",
            "gadm(1)",
            "polygon([[1, 2, 3]])",
            "polygon(points)",
            r#"gadm(f"{x}")"#,
        ] {
            assert!(
                matches!(parse_expression(source), Err(ExpressionError::Malformed { .. })),
                "{source} should be malformed"
            );
        }
    }

    #[test]
    fn statements_are_rejected() {
        assert!(parse_expression(r#"x = gadm("A")"#).is_err());
        assert!(parse_expression("gadm(\"A\")\ngadm(\"B\")").is_err());
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(matches!(
            parse_expression(r#"gadm("A") | ("#),
            Err(ExpressionError::Syntax { .. })
        ));
    }

    #[test]
    fn depth_limit_fails_closed() {
        let parser = TreeParser::with_config(ParserConfig::new().with_max_depth(3));
        let ok = r#"gadm("A") | (gadm("B") | (gadm("C") - gadm("D")))"#;
        assert_eq!(parser.parse_expression(ok).unwrap().tree.depth(), 3);

        let too_deep = r#"gadm("A") | (gadm("B") | (gadm("C") | (gadm("D") - gadm("E"))))"#;
        assert!(matches!(
            parser.parse_expression(too_deep),
            Err(ExpressionError::DepthExceeded { limit: 3, .. })
        ));
    }

    #[test]
    fn long_chains_do_not_nest() {
        let source = (0..500)
            .map(|i| format!("gadm(\"C{i}\")"))
            .collect::<Vec<_>>()
            .join(" | ");
        let tree = parse(&source);
        assert_eq!(tree.len(), 500);
        assert_eq!(tree.depth(), 1);
    }
}
