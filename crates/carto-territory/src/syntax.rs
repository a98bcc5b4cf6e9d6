//! Host syntax tree access via tree-sitter-python
//!
//! Source text is only ever parsed into a syntax tree and inspected; nothing
//! is evaluated.

use crate::error::{ExpressionError, ExpressionResult};
use crate::literal::text;
use tree_sitter::{Node, Parser, Tree};

/// Parse Python source into a syntax tree
pub(crate) fn parse_python(source: &str) -> ExpressionResult<Tree> {
    let mut parser = Parser::new();
    let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
    parser
        .set_language(&language)
        .map_err(|e| ExpressionError::Grammar(e.to_string()))?;
    parser
        .parse(source, None)
        .ok_or_else(|| ExpressionError::Grammar("parser produced no tree".to_string()))
}

/// First error or missing node below `root`, as a syntax error
pub(crate) fn first_syntax_error(root: Node<'_>, source: &str) -> Option<ExpressionError> {
    if !root.has_error() {
        return None;
    }
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            let fragment = match text(node, source) {
                "" => node.parent().map_or("", |parent| text(parent, source)),
                t => t,
            };
            return Some(ExpressionError::syntax(fragment, node.start_position().row + 1));
        }
        // Only descend into subtrees that contain an error
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return Some(ExpressionError::syntax(text(root, source), 1));
            }
        }
    }
}

/// Dotted name of an identifier or attribute chain (`xatra.loaders.gadm`)
pub(crate) fn dotted_name(mut node: Node<'_>, source: &str) -> Option<String> {
    let mut segments = Vec::new();
    while node.kind() == "attribute" {
        segments.push(text(node.child_by_field_name("attribute")?, source));
        node = node.child_by_field_name("object")?;
    }
    if node.kind() != "identifier" {
        return None;
    }
    segments.push(text(node, source));
    segments.reverse();
    Some(segments.join("."))
}

/// Strip redundant parentheses around a single expression
pub(crate) fn strip_parens(mut node: Node<'_>) -> Node<'_> {
    while node.kind() == "parenthesized_expression" {
        match crate::literal::named_children(node).as_slice() {
            [inner] => node = *inner,
            _ => break,
        }
    }
    node
}
