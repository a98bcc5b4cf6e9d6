//! Python literal decoding and encoding
//!
//! Only plain data literals are understood: strings, numbers, lists, tuples
//! and the `None`/`True`/`False` keywords. Anything else is left to the caller
//! to report.

use serde_json::{Number, Value};
use tree_sitter::Node;

/// Named children of a node, skipping comments
pub(crate) fn named_children<'tree>(node: Node<'tree>) -> Vec<Node<'tree>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

/// Source text of a node (empty on invalid UTF-8 boundaries)
pub(crate) fn text<'src>(node: Node<'_>, source: &'src str) -> &'src str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// True for the `None` keyword
pub(crate) fn is_none(node: Node<'_>) -> bool {
    node.kind() == "none"
}

/// Decode a string literal node (`string` or `concatenated_string`)
///
/// Returns `None` for f-strings, byte strings and unsupported escapes.
pub(crate) fn string_value(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "string" => decode_string_literal(text(node, source)),
        "concatenated_string" => named_children(node)
            .into_iter()
            .map(|part| string_value(part, source))
            .collect::<Option<Vec<_>>>()
            .map(|parts| parts.concat()),
        _ => None,
    }
}

/// Decode a string literal node or a list/tuple of string literals
pub(crate) fn string_list(node: Node<'_>, source: &str) -> Option<Vec<String>> {
    match node.kind() {
        "list" | "tuple" => named_children(node)
            .into_iter()
            .map(|item| string_value(item, source))
            .collect(),
        _ => string_value(node, source).map(|s| vec![s]),
    }
}

/// Nesting accepted inside one literal; a polygon needs three levels
const MAX_LITERAL_DEPTH: usize = 8;

/// Convert a data literal to JSON
///
/// Returns `None` past [`MAX_LITERAL_DEPTH`] levels of lists, parentheses or
/// signs.
pub(crate) fn literal_json(node: Node<'_>, source: &str) -> Option<Value> {
    literal_at(node, source, 0)
}

fn literal_at(node: Node<'_>, source: &str, depth: usize) -> Option<Value> {
    match node.kind() {
        "string" | "concatenated_string" => string_value(node, source).map(Value::String),
        "integer" => parse_integer(text(node, source)).map(Value::from),
        "float" => parse_float(text(node, source)),
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        "none" => Some(Value::Null),
        _ if depth >= MAX_LITERAL_DEPTH => None,
        "list" | "tuple" => named_children(node)
            .into_iter()
            .map(|item| literal_at(item, source, depth + 1))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        "parenthesized_expression" => {
            let inner = named_children(node);
            match inner.as_slice() {
                [only] => literal_at(*only, source, depth + 1),
                _ => None,
            }
        }
        "unary_operator" => {
            let operator = node.child_by_field_name("operator")?;
            let argument = node.child_by_field_name("argument")?;
            let value = literal_at(argument, source, depth + 1)?;
            match (operator.kind(), value) {
                ("-", Value::Number(n)) => negate(&n),
                ("+", Value::Number(n)) => Some(Value::Number(n)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn negate(n: &Number) -> Option<Value> {
    if let Some(i) = n.as_i64() {
        return i.checked_neg().map(Value::from);
    }
    n.as_f64().and_then(|f| Number::from_f64(-f)).map(Value::Number)
}

fn parse_integer(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().filter(|c| *c != '_').collect();
    let lower = digits.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        lower.parse().ok()
    }
}

fn parse_float(raw: &str) -> Option<Value> {
    let digits: String = raw.chars().filter(|c| *c != '_').collect();
    if digits.ends_with(['j', 'J']) {
        return None;
    }
    digits
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Decode the full text of a Python string literal, prefix and quotes included
pub(crate) fn decode_string_literal(raw: &str) -> Option<String> {
    let quote_at = raw.find(['"', '\''])?;
    let prefix = raw[..quote_at].to_ascii_lowercase();
    if prefix.contains('f') || prefix.contains('b') || !prefix.chars().all(|c| matches!(c, 'r' | 'u')) {
        return None;
    }
    let raw_mode = prefix.contains('r');
    let quoted = &raw[quote_at..];
    let body = ["\"\"\"", "'''", "\"", "'"].iter().find_map(|q| {
        quoted
            .strip_prefix(q)
            .and_then(|rest| rest.strip_suffix(q))
            .filter(|_| quoted.len() >= 2 * q.len())
    })?;
    if raw_mode {
        Some(body.to_string())
    } else {
        unescape(body)
    }
}

fn unescape(body: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = chars.next()?;
        match escaped {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            'v' => out.push('\u{0B}'),
            'x' => out.push(read_code_point(&mut chars, 2, 16)?),
            'u' => out.push(read_code_point(&mut chars, 4, 16)?),
            'U' => out.push(read_code_point(&mut chars, 8, 16)?),
            '0'..='7' => {
                let mut value = escaped.to_digit(8)?;
                for _ in 0..2 {
                    match chars.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value)?);
            }
            // \N{NAME} needs the unicode name database
            'N' => return None,
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Some(out)
}

fn read_code_point(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    digits: usize,
    radix: u32,
) -> Option<char> {
    let mut value = 0u32;
    for _ in 0..digits {
        value = value * radix + chars.next()?.to_digit(radix)?;
    }
    char::from_u32(value)
}

/// Encode a string as a double-quoted Python literal
///
/// JSON string escapes are a subset of Python's, so serde's encoder yields a
/// literal that Python reads back unchanged.
pub(crate) fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value.escape_default()))
}

/// Encode a list of strings as a Python list literal
pub(crate) fn quote_list(values: &[String]) -> String {
    let items: Vec<String> = values.iter().map(|v| quote(v)).collect();
    format!("[{}]", items.join(", "))
}
