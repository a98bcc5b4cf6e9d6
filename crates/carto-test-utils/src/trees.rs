//! Expression tree fixtures and generators

use carto_territory::{ExpressionTree, Operand, Part, SetOp};
use proptest::prelude::*;

/// `gadm("IND") | gadm(["PAK", "BGD"]) - (indic.KURU & polygon(...))`
#[must_use]
pub fn sample_tree() -> ExpressionTree {
    let inner = ExpressionTree::new()
        .with(SetOp::Union, Operand::library("indic.KURU"))
        .with(SetOp::Intersection, Operand::Polygon("[[28,77],[19,72.5],[13,80]]".into()));
    ExpressionTree::new()
        .with(SetOp::Union, Operand::admin("IND"))
        .with(SetOp::Union, Operand::AdminUnit(vec!["PAK".into(), "BGD".into()]))
        .with(SetOp::Difference, Operand::Group(inner))
}

fn arb_op() -> impl Strategy<Value = SetOp> {
    prop_oneof![
        Just(SetOp::Union),
        Just(SetOp::Difference),
        Just(SetOp::Intersection),
    ]
}

fn arb_library_name() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Z][A-Z_]{0,7}",
        "[a-z]{2,5}\\.[A-Z][A-Z0-9_]{1,6}",
        // Not identifiers: serialized through `predefined(...)`
        "[a-z][a-z \\-\"'\\\\]{0,10}",
    ]
}

fn arb_leaf() -> impl Strategy<Value = Operand> {
    prop_oneof![
        prop::collection::vec("[A-Z]{3}(\\.[0-9]{1,2}_1){0,2}", 0..3).prop_map(Operand::AdminUnit),
        prop::collection::vec(arb_library_name(), 0..3).prop_map(Operand::Library),
        prop::collection::vec((-90i32..90, -360i32..360), 0..5).prop_map(|points| {
            if points.is_empty() {
                return Operand::Polygon(String::new());
            }
            let pairs: Vec<String> = points
                .iter()
                .map(|(lat, lng)| format!("[{lat},{}]", f64::from(*lng) / 2.0))
                .collect();
            Operand::Polygon(format!("[{}]", pairs.join(",")))
        }),
    ]
}

fn arb_parts(operand: impl Strategy<Value = Operand>) -> impl Strategy<Value = Vec<Part>> {
    prop::collection::vec((arb_op(), operand), 0..5)
        .prop_map(|parts| parts.into_iter().map(|(op, operand)| Part::new(op, operand)).collect())
}

/// Arbitrary tree with groups nested at most `depth` levels
pub fn arb_tree(depth: u32) -> impl Strategy<Value = ExpressionTree> {
    let leaf = arb_leaf();
    let operand = leaf.prop_recursive(depth, 32, 4, |inner| {
        prop_oneof![
            arb_leaf(),
            arb_parts(inner).prop_map(|parts| Operand::Group(ExpressionTree::from_parts(parts))),
        ]
    });
    arb_parts(operand).prop_map(ExpressionTree::from_parts)
}
