use carto_territory::{
    parse_expression, serialize_expression, ExpressionError, ExpressionTree, Operand, OperandKind,
    ParserConfig, SetOp, TreeParser,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn kinds(tree: &ExpressionTree) -> Vec<OperandKind> {
    tree.parts().iter().map(|p| p.kind()).collect()
}

fn ops(tree: &ExpressionTree) -> Vec<SetOp> {
    tree.parts().iter().skip(1).map(|p| p.op).collect()
}

#[test]
fn flattening_keeps_written_order() {
    // Python binds `-` tighter than `&`, and `&` tighter than `|`; the
    // sequence still follows the text left to right
    for (source, expected) in [
        (
            r#"gadm("A") | gadm("B") - gadm("C") & gadm("D")"#,
            vec![SetOp::Union, SetOp::Difference, SetOp::Intersection],
        ),
        (
            r#"gadm("A") & gadm("B") - gadm("C") | gadm("D")"#,
            vec![SetOp::Intersection, SetOp::Difference, SetOp::Union],
        ),
        (
            r#"gadm("A") - gadm("B") - gadm("C")"#,
            vec![SetOp::Difference, SetOp::Difference],
        ),
    ] {
        let tree = parse_expression(source).unwrap().tree;
        assert_eq!(tree.len(), expected.len() + 1);
        assert_eq!(ops(&tree), expected, "{source}");
        assert!(tree.parts().iter().all(|p| p.kind() == OperandKind::AdminUnit));
    }
}

#[test]
fn groups_are_isolated() {
    let tree = parse_expression(r#"gadm("A") - (gadm("B") | gadm("C")) & KURU"#)
        .unwrap()
        .tree;
    assert_eq!(
        kinds(&tree),
        vec![OperandKind::AdminUnit, OperandKind::Group, OperandKind::LibraryReference]
    );
    assert_eq!(ops(&tree), vec![SetOp::Difference, SetOp::Intersection]);

    let Operand::Group(inner) = &tree.parts()[1].operand else {
        panic!("expected group");
    };
    assert_eq!(ops(inner), vec![SetOp::Union]);

    // Serializing keeps the group atomic
    let code = serialize_expression(&tree).unwrap();
    assert_eq!(code, r#"gadm("A") - (gadm("B") | gadm("C")) & KURU"#);
}

#[test]
fn multi_value_operands_collapse() {
    let tree = parse_expression(r#"gadm(["IND.31", "IND.32"]) - predefined(["KURU", "PANCALA"])"#)
        .unwrap()
        .tree;
    assert_eq!(tree.len(), 2);
    assert_eq!(
        tree.to_builder_json(),
        json!([
            {"op": "union", "type": "gadm", "value": ["IND.31", "IND.32"]},
            {"op": "difference", "type": "predefined", "value": ["KURU", "PANCALA"]},
        ])
    );
}

#[test]
fn builder_json_single_values_collapse_to_strings() {
    let tree = ExpressionTree::from_builder_json(&json!([
        {"type": "gadm", "value": ["IND"]},
        {"op": "union", "type": "predefined", "value": ["indic.KURU"]},
    ]))
    .unwrap();
    assert_eq!(
        tree.to_builder_json(),
        json!([
            {"op": "union", "type": "gadm", "value": "IND"},
            {"op": "union", "type": "predefined", "value": "indic.KURU"},
        ])
    );
}

#[test]
fn builder_to_code_to_builder() {
    let builder = json!([
        {"op": "union", "type": "gadm", "value": "IND"},
        {"op": "difference", "type": "group", "value": [
            {"op": "union", "type": "predefined", "value": "indic.KURU"},
            {"op": "intersection", "type": "polygon", "value": "[[1,2],[3,4],[5,6]]"},
        ]},
    ]);
    let tree = ExpressionTree::from_builder_json(&builder).unwrap();
    let code = serialize_expression(&tree).unwrap();
    let back = parse_expression(&code).unwrap().tree.to_builder_json();
    assert_eq!(back, builder);
}

#[test]
fn malformed_input_is_contained() {
    for source in [
        r#"__import__("os").system("rm -rf /")"#,
        r#"gadm("A") | open("/etc/passwd")"#,
        r#"gadm("A") | [x for x in y]"#,
        r#"gadm("A") or gadm("B")"#,
        r#"gadm("A") | gadm("B").geometry"#,
        r#"gadm("A") | {"k": 1}"#,
        "gadm(\"A\") | 1",
        r#"gadm("A") | "B""#,
        r#"gadm("A") | -gadm("B")"#,
    ] {
        match parse_expression(source) {
            Err(ExpressionError::Malformed { fragment, .. }) => {
                assert!(!fragment.is_empty(), "{source}");
                assert!(source.contains(fragment.as_str()), "{fragment} not in {source}");
            }
            other => panic!("{source}: expected Malformed, got {other:?}"),
        }
    }
}

#[test]
fn depth_limit_applies_to_builder_and_code() {
    let source = (0..10).fold(r#"gadm("X")"#.to_string(), |acc, i| format!("(gadm(\"L{i}\") | {acc})"));
    let parser = TreeParser::with_config(ParserConfig::new().with_max_depth(5));
    assert!(matches!(
        parser.parse_expression(&source),
        Err(ExpressionError::DepthExceeded { limit: 5, .. })
    ));

    let tree = TreeParser::new().parse_expression(&source).unwrap().tree;
    assert!(matches!(
        ExpressionTree::from_builder_json_with_depth(&tree.to_builder_json(), 5),
        Err(ExpressionError::DepthExceeded { .. })
    ));
}

#[test]
fn leading_operator_warning() {
    let parsed = parse_expression(r#"None & gadm("X") | gadm("Y")"#).unwrap();
    assert_eq!(parsed.tree.len(), 2);
    assert_eq!(parsed.tree.parts()[0].op, SetOp::Intersection);
    assert_eq!(parsed.warnings.len(), 1);
    assert!(parsed.warnings[0].to_string().contains('&'));
}

#[test]
fn deeply_nested_literals_are_rejected() {
    let brackets = format!("polygon({}{})", "[".repeat(20_000), "]".repeat(20_000));
    assert!(matches!(parse_expression(&brackets), Err(ExpressionError::Malformed { .. })));

    let signs = format!("polygon([[{}1, 2]])", "-".repeat(20_000));
    assert!(matches!(parse_expression(&signs), Err(ExpressionError::Malformed { .. })));

    let parens = format!("polygon([[{}1{}, 2]])", "(".repeat(20_000), ")".repeat(20_000));
    assert!(parse_expression(&parens).is_err());
}

#[test]
fn long_attribute_chain_is_one_reference() {
    let name = format!("a{}", ".a".repeat(50_000));
    let tree = parse_expression(&name).unwrap().tree;
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.library_names(), vec![name.as_str()]);

    let call = format!("{name}(\"X\")");
    assert!(matches!(parse_expression(&call), Err(ExpressionError::Malformed { .. })));
}
