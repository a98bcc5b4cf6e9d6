use carto_territory::{parse_expression, serialize_expression, ExpressionTree};
use carto_test_utils::{arb_tree, sample_tree};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_serialize_then_parse_is_equivalent(tree in arb_tree(3)) {
        let code = serialize_expression(&tree).unwrap();
        let parsed = parse_expression(&code).unwrap();

        // Invariant: no information lost through the code form
        prop_assert!(
            parsed.tree.is_equivalent(&tree),
            "{code}\nparsed: {:?}\noriginal: {:?}",
            parsed.tree,
            tree
        );
        prop_assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn prop_builder_json_roundtrip(tree in arb_tree(3)) {
        let json = tree.to_builder_json();
        let back = ExpressionTree::from_builder_json(&json).unwrap();
        prop_assert!(back.is_equivalent(&tree), "{json}");
    }

    #[test]
    fn prop_serialization_is_stable(tree in arb_tree(2)) {
        let once = serialize_expression(&tree).unwrap();
        let twice = serialize_expression(&parse_expression(&once).unwrap().tree).unwrap();
        prop_assert_eq!(once, twice);
    }
}

#[test]
fn sample_tree_roundtrip() {
    let tree = sample_tree();
    let code = serialize_expression(&tree).unwrap();
    assert_eq!(
        code,
        r#"gadm("IND") | gadm(["PAK", "BGD"]) - (indic.KURU & polygon([[28,77],[19,72.5],[13,80]]))"#
    );
    assert!(parse_expression(&code).unwrap().tree.is_equivalent(&tree));
}
