/// Agreement between the fast-path recognizer and the full parser
use crate::*;

const CHAINS: &[&str] = &[
    "a",
    "count",
    "$index",
    "user.name",
    "user.address.city",
    "rows[0]",
    "rows[10].cells[2].value",
    "matrix[1][2]",
    "item.null",
    "true",
    "false",
    "null",
    "undefined",
    "  padded.name  ",
];

#[test]
fn test_fast_path_agrees_with_parser() {
    for source in CHAINS {
        let fast = compile_fast_path(source).unwrap_or_else(|| panic!("fast path rejected {:?}", source));
        let full = parse(source).unwrap_or_else(|err| panic!("parser rejected {:?}: {}", source, err));
        assert_eq!(fast, full, "ASTs differ for {:?}", source);
    }
}

#[test]
fn test_fast_path_output_is_access_chain() {
    for source in CHAINS {
        let expr = compile_fast_path(source).unwrap();
        let is_literal = matches!(expr, Expr::Literal { .. });
        assert!(is_literal || expr.is_access_chain(), "{:?}", source);
    }
}

#[test]
fn test_rejected_sources_still_parse() {
    for source in ["a?.b", "a[b]", "a.b + 1", "!flag", "(a)"] {
        assert!(compile_fast_path(source).is_none());
        assert!(parse(source).is_ok(), "{:?}", source);
    }
}
