use trellis_parser::{compile, parse, parse_cached, reset_expression_cache, BinaryOp, Expr, Literal, ParseError};

#[test]
fn test_nullish_fallback_over_indexed_member() {
    let expr = parse("a.b[0] ?? 'x'").expect("Failed to parse");

    match expr {
        Expr::Binary {
            operator: BinaryOp::Nullish,
            left,
            right,
        } => {
            assert_eq!(
                *left,
                Expr::member(
                    Expr::member(
                        Expr::identifier("a"),
                        Expr::literal(Literal::String("b".to_string())),
                        false,
                        false,
                    ),
                    Expr::literal(Literal::Number(0.0)),
                    true,
                    false,
                )
            );
            assert_eq!(*right, Expr::literal(Literal::String("x".to_string())));
        }
        other => panic!("Expected nullish binary, got {:?}", other),
    }
}

#[test]
fn test_ast_serializes_with_type_tags() {
    let expr = parse("!done").expect("Failed to parse");
    let json = serde_json::to_value(&expr).expect("Failed to serialize");
    assert_eq!(json["type"], "Unary");
    assert_eq!(json["operator"], "Not");
    assert_eq!(json["operand"]["type"], "Identifier");
    assert_eq!(json["operand"]["name"], "done");

    let back: Expr = serde_json::from_value(json).expect("Failed to deserialize");
    assert_eq!(back, expr);
}

#[test]
fn test_compiled_expression_surfaces_parse_failure() {
    reset_expression_cache();
    let compiled = compile("price * ");
    let err = compiled.ast().unwrap_err();
    assert!(matches!(err, ParseError::UnexpectedEnd { .. }));

    // The same failure is served from the cache
    assert_eq!(parse_cached("price * ").unwrap_err(), err);
}

#[test]
fn test_tokenize_failures_propagate_through_parse() {
    assert!(parse("a @ b").unwrap_err().is_tokenize_error());
    assert!(parse("\"open").unwrap_err().is_tokenize_error());
}
