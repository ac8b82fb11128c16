//! Restricted single-pass recognizer for bare access chains.
//!
//! Accepts `ident`, `ident.name`, `ident[3]` and any chain of those, or a lone
//! literal keyword. Everything else returns `None` and goes through the full
//! parser instead.

use crate::ast::{Expr, Literal};

pub fn compile_fast_path(source: &str) -> Option<Expr> {
    let src = source.trim();
    let bytes = src.as_bytes();

    let (head, mut pos) = read_identifier(src, 0)?;
    if let Some(literal) = keyword_literal(head) {
        return (pos == bytes.len()).then(|| Expr::literal(literal));
    }

    let mut expr = Expr::identifier(head);

    while pos < bytes.len() {
        match bytes[pos] {
            b'.' => {
                let (name, next) = read_identifier(src, pos + 1)?;
                expr = Expr::dot(expr, name);
                pos = next;
            }
            b'[' => {
                let start = pos + 1;
                let end = start + bytes[start..].iter().take_while(|b| b.is_ascii_digit()).count();
                if end == start || bytes.get(end) != Some(&b']') {
                    return None;
                }
                let index = src[start..end].parse::<f64>().ok()?;
                expr = Expr::index(expr, index);
                pos = end + 1;
            }
            _ => return None,
        }
    }

    Some(expr)
}

fn read_identifier(src: &str, start: usize) -> Option<(&str, usize)> {
    let bytes = src.as_bytes();
    let first = *bytes.get(start)?;
    if !(first.is_ascii_alphabetic() || first == b'_' || first == b'$') {
        return None;
    }

    let len = 1 + bytes[start + 1..]
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_' || **b == b'$')
        .count();

    Some((&src[start..start + len], start + len))
}

fn keyword_literal(word: &str) -> Option<Literal> {
    match word {
        "true" => Some(Literal::Boolean(true)),
        "false" => Some(Literal::Boolean(false)),
        "null" => Some(Literal::Null),
        "undefined" => Some(Literal::Undefined),
        _ => None,
    }
}
