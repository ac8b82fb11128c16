//! Splitting text into literal runs and `{expression}` segments, and rendering them.

use crate::environment::Environment;
use crate::evaluator::{depends_on_reactive_source, evaluate, EvalFailure};
use std::rc::Rc;
use trellis_common::{warn_once, DiagnosticKind};
use trellis_parser::{compile, CompiledExpression};

#[derive(Debug, Clone)]
pub enum Segment {
    Text(Rc<str>),
    Expression {
        compiled: CompiledExpression,
        /// Token as written, braces included
        raw: Rc<str>,
        /// Trimmed expression source
        source: Rc<str>,
    },
}

impl Segment {
    pub fn is_expression(&self) -> bool {
        matches!(self, Segment::Expression { .. })
    }

    pub fn is_fast_path(&self) -> bool {
        match self {
            Segment::Expression { compiled, .. } => compiled.is_fast_path(),
            Segment::Text(_) => false,
        }
    }
}

/// Cheap check for an interpolation candidate
pub fn has_interpolation(text: &str) -> bool {
    text.find('{')
        .map(|open| text[open..].contains('}'))
        .unwrap_or(false)
}

/// Split `text` into segments. A brace pair closes at the first `}` outside a
/// quoted string. Empty braces and an unclosed `{` stay literal.
pub fn compile_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        let Some(close) = find_closing_brace(&rest[open + 1..]) else {
            break;
        };
        let inner = &rest[open + 1..open + 1 + close];
        let raw = &rest[open..open + close + 2];
        literal.push_str(&rest[..open]);

        let source = inner.trim();
        if source.is_empty() {
            literal.push_str(raw);
        } else {
            if !literal.is_empty() {
                segments.push(Segment::Text(Rc::from(std::mem::take(&mut literal))));
            }
            segments.push(Segment::Expression {
                compiled: compile(source),
                raw: Rc::from(raw),
                source: Rc::from(source),
            });
        }
        rest = &rest[open + close + 2..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Text(Rc::from(literal)));
    }
    segments
}

fn find_closing_brace(text: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (index, ch) in text.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => quote = Some(ch),
                '}' => return Some(index),
                _ => {}
            },
        }
    }
    None
}

/// Render segments to a string. Failures never propagate:
/// - a parse failure warns once per source and renders nothing
/// - a missing identifier warns once per identifier and `site`, and renders
///   the raw token only when the expression is a bare identifier
/// - any other evaluation failure warns once per source and `site`
pub fn render_segments(segments: &[Segment], env: &Environment, site: &str) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Expression {
                compiled,
                raw,
                source,
            } => {
                let ast = match compiled.ast() {
                    Ok(ast) => ast,
                    Err(err) => {
                        warn_once(
                            DiagnosticKind::Parse,
                            source.as_ref(),
                            format!("Failed to parse expression '{}': {}", source, err),
                        );
                        continue;
                    }
                };

                match evaluate(&ast, env) {
                    Ok(value) if value.is_nullish() => {}
                    Ok(value) => out.push_str(&value.to_display_string()),
                    Err(EvalFailure::MissingIdentifier { name }) => {
                        warn_once(
                            DiagnosticKind::MissingIdentifier,
                            format!("{}:{}", site, name),
                            format!("'{}' is not defined (in {})", name, raw),
                        );
                        if ast.as_identifier().is_some() {
                            out.push_str(raw);
                        }
                    }
                    Err(err) => {
                        warn_once(
                            DiagnosticKind::Evaluation,
                            format!("{}:{}", site, source),
                            format!("Failed to evaluate '{}': {}", source, err),
                        );
                    }
                }
            }
        }
    }
    out
}

/// Whether any expression segment reads a reactive source in `env`
pub fn segments_depend_on_reactive(segments: &[Segment], env: &Environment) -> bool {
    segments.iter().any(|segment| match segment {
        Segment::Expression { compiled, .. } => compiled
            .ast()
            .map(|ast| depends_on_reactive_source(&ast, env))
            .unwrap_or(false),
        Segment::Text(_) => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use trellis_common::{diagnostics_of, reset_diagnostics};

    fn sources(segments: &[Segment]) -> Vec<String> {
        segments
            .iter()
            .map(|segment| match segment {
                Segment::Text(text) => format!("text:{}", text),
                Segment::Expression { source, .. } => format!("expr:{}", source),
            })
            .collect()
    }

    #[test]
    fn test_split_segments() {
        let segments = compile_segments("Hello {user.name}, you have { count } new");
        assert_eq!(
            sources(&segments),
            vec!["text:Hello ", "expr:user.name", "text:, you have ", "expr:count", "text: new"]
        );
        assert!(segments[1].is_fast_path());
    }

    #[test]
    fn test_braces_inside_strings_and_literal_braces() {
        let segments = compile_segments("{a ?? '}'} {} {open");
        assert_eq!(sources(&segments), vec!["expr:a ?? '}'", "text: {} {open"]);
        assert!(!segments[0].is_fast_path());
        assert!(has_interpolation("x {y}"));
        assert!(!has_interpolation("} {"));
    }

    #[test]
    fn test_render_nullish_as_empty() {
        let env: Environment = [("a", Value::Null), ("b", Value::Number(2.0))]
            .into_iter()
            .collect();
        let segments = compile_segments("[{a}|{b}|{a ?? 'z'}]");
        assert_eq!(render_segments(&segments, &env, "t"), "[|2|z]");
    }

    #[test]
    fn test_missing_identifier_fallbacks() {
        reset_diagnostics();
        let env = Environment::new();
        assert_eq!(render_segments(&compile_segments("{count}"), &env, "s1"), "{count}");
        assert_eq!(render_segments(&compile_segments("{count + 1}"), &env, "s1"), "");
        // Same identifier at the same site warns once
        assert_eq!(diagnostics_of(DiagnosticKind::MissingIdentifier).len(), 1);
        render_segments(&compile_segments("{count}"), &env, "s2");
        assert_eq!(diagnostics_of(DiagnosticKind::MissingIdentifier).len(), 2);
    }

    #[test]
    fn test_parse_failure_renders_empty_and_warns_once() {
        reset_diagnostics();
        let env = Environment::new();
        let segments = compile_segments("a{1 +}b");
        assert_eq!(render_segments(&segments, &env, "x"), "ab");
        assert_eq!(render_segments(&segments, &env, "y"), "ab");
        assert_eq!(diagnostics_of(DiagnosticKind::Parse).len(), 1);
    }
}
