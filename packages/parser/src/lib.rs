pub mod ast;
pub mod cache;
pub mod error;
pub mod fast_path;
pub mod parser;
pub mod tokenizer;

#[cfg(test)]
mod tests_fast_path;

pub use ast::{BinaryOp, Expr, Literal, UnaryOp};
pub use cache::{
    compile, expression_cache_len, is_expression_cached, parse_cached, reset_expression_cache,
    CompiledExpression, DeferredExpression,
};
pub use error::{ParseError, ParseResult};
pub use fast_path::compile_fast_path;
pub use parser::{parse, parse_tokens, Parser};
pub use tokenizer::{tokenize, Token};
