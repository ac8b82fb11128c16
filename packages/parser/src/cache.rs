//! Process-wide memo of parse results keyed by exact source text.
//!
//! Entries are never invalidated: a source that fails to parse stays a failure
//! so repeated renders do not re-attempt it. `reset_expression_cache` exists for
//! tests and hosts that need a clean slate.

use crate::ast::Expr;
use crate::error::ParseError;
use crate::fast_path::compile_fast_path;
use crate::parser::parse;
use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

type CachedParse = Result<Rc<Expr>, ParseError>;

thread_local! {
    static EXPRESSION_CACHE: RefCell<HashMap<String, CachedParse>> = RefCell::new(HashMap::new());
}

/// A compiled expression, either recognized by the fast path or deferred to the full parser
#[derive(Debug, Clone)]
pub enum CompiledExpression {
    FastPath(Rc<Expr>),
    Deferred(DeferredExpression),
}

/// Full-grammar expression parsed on first use
#[derive(Debug, Clone)]
pub struct DeferredExpression {
    source: Rc<str>,
    resolved: Rc<OnceCell<CachedParse>>,
}

impl DeferredExpression {
    pub fn new(source: &str) -> Self {
        Self {
            source: Rc::from(source),
            resolved: Rc::new(OnceCell::new()),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn resolve(&self) -> CachedParse {
        self.resolved
            .get_or_init(|| parse_cached(&self.source))
            .clone()
    }
}

impl CompiledExpression {
    pub fn ast(&self) -> CachedParse {
        match self {
            CompiledExpression::FastPath(expr) => Ok(expr.clone()),
            CompiledExpression::Deferred(deferred) => deferred.resolve(),
        }
    }

    pub fn is_fast_path(&self) -> bool {
        matches!(self, CompiledExpression::FastPath(_))
    }
}

/// Compile expression source, trying the fast path before deferring to the parser
pub fn compile(source: &str) -> CompiledExpression {
    match compile_fast_path(source) {
        Some(expr) => CompiledExpression::FastPath(Rc::new(expr)),
        None => CompiledExpression::Deferred(DeferredExpression::new(source)),
    }
}

/// Parse through the process-wide cache
pub fn parse_cached(source: &str) -> CachedParse {
    if let Some(hit) = EXPRESSION_CACHE.with(|cache| cache.borrow().get(source).cloned()) {
        return hit;
    }

    let result = parse(source).map(Rc::new);
    if let Err(err) = &result {
        debug!(source, error = %err, "Caching expression parse failure");
    }

    EXPRESSION_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .insert(source.to_string(), result.clone())
    });
    result
}

pub fn expression_cache_len() -> usize {
    EXPRESSION_CACHE.with(|cache| cache.borrow().len())
}

pub fn is_expression_cached(source: &str) -> bool {
    EXPRESSION_CACHE.with(|cache| cache.borrow().contains_key(source))
}

pub fn reset_expression_cache() {
    EXPRESSION_CACHE.with(|cache| cache.borrow_mut().clear());
}
