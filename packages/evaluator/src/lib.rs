//! # Trellis Evaluator
//!
//! Runtime half of the expression language plus text binding:
//!
//! - [`value`]: runtime values and their coercions
//! - [`environment`]: immutable binding chains
//! - [`evaluator`]: AST evaluation and reactive-source detection
//! - [`dom`]: the live document tree bindings write into
//! - [`interpolation`] / [`plan`] / [`binder`]: `{expression}` segments, cached
//!   per-template plans and the effects that keep rendered text current

pub mod binder;
pub mod dom;
pub mod environment;
pub mod evaluator;
pub mod interpolation;
pub mod plan;
pub mod value;

#[cfg(test)]
mod tests_binder;

#[cfg(test)]
mod tests_plan;

pub use binder::{bind_interpolations, TextBinding};
pub use dom::{DomHandle, Document, LayoutBox, Markup, MutationStats, NodeId, NodeKind, ScrollRequest};
pub use environment::Environment;
pub use evaluator::{depends_on_reactive_source, evaluate, EvalFailure, EvalResult};
pub use interpolation::{compile_segments, has_interpolation, render_segments, Segment};
pub use plan::{
    configure_plan_cache, plan_cache_len, plan_cache_stats, plan_for, reset_plan_cache, PlanCache,
    PlanCacheStats, PlanEntry, PlanTarget, TemplatePlan,
};
pub use value::{Callable, Object, Symbol, Value, WeakIdentity};
