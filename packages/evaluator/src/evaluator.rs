//! # Expression evaluation
//!
//! Walks an expression AST against an [`Environment`] and produces a [`Value`].
//!
//! Operands are always evaluated left before right. `&&`, `||` and `??` only
//! evaluate their right operand when the left one requires it. Member access on
//! `null`/`undefined` yields `undefined` whether or not the access was written
//! with `?.`, and the property expression is not evaluated in that case.
//!
//! Reads of reactive sources go through [`Value::resolve`], so evaluating inside
//! an effect subscribes it to every source the expression actually touched.
//! [`depends_on_reactive_source`] answers the question statically (without
//! subscribing) so binders only create effects where something can change.

use crate::environment::Environment;
use crate::value::Value;
use thiserror::Error;
use trellis_common::{untrack, walk_member, Visitor};
use trellis_parser::ast::{BinaryOp, Expr, Literal, UnaryOp};

pub type EvalResult<T> = Result<T, EvalFailure>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalFailure {
    #[error("Identifier '{name}' is not defined")]
    MissingIdentifier { name: String },

    #[error("Evaluation error: {message}")]
    Evaluation { message: String },
}

impl EvalFailure {
    pub fn missing_identifier(name: impl Into<String>) -> Self {
        EvalFailure::MissingIdentifier { name: name.into() }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        EvalFailure::Evaluation {
            message: message.into(),
        }
    }

    pub fn missing_name(&self) -> Option<&str> {
        match self {
            EvalFailure::MissingIdentifier { name } => Some(name),
            EvalFailure::Evaluation { .. } => None,
        }
    }
}

/// Evaluate `expr` against `env`
pub fn evaluate(expr: &Expr, env: &Environment) -> EvalResult<Value> {
    match expr {
        Expr::Literal { value } => Ok(Value::from(value)),

        Expr::Identifier { name } => env
            .lookup(name)
            .map(|value| value.resolve())
            .ok_or_else(|| EvalFailure::missing_identifier(name.as_str())),

        Expr::Unary { operator, operand } => {
            let value = evaluate(operand, env)?;
            match operator {
                UnaryOp::Not => Ok(Value::Boolean(!value.is_truthy())),
                UnaryOp::Negate => Ok(Value::Number(-value.to_number()?)),
                UnaryOp::Plus => Ok(Value::Number(value.to_number()?)),
            }
        }

        Expr::Binary {
            operator,
            left,
            right,
        } => {
            let left = evaluate(left, env)?;
            match operator {
                BinaryOp::And => {
                    if !left.is_truthy() {
                        return Ok(left);
                    }
                    evaluate(right, env)
                }
                BinaryOp::Or => {
                    if left.is_truthy() {
                        return Ok(left);
                    }
                    evaluate(right, env)
                }
                BinaryOp::Nullish => {
                    if !left.is_nullish() {
                        return Ok(left);
                    }
                    evaluate(right, env)
                }
                _ => {
                    let right = evaluate(right, env)?;
                    apply_binary(*operator, &left, &right)
                }
            }
        }

        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            if evaluate(test, env)?.is_truthy() {
                evaluate(consequent, env)
            } else {
                evaluate(alternate, env)
            }
        }

        Expr::Member {
            object,
            property,
            computed,
            ..
        } => {
            let target = evaluate(object, env)?;
            if target.is_nullish() {
                return Ok(Value::Undefined);
            }
            let key = property_key(property, *computed, env)?;
            Ok(target.get_property(&key).resolve())
        }
    }
}

fn property_key(property: &Expr, computed: bool, env: &Environment) -> EvalResult<String> {
    if !computed {
        if let Expr::Literal {
            value: Literal::String(name),
        } = property
        {
            return Ok(name.clone());
        }
    }
    Ok(evaluate(property, env)?.to_property_key())
}

fn apply_binary(operator: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let value = match operator {
        BinaryOp::Add => {
            let (left, right) = (left.to_primitive(), right.to_primitive());
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                if matches!(left, Value::Symbol(_)) || matches!(right, Value::Symbol(_)) {
                    return Err(EvalFailure::evaluation(
                        "Cannot convert a symbol value to a string",
                    ));
                }
                let mut joined = left.to_display_string();
                joined.push_str(&right.to_display_string());
                Value::string(joined)
            } else {
                Value::Number(left.to_number()? + right.to_number()?)
            }
        }
        BinaryOp::Subtract => Value::Number(left.to_number()? - right.to_number()?),
        BinaryOp::Multiply => Value::Number(left.to_number()? * right.to_number()?),
        BinaryOp::Divide => Value::Number(left.to_number()? / right.to_number()?),
        BinaryOp::Remainder => Value::Number(left.to_number()? % right.to_number()?),
        BinaryOp::LessThan => Value::Boolean(compare(left, right, |o| o.is_lt())?),
        BinaryOp::LessThanOrEqual => Value::Boolean(compare(left, right, |o| o.is_le())?),
        BinaryOp::GreaterThan => Value::Boolean(compare(left, right, |o| o.is_gt())?),
        BinaryOp::GreaterThanOrEqual => Value::Boolean(compare(left, right, |o| o.is_ge())?),
        BinaryOp::Equals => Value::Boolean(left.loose_equals(right)?),
        BinaryOp::NotEquals => Value::Boolean(!left.loose_equals(right)?),
        BinaryOp::StrictEquals => Value::Boolean(left.strict_equals(right)),
        BinaryOp::StrictNotEquals => Value::Boolean(!left.strict_equals(right)),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Nullish => {
            return Err(EvalFailure::evaluation(format!(
                "Operator {} must be evaluated lazily",
                operator
            )))
        }
    };
    Ok(value)
}

/// Relational comparison: strings compare by code unit order, everything
/// else numerically. Any comparison involving NaN is false.
fn compare(
    left: &Value,
    right: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> EvalResult<bool> {
    let (left, right) = (left.to_primitive(), right.to_primitive());
    if let (Value::String(a), Value::String(b)) = (&left, &right) {
        let ordering = a.encode_utf16().cmp(b.encode_utf16());
        return Ok(accept(ordering));
    }
    let (a, b) = (left.to_number()?, right.to_number()?);
    Ok(a.partial_cmp(&b).map(accept).unwrap_or(false))
}

/// Whether any identifier or member access in `expr` resolves to a reactive
/// source in `env`. Runs untracked and never fails; unresolved leaves count as
/// static.
pub fn depends_on_reactive_source(expr: &Expr, env: &Environment) -> bool {
    untrack(|| {
        let mut probe = ReactiveProbe {
            env,
            reactive: false,
        };
        probe.visit_expr(expr);
        probe.reactive
    })
}

struct ReactiveProbe<'a> {
    env: &'a Environment,
    reactive: bool,
}

impl Visitor for ReactiveProbe<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        if !self.reactive {
            trellis_common::walk_expr(self, expr);
        }
    }

    fn visit_identifier(&mut self, name: &str) {
        if self
            .env
            .lookup(name)
            .map(|value| value.is_reactive())
            .unwrap_or(false)
        {
            self.reactive = true;
        }
    }

    fn visit_member(&mut self, object: &Expr, property: &Expr, computed: bool, _optional: bool) {
        walk_member(self, object, property, computed);
        if self.reactive {
            return;
        }

        let Ok(target) = evaluate(object, self.env) else {
            return;
        };
        if target.is_nullish() {
            return;
        }
        let Ok(key) = property_key(property, computed, self.env) else {
            return;
        };
        if target.get_property(&key).is_reactive() {
            self.reactive = true;
        }
    }
}
