use crate::evaluator::{EvalFailure, EvalResult};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use trellis_common::Signal;
use trellis_parser::Literal;

pub type Object = BTreeMap<String, Value>;

type NativeFn = dyn Fn(&[Value]) -> EvalResult<Value>;

/// Runtime value
///
/// Arrays, objects and callables are reference values: cloning shares the
/// allocation and identity comparisons use the pointer.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<Object>),
    Function(Callable),
    Symbol(Symbol),
    /// Reactive source; reads through it subscribe the running effect
    Signal(Signal<Value>),
}

/// Host function value (event handlers, load-more callbacks)
#[derive(Clone)]
pub struct Callable {
    name: Rc<str>,
    func: Rc<NativeFn>,
}

impl Callable {
    pub fn new(name: &str, func: impl Fn(&[Value]) -> EvalResult<Value> + 'static) -> Self {
        Self {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> EvalResult<Value> {
        (self.func)(args)
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.func) as *const () as usize
    }
}

thread_local! {
    static NEXT_SYMBOL: Cell<u64> = const { Cell::new(1) };
}

/// Unique token value; two symbols are equal only if created by the same call
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    description: Rc<str>,
}

impl Symbol {
    pub fn new(description: &str) -> Self {
        let id = NEXT_SYMBOL.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Self {
            id,
            description: Rc::from(description),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn number(n: impl Into<f64>) -> Self {
        Value::Number(n.into())
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Rc::new(items.into_iter().collect()))
    }

    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(Rc::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn signal(initial: Value) -> Self {
        Value::Signal(Signal::new(initial))
    }

    pub fn function(name: &str, func: impl Fn(&[Value]) -> EvalResult<Value> + 'static) -> Self {
        Value::Function(Callable::new(name, func))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Symbol(_) => "symbol",
            Value::Signal(_) => "signal",
        }
    }

    pub fn is_nullish(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => true,
            Value::Signal(signal) => signal.with(Value::is_nullish),
            _ => false,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Symbol(_) => true,
            Value::Signal(signal) => signal.with(Value::is_truthy),
        }
    }

    pub fn is_reactive(&self) -> bool {
        matches!(self, Value::Signal(_))
    }

    /// Read through reactive sources (tracked)
    pub fn resolve(&self) -> Value {
        match self {
            Value::Signal(signal) => signal.get().resolve(),
            other => other.clone(),
        }
    }

    /// Read through reactive sources without subscribing
    pub fn resolve_untracked(&self) -> Value {
        match self {
            Value::Signal(signal) => signal.get_untracked().resolve_untracked(),
            other => other.clone(),
        }
    }

    pub fn as_array(&self) -> Option<&Rc<Vec<Value>>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<Object>> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Address of the shared allocation for reference values
    pub fn identity_addr(&self) -> Option<usize> {
        match self {
            Value::Array(items) => Some(Rc::as_ptr(items) as *const () as usize),
            Value::Object(fields) => Some(Rc::as_ptr(fields) as *const () as usize),
            Value::Function(callable) => Some(callable.addr()),
            Value::Signal(signal) => Some(signal.addr()),
            _ => None,
        }
    }

    /// Property lookup without reading through a reactive result.
    /// Missing properties are `undefined`.
    pub fn get_property(&self, key: &str) -> Value {
        match self {
            Value::Object(fields) => fields.get(key).cloned().unwrap_or(Value::Undefined),
            Value::Array(items) => {
                if key == "length" {
                    return Value::Number(items.len() as f64);
                }
                parse_index(key)
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or(Value::Undefined)
            }
            Value::String(s) => {
                // Lengths and indexes count UTF-16 units; a lone surrogate half reads as U+FFFD
                if key == "length" {
                    return Value::Number(s.encode_utf16().count() as f64);
                }
                parse_index(key)
                    .and_then(|i| s.encode_utf16().nth(i))
                    .map(|unit| {
                        Value::string(
                            char::decode_utf16([unit])
                                .map(|ch| ch.unwrap_or(char::REPLACEMENT_CHARACTER))
                                .collect::<String>(),
                        )
                    })
                    .unwrap_or(Value::Undefined)
            }
            Value::Function(callable) if key == "name" => Value::string(callable.name()),
            Value::Symbol(symbol) if key == "description" => Value::string(symbol.description()),
            Value::Signal(signal) => signal.with(|inner| inner.get_property(key)),
            _ => Value::Undefined,
        }
    }

    /// String form used as a property key
    pub fn to_property_key(&self) -> String {
        self.to_display_string()
    }

    /// Numeric conversion; symbols cannot be converted
    pub fn to_number(&self) -> EvalResult<f64> {
        Ok(match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(_) => string_to_number(&self.to_display_string()),
            Value::Object(_) | Value::Function(_) => f64::NAN,
            Value::Symbol(_) => {
                return Err(EvalFailure::evaluation(
                    "Cannot convert a symbol value to a number",
                ))
            }
            Value::Signal(signal) => return signal.with(Value::to_number),
        })
    }

    /// String conversion used for rendering and concatenation
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_display_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(callable) => format!("function {}() {{ [native code] }}", callable.name()),
            Value::Symbol(symbol) => format!("Symbol({})", symbol.description()),
            Value::Signal(signal) => signal.with(Value::to_display_string),
        }
    }

    /// Reduce reference values to a primitive for operators
    pub fn to_primitive(&self) -> Value {
        match self {
            Value::Array(_) | Value::Object(_) | Value::Function(_) => {
                Value::string(self.to_display_string())
            }
            Value::Signal(signal) => signal.with(Value::to_primitive),
            other => other.clone(),
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Signal(a), Value::Signal(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> EvalResult<bool> {
        match (self, other) {
            (Value::Signal(a), _) => a.with(|inner| inner.loose_equals(other)),
            (_, Value::Signal(b)) => b.with(|inner| self.loose_equals(inner)),
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => Ok(true),
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => Ok(false),
            (Value::Number(a), Value::String(_)) => Ok(*a == other.to_number()?),
            (Value::String(_), Value::Number(b)) => Ok(self.to_number()? == *b),
            (Value::Boolean(_), _) => Value::Number(self.to_number()?).loose_equals(other),
            (_, Value::Boolean(_)) => self.loose_equals(&Value::Number(other.to_number()?)),
            (Value::Array(_) | Value::Object(_) | Value::Function(_), Value::Number(_) | Value::String(_)) => {
                self.to_primitive().loose_equals(other)
            }
            (Value::Number(_) | Value::String(_), Value::Array(_) | Value::Object(_) | Value::Function(_)) => {
                self.loose_equals(&other.to_primitive())
            }
            _ => Ok(self.strict_equals(other)),
        }
    }

    /// Same value for primitives, same allocation for reference values.
    /// Used by list reconciliation to decide whether an item changed.
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self.strict_equals(other),
        }
    }
}

/// Liveness probe for the allocation behind a reference value
pub struct WeakIdentity(WeakRef);

enum WeakRef {
    Array(Weak<Vec<Value>>),
    Object(Weak<Object>),
    Function(Weak<NativeFn>),
    // Signals expose no weak handle; the registry keeps them alive
    Signal(Signal<Value>),
}

impl WeakIdentity {
    pub fn is_alive(&self) -> bool {
        match &self.0 {
            WeakRef::Array(weak) => weak.strong_count() > 0,
            WeakRef::Object(weak) => weak.strong_count() > 0,
            WeakRef::Function(weak) => weak.strong_count() > 0,
            WeakRef::Signal(_) => true,
        }
    }
}

impl Value {
    /// Weak handle for reference values, `None` for primitives
    pub fn weak_identity(&self) -> Option<WeakIdentity> {
        let weak = match self {
            Value::Array(items) => WeakRef::Array(Rc::downgrade(items)),
            Value::Object(fields) => WeakRef::Object(Rc::downgrade(fields)),
            Value::Function(callable) => WeakRef::Function(Rc::downgrade(&callable.func)),
            Value::Signal(signal) => WeakRef::Signal(signal.clone()),
            _ => return None,
        };
        Some(WeakIdentity(weak))
    }
}

/// Canonical array index: no sign, no leading zero, below 2^32 - 1
fn parse_index(key: &str) -> Option<usize> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if key.len() > 1 && key.starts_with('0') {
        return None;
    }
    key.parse::<u32>()
        .ok()
        .filter(|index| *index < u32::MAX)
        .map(|index| index as usize)
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim().trim_matches('\u{feff}');
    if trimmed.is_empty() {
        return 0.0;
    }
    let radix = match trimmed.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        return parse_radix(&trimmed[2..], radix);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => trimmed.parse().unwrap_or(f64::NAN),
    }
}

fn parse_radix(digits: &str, radix: u32) -> f64 {
    if digits.is_empty() {
        return f64::NAN;
    }
    digits
        .chars()
        .try_fold(0.0, |acc: f64, c| {
            c.to_digit(radix).map(|digit| acc * radix as f64 + digit as f64)
        })
        .unwrap_or(f64::NAN)
}

/// Shortest round-trip digits, switching to exponent form outside [1e-6, 1e21)
fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if !(1e-6..1e21).contains(&magnitude) {
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{}e+{}", mantissa, exponent)
            }
            _ => formatted,
        };
    }
    n.to_string()
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Number(n) => Value::Number(*n),
            Literal::String(s) => Value::string(s),
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Null => Value::Null,
            Literal::Undefined => Value::Undefined,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::string(s),
            serde_json::Value::Array(items) => Value::array(items.into_iter().map(Value::from)),
            serde_json::Value::Object(fields) => {
                Value::object(fields.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl PartialEq for Value {
    /// Structural equality for plain data; identity for callables, symbols and signals
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b) || a == b,
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Boolean(b) => write!(f, "Boolean({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(fields) => f.debug_map().entries(fields.iter()).finish(),
            Value::Function(callable) => write!(f, "Function({})", callable.name()),
            Value::Symbol(symbol) => write!(f, "Symbol({}#{})", symbol.description(), symbol.id()),
            Value::Signal(signal) => write!(f, "{:?}", signal),
        }
    }
}
