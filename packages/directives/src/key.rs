//! Key policies and key tags.
//!
//! A key tag is the string identity the reconciler matches instances by. Tags
//! carry a type prefix so `1` and `"1"` never collide:
//!
//! | value            | tag            |
//! |------------------|----------------|
//! | string           | `s:<text>`     |
//! | number           | `n:<number>`   |
//! | boolean          | `b:<bool>`     |
//! | null / undefined | `null` / `undefined` |
//! | symbol           | `y:<id>`       |
//! | object, array, function, signal | `o:#<id>` |
//!
//! Reference values get an id from a session-wide registry, stable for as long
//! as the allocation lives.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use trellis_common::{warn_once, DiagnosticKind};
use trellis_evaluator::{Value, WeakIdentity};

/// Rule for deriving an item's key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPolicy {
    /// Named field of the item
    Field(String),
    /// Position in the source (`$index`)
    Index,
    /// The item itself (`$item`)
    Item,
    /// `id` field, then `key` field, then position
    Default,
}

impl KeyPolicy {
    pub fn from_attribute(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => KeyPolicy::Default,
            Some("$index") => KeyPolicy::Index,
            Some("$item") => KeyPolicy::Item,
            Some(field) => KeyPolicy::Field(field.to_string()),
        }
    }

    pub fn key_for(&self, item: &Value, index: usize) -> String {
        match self {
            KeyPolicy::Field(name) => key_tag(&item.get_property(name)),
            KeyPolicy::Index => index_tag(index),
            KeyPolicy::Item => key_tag(item),
            KeyPolicy::Default => ["id", "key"]
                .iter()
                .map(|field| item.get_property(field))
                .find(|value| !value.is_nullish())
                .map(|value| key_tag(&value))
                .unwrap_or_else(|| index_tag(index)),
        }
    }
}

impl fmt::Display for KeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPolicy::Field(name) => write!(f, "field:{}", name),
            KeyPolicy::Index => f.write_str("$index"),
            KeyPolicy::Item => f.write_str("$item"),
            KeyPolicy::Default => f.write_str("default"),
        }
    }
}

fn index_tag(index: usize) -> String {
    format!("n:{}", index)
}

pub fn key_tag(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Boolean(b) => format!("b:{}", b),
        Value::Number(_) => format!("n:{}", value.to_display_string()),
        Value::String(s) => format!("s:{}", s),
        Value::Symbol(symbol) => format!("y:{}", symbol.id()),
        Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Signal(_) => {
            format!("o:#{}", identity_id(value))
        }
    }
}

/// Keys for a whole source sequence. Duplicates are suffixed with their
/// position and reported, so every item keeps an instance.
pub fn assign_keys(items: &[Value], policy: &KeyPolicy) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let key = policy.key_for(item, index);
            if seen.insert(key.clone()) {
                return key;
            }
            warn_once(
                DiagnosticKind::DuplicateKey,
                key.clone(),
                format!(
                    "Duplicate key {} at index {} ({}); disambiguating by position",
                    key, index, policy
                ),
            );
            let mut unique = format!("{}#{}", key, index);
            while !seen.insert(unique.clone()) {
                unique.push('#');
            }
            unique
        })
        .collect()
}

const PRUNE_INTERVAL: usize = 1024;

#[derive(Default)]
struct IdentityRegistry {
    next_id: u64,
    entries: HashMap<usize, (u64, WeakIdentity)>,
    inserts_since_prune: usize,
}

impl IdentityRegistry {
    fn id_for(&mut self, value: &Value) -> u64 {
        let (Some(addr), Some(weak)) = (value.identity_addr(), value.weak_identity()) else {
            return 0;
        };
        if let Some((id, existing)) = self.entries.get(&addr) {
            if existing.is_alive() {
                return *id;
            }
        }

        self.inserts_since_prune += 1;
        if self.inserts_since_prune >= PRUNE_INTERVAL {
            self.entries.retain(|_, (_, weak)| weak.is_alive());
            self.inserts_since_prune = 0;
        }

        self.next_id += 1;
        self.entries.insert(addr, (self.next_id, weak));
        self.next_id
    }
}

thread_local! {
    static IDENTITIES: RefCell<IdentityRegistry> = RefCell::new(IdentityRegistry::default());
}

fn identity_id(value: &Value) -> u64 {
    IDENTITIES.with(|registry| registry.borrow_mut().id_for(value))
}

/// Forget every assigned object identity
pub fn reset_identity_registry() {
    IDENTITIES.with(|registry| *registry.borrow_mut() = IdentityRegistry::default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_common::{diagnostics_of, reset_diagnostics};
    use trellis_evaluator::Symbol;

    #[test]
    fn test_tags_distinguish_types() {
        assert_eq!(key_tag(&Value::Number(1.0)), "n:1");
        assert_eq!(key_tag(&Value::string("1")), "s:1");
        assert_eq!(key_tag(&Value::Boolean(true)), "b:true");
        assert_eq!(key_tag(&Value::Null), "null");
        assert_eq!(key_tag(&Value::Undefined), "undefined");

        let a = Symbol::new("k");
        let b = Symbol::new("k");
        assert_ne!(key_tag(&Value::Symbol(a)), key_tag(&Value::Symbol(b)));
    }

    #[test]
    fn test_object_identity_is_stable() {
        let obj = Value::object([("x", Value::Number(1.0))]);
        let same = obj.clone();
        let twin = Value::object([("x", Value::Number(1.0))]);

        assert_eq!(key_tag(&obj), key_tag(&same));
        assert_ne!(key_tag(&obj), key_tag(&twin));
        assert!(key_tag(&obj).starts_with("o:#"));
    }

    #[test]
    fn test_default_policy_prefers_id_then_key_then_index() {
        let policy = KeyPolicy::from_attribute(None);
        assert_eq!(policy, KeyPolicy::Default);
        assert_eq!(
            policy.key_for(&Value::object([("id", Value::Number(4.0))]), 0),
            "n:4"
        );
        assert_eq!(
            policy.key_for(&Value::object([("key", Value::string("a"))]), 0),
            "s:a"
        );
        assert_eq!(policy.key_for(&Value::string("plain"), 3), "n:3");
    }

    #[test]
    fn test_reserved_policies() {
        assert_eq!(KeyPolicy::from_attribute(Some("$index")), KeyPolicy::Index);
        assert_eq!(KeyPolicy::from_attribute(Some("$item")), KeyPolicy::Item);
        assert_eq!(
            KeyPolicy::from_attribute(Some(" slug ")),
            KeyPolicy::Field("slug".to_string())
        );
        assert_eq!(KeyPolicy::Item.key_for(&Value::string("x"), 9), "s:x");
    }

    #[test]
    fn test_duplicates_are_disambiguated() {
        reset_diagnostics();
        let items = [
            Value::object([("id", Value::Number(1.0))]),
            Value::object([("id", Value::Number(1.0))]),
            Value::object([("id", Value::Number(2.0))]),
        ];
        let keys = assign_keys(&items, &KeyPolicy::Default);
        assert_eq!(keys, vec!["n:1", "n:1#1", "n:2"]);
        assert_eq!(diagnostics_of(DiagnosticKind::DuplicateKey).len(), 1);
    }
}
