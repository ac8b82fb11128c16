//! Immutable environment chain.
//!
//! Each frame owns its own bindings and an optional link to its parent. A child
//! never writes into an ancestor; shadowing happens by adding a frame.

use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

struct Frame {
    bindings: BTreeMap<String, Value>,
    parent: Option<Environment>,
}

#[derive(Clone)]
pub struct Environment {
    frame: Rc<Frame>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::from_bindings(BTreeMap::new())
    }

    pub fn from_bindings(bindings: BTreeMap<String, Value>) -> Self {
        Self {
            frame: Rc::new(Frame {
                bindings,
                parent: None,
            }),
        }
    }

    /// Push a child frame holding `bindings`
    pub fn extend<K: Into<String>>(&self, bindings: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self {
            frame: Rc::new(Frame {
                bindings: bindings.into_iter().map(|(k, v)| (k.into(), v)).collect(),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Copy of the top frame with one binding added or replaced
    pub fn with(&self, name: impl Into<String>, value: Value) -> Self {
        let mut bindings = self.frame.bindings.clone();
        bindings.insert(name.into(), value);
        Self {
            frame: Rc::new(Frame {
                bindings,
                parent: self.frame.parent.clone(),
            }),
        }
    }

    /// Walk the chain from the innermost frame outwards
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut current = Some(self);
        while let Some(env) = current {
            if let Some(value) = env.frame.bindings.get(name) {
                return Some(value.clone());
            }
            current = env.frame.parent.as_ref();
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Number of frames, including this one
    pub fn depth(&self) -> usize {
        1 + self.frame.parent.as_ref().map_or(0, Environment::depth)
    }

    /// Every visible name, shadowed names listed once
    pub fn names(&self) -> BTreeSet<String> {
        let mut names = self
            .frame
            .parent
            .as_ref()
            .map(Environment::names)
            .unwrap_or_default();
        names.extend(self.frame.bindings.keys().cloned());
        names
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.frame.parent.as_ref()
    }

    pub fn own_bindings(&self) -> &BTreeMap<String, Value> {
        &self.frame.bindings
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self::from_bindings(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("bindings", &self.frame.bindings)
            .field("parent", &self.frame.parent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_shadows_without_mutating_parent() {
        let root: Environment = [("item", Value::string("outer")), ("title", Value::string("T"))]
            .into_iter()
            .collect();
        let child = root.extend([("item", Value::string("inner"))]);

        assert_eq!(child.lookup("item"), Some(Value::string("inner")));
        assert_eq!(child.lookup("title"), Some(Value::string("T")));
        assert_eq!(root.lookup("item"), Some(Value::string("outer")));
        assert_eq!(child.depth(), 2);
        assert_eq!(child.parent().map(Environment::depth), Some(1));
    }

    #[test]
    fn test_with_replaces_top_frame_binding() {
        let root = Environment::new().extend([("a", Value::Number(1.0))]);
        let updated = root.with("a", Value::Number(2.0)).with("b", Value::Null);

        assert_eq!(root.lookup("a"), Some(Value::Number(1.0)));
        assert_eq!(updated.lookup("a"), Some(Value::Number(2.0)));
        assert_eq!(updated.depth(), root.depth());
        assert!(updated.contains("b"));
        assert!(!updated.contains("c"));
    }

    #[test]
    fn test_names_cover_the_chain() {
        let env = Environment::new()
            .extend([("x", Value::Null)])
            .extend([("y", Value::Null), ("x", Value::Undefined)]);
        let names: Vec<_> = env.names().into_iter().collect();
        assert_eq!(names, vec!["x".to_string(), "y".to_string()]);
    }
}
