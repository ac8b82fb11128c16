//! Closed set of list directives and the handlers that mount them.
//!
//! A node is a directive site when it carries one of the registered
//! attributes. When several are present the earliest entry of [`REGISTRY`]
//! wins, so a `virtual-list` container is never also mounted as a plain list.

use crate::error::DirectiveResult;
use crate::field_array::mount_field_array;
use crate::list::mount_list;
use crate::mount::MountContext;
use crate::window::mount_virtual_list;
use std::fmt;
use trellis_common::Scope;
use trellis_evaluator::{Document, Environment, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    VirtualList,
    FieldArray,
    List,
}

impl DirectiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectiveKind::VirtualList => "virtual-list",
            DirectiveKind::FieldArray => "field-array",
            DirectiveKind::List => "list",
        }
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type MountFn = fn(&MountContext, NodeId, &Environment, &Scope) -> DirectiveResult<()>;

pub struct DirectiveHandler {
    pub kind: DirectiveKind,
    /// Attribute that marks a site and carries the binding
    pub attribute: &'static str,
    pub mount: MountFn,
}

impl fmt::Debug for DirectiveHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveHandler")
            .field("kind", &self.kind)
            .field("attribute", &self.attribute)
            .finish()
    }
}

/// Handlers in precedence order
pub static REGISTRY: [DirectiveHandler; 3] = [
    DirectiveHandler {
        kind: DirectiveKind::VirtualList,
        attribute: "virtual-list",
        mount: mount_virtual_list,
    },
    DirectiveHandler {
        kind: DirectiveKind::FieldArray,
        attribute: "field-array",
        mount: mount_field_array,
    },
    DirectiveHandler {
        kind: DirectiveKind::List,
        attribute: "each",
        mount: mount_list,
    },
];

/// Handler for `node`, if it is a directive site
pub fn resolve(doc: &Document, node: NodeId) -> Option<&'static DirectiveHandler> {
    if !doc.is_element(node) {
        return None;
    }
    REGISTRY
        .iter()
        .find(|handler| doc.has_attribute(node, handler.attribute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_evaluator::Markup;

    #[test]
    fn test_precedence() {
        let mut doc = Document::new("doc", "/");
        let root = doc.root();
        let both = doc.append_markup(
            root,
            &Markup::element("div")
                .attr("each", "rows")
                .attr("virtual-list", "rows"),
        );
        let plain = doc.append_markup(root, &Markup::element("ul").attr("each", "rows"));
        let text = doc.append_markup(root, &Markup::text("each"));

        assert_eq!(resolve(&doc, both).map(|h| h.kind), Some(DirectiveKind::VirtualList));
        assert_eq!(resolve(&doc, plain).map(|h| h.kind), Some(DirectiveKind::List));
        assert!(resolve(&doc, text).is_none());
        assert!(resolve(&doc, root).is_none());
    }
}
