//! The `each` list directive and the pieces every list flavor shares.
//!
//! ```html
//! <ul each="todo in todos" key="id">
//!   <li>{$index}: {todo.title}</li>
//! </ul>
//! ```
//!
//! The container's children become the row template. They are detached on
//! mount and cloned once per item, in front of an end-anchor comment.

use crate::error::{DirectiveError, DirectiveResult};
use crate::key::{assign_keys, KeyPolicy};
use crate::mount::{mount_subtree, MountContext};
use crate::reconciler::{CreateRequest, InstanceFactory, KeyedItem, KeyedReconciler};
use std::cell::RefCell;
use std::rc::Rc;
use trellis_common::{create_effect, untrack, warn_once, DiagnosticKind, Scope};
use trellis_evaluator::{evaluate, Document, Environment, EvalFailure, NodeId, Value};
use trellis_parser::{parse_cached, Expr};

pub const DEFAULT_ALIAS: &str = "item";

/// `alias in source`, or a bare `source` bound to the default alias
#[derive(Debug, Clone)]
pub struct EachBinding {
    pub alias: String,
    pub source: String,
    pub expr: Rc<Expr>,
}

impl EachBinding {
    pub fn parse(attribute: &str, value: &str) -> DirectiveResult<Self> {
        let (alias, source) = match value.split_once(" in ") {
            Some((alias, source)) => (alias.trim(), source.trim()),
            None => (DEFAULT_ALIAS, value.trim()),
        };
        if !is_identifier(alias) {
            return Err(DirectiveError::invalid_binding(
                attribute,
                value,
                format!("`{}` is not a valid item alias", alias),
            ));
        }
        if source.is_empty() {
            return Err(DirectiveError::invalid_binding(
                attribute,
                value,
                "missing source expression",
            ));
        }
        let expr = parse_cached(source)?;
        Ok(Self {
            alias: alias.to_string(),
            source: source.to_string(),
            expr,
        })
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Detach the container's children as the row template and mark the
/// container bound
pub(crate) fn detach_template(doc: &mut Document, container: NodeId) -> Rc<[NodeId]> {
    let template: Vec<NodeId> = doc.children(container).to_vec();
    for node in &template {
        doc.remove(*node);
    }
    doc.mark_bound(container);
    template.into()
}

/// [`detach_template`] plus an end-anchor comment. Returns `(template, anchor)`.
pub(crate) fn take_template(doc: &mut Document, container: NodeId) -> (Rc<[NodeId]>, NodeId) {
    let template = detach_template(doc, container);
    let anchor = doc.create_comment("end each");
    doc.append_child(container, anchor);
    (template, anchor)
}

/// Read the source sequence, subscribing the running effect. Failures render
/// an empty list.
pub(crate) fn read_items(expr: &Expr, env: &Environment, site: &str) -> Vec<Value> {
    match evaluate(expr, env) {
        Ok(value) => sequence_items(&value.resolve(), site),
        Err(EvalFailure::MissingIdentifier { name }) => {
            warn_once(
                DiagnosticKind::MissingIdentifier,
                format!("{}:{}", site, name),
                format!("List source `{}` is not defined at {}", name, site),
            );
            Vec::new()
        }
        Err(err) => {
            warn_once(
                DiagnosticKind::Evaluation,
                site.to_string(),
                format!("List source failed at {}: {}", site, err),
            );
            Vec::new()
        }
    }
}

pub(crate) fn sequence_items(value: &Value, site: &str) -> Vec<Value> {
    if let Some(items) = value.as_array() {
        return items.to_vec();
    }
    if !value.is_nullish() {
        warn_once(
            DiagnosticKind::Evaluation,
            site.to_string(),
            format!(
                "List source at {} is {}, not an array; rendering nothing",
                site,
                value.type_name()
            ),
        );
    }
    Vec::new()
}

pub(crate) fn keyed_entries(items: Vec<Value>, policy: &KeyPolicy) -> Vec<KeyedItem> {
    let keys = assign_keys(&items, policy);
    keys.into_iter()
        .zip(items)
        .enumerate()
        .map(|(index, (key, item))| KeyedItem { key, item, index })
        .collect()
}

/// Free the detached template once `scope` is disposed
pub(crate) fn release_template(ctx: &MountContext, scope: &Scope, template: &Rc<[NodeId]>) {
    let dom = ctx.dom.clone();
    let template = template.clone();
    scope.on_cleanup(move || {
        let mut doc = dom.borrow_mut();
        for node in template.iter() {
            doc.release(*node);
        }
    });
}

/// Clones the template for each item and mounts the clone in the item scope
pub(crate) struct TemplateFactory {
    pub ctx: MountContext,
    pub template: Rc<[NodeId]>,
    pub env: Environment,
    pub alias: String,
    pub site: String,
}

impl TemplateFactory {
    pub fn clone_template(&self) -> Vec<NodeId> {
        let mut doc = self.ctx.dom.borrow_mut();
        self.template.iter().map(|node| doc.deep_clone(*node)).collect()
    }

    pub fn mount_clone(&self, nodes: &[NodeId], env: &Environment, scope: &Scope) {
        for node in nodes {
            if let Err(err) = mount_subtree(&self.ctx, *node, env, scope) {
                warn_once(
                    DiagnosticKind::Evaluation,
                    self.site.clone(),
                    format!("Row at {} was not mounted: {}", self.site, err),
                );
            }
        }
    }
}

impl InstanceFactory for TemplateFactory {
    fn create(&mut self, request: &CreateRequest<'_>) -> Vec<NodeId> {
        let env = request.meta.item_env(&self.env, &self.alias, request.item);
        let nodes = self.clone_template();
        self.mount_clone(&nodes, &env, request.scope);
        nodes
    }
}

/// Diagnostic site of a directive container
pub(crate) fn site_of(doc: &Document, container: NodeId, attribute: &str, value: &str) -> String {
    let path = doc
        .path_from(doc.root(), container)
        .unwrap_or_default()
        .iter()
        .map(|index| index.to_string())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{} {}=\"{}\"", doc.id(), path, attribute, value)
}

/// Mount a keyed list on `container`, reading its binding from `attribute`
pub(crate) fn mount_keyed_list(
    ctx: &MountContext,
    container: NodeId,
    env: &Environment,
    scope: &Scope,
    attribute: &str,
) -> DirectiveResult<()> {
    let (binding, policy, site) = {
        let doc = ctx.dom.borrow();
        let value = doc.attribute(container, attribute).unwrap_or_default().to_string();
        let binding = EachBinding::parse(attribute, &value)?;
        let policy = KeyPolicy::from_attribute(doc.attribute(container, "key"));
        let site = site_of(&doc, container, attribute, &value);
        (binding, policy, site)
    };
    let (template, anchor) = take_template(&mut ctx.dom.borrow_mut(), container);

    let list_scope = scope.child();
    release_template(ctx, &list_scope, &template);
    let factory = TemplateFactory {
        ctx: ctx.clone(),
        template,
        env: env.clone(),
        alias: binding.alias.clone(),
        site: site.clone(),
    };
    let reconciler = Rc::new(RefCell::new(KeyedReconciler::new(
        ctx.dom.clone(),
        container,
        anchor,
        list_scope.clone(),
        Box::new(factory),
    )));

    let effect = {
        let reconciler = reconciler.clone();
        let env = env.clone();
        create_effect(move || {
            let items = read_items(&binding.expr, &env, &site);
            untrack(|| {
                let count = items.len();
                let entries = keyed_entries(items, &policy);
                reconciler.borrow_mut().reconcile(&entries, count);
            });
        })
    };
    list_scope.own_effect(effect);
    list_scope.on_cleanup(move || {
        reconciler.borrow_mut().clear();
    });
    Ok(())
}

/// Handler for `each="alias in source"`
pub fn mount_list(
    ctx: &MountContext,
    container: NodeId,
    env: &Environment,
    scope: &Scope,
) -> DirectiveResult<()> {
    mount_keyed_list(ctx, container, env, scope, "each")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_forms() {
        let binding = EachBinding::parse("each", "todo in todos").unwrap();
        assert_eq!(binding.alias, "todo");
        assert_eq!(binding.source, "todos");

        let bare = EachBinding::parse("each", "store.rows").unwrap();
        assert_eq!(bare.alias, DEFAULT_ALIAS);
        assert_eq!(bare.source, "store.rows");
    }

    #[test]
    fn test_invalid_bindings() {
        assert!(matches!(
            EachBinding::parse("each", "1x in rows"),
            Err(DirectiveError::InvalidBinding { .. })
        ));
        assert!(matches!(
            EachBinding::parse("each", "row in "),
            Err(DirectiveError::InvalidBinding { .. })
        ));
        assert!(matches!(
            EachBinding::parse("each", "row in rows +"),
            Err(DirectiveError::Parse(_))
        ));
    }

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("row"));
        assert!(is_identifier("$row_2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a-b"));
    }

    #[test]
    fn test_row_mount_failure_is_reported() {
        use trellis_common::{diagnostics_of, reset_diagnostics};
        use trellis_evaluator::Markup;

        reset_diagnostics();
        let dom = Document::new("doc", "/").into_handle();
        let row = dom
            .borrow_mut()
            .instantiate(&Markup::element("li").child(Markup::text("{item}")));
        let factory = TemplateFactory {
            ctx: MountContext::new(dom.clone()),
            template: Rc::from(vec![row]),
            env: Environment::new(),
            alias: DEFAULT_ALIAS.to_string(),
            site: "doc/0 each=\"item in items\"".to_string(),
        };

        let scope = Scope::new();
        scope.dispose();
        let nodes = factory.clone_template();
        factory.mount_clone(&nodes, &Environment::new(), &scope);

        let warnings = diagnostics_of(DiagnosticKind::Evaluation);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].key, "doc/0 each=\"item in items\"");
        assert!(!dom.borrow().is_bound(nodes[0]));
    }
}
