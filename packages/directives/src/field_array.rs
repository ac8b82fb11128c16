//! Array-backed form rows.
//!
//! ```html
//! <fieldset field-array="order.lines" as="line" key="id">
//!   <input field="sku">
//!   <span field-error="sku"></span>
//!   <div field-array="notes">...</div>
//! </fieldset>
//! ```
//!
//! Each row gets a `$path` of `<array>.<index>`. Inside a row, `field`
//! elements are named `<path>.<field>`, `field-error` elements get the id
//! `<path>.<field>-error`, and nested arrays get
//! `data-array-path="<path>.<nested>"` and read their items from `$item`.
//! Paths follow the row's current index, so a reorder rewrites them in place.

use crate::error::{DirectiveError, DirectiveResult};
use crate::key::KeyPolicy;
use crate::list::{
    is_identifier, keyed_entries, read_items, release_template, sequence_items, site_of,
    take_template, TemplateFactory, DEFAULT_ALIAS,
};
use crate::mount::MountContext;
use crate::reconciler::{CreateRequest, InstanceFactory, KeyedReconciler};
use std::cell::RefCell;
use std::rc::Rc;
use trellis_common::{create_effect, untrack, Scope, Signal};
use trellis_evaluator::{Document, DomHandle, Environment, NodeId, Value};
use trellis_parser::{parse_cached, Expr};

pub const ITEM_BINDING: &str = "$item";
pub const PATH_BINDING: &str = "$path";

enum PathRewrite {
    /// `name="<path>.<field>"`, plus a live `value`
    Field(String),
    /// `id="<path>.<field>-error"`
    Error(String),
    /// `data-array-path="<path>.<nested>"`
    NestedArray(String),
}

/// Where the rows come from
enum ArraySource {
    /// Top-level array read from the environment
    Expression { expr: Rc<Expr>, prefix: String },
    /// Field of the enclosing row's `$item`
    Nested {
        field: String,
        parent_item: Value,
        parent_path: Signal<Value>,
    },
}

impl ArraySource {
    fn items(&self, env: &Environment, site: &str) -> Vec<Value> {
        match self {
            ArraySource::Expression { expr, .. } => read_items(expr, env, site),
            ArraySource::Nested {
                field, parent_item, ..
            } => sequence_items(&parent_item.resolve().get_property(field).resolve(), site),
        }
    }

    /// Path prefix of the rows; tracked when nested
    fn prefix(&self) -> String {
        match self {
            ArraySource::Expression { prefix, .. } => prefix.clone(),
            ArraySource::Nested {
                field, parent_path, ..
            } => format!("{}.{}", parent_path.get().to_display_string(), field),
        }
    }
}

struct FieldArrayFactory {
    template: TemplateFactory,
    source: Rc<ArraySource>,
}

impl InstanceFactory for FieldArrayFactory {
    fn create(&mut self, request: &CreateRequest<'_>) -> Vec<NodeId> {
        let path = Signal::new(Value::string(format!(
            "{}.{}",
            untrack(|| self.source.prefix()),
            request.index
        )));
        let env = request
            .meta
            .item_env(&self.template.env, &self.template.alias, request.item)
            .extend([
                (ITEM_BINDING, request.item.clone()),
                (PATH_BINDING, Value::Signal(path.clone())),
            ]);

        let nodes = self.template.clone_template();
        let rewrites = collect_rewrites(&self.template.ctx.dom.borrow(), &nodes);
        self.template.mount_clone(&nodes, &env, request.scope);

        let dom = self.template.ctx.dom.clone();
        let source = self.source.clone();
        let index = request.meta.index.clone();
        let field_nodes: Vec<(NodeId, String)> = rewrites
            .iter()
            .filter_map(|(node, rewrite)| match rewrite {
                PathRewrite::Field(field) => Some((*node, field.clone())),
                _ => None,
            })
            .collect();

        let effect = create_effect(move || {
            let current = format!("{}.{}", source.prefix(), index.get().to_display_string());
            path.set_if_changed(Value::string(current.as_str()));
            write_paths(&dom, &rewrites, &current);
        });
        request.scope.own_effect(effect);

        for (node, field) in field_nodes {
            let dom = self.template.ctx.dom.clone();
            let item = request.item.clone();
            let effect = create_effect(move || {
                let value = item.resolve().get_property(&field).resolve();
                let text = if value.is_nullish() {
                    String::new()
                } else {
                    value.to_display_string()
                };
                dom.borrow_mut().set_attribute(node, "value", text);
            });
            request.scope.own_effect(effect);
        }
        nodes
    }
}

/// Path-bearing elements of one row, not descending into nested arrays
fn collect_rewrites(doc: &Document, roots: &[NodeId]) -> Vec<(NodeId, PathRewrite)> {
    let mut rewrites = Vec::new();
    let mut stack: Vec<NodeId> = roots.iter().rev().copied().collect();
    while let Some(node) = stack.pop() {
        if !doc.is_element(node) {
            continue;
        }
        if let Some(nested) = doc.attribute(node, "field-array") {
            rewrites.push((node, PathRewrite::NestedArray(nested.to_string())));
            continue;
        }
        if let Some(field) = doc.attribute(node, "field") {
            rewrites.push((node, PathRewrite::Field(field.to_string())));
        }
        if let Some(field) = doc.attribute(node, "field-error") {
            rewrites.push((node, PathRewrite::Error(field.to_string())));
        }
        stack.extend(doc.children(node).iter().rev().copied());
    }
    rewrites
}

fn write_paths(dom: &DomHandle, targets: &[(NodeId, PathRewrite)], path: &str) {
    let mut doc = dom.borrow_mut();
    for (node, rewrite) in targets {
        match rewrite {
            PathRewrite::Field(field) => {
                doc.set_attribute(*node, "name", format!("{}.{}", path, field))
            }
            PathRewrite::Error(field) => {
                doc.set_attribute(*node, "id", format!("{}.{}-error", path, field))
            }
            PathRewrite::NestedArray(nested) => {
                doc.set_attribute(*node, "data-array-path", format!("{}.{}", path, nested))
            }
        }
    }
}

/// Handler for `field-array="path"`
pub fn mount_field_array(
    ctx: &MountContext,
    container: NodeId,
    env: &Environment,
    scope: &Scope,
) -> DirectiveResult<()> {
    let (value, alias, policy, site) = {
        let doc = ctx.dom.borrow();
        let value = doc
            .attribute(container, "field-array")
            .unwrap_or_default()
            .trim()
            .to_string();
        let alias = doc
            .attribute(container, "as")
            .map(str::trim)
            .unwrap_or(DEFAULT_ALIAS)
            .to_string();
        let policy = KeyPolicy::from_attribute(doc.attribute(container, "key"));
        let site = site_of(&doc, container, "field-array", &value);
        (value, alias, policy, site)
    };
    if !is_identifier(&alias) {
        return Err(DirectiveError::invalid_binding(
            "as",
            alias.as_str(),
            "not a valid item alias",
        ));
    }
    if value.is_empty() {
        return Err(DirectiveError::invalid_binding(
            "field-array",
            value.as_str(),
            "missing array path",
        ));
    }

    let source = match (env.lookup(ITEM_BINDING), env.lookup(PATH_BINDING)) {
        (Some(parent_item), Some(Value::Signal(parent_path))) => ArraySource::Nested {
            field: value.clone(),
            parent_item,
            parent_path,
        },
        _ => ArraySource::Expression {
            expr: parse_cached(&value)?,
            prefix: value.clone(),
        },
    };
    let source = Rc::new(source);
    let (template, anchor) = take_template(&mut ctx.dom.borrow_mut(), container);

    let list_scope = scope.child();
    release_template(ctx, &list_scope, &template);
    let factory = FieldArrayFactory {
        template: TemplateFactory {
            ctx: ctx.clone(),
            template,
            env: env.clone(),
            alias,
            site: site.clone(),
        },
        source: source.clone(),
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
            let items = source.items(&env, &site);
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
