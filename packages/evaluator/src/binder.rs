//! Binding a subtree's interpolation points to an environment.

use crate::dom::{DomHandle, NodeId};
use crate::environment::Environment;
use crate::interpolation::{render_segments, segments_depend_on_reactive, Segment};
use crate::plan::{plan_for, resolve, PlanTarget, TemplatePlan};
use std::rc::Rc;
use tracing::{instrument, trace};
use trellis_common::{create_effect, untrack, Scope};

#[derive(Debug, Clone)]
pub struct TextBinding {
    pub plan: Rc<TemplatePlan>,
    /// Points that re-render when a reactive source changes
    pub reactive_bindings: usize,
    /// Points rendered once
    pub static_bindings: usize,
}

struct BindTarget {
    node: NodeId,
    target: PlanTarget,
    segments: Rc<[Segment]>,
    site: String,
}

/// Bind every interpolation point under `root` and mark `root` bound.
///
/// Points reading a reactive source get an effect owned by `scope`; the rest
/// are rendered once without subscribing to anything.
#[instrument(level = "debug", skip_all, fields(root = ?root))]
pub fn bind_interpolations(
    dom: &DomHandle,
    root: NodeId,
    env: &Environment,
    scope: &Scope,
) -> TextBinding {
    let (plan, targets) = {
        let doc = dom.borrow();
        let plan = plan_for(&doc, root);
        let targets: Vec<BindTarget> = resolve(&plan, &doc, root)
            .unwrap_or_default()
            .into_iter()
            .map(|(node, entry)| BindTarget {
                node,
                target: entry.target.clone(),
                segments: entry.segments.clone(),
                site: format!("{}{}", doc.id(), entry.site()),
            })
            .collect();
        (plan, targets)
    };
    dom.borrow_mut().mark_bound(root);

    let mut reactive_bindings = 0;
    let mut static_bindings = 0;

    for BindTarget {
        node,
        target,
        segments,
        site,
    } in targets
    {
        if segments_depend_on_reactive(&segments, env) {
            reactive_bindings += 1;
            let dom = dom.clone();
            let env = env.clone();
            let effect = create_effect(move || {
                let rendered = render_segments(&segments, &env, &site);
                write_target(&dom, node, &target, rendered);
            });
            scope.own_effect(effect);
        } else {
            static_bindings += 1;
            let rendered = untrack(|| render_segments(&segments, env, &site));
            write_target(dom, node, &target, rendered);
        }
    }

    trace!(reactive_bindings, static_bindings, "Bound interpolations");
    TextBinding {
        plan,
        reactive_bindings,
        static_bindings,
    }
}

fn write_target(dom: &DomHandle, node: NodeId, target: &PlanTarget, rendered: String) {
    let mut doc = dom.borrow_mut();
    match target {
        PlanTarget::Text => doc.set_text(node, rendered),
        PlanTarget::Attribute(name) => doc.set_attribute(node, name, rendered),
    }
}
