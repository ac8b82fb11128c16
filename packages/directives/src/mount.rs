//! Mounting a subtree: directive sites first, then interpolation.

use crate::error::{DirectiveError, DirectiveResult};
use crate::measure::MeasureHost;
use crate::registry::{self, DirectiveHandler};
use crate::restore::configure_scroll_restore;
use crate::scheduler::{FrameScheduler, ManualScheduler};
use crate::window::WindowController;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, instrument};
use trellis_common::{warn_once, DiagnosticKind, RuntimeConfig, Scope};
use trellis_evaluator::{bind_interpolations, configure_plan_cache, DomHandle, Environment, NodeId};

/// Host services shared by every directive mounted from one root
#[derive(Clone)]
pub struct MountContext {
    pub dom: DomHandle,
    pub scheduler: Rc<dyn FrameScheduler>,
    pub measure: Option<Rc<dyn MeasureHost>>,
    pub config: RuntimeConfig,
    controllers: Rc<RefCell<HashMap<NodeId, WindowController>>>,
}

impl MountContext {
    pub fn new(dom: DomHandle) -> Self {
        Self {
            dom,
            scheduler: Rc::new(ManualScheduler::new()),
            measure: None,
            config: RuntimeConfig::active(),
            controllers: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Rc<dyn FrameScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_measure_host(mut self, host: Rc<dyn MeasureHost>) -> Self {
        self.measure = Some(host);
        self
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Mount everything under `root` in a fresh scope
    pub fn mount(&self, root: NodeId, env: &Environment) -> DirectiveResult<Mounted> {
        let scope = Scope::new();
        mount_subtree(self, root, env, &scope)?;
        Ok(Mounted { root, scope })
    }

    /// Controller of the windowed list mounted on `container`
    pub fn controller(&self, container: NodeId) -> DirectiveResult<WindowController> {
        self.controllers
            .borrow()
            .get(&container)
            .cloned()
            .ok_or(DirectiveError::UnknownContainer(container))
    }

    pub(crate) fn register_controller(&self, container: NodeId, controller: WindowController) {
        self.controllers.borrow_mut().insert(container, controller);
    }

    pub(crate) fn unregister_controller(&self, container: NodeId) {
        self.controllers.borrow_mut().remove(&container);
    }
}

#[derive(Debug)]
pub struct Mounted {
    root: NodeId,
    scope: Scope,
}

impl Mounted {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Dispose every binding, instance and pending frame under the root
    pub fn unmount(&self) {
        self.scope.dispose();
    }
}

/// Mount directive sites under `root`, then bind the remaining interpolation
/// points. When `root` is itself a site, the directive owns the whole subtree.
#[instrument(level = "debug", skip_all, fields(root = ?root))]
pub fn mount_subtree(
    ctx: &MountContext,
    root: NodeId,
    env: &Environment,
    scope: &Scope,
) -> DirectiveResult<()> {
    if scope.is_disposed() {
        return Err(DirectiveError::Disposed);
    }

    let root_site = registry::resolve(&ctx.dom.borrow(), root);
    if let Some(handler) = root_site {
        mount_site(ctx, handler, root, env, scope);
        return Ok(());
    }

    let sites = collect_sites(ctx, root);
    for (node, handler) in sites {
        mount_site(ctx, handler, node, env, scope);
    }
    bind_interpolations(&ctx.dom, root, env, scope);
    Ok(())
}

/// Directive sites below `root` in document order, not descending into sites
/// or already bound subtrees
fn collect_sites(ctx: &MountContext, root: NodeId) -> Vec<(NodeId, &'static DirectiveHandler)> {
    let doc = ctx.dom.borrow();
    let mut sites = Vec::new();
    let mut stack: Vec<NodeId> = doc.children(root).iter().rev().copied().collect();
    while let Some(node) = stack.pop() {
        if doc.is_bound(node) {
            continue;
        }
        if let Some(handler) = registry::resolve(&doc, node) {
            sites.push((node, handler));
            continue;
        }
        stack.extend(doc.children(node).iter().rev().copied());
    }
    sites
}

fn mount_site(
    ctx: &MountContext,
    handler: &'static DirectiveHandler,
    node: NodeId,
    env: &Environment,
    scope: &Scope,
) {
    debug!(kind = %handler.kind, node = ?node, "Mounting directive");
    if let Err(err) = (handler.mount)(ctx, node, env, scope) {
        let (doc_id, value) = {
            let doc = ctx.dom.borrow();
            let value = doc.attribute(node, handler.attribute).unwrap_or_default().to_string();
            (doc.id().to_string(), value)
        };
        let kind = match &err {
            DirectiveError::Parse(_) => DiagnosticKind::Parse,
            DirectiveError::InvalidVirtualConfig { .. } => DiagnosticKind::VirtualizationConfig,
            _ => DiagnosticKind::Evaluation,
        };
        warn_once(
            kind,
            format!("{}:{}={}", doc_id, handler.attribute, value),
            format!("{} directive was not mounted: {}", handler.kind, err),
        );
        // Keep the unmounted template out of the enclosing interpolation pass
        ctx.dom.borrow_mut().mark_bound(node);
    }
}

/// Install `config` as the active configuration and resize the shared caches
pub fn apply_config(config: &RuntimeConfig) {
    configure_plan_cache(config.plan_cache.max_entries, config.plan_cache.ttl_ms);
    configure_scroll_restore(config.scroll_restore.capacity);
    config.install();
}
