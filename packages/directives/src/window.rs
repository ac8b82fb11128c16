//! # Windowed lists
//!
//! ```html
//! <div virtual-list="row in rows" item-height="24" overscan="4" viewport-height="480">
//!   <div class="row">{row.title}</div>
//! </div>
//! ```
//!
//! Only rows intersecting the viewport, widened by `overscan` rows on each
//! side, have a live instance. A top and a bottom spacer stand in for the
//! rest, sized from a [`HeightIndex`]:
//!
//! ```text
//! container
//! ├── spacer      prefix(start)
//! ├── rows        start..end
//! └── spacer      total - prefix(end)   (reconciler anchor)
//! ```
//!
//! Row heights are either fixed (`item-height`) or measured (`measure="auto"`
//! with an optional `estimated-height`). Measured rows are observed through the
//! context's [`MeasureHost`](crate::measure::MeasureHost); resize reports that
//! move a row by more than the configured threshold update the index.
//!
//! Scroll and resize notifications never render synchronously. They set one
//! pending frame, so a burst of events costs one pass. Hosts without frame
//! callbacks get a timer instead.
//!
//! A missing or malformed height configuration mounts the container as a
//! plain keyed list instead, with a warning.

use crate::error::{DirectiveError, DirectiveResult};
use crate::height_index::HeightIndex;
use crate::key::{assign_keys, KeyPolicy};
use crate::list::{
    detach_template, mount_keyed_list, read_items, release_template, site_of, EachBinding,
    TemplateFactory,
};
use crate::mount::MountContext;
use crate::reconciler::{KeyedItem, KeyedReconciler};
use crate::restore::{restored_scroll, save_scroll, RestoreKey};
use crate::scheduler::{Task, TaskHandle};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashSet;
use std::ops::Range;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};
use trellis_common::{create_effect, untrack, warn_once, DiagnosticKind, Scope, WindowConfig};
use trellis_evaluator::{evaluate, Document, Environment, NodeId, Value};
use trellis_parser::{parse_cached, Expr};

pub const ATTRIBUTE: &str = "virtual-list";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowHeight {
    Fixed(f64),
    Measured { estimate: f64 },
}

impl RowHeight {
    pub fn estimate(&self) -> f64 {
        match self {
            RowHeight::Fixed(height) => *height,
            RowHeight::Measured { estimate } => *estimate,
        }
    }

    pub fn is_measured(&self) -> bool {
        matches!(self, RowHeight::Measured { .. })
    }
}

#[derive(Debug, Clone)]
pub struct WindowOptions {
    pub row_height: RowHeight,
    pub overscan: usize,
    /// Explicit viewport height; the container's client height otherwise
    pub viewport_height: Option<f64>,
    pub on_reach_end: Option<Rc<Expr>>,
}

impl WindowOptions {
    pub fn from_attributes(
        doc: &Document,
        container: NodeId,
        defaults: &WindowConfig,
    ) -> DirectiveResult<Self> {
        let item_height = positive_number(doc, container, "item-height")?;
        let estimated = positive_number(doc, container, "estimated-height")?;

        let row_height = match doc.attribute(container, "measure").map(str::trim) {
            Some("auto") => RowHeight::Measured {
                estimate: estimated
                    .or(item_height)
                    .unwrap_or(defaults.default_estimated_height),
            },
            Some(other) => {
                return Err(DirectiveError::invalid_virtual_config(format!(
                    "measure=\"{}\" is not supported; use measure=\"auto\"",
                    other
                )))
            }
            None => match item_height {
                Some(height) => RowHeight::Fixed(height),
                None => {
                    return Err(DirectiveError::invalid_virtual_config(
                        "an item-height or measure=\"auto\" is required",
                    ))
                }
            },
        };

        let overscan = match doc.attribute(container, "overscan") {
            None => defaults.default_overscan,
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                DirectiveError::invalid_virtual_config(format!(
                    "overscan=\"{}\" is not a row count",
                    raw
                ))
            })?,
        };

        let on_reach_end = doc
            .attribute(container, "on-reach-end")
            .and_then(|raw| match parse_cached(raw.trim()) {
                Ok(expr) => Some(expr),
                Err(err) => {
                    warn_once(
                        DiagnosticKind::Parse,
                        raw.to_string(),
                        format!("Ignoring on-reach-end=\"{}\": {}", raw, err),
                    );
                    None
                }
            });

        Ok(Self {
            row_height,
            overscan,
            viewport_height: positive_number(doc, container, "viewport-height")?,
            on_reach_end,
        })
    }
}

fn positive_number(doc: &Document, node: NodeId, name: &str) -> DirectiveResult<Option<f64>> {
    let Some(raw) = doc.attribute(node, name) else {
        return Ok(None);
    };
    match raw.trim().trim_end_matches("px").parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Ok(Some(value)),
        _ => Err(DirectiveError::invalid_virtual_config(format!(
            "{}=\"{}\" is not a positive number",
            name, raw
        ))),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Start,
    Center,
    End,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollBehavior {
    #[default]
    Instant,
    Smooth,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollOptions {
    pub align: Align,
    pub behavior: ScrollBehavior,
}

struct ReachEnd {
    expr: Rc<Expr>,
    env: Environment,
}

impl ReachEnd {
    fn invoke(&self) -> Result<(), String> {
        match evaluate(&self.expr, &self.env) {
            Ok(Value::Function(callable)) => callable
                .call(&[])
                .map(|_| ())
                .map_err(|err| err.to_string()),
            Ok(other) => Err(format!("expected a function, found {}", other.type_name())),
            Err(err) => Err(err.to_string()),
        }
    }
}

struct WindowState {
    ctx: MountContext,
    container: NodeId,
    top_spacer: NodeId,
    bottom_spacer: NodeId,
    options: WindowOptions,
    env: Environment,
    site: String,
    policy: KeyPolicy,
    heights: HeightIndex,
    items: Vec<Value>,
    keys: Vec<String>,
    reconciler: KeyedReconciler,
    range: Range<usize>,
    pending: Option<TaskHandle>,
    /// Item count the reach-end callback last fired for
    reach_end_fired_at: Option<usize>,
    measuring: bool,
    observed: HashSet<NodeId>,
    restore_key: RestoreKey,
    disposed: bool,
}

impl WindowState {
    fn set_items(&mut self, items: Vec<Value>) {
        let keys = assign_keys(&items, &self.policy);
        if keys != self.keys {
            self.heights.remap(&self.keys, &keys);
        }
        if keys.len() != self.keys.len() {
            self.reach_end_fired_at = None;
        }
        self.items = items;
        self.keys = keys;
    }

    fn viewport(&self, doc: &Document) -> f64 {
        self.options
            .viewport_height
            .unwrap_or_else(|| doc.layout(self.container).client_height)
            .max(0.0)
    }

    fn visible_range(&self, scroll_top: f64, viewport: f64) -> Range<usize> {
        let count = self.items.len();
        if count == 0 {
            return 0..0;
        }
        let start = self.heights.index_at_offset(scroll_top);
        let end = self
            .heights
            .lower_bound(scroll_top + viewport)
            .max(start + 1)
            .min(count);
        start.saturating_sub(self.options.overscan)..(end + self.options.overscan).min(count)
    }

    fn target_offset(&self, index: usize, align: Align, viewport: f64) -> f64 {
        let top = self.heights.prefix(index);
        let height = self.heights.height(index);
        let target = match align {
            Align::Start => top,
            Align::Center => top - (viewport - height) / 2.0,
            Align::End => top + height - viewport,
        };
        let max = (self.heights.total() - viewport).max(0.0);
        target.clamp(0.0, max)
    }

    /// One windowing pass: range, spacers, reconcile, observation
    fn render(&mut self) {
        if self.disposed {
            return;
        }
        let (scroll_top, viewport) = {
            let doc = self.ctx.dom.borrow();
            (doc.layout(self.container).scroll_top, self.viewport(&doc))
        };
        let range = self.visible_range(scroll_top, viewport);
        let top = self.heights.prefix(range.start);
        let bottom = self.heights.total() - self.heights.prefix(range.end);
        {
            let mut doc = self.ctx.dom.borrow_mut();
            set_spacer(&mut doc, self.top_spacer, top);
            set_spacer(&mut doc, self.bottom_spacer, bottom);
        }

        let entries: Vec<KeyedItem> = range
            .clone()
            .map(|index| KeyedItem {
                key: self.keys[index].clone(),
                item: self.items[index].clone(),
                index,
            })
            .collect();
        let stats = self.reconciler.reconcile(&entries, self.items.len());
        self.sync_observers();

        trace!(
            start = range.start,
            end = range.end,
            count = self.items.len(),
            top,
            bottom,
            created = stats.created,
            removed = stats.removed,
            "Windowing pass"
        );
        self.range = range;
    }

    /// Observe rows created since the last pass and drop rows that left
    fn sync_observers(&mut self) {
        if !self.measuring {
            return;
        }
        let Some(host) = self.ctx.measure.clone() else {
            return;
        };
        let doc = self.ctx.dom.borrow();
        let current: HashSet<NodeId> = self
            .reconciler
            .instances()
            .flat_map(|record| record.nodes.iter().copied())
            .filter(|node| doc.is_element(*node))
            .collect();
        drop(doc);
        for node in self.observed.difference(&current) {
            host.unobserve(*node);
        }
        let fresh: Vec<NodeId> = current.difference(&self.observed).copied().collect();
        for node in fresh {
            if let Err(err) = host.observe(node) {
                warn_once(
                    DiagnosticKind::Measurement,
                    self.site.clone(),
                    format!(
                        "Row measurement unavailable at {}: {}; using estimated heights",
                        self.site, err
                    ),
                );
                host.disconnect();
                self.observed.clear();
                self.measuring = false;
                return;
            }
        }
        self.observed = current;
    }

    fn reach_end_due(&self) -> bool {
        let count = self.items.len();
        self.options.on_reach_end.is_some()
            && count > 0
            && self.range.end == count
            && self.reach_end_fired_at != Some(count)
    }

    fn take_reach_end(&mut self) -> Option<ReachEnd> {
        if !self.reach_end_due() {
            return None;
        }
        self.reach_end_fired_at = Some(self.items.len());
        self.options.on_reach_end.clone().map(|expr| ReachEnd {
            expr,
            env: self.env.clone(),
        })
    }

    /// Rows whose measured height moved past the threshold
    fn apply_measurements(&mut self, nodes: &[NodeId]) -> usize {
        if !self.options.row_height.is_measured() || self.disposed {
            return 0;
        }
        let threshold = self.ctx.config.window.resize_threshold;
        let mut changed = 0;
        let doc = self.ctx.dom.borrow();
        for node in nodes {
            let Some(record) = self.reconciler.instance_for_node(*node) else {
                continue;
            };
            let index = record.meta.current_index();
            let measured: f64 = record
                .nodes
                .iter()
                .filter(|node| doc.is_element(**node))
                .map(|node| doc.layout(*node).height)
                .sum();
            if (measured - self.heights.height(index)).abs() > threshold {
                self.heights.set(index, measured);
                changed += 1;
            }
        }
        changed
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(handle) = self.pending.take() {
            self.ctx.scheduler.cancel(handle);
        }
        if let Some(host) = &self.ctx.measure {
            host.disconnect();
        }
        self.observed.clear();

        let scroll_top = self.ctx.dom.borrow().layout(self.container).scroll_top;
        save_scroll(self.restore_key.clone(), scroll_top);
        let removed = self.reconciler.clear();
        self.ctx.unregister_controller(self.container);
        debug!(container = ?self.container, removed, scroll_top, "Disposed windowed list");
    }
}

fn set_spacer(doc: &mut Document, spacer: NodeId, height: f64) {
    doc.set_height(spacer, height);
    doc.set_attribute(spacer, "style", format!("height: {}px", height));
}

/// Queue one pass unless one is already pending
fn schedule(state: &Rc<RefCell<WindowState>>) {
    let mut current = state.borrow_mut();
    if current.pending.is_some() || current.disposed {
        return;
    }
    let weak: Weak<RefCell<WindowState>> = Rc::downgrade(state);
    let task: Task = Box::new(move || {
        if let Some(state) = weak.upgrade() {
            run_frame(&state);
        }
    });
    let scheduler = current.ctx.scheduler.clone();
    let handle = if scheduler.supports_frames() {
        scheduler.request_frame(task)
    } else {
        scheduler.set_timeout(current.ctx.config.window.timer_fallback_ms, task)
    };
    current.pending = Some(handle);
}

fn run_frame(state: &Rc<RefCell<WindowState>>) {
    {
        let mut current = state.borrow_mut();
        current.pending = None;
        if current.disposed {
            return;
        }
    }
    run_pass(state);
}

/// Render, then fire the reach-end callback with no borrow held so it may
/// update the source
fn run_pass(state: &Rc<RefCell<WindowState>>) {
    let reach_end = untrack(|| {
        let mut current = state.borrow_mut();
        current.render();
        current.take_reach_end()
    });
    let Some(callback) = reach_end else {
        return;
    };
    if let Err(message) = untrack(|| callback.invoke()) {
        let mut current = state.borrow_mut();
        warn_once(
            DiagnosticKind::Callback,
            current.site.clone(),
            format!("on-reach-end failed at {}: {}", current.site, message),
        );
        current.reach_end_fired_at = None;
    }
}

/// Handle to one mounted windowed list
#[derive(Clone)]
pub struct WindowController {
    state: Rc<RefCell<WindowState>>,
}

impl WindowController {
    /// Scroll so row `index` sits at the requested edge; returns the target offset
    pub fn scroll_to_index(&self, index: usize, options: ScrollOptions) -> DirectiveResult<f64> {
        let (dom, container, target) = {
            let current = self.state.borrow();
            if current.disposed {
                return Err(DirectiveError::Disposed);
            }
            let len = current.items.len();
            if index >= len {
                return Err(DirectiveError::IndexOutOfRange { index, len });
            }
            let viewport = current.viewport(&current.ctx.dom.borrow());
            let target = current.target_offset(index, options.align, viewport);
            (current.ctx.dom.clone(), current.container, target)
        };

        match options.behavior {
            ScrollBehavior::Instant => {
                dom.borrow_mut().set_scroll_top(container, target);
                schedule(&self.state);
            }
            ScrollBehavior::Smooth => dom.borrow_mut().request_smooth_scroll(container, target),
        }
        Ok(target)
    }

    /// Re-run the windowing pass now, e.g. after the viewport changed size
    pub fn refresh(&self) {
        if self.is_disposed() {
            return;
        }
        run_pass(&self.state);
    }

    /// Host notification that the container scrolled
    pub fn on_scroll(&self) {
        schedule(&self.state);
    }

    /// Host notification that observed rows changed size. Returns how many
    /// rows moved past the threshold.
    pub fn handle_resize(&self, nodes: &[NodeId]) -> usize {
        let changed = self.state.borrow_mut().apply_measurements(nodes);
        if changed > 0 {
            schedule(&self.state);
        }
        changed
    }

    pub fn visible_range(&self) -> Range<usize> {
        self.state.borrow().range.clone()
    }

    /// `(top, bottom)` spacer heights of the last pass
    pub fn spacer_heights(&self) -> (f64, f64) {
        let current = self.state.borrow();
        let doc = current.ctx.dom.borrow();
        (
            doc.layout(current.top_spacer).height,
            doc.layout(current.bottom_spacer).height,
        )
    }

    pub fn total_height(&self) -> f64 {
        self.state.borrow().heights.total()
    }

    pub fn row_height(&self, index: usize) -> f64 {
        self.state.borrow().heights.height(index)
    }

    pub fn item_count(&self) -> usize {
        self.state.borrow().items.len()
    }

    /// Keys of the rows with a live instance, in document order
    pub fn rendered_keys(&self) -> Vec<String> {
        self.state.borrow().reconciler.keys()
    }

    pub fn has_pending_frame(&self) -> bool {
        self.state.borrow().pending.is_some()
    }

    pub fn is_measuring(&self) -> bool {
        self.state.borrow().measuring
    }

    pub fn is_disposed(&self) -> bool {
        self.state.borrow().disposed
    }

    /// Cancel pending work, stop observing, save the scroll offset and drop every row
    pub fn dispose(&self) {
        self.state.borrow_mut().dispose();
    }
}

fn restore_key(
    doc: &Document,
    container: NodeId,
    binding: &str,
    policy: &KeyPolicy,
) -> RestoreKey {
    let path = doc.path_from(doc.root(), container);
    let container_id = match (doc.attribute(container, "id"), &path) {
        (Some(id), _) => id.to_string(),
        (None, Some(path)) => path
            .iter()
            .map(|index| index.to_string())
            .collect::<Vec<_>>()
            .join("/"),
        // Inside a row that is not attached yet
        (None, None) => format!("node-{}", container.index()),
    };
    let template_path = path.unwrap_or_default();
    RestoreKey {
        document: doc.id().to_string(),
        location: doc.location().to_string(),
        binding: binding.to_string(),
        key_policy: policy.to_string(),
        container: container_id,
        template_path,
    }
}

/// Handler for `virtual-list="alias in source"`
pub fn mount_virtual_list(
    ctx: &MountContext,
    container: NodeId,
    env: &Environment,
    scope: &Scope,
) -> DirectiveResult<()> {
    let (value, parsed, policy, site) = {
        let doc = ctx.dom.borrow();
        let value = doc.attribute(container, ATTRIBUTE).unwrap_or_default().to_string();
        let parsed = WindowOptions::from_attributes(&doc, container, &ctx.config.window);
        let policy = KeyPolicy::from_attribute(doc.attribute(container, "key"));
        let site = site_of(&doc, container, ATTRIBUTE, &value);
        (value, parsed, policy, site)
    };
    let options = match parsed {
        Ok(options) => options,
        Err(DirectiveError::InvalidVirtualConfig { reason }) => {
            warn_once(
                DiagnosticKind::VirtualizationConfig,
                site.clone(),
                format!("{}: {}; rendering as a plain list", site, reason),
            );
            return mount_keyed_list(ctx, container, env, scope, ATTRIBUTE);
        }
        Err(err) => return Err(err),
    };
    let binding = EachBinding::parse(ATTRIBUTE, &value)?;

    let measuring = options.row_height.is_measured() && ctx.measure.is_some();
    if options.row_height.is_measured() && !measuring {
        warn_once(
            DiagnosticKind::Measurement,
            site.clone(),
            format!("{}: no measurement host; using estimated heights", site),
        );
    }

    let (template, top_spacer, bottom_spacer, key) = {
        let mut doc = ctx.dom.borrow_mut();
        let key = restore_key(&doc, container, &binding.source, &policy);
        let template = detach_template(&mut doc, container);
        let top = doc.create_element("div");
        doc.set_attribute(top, "data-spacer", "top");
        doc.append_child(container, top);
        let bottom = doc.create_element("div");
        doc.set_attribute(bottom, "data-spacer", "bottom");
        doc.append_child(container, bottom);
        if let Some(offset) = restored_scroll(&key) {
            doc.set_scroll_top(container, offset);
        }
        (template, top, bottom, key)
    };

    let list_scope = scope.child();
    release_template(ctx, &list_scope, &template);
    let factory = TemplateFactory {
        ctx: ctx.clone(),
        template,
        env: env.clone(),
        alias: binding.alias.clone(),
        site: site.clone(),
    };
    let reconciler = KeyedReconciler::new(
        ctx.dom.clone(),
        container,
        bottom_spacer,
        list_scope.clone(),
        Box::new(factory),
    );
    let estimate = options.row_height.estimate();
    let state = Rc::new(RefCell::new(WindowState {
        ctx: ctx.clone(),
        container,
        top_spacer,
        bottom_spacer,
        options,
        env: env.clone(),
        site: site.clone(),
        policy,
        heights: HeightIndex::new(0, estimate),
        items: Vec::new(),
        keys: Vec::new(),
        reconciler,
        range: 0..0,
        pending: None,
        reach_end_fired_at: None,
        measuring,
        observed: HashSet::new(),
        restore_key: key,
        disposed: false,
    }));
    let controller = WindowController {
        state: state.clone(),
    };
    ctx.register_controller(container, controller.clone());

    let env = env.clone();
    let effect = create_effect(move || {
        let items = read_items(&binding.expr, &env, &site);
        let due = untrack(|| {
            let mut current = state.borrow_mut();
            current.set_items(items);
            current.render();
            current.reach_end_due()
        });
        // Deferred: a source write from inside this effect would not re-run it
        if due {
            schedule(&state);
        }
    });
    list_scope.own_effect(effect);
    list_scope.on_cleanup(move || controller.dispose());
    Ok(())
}
