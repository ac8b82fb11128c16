//! # Live document tree
//!
//! An arena of element, text and comment nodes mutated in place. Nodes are
//! addressed by [`NodeId`]. A removed node is only detached and may be
//! re-inserted later; a released subtree returns its slots to a free list,
//! and its ids are handed out again by later allocations.
//!
//! The document counts structural mutations so callers can check how much
//! churn a pass caused:
//! - `inserts`: a detached node was attached
//! - `moves`: an attached node changed position
//! - `removes`: an attached node was detached
//!
//! Each node also carries a layout box (`height`, `scroll_top`,
//! `client_height`) that a host writes after layout, and a bound marker used
//! by the binder to avoid interpolating a subtree twice.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

pub type DomHandle = Rc<RefCell<Document>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

impl NodeKind {
    /// Single byte used when hashing structure
    pub fn marker(&self) -> u8 {
        match self {
            NodeKind::Element { .. } => b'E',
            NodeKind::Text(_) => b'T',
            NodeKind::Comment(_) => b'C',
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LayoutBox {
    pub height: f64,
    pub scroll_top: f64,
    pub client_height: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationStats {
    pub inserts: usize,
    pub moves: usize,
    pub removes: usize,
    pub text_writes: usize,
}

/// Smooth scroll requested on a container; the host animates it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollRequest {
    pub node: NodeId,
    pub top: f64,
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    layout: LayoutBox,
    bound: bool,
    released: bool,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            layout: LayoutBox::default(),
            bound: false,
            released: false,
        }
    }

    fn vacant() -> Self {
        Self {
            released: true,
            ..Self::new(NodeKind::Comment(String::new()))
        }
    }
}

/// Declarative description of a subtree, instantiated with [`Document::instantiate`]
#[derive(Debug, Clone, PartialEq)]
pub enum Markup {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        children: Vec<Markup>,
    },
    Text(String),
    Comment(String),
}

impl Markup {
    pub fn element(tag: impl Into<String>) -> Self {
        Markup::Element {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Markup::Text(text.into())
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Markup::Comment(text.into())
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Markup::Element { attributes, .. } = &mut self {
            attributes.push((name.into(), value.into()));
        }
        self
    }

    pub fn child(mut self, child: Markup) -> Self {
        if let Markup::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    pub fn children(mut self, items: impl IntoIterator<Item = Markup>) -> Self {
        if let Markup::Element { children, .. } = &mut self {
            children.extend(items);
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    id: String,
    location: String,
    nodes: Vec<NodeData>,
    free: Vec<NodeId>,
    root: NodeId,
    stats: MutationStats,
    scroll_requests: Vec<ScrollRequest>,
}

impl Document {
    pub fn new(id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
            nodes: vec![NodeData::new(NodeKind::Element {
                tag: "body".to_string(),
                attributes: Vec::new(),
            })],
            free: Vec::new(),
            root: NodeId(0),
            stats: MutationStats::default(),
            scroll_requests: Vec::new(),
        }
    }

    pub fn into_handle(self) -> DomHandle {
        Rc::new(RefCell::new(self))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Simulate navigation; scroll restoration keys include the location
    pub fn set_location(&mut self, location: impl Into<String>) {
        self.location = location.into();
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Live nodes, attached or not
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated slots, live or free
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = NodeData::new(kind);
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData::new(kind));
        id
    }

    fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.index()]
    }

    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Element {
            tag: tag.into(),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Comment(text.into()))
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Element { .. })
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    /// Content of a text or comment node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Text(text) | NodeKind::Comment(text) => Some(text),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, value: impl Into<String>) {
        let value = value.into();
        let changed = match &mut self.nodes[id.index()].kind {
            NodeKind::Text(text) | NodeKind::Comment(text) if *text != value => {
                *text = value;
                true
            }
            _ => false,
        };
        if changed {
            self.stats.text_writes += 1;
        }
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        match &self.node(id).kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let NodeKind::Element { attributes, .. } = &mut self.node_mut(id).kind {
            match attributes.iter_mut().find(|(key, _)| key == name) {
                Some((_, existing)) => *existing = value,
                None => attributes.push((name.to_string(), value)),
            }
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Option<String> {
        if let NodeKind::Element { attributes, .. } = &mut self.node_mut(id).kind {
            let position = attributes.iter().position(|(key, _)| key == name)?;
            return Some(attributes.remove(position).1);
        }
        None
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).children.first().copied()
    }

    fn position_in_parent(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(id)?;
        let index = self.children(parent).iter().position(|child| *child == id)?;
        Some((parent, index))
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (parent, index) = self.position_in_parent(id)?;
        self.children(parent).get(index + 1).copied()
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (parent, index) = self.position_in_parent(id)?;
        index
            .checked_sub(1)
            .and_then(|prev| self.children(parent).get(prev).copied())
    }

    fn detach(&mut self, id: NodeId) -> bool {
        let Some((parent, index)) = self.position_in_parent(id) else {
            return false;
        };
        self.node_mut(parent).children.remove(index);
        self.node_mut(id).parent = None;
        true
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` into `parent` before `anchor`. A missing anchor, or one
    /// that is not a child of `parent`, appends. Re-inserting an attached node
    /// counts as a move.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, anchor: Option<NodeId>) {
        if Some(child) == anchor {
            return;
        }
        let was_attached = self.detach(child);
        let siblings = &self.nodes[parent.index()].children;
        let index = anchor
            .and_then(|anchor| siblings.iter().position(|id| *id == anchor))
            .unwrap_or(siblings.len());
        self.node_mut(parent).children.insert(index, child);
        self.node_mut(child).parent = Some(parent);

        if was_attached {
            self.stats.moves += 1;
        } else {
            self.stats.inserts += 1;
        }
    }

    pub fn remove(&mut self, id: NodeId) {
        if self.detach(id) {
            self.stats.removes += 1;
        }
    }

    /// Remove `id` and free its whole subtree. The caller must drop every id
    /// it holds into the subtree; the root and released nodes are ignored.
    pub fn release(&mut self, id: NodeId) {
        if id == self.root || self.is_released(id) {
            return;
        }
        self.remove(id);
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            let data = std::mem::replace(&mut self.nodes[node.index()], NodeData::vacant());
            stack.extend(data.children);
            self.free.push(node);
        }
    }

    pub fn is_released(&self, id: NodeId) -> bool {
        self.node(id).released
    }

    /// Copy a subtree. The copy is detached and not marked bound; layout is not copied.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let kind = self.node(id).kind.clone();
        let copy = self.alloc(kind);
        let children = self.node(id).children.clone();
        for child in children {
            let child_copy = self.deep_clone(child);
            self.node_mut(child_copy).parent = Some(copy);
            self.node_mut(copy).children.push(child_copy);
        }
        copy
    }

    /// Build a detached subtree from markup
    pub fn instantiate(&mut self, markup: &Markup) -> NodeId {
        match markup {
            Markup::Element {
                tag,
                attributes,
                children,
            } => {
                let id = self.alloc(NodeKind::Element {
                    tag: tag.clone(),
                    attributes: attributes.clone(),
                });
                for child in children {
                    let child_id = self.instantiate(child);
                    self.node_mut(child_id).parent = Some(id);
                    self.node_mut(id).children.push(child_id);
                }
                id
            }
            Markup::Text(text) => self.create_text(text.clone()),
            Markup::Comment(text) => self.create_comment(text.clone()),
        }
    }

    /// Instantiate markup and append it under `parent`
    pub fn append_markup(&mut self, parent: NodeId, markup: &Markup) -> NodeId {
        let id = self.instantiate(markup);
        self.append_child(parent, id);
        id
    }

    pub fn layout(&self, id: NodeId) -> LayoutBox {
        self.node(id).layout
    }

    pub fn set_height(&mut self, id: NodeId, height: f64) {
        self.node_mut(id).layout.height = height;
    }

    pub fn set_scroll_top(&mut self, id: NodeId, top: f64) {
        self.node_mut(id).layout.scroll_top = top.max(0.0);
    }

    pub fn set_client_height(&mut self, id: NodeId, height: f64) {
        self.node_mut(id).layout.client_height = height;
    }

    pub fn request_smooth_scroll(&mut self, id: NodeId, top: f64) {
        self.scroll_requests.push(ScrollRequest {
            node: id,
            top: top.max(0.0),
        });
    }

    pub fn take_scroll_requests(&mut self) -> Vec<ScrollRequest> {
        std::mem::take(&mut self.scroll_requests)
    }

    pub fn mark_bound(&mut self, id: NodeId) {
        self.node_mut(id).bound = true;
    }

    pub fn clear_bound(&mut self, id: NodeId) {
        self.node_mut(id).bound = false;
    }

    pub fn is_bound(&self, id: NodeId) -> bool {
        self.node(id).bound
    }

    /// Child-index path from `root` down to `node`
    pub fn path_from(&self, root: NodeId, node: NodeId) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = node;
        while current != root {
            let (parent, index) = self.position_in_parent(current)?;
            path.push(index);
            current = parent;
        }
        path.reverse();
        Some(path)
    }

    pub fn resolve_path(&self, root: NodeId, path: &[usize]) -> Option<NodeId> {
        path.iter()
            .try_fold(root, |node, index| self.children(node).get(*index).copied())
    }

    /// Every node below `root` in document order, excluding `root`
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// First element at or below `root` whose `id` attribute matches
    pub fn element_by_id(&self, root: NodeId, id: &str) -> Option<NodeId> {
        std::iter::once(root)
            .chain(self.descendants(root))
            .find(|node| self.attribute(*node, "id") == Some(id))
    }

    pub fn text_content(&self, id: NodeId) -> String {
        match &self.node(id).kind {
            NodeKind::Text(text) => text.clone(),
            NodeKind::Comment(_) => String::new(),
            NodeKind::Element { .. } => self
                .children(id)
                .iter()
                .map(|child| self.text_content(*child))
                .collect(),
        }
    }

    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    /// Serialize the children of `id` without the node itself
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(id) {
            self.write_html(*child, &mut out);
        }
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match &self.node(id).kind {
            NodeKind::Text(text) => out.push_str(&escape(text, false)),
            NodeKind::Comment(text) => {
                let _ = write!(out, "<!--{}-->", text);
            }
            NodeKind::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    let _ = write!(out, " {}=\"{}\"", name, escape(value, true));
                }
                out.push('>');
                for child in self.children(id) {
                    self.write_html(*child, out);
                }
                let _ = write!(out, "</{}>", tag);
            }
        }
    }

    pub fn stats(&self) -> MutationStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = MutationStats::default();
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
