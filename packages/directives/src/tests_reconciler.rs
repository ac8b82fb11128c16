/// Keyed reconciliation against a bare factory
use crate::*;
use std::cell::Cell;
use std::rc::Rc;
use trellis_common::Scope;
use trellis_evaluator::{Document, DomHandle, NodeId, Value};

struct RowFactory {
    dom: DomHandle,
    created: Rc<Cell<usize>>,
}

impl InstanceFactory for RowFactory {
    fn create(&mut self, request: &CreateRequest<'_>) -> Vec<NodeId> {
        self.created.set(self.created.get() + 1);
        let mut doc = self.dom.borrow_mut();
        let row = doc.create_element("li");
        let label = doc.create_text(request.key);
        doc.append_child(row, label);
        vec![row]
    }
}

struct Fixture {
    dom: DomHandle,
    list: NodeId,
    reconciler: KeyedReconciler,
    created: Rc<Cell<usize>>,
    owner: Scope,
}

impl Fixture {
    fn new() -> Self {
        let dom = Document::new("doc", "/").into_handle();
        let (list, anchor) = {
            let mut doc = dom.borrow_mut();
            let root = doc.root();
            let list = doc.create_element("ul");
            doc.append_child(root, list);
            let anchor = doc.create_comment("end");
            doc.append_child(list, anchor);
            (list, anchor)
        };
        let created = Rc::new(Cell::new(0));
        let owner = Scope::new();
        let reconciler = KeyedReconciler::new(
            dom.clone(),
            list,
            anchor,
            owner.clone(),
            Box::new(RowFactory {
                dom: dom.clone(),
                created: created.clone(),
            }),
        );
        Self {
            dom,
            list,
            reconciler,
            created,
            owner,
        }
    }

    fn render(&mut self, items: &[Value]) -> ReconcileStats {
        let keys = assign_keys(items, &KeyPolicy::Default);
        let entries: Vec<KeyedItem> = keys
            .into_iter()
            .zip(items.iter().cloned())
            .enumerate()
            .map(|(index, (key, item))| KeyedItem { key, item, index })
            .collect();
        self.reconciler.reconcile(&entries, items.len())
    }

    fn rendered(&self) -> Vec<String> {
        let doc = self.dom.borrow();
        let texts = doc
            .children(self.list)
            .iter()
            .filter(|node| doc.is_element(**node))
            .map(|node| doc.text_content(*node))
            .collect();
        texts
    }

    fn node_of(&self, key: &str) -> NodeId {
        self.reconciler.instance(key).unwrap().nodes[0]
    }

    fn reset_stats(&self) {
        self.dom.borrow_mut().reset_stats();
    }
}

fn row(id: i32) -> Value {
    Value::object([("id", Value::Number(id as f64))])
}

#[test]
fn test_rotation_moves_one_row() {
    let mut fx = Fixture::new();
    let (a, b, c) = (row(1), row(2), row(3));
    fx.render(&[a.clone(), b.clone(), c.clone()]);
    let before = [fx.node_of("n:1"), fx.node_of("n:2"), fx.node_of("n:3")];
    fx.reset_stats();

    let stats = fx.render(&[c, a, b]);
    assert_eq!(stats.moved, 1);
    assert_eq!(stats.created, 0);
    assert_eq!(stats.recreated, 0);
    assert_eq!(stats.removed, 0);
    assert_eq!(fx.dom.borrow().stats().moves, 1);
    assert_eq!(fx.rendered(), vec!["n:3", "n:1", "n:2"]);
    assert_eq!(
        [fx.node_of("n:1"), fx.node_of("n:2"), fx.node_of("n:3")],
        before
    );
    assert_eq!(fx.created.get(), 3);
}

#[test]
fn test_unchanged_order_is_a_noop() {
    let mut fx = Fixture::new();
    let items: Vec<Value> = (0..6).map(row).collect();
    fx.render(&items);
    fx.reset_stats();

    let stats = fx.render(&items);
    assert!(stats.is_noop());
    let dom_stats = fx.dom.borrow().stats();
    assert_eq!(dom_stats.moves, 0);
    assert_eq!(dom_stats.inserts, 0);
    assert_eq!(dom_stats.removes, 0);
}

#[test]
fn test_reversal_keeps_one_row_in_place() {
    let mut fx = Fixture::new();
    let items: Vec<Value> = (0..5).map(row).collect();
    fx.render(&items);
    fx.reset_stats();

    let reversed: Vec<Value> = items.iter().rev().cloned().collect();
    let stats = fx.render(&reversed);
    assert_eq!(stats.moved, 4);
    assert_eq!(fx.dom.borrow().stats().moves, 4);
    assert_eq!(fx.rendered(), vec!["n:4", "n:3", "n:2", "n:1", "n:0"]);
}

#[test]
fn test_insert_and_remove() {
    let mut fx = Fixture::new();
    let (a, b, c, d) = (row(1), row(2), row(3), row(4));
    fx.render(&[a, b.clone(), c.clone()]);
    fx.reset_stats();

    let stats = fx.render(&[b, d, c]);
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.created, 1);
    assert_eq!(stats.moved, 0);
    assert_eq!(fx.dom.borrow().stats().moves, 0);
    assert_eq!(fx.dom.borrow().stats().removes, 1);
    assert_eq!(fx.rendered(), vec!["n:2", "n:4", "n:3"]);
}

#[test]
fn test_identity_change_recreates_instance() {
    let mut fx = Fixture::new();
    fx.render(&[row(1), row(2)]);
    let old_scope = fx.reconciler.instance("n:2").unwrap().scope.clone();

    // Same key, different object
    let stats = fx.render(&[row(1), row(2)]);
    assert_eq!(stats.recreated, 2);
    assert_eq!(stats.created, 0);
    assert_eq!(fx.created.get(), 4);
    assert!(old_scope.is_disposed());
    assert_eq!(fx.rendered(), vec!["n:1", "n:2"]);
}

#[test]
fn test_metadata_follows_position() {
    let mut fx = Fixture::new();
    let (a, b, c) = (row(1), row(2), row(3));
    fx.render(&[a.clone(), b.clone(), c.clone()]);

    fx.render(&[c.clone(), a.clone(), b]);
    let meta = &fx.reconciler.instance("n:3").unwrap().meta;
    assert_eq!(meta.current_index(), 0);
    assert_eq!(meta.first.get_untracked(), Value::Boolean(true));
    assert_eq!(meta.last.get_untracked(), Value::Boolean(false));

    fx.render(&[c, a]);
    let meta = &fx.reconciler.instance("n:1").unwrap().meta;
    assert_eq!(meta.count.get_untracked(), Value::Number(2.0));
    assert_eq!(meta.last.get_untracked(), Value::Boolean(true));
    assert_eq!(meta.odd.get_untracked(), Value::Boolean(true));
}

#[test]
fn test_duplicate_keys_keep_every_item() {
    let mut fx = Fixture::new();
    let stats = fx.render(&[row(7), row(7), row(8)]);
    assert_eq!(stats.created, 3);
    assert_eq!(fx.rendered(), vec!["n:7", "n:7#1", "n:8"]);
}

#[test]
fn test_clear_disposes_instances() {
    let mut fx = Fixture::new();
    fx.render(&[row(1), row(2)]);
    let scopes: Vec<Scope> = fx
        .reconciler
        .instances()
        .map(|record| record.scope.clone())
        .collect();

    assert_eq!(fx.reconciler.clear(), 2);
    assert!(fx.reconciler.is_empty());
    assert!(scopes.iter().all(Scope::is_disposed));
    assert!(fx.rendered().is_empty());
    assert!(!fx.owner.is_disposed());
}

#[test]
fn test_instance_for_node() {
    let mut fx = Fixture::new();
    fx.render(&[row(1), row(2)]);
    let node = fx.node_of("n:2");
    assert_eq!(
        fx.reconciler.instance_for_node(node).map(|r| r.key.as_str()),
        Some("n:2")
    );
    assert_eq!(fx.reconciler.keys(), vec!["n:1", "n:2"]);
}

#[test]
fn test_removed_rows_return_their_nodes() {
    let mut fx = Fixture::new();
    let rows: Vec<Value> = (0..20).map(row).collect();
    fx.render(&rows);
    let live = fx.dom.borrow().len();
    let capacity = fx.dom.borrow().capacity();

    for round in 0..50 {
        let start = round % 5;
        fx.render(&rows[start..start + 10]);
        fx.render(&rows);
    }

    let doc = fx.dom.borrow();
    assert_eq!(doc.len(), live);
    assert_eq!(doc.capacity(), capacity);
}
