//! # Keyed reconciliation
//!
//! Keeps one rendered instance per key under a parent node, in source order,
//! ahead of an end anchor. One pass runs in this order:
//!
//! 1. instances whose key survived but whose item changed identity are
//!    disposed and rebuilt (no field-level diffing)
//! 2. instances whose key disappeared are disposed and removed
//! 3. instances for new keys are created
//! 4. positional metadata is updated
//! 5. the document is reordered, walking the target order from the end
//!
//! The reorder step only moves instances outside the longest run that is
//! already in relative order, so a pure reorder performs exactly
//! `len - LIS` moves, and none when nothing changed.
//!
//! Instances live in a generational arena; [`SlotId`]s of released instances
//! never alias a later one.

use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};
use trellis_common::{Scope, Signal};
use trellis_evaluator::{DomHandle, Environment, NodeId, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    index: u32,
    generation: u32,
}

/// Reactive positional metadata of one instance
#[derive(Debug, Clone)]
pub struct ItemMeta {
    pub index: Signal<Value>,
    pub count: Signal<Value>,
    pub first: Signal<Value>,
    pub last: Signal<Value>,
    pub even: Signal<Value>,
    pub odd: Signal<Value>,
}

impl ItemMeta {
    pub fn new(index: usize, count: usize) -> Self {
        let [index_v, count_v, first, last, even, odd] = Self::values(index, count);
        Self {
            index: Signal::new(index_v),
            count: Signal::new(count_v),
            first: Signal::new(first),
            last: Signal::new(last),
            even: Signal::new(even),
            odd: Signal::new(odd),
        }
    }

    fn values(index: usize, count: usize) -> [Value; 6] {
        [
            Value::Number(index as f64),
            Value::Number(count as f64),
            Value::Boolean(index == 0),
            Value::Boolean(index + 1 == count),
            Value::Boolean(index % 2 == 0),
            Value::Boolean(index % 2 == 1),
        ]
    }

    /// Write changed fields only, so unaffected consumers do not re-run
    pub fn update(&self, index: usize, count: usize) {
        let [index_v, count_v, first, last, even, odd] = Self::values(index, count);
        self.index.set_if_changed(index_v);
        self.count.set_if_changed(count_v);
        self.first.set_if_changed(first);
        self.last.set_if_changed(last);
        self.even.set_if_changed(even);
        self.odd.set_if_changed(odd);
    }

    pub fn current_index(&self) -> usize {
        match self.index.get_untracked() {
            Value::Number(n) => n as usize,
            _ => 0,
        }
    }

    pub fn bindings(&self) -> [(&'static str, Value); 6] {
        [
            ("$index", Value::Signal(self.index.clone())),
            ("$count", Value::Signal(self.count.clone())),
            ("$first", Value::Signal(self.first.clone())),
            ("$last", Value::Signal(self.last.clone())),
            ("$even", Value::Signal(self.even.clone())),
            ("$odd", Value::Signal(self.odd.clone())),
        ]
    }

    /// Child environment with the item alias and metadata bound
    pub fn item_env(&self, parent: &Environment, alias: &str, item: &Value) -> Environment {
        let mut bindings: Vec<(String, Value)> = self
            .bindings()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        bindings.push((alias.to_string(), item.clone()));
        parent.extend(bindings)
    }
}

pub struct InstanceRecord {
    pub key: String,
    pub item: Value,
    pub nodes: Vec<NodeId>,
    pub scope: Scope,
    pub meta: ItemMeta,
}

/// One entry of the target sequence
#[derive(Debug, Clone)]
pub struct KeyedItem {
    pub key: String,
    pub item: Value,
    /// Position in the full source sequence
    pub index: usize,
}

pub struct CreateRequest<'a> {
    pub key: &'a str,
    pub item: &'a Value,
    pub index: usize,
    pub meta: &'a ItemMeta,
    pub scope: &'a Scope,
}

/// Builds the detached nodes of one instance
pub trait InstanceFactory {
    fn create(&mut self, request: &CreateRequest<'_>) -> Vec<NodeId>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub recreated: usize,
    pub removed: usize,
    pub moved: usize,
}

impl ReconcileStats {
    pub fn is_noop(&self) -> bool {
        *self == ReconcileStats::default()
    }
}

struct Slot {
    generation: u32,
    record: Option<InstanceRecord>,
}

pub struct KeyedReconciler {
    dom: DomHandle,
    parent: NodeId,
    end_anchor: NodeId,
    owner: Scope,
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_key: HashMap<String, SlotId>,
    order: Vec<SlotId>,
    factory: Box<dyn InstanceFactory>,
}

impl KeyedReconciler {
    /// `end_anchor` must be a child of `parent`; instances are kept before it.
    /// Instance scopes are children of `owner`.
    pub fn new(
        dom: DomHandle,
        parent: NodeId,
        end_anchor: NodeId,
        owner: Scope,
        factory: Box<dyn InstanceFactory>,
    ) -> Self {
        Self {
            dom,
            parent,
            end_anchor,
            owner,
            slots: Vec::new(),
            free: Vec::new(),
            by_key: HashMap::new(),
            order: Vec::new(),
            factory,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn end_anchor(&self) -> NodeId {
        self.end_anchor
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }

    /// Keys in document order
    pub fn keys(&self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|slot| self.record(*slot))
            .map(|record| record.key.clone())
            .collect()
    }

    pub fn instance(&self, key: &str) -> Option<&InstanceRecord> {
        self.by_key.get(key).and_then(|slot| self.record(*slot))
    }

    pub fn instances(&self) -> impl Iterator<Item = &InstanceRecord> {
        self.order.iter().filter_map(|slot| self.record(*slot))
    }

    /// Instance owning `node` as one of its root nodes
    pub fn instance_for_node(&self, node: NodeId) -> Option<&InstanceRecord> {
        self.instances().find(|record| record.nodes.contains(&node))
    }

    fn record(&self, slot: SlotId) -> Option<&InstanceRecord> {
        self.slots
            .get(slot.index as usize)
            .filter(|entry| entry.generation == slot.generation)
            .and_then(|entry| entry.record.as_ref())
    }

    fn record_mut(&mut self, slot: SlotId) -> Option<&mut InstanceRecord> {
        self.slots
            .get_mut(slot.index as usize)
            .filter(|entry| entry.generation == slot.generation)
            .and_then(|entry| entry.record.as_mut())
    }

    fn allocate(&mut self, record: InstanceRecord) -> SlotId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.record = Some(record);
            return SlotId {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            record: Some(record),
        });
        SlotId {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    fn release(&mut self, slot: SlotId) -> Option<InstanceRecord> {
        let entry = self.slots.get_mut(slot.index as usize)?;
        if entry.generation != slot.generation {
            return None;
        }
        let record = entry.record.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(slot.index);
        if self.by_key.get(&record.key) == Some(&slot) {
            self.by_key.remove(&record.key);
        }
        Some(record)
    }

    fn dispose_record(&self, record: InstanceRecord) {
        // Cleanups may touch the document, so no borrow is held while they run
        record.scope.dispose();
        let mut doc = self.dom.borrow_mut();
        for node in record.nodes {
            doc.release(node);
        }
    }

    /// Bring the rendered instances in line with `entries`. `count` is the
    /// length of the full source sequence, used for `$count` and `$last`.
    #[instrument(level = "debug", skip_all, fields(entries = entries.len(), count = count))]
    pub fn reconcile(&mut self, entries: &[KeyedItem], count: usize) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        let next_keys: HashSet<&str> = entries.iter().map(|entry| entry.key.as_str()).collect();

        let mut stale = Vec::new();
        let mut recreated: HashSet<&str> = HashSet::new();
        for entry in entries {
            if let Some(slot) = self.by_key.get(&entry.key) {
                let changed = self
                    .record(*slot)
                    .map(|record| !record.item.same_identity(&entry.item))
                    .unwrap_or(false);
                if changed {
                    stale.push(*slot);
                    recreated.insert(entry.key.as_str());
                }
            }
        }
        stats.recreated = recreated.len();
        for (key, slot) in &self.by_key {
            if !next_keys.contains(key.as_str()) {
                stale.push(*slot);
                stats.removed += 1;
            }
        }
        for slot in stale {
            if let Some(record) = self.release(slot) {
                self.dispose_record(record);
            }
        }
        let live: HashSet<SlotId> = self.by_key.values().copied().collect();
        self.order.retain(|slot| live.contains(slot));

        let mut target: Vec<(SlotId, bool)> = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(slot) = self.by_key.get(&entry.key).copied() {
                if let Some(record) = self.record_mut(slot) {
                    record.item = entry.item.clone();
                    record.meta.update(entry.index, count);
                }
                target.push((slot, false));
                continue;
            }

            let meta = ItemMeta::new(entry.index, count);
            let scope = self.owner.child();
            let nodes = self.factory.create(&CreateRequest {
                key: &entry.key,
                item: &entry.item,
                index: entry.index,
                meta: &meta,
                scope: &scope,
            });
            let slot = self.allocate(InstanceRecord {
                key: entry.key.clone(),
                item: entry.item.clone(),
                nodes,
                scope,
                meta,
            });
            self.by_key.insert(entry.key.clone(), slot);
            target.push((slot, true));
            if !recreated.contains(entry.key.as_str()) {
                stats.created += 1;
            }
        }

        stats.moved = self.reorder(&target);
        self.order = target.into_iter().map(|(slot, _)| slot).collect();

        if !stats.is_noop() {
            debug!(
                created = stats.created,
                recreated = stats.recreated,
                removed = stats.removed,
                moved = stats.moved,
                "Reconciled keyed instances"
            );
        }
        stats
    }

    /// Place instances in target order; returns how many existing instances moved
    fn reorder(&self, target: &[(SlotId, bool)]) -> usize {
        let previous: HashMap<SlotId, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(position, slot)| (*slot, position))
            .collect();
        let sequence: Vec<Option<usize>> = target
            .iter()
            .map(|(slot, fresh)| if *fresh { None } else { previous.get(slot).copied() })
            .collect();
        let stable = longest_increasing_run(&sequence);

        let mut moved = 0;
        let mut anchor = self.end_anchor;
        let mut doc = self.dom.borrow_mut();
        for (position, (slot, fresh)) in target.iter().enumerate().rev() {
            let Some(record) = self.record(*slot) else {
                continue;
            };
            let in_place = !*fresh
                && (stable.contains(&position)
                    || record
                        .nodes
                        .last()
                        .and_then(|last| doc.next_sibling(*last))
                        == Some(anchor));
            if !in_place {
                for node in &record.nodes {
                    doc.insert_before(self.parent, *node, Some(anchor));
                }
                if !*fresh {
                    moved += 1;
                }
            }
            if let Some(first) = record.nodes.first() {
                anchor = *first;
            }
        }
        moved
    }

    /// Dispose every instance; returns how many there were
    pub fn clear(&mut self) -> usize {
        let slots = std::mem::take(&mut self.order);
        let count = slots.len();
        for slot in slots {
            if let Some(record) = self.release(slot) {
                self.dispose_record(record);
            }
        }
        self.by_key.clear();
        count
    }
}

/// Positions (into `sequence`) forming a longest strictly increasing
/// subsequence of the `Some` values
fn longest_increasing_run(sequence: &[Option<usize>]) -> HashSet<usize> {
    // tails[k]: position whose value ends the best run of length k + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut predecessor: Vec<Option<usize>> = vec![None; sequence.len()];

    for (position, value) in sequence.iter().enumerate() {
        let Some(value) = value else {
            continue;
        };
        let insert_at = tails.partition_point(|tail| sequence[*tail].unwrap_or(0) < *value);
        if insert_at > 0 {
            predecessor[position] = Some(tails[insert_at - 1]);
        }
        if insert_at == tails.len() {
            tails.push(position);
        } else {
            tails[insert_at] = position;
        }
    }

    let mut run = HashSet::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(position) = cursor {
        run.insert(position);
        cursor = predecessor[position];
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_increasing_run() {
        let seq = [Some(2), Some(0), Some(1)];
        let run = longest_increasing_run(&seq);
        assert_eq!(run, [1, 2].into_iter().collect());

        let seq = [Some(0), None, Some(1), Some(2)];
        assert_eq!(longest_increasing_run(&seq).len(), 3);

        let seq = [Some(3), Some(2), Some(1), Some(0)];
        assert_eq!(longest_increasing_run(&seq).len(), 1);
        assert!(longest_increasing_run(&[]).is_empty());
    }

    #[test]
    fn test_meta_values() {
        let meta = ItemMeta::new(0, 3);
        assert_eq!(meta.first.get_untracked(), Value::Boolean(true));
        assert_eq!(meta.even.get_untracked(), Value::Boolean(true));
        meta.update(2, 3);
        assert_eq!(meta.current_index(), 2);
        assert_eq!(meta.last.get_untracked(), Value::Boolean(true));
        assert_eq!(meta.first.get_untracked(), Value::Boolean(false));
        assert_eq!(meta.odd.get_untracked(), Value::Boolean(false));
    }
}
