//! # Interpolation plans
//!
//! A plan records every interpolation point in a subtree as a child-index path
//! from the subtree root plus its compiled segments. Plans are keyed by a
//! structural fingerprint so repeated instantiations of one template (list rows,
//! for example) scan and compile once.
//!
//! The fingerprint is a CRC32 over node kinds, tag names, sorted attributes and
//! text payloads, combined with the node count. Subtrees already marked bound
//! contribute a marker but are not descended into, matching how [`build`] skips
//! them.
//!
//! A fingerprint hit is only trusted after [`resolve`] confirms each recorded
//! path still leads to a node of the recorded kind carrying the recorded raw
//! text. A failed check drops the entry and the plan is rebuilt.
//!
//! Eviction: entries older than the TTL are purged on every access, then the
//! LRU bound applies. A zero bound for either disables caching.

use crate::dom::{Document, NodeId, NodeKind};
use crate::interpolation::{compile_segments, has_interpolation, Segment};
use chrono::{DateTime, Duration, Utc};
use crc32fast::Hasher;
use lru::LruCache;
use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::rc::Rc;
use tracing::debug;
use trellis_common::RuntimeConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanTarget {
    Text,
    Attribute(String),
}

#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub path: Vec<usize>,
    pub target: PlanTarget,
    /// Template text the segments were compiled from
    pub raw: String,
    pub segments: Rc<[Segment]>,
}

impl PlanEntry {
    /// Stable description of the binding position, used to scope diagnostics
    pub fn site(&self) -> String {
        let path = self
            .path
            .iter()
            .map(|index| index.to_string())
            .collect::<Vec<_>>()
            .join("/");
        match &self.target {
            PlanTarget::Text => format!("/{} {}", path, self.raw),
            PlanTarget::Attribute(name) => format!("/{}@{} {}", path, name, self.raw),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemplatePlan {
    pub fingerprint: u64,
    pub entries: Vec<PlanEntry>,
    pub node_count: usize,
    pub total_expressions: usize,
    pub fast_path_expressions: usize,
}

/// Scan the subtree under `root` for interpolation points
pub fn build(doc: &Document, root: NodeId) -> TemplatePlan {
    let mut entries = Vec::new();
    let mut node_count = 0;
    let mut path = Vec::new();
    scan(doc, root, &mut path, &mut entries, &mut node_count);

    let expressions = entries
        .iter()
        .flat_map(|entry| entry.segments.iter())
        .filter(|segment| segment.is_expression());
    let (total_expressions, fast_path_expressions) =
        expressions.fold((0, 0), |(total, fast), segment| {
            (total + 1, fast + usize::from(segment.is_fast_path()))
        });

    TemplatePlan {
        fingerprint: fingerprint(doc, root),
        entries,
        node_count,
        total_expressions,
        fast_path_expressions,
    }
}

fn scan(
    doc: &Document,
    node: NodeId,
    path: &mut Vec<usize>,
    entries: &mut Vec<PlanEntry>,
    node_count: &mut usize,
) {
    *node_count += 1;
    match doc.kind(node) {
        NodeKind::Text(text) => {
            if has_interpolation(text) {
                push_entry(entries, path, PlanTarget::Text, text);
            }
        }
        NodeKind::Comment(_) => {}
        NodeKind::Element { attributes, .. } => {
            for (name, value) in attributes {
                if has_interpolation(value) {
                    push_entry(entries, path, PlanTarget::Attribute(name.clone()), value);
                }
            }
            for (index, child) in doc.children(node).iter().enumerate() {
                if doc.is_bound(*child) {
                    continue;
                }
                path.push(index);
                scan(doc, *child, path, entries, node_count);
                path.pop();
            }
        }
    }
}

fn push_entry(entries: &mut Vec<PlanEntry>, path: &[usize], target: PlanTarget, raw: &str) {
    let segments = compile_segments(raw);
    if !segments.iter().any(Segment::is_expression) {
        return;
    }
    entries.push(PlanEntry {
        path: path.to_vec(),
        target,
        raw: raw.to_string(),
        segments: segments.into(),
    });
}

/// Structural fingerprint of the subtree under `root`
pub fn fingerprint(doc: &Document, root: NodeId) -> u64 {
    let mut hasher = Hasher::new();
    let mut count = 0u32;
    hash_node(doc, root, &mut hasher, &mut count);
    (u64::from(hasher.finalize()) << 32) | u64::from(count)
}

fn hash_node(doc: &Document, node: NodeId, hasher: &mut Hasher, count: &mut u32) {
    *count += 1;
    let kind = doc.kind(node);
    hasher.update(&[kind.marker()]);
    match kind {
        NodeKind::Text(text) | NodeKind::Comment(text) => {
            hash_str(hasher, text);
        }
        NodeKind::Element { tag, attributes } => {
            hash_str(hasher, tag);
            let mut sorted: Vec<_> = attributes.iter().collect();
            sorted.sort();
            for (name, value) in sorted {
                hash_str(hasher, name);
                hash_str(hasher, value);
            }
            hasher.update(b"(");
            for child in doc.children(node) {
                if doc.is_bound(*child) {
                    hasher.update(b"B");
                    continue;
                }
                hash_node(doc, *child, hasher, count);
            }
            hasher.update(b")");
        }
    }
}

// Length prefix keeps adjacent strings from running together
fn hash_str(hasher: &mut Hasher, value: &str) {
    hasher.update(&(value.len() as u32).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// Walk each recorded path against the subtree under `root`. Returns `None`
/// when any entry no longer matches the node it points at.
pub fn resolve<'p>(
    plan: &'p TemplatePlan,
    doc: &Document,
    root: NodeId,
) -> Option<Vec<(NodeId, &'p PlanEntry)>> {
    plan.entries
        .iter()
        .map(|entry| {
            let node = doc.resolve_path(root, &entry.path)?;
            let matches = match &entry.target {
                PlanTarget::Text => {
                    matches!(doc.kind(node), NodeKind::Text(text) if *text == entry.raw)
                }
                PlanTarget::Attribute(name) => {
                    doc.attribute(node, name) == Some(entry.raw.as_str())
                }
            };
            matches.then_some((node, entry))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Hits discarded because the structural check failed
    pub rejected: u64,
}

#[derive(Debug, Clone)]
struct CachedPlan {
    plan: Rc<TemplatePlan>,
    cached_at: DateTime<Utc>,
}

pub struct PlanCache {
    entries: Option<LruCache<u64, CachedPlan>>,
    ttl: Duration,
    stats: PlanCacheStats,
}

impl PlanCache {
    pub fn new(max_entries: usize, ttl_ms: u64) -> Self {
        let entries = match (NonZeroUsize::new(max_entries), ttl_ms) {
            (Some(cap), ttl) if ttl > 0 => Some(LruCache::new(cap)),
            _ => None,
        };
        Self {
            entries,
            ttl: Duration::milliseconds(i64::try_from(ttl_ms).unwrap_or(i64::MAX)),
            stats: PlanCacheStats::default(),
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.plan_cache.max_entries, config.plan_cache.ttl_ms)
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PlanCacheStats {
        self.stats
    }

    pub fn get(&mut self, key: u64) -> Option<Rc<TemplatePlan>> {
        self.get_at(key, Utc::now())
    }

    /// Look up a plan, refreshing its age and recency on a hit
    pub fn get_at(&mut self, key: u64, now: DateTime<Utc>) -> Option<Rc<TemplatePlan>> {
        self.purge_expired(now);
        let hit = self.entries.as_mut().and_then(|entries| {
            let cached = entries.get_mut(&key)?;
            cached.cached_at = now;
            Some(cached.plan.clone())
        });
        if hit.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        hit
    }

    pub fn insert(&mut self, key: u64, plan: Rc<TemplatePlan>) {
        self.insert_at(key, plan, Utc::now());
    }

    pub fn insert_at(&mut self, key: u64, plan: Rc<TemplatePlan>, now: DateTime<Utc>) {
        self.purge_expired(now);
        let Some(entries) = self.entries.as_mut() else {
            return;
        };
        if let Some((evicted, _)) = entries.push(
            key,
            CachedPlan {
                plan,
                cached_at: now,
            },
        ) {
            if evicted != key {
                self.stats.evictions += 1;
            }
        }
    }

    /// Drop an entry whose plan failed verification
    pub fn reject(&mut self, key: u64) {
        if let Some(entries) = self.entries.as_mut() {
            if entries.pop(&key).is_some() {
                self.stats.rejected += 1;
            }
        }
    }

    pub fn contains(&self, key: u64) -> bool {
        self.entries
            .as_ref()
            .map_or(false, |entries| entries.contains(&key))
    }

    pub fn clear(&mut self) {
        if let Some(entries) = self.entries.as_mut() {
            entries.clear();
        }
        self.stats = PlanCacheStats::default();
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) {
        let Some(entries) = self.entries.as_mut() else {
            return;
        };
        let ttl = self.ttl;
        let expired: Vec<u64> = entries
            .iter()
            .filter(|(_, cached)| now - cached.cached_at > ttl)
            .map(|(key, _)| *key)
            .collect();
        for key in expired {
            entries.pop(&key);
            self.stats.evictions += 1;
        }
    }
}

thread_local! {
    static PLAN_CACHE: RefCell<PlanCache> = RefCell::new(PlanCache::from_config(&RuntimeConfig::default()));
}

/// Replace the process-wide plan cache with one using the given bounds
pub fn configure_plan_cache(max_entries: usize, ttl_ms: u64) {
    PLAN_CACHE.with(|cache| *cache.borrow_mut() = PlanCache::new(max_entries, ttl_ms));
}

/// Clear cached plans and counters, keeping the configured bounds
pub fn reset_plan_cache() {
    PLAN_CACHE.with(|cache| cache.borrow_mut().clear());
}

pub fn plan_cache_stats() -> PlanCacheStats {
    PLAN_CACHE.with(|cache| cache.borrow().stats())
}

pub fn plan_cache_len() -> usize {
    PLAN_CACHE.with(|cache| cache.borrow().len())
}

/// Plan for the subtree under `root`, from the process-wide cache when a
/// verified structurally identical plan exists
pub fn plan_for(doc: &Document, root: NodeId) -> Rc<TemplatePlan> {
    let key = fingerprint(doc, root);

    let cached = PLAN_CACHE.with(|cache| cache.borrow_mut().get(key));
    if let Some(plan) = cached {
        if resolve(&plan, doc, root).is_some() {
            return plan;
        }
        debug!(fingerprint = key, "Cached plan failed verification, rebuilding");
        PLAN_CACHE.with(|cache| cache.borrow_mut().reject(key));
    }

    let plan = Rc::new(build(doc, root));
    debug!(
        fingerprint = key,
        entries = plan.entries.len(),
        expressions = plan.total_expressions,
        fast_path = plan.fast_path_expressions,
        "Built template plan"
    );
    PLAN_CACHE.with(|cache| cache.borrow_mut().insert(key, plan.clone()));
    plan
}

/// Run `f` against the process-wide plan cache
pub fn with_plan_cache<R>(f: impl FnOnce(&mut PlanCache) -> R) -> R {
    PLAN_CACHE.with(|cache| f(&mut cache.borrow_mut()))
}
