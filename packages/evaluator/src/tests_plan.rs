/// Plan building, fingerprinting and cache eviction
use crate::*;
use chrono::{Duration, TimeZone, Utc};
use std::rc::Rc;

fn row(doc: &mut Document, label: &str) -> NodeId {
    doc.instantiate(
        &Markup::element("li")
            .attr("title", "{item.title}")
            .attr("class", "row")
            .child(Markup::text(format!("{}: {{item.name}}", label)))
            .child(Markup::element("span").child(Markup::text("{item.count + 1}"))),
    )
}

#[test]
fn test_build_records_text_and_attribute_points() {
    let mut doc = Document::new("doc", "/");
    let root = row(&mut doc, "Name");
    let plan = plan::build(&doc, root);

    assert_eq!(plan.entries.len(), 3);
    assert_eq!(plan.entries[0].target, PlanTarget::Attribute("title".to_string()));
    assert_eq!(plan.entries[0].path, Vec::<usize>::new());
    assert_eq!(plan.entries[1].target, PlanTarget::Text);
    assert_eq!(plan.entries[1].path, vec![0]);
    assert_eq!(plan.entries[2].path, vec![1, 0]);
    assert_eq!(plan.total_expressions, 3);
    assert_eq!(plan.fast_path_expressions, 2);
    assert_eq!(plan.node_count, 4);
}

#[test]
fn test_bound_subtrees_are_skipped() {
    let mut doc = Document::new("doc", "/");
    let root = doc.instantiate(
        &Markup::element("div")
            .child(Markup::text("{outer}"))
            .child(Markup::element("ul").child(Markup::text("{inner}"))),
    );
    let nested = doc.children(root)[1];
    doc.mark_bound(nested);

    let plan = plan::build(&doc, root);
    assert_eq!(plan.entries.len(), 1);
    assert_eq!(plan.entries[0].raw, "{outer}");
}

#[test]
fn test_fingerprint_ignores_attribute_order_but_not_content() {
    let mut doc = Document::new("doc", "/");
    let a = doc.instantiate(&Markup::element("p").attr("a", "1").attr("b", "2"));
    let b = doc.instantiate(&Markup::element("p").attr("b", "2").attr("a", "1"));
    let c = doc.instantiate(&Markup::element("p").attr("a", "1").attr("b", "3"));

    assert_eq!(plan::fingerprint(&doc, a), plan::fingerprint(&doc, b));
    assert_ne!(plan::fingerprint(&doc, a), plan::fingerprint(&doc, c));

    let first = row(&mut doc, "Name");
    let clone = doc.deep_clone(first);
    let other = row(&mut doc, "Title");
    assert_eq!(plan::fingerprint(&doc, first), plan::fingerprint(&doc, clone));
    assert_ne!(plan::fingerprint(&doc, first), plan::fingerprint(&doc, other));
}

#[test]
fn test_plan_for_reuses_plan_across_clones() {
    reset_plan_cache();
    let mut doc = Document::new("doc", "/");
    let template = row(&mut doc, "Name");
    let clone = doc.deep_clone(template);

    let first = plan_for(&doc, template);
    let second = plan_for(&doc, clone);
    assert!(Rc::ptr_eq(&first, &second));

    let stats = plan_cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);

    let resolved = plan::resolve(&second, &doc, clone).unwrap();
    assert_eq!(resolved[1].0, doc.first_child(clone).unwrap());
}

#[test]
fn test_resolve_detects_mismatched_subtree() {
    let mut doc = Document::new("doc", "/");
    let template = row(&mut doc, "Name");
    let plan = plan::build(&doc, template);

    let other = doc.instantiate(&Markup::element("li").child(Markup::text("plain")));
    assert!(plan::resolve(&plan, &doc, other).is_none());
}

fn empty_plan(fingerprint: u64) -> Rc<TemplatePlan> {
    Rc::new(TemplatePlan {
        fingerprint,
        entries: Vec::new(),
        node_count: 1,
        total_expressions: 0,
        fast_path_expressions: 0,
    })
}

#[test]
fn test_cache_lru_eviction() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut cache = PlanCache::new(2, 60_000);
    cache.insert_at(1, empty_plan(1), now);
    cache.insert_at(2, empty_plan(2), now);
    assert!(cache.get_at(1, now).is_some());
    cache.insert_at(3, empty_plan(3), now);

    assert!(cache.contains(1));
    assert!(!cache.contains(2));
    assert!(cache.contains(3));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_cache_ttl_expiry_and_refresh() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut cache = PlanCache::new(8, 1_000);
    cache.insert_at(1, empty_plan(1), start);
    cache.insert_at(2, empty_plan(2), start);

    // A hit refreshes the entry's age
    assert!(cache.get_at(1, start + Duration::milliseconds(800)).is_some());
    let later = start + Duration::milliseconds(1_500);
    assert!(cache.get_at(2, later).is_none());
    assert!(cache.get_at(1, later).is_some());
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_zero_bounds_disable_cache() {
    let now = Utc::now();
    for (max_entries, ttl_ms) in [(0, 1_000), (4, 0)] {
        let mut cache = PlanCache::new(max_entries, ttl_ms);
        assert!(!cache.is_enabled());
        cache.insert_at(1, empty_plan(1), now);
        assert!(cache.get_at(1, now).is_none());
        assert!(cache.is_empty());
    }
}

#[test]
fn test_rejected_hit_is_rebuilt() {
    reset_plan_cache();
    let mut doc = Document::new("doc", "/");
    let template = row(&mut doc, "Name");
    let key = plan::fingerprint(&doc, template);

    // Poison the slot with a plan pointing at a path that does not exist
    let bogus = Rc::new(TemplatePlan {
        fingerprint: key,
        entries: vec![PlanEntry {
            path: vec![7],
            target: PlanTarget::Text,
            raw: "{x}".to_string(),
            segments: compile_segments("{x}").into(),
        }],
        node_count: 4,
        total_expressions: 1,
        fast_path_expressions: 1,
    });
    configure_plan_cache(16, 60_000);
    plan::with_plan_cache(|cache| cache.insert(key, bogus.clone()));

    let plan = plan_for(&doc, template);
    assert!(!Rc::ptr_eq(&plan, &bogus));
    assert_eq!(plan.entries.len(), 3);
    assert_eq!(plan_cache_stats().rejected, 1);
}
