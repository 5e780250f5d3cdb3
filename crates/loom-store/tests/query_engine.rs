// crates/loom-store/tests/query_engine.rs
// ============================================================================
// Module: Query Engine Integration Tests
// Description: Text query, usages, call graphs, impact, paths, summaries.
// Purpose: Exercise the question-answering surface over a hand-built graph.
// ============================================================================

//! Integration tests for the query engine.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use loom_core::Direction;
use loom_core::EntityId;
use loom_core::EntityKind;
use loom_core::MetadataBag;
use loom_core::RelationKind;
use loom_store::CodeStore;
use loom_store::MatchField;

fn open_store() -> (tempfile::TempDir, CodeStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CodeStore::open(dir.path().join("store.db")).expect("open store");
    (dir, store)
}

fn add(store: &CodeStore, name: &str, kind: EntityKind, code: Option<&str>) -> EntityId {
    store.add_entity(name, kind, code, None, None).expect("add entity")
}

fn python_metadata() -> MetadataBag {
    let mut bag = MetadataBag::new();
    bag.insert("language".to_string(), serde_json::json!("python"));
    bag
}

#[test]
fn empty_query_returns_nothing() {
    let (_dir, store) = open_store();
    add(&store, "pkg.anything", EntityKind::Function, None);
    assert!(store.query("", None).expect("empty").is_empty());
    assert!(store.query("   ", None).expect("blank").is_empty());
}

#[test]
fn query_ranks_name_matches_first() {
    let (_dir, store) = open_store();
    store
        .add_entity("pkg.render", EntityKind::Function, Some("draw things"), None, None)
        .expect("add");
    store
        .add_entity("pkg.other", EntityKind::Function, Some("calls render()"), Some("render helper"), None)
        .expect("add");

    let results = store.query("render", None).expect("query");
    assert_eq!(results.len(), 2);
    // Two matches (intent + code) outrank one name match.
    assert_eq!(results[0].entity.name, "pkg.other");
    assert!(results[1].matches.contains(&MatchField::Name));
}

#[test]
fn impact_analysis_on_a_class_counts_surface_and_tiers() {
    let (_dir, store) = open_store();
    let class_k = add(&store, "mod.K", EntityKind::Class, None);
    let m1 = add(&store, "mod.K.m1", EntityKind::Method, None);
    let m2 = add(&store, "mod.K.m2", EntityKind::Method, None);
    let f1 = add(&store, "mod.f1", EntityKind::Function, None);
    let f2 = add(&store, "mod.f2", EntityKind::Function, None);

    store.add_relationship(m1, class_k, RelationKind::MemberOf, None).expect("m1 member");
    store.add_relationship(m2, class_k, RelationKind::MemberOf, None).expect("m2 member");
    store.add_relationship(f1, m1, RelationKind::Calls, None).expect("f1 calls m1");
    store.add_relationship(f2, f1, RelationKind::Calls, None).expect("f2 calls f1");

    let report = store.impact_analysis(class_k).expect("impact");
    let direct: Vec<&str> =
        report.direct_callers.iter().map(|entity| entity.name.as_str()).collect();
    assert_eq!(direct, vec!["mod.f1"]);
    let indirect: Vec<&str> =
        report.indirect_callers.iter().map(|entity| entity.name.as_str()).collect();
    assert_eq!(indirect, vec!["mod.f2"]);
    let mut methods: Vec<&str> =
        report.affected_methods.iter().map(|entity| entity.name.as_str()).collect();
    methods.sort_unstable();
    assert_eq!(methods, vec!["mod.K.m1", "mod.K.m2"]);
    assert_eq!(report.risk_score, 4);
}

#[test]
fn callers_are_exactly_the_calls_sources() {
    let (_dir, store) = open_store();
    let target = add(&store, "mod.target", EntityKind::Function, None);
    let a = add(&store, "mod.a", EntityKind::Function, None);
    let b = add(&store, "mod.b", EntityKind::Function, None);
    let c = add(&store, "mod.c", EntityKind::Function, None);
    store.add_relationship(a, target, RelationKind::Calls, None).expect("a calls");
    store.add_relationship(b, target, RelationKind::Calls, None).expect("b calls");
    store.add_relationship(c, target, RelationKind::Uses, None).expect("c uses");

    let mut callers: Vec<&str> = Vec::new();
    let resolved = store.get_callers(target).expect("callers");
    for caller in &resolved {
        callers.push(caller.name.as_str());
    }
    callers.sort_unstable();
    assert_eq!(callers, vec!["mod.a", "mod.b"]);
}

#[test]
fn call_graph_terminates_on_cycles() {
    let (_dir, store) = open_store();
    let a = add(&store, "mod.a", EntityKind::Function, None);
    let b = add(&store, "mod.b", EntityKind::Function, None);
    store.add_relationship(a, b, RelationKind::Calls, None).expect("a calls b");
    store.add_relationship(b, a, RelationKind::Calls, None).expect("b calls a");

    let graph = store.get_call_graph(a, -1, true).expect("graph").expect("root");
    assert_eq!(graph.entity.name, "mod.a");
    assert_eq!(graph.calls.len(), 1);
    let child = &graph.calls[0];
    assert_eq!(child.entity.name, "mod.b");
    // The cycle closes back at a, flagged as such with no further descent.
    assert_eq!(child.calls.len(), 1);
    assert!(child.calls[0].cycle);
    assert!(child.calls[0].calls.is_empty());
}

#[test]
fn call_graph_depth_zero_is_just_the_entity() {
    let (_dir, store) = open_store();
    let a = add(&store, "mod.a", EntityKind::Function, None);
    let b = add(&store, "mod.b", EntityKind::Function, None);
    store.add_relationship(a, b, RelationKind::Calls, None).expect("edge");

    let graph = store.get_call_graph(a, 0, false).expect("graph").expect("root");
    assert!(graph.calls.is_empty());
    assert_eq!(graph.call_count, 0);
}

#[test]
fn usages_combine_edges_and_code_references() {
    let (_dir, store) = open_store();
    let helper = add(&store, "mod.helper", EntityKind::Function, None);
    let caller = store
        .add_entity(
            "mod.caller",
            EntityKind::Function,
            Some("def caller():\n    return helper()\n"),
            None,
            Some(&python_metadata()),
        )
        .expect("add caller");
    store.add_relationship(caller, helper, RelationKind::Calls, None).expect("edge");

    let usages = store.find_usages(helper).expect("usages");
    let relations: Vec<&str> = usages.iter().map(|usage| usage.relation.as_str()).collect();
    assert!(relations.contains(&"calls"));
    assert!(relations.contains(&"code_reference"));

    // De-duplicated: one entry per (entity, relation).
    assert_eq!(usages.len(), 2);
}

#[test]
fn method_usages_detect_attribute_calls() {
    let (_dir, store) = open_store();
    let method = add(&store, "mod.Widget.render", EntityKind::Method, None);
    store
        .add_entity(
            "mod.use_site",
            EntityKind::Function,
            Some("def use_site(widget):\n    widget.render()\n"),
            None,
            Some(&python_metadata()),
        )
        .expect("add use site");

    let usages = store.find_usages(method).expect("usages");
    assert_eq!(usages.len(), 1);
    assert_eq!(usages[0].relation, "code_reference");
    let context = usages[0].context.clone().expect("context");
    assert_eq!(context["reference_type"], serde_json::json!("method_call"));
}

#[test]
fn paths_respect_endpoints_and_identity() {
    let (_dir, store) = open_store();
    let a = add(&store, "mod.a", EntityKind::Function, None);
    let b = add(&store, "mod.b", EntityKind::Function, None);
    let c = add(&store, "mod.c", EntityKind::Function, None);
    store.add_relationship(a, b, RelationKind::Calls, None).expect("a-b");
    store.add_relationship(c, b, RelationKind::Calls, None).expect("c-b");

    // Identity yields the singleton path.
    assert_eq!(store.get_path("mod.a", "mod.a", 5).expect("self"), vec![vec![
        "mod.a".to_string()
    ]]);

    // a -> b <- c traverses the undirected projection.
    let paths = store.get_path("mod.a", "mod.c", 5).expect("paths");
    assert!(!paths.is_empty());
    for path in &paths {
        assert_eq!(path.first().map(String::as_str), Some("mod.a"));
        assert_eq!(path.last().map(String::as_str), Some("mod.c"));
    }
    assert_eq!(paths[0], vec!["mod.a", "mod.b", "mod.c"]);

    // Unknown endpoints yield no paths.
    assert!(store.get_path("mod.a", "missing", 5).expect("missing").is_empty());
}

#[test]
fn central_orphan_and_uncalled_views_partition_the_graph() {
    let (_dir, store) = open_store();
    let hub = add(&store, "mod.hub", EntityKind::Function, None);
    let spoke_a = add(&store, "mod.spoke_a", EntityKind::Function, None);
    let spoke_b = add(&store, "mod.spoke_b", EntityKind::Function, None);
    add(&store, "mod.orphan", EntityKind::Function, None);
    let private = add(&store, "mod._hidden", EntityKind::Function, None);
    store.add_relationship(spoke_a, hub, RelationKind::Calls, None).expect("a-hub");
    store.add_relationship(spoke_b, hub, RelationKind::Calls, None).expect("b-hub");
    store.add_relationship(hub, private, RelationKind::Uses, None).expect("hub-private");

    let central = store.get_central_entities(3).expect("central");
    assert_eq!(central[0].name, "mod.hub");
    assert_eq!(central[0].connections, 3);

    let orphans = store.get_orphans().expect("orphans");
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].name, "mod.orphan");

    let uncalled = store.get_uncalled_methods(true).expect("uncalled");
    let names: Vec<&str> = uncalled.iter().map(|entity| entity.name.as_str()).collect();
    assert!(names.contains(&"mod.spoke_a"));
    assert!(names.contains(&"mod.orphan"));
    assert!(!names.contains(&"mod.hub"));
    assert!(!names.contains(&"mod._hidden"));

    let with_private = store.get_uncalled_methods(false).expect("uncalled with private");
    assert!(with_private.iter().any(|entity| entity.name == "mod._hidden"));
}

#[test]
fn architecture_summary_mentions_the_graph_shape() {
    let (_dir, store) = open_store();
    let module = add(&store, "pkg", EntityKind::Module, None);
    let func = add(&store, "pkg.f", EntityKind::Function, None);
    store.add_relationship(module, func, RelationKind::Contains, None).expect("edge");

    let summary = store.get_architecture_summary().expect("summary");
    assert!(summary.contains("# Architecture Summary"));
    assert!(summary.contains("module: 1"));
    assert!(summary.contains("function: 1"));
    assert!(summary.contains("contains: 1"));
    assert!(summary.contains("pkg"));
}

#[test]
fn deleting_an_entity_removes_incident_edges() {
    let (_dir, store) = open_store();
    let a = add(&store, "mod.a", EntityKind::Function, None);
    let b = add(&store, "mod.b", EntityKind::Function, None);
    let c = add(&store, "mod.c", EntityKind::Function, None);
    store.add_relationship(a, b, RelationKind::Calls, None).expect("a-b");
    store.add_relationship(b, c, RelationKind::Calls, None).expect("b-c");
    store.add_relationship(c, a, RelationKind::Calls, None).expect("c-a");

    assert!(store.delete_entity(b).expect("delete"));
    assert!(store.get_entity(b).expect("get").is_none());
    for survivor in [a, c] {
        for summary in store.get_relationships(survivor, Direction::Both).expect("edges") {
            assert_ne!(summary.relationship.source_id, b);
            assert_ne!(summary.relationship.target_id, b);
        }
    }
}
