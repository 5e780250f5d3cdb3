// crates/loom-store/tests/ingest_analysis.rs
// ============================================================================
// Module: Ingestion and Analysis Integration Tests
// Description: End-to-end ingest, import analysis, and call analysis.
// Purpose: Exercise the Python ingest pipeline against real source trees.
// ============================================================================

//! Integration tests covering ingestion, import resolution, and call
//! linking over a real temporary source tree.

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

use std::path::Path;
use std::path::PathBuf;

use loom_core::Direction;
use loom_core::EntityKind;
use loom_core::IngestStatus;
use loom_core::RelationKind;
use loom_store::CodeStore;

fn write_file(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(&path, contents).expect("write source file");
    path
}

fn scenario_tree(dir: &Path) -> PathBuf {
    let src = dir.join("src");
    write_file(&src, "pkg/callee.py", "def helper():\n    return 1\n");
    write_file(
        &src,
        "pkg/caller.py",
        "from .callee import helper\n\n\ndef main():\n    return helper()\n",
    );
    src
}

fn open_store(dir: &Path) -> CodeStore {
    CodeStore::open(dir.join("store.db")).expect("open store")
}

#[test]
fn python_ingest_links_imports_and_calls() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = scenario_tree(dir.path());
    let store = open_store(dir.path());

    let stats = store.ingest_files(&[src], None).expect("ingest");
    assert_eq!(stats.modules, 2);
    assert_eq!(stats.functions, 2);
    assert_eq!(stats.errors, 0);

    store.analyze_imports().expect("analyze imports");
    store.analyze_calls(true).expect("analyze calls");

    // main has exactly one outgoing calls edge whose target is helper.
    let mains = store
        .find_entities(Some("main"), Some(EntityKind::Function))
        .expect("find main");
    assert_eq!(mains.len(), 1);
    let callees = store
        .find_related(mains[0].id, Some(RelationKind::Calls), Direction::Outgoing)
        .expect("callees of main");
    assert_eq!(callees.len(), 1);
    assert_eq!(callees[0].short_name(), "helper");

    // pkg.caller imports pkg.callee.
    let caller_module = store
        .find_entities(Some("pkg.caller"), Some(EntityKind::Module))
        .expect("find caller module");
    let imports = store
        .find_related(caller_module[0].id, Some(RelationKind::Imports), Direction::Outgoing)
        .expect("imports of caller");
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].name, "pkg.callee");

    // get_callers(helper) returns main.
    let callers = store.get_callers(callees[0].id).expect("callers of helper");
    assert_eq!(callers.len(), 1);
    assert_eq!(callers[0].name, "pkg.caller.main");
}

#[test]
fn ingest_run_completes_with_stats() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = scenario_tree(dir.path());
    let store = open_store(dir.path());
    store.ingest_files(&[src], None).expect("ingest");

    let run = store.get_latest_ingest_run().expect("latest run").expect("run exists");
    assert_eq!(run.status, IngestStatus::Completed);
    assert!(run.ended_at.is_some());
    assert_eq!(run.stats.map(|stats| stats.modules), Some(2));
}

#[test]
fn nonexistent_root_marks_run_failed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(dir.path());
    let missing = dir.path().join("does-not-exist");
    assert!(store.ingest_files(&[missing], None).is_err());

    let run = store.get_latest_ingest_run().expect("latest run").expect("run exists");
    assert_eq!(run.status, IngestStatus::Failed);
}

#[test]
fn every_entity_lands_in_entity_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = scenario_tree(dir.path());
    let store = open_store(dir.path());
    store.ingest_files(&[src], None).expect("ingest");

    let conn = rusqlite::Connection::open(dir.path().join("store.db")).expect("raw connection");
    let entity_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))
        .expect("entity count");
    let mapped_count: i64 = conn
        .query_row("SELECT COUNT(DISTINCT entity_id) FROM entity_files", [], |row| row.get(0))
        .expect("mapped count");
    assert!(entity_count > 0);
    assert_eq!(entity_count, mapped_count);
}

#[test]
fn every_relationship_endpoint_resolves() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = scenario_tree(dir.path());
    let store = open_store(dir.path());
    store.ingest_files(&[src], None).expect("ingest");
    store.analyze_imports().expect("analyze imports");
    store.analyze_calls(true).expect("analyze calls");

    let conn = rusqlite::Connection::open(dir.path().join("store.db")).expect("raw connection");
    let dangling: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM relationships r
             WHERE r.source_id NOT IN (SELECT id FROM entities)
                OR r.target_id NOT IN (SELECT id FROM entities)",
            [],
            |row| row.get(0),
        )
        .expect("dangling count");
    assert_eq!(dangling, 0);
}

#[test]
fn analyze_imports_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = scenario_tree(dir.path());
    let store = open_store(dir.path());
    store.ingest_files(&[src], None).expect("ingest");

    let first = store.analyze_imports().expect("first pass");
    assert!(first.relationships_created > 0);
    let second = store.analyze_imports().expect("second pass");
    assert_eq!(second.relationships_created, 0);

    let third = store.analyze_calls(true).expect("first call pass");
    assert!(third.relationships_created > 0);
    let fourth = store.analyze_calls(true).expect("second call pass");
    assert_eq!(fourth.relationships_created, 0);
}

#[test]
fn excluded_directories_are_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = dir.path().join("src");
    write_file(&src, "keep.py", "def kept():\n    pass\n");
    write_file(&src, ".git/hook.py", "def hidden():\n    pass\n");
    write_file(&src, "node_modules/dep.py", "def vendored():\n    pass\n");

    let store = open_store(dir.path());
    store.ingest_files(&[src], None).expect("ingest");

    assert_eq!(store.find_entities(Some("kept"), None).expect("kept").len(), 1);
    assert!(store.find_entities(Some("hidden"), None).expect("hidden").is_empty());
    assert!(store.find_entities(Some("vendored"), None).expect("vendored").is_empty());
}

#[test]
fn syntax_errors_count_but_do_not_abort() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = dir.path().join("src");
    write_file(&src, "good.py", "def fine():\n    pass\n");
    write_file(&src, "bad.py", "def broken(:\n");

    let store = open_store(dir.path());
    let stats = store.ingest_files(&[src], None).expect("ingest");
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.functions, 1);

    let run = store.get_latest_ingest_run().expect("latest run").expect("run exists");
    assert_eq!(run.status, IngestStatus::Completed);
}

#[test]
fn methods_link_to_their_class() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = dir.path().join("src");
    write_file(
        &src,
        "shapes.py",
        "class Circle:\n    def area(self):\n        return 3\n\n    def grow(self):\n        self.area()\n",
    );
    let store = open_store(dir.path());
    store.ingest_files(&[src], None).expect("ingest");

    let class = store
        .find_entities(Some("shapes.Circle"), Some(EntityKind::Class))
        .expect("find class");
    assert_eq!(class.len(), 1);
    let members = store
        .find_related(class[0].id, Some(RelationKind::MemberOf), Direction::Incoming)
        .expect("members");
    let mut names: Vec<&str> = members.iter().map(|m| m.short_name()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["area", "grow"]);
}
