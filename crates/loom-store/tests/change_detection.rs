// crates/loom-store/tests/change_detection.rs
// ============================================================================
// Module: Change Detection Integration Tests
// Description: Modified, deleted, and added file detection end to end.
// Purpose: Exercise the change tracker over a real temporary source tree.
// ============================================================================

//! Integration tests for file-change detection and entity mapping.

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
use std::time::Duration;

use loom_store::ChangeKind;
use loom_store::CodeStore;

fn write_file(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(&path, contents).expect("write source file");
    path
}

#[test]
fn modified_deleted_and_added_files_are_detected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = dir.path().join("src");
    let example = write_file(&src, "example.py", "def foo(): pass\n");

    let store = CodeStore::open(dir.path().join("store.db")).expect("open store");
    store.ingest_files(&[src.clone()], None).expect("ingest");

    // A fresh ingest reports a clean tree.
    assert!(store.get_changed_files(None).expect("clean tree").is_empty());

    // Rewrite with a newer mtime.
    std::thread::sleep(Duration::from_millis(20));
    std::fs::write(&example, "def foo(): return 1\n").expect("rewrite");
    let changes = store.get_changed_files(None).expect("after modify");
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].path, example.display().to_string());
    assert_eq!(changes[0].change, ChangeKind::Modified);

    // Delete the file.
    std::fs::remove_file(&example).expect("delete");
    let changes = store.get_changed_files(None).expect("after delete");
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].change, ChangeKind::Deleted);

    // A new untracked file in a tracked directory shows up as added.
    let fresh = write_file(&src, "new.py", "def bar(): pass\n");
    let changes = store.get_changed_files(None).expect("after add");
    assert!(changes.iter().any(|change| {
        change.path == fresh.display().to_string() && change.change == ChangeKind::Added
    }));
}

#[test]
fn deleted_files_still_map_to_their_entities() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = dir.path().join("src");
    let example = write_file(&src, "example.py", "def foo(): pass\n");

    let store = CodeStore::open(dir.path().join("store.db")).expect("open store");
    store.ingest_files(&[src], None).expect("ingest");

    std::fs::remove_file(&example).expect("delete");
    let changed = store.get_changed_entities(None).expect("changed entities");
    assert!(!changed.is_empty());
    assert!(changed.iter().all(|item| item.change == ChangeKind::Deleted));
    assert!(changed.iter().any(|item| item.entity.name == "example.foo"));
}

#[test]
fn impacted_tests_score_static_and_trace_evidence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = dir.path().join("src");
    write_file(&src, "mylib.py", "def process():\n    return 1\n");
    write_file(
        &src,
        "test_mylib.py",
        "import mylib\n\n\ndef test_process():\n    assert mylib.process() == 1\n",
    );

    let store = CodeStore::open(dir.path().join("store.db")).expect("open store");
    store.ingest_files(&[src.clone()], None).expect("ingest");
    store.analyze_imports().expect("analyze imports");

    // Record a historical test run that actually invoked process().
    let run = store.start_trace_run(Some("pytest test_mylib.py")).expect("start run");
    store
        .record_call(&run, loom_store::CallRecord::new("mylib.process"))
        .expect("record call");
    store
        .end_trace_run(&run, loom_core::TraceRunStatus::Completed, Some(0))
        .expect("end run");

    // Touch the library file so it counts as changed.
    std::thread::sleep(Duration::from_millis(20));
    std::fs::write(src.join("mylib.py"), "def process():\n    return 2\n").expect("rewrite");

    let impacted = store.get_impacted_tests(None).expect("impacted tests");
    assert!(!impacted.is_empty());
    // The trace-history command outranks or joins the static suggestion.
    assert!(
        impacted.contains(&"pytest test_mylib.py".to_string())
            || impacted.contains(&"test_mylib".to_string())
    );
}

#[test]
fn latest_test_run_is_found_by_command() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CodeStore::open(dir.path().join("store.db")).expect("open store");

    let other = store.start_trace_run(Some("python script.py")).expect("start other");
    store
        .end_trace_run(&other, loom_core::TraceRunStatus::Completed, Some(0))
        .expect("end other");
    let test_run = store.start_trace_run(Some("pytest -q")).expect("start test run");
    store
        .end_trace_run(&test_run, loom_core::TraceRunStatus::Completed, Some(0))
        .expect("end test run");

    let latest = store.get_latest_test_run().expect("latest").expect("exists");
    assert_eq!(latest.command.as_deref(), Some("pytest -q"));
}
