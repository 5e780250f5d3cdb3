// crates/loom-store/tests/notes_failures.rs
// ============================================================================
// Module: Knowledge Base and Failure Log Integration Tests
// Description: Notes, links, consolidation, hypotheses, failure logging.
// Purpose: Exercise the knowledge-base surface end to end.
// ============================================================================

//! Integration tests for notes and the failure log.

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

use loom_core::EntityKind;
use loom_core::NoteLinkType;
use loom_core::NoteStatus;
use loom_core::NoteType;
use loom_store::CallRecord;
use loom_store::CodeStore;
use loom_store::EntityRef;

fn open_store() -> (tempfile::TempDir, CodeStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CodeStore::open(dir.path().join("store.db")).expect("open store");
    (dir, store)
}

#[test]
fn linked_notes_round_trip_through_entity_lookup() {
    let (_dir, store) = open_store();
    store
        .add_entity("pkg.engine", EntityKind::Class, None, Some("the engine"), None)
        .expect("add entity");

    let note_id = store
        .add_note(
            "The engine caches too aggressively.",
            NoteType::Analysis,
            Some("Cache behavior"),
            Some("manual"),
            &[EntityRef::from("pkg.engine")],
            NoteLinkType::About,
        )
        .expect("add note");

    let linked = store.get_entity_notes("pkg.engine").expect("entity notes");
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].note.id, note_id);
    assert_eq!(linked[0].link_type, NoteLinkType::About);

    let fetched = store.get_note(&note_id).expect("get").expect("exists");
    assert_eq!(fetched.title.as_deref(), Some("Cache behavior"));
    assert_eq!(fetched.status, NoteStatus::Active);
}

#[test]
fn note_filters_compose() {
    let (_dir, store) = open_store();
    store
        .add_note("bug one", NoteType::Bug, None, None, &[], NoteLinkType::About)
        .expect("add bug");
    let hypothesis = store
        .add_note("maybe the cache", NoteType::Hypothesis, None, None, &[], NoteLinkType::About)
        .expect("add hypothesis");
    store.update_note_status(&hypothesis, NoteStatus::Refuted).expect("refute");

    let bugs = store.get_notes(None, Some(NoteType::Bug), None, 10).expect("bugs");
    assert_eq!(bugs.len(), 1);
    let refuted = store
        .get_notes(None, None, Some(NoteStatus::Refuted), 10)
        .expect("refuted");
    assert_eq!(refuted.len(), 1);
    assert_eq!(refuted[0].id, hypothesis);
}

#[test]
fn update_note_edits_content_and_links() {
    let (_dir, store) = open_store();
    store.add_entity("pkg.a", EntityKind::Function, None, None, None).expect("add a");
    store.add_entity("pkg.b", EntityKind::Function, None, None, None).expect("add b");
    let note_id = store
        .add_note("v1", NoteType::Analysis, None, None, &[EntityRef::from("pkg.a")], NoteLinkType::About)
        .expect("add note");

    assert!(store
        .update_note(
            &note_id,
            Some("v2"),
            Some("titled"),
            &[EntityRef::from("pkg.b")],
            &[EntityRef::from("pkg.a")],
        )
        .expect("update"));

    let fetched = store.get_note(&note_id).expect("get").expect("exists");
    assert_eq!(fetched.content, "v2");
    assert!(store.get_entity_notes("pkg.a").expect("a notes").is_empty());
    assert_eq!(store.get_entity_notes("pkg.b").expect("b notes").len(), 1);
}

#[test]
fn consolidation_merges_content_links_and_type() {
    let (_dir, store) = open_store();
    store.add_entity("pkg.core", EntityKind::Module, None, None, None).expect("add");
    let first = store
        .add_note("first finding", NoteType::Bug, Some("One"), None, &[EntityRef::from("pkg.core")], NoteLinkType::About)
        .expect("add first");
    let second = store
        .add_note("second finding", NoteType::Bug, None, None, &[], NoteLinkType::About)
        .expect("add second");
    let third = store
        .add_note("context", NoteType::Analysis, None, None, &[], NoteLinkType::About)
        .expect("add third");

    let merged = store
        .consolidate_notes(&[first.clone(), second.clone(), third.clone()], "Merged", true)
        .expect("consolidate");

    let note = store.get_note(&merged).expect("get").expect("exists");
    assert_eq!(note.note_type, NoteType::Bug);
    assert!(note.content.contains("## One"));
    assert!(note.content.contains("second finding"));
    assert!(note.content.contains("## ANALYSIS"));

    // Originals are gone; links carried over.
    assert!(store.get_note(&first).expect("first").is_none());
    assert!(store.get_note(&second).expect("second").is_none());
    assert!(store.get_note(&third).expect("third").is_none());
    assert_eq!(store.get_entity_notes("pkg.core").expect("links").len(), 1);

    let stats = store.get_note_stats().expect("stats");
    assert_eq!(stats.total, 1);
    assert_eq!(stats.linked, 1);
}

#[test]
fn consolidating_unknown_notes_is_invalid() {
    let (_dir, store) = open_store();
    let missing = loom_core::NoteId::new("nope");
    assert!(store.consolidate_notes(&[missing], "Merged", false).is_err());
}

#[test]
fn hypothesis_check_reports_calls_and_exceptions() {
    let (_dir, store) = open_store();
    store
        .add_entity("pkg.loader", EntityKind::Function, None, None, None)
        .expect("add entity");
    let note_id = store
        .add_note(
            "I think loader fails on empty files",
            NoteType::Hypothesis,
            None,
            None,
            &[EntityRef::from("pkg.loader")],
            NoteLinkType::About,
        )
        .expect("add hypothesis");

    let run = store.start_trace_run(Some("pytest")).expect("start run");
    store
        .record_call(
            &run,
            CallRecord {
                exception_type: Some("ValueError".to_string()),
                exception_message: Some("empty file".to_string()),
                ..CallRecord::new("pkg.loader")
            },
        )
        .expect("record call");
    store
        .end_trace_run(&run, loom_core::TraceRunStatus::Failed, Some(1))
        .expect("end run");

    let report = store.check_hypothesis(&note_id, &run).expect("check");
    assert_eq!(report.entities_mentioned.len(), 1);
    assert_eq!(report.evidence.len(), 1);
    assert_eq!(report.evidence[0].call_count, 1);
    assert_eq!(report.evidence[0].exception_count, 1);
    assert!(report.summary.contains("pkg.loader"));
    assert!(report.summary.contains("1 exceptions"));

    // The hypothesis itself is untouched.
    let note = store.get_note(&note_id).expect("get").expect("exists");
    assert_eq!(note.status, NoteStatus::Active);
}

#[test]
fn hypothesis_check_rejects_wrong_inputs() {
    let (_dir, store) = open_store();
    let analysis = store
        .add_note("plain analysis", NoteType::Analysis, None, None, &[], NoteLinkType::About)
        .expect("add note");
    let run = store.start_trace_run(None).expect("start run");
    assert!(store.check_hypothesis(&analysis, &run).is_err());
    assert!(
        store
            .check_hypothesis(&loom_core::NoteId::new("missing"), &run)
            .is_err()
    );
}

#[test]
fn failure_log_filters_by_entity_tags_and_context() {
    let (_dir, store) = open_store();
    store
        .add_entity("pkg.parser", EntityKind::Function, None, None, None)
        .expect("add entity");

    store
        .log_failure(
            "Tried caching the token stream",
            Some("parser is slow"),
            Some("pkg.parser"),
            None,
            Some("pkg/parser.py"),
            Some("cache invalidation broke"),
            None,
            &["perf".to_string()],
        )
        .expect("log first");
    store
        .log_failure(
            "Tried rewriting in one pass",
            None,
            None,
            None,
            None,
            None,
            None,
            &["rewrite".to_string()],
        )
        .expect("log second");

    let by_entity =
        store.get_failure_logs(Some("pkg.parser"), None, None, &[], None, 50).expect("by entity");
    assert_eq!(by_entity.len(), 1);
    assert!(by_entity[0].entity_id.is_some());

    let by_tag = store
        .get_failure_logs(None, None, None, &["perf".to_string()], None, 50)
        .expect("by tag");
    assert_eq!(by_tag.len(), 1);
    assert_eq!(by_tag[0].tags, vec!["perf"]);

    let by_context = store
        .get_failure_logs(None, None, None, &[], Some("token stream"), 50)
        .expect("by context");
    assert_eq!(by_context.len(), 1);

    let recent = store.get_recent_failures(7, 20).expect("recent");
    assert_eq!(recent.len(), 2);
}

#[test]
fn failure_log_delete_and_retention() {
    let (_dir, store) = open_store();
    let id = store
        .log_failure("attempt", None, None, None, None, None, None, &[])
        .expect("log");
    assert!(store.delete_failure_log(id).expect("delete"));
    assert!(!store.delete_failure_log(id).expect("re-delete"));

    store.log_failure("fresh", None, None, None, None, None, None, &[]).expect("log fresh");
    // Nothing is older than 30 days in a fresh store.
    assert_eq!(store.clear_old_failures(30).expect("clear"), 0);
    assert_eq!(store.get_recent_failures(7, 20).expect("recent").len(), 1);
}
