// crates/loom-store/tests/todo_queue.rs
// ============================================================================
// Module: TODO Queue Integration Tests
// Description: Ordering, lifecycle, combine, and reorder semantics.
// Purpose: Exercise the work-item queue end to end.
// ============================================================================

//! Integration tests for the TODO queue.

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

use loom_core::TodoId;
use loom_core::TodoStatus;
use loom_store::CodeStore;
use loom_store::NewTodo;
use loom_store::TodoFilter;
use loom_store::TodoUpdate;

fn open_store() -> (tempfile::TempDir, CodeStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CodeStore::open(dir.path().join("store.db")).expect("open store");
    (dir, store)
}

fn add(store: &CodeStore, prompt: &str) -> TodoId {
    store.add_todo(&NewTodo::new(prompt)).expect("add todo")
}

fn pending_positions(store: &CodeStore) -> Vec<(TodoId, i64)> {
    let mut items: Vec<(TodoId, i64)> = store
        .list_todos(&TodoFilter::default(), 100, false)
        .expect("list todos")
        .into_iter()
        .filter(|item| item.status == TodoStatus::Pending)
        .map(|item| (item.id, item.position.unwrap_or(0)))
        .collect();
    items.sort_by_key(|&(_, position)| position);
    items
}

#[test]
fn add_then_get_round_trips() {
    let (_dir, store) = open_store();
    let todo = NewTodo {
        title: Some("Short".to_string()),
        context: Some("why".to_string()),
        priority: 3,
        entity_name: Some("pkg.f".to_string()),
        file_path: Some("pkg/f.py".to_string()),
        tags: vec!["refactor".to_string(), "urgent".to_string()],
        estimated_minutes: Some(30),
        critical: true,
        ..NewTodo::new("Refactor the parser")
    };
    let id = store.add_todo(&todo).expect("add");
    let stored = store.get_todo(id).expect("get").expect("exists");
    assert_eq!(stored.prompt, "Refactor the parser");
    assert_eq!(stored.title.as_deref(), Some("Short"));
    assert_eq!(stored.priority, 3);
    assert_eq!(stored.position, Some(1));
    assert_eq!(stored.tags, vec!["refactor", "urgent"]);
    assert!(stored.critical);
    assert_eq!(stored.status, TodoStatus::Pending);

    let listed = store.list_todos(&TodoFilter::default(), 50, false).expect("list");
    assert_eq!(listed.len(), 1);
}

#[test]
fn title_defaults_to_prompt_prefix() {
    let (_dir, store) = open_store();
    let long_prompt = "x".repeat(80);
    let id = add(&store, &long_prompt);
    let stored = store.get_todo(id).expect("get").expect("exists");
    let title = stored.title.expect("auto title");
    assert!(title.ends_with("..."));
    assert_eq!(title.chars().count(), 53);
}

#[test]
fn reorder_then_combine_matches_queue_semantics() {
    let (_dir, store) = open_store();
    let first = add(&store, "A");
    let second = add(&store, "B");
    let third = add(&store, "C");

    // Move C to the front; A and B shift down one.
    assert!(store.reorder_todo(third, 1).expect("reorder"));
    let positions = pending_positions(&store);
    assert_eq!(positions, vec![(third, 1), (first, 2), (second, 3)]);

    // Combine B into A.
    assert!(store.combine_todos(first, &[second], None, None).expect("combine"));
    let merged = store.get_todo(second).expect("get").expect("exists");
    assert_eq!(merged.status, TodoStatus::Combined);
    assert_eq!(merged.combined_into, Some(first));

    let keeper = store.get_todo(first).expect("get").expect("exists");
    let context = keeper.context.expect("merged context");
    assert!(context.contains(&format!("[Merged from #{second}] B")));

    // The survivor of a combine is never itself combined.
    let survivor = store.get_todo(first).expect("get").expect("exists");
    assert_ne!(survivor.status, TodoStatus::Combined);
}

#[test]
fn combine_requires_merge_ids() {
    let (_dir, store) = open_store();
    let keep = add(&store, "A");
    assert!(store.combine_todos(keep, &[], None, None).is_err());
}

#[test]
fn lifecycle_transitions_stamp_timestamps() {
    let (_dir, store) = open_store();
    let id = add(&store, "work");

    assert!(store.start_todo(id).expect("start"));
    let started = store.get_todo(id).expect("get").expect("exists");
    assert_eq!(started.status, TodoStatus::InProgress);
    assert!(started.started_at.is_some());

    // Starting twice is a no-op.
    assert!(!store.start_todo(id).expect("restart"));

    assert!(store.complete_todo(id, Some("done well"), true).expect("complete"));
    let completed = store.get_todo(id).expect("get").expect("exists");
    assert_eq!(completed.status, TodoStatus::Completed);
    assert!(completed.completed_at.is_some());
    assert_eq!(completed.completion_notes.as_deref(), Some("done well"));
    assert_eq!(completed.metadata.get("success"), Some(&serde_json::json!(true)));

    // Completed items stay visible when asked for.
    let all = store.list_todos(&TodoFilter::default(), 50, true).expect("list all");
    assert_eq!(all.len(), 1);
    let open = store.list_todos(&TodoFilter::default(), 50, false).expect("list open");
    assert!(open.is_empty());
}

#[test]
fn pending_completes_directly() {
    let (_dir, store) = open_store();
    let id = add(&store, "quick fix");
    assert!(store.complete_todo(id, None, true).expect("complete"));
    let stored = store.get_todo(id).expect("get").expect("exists");
    assert_eq!(stored.status, TodoStatus::Completed);
}

#[test]
fn combined_items_refuse_completion() {
    let (_dir, store) = open_store();
    let keep = add(&store, "keep");
    let merge = add(&store, "merge");
    store.combine_todos(keep, &[merge], None, None).expect("combine");
    assert!(!store.complete_todo(merge, None, true).expect("complete combined"));
}

#[test]
fn next_todo_prefers_critical_then_priority_then_position() {
    let (_dir, store) = open_store();
    let _low = store.add_todo(&NewTodo { priority: 1, ..NewTodo::new("low") }).expect("add");
    let high =
        store.add_todo(&NewTodo { priority: 9, ..NewTodo::new("high") }).expect("add");
    let critical = store
        .add_todo(&NewTodo { priority: 2, critical: true, ..NewTodo::new("critical") })
        .expect("add");

    let next = store.get_next_todo(true).expect("next").expect("exists");
    assert_eq!(next.id, critical);

    let next = store.get_next_todo(false).expect("next no critical").expect("exists");
    assert_eq!(next.id, high);
}

#[test]
fn search_skips_closed_items() {
    let (_dir, store) = open_store();
    let open = add(&store, "fix the tokenizer");
    let closed = add(&store, "fix the parser");
    store.complete_todo(closed, None, true).expect("complete");

    let hits = store.search_todos("fix", 10).expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, open);
}

#[test]
fn update_touches_only_whitelisted_fields() {
    let (_dir, store) = open_store();
    let id = add(&store, "original");
    assert!(!store.update_todo(id, &TodoUpdate::default()).expect("empty update"));

    let update = TodoUpdate {
        prompt: Some("rewritten".to_string()),
        priority: Some(5),
        tags: Some(vec!["core".to_string()]),
        ..TodoUpdate::default()
    };
    assert!(store.update_todo(id, &update).expect("update"));
    let stored = store.get_todo(id).expect("get").expect("exists");
    assert_eq!(stored.prompt, "rewritten");
    assert_eq!(stored.priority, 5);
    assert_eq!(stored.tags, vec!["core"]);
    assert!(stored.updated_at.is_some());
}

#[test]
fn stats_count_by_status() {
    let (_dir, store) = open_store();
    let first = add(&store, "a");
    let second = add(&store, "b");
    add(&store, "c");
    store.start_todo(first).expect("start");
    store.complete_todo(second, None, true).expect("complete");

    let stats = store.get_todo_stats().expect("stats");
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.in_progress, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.total, 3);
    assert!(stats.by_status.contains_key("pending"));
}
