// crates/loom-store/tests/trace_recording.rs
// ============================================================================
// Module: Trace Recording Integration Tests
// Description: Run lifecycle, call recording, and trace queries.
// Purpose: Exercise the tracer-facing API end to end.
// ============================================================================

//! Integration tests for the trace recorder.

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

use std::sync::Arc;

use loom_core::TraceRunId;
use loom_core::TraceRunStatus;
use loom_core::TraceValue;
use loom_store::CallRecord;
use loom_store::CodeStore;

fn open_store() -> (tempfile::TempDir, CodeStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CodeStore::open(dir.path().join("store.db")).expect("open store");
    (dir, store)
}

#[test]
fn failed_run_reports_exception_and_depth() {
    let (_dir, store) = open_store();
    let run = store.start_trace_run(Some("pytest")).expect("start run");

    let outer = store
        .record_call(
            &run,
            CallRecord {
                called_at: Some("2026-03-01T00:00:00.000000Z".to_string()),
                depth: 0,
                ..CallRecord::new("m.outer")
            },
        )
        .expect("record outer");
    store
        .record_call(
            &run,
            CallRecord {
                called_at: Some("2026-03-01T00:00:00.000100Z".to_string()),
                exception_type: Some("ValueError".to_string()),
                exception_message: Some("bad input".to_string()),
                parent_call_id: Some(outer.clone()),
                depth: 1,
                ..CallRecord::new("m.inner")
            },
        )
        .expect("record inner");
    assert!(store.end_trace_run(&run, TraceRunStatus::Failed, Some(1)).expect("end run"));

    let failed = store.get_failed_calls(Some(&run), 50).expect("failed calls");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].call.function_name, "m.inner");
    assert_eq!(failed[0].run_status, TraceRunStatus::Failed);
    assert_eq!(failed[0].command.as_deref(), Some("pytest"));

    let calls = store.get_calls_for_run(&run, true, false).expect("calls for run");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].function_name, "m.outer");
    assert_eq!(calls[1].parent_call_id.as_ref(), Some(&outer));

    let stats = store.get_trace_stats(Some(&run)).expect("stats");
    assert_eq!(stats.call_count, 2);
    assert_eq!(stats.exception_count, 1);
    assert_eq!(stats.max_depth, Some(1));
    assert_eq!(stats.status, Some(TraceRunStatus::Failed));
}

#[test]
fn args_round_trip_through_the_safe_serializer() {
    let (_dir, store) = open_store();
    let run = store.start_trace_run(None).expect("start run");
    store
        .record_call(
            &run,
            CallRecord {
                args: Some(TraceValue::List(vec![
                    TraceValue::Int(1),
                    TraceValue::from("two"),
                ])),
                kwargs: Some(TraceValue::Map(vec![(
                    "flag".to_string(),
                    TraceValue::Bool(true),
                )])),
                return_value: Some(TraceValue::Bytes(vec![0u8; 4_096])),
                ..CallRecord::new("m.f")
            },
        )
        .expect("record call");

    let calls = store.get_calls_for_run(&run, true, false).expect("calls");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].args, Some(serde_json::json!([1, "two"])));
    assert_eq!(calls[0].kwargs, Some(serde_json::json!({"flag": true})));
    assert_eq!(calls[0].return_value, Some(serde_json::json!("<bytes len=4096>")));

    let stripped = store.get_calls_for_run(&run, false, false).expect("calls without args");
    assert!(stripped[0].args.is_none());
    assert!(stripped[0].return_value.is_none());
}

#[test]
fn recent_calls_support_exact_and_pattern_lookup() {
    let (_dir, store) = open_store();
    let run = store.start_trace_run(None).expect("start run");
    for (name, at) in [
        ("pkg.alpha", "2026-03-01T00:00:01.000000Z"),
        ("pkg.beta", "2026-03-01T00:00:02.000000Z"),
        ("pkg.alpha", "2026-03-01T00:00:03.000000Z"),
    ] {
        store
            .record_call(
                &run,
                CallRecord { called_at: Some(at.to_string()), ..CallRecord::new(name) },
            )
            .expect("record call");
    }

    let exact = store.get_recent_calls("pkg.alpha", 10, false).expect("exact");
    assert_eq!(exact.len(), 2);
    assert_eq!(exact[0].called_at, "2026-03-01T00:00:03.000000Z");

    let pattern = store.get_recent_calls("pkg.%", 10, false).expect("pattern");
    assert_eq!(pattern.len(), 3);

    let missing = store.get_recent_calls("pkg.gamma", 10, false).expect("missing");
    assert!(missing.is_empty());
}

#[test]
fn ending_an_unknown_run_reports_no_change() {
    let (_dir, store) = open_store();
    let phantom = TraceRunId::new("no-such-run");
    let changed = store
        .end_trace_run(&phantom, TraceRunStatus::Completed, Some(0))
        .expect("end unknown");
    assert!(!changed);
}

#[test]
fn concurrent_recording_serializes_on_the_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(CodeStore::open(dir.path().join("store.db")).expect("open store"));
    let run = store.start_trace_run(Some("threads")).expect("start run");

    let mut handles = Vec::new();
    for thread_index in 0 .. 4 {
        let store = Arc::clone(&store);
        let run = run.clone();
        handles.push(std::thread::spawn(move || {
            for call_index in 0 .. 25 {
                let record =
                    CallRecord::new(format!("worker{thread_index}.call{call_index}"));
                store.record_call(&run, record).expect("record call");
            }
        }));
    }
    for handle in handles {
        handle.join().expect("thread join");
    }
    store.end_trace_run(&run, TraceRunStatus::Completed, Some(0)).expect("end run");

    let stats = store.get_trace_stats(Some(&run)).expect("stats");
    assert_eq!(stats.call_count, 100);
}

#[test]
fn global_stats_rank_top_functions() {
    let (_dir, store) = open_store();
    let run = store.start_trace_run(None).expect("start run");
    for _ in 0 .. 3 {
        store.record_call(&run, CallRecord::new("m.hot")).expect("record hot");
    }
    store.record_call(&run, CallRecord::new("m.cold")).expect("record cold");

    let stats = store.get_trace_stats(None).expect("global stats");
    assert_eq!(stats.run_count, Some(1));
    assert_eq!(stats.call_count, 4);
    assert_eq!(stats.top_functions[0].function, "m.hot");
    assert_eq!(stats.top_functions[0].count, 3);
}
