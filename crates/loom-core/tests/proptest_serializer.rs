// crates/loom-core/tests/proptest_serializer.rs
// ============================================================================
// Module: Safe Serializer Property-Based Tests
// Description: Property tests for serializer totality and size bounds.
// Purpose: Detect panics and budget violations across wide input ranges.
// ============================================================================

//! Property-based tests for the safe serializer invariants.

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

use loom_core::TraceValue;
use loom_core::safe_serialize;
use loom_core::safe_serialize_with_budget;
use proptest::prelude::*;

fn trace_value_strategy(max_depth: u32) -> impl Strategy<Value = TraceValue> {
    let leaf = prop_oneof![
        Just(TraceValue::Null),
        any::<bool>().prop_map(TraceValue::Bool),
        any::<i64>().prop_map(TraceValue::Int),
        any::<f64>().prop_map(TraceValue::Float),
        ".*".prop_map(TraceValue::Str),
        prop::collection::vec(any::<u8>(), 0 .. 300).prop_map(TraceValue::Bytes),
        "[a-z_]{1,12}".prop_map(|name| TraceValue::Callable { name }),
    ];

    leaf.prop_recursive(max_depth, 128, 12, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0 .. 12).prop_map(TraceValue::List),
            prop::collection::vec(inner.clone(), 0 .. 12).prop_map(TraceValue::Set),
            prop::collection::vec(("[a-z]{1,6}", inner.clone()), 0 .. 8)
                .prop_map(TraceValue::Map),
            ("[A-Z][a-z]{1,8}", prop::collection::vec(("[a-z]{1,6}", inner), 0 .. 6))
                .prop_map(|(class, attrs)| TraceValue::Object { class, attrs }),
        ]
    })
}

proptest! {
    #[test]
    fn serializer_always_produces_valid_json(value in trace_value_strategy(6)) {
        let rendered = safe_serialize(&value);
        prop_assert!(serde_json::from_str::<serde_json::Value>(&rendered).is_ok());
    }

    #[test]
    fn serializer_respects_default_budget(value in trace_value_strategy(6)) {
        let rendered = safe_serialize(&value);
        // Over-budget payloads collapse to a small truncation object, so the
        // final string stays within the budget in every case.
        prop_assert!(rendered.chars().count() <= loom_core::serializer::MAX_SERIALIZED_SIZE);
    }

    #[test]
    fn serializer_respects_explicit_budget(
        value in trace_value_strategy(4),
        budget in 64usize .. 2048,
    ) {
        let rendered = safe_serialize_with_budget(&value, budget);
        // The truncation object itself is well under 64 characters.
        prop_assert!(rendered.chars().count() <= budget.max(64));
        prop_assert!(serde_json::from_str::<serde_json::Value>(&rendered).is_ok());
    }

    #[test]
    fn deep_values_never_panic(depth in 1u32 .. 40) {
        let mut value = TraceValue::Int(0);
        for _ in 0 .. depth {
            value = TraceValue::List(vec![value]);
        }
        let rendered = safe_serialize(&value);
        prop_assert!(!rendered.is_empty());
    }
}
