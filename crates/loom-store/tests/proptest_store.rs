// crates/loom-store/tests/proptest_store.rs
// ============================================================================
// Module: Store Property-Based Tests
// Description: Graph traversal termination, caller sets, queue ordering.
// Purpose: Check store invariants across randomized graphs and queues.
// ============================================================================

//! Property-based tests for the store: call-graph traversal terminates on
//! arbitrary graphs (self-loops and mutual cycles included), `get_callers`
//! returns exactly the `calls` sources, and reordering keeps the pending
//! queue's positions a contiguous 1-based range.

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

use std::collections::BTreeSet;

use loom_core::EntityId;
use loom_core::EntityKind;
use loom_core::RelationKind;
use loom_store::CodeStore;
use loom_store::NewTodo;
use loom_store::TodoFilter;
use proptest::prelude::*;

const NODE_COUNT: usize = 6;

fn build_graph(edges: &[(usize, usize)]) -> (CodeStore, Vec<EntityId>) {
    let store = CodeStore::open(":memory:").expect("open in-memory store");
    let ids: Vec<EntityId> = (0 .. NODE_COUNT)
        .map(|index| {
            store
                .add_entity(&format!("mod.f{index}"), EntityKind::Function, None, None, None)
                .expect("add entity")
        })
        .collect();
    let mut seen = BTreeSet::new();
    for &(source, target) in edges {
        if seen.insert((source, target)) {
            store
                .add_relationship(ids[source], ids[target], RelationKind::Calls, None)
                .expect("add edge");
        }
    }
    (store, ids)
}

fn count_nodes(node: &loom_store::CallGraphNode) -> usize {
    1 + node.calls.iter().map(count_nodes).sum::<usize>()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn call_graph_terminates_on_any_graph(
        edges in prop::collection::vec(
            (0 .. NODE_COUNT, 0 .. NODE_COUNT),
            0 .. 20,
        ),
        root in 0 .. NODE_COUNT,
        depth in prop_oneof![Just(-1i64), (0i64 .. 4)],
    ) {
        let (store, ids) = build_graph(&edges);
        let recursive = depth == -1;
        let graph = store
            .get_call_graph(ids[root], depth, recursive)
            .expect("traversal succeeds")
            .expect("root exists");
        // Termination is the property; the rendered tree is finite and the
        // root is the queried entity.
        prop_assert_eq!(graph.entity.id, ids[root]);
        prop_assert!(count_nodes(&graph) < 10_000);
    }

    #[test]
    fn callers_equal_calls_edge_sources(
        edges in prop::collection::vec(
            (0 .. NODE_COUNT, 0 .. NODE_COUNT),
            0 .. 20,
        ),
        target in 0 .. NODE_COUNT,
    ) {
        let (store, ids) = build_graph(&edges);
        let expected: BTreeSet<EntityId> = edges
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|&&(_, to)| to == target)
            .map(|&(from, _)| ids[from])
            .collect();
        let actual: BTreeSet<EntityId> = store
            .get_callers(ids[target])
            .expect("callers")
            .into_iter()
            .map(|entity| entity.id)
            .collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn reordering_keeps_positions_contiguous(
        count in 2usize .. 8,
        moves in prop::collection::vec((0usize .. 8, 1i64 .. 9), 1 .. 12),
    ) {
        let store = CodeStore::open(":memory:").expect("open in-memory store");
        let mut ids = Vec::new();
        for index in 0 .. count {
            ids.push(store.add_todo(&NewTodo::new(format!("task {index}"))).expect("add"));
        }
        for &(which, position) in &moves {
            let id = ids[which % count];
            let clamped = 1 + (position - 1) % i64::try_from(count).unwrap_or(1);
            prop_assert!(store.reorder_todo(id, clamped).expect("reorder"));
        }

        let mut positions: Vec<i64> = store
            .list_todos(&TodoFilter::default(), 50, false)
            .expect("list")
            .into_iter()
            .filter_map(|todo| todo.position)
            .collect();
        positions.sort_unstable();
        let expected: Vec<i64> = (1 ..= i64::try_from(count).unwrap_or(0)).collect();
        prop_assert_eq!(positions, expected);
    }
}
