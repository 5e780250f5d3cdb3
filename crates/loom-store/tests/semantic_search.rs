// crates/loom-store/tests/semantic_search.rs
// ============================================================================
// Module: Semantic Search Integration Tests
// Description: Capability gating, embedding generation, and KNN retrieval.
// Purpose: Exercise the vector surface with a deterministic test embedder.
// ============================================================================

//! Integration tests for the optional vector capability. A deterministic
//! hash-projection embedder stands in for the real model: identical texts
//! embed identically, so exact-text queries must surface their entity first.

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

use loom_core::EntityKind;
use loom_core::NoteLinkType;
use loom_core::NoteType;
use loom_store::CodeStore;
use loom_store::SemanticHit;
use loom_store::StoreError;
use loom_store::StoreOptions;
use loom_store::TextEmbedder;

/// Deterministic embedder: a seeded linear-congruential projection of the
/// text bytes into 384 dimensions.
struct HashEmbedder;

impl TextEmbedder for HashEmbedder {
    fn dimension(&self) -> usize {
        384
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut state: u64 = 0x9e37_79b9;
                for byte in text.bytes() {
                    state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(u64::from(byte));
                }
                (0 .. 384)
                    .map(|index| {
                        state = state
                            .wrapping_mul(6_364_136_223_846_793_005)
                            .wrapping_add(index);
                        // Map into [-1, 1).
                        ((state >> 33) as f32 / f32::from(u16::MAX)).rem_euclid(2.0) - 1.0
                    })
                    .collect()
            })
            .collect())
    }
}

fn open_with_embedder(dir: &std::path::Path) -> CodeStore {
    let options = StoreOptions {
        embedder: Some(Arc::new(HashEmbedder)),
        ..StoreOptions::default()
    };
    CodeStore::open_with(dir.join("store.db"), options).expect("open store")
}

#[test]
fn disabled_vector_search_degrades_cleanly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let options = StoreOptions { vector_search: false, ..StoreOptions::default() };
    let store =
        CodeStore::open_with(dir.path().join("store.db"), options).expect("open store");
    assert!(!store.vector_available());

    assert!(matches!(
        store.generate_embeddings(),
        Err(StoreError::CapabilityUnavailable(_))
    ));
    assert!(matches!(
        store.semantic_search("anything", 5, false),
        Err(StoreError::CapabilityUnavailable(_))
    ));
    assert!(matches!(
        store.search_notes("anything", None, 5),
        Err(StoreError::CapabilityUnavailable(_))
    ));

    // Everything non-vector still works.
    let id = store
        .add_entity("pkg.f", EntityKind::Function, None, None, None)
        .expect("add entity");
    assert!(store.get_entity(id).expect("get").is_some());
}

#[test]
fn missing_embedder_is_a_capability_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CodeStore::open(dir.path().join("store.db")).expect("open store");
    assert!(matches!(
        store.generate_embeddings(),
        Err(StoreError::CapabilityUnavailable(_))
    ));
}

#[test]
fn search_before_generation_is_invalid() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_with_embedder(dir.path());
    store.add_entity("pkg.f", EntityKind::Function, None, None, None).expect("add");
    assert!(matches!(
        store.semantic_search("pkg.f", 5, false),
        Err(StoreError::Invalid(_))
    ));
}

#[test]
fn exact_text_query_surfaces_its_entity_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_with_embedder(dir.path());
    store
        .add_entity("alpha", EntityKind::Function, None, None, None)
        .expect("add alpha");
    store
        .add_entity("beta", EntityKind::Function, None, None, None)
        .expect("add beta");
    store
        .add_entity("gamma", EntityKind::Function, None, None, None)
        .expect("add gamma");

    let stats = store.generate_embeddings().expect("generate");
    assert_eq!(stats.entities_processed, 3);
    assert_eq!(stats.embeddings_created, 3);
    assert_eq!(stats.skipped, 0);

    // The embedded text for a bare entity is exactly its name, so querying
    // that name gives distance zero.
    let hits = store.semantic_search("alpha", 2, false).expect("search");
    assert!(!hits.is_empty());
    match &hits[0] {
        SemanticHit::Entity { entity, score, .. } => {
            assert_eq!(entity.name, "alpha");
            assert!((*score - 1.0).abs() < 1e-6);
        }
        SemanticHit::Note { .. } => panic!("expected an entity hit"),
    }
}

#[test]
fn duplicate_names_collapse_to_the_best_hit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_with_embedder(dir.path());
    // The same entity ingested twice produces duplicate names.
    store.add_entity("pkg.dup", EntityKind::Function, None, None, None).expect("add");
    store.add_entity("pkg.dup", EntityKind::Function, None, None, None).expect("add again");
    store.generate_embeddings().expect("generate");

    let hits = store.semantic_search("pkg.dup", 10, false).expect("search");
    let dup_hits = hits
        .iter()
        .filter(|hit| matches!(hit, SemanticHit::Entity { entity, .. } if entity.name == "pkg.dup"))
        .count();
    assert_eq!(dup_hits, 1);
}

#[test]
fn note_search_round_trips_with_type_filter() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_with_embedder(dir.path());
    store
        .add_note(
            "the cache drops entries too early",
            NoteType::Bug,
            Some("cache bug"),
            None,
            &[],
            NoteLinkType::About,
        )
        .expect("add bug note");
    store
        .add_note(
            "design sketch for the planner",
            NoteType::Analysis,
            Some("planner"),
            None,
            &[],
            NoteLinkType::About,
        )
        .expect("add analysis note");
    // At least one entity so the entity table is non-empty for generation.
    store.add_entity("pkg.cache", EntityKind::Module, None, None, None).expect("add entity");

    let stats = store.generate_embeddings().expect("generate");
    assert_eq!(stats.note_embeddings_created, 2);

    let hits = store
        .search_notes("cache bug the cache drops entries too early", Some(NoteType::Bug), 5)
        .expect("note search");
    assert!(!hits.is_empty());
    assert_eq!(hits[0].note.note_type, NoteType::Bug);

    let include_notes =
        store.semantic_search("cache bug the cache drops entries too early", 5, true);
    let hits = include_notes.expect("combined search");
    assert!(hits.iter().any(|hit| matches!(hit, SemanticHit::Note { .. })));
}
