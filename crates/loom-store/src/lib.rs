// crates/loom-store/src/lib.rs
// ============================================================================
// Module: Loom Store Library
// Description: Persistent code-knowledge store backed by SQLite.
// Purpose: Own the database connection and expose every core subsystem.
// Dependencies: loom-core, loom-parsers, rusqlite, sqlite-vec
// ============================================================================

//! ## Overview
//! `loom-store` is the durable substrate of Loom: a single-process,
//! single-writer store over one SQLite file. One [`CodeStore`] owns the
//! connection and exposes the subsystems as method groups sharing it:
//!
//! - the entity/relationship graph with CRUD and traversal,
//! - the ingestion coordinator walking path sets through the parser registry,
//! - the change tracker mapping file modifications to entities and tests,
//! - the second-pass import and call analyses,
//! - the trace recorder fed by an external tracer,
//! - the query engine (impact, usages, call graphs, paths, summaries),
//! - the knowledge base of notes and note-entity links,
//! - the TODO queue with ordering and combine semantics,
//! - the failure log,
//! - optional vector search behind a capability probe.
//!
//! Every public mutation commits before returning. Readers that find nothing
//! return empty results; mutations with no effect return `Ok(false)`.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod analysis;
mod changes;
mod failures;
mod graph;
mod ingest;
mod notes;
mod query;
mod schema;
mod store;
mod todos;
mod trace;
mod vector;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use analysis::AnalysisStats;
pub use changes::ChangeKind;
pub use changes::ChangedEntity;
pub use changes::ChangedFile;
pub use graph::EntityUpdate;
pub use ingest::DEFAULT_EXCLUDE_PATTERNS;
pub use notes::EntityRef;
pub use notes::HypothesisEvidence;
pub use notes::HypothesisReport;
pub use notes::MentionedEntity;
pub use query::CallGraphNode;
pub use query::CentralEntity;
pub use query::ImpactReport;
pub use query::MatchField;
pub use query::QueryMatch;
pub use query::UsageRef;
pub use store::CodeStore;
pub use store::StoreError;
pub use store::StoreOptions;
pub use todos::NewTodo;
pub use todos::TodoFilter;
pub use todos::TodoUpdate;
pub use trace::CallRecord;
pub use vector::EmbeddingStats;
pub use vector::NoteSearchHit;
pub use vector::SemanticHit;
pub use vector::TextEmbedder;
