// crates/loom-core/src/lib.rs
// ============================================================================
// Module: Loom Core Library
// Description: Domain types and contracts for the Loom code-knowledge graph.
// Purpose: Provide the shared vocabulary used by parsers, the store, and the CLI.
// Dependencies: chrono, serde, serde_json, thiserror, uuid
// ============================================================================

//! ## Overview
//! `loom-core` defines the domain model of the Loom code-knowledge graph:
//! entities and typed relationships extracted from source code, runtime trace
//! records, knowledge-base notes, TODO work items, and failure-log entries.
//! It also carries the two external-collaborator contracts the engine depends
//! on: the parser registry (language plug-ins producing entities and
//! relationships) and the bounded safe serializer used for trace payloads.
//!
//! This crate performs no I/O. Persistence lives in `loom-store`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod serializer;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::core::entity::Entity;
pub use crate::core::entity::EntityKind;
pub use crate::core::entity::MetadataBag;
pub use crate::core::entity::short_name;
pub use crate::core::failure::FailureLogEntry;
pub use crate::core::identifiers::EntityId;
pub use crate::core::identifiers::FailureLogId;
pub use crate::core::identifiers::IngestRunId;
pub use crate::core::identifiers::NoteId;
pub use crate::core::identifiers::RelationshipId;
pub use crate::core::identifiers::TodoId;
pub use crate::core::identifiers::TraceCallId;
pub use crate::core::identifiers::TraceRunId;
pub use crate::core::note::LinkedNote;
pub use crate::core::note::Note;
pub use crate::core::note::NoteLinkType;
pub use crate::core::note::NoteStats;
pub use crate::core::note::NoteStatus;
pub use crate::core::note::NoteType;
pub use crate::core::relation::Direction;
pub use crate::core::relation::RelationKind;
pub use crate::core::relation::Relationship;
pub use crate::core::relation::RelationshipSummary;
pub use crate::core::time::now_iso8601;
pub use crate::core::todo::TodoItem;
pub use crate::core::todo::TodoStats;
pub use crate::core::todo::TodoStatus;
pub use crate::core::trace::FailedCall;
pub use crate::core::trace::IngestRun;
pub use crate::core::trace::IngestStats;
pub use crate::core::trace::IngestStatus;
pub use crate::core::trace::TraceCall;
pub use crate::core::trace::TraceRun;
pub use crate::core::trace::TraceRunStatus;
pub use crate::core::trace::TraceStats;
pub use interfaces::CallSite;
pub use interfaces::CallSiteKind;
pub use interfaces::CodeReferences;
pub use interfaces::ImportInfo;
pub use interfaces::ImportRecord;
pub use interfaces::ImportType;
pub use interfaces::ParseError;
pub use interfaces::ParseOutcome;
pub use interfaces::ParsedEntity;
pub use interfaces::ParsedRelationship;
pub use interfaces::ParserRegistry;
pub use interfaces::SourceParser;
pub use serializer::TraceValue;
pub use serializer::safe_serialize;
pub use serializer::safe_serialize_with_budget;
