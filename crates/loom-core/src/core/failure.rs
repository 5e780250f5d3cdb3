// crates/loom-core/src/core/failure.rs
// ============================================================================
// Module: Loom Failure Log Model
// Description: Append-only record of attempted fixes that did not work.
// Purpose: Let developers and LLMs avoid repeating unsuccessful approaches.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A failure-log entry records one attempted fix: what was tried, what it was
//! tried on, why it failed, and any related error text. Entries are
//! append-only and filtered by entity, file, tag, or free-text context.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::EntityId;
use crate::core::identifiers::FailureLogId;

// ============================================================================
// SECTION: Failure Record
// ============================================================================

/// One logged fix attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureLogEntry {
    /// Stable row identifier.
    pub id: FailureLogId,
    /// When the attempt was logged (ISO-8601 UTC).
    pub timestamp: String,
    /// Entity being fixed, when resolvable.
    pub entity_id: Option<EntityId>,
    /// Entity name as supplied by the caller.
    pub entity_name: Option<String>,
    /// File being worked on.
    pub file_path: Option<String>,
    /// What was being attempted.
    pub context: Option<String>,
    /// Description of what was tried.
    pub attempted_fix: String,
    /// Why it did not work.
    pub failure_reason: Option<String>,
    /// Error message, if one was produced.
    pub related_error: Option<String>,
    /// Tags (persisted as a comma-joined string).
    pub tags: Vec<String>,
}
