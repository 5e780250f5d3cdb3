// crates/loom-core/src/core/todo.rs
// ============================================================================
// Module: Loom TODO Model
// Description: Ordered work items with priority, position, and combine lineage.
// Purpose: Represent the persistent work queue managed by the store.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! TODOs are durable work items ordered by priority (descending) and then by
//! a 1-based position forming a FIFO order within equal priority. The status
//! lifecycle is:
//!
//! ```text
//! pending --start--> in_progress --complete--> completed
//!    |                                ^
//!    +--combine--> combined           +-- complete (from pending)
//! ```
//!
//! `combined` and `completed` are terminal. A combined item records the
//! surviving item in `combined_into`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::entity::MetadataBag;
use crate::core::identifiers::TodoId;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Lifecycle status of a TODO work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    /// Waiting in the queue.
    Pending,
    /// Work has started.
    InProgress,
    /// Finished (terminal).
    Completed,
    /// Merged into another item (terminal).
    Combined,
}

impl TodoStatus {
    /// Returns the stable wire name stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Combined => "combined",
        }
    }
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TodoStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "combined" => Ok(Self::Combined),
            other => Err(format!("unknown todo status: {other}")),
        }
    }
}

// ============================================================================
// SECTION: TODO Record
// ============================================================================

/// A persistent work item.
///
/// # Invariants
/// - When `status` is `Combined`, `combined_into` references a TODO whose
///   status is not `Combined`.
/// - Positions form a total 1-based order over pending items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    /// Stable row identifier.
    pub id: TodoId,
    /// Short display name (auto-derived from the prompt when absent at add).
    pub title: Option<String>,
    /// The task description.
    pub prompt: String,
    /// Additional context (accumulates `[Merged from #N]` blocks on combine).
    pub context: Option<String>,
    /// Lifecycle status.
    pub status: TodoStatus,
    /// Priority; higher is more urgent.
    pub priority: i64,
    /// 1-based FIFO position within equal priority.
    pub position: Option<i64>,
    /// Creation timestamp (ISO-8601 UTC).
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: Option<String>,
    /// Timestamp when work started.
    pub started_at: Option<String>,
    /// Timestamp when work completed.
    pub completed_at: Option<String>,
    /// Optional time estimate in minutes.
    pub estimated_minutes: Option<i64>,
    /// Critical items sort ahead of non-critical at equal priority.
    pub critical: bool,
    /// Tags (persisted as a comma-joined string).
    pub tags: Vec<String>,
    /// Surviving TODO id when this item was combined.
    pub combined_into: Option<TodoId>,
    /// Notes recorded at completion.
    pub completion_notes: Option<String>,
    /// Related entity name.
    pub entity_name: Option<String>,
    /// Related file path.
    pub file_path: Option<String>,
    /// Free-form metadata bag (holds `result` and `success` after completion).
    pub metadata: MetadataBag,
}

/// Per-status aggregate for [`TodoStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoStatusStats {
    /// Number of items in this status.
    pub count: i64,
    /// Mean priority of items in this status.
    pub avg_priority: Option<f64>,
}

/// Aggregate counts over the TODO queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoStats {
    /// Pending item count.
    pub pending: i64,
    /// In-progress item count.
    pub in_progress: i64,
    /// Completed item count.
    pub completed: i64,
    /// Combined item count.
    pub combined: i64,
    /// Total item count.
    pub total: i64,
    /// Per-status counts with average priority, keyed by status wire name.
    pub by_status: BTreeMap<String, TodoStatusStats>,
}
