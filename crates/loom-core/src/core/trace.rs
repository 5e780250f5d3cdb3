// crates/loom-core/src/core/trace.rs
// ============================================================================
// Module: Loom Trace Model
// Description: Trace runs, recorded calls, ingest runs, and their statistics.
// Purpose: Represent execution history streamed in by the external tracer.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A trace run is one logical program execution; its calls form a forest via
//! `parent_call_id` with `depth` equal to the length of the parent chain.
//! Ingest runs bracket one pass of the ingestion coordinator over a path set
//! and drive change tracking. Both are append-only while running; the run row
//! is updated once on end.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::IngestRunId;
use crate::core::identifiers::TraceCallId;
use crate::core::identifiers::TraceRunId;

// ============================================================================
// SECTION: Run Status
// ============================================================================

/// Final or in-flight status of a trace run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceRunStatus {
    /// The run is still producing calls.
    Running,
    /// The traced program exited normally.
    Completed,
    /// The traced program failed (non-zero exit).
    Failed,
    /// The traced program crashed before ending the run cleanly.
    Crashed,
}

impl TraceRunStatus {
    /// Returns the stable wire name stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Crashed => "crashed",
        }
    }
}

impl fmt::Display for TraceRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TraceRunStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "crashed" => Ok(Self::Crashed),
            other => Err(format!("unknown trace run status: {other}")),
        }
    }
}

/// Final or in-flight status of an ingest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// The ingest pass is in flight.
    Running,
    /// The ingest pass finished.
    Completed,
    /// The ingest pass aborted on an unhandled error.
    Failed,
}

impl IngestStatus {
    /// Returns the stable wire name stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngestStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown ingest status: {other}")),
        }
    }
}

// ============================================================================
// SECTION: Trace Records
// ============================================================================

/// One logical program execution recorded by the external tracer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRun {
    /// Run identifier (UUID string).
    pub run_id: TraceRunId,
    /// Start timestamp (ISO-8601 UTC).
    pub started_at: String,
    /// End timestamp, set by `end_trace_run`.
    pub ended_at: Option<String>,
    /// What was executed.
    pub command: Option<String>,
    /// Process exit code, when known.
    pub exit_code: Option<i64>,
    /// Run status.
    pub status: TraceRunStatus,
}

/// One recorded function invocation within a trace run.
///
/// # Invariants
/// - `parent_call_id` is null or references another call in the same run.
/// - `depth` equals the length of the parent chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceCall {
    /// Call identifier (UUID string).
    pub call_id: TraceCallId,
    /// Run this call belongs to.
    pub run_id: TraceRunId,
    /// Fully-qualified function name (`module.Class.method`).
    pub function_name: String,
    /// Source file path.
    pub file_path: Option<String>,
    /// Line number of the function definition.
    pub line_number: Option<i64>,
    /// Invocation timestamp (ISO-8601 UTC).
    pub called_at: String,
    /// Return timestamp.
    pub returned_at: Option<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Positional arguments, decoded from the safe-serialized JSON.
    pub args: Option<Value>,
    /// Keyword arguments, decoded from the safe-serialized JSON.
    pub kwargs: Option<Value>,
    /// Return value, decoded from the safe-serialized JSON.
    pub return_value: Option<Value>,
    /// Exception type, when one was raised.
    pub exception_type: Option<String>,
    /// Exception message.
    pub exception_message: Option<String>,
    /// Full traceback text.
    pub exception_traceback: Option<String>,
    /// Parent call for nested invocations.
    pub parent_call_id: Option<TraceCallId>,
    /// Nesting depth (0 for top-level calls).
    pub depth: i64,
}

/// A failed call joined to its run's command and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCall {
    /// The call that raised.
    pub call: TraceCall,
    /// Command of the owning run.
    pub command: Option<String>,
    /// Status of the owning run.
    pub run_status: TraceRunStatus,
}

/// Per-function invocation count used in global trace statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallCount {
    /// Fully-qualified function name.
    pub function: String,
    /// Number of recorded calls.
    pub count: i64,
}

/// Aggregate statistics over trace data.
///
/// Per-run statistics carry `run_id` and `status`; global statistics carry
/// `run_count` and `top_functions` instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceStats {
    /// Run the statistics describe, when scoped to one run.
    pub run_id: Option<TraceRunId>,
    /// Status of that run.
    pub status: Option<TraceRunStatus>,
    /// Number of runs (global scope only).
    pub run_count: Option<i64>,
    /// Number of recorded calls.
    pub call_count: i64,
    /// Number of calls that raised.
    pub exception_count: i64,
    /// Mean duration over calls with a recorded duration.
    pub avg_duration_ms: Option<f64>,
    /// Maximum nesting depth (per-run scope only).
    pub max_depth: Option<i64>,
    /// Most-called functions (global scope only).
    pub top_functions: Vec<FunctionCallCount>,
}

// ============================================================================
// SECTION: Ingest Records
// ============================================================================

/// Counts produced by one ingest pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Modules ingested.
    pub modules: i64,
    /// Free functions ingested.
    pub functions: i64,
    /// Classes ingested.
    pub classes: i64,
    /// Methods ingested.
    pub methods: i64,
    /// Files skipped due to parse errors.
    pub errors: i64,
}

/// One logical pass of the ingestion coordinator over a path set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRun {
    /// Run identifier (UUID string).
    pub run_id: IngestRunId,
    /// Start timestamp (ISO-8601 UTC).
    pub started_at: String,
    /// End timestamp.
    pub ended_at: Option<String>,
    /// Root paths the pass covered.
    pub paths: Vec<String>,
    /// Final counts, set on end.
    pub stats: Option<IngestStats>,
    /// Run status.
    pub status: IngestStatus,
}
