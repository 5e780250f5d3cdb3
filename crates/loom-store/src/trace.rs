// crates/loom-store/src/trace.rs
// ============================================================================
// Module: Loom Trace Recorder
// Description: Streaming call recording for external tracers.
// Purpose: Store runs, calls, and parent/child structure; answer trace queries.
// Dependencies: loom-core, rusqlite
// ============================================================================

//! ## Overview
//! The external tracer calls `start_trace_run`, streams `record_call` (from
//! any number of threads; the connection mutex serializes inserts, each
//! committing before return), and calls `end_trace_run` exactly once.
//! Argument, keyword, and return payloads pass through the bounded safe
//! serializer, so recording never fails on an unserializable value.
//!
//! Parent/child integrity is the tracer's responsibility: the store writes
//! `parent_call_id` and `depth` as given and does not validate the chain.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;

use loom_core::FailedCall;
use loom_core::TraceCall;
use loom_core::TraceCallId;
use loom_core::TraceRun;
use loom_core::TraceRunId;
use loom_core::TraceRunStatus;
use loom_core::TraceStats;
use loom_core::TraceValue;
use loom_core::core::trace::FunctionCallCount;
use loom_core::now_iso8601;
use loom_core::safe_serialize;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;

use crate::store::CodeStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Call Records
// ============================================================================

/// One call event streamed in by the tracer.
///
/// All fields except `function_name` are optional; `called_at` defaults to
/// the current time when absent.
#[derive(Debug, Clone, Default)]
pub struct CallRecord {
    /// Fully-qualified function name (`module.Class.method`).
    pub function_name: String,
    /// Source file path.
    pub file_path: Option<String>,
    /// Line number of the function definition.
    pub line_number: Option<i64>,
    /// Invocation timestamp (ISO-8601); now when absent.
    pub called_at: Option<String>,
    /// Return timestamp.
    pub returned_at: Option<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Positional arguments.
    pub args: Option<TraceValue>,
    /// Keyword arguments.
    pub kwargs: Option<TraceValue>,
    /// Return value.
    pub return_value: Option<TraceValue>,
    /// Exception type, when one was raised.
    pub exception_type: Option<String>,
    /// Exception message.
    pub exception_message: Option<String>,
    /// Full traceback text.
    pub exception_traceback: Option<String>,
    /// Parent call id for nested invocations.
    pub parent_call_id: Option<TraceCallId>,
    /// Nesting depth (length of the parent chain).
    pub depth: i64,
}

impl CallRecord {
    /// Creates a record with only the function name set.
    #[must_use]
    pub fn new(function_name: impl Into<String>) -> Self {
        Self { function_name: function_name.into(), ..Self::default() }
    }
}

// ============================================================================
// SECTION: Recording
// ============================================================================

impl CodeStore {
    /// Starts a new trace run and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn start_trace_run(&self, command: Option<&str>) -> Result<TraceRunId, StoreError> {
        let run_id = TraceRunId::generate();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO trace_runs (run_id, started_at, command, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![run_id.as_str(), now_iso8601(), command, TraceRunStatus::Running.as_str()],
        )?;
        Ok(run_id)
    }

    /// Ends a trace run; returns whether the run existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn end_trace_run(
        &self,
        run_id: &TraceRunId,
        status: TraceRunStatus,
        exit_code: Option<i64>,
    ) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE trace_runs SET ended_at = ?1, status = ?2, exit_code = ?3
             WHERE run_id = ?4",
            params![now_iso8601(), status.as_str(), exit_code, run_id.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Records one function call within a run and returns its call id.
    ///
    /// Safe to call from multiple threads; inserts are serialized on the
    /// connection mutex and commit per call.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure, including an unknown
    /// run id (foreign-key violation).
    pub fn record_call(
        &self,
        run_id: &TraceRunId,
        record: CallRecord,
    ) -> Result<TraceCallId, StoreError> {
        let call_id = TraceCallId::generate();
        let called_at = record.called_at.unwrap_or_else(now_iso8601);
        let args_json = record.args.as_ref().map(safe_serialize);
        let kwargs_json = record.kwargs.as_ref().map(safe_serialize);
        let return_json = record.return_value.as_ref().map(safe_serialize);

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO trace_calls (
                 call_id, run_id, function_name, file_path, line_number,
                 called_at, returned_at, duration_ms, args_json, kwargs_json,
                 return_value_json, exception_type, exception_message,
                 exception_traceback, parent_call_id, depth
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                call_id.as_str(),
                run_id.as_str(),
                record.function_name,
                record.file_path,
                record.line_number,
                called_at,
                record.returned_at,
                record.duration_ms,
                args_json,
                kwargs_json,
                return_json,
                record.exception_type,
                record.exception_message,
                record.exception_traceback,
                record.parent_call_id.as_ref().map(TraceCallId::as_str),
                record.depth,
            ],
        )?;
        Ok(call_id)
    }
}

// ============================================================================
// SECTION: Queries
// ============================================================================

impl CodeStore {
    /// Returns a trace run by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_trace_run(&self, run_id: &TraceRunId) -> Result<Option<TraceRun>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM trace_runs WHERE run_id = ?1",
            params![run_id.as_str()],
            trace_run_from_row,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Returns a run's calls ordered by `called_at` ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_calls_for_run(
        &self,
        run_id: &TraceRunId,
        include_args: bool,
        only_exceptions: bool,
    ) -> Result<Vec<TraceCall>, StoreError> {
        let conn = self.conn()?;
        let sql = if only_exceptions {
            "SELECT * FROM trace_calls
             WHERE run_id = ?1 AND exception_type IS NOT NULL
             ORDER BY called_at"
        } else {
            "SELECT * FROM trace_calls WHERE run_id = ?1 ORDER BY called_at"
        };
        let mut statement = conn.prepare(sql)?;
        let rows = statement.query_map(params![run_id.as_str()], |row| {
            trace_call_from_row(row, include_args)
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// Returns recent calls to a function across all runs, newest first.
    ///
    /// Inputs containing `%` match as SQL `LIKE` patterns; anything else
    /// matches exactly.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_recent_calls(
        &self,
        function_name: &str,
        limit: i64,
        include_args: bool,
    ) -> Result<Vec<TraceCall>, StoreError> {
        let conn = self.conn()?;
        let sql = if function_name.contains('%') {
            "SELECT * FROM trace_calls WHERE function_name LIKE ?1
             ORDER BY called_at DESC LIMIT ?2"
        } else {
            "SELECT * FROM trace_calls WHERE function_name = ?1
             ORDER BY called_at DESC LIMIT ?2"
        };
        let mut statement = conn.prepare(sql)?;
        let rows = statement.query_map(params![function_name, limit], |row| {
            trace_call_from_row(row, include_args)
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// Returns calls that raised, joined to their run's command and status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_failed_calls(
        &self,
        run_id: Option<&TraceRunId>,
        limit: i64,
    ) -> Result<Vec<FailedCall>, StoreError> {
        let conn = self.conn()?;
        let (sql, bindings): (&str, Vec<String>) = match run_id {
            Some(run_id) => (
                "SELECT c.*, r.command AS run_command, r.status AS run_status
                 FROM trace_calls c
                 JOIN trace_runs r ON c.run_id = r.run_id
                 WHERE c.run_id = ? AND c.exception_type IS NOT NULL
                 ORDER BY c.called_at DESC
                 LIMIT ?",
                vec![run_id.as_str().to_string(), limit.to_string()],
            ),
            None => (
                "SELECT c.*, r.command AS run_command, r.status AS run_status
                 FROM trace_calls c
                 JOIN trace_runs r ON c.run_id = r.run_id
                 WHERE c.exception_type IS NOT NULL
                 ORDER BY c.called_at DESC
                 LIMIT ?",
                vec![limit.to_string()],
            ),
        };
        let mut statement = conn.prepare(sql)?;
        let rows = statement.query_map(rusqlite::params_from_iter(bindings), |row| {
            let status_text: String = row.get("run_status")?;
            Ok(FailedCall {
                call: trace_call_from_row(row, true)?,
                command: row.get("run_command")?,
                run_status: TraceRunStatus::from_str(&status_text)
                    .unwrap_or(TraceRunStatus::Running),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// Returns trace statistics, per-run or global.
    ///
    /// Per-run statistics for an unknown run id come back as the default
    /// (all-zero) value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_trace_stats(&self, run_id: Option<&TraceRunId>) -> Result<TraceStats, StoreError> {
        match run_id {
            Some(run_id) => {
                let Some(run) = self.get_trace_run(run_id)? else {
                    return Ok(TraceStats::default());
                };
                let conn = self.conn()?;
                let call_count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM trace_calls WHERE run_id = ?1",
                    params![run_id.as_str()],
                    |row| row.get(0),
                )?;
                let exception_count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM trace_calls
                     WHERE run_id = ?1 AND exception_type IS NOT NULL",
                    params![run_id.as_str()],
                    |row| row.get(0),
                )?;
                let avg_duration_ms: Option<f64> = conn.query_row(
                    "SELECT AVG(duration_ms) FROM trace_calls
                     WHERE run_id = ?1 AND duration_ms IS NOT NULL",
                    params![run_id.as_str()],
                    |row| row.get(0),
                )?;
                let max_depth: Option<i64> = conn.query_row(
                    "SELECT MAX(depth) FROM trace_calls WHERE run_id = ?1",
                    params![run_id.as_str()],
                    |row| row.get(0),
                )?;
                Ok(TraceStats {
                    run_id: Some(run_id.clone()),
                    status: Some(run.status),
                    run_count: None,
                    call_count,
                    exception_count,
                    avg_duration_ms,
                    max_depth: Some(max_depth.unwrap_or(0)),
                    top_functions: Vec::new(),
                })
            }
            None => {
                let conn = self.conn()?;
                let run_count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM trace_runs", params![], |row| {
                        row.get(0)
                    })?;
                let call_count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM trace_calls", params![], |row| {
                        row.get(0)
                    })?;
                let exception_count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM trace_calls WHERE exception_type IS NOT NULL",
                    params![],
                    |row| row.get(0),
                )?;
                let mut statement = conn.prepare(
                    "SELECT function_name, COUNT(*) AS count
                     FROM trace_calls
                     GROUP BY function_name
                     ORDER BY count DESC
                     LIMIT 10",
                )?;
                let top = statement.query_map(params![], |row| {
                    Ok(FunctionCallCount { function: row.get(0)?, count: row.get(1)? })
                })?;
                Ok(TraceStats {
                    run_id: None,
                    status: None,
                    run_count: Some(run_count),
                    call_count,
                    exception_count,
                    avg_duration_ms: None,
                    max_depth: None,
                    top_functions: top.collect::<rusqlite::Result<Vec<_>>>()?,
                })
            }
        }
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps a trace-run row.
pub(crate) fn trace_run_from_row(row: &Row<'_>) -> rusqlite::Result<TraceRun> {
    let status_text: Option<String> = row.get("status")?;
    Ok(TraceRun {
        run_id: TraceRunId::new(row.get::<_, String>("run_id")?),
        started_at: row.get("started_at")?,
        ended_at: row.get("ended_at")?,
        command: row.get("command")?,
        exit_code: row.get("exit_code")?,
        status: status_text
            .as_deref()
            .and_then(|text| TraceRunStatus::from_str(text).ok())
            .unwrap_or(TraceRunStatus::Running),
    })
}

/// Maps a trace-call row, optionally dropping payload fields.
fn trace_call_from_row(row: &Row<'_>, include_args: bool) -> rusqlite::Result<TraceCall> {
    let decode = |text: Option<String>| {
        text.and_then(|json| serde_json::from_str::<serde_json::Value>(&json).ok())
    };
    let (args, kwargs, return_value) = if include_args {
        (
            decode(row.get("args_json")?),
            decode(row.get("kwargs_json")?),
            decode(row.get("return_value_json")?),
        )
    } else {
        (None, None, None)
    };
    Ok(TraceCall {
        call_id: TraceCallId::new(row.get::<_, String>("call_id")?),
        run_id: TraceRunId::new(row.get::<_, String>("run_id")?),
        function_name: row.get("function_name")?,
        file_path: row.get("file_path")?,
        line_number: row.get("line_number")?,
        called_at: row.get("called_at")?,
        returned_at: row.get("returned_at")?,
        duration_ms: row.get("duration_ms")?,
        args,
        kwargs,
        return_value,
        exception_type: row.get("exception_type")?,
        exception_message: row.get("exception_message")?,
        exception_traceback: row.get("exception_traceback")?,
        parent_call_id: row
            .get::<_, Option<String>>("parent_call_id")?
            .map(TraceCallId::new),
        depth: row.get::<_, Option<i64>>("depth")?.unwrap_or(0),
    })
}
