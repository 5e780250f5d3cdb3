// crates/loom-store/src/failures.rs
// ============================================================================
// Module: Loom Failure Log
// Description: Append-only log of attempted fixes that did not work.
// Purpose: Keep unsuccessful approaches queryable so they are not repeated.
// Dependencies: loom-core, rusqlite
// ============================================================================

//! ## Overview
//! The failure log records what was tried, on what, and why it failed.
//! When only a name is given, it resolves to an entity id through the text
//! query; an explicit id takes precedence. Filters compose with AND, except
//! tags which match with OR.

// ============================================================================
// SECTION: Imports
// ============================================================================

use loom_core::EntityId;
use loom_core::FailureLogEntry;
use loom_core::FailureLogId;
use loom_core::now_iso8601;
use rusqlite::Row;
use rusqlite::params;

use crate::store::CodeStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Operations
// ============================================================================

impl CodeStore {
    /// Logs a failed fix attempt and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    #[allow(clippy::too_many_arguments, reason = "Mirrors the logging call surface")]
    pub fn log_failure(
        &self,
        attempted_fix: &str,
        context: Option<&str>,
        entity_name: Option<&str>,
        entity_id: Option<EntityId>,
        file_path: Option<&str>,
        failure_reason: Option<&str>,
        related_error: Option<&str>,
        tags: &[String],
    ) -> Result<FailureLogId, StoreError> {
        let resolved_id = match (entity_id, entity_name) {
            (Some(id), _) => Some(id),
            (None, Some(name)) => self.resolve_entity_by_name(name)?,
            (None, None) => None,
        };
        let tags_text = if tags.is_empty() { None } else { Some(tags.join(",")) };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO failure_logs
             (timestamp, entity_id, entity_name, file_path, context, attempted_fix,
              failure_reason, related_error, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                now_iso8601(),
                resolved_id.map(EntityId::get),
                entity_name,
                file_path,
                context,
                attempted_fix,
                failure_reason,
                related_error,
                tags_text,
            ],
        )?;
        Ok(FailureLogId::new(conn.last_insert_rowid()))
    }

    /// Returns failure logs matching the filters, newest first.
    ///
    /// `entity_id` takes precedence over `entity_name`; the name matches
    /// exact or partial; tags match with OR; `context_search` matches either
    /// the attempted fix or the context.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_failure_logs(
        &self,
        entity_name: Option<&str>,
        entity_id: Option<EntityId>,
        file_path: Option<&str>,
        tags: &[String],
        context_search: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FailureLogEntry>, StoreError> {
        let mut conditions = Vec::new();
        let mut bindings: Vec<String> = Vec::new();

        if let Some(id) = entity_id {
            conditions.push("entity_id = ?".to_string());
            bindings.push(id.get().to_string());
        } else if let Some(name) = entity_name {
            conditions.push("(entity_name = ? OR entity_name LIKE ?)".to_string());
            bindings.push(name.to_string());
            bindings.push(format!("%{name}%"));
        }
        if let Some(file_path) = file_path {
            conditions.push("file_path LIKE ?".to_string());
            bindings.push(format!("%{file_path}%"));
        }
        if !tags.is_empty() {
            let clause = tags.iter().map(|_| "tags LIKE ?").collect::<Vec<_>>().join(" OR ");
            conditions.push(format!("({clause})"));
            for tag in tags {
                bindings.push(format!("%{tag}%"));
            }
        }
        if let Some(search) = context_search {
            conditions.push("(context LIKE ? OR attempted_fix LIKE ?)".to_string());
            bindings.push(format!("%{search}%"));
            bindings.push(format!("%{search}%"));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        bindings.push(limit.to_string());

        let conn = self.conn()?;
        let mut statement = conn.prepare(&format!(
            "SELECT * FROM failure_logs {where_clause}
             ORDER BY timestamp DESC
             LIMIT ?"
        ))?;
        let rows = statement.query_map(rusqlite::params_from_iter(bindings), failure_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// Returns failures from the last `days` days, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_recent_failures(
        &self,
        days: i64,
        limit: i64,
    ) -> Result<Vec<FailureLogEntry>, StoreError> {
        let cutoff = loom_core::core::time::days_ago_iso8601(days);
        let conn = self.conn()?;
        let mut statement = conn.prepare(
            "SELECT * FROM failure_logs
             WHERE timestamp >= ?1
             ORDER BY timestamp DESC
             LIMIT ?2",
        )?;
        let rows = statement.query_map(params![cutoff, limit], failure_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// Deletes a failure log; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn delete_failure_log(&self, log_id: FailureLogId) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let deleted =
            conn.execute("DELETE FROM failure_logs WHERE id = ?1", params![log_id.get()])?;
        Ok(deleted > 0)
    }

    /// Deletes failures older than `days` days; returns the count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn clear_old_failures(&self, days: i64) -> Result<i64, StoreError> {
        let cutoff = loom_core::core::time::days_ago_iso8601(days);
        let conn = self.conn()?;
        let deleted =
            conn.execute("DELETE FROM failure_logs WHERE timestamp < ?1", params![cutoff])?;
        Ok(i64::try_from(deleted).unwrap_or(i64::MAX))
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps a failure-log row.
fn failure_from_row(row: &Row<'_>) -> rusqlite::Result<FailureLogEntry> {
    let tags_text: Option<String> = row.get("tags")?;
    Ok(FailureLogEntry {
        id: FailureLogId::new(row.get("id")?),
        timestamp: row.get("timestamp")?,
        entity_id: row.get::<_, Option<i64>>("entity_id")?.map(EntityId::new),
        entity_name: row.get("entity_name")?,
        file_path: row.get("file_path")?,
        context: row.get("context")?,
        attempted_fix: row.get("attempted_fix")?,
        failure_reason: row.get("failure_reason")?,
        related_error: row.get("related_error")?,
        tags: tags_text
            .map(|text| text.split(',').map(ToString::to_string).collect())
            .unwrap_or_default(),
    })
}
