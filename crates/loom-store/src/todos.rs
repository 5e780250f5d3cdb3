// crates/loom-store/src/todos.rs
// ============================================================================
// Module: Loom TODO Queue
// Description: Ordered work items with combine and reorder semantics.
// Purpose: Persist the work queue LLM sessions manage across runs.
// Dependencies: loom-core, rusqlite
// ============================================================================

//! ## Overview
//! TODOs order by priority descending, then position ascending (a 1-based
//! FIFO order), then creation time. New items take `max(position) + 1`.
//! Reordering shifts the intermediate items by one so positions stay a
//! total order. Combining marks the merged items terminal (`combined`,
//! pointing at the survivor) and copies their prompts into the survivor's
//! context under `[Merged from #N]` headers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;

use loom_core::MetadataBag;
use loom_core::TodoId;
use loom_core::TodoItem;
use loom_core::TodoStats;
use loom_core::TodoStatus;
use loom_core::core::todo::TodoStatusStats;
use loom_core::now_iso8601;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;

use crate::store::CodeStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Parameter Types
// ============================================================================

/// Fields for a new TODO.
#[derive(Debug, Clone, Default)]
pub struct NewTodo {
    /// The task description (required).
    pub prompt: String,
    /// Short display title; derived from the prompt when absent.
    pub title: Option<String>,
    /// Additional context.
    pub context: Option<String>,
    /// Priority (higher is more urgent).
    pub priority: i64,
    /// Related entity name.
    pub entity_name: Option<String>,
    /// Related file path.
    pub file_path: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// Free-form metadata.
    pub metadata: Option<MetadataBag>,
    /// Optional time estimate in minutes.
    pub estimated_minutes: Option<i64>,
    /// Whether failure of this item blocks subsequent work.
    pub critical: bool,
}

impl NewTodo {
    /// Creates a new-TODO request with only the prompt set.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Self::default() }
    }
}

/// Filters for listing TODOs.
#[derive(Debug, Clone, Default)]
pub struct TodoFilter {
    /// Restrict to one status.
    pub status: Option<TodoStatus>,
    /// Substring filter on the related entity name.
    pub entity_name: Option<String>,
    /// Substring filter on the related file path.
    pub file_path: Option<String>,
    /// Tag filters (OR logic).
    pub tags: Vec<String>,
    /// Only critical items.
    pub critical_only: bool,
}

/// Whitelisted fields accepted by [`CodeStore::update_todo`].
#[derive(Debug, Clone, Default)]
pub struct TodoUpdate {
    /// New title.
    pub title: Option<String>,
    /// New prompt.
    pub prompt: Option<String>,
    /// New context.
    pub context: Option<String>,
    /// New priority.
    pub priority: Option<i64>,
    /// New position.
    pub position: Option<i64>,
    /// New tags.
    pub tags: Option<Vec<String>>,
    /// New time estimate.
    pub estimated_minutes: Option<i64>,
    /// New critical flag.
    pub critical: Option<bool>,
}

impl TodoUpdate {
    /// Reports whether the update carries no fields.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.prompt.is_none()
            && self.context.is_none()
            && self.priority.is_none()
            && self.position.is_none()
            && self.tags.is_none()
            && self.estimated_minutes.is_none()
            && self.critical.is_none()
    }
}

// ============================================================================
// SECTION: Queue Operations
// ============================================================================

impl CodeStore {
    /// Adds a work item and returns its id.
    ///
    /// The title defaults to the first 50 characters of the prompt; the
    /// position is appended at `max(position) + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for an empty prompt and
    /// [`StoreError::Db`] on database failure.
    pub fn add_todo(&self, todo: &NewTodo) -> Result<TodoId, StoreError> {
        if todo.prompt.trim().is_empty() {
            return Err(StoreError::Invalid("todo prompt must not be empty".to_string()));
        }
        let title = todo.title.clone().unwrap_or_else(|| {
            let prefix: String = todo.prompt.chars().take(50).collect();
            if todo.prompt.chars().count() > 50 { format!("{prefix}...") } else { prefix }
        });
        let tags = join_tags(&todo.tags);
        let metadata = todo
            .metadata
            .as_ref()
            .map(|bag| serde_json::Value::Object(bag.clone()).to_string());

        let conn = self.conn()?;
        let max_position: Option<i64> =
            conn.query_row("SELECT MAX(position) FROM todos", params![], |row| row.get(0))?;
        let next_position = max_position.unwrap_or(0) + 1;

        conn.execute(
            "INSERT INTO todos
             (created_at, title, prompt, context, priority, position, entity_name,
              file_path, tags, metadata, status, estimated_minutes, critical)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                now_iso8601(),
                title,
                todo.prompt,
                todo.context,
                todo.priority,
                next_position,
                todo.entity_name,
                todo.file_path,
                tags,
                metadata,
                TodoStatus::Pending.as_str(),
                todo.estimated_minutes,
                i64::from(todo.critical),
            ],
        )?;
        Ok(TodoId::new(conn.last_insert_rowid()))
    }

    /// Returns a TODO by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_todo(&self, todo_id: TodoId) -> Result<Option<TodoItem>, StoreError> {
        let conn = self.conn()?;
        conn.query_row("SELECT * FROM todos WHERE id = ?1", params![todo_id.get()], todo_from_row)
            .optional()
            .map_err(StoreError::from)
    }

    /// Lists TODOs ordered by priority desc, position asc, created asc.
    ///
    /// Completed and combined items are excluded unless a status filter or
    /// `include_completed` asks for them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn list_todos(
        &self,
        filter: &TodoFilter,
        limit: i64,
        include_completed: bool,
    ) -> Result<Vec<TodoItem>, StoreError> {
        let mut conditions = Vec::new();
        let mut bindings: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?".to_string());
            bindings.push(status.as_str().to_string());
        } else if !include_completed {
            conditions.push("status NOT IN (?, ?)".to_string());
            bindings.push(TodoStatus::Completed.as_str().to_string());
            bindings.push(TodoStatus::Combined.as_str().to_string());
        }
        if let Some(entity_name) = &filter.entity_name {
            conditions.push("entity_name LIKE ?".to_string());
            bindings.push(format!("%{entity_name}%"));
        }
        if let Some(file_path) = &filter.file_path {
            conditions.push("file_path LIKE ?".to_string());
            bindings.push(format!("%{file_path}%"));
        }
        if !filter.tags.is_empty() {
            let clause = filter.tags.iter().map(|_| "tags LIKE ?").collect::<Vec<_>>().join(" OR ");
            conditions.push(format!("({clause})"));
            for tag in &filter.tags {
                bindings.push(format!("%{tag}%"));
            }
        }
        if filter.critical_only {
            conditions.push("critical = 1".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        bindings.push(limit.to_string());

        let conn = self.conn()?;
        let mut statement = conn.prepare(&format!(
            "SELECT * FROM todos {where_clause}
             ORDER BY priority DESC, position ASC, created_at ASC
             LIMIT ?"
        ))?;
        let rows = statement.query_map(rusqlite::params_from_iter(bindings), todo_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// Returns the next pending item, critical items first by default.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_next_todo(&self, critical_first: bool) -> Result<Option<TodoItem>, StoreError> {
        let order = if critical_first {
            "critical DESC, priority DESC, position ASC, created_at ASC"
        } else {
            "priority DESC, position ASC, created_at ASC"
        };
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT * FROM todos WHERE status = ?1 ORDER BY {order} LIMIT 1"),
            params![TodoStatus::Pending.as_str()],
            todo_from_row,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Transitions a pending item to in-progress; stamps `started_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn start_todo(&self, todo_id: TodoId) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE todos SET status = ?1, started_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                TodoStatus::InProgress.as_str(),
                now_iso8601(),
                todo_id.get(),
                TodoStatus::Pending.as_str(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Completes an item from any non-combined status.
    ///
    /// Stamps `completed_at`, stores the notes, and merges `result` and
    /// `success` into the metadata bag.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn complete_todo(
        &self,
        todo_id: TodoId,
        notes: Option<&str>,
        success: bool,
    ) -> Result<bool, StoreError> {
        let Some(existing) = self.get_todo(todo_id)? else {
            return Ok(false);
        };
        if existing.status == TodoStatus::Combined {
            return Ok(false);
        }
        let mut metadata = existing.metadata;
        metadata.insert("result".to_string(), serde_json::json!(notes));
        metadata.insert("success".to_string(), serde_json::json!(success));

        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE todos SET status = ?1, completed_at = ?2, metadata = ?3,
                 completion_notes = ?4
             WHERE id = ?5",
            params![
                TodoStatus::Completed.as_str(),
                now_iso8601(),
                serde_json::Value::Object(metadata).to_string(),
                notes,
                todo_id.get(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Updates whitelisted fields and stamps `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn update_todo(&self, todo_id: TodoId, update: &TodoUpdate) -> Result<bool, StoreError> {
        if update.is_empty() {
            return Ok(false);
        }
        let mut clauses = Vec::new();
        let mut bindings: Vec<String> = Vec::new();
        if let Some(title) = &update.title {
            clauses.push("title = ?");
            bindings.push(title.clone());
        }
        if let Some(prompt) = &update.prompt {
            clauses.push("prompt = ?");
            bindings.push(prompt.clone());
        }
        if let Some(context) = &update.context {
            clauses.push("context = ?");
            bindings.push(context.clone());
        }
        if let Some(priority) = update.priority {
            clauses.push("priority = ?");
            bindings.push(priority.to_string());
        }
        if let Some(position) = update.position {
            clauses.push("position = ?");
            bindings.push(position.to_string());
        }
        if let Some(tags) = &update.tags {
            clauses.push("tags = ?");
            bindings.push(join_tags(tags).unwrap_or_default());
        }
        if let Some(estimated_minutes) = update.estimated_minutes {
            clauses.push("estimated_minutes = ?");
            bindings.push(estimated_minutes.to_string());
        }
        if let Some(critical) = update.critical {
            clauses.push("critical = ?");
            bindings.push(i64::from(critical).to_string());
        }
        clauses.push("updated_at = ?");
        bindings.push(now_iso8601());
        bindings.push(todo_id.get().to_string());

        let conn = self.conn()?;
        let changed = conn.execute(
            &format!("UPDATE todos SET {} WHERE id = ?", clauses.join(", ")),
            rusqlite::params_from_iter(bindings),
        )?;
        Ok(changed > 0)
    }

    /// Combines overlapping items into the kept one.
    ///
    /// Each merged item is marked `combined` pointing at the keeper, and
    /// its prompt (plus any context) is appended to the keeper's context
    /// under a `[Merged from #N]` header.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when `merge_ids` is empty and
    /// [`StoreError::Db`] on database failure.
    pub fn combine_todos(
        &self,
        keep_id: TodoId,
        merge_ids: &[TodoId],
        new_prompt: Option<&str>,
        new_title: Option<&str>,
    ) -> Result<bool, StoreError> {
        if merge_ids.is_empty() {
            return Err(StoreError::Invalid(
                "combine_todos requires at least one item to merge".to_string(),
            ));
        }
        let Some(keep) = self.get_todo(keep_id)? else {
            return Ok(false);
        };

        let mut context_parts = Vec::new();
        if let Some(context) = &keep.context {
            context_parts.push(context.clone());
        }
        let mut merged = Vec::new();
        for &merge_id in merge_ids {
            if merge_id == keep_id {
                continue;
            }
            if let Some(item) = self.get_todo(merge_id)? {
                context_parts.push(format!("[Merged from #{merge_id}] {}", item.prompt));
                if let Some(context) = &item.context {
                    context_parts.push(context.clone());
                }
                merged.push(merge_id);
            }
        }

        let timestamp = now_iso8601();
        let mut clauses = vec!["updated_at = ?"];
        let mut bindings: Vec<String> = vec![timestamp.clone()];
        if let Some(prompt) = new_prompt {
            clauses.push("prompt = ?");
            bindings.push(prompt.to_string());
        }
        if let Some(title) = new_title {
            clauses.push("title = ?");
            bindings.push(title.to_string());
        }
        if !context_parts.is_empty() {
            clauses.push("context = ?");
            bindings.push(context_parts.join("\n"));
        }
        bindings.push(keep_id.get().to_string());

        let conn = self.conn()?;
        conn.execute(
            &format!("UPDATE todos SET {} WHERE id = ?", clauses.join(", ")),
            rusqlite::params_from_iter(bindings),
        )?;

        for merge_id in merged {
            conn.execute(
                "UPDATE todos SET status = ?1, combined_into = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![
                    TodoStatus::Combined.as_str(),
                    keep_id.get(),
                    timestamp,
                    merge_id.get(),
                ],
            )?;
        }
        Ok(true)
    }

    /// Moves an item to a new 1-based position.
    ///
    /// Items between the old and new positions shift by one so positions
    /// remain a total order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn reorder_todo(&self, todo_id: TodoId, new_position: i64) -> Result<bool, StoreError> {
        let Some(todo) = self.get_todo(todo_id)? else {
            return Ok(false);
        };
        let timestamp = now_iso8601();
        let Some(old_position) = todo.position else {
            let conn = self.conn()?;
            conn.execute(
                "UPDATE todos SET position = ?1, updated_at = ?2 WHERE id = ?3",
                params![new_position, timestamp, todo_id.get()],
            )?;
            return Ok(true);
        };
        if old_position == new_position {
            return Ok(true);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if new_position < old_position {
            tx.execute(
                "UPDATE todos SET position = position + 1
                 WHERE position >= ?1 AND position < ?2 AND id != ?3",
                params![new_position, old_position, todo_id.get()],
            )?;
        } else {
            tx.execute(
                "UPDATE todos SET position = position - 1
                 WHERE position > ?1 AND position <= ?2 AND id != ?3",
                params![old_position, new_position, todo_id.get()],
            )?;
        }
        tx.execute(
            "UPDATE todos SET position = ?1, updated_at = ?2 WHERE id = ?3",
            params![new_position, timestamp, todo_id.get()],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Searches open items by prompt or context substring.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn search_todos(&self, query: &str, limit: i64) -> Result<Vec<TodoItem>, StoreError> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(
            "SELECT * FROM todos
             WHERE (prompt LIKE ?1 OR context LIKE ?1)
             AND status NOT IN (?2, ?3)
             ORDER BY priority DESC, created_at ASC
             LIMIT ?4",
        )?;
        let rows = statement.query_map(
            params![
                format!("%{query}%"),
                TodoStatus::Completed.as_str(),
                TodoStatus::Combined.as_str(),
                limit,
            ],
            todo_from_row,
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// Deletes an item; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn delete_todo(&self, todo_id: TodoId) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM todos WHERE id = ?1", params![todo_id.get()])?;
        Ok(deleted > 0)
    }

    /// Deletes completed items older than `days_old` days; returns the count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn clear_completed_todos(&self, days_old: i64) -> Result<i64, StoreError> {
        let cutoff = loom_core::core::time::days_ago_iso8601(days_old);
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM todos WHERE status = ?1 AND completed_at < ?2",
            params![TodoStatus::Completed.as_str(), cutoff],
        )?;
        Ok(i64::try_from(deleted).unwrap_or(i64::MAX))
    }

    /// Returns queue statistics.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_todo_stats(&self) -> Result<TodoStats, StoreError> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(
            "SELECT status, COUNT(*) AS count, AVG(priority) AS avg_priority
             FROM todos GROUP BY status",
        )?;
        let rows = statement.query_map(params![], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<f64>>(2)?,
            ))
        })?;

        let mut stats = TodoStats::default();
        for row in rows {
            let (status, count, avg_priority) = row?;
            stats.total += count;
            match TodoStatus::from_str(&status) {
                Ok(TodoStatus::Pending) => stats.pending = count,
                Ok(TodoStatus::InProgress) => stats.in_progress = count,
                Ok(TodoStatus::Completed) => stats.completed = count,
                Ok(TodoStatus::Combined) => stats.combined = count,
                Err(_) => {}
            }
            stats.by_status.insert(status, TodoStatusStats { count, avg_priority });
        }
        Ok(stats)
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Joins tags as the comma-serialized column form.
fn join_tags(tags: &[String]) -> Option<String> {
    if tags.is_empty() { None } else { Some(tags.join(",")) }
}

/// Maps a todos row.
fn todo_from_row(row: &Row<'_>) -> rusqlite::Result<TodoItem> {
    let status_text: Option<String> = row.get("status")?;
    let tags_text: Option<String> = row.get("tags")?;
    let metadata_text: Option<String> = row.get("metadata")?;
    let metadata = metadata_text
        .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
        .and_then(|value| match value {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();
    Ok(TodoItem {
        id: TodoId::new(row.get("id")?),
        title: row.get("title")?,
        prompt: row.get("prompt")?,
        context: row.get("context")?,
        status: status_text
            .as_deref()
            .and_then(|text| TodoStatus::from_str(text).ok())
            .unwrap_or(TodoStatus::Pending),
        priority: row.get::<_, Option<i64>>("priority")?.unwrap_or(0),
        position: row.get("position")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
        estimated_minutes: row.get("estimated_minutes")?,
        critical: row.get::<_, Option<i64>>("critical")?.unwrap_or(0) != 0,
        tags: tags_text
            .map(|text| text.split(',').map(ToString::to_string).collect())
            .unwrap_or_default(),
        combined_into: row.get::<_, Option<i64>>("combined_into")?.map(TodoId::new),
        completion_notes: row.get("completion_notes")?,
        entity_name: row.get("entity_name")?,
        file_path: row.get("file_path")?,
        metadata,
    })
}
