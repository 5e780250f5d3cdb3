// crates/loom-store/src/schema.rs
// ============================================================================
// Module: Loom Schema Manager
// Description: Base schema creation and forward-only version migrations.
// Purpose: Bring a freshly opened store to the current schema version.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! The schema manager owns every table Loom persists. On open it creates the
//! base tables when absent, reads the stored schema version (0 when the
//! version table is empty), and applies each pending migration in strict
//! ascending order, committing the version bump after each. Migrations are
//! forward-only and safely re-runnable: all DDL uses `IF NOT EXISTS`, column
//! additions are guarded by `PRAGMA table_info` introspection, and version
//! writes use `INSERT OR REPLACE`.
//!
//! A migration failure aborts the open with the stored version unchanged, so
//! a retry resumes at the same step.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Connection;
use rusqlite::params;

use crate::store::CodeStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Version
// ============================================================================

/// Current schema version.
pub(crate) const SCHEMA_VERSION: i64 = 8;

impl CodeStore {
    /// Creates base tables and applies pending migrations.
    pub(crate) fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        create_base_schema(&conn)?;
        run_migrations(&conn)?;
        Ok(())
    }

    /// Returns the stored schema version (0 when the table is empty).
    pub(crate) fn schema_version(&self) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        Ok(read_schema_version(&conn))
    }
}

// ============================================================================
// SECTION: Base Schema
// ============================================================================

/// Creates the v1 tables and indexes when absent.
fn create_base_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            code TEXT,
            intent TEXT,
            metadata TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS relationships (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id INTEGER NOT NULL,
            target_id INTEGER NOT NULL,
            relation TEXT NOT NULL,
            metadata TEXT,
            FOREIGN KEY (source_id) REFERENCES entities(id),
            FOREIGN KEY (target_id) REFERENCES entities(id)
        );

        CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name);
        CREATE INDEX IF NOT EXISTS idx_entities_kind ON entities(kind);
        CREATE INDEX IF NOT EXISTS idx_rel_source ON relationships(source_id);
        CREATE INDEX IF NOT EXISTS idx_rel_target ON relationships(target_id);

        CREATE TABLE IF NOT EXISTS notes (
            id TEXT PRIMARY KEY,
            type TEXT NOT NULL,
            title TEXT,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            source TEXT,
            status TEXT DEFAULT 'active'
        );

        CREATE TABLE IF NOT EXISTS note_links (
            note_id TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            link_type TEXT NOT NULL,
            PRIMARY KEY (note_id, entity_id, link_type),
            FOREIGN KEY (note_id) REFERENCES notes(id)
        );

        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )?;
    Ok(())
}

// ============================================================================
// SECTION: Migrations
// ============================================================================

/// Reads the highest stored schema version.
fn read_schema_version(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
        params![],
        |row| row.get(0),
    )
    .unwrap_or(0)
}

/// Records a completed migration step.
fn set_schema_version(conn: &Connection, version: i64) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
        params![version],
    )?;
    Ok(())
}

/// Applies every pending migration in ascending order.
fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current = read_schema_version(conn);
    if current < 2 {
        tracing::debug!(from = current, to = 2, "applying schema migration");
        migrate_to_v2(conn)?;
        set_schema_version(conn, 2)?;
    }
    if current < 3 {
        migrate_to_v3(conn)?;
        set_schema_version(conn, 3)?;
    }
    if current < 4 {
        migrate_to_v4(conn)?;
        set_schema_version(conn, 4)?;
    }
    if current < 5 {
        migrate_to_v5(conn)?;
        set_schema_version(conn, 5)?;
    }
    if current < 6 {
        migrate_to_v6(conn)?;
        set_schema_version(conn, 6)?;
    }
    if current < 7 {
        migrate_to_v7(conn)?;
        set_schema_version(conn, 7)?;
    }
    if current < SCHEMA_VERSION {
        migrate_to_v8(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    }
    Ok(())
}

/// Migration v2: runtime tracing tables.
fn migrate_to_v2(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS trace_runs (
            run_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            command TEXT,
            exit_code INTEGER,
            status TEXT
        );

        CREATE TABLE IF NOT EXISTS trace_calls (
            call_id TEXT PRIMARY KEY,
            run_id TEXT NOT NULL,
            function_name TEXT NOT NULL,
            file_path TEXT,
            line_number INTEGER,
            called_at TEXT NOT NULL,
            returned_at TEXT,
            duration_ms REAL,
            args_json TEXT,
            kwargs_json TEXT,
            return_value_json TEXT,
            exception_type TEXT,
            exception_message TEXT,
            exception_traceback TEXT,
            parent_call_id TEXT,
            depth INTEGER DEFAULT 0,
            FOREIGN KEY (run_id) REFERENCES trace_runs(run_id),
            FOREIGN KEY (parent_call_id) REFERENCES trace_calls(call_id)
        );

        CREATE INDEX IF NOT EXISTS idx_trace_calls_run ON trace_calls(run_id);
        CREATE INDEX IF NOT EXISTS idx_trace_calls_function ON trace_calls(function_name);
        CREATE INDEX IF NOT EXISTS idx_trace_calls_exception ON trace_calls(exception_type)
            WHERE exception_type IS NOT NULL;",
    )?;
    Ok(())
}

/// Migration v3: file tracking, ingest runs, entity-file map.
fn migrate_to_v3(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS file_tracking (
            file_path TEXT PRIMARY KEY,
            mtime REAL NOT NULL,
            size INTEGER,
            last_ingest_run TEXT,
            ingested_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            paths TEXT,
            stats TEXT,
            status TEXT
        );

        CREATE TABLE IF NOT EXISTS entity_files (
            entity_id INTEGER NOT NULL,
            file_path TEXT NOT NULL,
            PRIMARY KEY (entity_id, file_path),
            FOREIGN KEY (entity_id) REFERENCES entities(id)
        );

        CREATE INDEX IF NOT EXISTS idx_file_tracking_mtime ON file_tracking(mtime);
        CREATE INDEX IF NOT EXISTS idx_entity_files_path ON entity_files(file_path);",
    )?;
    Ok(())
}

/// Migration v4: failure-log table.
fn migrate_to_v4(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS failure_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            entity_id INTEGER,
            entity_name TEXT,
            file_path TEXT,
            context TEXT,
            attempted_fix TEXT NOT NULL,
            failure_reason TEXT,
            related_error TEXT,
            tags TEXT,
            FOREIGN KEY (entity_id) REFERENCES entities(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_failure_logs_entity ON failure_logs(entity_id);
        CREATE INDEX IF NOT EXISTS idx_failure_logs_entity_name ON failure_logs(entity_name);
        CREATE INDEX IF NOT EXISTS idx_failure_logs_file ON failure_logs(file_path);
        CREATE INDEX IF NOT EXISTS idx_failure_logs_timestamp ON failure_logs(timestamp);",
    )?;
    Ok(())
}

/// Migration v5: `entity_name` column on failure logs (older stores only).
fn migrate_to_v5(conn: &Connection) -> Result<(), StoreError> {
    if !table_has_column(conn, "failure_logs", "entity_name")? {
        conn.execute("ALTER TABLE failure_logs ADD COLUMN entity_name TEXT", params![])?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_failure_logs_entity_name
                 ON failure_logs(entity_name)",
            params![],
        )?;
    }
    Ok(())
}

/// Migration v6: TODO work-item table.
fn migrate_to_v6(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS todos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT,
            prompt TEXT NOT NULL,
            context TEXT,
            status TEXT DEFAULT 'pending',
            priority INTEGER DEFAULT 0,
            position INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            started_at TEXT,
            completed_at TEXT,
            estimated_minutes INTEGER,
            critical BOOLEAN DEFAULT 0,
            tags TEXT,
            combined_into INTEGER,
            completion_notes TEXT,
            entity_name TEXT,
            file_path TEXT,
            metadata TEXT,
            FOREIGN KEY (combined_into) REFERENCES todos(id) ON DELETE SET NULL
        );

        CREATE INDEX IF NOT EXISTS idx_todos_status ON todos(status);
        CREATE INDEX IF NOT EXISTS idx_todos_priority ON todos(priority);
        CREATE INDEX IF NOT EXISTS idx_todos_position ON todos(position);
        CREATE INDEX IF NOT EXISTS idx_todos_created ON todos(created_at);
        CREATE INDEX IF NOT EXISTS idx_todos_entity ON todos(entity_name);
        CREATE INDEX IF NOT EXISTS idx_todos_file ON todos(file_path);",
    )?;
    Ok(())
}

/// Migration v7: additional TODO columns plus position backfill.
fn migrate_to_v7(conn: &Connection) -> Result<(), StoreError> {
    if !table_has_column(conn, "todos", "title")? {
        conn.execute("ALTER TABLE todos ADD COLUMN title TEXT", params![])?;
    }
    if !table_has_column(conn, "todos", "position")? {
        conn.execute("ALTER TABLE todos ADD COLUMN position INTEGER", params![])?;
        // Backfill positions from id order so existing queues keep FIFO shape.
        conn.execute(
            "UPDATE todos SET position = (
                 SELECT COUNT(*) FROM todos t2 WHERE t2.id <= todos.id
             )",
            params![],
        )?;
    }
    if !table_has_column(conn, "todos", "estimated_minutes")? {
        conn.execute("ALTER TABLE todos ADD COLUMN estimated_minutes INTEGER", params![])?;
    }
    if !table_has_column(conn, "todos", "critical")? {
        conn.execute("ALTER TABLE todos ADD COLUMN critical BOOLEAN DEFAULT 0", params![])?;
    }
    if !table_has_column(conn, "todos", "combined_into")? {
        conn.execute(
            "ALTER TABLE todos ADD COLUMN combined_into INTEGER
                 REFERENCES todos(id) ON DELETE SET NULL",
            params![],
        )?;
    }
    if !table_has_column(conn, "todos", "completion_notes")? {
        conn.execute("ALTER TABLE todos ADD COLUMN completion_notes TEXT", params![])?;
    }
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_todos_position ON todos(position)",
        params![],
    )?;
    Ok(())
}

/// Migration v8: cross-file reference table.
fn migrate_to_v8(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cross_file_refs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_entity_id INTEGER NOT NULL,
            target_name TEXT NOT NULL,
            ref_type TEXT NOT NULL,
            source_file TEXT,
            line_number INTEGER,
            verifiable BOOLEAN DEFAULT 1,
            verification_reason TEXT,
            metadata TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (source_entity_id) REFERENCES entities(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_cross_file_refs_type ON cross_file_refs(ref_type);
        CREATE INDEX IF NOT EXISTS idx_cross_file_refs_target ON cross_file_refs(target_name);
        CREATE INDEX IF NOT EXISTS idx_cross_file_refs_source
            ON cross_file_refs(source_entity_id);",
    )?;
    Ok(())
}

/// Reports whether a table already has a named column.
fn table_has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, StoreError> {
    let mut statement = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = statement.query_map(params![], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use crate::store::CodeStore;

    #[test]
    fn open_reaches_current_version() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!("tempdir"));
        let store = CodeStore::open(dir.path().join("store.db")).unwrap_or_else(|err| {
            unreachable!("open failed: {err}");
        });
        assert_eq!(store.schema_version().unwrap_or(0), super::SCHEMA_VERSION);
    }

    #[test]
    fn reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!("tempdir"));
        let path = dir.path().join("store.db");
        drop(CodeStore::open(&path));
        let store = CodeStore::open(&path).unwrap_or_else(|err| {
            unreachable!("reopen failed: {err}");
        });
        assert_eq!(store.schema_version().unwrap_or(0), super::SCHEMA_VERSION);
    }
}
