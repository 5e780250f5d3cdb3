// crates/loom-store/src/changes.rs
// ============================================================================
// Module: Loom Change Tracker
// Description: File-change detection and impacted-test mapping.
// Purpose: Derive added/modified/deleted sets and map them to entities and tests.
// Dependencies: loom-core, rusqlite
// ============================================================================

//! ## Overview
//! Change detection compares tracked file modification times against the
//! filesystem: a tracked path missing on disk is deleted, a newer mtime is
//! modified, and an untracked file with a supported extension in a tracked
//! directory is added. Changed files map to entities through the
//! entity-file table, which outlives entity deletion of neither side: rows
//! for a deleted file still name the entities that used to live there.
//!
//! Impacted-test scoring combines static suggestions (one point per changed
//! entity) with trace history (two points per test-run command that invoked
//! a function sharing a changed entity's short name).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use loom_core::Entity;
use loom_core::EntityId;
use loom_core::IngestRunId;
use loom_core::TraceRun;
use loom_core::short_name;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;

use crate::store::CodeStore;
use crate::store::StoreError;
use crate::trace::trace_run_from_row;

// ============================================================================
// SECTION: Change Records
// ============================================================================

/// How a tracked file changed since its last ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// File exists on disk but was never tracked.
    Added,
    /// File's mtime is newer than the tracked mtime.
    Modified,
    /// Tracked file is missing on disk.
    Deleted,
}

impl ChangeKind {
    /// Returns the stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One changed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    /// The file path as tracked.
    pub path: String,
    /// How it changed.
    pub change: ChangeKind,
}

/// One entity affected by a file change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedEntity {
    /// The affected entity.
    pub entity: Entity,
    /// How its file changed.
    pub change: ChangeKind,
    /// The file that changed.
    pub file_path: String,
}

// ============================================================================
// SECTION: Change Detection
// ============================================================================

impl CodeStore {
    /// Returns files that changed since the last ingest (or a specific run).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_changed_files(
        &self,
        since_run_id: Option<&IngestRunId>,
    ) -> Result<Vec<ChangedFile>, StoreError> {
        let tracked = self.tracked_files(since_run_id)?;
        let mut changes = Vec::new();

        for (file_path, stored_mtime) in &tracked {
            let path = Path::new(file_path);
            if !path.exists() {
                changes.push(ChangedFile {
                    path: file_path.clone(),
                    change: ChangeKind::Deleted,
                });
            } else if current_mtime(path) > *stored_mtime {
                changes.push(ChangedFile {
                    path: file_path.clone(),
                    change: ChangeKind::Modified,
                });
            }
        }

        // Untracked files with supported extensions inside tracked
        // directories count as added.
        let mut tracked_dirs: BTreeSet<PathBuf> = BTreeSet::new();
        for file_path in tracked.keys() {
            if let Some(parent) = Path::new(file_path).parent() {
                tracked_dirs.insert(parent.to_path_buf());
            }
        }
        let extensions = self.registry().supported_extensions();
        for dir in tracked_dirs {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.filter_map(Result::ok) {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
                if !extensions.iter().any(|ext| name.ends_with(ext)) {
                    continue;
                }
                let display = path.display().to_string();
                if !tracked.contains_key(&display) {
                    changes.push(ChangedFile { path: display, change: ChangeKind::Added });
                }
            }
        }

        Ok(changes)
    }

    /// Returns entities living in changed files.
    ///
    /// For deleted files the entities are those previously extracted from
    /// the file; for added/modified files, the entities currently bound to
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_changed_entities(
        &self,
        since_run_id: Option<&IngestRunId>,
    ) -> Result<Vec<ChangedEntity>, StoreError> {
        let changed_files = self.get_changed_files(since_run_id)?;
        let mut entities = Vec::new();
        for file in &changed_files {
            for entity_id in self.entity_ids_for_file(&file.path)? {
                if let Some(entity) = self.get_entity(entity_id)? {
                    entities.push(ChangedEntity {
                        entity,
                        change: file.change,
                        file_path: file.path.clone(),
                    });
                }
            }
        }
        Ok(entities)
    }

    /// Returns tests that should run for the given (or detected) changes.
    ///
    /// Scores accumulate +1 per entity a test is statically suggested for
    /// and +2 per matching historical test-run command; results sort by
    /// descending score, then ascending name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_impacted_tests(
        &self,
        changed_entities: Option<&[ChangedEntity]>,
    ) -> Result<Vec<String>, StoreError> {
        let detected;
        let changed = match changed_entities {
            Some(given) => given,
            None => {
                detected = self.get_changed_entities(None)?;
                detected.as_slice()
            }
        };
        if changed.is_empty() {
            return Ok(Vec::new());
        }

        let mut scores: BTreeMap<String, i64> = BTreeMap::new();
        for item in changed {
            for test_name in self.suggest_tests(item.entity.id)? {
                *scores.entry(test_name).or_insert(0) += 1;
            }
        }

        // Trace history: test runs that actually invoked a changed entity.
        for item in changed {
            let short = short_name(&item.entity.name);
            if short.is_empty() {
                continue;
            }
            let conn = self.conn()?;
            let mut statement = conn.prepare(
                "SELECT DISTINCT r.command
                 FROM trace_calls c
                 JOIN trace_runs r ON c.run_id = r.run_id
                 WHERE c.function_name LIKE ?1
                 AND r.command LIKE '%test%'
                 ORDER BY r.started_at DESC
                 LIMIT 20",
            )?;
            let commands = statement
                .query_map(params![format!("%{short}%")], |row| {
                    row.get::<_, Option<String>>(0)
                })?
                .filter_map(Result::ok)
                .flatten();
            for command in commands {
                *scores.entry(command).or_insert(0) += 2;
            }
        }

        let mut ranked: Vec<(String, i64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(ranked.into_iter().map(|(name, _)| name).collect())
    }

    /// Returns the most recent trace run whose command mentions "test".
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_latest_test_run(&self) -> Result<Option<TraceRun>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM trace_runs
             WHERE command LIKE '%test%'
             ORDER BY started_at DESC
             LIMIT 1",
            params![],
            trace_run_from_row,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Loads tracked files, optionally scoped to one ingest run.
    fn tracked_files(
        &self,
        since_run_id: Option<&IngestRunId>,
    ) -> Result<BTreeMap<String, f64>, StoreError> {
        let conn = self.conn()?;
        let mut tracked = BTreeMap::new();
        if let Some(run_id) = since_run_id {
            let mut statement = conn.prepare(
                "SELECT file_path, mtime FROM file_tracking WHERE last_ingest_run = ?1",
            )?;
            let rows = statement.query_map(params![run_id.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?;
            for row in rows {
                let (path, mtime) = row?;
                tracked.insert(path, mtime);
            }
        } else {
            let mut statement = conn.prepare("SELECT file_path, mtime FROM file_tracking")?;
            let rows = statement.query_map(params![], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?;
            for row in rows {
                let (path, mtime) = row?;
                tracked.insert(path, mtime);
            }
        }
        Ok(tracked)
    }

    /// Returns entity ids bound to a file through the entity-file map.
    fn entity_ids_for_file(&self, file_path: &str) -> Result<Vec<EntityId>, StoreError> {
        let conn = self.conn()?;
        let mut statement =
            conn.prepare("SELECT entity_id FROM entity_files WHERE file_path = ?1")?;
        let rows = statement.query_map(params![file_path], |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(EntityId::new(row?));
        }
        Ok(ids)
    }
}

/// Returns a file's mtime as epoch seconds (0.0 when unreadable).
fn current_mtime(path: &Path) -> f64 {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map_or(0.0, |duration| duration.as_secs_f64())
}
