// crates/loom-store/src/ingest.rs
// ============================================================================
// Module: Loom Ingestion Coordinator
// Description: Walks path sets, dispatches files to parsers, persists results.
// Purpose: Turn source trees into graph rows with file tracking for change detection.
// Dependencies: loom-core, rusqlite, walkdir, tracing
// ============================================================================

//! ## Overview
//! Ingestion walks one or more root paths, skips excluded components, asks
//! the parser registry for a parser per file extension, and persists the
//! parser's entities and relationships. Endpoint names resolve through a
//! map local to each file; `dom_reference` edges (and any other relation the
//! graph does not type) whose targets cannot be resolved in-file persist to
//! the cross-file reference table for post-ingest validation.
//!
//! Parse errors are counted and logged, never fatal. An unhandled error
//! marks the ingest run `failed` and propagates; success marks it
//! `completed` with final counts. Ingestion commits in many small steps, so
//! a failure leaves a partial but consistent graph.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::UNIX_EPOCH;

use loom_core::EntityId;
use loom_core::EntityKind;
use loom_core::IngestRun;
use loom_core::IngestRunId;
use loom_core::IngestStats;
use loom_core::IngestStatus;
use loom_core::MetadataBag;
use loom_core::ParseOutcome;
use loom_core::RelationKind;
use loom_core::now_iso8601;
use rusqlite::OptionalExtension;
use rusqlite::params;
use walkdir::WalkDir;

use crate::store::CodeStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Exclusions
// ============================================================================

/// Path components excluded from ingestion by default.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] =
    &[".git", "__pycache__", ".claude/skills", "node_modules", ".venv", "venv"];

/// Reports whether a path should be skipped under the exclusion patterns.
///
/// A path is excluded when any component equals a pattern or the joined
/// relative path contains a pattern (covers multi-component patterns such as
/// `.claude/skills`).
fn is_excluded(relative: &Path, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    for component in relative.components() {
        let component = component.as_os_str().to_string_lossy();
        if patterns.iter().any(|pattern| component == pattern.as_str()) {
            return true;
        }
    }
    let joined = relative.to_string_lossy().replace('\\', "/");
    patterns.iter().any(|pattern| joined.contains(pattern.as_str()))
}

// ============================================================================
// SECTION: Ingestion
// ============================================================================

impl CodeStore {
    /// Recursively ingests source files from the given root paths.
    ///
    /// `exclude_patterns` of `None` applies [`DEFAULT_EXCLUDE_PATTERNS`];
    /// pass an empty slice to disable exclusions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for a nonexistent root path and
    /// [`StoreError::Db`] on database failure. Either marks the ingest run
    /// `failed` before propagating.
    pub fn ingest_files(
        &self,
        paths: &[PathBuf],
        exclude_patterns: Option<&[String]>,
    ) -> Result<IngestStats, StoreError> {
        let patterns: Vec<String> = exclude_patterns.map_or_else(
            || DEFAULT_EXCLUDE_PATTERNS.iter().map(ToString::to_string).collect(),
            |given| given.to_vec(),
        );

        let run_id = self.start_ingest_run(paths)?;
        let mut stats = IngestStats::default();
        match self.ingest_roots(paths, &patterns, &run_id, &mut stats) {
            Ok(()) => {
                self.end_ingest_run(&run_id, &stats, IngestStatus::Completed)?;
                Ok(stats)
            }
            Err(err) => {
                self.end_ingest_run(&run_id, &stats, IngestStatus::Failed)?;
                Err(err)
            }
        }
    }

    /// Walks every root, ingesting each supported file.
    fn ingest_roots(
        &self,
        paths: &[PathBuf],
        patterns: &[String],
        run_id: &IngestRunId,
        stats: &mut IngestStats,
    ) -> Result<(), StoreError> {
        let extensions = self.registry().supported_extensions();
        for root in paths {
            if !root.exists() {
                return Err(StoreError::Invalid(format!(
                    "path does not exist: {}",
                    root.display()
                )));
            }
            for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
                if !extensions.iter().any(|ext| file_name.ends_with(ext)) {
                    continue;
                }
                let relative = path.strip_prefix(root).unwrap_or(path);
                if is_excluded(relative, patterns) {
                    continue;
                }
                self.ingest_one_file(path, root, run_id, stats)?;
            }
        }
        Ok(())
    }

    /// Parses one file and persists its entities and relationships.
    fn ingest_one_file(
        &self,
        path: &Path,
        root: &Path,
        run_id: &IngestRunId,
        stats: &mut IngestStats,
    ) -> Result<(), StoreError> {
        let Some(parser) = self.registry().parser_for(path) else {
            return Ok(());
        };
        let outcome = match parser.parse_file(path, root) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "parser failed");
                stats.errors += 1;
                return Ok(());
            }
        };
        if !outcome.errors.is_empty() {
            for error in &outcome.errors {
                tracing::warn!(file = %path.display(), "{error}");
            }
            stats.errors += i64::try_from(outcome.errors.len()).unwrap_or(i64::MAX);
            return Ok(());
        }

        self.track_file(path, Some(run_id))?;
        self.persist_outcome(&outcome, path, stats)
    }

    /// Inserts an outcome's entities and relationships.
    fn persist_outcome(
        &self,
        outcome: &ParseOutcome,
        path: &Path,
        stats: &mut IngestStats,
    ) -> Result<(), StoreError> {
        let mut name_to_id: HashMap<&str, EntityId> = HashMap::new();

        for entity in &outcome.entities {
            let id = self.add_entity(
                &entity.name,
                entity.kind,
                entity.code.as_deref(),
                entity.intent.as_deref(),
                entity.metadata.as_ref(),
            )?;
            name_to_id.insert(entity.name.as_str(), id);
            self.track_entity_file(id, path)?;
            match entity.kind {
                EntityKind::Module => stats.modules += 1,
                EntityKind::Function => stats.functions += 1,
                EntityKind::Class => stats.classes += 1,
                EntityKind::Method => stats.methods += 1,
                _ => {}
            }
        }

        for rel in &outcome.relationships {
            let from_id = name_to_id.get(rel.from_name.as_str()).copied();
            let to_id = name_to_id.get(rel.to_name.as_str()).copied();
            let typed = RelationKind::from_str(&rel.relation).ok();
            match (from_id, to_id, typed) {
                (Some(source), Some(target), Some(relation)) => {
                    self.add_relationship(source, target, relation, rel.metadata.as_ref())?;
                }
                (Some(source), _, None) => {
                    // Untyped relations (dom_reference and friends) may point
                    // outside this file; keep them for post-ingest validation.
                    self.store_cross_file_reference(
                        source,
                        &rel.to_name,
                        &rel.relation,
                        rel.metadata.as_ref(),
                        path,
                    )?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Persists a cross-file reference row.
    fn store_cross_file_reference(
        &self,
        source: EntityId,
        target_name: &str,
        ref_type: &str,
        metadata: Option<&MetadataBag>,
        source_file: &Path,
    ) -> Result<(), StoreError> {
        let line = loom_core::core::entity::metadata_i64(metadata, "line").unwrap_or(0);
        let verifiable = metadata
            .and_then(|bag| bag.get("verifiable"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(true);
        let reason = loom_core::core::entity::metadata_str(metadata, "reason")
            .map(ToString::to_string);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO cross_file_refs
             (source_entity_id, target_name, ref_type, source_file, line_number,
              verifiable, verification_reason, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                source.get(),
                target_name,
                ref_type,
                source_file.display().to_string(),
                line,
                i64::from(verifiable),
                reason,
                crate::graph::encode_metadata(metadata),
                now_iso8601(),
            ],
        )?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Run Tracking
// ============================================================================

impl CodeStore {
    /// Begins tracking an ingest operation and returns its run id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn start_ingest_run(&self, paths: &[PathBuf]) -> Result<IngestRunId, StoreError> {
        let run_id = IngestRunId::generate();
        let paths: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO ingest_runs (run_id, started_at, paths, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                run_id.as_str(),
                now_iso8601(),
                serde_json::to_string(&paths).unwrap_or_else(|_| "[]".to_string()),
                IngestStatus::Running.as_str(),
            ],
        )?;
        Ok(run_id)
    }

    /// Ends an ingest operation with final counts.
    ///
    /// An ingest run must be ended exactly once; one left `running` is a
    /// recoverable leak but prevents correct change tracking against it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn end_ingest_run(
        &self,
        run_id: &IngestRunId,
        stats: &IngestStats,
        status: IngestStatus,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE ingest_runs SET ended_at = ?1, stats = ?2, status = ?3 WHERE run_id = ?4",
            params![
                now_iso8601(),
                serde_json::to_string(stats).unwrap_or_else(|_| "{}".to_string()),
                status.as_str(),
                run_id.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Returns the most recent ingest run, when any exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_latest_ingest_run(&self) -> Result<Option<IngestRun>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT run_id, started_at, ended_at, paths, stats, status
             FROM ingest_runs ORDER BY started_at DESC LIMIT 1",
            params![],
            |row| {
                let paths_text: Option<String> = row.get("paths")?;
                let stats_text: Option<String> = row.get("stats")?;
                let status_text: String = row.get("status")?;
                Ok(IngestRun {
                    run_id: IngestRunId::new(row.get::<_, String>("run_id")?),
                    started_at: row.get("started_at")?,
                    ended_at: row.get("ended_at")?,
                    paths: paths_text
                        .and_then(|text| serde_json::from_str(&text).ok())
                        .unwrap_or_default(),
                    stats: stats_text.and_then(|text| serde_json::from_str(&text).ok()),
                    status: IngestStatus::from_str(&status_text)
                        .unwrap_or(IngestStatus::Running),
                })
            },
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Records a file's modification time and size for change tracking.
    ///
    /// Missing files are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn track_file(
        &self,
        file_path: &Path,
        run_id: Option<&IngestRunId>,
    ) -> Result<(), StoreError> {
        let Ok(meta) = std::fs::metadata(file_path) else {
            return Ok(());
        };
        let mtime = meta
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map_or(0.0, |duration| duration.as_secs_f64());
        let size = i64::try_from(meta.len()).unwrap_or(i64::MAX);
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO file_tracking
             (file_path, mtime, size, last_ingest_run, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                file_path.display().to_string(),
                mtime,
                size,
                run_id.map(IngestRunId::as_str),
                now_iso8601(),
            ],
        )?;
        Ok(())
    }

    /// Records which file an entity was extracted from.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn track_entity_file(&self, entity_id: EntityId, file_path: &Path) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO entity_files (entity_id, file_path) VALUES (?1, ?2)",
            params![entity_id.get(), file_path.display().to_string()],
        )?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::is_excluded;
    use std::path::Path;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn component_match_excludes() {
        let pats = patterns(&[".git", "node_modules"]);
        assert!(is_excluded(Path::new(".git/config.py"), &pats));
        assert!(is_excluded(Path::new("a/node_modules/b.py"), &pats));
        assert!(!is_excluded(Path::new("a/b.py"), &pats));
    }

    #[test]
    fn joined_path_match_excludes() {
        let pats = patterns(&[".claude/skills"]);
        assert!(is_excluded(Path::new(".claude/skills/tool.py"), &pats));
        assert!(!is_excluded(Path::new(".claude/other/tool.py"), &pats));
    }

    #[test]
    fn empty_patterns_exclude_nothing() {
        assert!(!is_excluded(Path::new(".git/config.py"), &[]));
    }
}
