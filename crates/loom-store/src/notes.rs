// crates/loom-store/src/notes.rs
// ============================================================================
// Module: Loom Knowledge Base
// Description: Notes, note-entity links, consolidation, hypothesis evidence.
// Purpose: Persist what humans and LLMs learn about the codebase.
// Dependencies: loom-core, rusqlite, regex
// ============================================================================

//! ## Overview
//! Notes capture analysis, hypotheses, intents, decisions, and bug reports,
//! linked to entities through typed links. Entity references resolve as an
//! integer id first, then through the text query preferring an exact name.
//! Consolidation merges several notes into one, carrying the majority type
//! and the union of links. Hypothesis checking gathers trace evidence for
//! human or LLM judgment without mutating the note.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::LazyLock;

use loom_core::Entity;
use loom_core::EntityId;
use loom_core::LinkedNote;
use loom_core::Note;
use loom_core::NoteId;
use loom_core::NoteLinkType;
use loom_core::NoteStats;
use loom_core::NoteStatus;
use loom_core::NoteType;
use loom_core::TraceRunId;
use loom_core::now_iso8601;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;

use crate::store::CodeStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Entity References
// ============================================================================

/// A reference to an entity by id or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    /// Direct row id.
    Id(EntityId),
    /// Name to resolve through the text query (digit-only strings resolve
    /// as ids first).
    Name(String),
}

impl From<EntityId> for EntityRef {
    fn from(id: EntityId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for EntityRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for EntityRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

// ============================================================================
// SECTION: Hypothesis Types
// ============================================================================

/// An entity found in or linked to a hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionedEntity {
    /// Entity id.
    pub id: EntityId,
    /// Entity name.
    pub name: String,
    /// Entity kind wire name.
    pub kind: String,
    /// How the mention was found: `linked` or `extracted`.
    pub source: String,
}

/// Trace evidence gathered for one mentioned entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisEvidence {
    /// Entity name.
    pub entity: String,
    /// Entity kind wire name.
    pub entity_kind: String,
    /// Calls to the entity in the checked run.
    pub call_count: usize,
    /// Calls that raised.
    pub exception_count: usize,
    /// Capped per-call summaries.
    pub calls: Vec<serde_json::Value>,
    /// Summaries of the calls that raised.
    pub exceptions: Vec<serde_json::Value>,
}

/// Evidence report for one hypothesis against one trace run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisReport {
    /// The hypothesis text.
    pub hypothesis: String,
    /// Hypothesis note id.
    pub hypothesis_id: NoteId,
    /// The trace run checked.
    pub trace_run_id: TraceRunId,
    /// Command of that run.
    pub trace_command: Option<String>,
    /// Status of that run.
    pub trace_status: String,
    /// Entities linked to or extracted from the hypothesis.
    pub entities_mentioned: Vec<MentionedEntity>,
    /// Per-entity evidence.
    pub evidence: Vec<HypothesisEvidence>,
    /// Human-readable evidence block.
    pub summary: String,
}

// ============================================================================
// SECTION: Note CRUD
// ============================================================================

impl CodeStore {
    /// Adds a note, optionally linked to entities, and returns its id.
    ///
    /// Unresolvable entity references are skipped; duplicate links are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn add_note(
        &self,
        content: &str,
        note_type: NoteType,
        title: Option<&str>,
        source: Option<&str>,
        linked_entities: &[EntityRef],
        link_type: NoteLinkType,
    ) -> Result<NoteId, StoreError> {
        let note_id = NoteId::generate();
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO notes (id, type, title, content, created_at, source, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    note_id.as_str(),
                    note_type.as_str(),
                    title,
                    content,
                    now_iso8601(),
                    source,
                    NoteStatus::Active.as_str(),
                ],
            )?;
        }
        for reference in linked_entities {
            if let Some(entity_id) = self.resolve_entity_ref(reference)? {
                self.link_note(&note_id, entity_id, link_type)?;
            }
        }
        Ok(note_id)
    }

    /// Inserts one note-entity link, ignoring duplicates.
    fn link_note(
        &self,
        note_id: &NoteId,
        entity_id: EntityId,
        link_type: NoteLinkType,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO note_links (note_id, entity_id, link_type)
             VALUES (?1, ?2, ?3)",
            params![note_id.as_str(), entity_id.get().to_string(), link_type.as_str()],
        )?;
        Ok(())
    }

    /// Resolves an entity reference to an id, when possible.
    pub(crate) fn resolve_entity_ref(
        &self,
        reference: &EntityRef,
    ) -> Result<Option<EntityId>, StoreError> {
        match reference {
            EntityRef::Id(id) => {
                Ok(self.get_entity(*id)?.map(|entity| entity.id))
            }
            EntityRef::Name(name) => {
                if let Ok(raw) = name.parse::<i64>() {
                    if let Some(entity) = self.get_entity(EntityId::new(raw))? {
                        return Ok(Some(entity.id));
                    }
                }
                self.resolve_entity_by_name(name)
            }
        }
    }

    /// Resolves a name through the text query, preferring an exact match.
    pub(crate) fn resolve_entity_by_name(
        &self,
        name: &str,
    ) -> Result<Option<EntityId>, StoreError> {
        let results = self.query(name, None)?;
        if results.is_empty() {
            return Ok(None);
        }
        for result in &results {
            if result.entity.name == name {
                return Ok(Some(result.entity.id));
            }
        }
        Ok(Some(results[0].entity.id))
    }

    /// Returns a note by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_note(&self, note_id: &NoteId) -> Result<Option<Note>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM notes WHERE id = ?1",
            params![note_id.as_str()],
            note_from_row,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Lists notes, optionally filtered by linked entity, type, and status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_notes(
        &self,
        entity_name: Option<&str>,
        note_type: Option<NoteType>,
        status: Option<NoteStatus>,
        limit: i64,
    ) -> Result<Vec<Note>, StoreError> {
        let entity_id = match entity_name {
            Some(name) => match self.resolve_entity_by_name(name)? {
                Some(id) => Some(id),
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        let conn = self.conn()?;
        let mut sql = if entity_id.is_some() {
            "SELECT DISTINCT n.* FROM notes n
             JOIN note_links nl ON n.id = nl.note_id
             WHERE nl.entity_id = ?"
                .to_string()
        } else {
            "SELECT * FROM notes WHERE 1=1".to_string()
        };
        let mut bindings: Vec<String> = Vec::new();
        if let Some(id) = entity_id {
            bindings.push(id.get().to_string());
        }
        if let Some(note_type) = note_type {
            sql.push_str(if entity_id.is_some() { " AND n.type = ?" } else { " AND type = ?" });
            bindings.push(note_type.as_str().to_string());
        }
        if let Some(status) = status {
            sql.push_str(if entity_id.is_some() {
                " AND n.status = ?"
            } else {
                " AND status = ?"
            });
            bindings.push(status.as_str().to_string());
        }
        sql.push_str(if entity_id.is_some() {
            " ORDER BY n.created_at DESC LIMIT ?"
        } else {
            " ORDER BY created_at DESC LIMIT ?"
        });
        bindings.push(limit.to_string());

        let mut statement = conn.prepare(&sql)?;
        let rows = statement.query_map(rusqlite::params_from_iter(bindings), note_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// Returns notes linked to an entity, with their link types.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_entity_notes(&self, entity_name: &str) -> Result<Vec<LinkedNote>, StoreError> {
        let Some(entity_id) = self.resolve_entity_by_name(entity_name)? else {
            return Ok(Vec::new());
        };
        let conn = self.conn()?;
        let mut statement = conn.prepare(
            "SELECT n.*, nl.link_type FROM notes n
             JOIN note_links nl ON n.id = nl.note_id
             WHERE nl.entity_id = ?1
             ORDER BY n.created_at DESC",
        )?;
        let rows = statement.query_map(params![entity_id.get().to_string()], |row| {
            let link_text: String = row.get("link_type")?;
            Ok(LinkedNote {
                note: note_from_row(row)?,
                link_type: NoteLinkType::from_str(&link_text)
                    .unwrap_or(NoteLinkType::About),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// Updates a note's content, title, and entity links.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn update_note(
        &self,
        note_id: &NoteId,
        content: Option<&str>,
        title: Option<&str>,
        add_entities: &[EntityRef],
        remove_entities: &[EntityRef],
    ) -> Result<bool, StoreError> {
        if self.get_note(note_id)?.is_none() {
            return Ok(false);
        }

        if content.is_some() || title.is_some() {
            let mut clauses = Vec::new();
            let mut bindings: Vec<String> = Vec::new();
            if let Some(content) = content {
                clauses.push("content = ?");
                bindings.push(content.to_string());
            }
            if let Some(title) = title {
                clauses.push("title = ?");
                bindings.push(title.to_string());
            }
            bindings.push(note_id.as_str().to_string());
            let conn = self.conn()?;
            conn.execute(
                &format!("UPDATE notes SET {} WHERE id = ?", clauses.join(", ")),
                rusqlite::params_from_iter(bindings),
            )?;
        }

        for reference in remove_entities {
            if let Some(entity_id) = self.resolve_entity_ref(reference)? {
                let conn = self.conn()?;
                conn.execute(
                    "DELETE FROM note_links WHERE note_id = ?1 AND entity_id = ?2",
                    params![note_id.as_str(), entity_id.get().to_string()],
                )?;
            }
        }
        for reference in add_entities {
            if let Some(entity_id) = self.resolve_entity_ref(reference)? {
                self.link_note(note_id, entity_id, NoteLinkType::About)?;
            }
        }
        Ok(true)
    }

    /// Updates a note's status; returns whether the note existed.
    ///
    /// No state machine beyond the enum is enforced; hypothesis workflow
    /// conventionally moves active to confirmed or refuted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn update_note_status(
        &self,
        note_id: &NoteId,
        status: NoteStatus,
    ) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE notes SET status = ?1 WHERE id = ?2",
            params![status.as_str(), note_id.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Merges several notes into one and deletes the originals.
    ///
    /// With `summarize`, contents concatenate under per-note headers; the
    /// consolidated note carries the majority type (ties fall back to
    /// `analysis`) and the union of entity links.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when no referenced note resolves,
    /// [`StoreError::Db`] on database failure.
    pub fn consolidate_notes(
        &self,
        note_ids: &[NoteId],
        new_title: &str,
        summarize: bool,
    ) -> Result<NoteId, StoreError> {
        let mut notes = Vec::new();
        let mut linked: BTreeSet<String> = BTreeSet::new();
        for note_id in note_ids {
            if let Some(note) = self.get_note(note_id)? {
                let conn = self.conn()?;
                let mut statement =
                    conn.prepare("SELECT entity_id FROM note_links WHERE note_id = ?1")?;
                let rows =
                    statement.query_map(params![note_id.as_str()], |row| row.get::<_, String>(0))?;
                for row in rows {
                    linked.insert(row?);
                }
                notes.push(note);
            }
        }
        if notes.is_empty() {
            return Err(StoreError::Invalid(
                "no valid notes found to consolidate".to_string(),
            ));
        }

        let content = if summarize {
            let mut parts = Vec::new();
            for note in &notes {
                let header = note
                    .title
                    .clone()
                    .unwrap_or_else(|| note.note_type.as_str().to_uppercase());
                parts.push(format!("## {header}"));
                parts.push(note.content.clone());
                parts.push(String::new());
            }
            parts.join("\n").trim().to_string()
        } else {
            notes
                .iter()
                .map(|note| note.content.clone())
                .collect::<Vec<_>>()
                .join("\n\n---\n\n")
        };

        // Majority type wins; ties resolve to analysis.
        let mut counts: BTreeMap<NoteType, usize> = BTreeMap::new();
        for note in &notes {
            *counts.entry(note.note_type).or_insert(0) += 1;
        }
        let max_count = counts.values().copied().max().unwrap_or(0);
        let tied: Vec<NoteType> = counts
            .into_iter()
            .filter(|&(_, count)| count == max_count)
            .map(|(note_type, _)| note_type)
            .collect();
        let consolidated_type = match tied.as_slice() {
            [single] => *single,
            _ => NoteType::Analysis,
        };

        let new_id = NoteId::generate();
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO notes (id, type, title, content, created_at, source, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    new_id.as_str(),
                    consolidated_type.as_str(),
                    new_title,
                    content,
                    now_iso8601(),
                    "consolidation",
                    NoteStatus::Active.as_str(),
                ],
            )?;
            for entity_id in &linked {
                conn.execute(
                    "INSERT OR IGNORE INTO note_links (note_id, entity_id, link_type)
                     VALUES (?1, ?2, ?3)",
                    params![new_id.as_str(), entity_id, NoteLinkType::About.as_str()],
                )?;
            }
            for note_id in note_ids {
                conn.execute("DELETE FROM note_links WHERE note_id = ?1", params![note_id.as_str()])?;
                conn.execute("DELETE FROM notes WHERE id = ?1", params![note_id.as_str()])?;
            }
        }
        Ok(new_id)
    }

    /// Deletes a note and its links; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn delete_note(&self, note_id: &NoteId) -> Result<bool, StoreError> {
        if self.get_note(note_id)?.is_none() {
            return Ok(false);
        }
        let conn = self.conn()?;
        conn.execute("DELETE FROM note_links WHERE note_id = ?1", params![note_id.as_str()])?;
        conn.execute("DELETE FROM notes WHERE id = ?1", params![note_id.as_str()])?;
        Ok(true)
    }

    /// Returns note counts by type and status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_note_stats(&self) -> Result<NoteStats, StoreError> {
        let conn = self.conn()?;
        let mut stats = NoteStats::default();

        let mut statement =
            conn.prepare("SELECT type, COUNT(*) FROM notes GROUP BY type")?;
        let rows = statement
            .query_map(params![], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (note_type, count) = row?;
            stats.by_type.insert(note_type, count);
        }

        let mut statement =
            conn.prepare("SELECT status, COUNT(*) FROM notes GROUP BY status")?;
        let rows = statement
            .query_map(params![], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (status, count) = row?;
            stats.by_status.insert(status, count);
        }

        stats.total = conn.query_row("SELECT COUNT(*) FROM notes", params![], |row| row.get(0))?;
        stats.linked = conn.query_row(
            "SELECT COUNT(DISTINCT note_id) FROM note_links",
            params![],
            |row| row.get(0),
        )?;
        Ok(stats)
    }
}

// ============================================================================
// SECTION: Hypothesis Checking
// ============================================================================

/// Words never treated as entity mentions in hypothesis text.
static STOP_WORDS: LazyLock<BTreeSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "is", "are", "be", "been", "being", "have", "has", "had", "do", "does", "did",
        "will", "would", "could", "should", "may", "might", "must", "shall", "can", "need",
        "not", "and", "or", "but", "if", "then", "else", "when", "where", "why", "how", "what",
        "which", "this", "that", "these", "those", "i", "you", "he", "she", "it", "we", "they",
        "because", "returns", "return", "empty", "none", "null", "true", "false", "error",
        "exception", "bug", "issue", "problem", "think", "hypothesis", "test", "testing",
        "check", "verify",
    ]
    .into_iter()
    .collect()
});

impl CodeStore {
    /// Gathers trace evidence for a hypothesis note against one run.
    ///
    /// Does not mutate the hypothesis; the caller judges the evidence and
    /// updates the status separately.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the note is missing, is not a
    /// hypothesis, or the run is unknown; [`StoreError::Db`] on database
    /// failure.
    pub fn check_hypothesis(
        &self,
        note_id: &NoteId,
        run_id: &TraceRunId,
    ) -> Result<HypothesisReport, StoreError> {
        let Some(note) = self.get_note(note_id)? else {
            return Err(StoreError::Invalid(format!("hypothesis not found: {note_id}")));
        };
        if note.note_type != NoteType::Hypothesis {
            return Err(StoreError::Invalid(format!(
                "note is not a hypothesis (type: {})",
                note.note_type
            )));
        }
        let Some(run) = self.get_trace_run(run_id)? else {
            return Err(StoreError::Invalid(format!("trace run not found: {run_id}")));
        };

        let mut mentioned: Vec<MentionedEntity> = Vec::new();

        // Linked entities first.
        let linked_ids: Vec<String> = {
            let conn = self.conn()?;
            let mut statement =
                conn.prepare("SELECT entity_id FROM note_links WHERE note_id = ?1")?;
            let rows =
                statement.query_map(params![note_id.as_str()], |row| row.get::<_, String>(0))?;
            rows.filter_map(Result::ok).collect()
        };
        for raw in linked_ids {
            let Ok(id) = raw.parse::<i64>() else {
                continue;
            };
            if let Some(entity) = self.get_entity(EntityId::new(id))? {
                mentioned.push(MentionedEntity {
                    id: entity.id,
                    name: entity.name,
                    kind: entity.kind.as_str().to_string(),
                    source: "linked".to_string(),
                });
            }
        }

        // Identifier-looking words in the hypothesis text.
        for name in extract_identifiers(&note.content) {
            if STOP_WORDS.contains(name.to_lowercase().as_str()) {
                continue;
            }
            if let Some(entity) = self.entity_matching_mention(&name)? {
                if !mentioned.iter().any(|existing| existing.id == entity.id) {
                    mentioned.push(MentionedEntity {
                        id: entity.id,
                        name: entity.name,
                        kind: entity.kind.as_str().to_string(),
                        source: "extracted".to_string(),
                    });
                }
            }
        }

        // Match mentioned entities against the run's calls.
        let calls = self.get_calls_for_run(run_id, true, false)?;
        let mut evidence = Vec::new();
        for entity in &mentioned {
            let matching: Vec<&loom_core::TraceCall> = calls
                .iter()
                .filter(|call| {
                    call.function_name.split('.').any(|part| part == entity.name)
                        || call.function_name.ends_with(&entity.name)
                })
                .collect();

            let mut summaries = Vec::new();
            let mut exceptions = Vec::new();
            for call in matching.iter().take(10) {
                let mut summary = serde_json::json!({
                    "function": call.function_name,
                    "duration_ms": call.duration_ms,
                    "depth": call.depth,
                });
                if let Some(args) = &call.args {
                    summary["args"] = serde_json::json!(truncate(&args.to_string(), 200));
                }
                if let Some(ret) = &call.return_value {
                    summary["returned"] = serde_json::json!(truncate(&ret.to_string(), 200));
                }
                if let Some(exception_type) = &call.exception_type {
                    let message = call.exception_message.as_deref().unwrap_or("");
                    summary["exception"] = serde_json::json!(format!(
                        "{exception_type}: {}",
                        truncate(message, 100)
                    ));
                    exceptions.push(summary.clone());
                }
                summaries.push(summary);
            }

            evidence.push(HypothesisEvidence {
                entity: entity.name.clone(),
                entity_kind: entity.kind.clone(),
                call_count: matching.len(),
                exception_count: exceptions.len(),
                calls: summaries,
                exceptions,
            });
        }

        let summary = render_evidence_summary(&note.content, run_id, &run, &evidence);
        Ok(HypothesisReport {
            hypothesis: note.content,
            hypothesis_id: note_id.clone(),
            trace_run_id: run_id.clone(),
            trace_command: run.command,
            trace_status: run.status.as_str().to_string(),
            entities_mentioned: mentioned,
            evidence,
            summary,
        })
    }

    /// Finds an entity whose name equals or ends with the mentioned name.
    fn entity_matching_mention(&self, name: &str) -> Result<Option<Entity>, StoreError> {
        let results = self.query(name, None)?;
        for result in results {
            if result.entity.name == name
                || result.entity.name.ends_with(&format!(".{name}"))
            {
                return Ok(Some(result.entity));
            }
        }
        Ok(None)
    }
}

/// Extracts identifier-looking words (possibly dotted) from text.
fn extract_identifiers(text: &str) -> BTreeSet<String> {
    static IDENTIFIER: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\b")
            .unwrap_or_else(|_| unreachable!("identifier pattern is valid"))
    });
    IDENTIFIER
        .find_iter(text)
        .map(|found| found.as_str().to_string())
        .collect()
}

/// Truncates text to a character budget.
fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        text.chars().take(limit).collect()
    }
}

/// Renders the human-readable evidence block.
fn render_evidence_summary(
    hypothesis: &str,
    run_id: &TraceRunId,
    run: &loom_core::TraceRun,
    evidence: &[HypothesisEvidence],
) -> String {
    let mut lines = Vec::new();
    let clipped = truncate(hypothesis, 200);
    let ellipsis = if hypothesis.chars().count() > 200 { "..." } else { "" };
    lines.push(format!("Hypothesis: {clipped}{ellipsis}"));
    lines.push(format!(
        "Trace Run: {run_id} ({})",
        run.command.as_deref().unwrap_or("N/A")
    ));
    lines.push(format!("Status: {}", run.status));
    lines.push(String::new());
    lines.push("Evidence:".to_string());
    for item in evidence {
        if item.call_count > 0 {
            lines.push(format!(
                "  - {} ({}): called {} times, {} exceptions",
                item.entity, item.entity_kind, item.call_count, item.exception_count
            ));
            for exception in item.exceptions.iter().take(3) {
                let text = exception
                    .get("exception")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("N/A");
                lines.push(format!("      Exception: {text}"));
            }
        } else {
            lines.push(format!(
                "  - {} ({}): NOT CALLED in this run",
                item.entity, item.entity_kind
            ));
        }
    }
    lines.push(String::new());
    lines.push("Note: This is evidence for human/LLM judgment, not automatic resolution.".to_string());
    lines.join("\n")
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps a notes row.
fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    let type_text: String = row.get("type")?;
    let status_text: Option<String> = row.get("status")?;
    Ok(Note {
        id: NoteId::new(row.get::<_, String>("id")?),
        note_type: NoteType::from_str(&type_text).unwrap_or(NoteType::Analysis),
        title: row.get("title")?,
        content: row.get("content")?,
        created_at: row.get("created_at")?,
        source: row.get("source")?,
        status: status_text
            .as_deref()
            .and_then(|text| NoteStatus::from_str(text).ok())
            .unwrap_or(NoteStatus::Active),
    })
}
