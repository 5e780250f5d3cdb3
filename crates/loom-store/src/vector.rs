// crates/loom-store/src/vector.rs
// ============================================================================
// Module: Loom Vector Search
// Description: Embedding tables and KNN semantic search over entities and notes.
// Purpose: Provide optional semantic retrieval behind a capability probe.
// Dependencies: loom-core, rusqlite, sqlite-vec
// ============================================================================

//! ## Overview
//! Semantic search is an optional capability. At open, the store attempts to
//! register the sqlite-vec extension and create the `vec_entities` virtual
//! table; failure leaves the store usable with `vector_available()` false,
//! and every semantic operation then returns
//! [`StoreError::CapabilityUnavailable`]. The embedding model itself stays
//! outside the store behind the [`TextEmbedder`] seam.
//!
//! Entities embed as `"name intent code[:500]"` with their row id as the
//! vector rowid. Notes have string ids, so note embeddings use sequential
//! rowids with an in-process rowid-to-note-id sidecar map, rebuilt lazily
//! from note rowid order when missing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Once;

use loom_core::Note;
use loom_core::NoteId;
use loom_core::NoteType;
use serde::Deserialize;
use serde::Serialize;

use loom_core::Entity;
use loom_core::EntityId;
use rusqlite::params;

use crate::store::CodeStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Fixed embedding dimension of the vector tables.
pub const EMBEDDING_DIM: usize = 384;
/// Characters of entity code included in the embedded text.
const CODE_PREFIX_CHARS: usize = 500;

// ============================================================================
// SECTION: Embedder Contract
// ============================================================================

/// Embedding-model seam; the ML runtime lives outside the store.
///
/// # Invariants
/// - `embed` returns one vector per input text, each of `dimension()`
///   elements.
pub trait TextEmbedder: Send + Sync {
    /// Vector dimension this embedder produces.
    fn dimension(&self) -> usize;

    /// Encodes each text into a vector.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the model cannot produce embeddings.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError>;
}

// ============================================================================
// SECTION: Result Types
// ============================================================================

/// Counters returned by [`CodeStore::generate_embeddings`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingStats {
    /// Entities examined.
    pub entities_processed: i64,
    /// Entity embeddings written.
    pub embeddings_created: i64,
    /// Entities skipped for empty text.
    pub skipped: i64,
    /// Notes examined.
    pub notes_processed: i64,
    /// Note embeddings written.
    pub note_embeddings_created: i64,
}

/// One semantic-search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SemanticHit {
    /// An entity hit.
    Entity {
        /// The matched entity.
        entity: Entity,
        /// Similarity score, `1 / (1 + distance)`.
        score: f64,
        /// Raw distance (lower is better).
        distance: f64,
    },
    /// A note hit (only with `include_notes`).
    Note {
        /// The matched note.
        note: Note,
        /// Similarity score, `1 / (1 + distance)`.
        score: f64,
        /// Raw distance (lower is better).
        distance: f64,
    },
}

impl SemanticHit {
    /// Returns the hit's similarity score.
    #[must_use]
    pub const fn score(&self) -> f64 {
        match self {
            Self::Entity { score, .. } | Self::Note { score, .. } => *score,
        }
    }
}

/// One note-search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSearchHit {
    /// The matched note.
    pub note: Note,
    /// Similarity score, `1 / (1 + distance)`.
    pub score: f64,
    /// Raw distance (lower is better).
    pub distance: f64,
}

// ============================================================================
// SECTION: Extension Loading
// ============================================================================

/// Registers sqlite-vec as an auto-loaded extension, once per process.
///
/// Must run before the store's connection opens; auto-extensions apply only
/// to connections created afterwards.
#[allow(unsafe_code, reason = "sqlite-vec registers through the SQLite C auto-extension hook")]
pub(crate) fn register_vec_extension() {
    static VEC_INIT: Once = Once::new();
    VEC_INIT.call_once(|| {
        // SAFETY: sqlite3_vec_init matches the auto-extension entry-point
        // signature; registration happens once per process before any
        // connection touches the virtual tables.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }
    });
}

impl CodeStore {
    /// Best-effort vector-table creation; returns availability.
    pub(crate) fn initialize_vector_tables(&self) -> bool {
        let Ok(conn) = self.conn() else {
            return false;
        };
        let created = conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_entities
             USING vec0(embedding float[{EMBEDDING_DIM}])"
        ));
        match created {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "failed to initialize sqlite-vec");
                false
            }
        }
    }

    /// Fails unless the vector capability and an embedder are present.
    fn require_vector(&self) -> Result<std::sync::Arc<dyn TextEmbedder>, StoreError> {
        if !self.vector_available() {
            return Err(StoreError::CapabilityUnavailable(
                "vector extension is not available".to_string(),
            ));
        }
        self.embedder().ok_or_else(|| {
            StoreError::CapabilityUnavailable("no embedding model configured".to_string())
        })
    }
}

// ============================================================================
// SECTION: Embedding Generation
// ============================================================================

impl CodeStore {
    /// Rebuilds entity and note embeddings.
    ///
    /// Entities with empty text are skipped. Note embeddings use sequential
    /// rowids; the rowid-to-note-id map is refreshed in-process.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CapabilityUnavailable`] when the extension or
    /// embedder is absent, [`StoreError::Invalid`] on an embedder dimension
    /// mismatch, and [`StoreError::Db`] on database failure.
    pub fn generate_embeddings(&self) -> Result<EmbeddingStats, StoreError> {
        let embedder = self.require_vector()?;
        if embedder.dimension() != EMBEDDING_DIM {
            return Err(StoreError::Invalid(format!(
                "embedder dimension {} != expected {EMBEDDING_DIM}",
                embedder.dimension()
            )));
        }

        let mut stats = EmbeddingStats::default();

        let entity_rows: Vec<(i64, String)> = {
            let conn = self.conn()?;
            let mut statement =
                conn.prepare("SELECT id, name, intent, code FROM entities")?;
            let rows = statement.query_map(params![], |row| {
                let name: Option<String> = row.get(1)?;
                let intent: Option<String> = row.get(2)?;
                let code: Option<String> = row.get(3)?;
                Ok((row.get::<_, i64>(0)?, embed_text(name, intent, code)))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        {
            let conn = self.conn()?;
            conn.execute("DELETE FROM vec_entities", params![])?;
        }
        for (entity_id, text) in entity_rows {
            stats.entities_processed += 1;
            if text.is_empty() {
                stats.skipped += 1;
                continue;
            }
            let vector = embed_one(embedder.as_ref(), &text)?;
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO vec_entities (rowid, embedding) VALUES (?1, ?2)",
                params![entity_id, vector_to_json(&vector)],
            )?;
            stats.embeddings_created += 1;
        }

        {
            let conn = self.conn()?;
            conn.execute_batch(&format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS vec_notes
                 USING vec0(embedding float[{EMBEDDING_DIM}])"
            ))?;
            conn.execute("DELETE FROM vec_notes", params![])?;
        }

        let note_rows: Vec<(String, String)> = {
            let conn = self.conn()?;
            let mut statement =
                conn.prepare("SELECT id, title, content FROM notes ORDER BY rowid")?;
            let rows = statement.query_map(params![], |row| {
                let title: Option<String> = row.get(1)?;
                let content: Option<String> = row.get(2)?;
                let text = format!(
                    "{} {}",
                    title.unwrap_or_default(),
                    content.unwrap_or_default()
                )
                .trim()
                .to_string();
                Ok((row.get::<_, String>(0)?, text))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        // Rowids follow note ordinal position so the lazy map rebuild in
        // search_notes assigns the same numbering.
        let mut rowid_map = std::collections::HashMap::new();
        for (index, (note_id, text)) in note_rows.into_iter().enumerate() {
            stats.notes_processed += 1;
            let rowid = i64::try_from(index).unwrap_or(i64::MAX) + 1;
            if text.is_empty() {
                continue;
            }
            let vector = embed_one(embedder.as_ref(), &text)?;
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO vec_notes (rowid, embedding) VALUES (?1, ?2)",
                params![rowid, vector_to_json(&vector)],
            )?;
            rowid_map.insert(rowid, NoteId::new(note_id));
            stats.note_embeddings_created += 1;
        }
        *self.note_rowid_map()? = rowid_map;

        Ok(stats)
    }
}

// ============================================================================
// SECTION: Semantic Search
// ============================================================================

impl CodeStore {
    /// Finds entities semantically similar to a query.
    ///
    /// Requests `2 x limit` nearest neighbors, de-duplicates by id and by
    /// name (keeping the best score per name), converts distance to
    /// `1 / (1 + distance)`, optionally appends note results, and truncates
    /// to `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CapabilityUnavailable`] when the extension or
    /// embedder is absent, [`StoreError::Invalid`] when no embeddings have
    /// been generated, and [`StoreError::Db`] on database failure.
    pub fn semantic_search(
        &self,
        query_text: &str,
        limit: usize,
        include_notes: bool,
    ) -> Result<Vec<SemanticHit>, StoreError> {
        let embedder = self.require_vector()?;
        {
            let conn = self.conn()?;
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM vec_entities", params![], |row| row.get(0))?;
            if count == 0 {
                return Err(StoreError::Invalid(
                    "no embeddings found; run generate_embeddings first".to_string(),
                ));
            }
        }

        let query_vector = embed_one(embedder.as_ref(), query_text)?;
        let neighbors = self.knn("vec_entities", &query_vector, limit * 2)?;

        let mut seen_ids = std::collections::HashSet::new();
        // Highest-scoring hit per entity name.
        let mut best_by_name: std::collections::HashMap<String, (Entity, f64, f64)> =
            std::collections::HashMap::new();
        for (rowid, distance) in neighbors {
            if !seen_ids.insert(rowid) {
                continue;
            }
            let Some(entity) = self.get_entity(EntityId::new(rowid))? else {
                continue;
            };
            let score = 1.0 / (1.0 + distance);
            match best_by_name.get(&entity.name) {
                Some((_, existing_score, _)) if *existing_score >= score => {}
                _ => {
                    best_by_name.insert(entity.name.clone(), (entity, score, distance));
                }
            }
        }

        let mut results: Vec<SemanticHit> = best_by_name
            .into_values()
            .map(|(entity, score, distance)| SemanticHit::Entity { entity, score, distance })
            .collect();

        if include_notes {
            match self.search_notes(query_text, None, limit) {
                Ok(notes) => {
                    results.extend(notes.into_iter().map(|hit| SemanticHit::Note {
                        note: hit.note,
                        score: hit.score,
                        distance: hit.distance,
                    }));
                }
                // Missing note embeddings are not an error for entity search.
                Err(StoreError::Invalid(_) | StoreError::CapabilityUnavailable(_)) => {}
                Err(other) => return Err(other),
            }
        }

        results.sort_by(|a, b| {
            b.score().partial_cmp(&a.score()).unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);
        Ok(results)
    }

    /// Semantic search over notes, optionally filtered by type post-hoc.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CapabilityUnavailable`] when the extension or
    /// embedder is absent, [`StoreError::Invalid`] when no note embeddings
    /// exist, and [`StoreError::Db`] on database failure.
    pub fn search_notes(
        &self,
        query_text: &str,
        note_type: Option<NoteType>,
        limit: usize,
    ) -> Result<Vec<NoteSearchHit>, StoreError> {
        let embedder = self.require_vector()?;
        let count: i64 = {
            let conn = self.conn()?;
            conn.query_row("SELECT COUNT(*) FROM vec_notes", params![], |row| row.get(0))
                .unwrap_or(0)
        };
        if count == 0 {
            return Err(StoreError::Invalid(
                "no note embeddings found; run generate_embeddings first".to_string(),
            ));
        }

        let query_vector = embed_one(embedder.as_ref(), query_text)?;
        let neighbors = self.knn("vec_notes", &query_vector, limit * 2)?;

        self.ensure_note_rowid_map()?;
        let rowid_map = self.note_rowid_map()?.clone();

        let mut results = Vec::new();
        for (rowid, distance) in neighbors {
            let Some(note_id) = rowid_map.get(&rowid) else {
                continue;
            };
            let Some(note) = self.get_note(note_id)? else {
                continue;
            };
            if note_type.is_some_and(|wanted| note.note_type != wanted) {
                continue;
            }
            results.push(NoteSearchHit { note, score: 1.0 / (1.0 + distance), distance });
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    /// Runs one KNN query against a vector table.
    fn knn(
        &self,
        table: &str,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<(i64, f64)>, StoreError> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(&format!(
            "SELECT rowid, distance FROM {table} WHERE embedding MATCH ?1 AND k = ?2"
        ))?;
        let rows = statement.query_map(
            params![vector_to_json(query_vector), i64::try_from(k).unwrap_or(i64::MAX)],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// Rebuilds the note rowid map from note rowid order when empty.
    fn ensure_note_rowid_map(&self) -> Result<(), StoreError> {
        {
            if !self.note_rowid_map()?.is_empty() {
                return Ok(());
            }
        }
        let ids: Vec<String> = {
            let conn = self.conn()?;
            let mut statement = conn.prepare("SELECT id FROM notes ORDER BY rowid")?;
            let rows = statement.query_map(params![], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let mut map = self.note_rowid_map()?;
        for (index, id) in ids.into_iter().enumerate() {
            map.insert(i64::try_from(index).unwrap_or(i64::MAX) + 1, NoteId::new(id));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the embedded text for one entity.
fn embed_text(name: Option<String>, intent: Option<String>, code: Option<String>) -> String {
    let code_prefix: String =
        code.unwrap_or_default().chars().take(CODE_PREFIX_CHARS).collect();
    format!(
        "{} {} {}",
        name.unwrap_or_default(),
        intent.unwrap_or_default(),
        code_prefix
    )
    .trim()
    .to_string()
}

/// Embeds one text, requiring exactly one vector back.
fn embed_one(embedder: &dyn TextEmbedder, text: &str) -> Result<Vec<f32>, StoreError> {
    let mut vectors = embedder.embed(&[text.to_string()])?;
    if vectors.len() != 1 {
        return Err(StoreError::Invalid(format!(
            "embedder returned {} vectors for one text",
            vectors.len()
        )));
    }
    Ok(vectors.remove(0))
}

/// Formats a vector as the JSON text sqlite-vec accepts.
fn vector_to_json(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(","))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::embed_text;
    use super::vector_to_json;

    #[test]
    fn embed_text_trims_and_caps_code() {
        let text = embed_text(
            Some("pkg.f".to_string()),
            None,
            Some("x".repeat(2_000)),
        );
        assert!(text.starts_with("pkg.f"));
        assert!(text.len() <= "pkg.f  ".len() + 500);
        assert_eq!(embed_text(None, None, None), "");
    }

    #[test]
    fn vectors_render_as_json_arrays() {
        assert_eq!(vector_to_json(&[0.5, 1.0]), "[0.5,1]");
    }
}
