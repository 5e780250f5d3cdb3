// crates/loom-store/src/graph.rs
// ============================================================================
// Module: Loom Entity/Relationship Graph
// Description: CRUD and traversal over entities and typed directed edges.
// Purpose: Store code entities and relationships and expose graph lookups.
// Dependencies: loom-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! The graph subsystem persists entities and relationships and exposes the
//! lookups everything else builds on. Name lookup uses a case-insensitive
//! `LIKE %q%` scan; callers wanting exact matches post-filter. Deleting an
//! entity cascades to every incident relationship plus its entity-file and
//! cross-file-reference rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;

use loom_core::Direction;
use loom_core::Entity;
use loom_core::EntityId;
use loom_core::EntityKind;
use loom_core::MetadataBag;
use loom_core::RelationKind;
use loom_core::Relationship;
use loom_core::RelationshipId;
use loom_core::RelationshipSummary;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use rusqlite::types::Type;

use crate::store::CodeStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Wraps a domain parse failure into a rusqlite conversion error.
fn conversion_error(
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(err))
}

/// Decodes a JSON metadata column into a bag, tolerating malformed text.
pub(crate) fn decode_metadata(text: Option<String>) -> Option<MetadataBag> {
    let text = text?;
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Encodes an optional metadata bag as JSON text.
pub(crate) fn encode_metadata(bag: Option<&MetadataBag>) -> Option<String> {
    bag.map(|map| serde_json::Value::Object(map.clone()).to_string())
}

/// Maps a `SELECT * FROM entities` row to an [`Entity`].
pub(crate) fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let kind_text: String = row.get("kind")?;
    let kind = EntityKind::from_str(&kind_text).map_err(conversion_error)?;
    Ok(Entity {
        id: EntityId::new(row.get("id")?),
        name: row.get("name")?,
        kind,
        code: row.get("code")?,
        intent: row.get("intent")?,
        metadata: decode_metadata(row.get("metadata")?),
        created_at: row.get("created_at")?,
    })
}

/// Maps a relationships row to a [`Relationship`].
pub(crate) fn relationship_from_row(row: &Row<'_>) -> rusqlite::Result<Relationship> {
    let relation_text: String = row.get("relation")?;
    let relation = RelationKind::from_str(&relation_text).map_err(conversion_error)?;
    Ok(Relationship {
        id: RelationshipId::new(row.get("id")?),
        source_id: EntityId::new(row.get("source_id")?),
        target_id: EntityId::new(row.get("target_id")?),
        relation,
        metadata: decode_metadata(row.get("metadata")?),
    })
}

// ============================================================================
// SECTION: Entity Updates
// ============================================================================

/// Whitelisted entity fields accepted by [`CodeStore::update_entity`].
///
/// Absent fields are left untouched. There is no way to null a field through
/// an update; re-insert the entity instead.
#[derive(Debug, Clone, Default)]
pub struct EntityUpdate {
    /// New fully-qualified name.
    pub name: Option<String>,
    /// New kind.
    pub kind: Option<EntityKind>,
    /// New source snippet.
    pub code: Option<String>,
    /// New intent text.
    pub intent: Option<String>,
    /// New metadata bag (replaces the stored bag wholesale).
    pub metadata: Option<MetadataBag>,
}

impl EntityUpdate {
    /// Reports whether the update carries no fields.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.kind.is_none()
            && self.code.is_none()
            && self.intent.is_none()
            && self.metadata.is_none()
    }
}

// ============================================================================
// SECTION: Entity Operations
// ============================================================================

impl CodeStore {
    /// Adds an entity to the graph and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn add_entity(
        &self,
        name: &str,
        kind: EntityKind,
        code: Option<&str>,
        intent: Option<&str>,
        metadata: Option<&MetadataBag>,
    ) -> Result<EntityId, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO entities (name, kind, code, intent, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                name,
                kind.as_str(),
                code,
                intent,
                encode_metadata(metadata),
                loom_core::now_iso8601(),
            ],
        )?;
        Ok(EntityId::new(conn.last_insert_rowid()))
    }

    /// Returns an entity by id, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_entity(&self, id: EntityId) -> Result<Option<Entity>, StoreError> {
        let conn = self.conn()?;
        let mut statement = conn.prepare("SELECT * FROM entities WHERE id = ?1")?;
        let mut rows = statement.query_map(params![id.get()], entity_from_row)?;
        rows.next().transpose().map_err(StoreError::from)
    }

    /// Finds entities by case-insensitive name substring and/or kind.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn find_entities(
        &self,
        name_contains: Option<&str>,
        kind: Option<EntityKind>,
    ) -> Result<Vec<Entity>, StoreError> {
        let conn = self.conn()?;
        let mut sql = "SELECT * FROM entities WHERE 1=1".to_string();
        let mut bindings: Vec<String> = Vec::new();
        if let Some(fragment) = name_contains {
            sql.push_str(" AND name LIKE ?");
            bindings.push(format!("%{fragment}%"));
        }
        if let Some(kind) = kind {
            sql.push_str(" AND kind = ?");
            bindings.push(kind.as_str().to_string());
        }
        let mut statement = conn.prepare(&sql)?;
        let rows = statement.query_map(rusqlite::params_from_iter(bindings), entity_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// Updates whitelisted entity fields; returns whether a row changed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn update_entity(&self, id: EntityId, update: &EntityUpdate) -> Result<bool, StoreError> {
        if update.is_empty() {
            return Ok(false);
        }
        let mut clauses = Vec::new();
        let mut bindings: Vec<String> = Vec::new();
        if let Some(name) = &update.name {
            clauses.push("name = ?");
            bindings.push(name.clone());
        }
        if let Some(kind) = update.kind {
            clauses.push("kind = ?");
            bindings.push(kind.as_str().to_string());
        }
        if let Some(code) = &update.code {
            clauses.push("code = ?");
            bindings.push(code.clone());
        }
        if let Some(intent) = &update.intent {
            clauses.push("intent = ?");
            bindings.push(intent.clone());
        }
        if let Some(metadata) = &update.metadata {
            clauses.push("metadata = ?");
            bindings.push(serde_json::Value::Object(metadata.clone()).to_string());
        }
        bindings.push(id.get().to_string());

        let conn = self.conn()?;
        let sql = format!("UPDATE entities SET {} WHERE id = ?", clauses.join(", "));
        let changed = conn.execute(&sql, rusqlite::params_from_iter(bindings))?;
        Ok(changed > 0)
    }

    /// Deletes an entity along with every incident relationship, its
    /// entity-file rows, and its cross-file references.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn delete_entity(&self, id: EntityId) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM relationships WHERE source_id = ?1 OR target_id = ?1",
            params![id.get()],
        )?;
        tx.execute("DELETE FROM entity_files WHERE entity_id = ?1", params![id.get()])?;
        tx.execute(
            "DELETE FROM cross_file_refs WHERE source_entity_id = ?1",
            params![id.get()],
        )?;
        let deleted = tx.execute("DELETE FROM entities WHERE id = ?1", params![id.get()])?;
        tx.commit()?;
        Ok(deleted > 0)
    }
}

// ============================================================================
// SECTION: Relationship Operations
// ============================================================================

impl CodeStore {
    /// Adds a relationship between two entities and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure, including foreign-key
    /// violations for endpoints that do not exist.
    pub fn add_relationship(
        &self,
        source: EntityId,
        target: EntityId,
        relation: RelationKind,
        metadata: Option<&MetadataBag>,
    ) -> Result<RelationshipId, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO relationships (source_id, target_id, relation, metadata)
             VALUES (?1, ?2, ?3, ?4)",
            params![source.get(), target.get(), relation.as_str(), encode_metadata(metadata)],
        )?;
        Ok(RelationshipId::new(conn.last_insert_rowid()))
    }

    /// Returns an entity's relationships joined to the far-side entity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_relationships(
        &self,
        entity_id: EntityId,
        direction: Direction,
    ) -> Result<Vec<RelationshipSummary>, StoreError> {
        let conn = self.conn()?;
        let mut results = Vec::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            let mut statement = conn.prepare(
                "SELECT r.*, e.name AS other_name, e.kind AS other_kind
                 FROM relationships r JOIN entities e ON r.target_id = e.id
                 WHERE r.source_id = ?1",
            )?;
            let rows = statement.query_map(params![entity_id.get()], |row| {
                summary_from_row(row, Direction::Outgoing)
            })?;
            for row in rows {
                results.push(row?);
            }
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            let mut statement = conn.prepare(
                "SELECT r.*, e.name AS other_name, e.kind AS other_kind
                 FROM relationships r JOIN entities e ON r.source_id = e.id
                 WHERE r.target_id = ?1",
            )?;
            let rows = statement.query_map(params![entity_id.get()], |row| {
                summary_from_row(row, Direction::Incoming)
            })?;
            for row in rows {
                results.push(row?);
            }
        }
        Ok(results)
    }

    /// Returns the entities related to the given entity.
    ///
    /// `Direction::Both` is not meaningful here; it behaves as outgoing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn find_related(
        &self,
        entity_id: EntityId,
        relation: Option<RelationKind>,
        direction: Direction,
    ) -> Result<Vec<Entity>, StoreError> {
        let conn = self.conn()?;
        let mut sql = if matches!(direction, Direction::Incoming) {
            "SELECT e.* FROM entities e
             JOIN relationships r ON e.id = r.source_id
             WHERE r.target_id = ?"
                .to_string()
        } else {
            "SELECT e.* FROM entities e
             JOIN relationships r ON e.id = r.target_id
             WHERE r.source_id = ?"
                .to_string()
        };
        let mut bindings: Vec<String> = vec![entity_id.get().to_string()];
        if let Some(relation) = relation {
            sql.push_str(" AND r.relation = ?");
            bindings.push(relation.as_str().to_string());
        }
        let mut statement = conn.prepare(&sql)?;
        let rows = statement.query_map(rusqlite::params_from_iter(bindings), entity_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// Returns the entities this entity contains.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_children(&self, entity_id: EntityId) -> Result<Vec<Entity>, StoreError> {
        self.find_related(entity_id, Some(RelationKind::Contains), Direction::Outgoing)
    }

    /// Returns the containing entity, when one exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_parent(&self, entity_id: EntityId) -> Result<Option<Entity>, StoreError> {
        let mut parents =
            self.find_related(entity_id, Some(RelationKind::Contains), Direction::Incoming)?;
        if parents.is_empty() { Ok(None) } else { Ok(Some(parents.remove(0))) }
    }

    /// Reports whether a `(source, target, relation)` edge already exists.
    pub(crate) fn relationship_exists(
        &self,
        source: EntityId,
        target: EntityId,
        relation: RelationKind,
    ) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM relationships
                 WHERE source_id = ?1 AND target_id = ?2 AND relation = ?3",
                params![source.get(), target.get(), relation.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

/// Maps a joined relationship row to a summary.
fn summary_from_row(
    row: &Row<'_>,
    direction: Direction,
) -> rusqlite::Result<RelationshipSummary> {
    let kind_text: String = row.get("other_kind")?;
    let other_kind = EntityKind::from_str(&kind_text).map_err(conversion_error)?;
    Ok(RelationshipSummary {
        relationship: relationship_from_row(row)?,
        other_name: row.get("other_name")?,
        other_kind,
        direction,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
