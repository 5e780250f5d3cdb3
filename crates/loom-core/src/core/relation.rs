// crates/loom-core/src/core/relation.rs
// ============================================================================
// Module: Loom Relationship Model
// Description: Directed typed edges between entities.
// Purpose: Represent the graph's edge set with stable wire names.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A relationship is a directed typed edge between two entities. At most one
//! edge of a given `(source, target, relation)` triple exists; the analysis
//! passes enforce this with existence probes before insertion.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::entity::EntityKind;
use crate::core::entity::MetadataBag;
use crate::core::identifiers::EntityId;
use crate::core::identifiers::RelationshipId;

// ============================================================================
// SECTION: Relation Kind
// ============================================================================

/// The type of a directed edge between entities.
///
/// # Invariants
/// - Wire names are stable snake_case strings stored in the `relation` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Structural containment (module contains function, package contains module).
    Contains,
    /// Caller invokes callee.
    Calls,
    /// Module imports module.
    Imports,
    /// Class inherits from base.
    Inherits,
    /// General usage edge.
    Uses,
    /// Method belongs to class.
    MemberOf,
}

impl RelationKind {
    /// Returns the stable wire name stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Calls => "calls",
            Self::Imports => "imports",
            Self::Inherits => "inherits",
            Self::Uses => "uses",
            Self::MemberOf => "member_of",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationKind {
    type Err = UnknownRelationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "contains" => Ok(Self::Contains),
            "calls" => Ok(Self::Calls),
            "imports" => Ok(Self::Imports),
            "inherits" => Ok(Self::Inherits),
            "uses" => Ok(Self::Uses),
            "member_of" => Ok(Self::MemberOf),
            other => Err(UnknownRelationError(other.to_string())),
        }
    }
}

/// Error for a relation string with no matching [`RelationKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown relation kind: {0}")]
pub struct UnknownRelationError(pub String);

// ============================================================================
// SECTION: Direction
// ============================================================================

/// Traversal direction for relationship queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Edges whose source is the queried entity.
    Outgoing,
    /// Edges whose target is the queried entity.
    Incoming,
    /// Both directions.
    Both,
}

// ============================================================================
// SECTION: Relationship Records
// ============================================================================

/// A directed typed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Stable row identifier.
    pub id: RelationshipId,
    /// Source entity.
    pub source_id: EntityId,
    /// Target entity.
    pub target_id: EntityId,
    /// Edge type.
    pub relation: RelationKind,
    /// Edge metadata (import names, aliases, level, import kind, ...).
    pub metadata: Option<MetadataBag>,
}

/// A relationship joined to the far-side entity, as returned by
/// `get_relationships`.
///
/// For outgoing edges the far side is the target; for incoming edges it is
/// the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSummary {
    /// The underlying edge.
    pub relationship: Relationship,
    /// Name of the entity on the far side of the edge.
    pub other_name: String,
    /// Kind of the entity on the far side of the edge.
    pub other_kind: EntityKind,
    /// Direction of the edge relative to the queried entity.
    pub direction: Direction,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::RelationKind;

    #[test]
    fn relation_wire_names_round_trip() {
        for relation in [
            RelationKind::Contains,
            RelationKind::Calls,
            RelationKind::Imports,
            RelationKind::Inherits,
            RelationKind::Uses,
            RelationKind::MemberOf,
        ] {
            assert_eq!(RelationKind::from_str(relation.as_str()), Ok(relation));
        }
    }
}
