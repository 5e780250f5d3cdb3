// crates/loom-core/src/core/entity.rs
// ============================================================================
// Module: Loom Entity Model
// Description: Code entities and their metadata bags.
// Purpose: Represent code artifacts addressable by id and fully-qualified name.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! An entity is one code artifact: a module, class, function, method,
//! variable, interface, type alias, enum, or DOM element. Entities carry an
//! optional source snippet, an optional intent (docstring or comment), and a
//! free-form metadata bag persisted as JSON. The fully-qualified dotted name
//! is the primary semantic handle; `(name, kind)` is not globally unique.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::EntityId;

// ============================================================================
// SECTION: Metadata Bag
// ============================================================================

/// Free-form metadata attached to entities, relationships, and trace rows.
///
/// A string-keyed map whose values are JSON scalars, lists, or nested bags.
/// Persisted as JSON text; well-known keys include `file_path`, `lineno`,
/// `end_lineno`, `start_line`, `end_line`, `signature`, `bases`, `methods`,
/// `language`, `is_async`, and `args`.
pub type MetadataBag = serde_json::Map<String, Value>;

/// Returns a string-valued field from a metadata bag, when present.
#[must_use]
pub fn metadata_str<'a>(bag: Option<&'a MetadataBag>, key: &str) -> Option<&'a str> {
    bag.and_then(|map| map.get(key)).and_then(Value::as_str)
}

/// Returns an integer-valued field from a metadata bag, when present.
#[must_use]
pub fn metadata_i64(bag: Option<&MetadataBag>, key: &str) -> Option<i64> {
    bag.and_then(|map| map.get(key)).and_then(Value::as_i64)
}

// ============================================================================
// SECTION: Entity Kind
// ============================================================================

/// The kind of code artifact an entity represents.
///
/// # Invariants
/// - Wire names are stable snake_case strings stored in the `kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A source module or package.
    Module,
    /// A class definition.
    Class,
    /// A free function.
    Function,
    /// A method bound to a class.
    Method,
    /// A module- or class-level variable.
    Variable,
    /// An interface declaration.
    Interface,
    /// A type alias or type declaration.
    Type,
    /// An enum declaration.
    Enum,
    /// A DOM element extracted from markup.
    DomElement,
}

impl EntityKind {
    /// Returns the stable wire name stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Class => "class",
            Self::Function => "function",
            Self::Method => "method",
            Self::Variable => "variable",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Enum => "enum",
            Self::DomElement => "dom_element",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = UnknownKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "module" => Ok(Self::Module),
            "class" => Ok(Self::Class),
            "function" => Ok(Self::Function),
            "method" => Ok(Self::Method),
            "variable" => Ok(Self::Variable),
            "interface" => Ok(Self::Interface),
            "type" => Ok(Self::Type),
            "enum" => Ok(Self::Enum),
            "dom_element" => Ok(Self::DomElement),
            other => Err(UnknownKindError(other.to_string())),
        }
    }
}

/// Error for a kind string with no matching [`EntityKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity kind: {0}")]
pub struct UnknownKindError(pub String);

// ============================================================================
// SECTION: Entity Record
// ============================================================================

/// A code artifact stored in the graph.
///
/// # Invariants
/// - `name` is the fully-qualified dotted name; consumers treat it as the
///   primary semantic handle.
/// - `created_at` is an ISO-8601 UTC string assigned at insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable row identifier.
    pub id: EntityId,
    /// Fully-qualified dotted name.
    pub name: String,
    /// Artifact kind.
    pub kind: EntityKind,
    /// Source snippet, when captured.
    pub code: Option<String>,
    /// Docstring or comment describing intent.
    pub intent: Option<String>,
    /// Free-form metadata bag.
    pub metadata: Option<MetadataBag>,
    /// Creation timestamp (ISO-8601 UTC).
    pub created_at: String,
}

impl Entity {
    /// Returns the final dotted component of the entity name.
    #[must_use]
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    /// Returns the source file path recorded in the metadata bag, if any.
    #[must_use]
    pub fn file_path(&self) -> Option<&str> {
        metadata_str(self.metadata.as_ref(), "file_path")
    }

    /// Returns the language tag recorded in the metadata bag, if any.
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        metadata_str(self.metadata.as_ref(), "language")
    }
}

/// Returns the final dotted component of a fully-qualified name.
///
/// `pkg.mod.Cls.process` yields `process`; a name with no dots is returned
/// unchanged.
#[must_use]
pub fn short_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::EntityKind;
    use super::short_name;

    #[test]
    fn kind_wire_names_round_trip() {
        for kind in [
            EntityKind::Module,
            EntityKind::Class,
            EntityKind::Function,
            EntityKind::Method,
            EntityKind::Variable,
            EntityKind::Interface,
            EntityKind::Type,
            EntityKind::Enum,
            EntityKind::DomElement,
        ] {
            assert_eq!(EntityKind::from_str(kind.as_str()), Ok(kind));
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(EntityKind::from_str("widget").is_err());
    }

    #[test]
    fn short_name_takes_last_component() {
        assert_eq!(short_name("pkg.mod.Cls.process"), "process");
        assert_eq!(short_name("main"), "main");
    }
}
