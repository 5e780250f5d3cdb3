// crates/loom-core/src/core/identifiers.rs
// ============================================================================
// Module: Loom Identifiers
// Description: Canonical opaque identifiers for graph rows and runs.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! This module defines the identifiers used throughout Loom. Row-backed
//! identifiers (entities, relationships, TODOs, failure logs) are integers
//! assigned by the database. Run, call, and note identifiers are UUID strings
//! generated at creation time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Row Identifiers
// ============================================================================

/// Declares an integer identifier backed by a database row id.
macro_rules! row_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        ///
        /// # Invariants
        /// - Positive once assigned by the database (SQLite row ids are 1-based).
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier from a raw row id.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw row id value.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

row_id!(
    /// Entity identifier in the code graph.
    EntityId
);
row_id!(
    /// Relationship identifier in the code graph.
    RelationshipId
);
row_id!(
    /// TODO work-item identifier.
    TodoId
);
row_id!(
    /// Failure-log entry identifier.
    FailureLogId
);

// ============================================================================
// SECTION: Generated Identifiers
// ============================================================================

/// Declares a UUID-string identifier generated at creation time.
macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        ///
        /// # Invariants
        /// - Opaque UTF-8 string; generated values are UUID v4.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from an existing string value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generates a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

uuid_id!(
    /// Ingest run identifier.
    IngestRunId
);
uuid_id!(
    /// Trace run identifier.
    TraceRunId
);
uuid_id!(
    /// Trace call identifier.
    TraceCallId
);
uuid_id!(
    /// Knowledge-base note identifier.
    NoteId
);

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::EntityId;
    use super::TraceRunId;

    #[test]
    fn row_id_round_trips() {
        let id = EntityId::new(42);
        assert_eq!(id.get(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(TraceRunId::generate(), TraceRunId::generate());
    }
}
