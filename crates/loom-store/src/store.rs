// crates/loom-store/src/store.rs
// ============================================================================
// Module: Loom Code Store
// Description: Store type, connection ownership, options, and error mapping.
// Purpose: Open the SQLite store and serialize access through one connection.
// Dependencies: loom-core, loom-parsers, rusqlite, thiserror
// ============================================================================

//! ## Overview
//! [`CodeStore`] owns the single read/write connection, the parser registry,
//! the optional embedder handle, the vector-capability flag, and the note
//! rowid sidecar map. All subsystem methods live in sibling modules as
//! additional `impl CodeStore` blocks sharing this state.
//!
//! Concurrency: the connection is guarded by a mutex. The external tracer may
//! call `record_call` from many threads within one run; the mutex serializes
//! those inserts, and each commits before returning.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use loom_core::NoteId;
use loom_core::ParserRegistry;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use thiserror::Error;

use crate::vector::TextEmbedder;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Store errors surfaced to callers.
///
/// # Invariants
/// - Read-side misses are represented as `Ok(None)` / empty collections, not
///   as errors. Mutations with no effect return `Ok(false)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("store db error: {0}")]
    Db(String),
    /// Filesystem failure outside the database.
    #[error("store io error: {0}")]
    Io(String),
    /// Caller supplied an argument the operation cannot act on.
    #[error("invalid argument: {0}")]
    Invalid(String),
    /// An optional capability (vector index, embedding model) is absent.
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

// ============================================================================
// SECTION: Options
// ============================================================================

/// Options controlling how a store is opened.
pub struct StoreOptions {
    /// Parser registry used by ingestion and the analysis passes.
    pub registry: ParserRegistry,
    /// Embedding model handle; absent means semantic operations fail with
    /// [`StoreError::CapabilityUnavailable`].
    pub embedder: Option<Arc<dyn TextEmbedder>>,
    /// Whether to attempt loading the vector extension at open.
    pub vector_search: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            registry: loom_parsers::default_registry(),
            embedder: None,
            vector_search: true,
        }
    }
}

impl std::fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreOptions")
            .field("registry", &self.registry)
            .field("embedder", &self.embedder.as_ref().map(|_| "<embedder>"))
            .field("vector_search", &self.vector_search)
            .finish()
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Graph-based code-knowledge store with a SQLite backend.
///
/// # Invariants
/// - Connection access is serialized through the mutex.
/// - Every public mutation commits before returning.
pub struct CodeStore {
    /// Database file path (informational).
    path: PathBuf,
    /// The single read/write connection.
    connection: Mutex<Connection>,
    /// Language parsers for ingestion and analysis.
    registry: ParserRegistry,
    /// Optional embedding model handle.
    embedder: Option<Arc<dyn TextEmbedder>>,
    /// Whether the vector extension loaded at open.
    vec_available: bool,
    /// Sidecar map from `vec_notes` rowids to note ids.
    note_rowids: Mutex<HashMap<i64, NoteId>>,
}

impl CodeStore {
    /// Opens (or creates) a store with default options.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database cannot be opened or a schema
    /// migration fails. A failed migration leaves the stored version
    /// unchanged so a retry resumes at the same step.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(path, StoreOptions::default())
    }

    /// Opens (or creates) a store with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database cannot be opened or a schema
    /// migration fails. Vector-extension initialization is best-effort and
    /// never fails the open; its absence surfaces later as
    /// [`StoreError::CapabilityUnavailable`].
    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        if options.vector_search {
            // Auto-extensions only load on connections opened afterwards.
            crate::vector::register_vec_extension();
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let connection = Connection::open_with_flags(&path, flags)?;
        apply_pragmas(&connection)?;

        let mut store = Self {
            path,
            connection: Mutex::new(connection),
            registry: options.registry,
            embedder: options.embedder,
            vec_available: false,
            note_rowids: Mutex::new(HashMap::new()),
        };
        store.initialize_schema()?;
        if options.vector_search {
            store.vec_available = store.initialize_vector_tables();
        }
        Ok(store)
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the parser registry.
    #[must_use]
    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    /// Reports whether the vector extension loaded at open.
    #[must_use]
    pub const fn vector_available(&self) -> bool {
        self.vec_available
    }

    /// Locks the connection, mapping a poisoned mutex to a store error.
    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::Db("connection mutex poisoned".to_string()))
    }

    /// Returns the configured embedder, when present.
    pub(crate) fn embedder(&self) -> Option<Arc<dyn TextEmbedder>> {
        self.embedder.clone()
    }

    /// Locks the note rowid sidecar map.
    pub(crate) fn note_rowid_map(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<i64, NoteId>>, StoreError> {
        self.note_rowids
            .lock()
            .map_err(|_| StoreError::Db("note rowid map mutex poisoned".to_string()))
    }
}

impl std::fmt::Debug for CodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeStore")
            .field("path", &self.path)
            .field("vec_available", &self.vec_available)
            .finish()
    }
}

// ============================================================================
// SECTION: Pragmas
// ============================================================================

/// Applies the pragmas required for durability and concurrent readers.
fn apply_pragmas(connection: &Connection) -> Result<(), StoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection.execute_batch("PRAGMA journal_mode = wal;")?;
    connection.busy_timeout(std::time::Duration::from_millis(5_000))?;
    Ok(())
}
