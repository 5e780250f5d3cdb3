// crates/loom-core/src/interfaces/mod.rs
// ============================================================================
// Module: Loom Interfaces
// Description: Backend-agnostic contracts for language parsers.
// Purpose: Define the plug-in surface the ingestion coordinator and analysis passes consume.
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! The parser registry is the seam between the store and language-specific
//! source analysis. A parser turns one file into entity and relationship
//! descriptors resolved within that file's scope; cross-file resolution is
//! the analysis passes' job. Parsers additionally expose second-pass hooks
//! (import extraction, call-site extraction, builtin filtering) so the
//! analysis passes stay language-agnostic.
//!
//! Parse errors inside a file are data (`ParseOutcome::errors`), counted and
//! logged by the ingestion coordinator without aborting the run. Hard I/O
//! failures surface as [`ParseError`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::entity::EntityKind;
use crate::core::entity::MetadataBag;

// ============================================================================
// SECTION: Parse Results
// ============================================================================

/// An entity descriptor produced by a parser.
///
/// Names are resolved inside a single file's ingestion scope; the ingestion
/// coordinator maps them to row ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEntity {
    /// Fully-qualified dotted name.
    pub name: String,
    /// Artifact kind.
    pub kind: EntityKind,
    /// Source snippet.
    pub code: Option<String>,
    /// Docstring or comment.
    pub intent: Option<String>,
    /// Metadata bag (file path, lines, signature, language tag, ...).
    pub metadata: Option<MetadataBag>,
}

/// A relationship descriptor produced by a parser.
///
/// `relation` is a free string rather than a [`crate::RelationKind`] because
/// plug-ins may emit pending edge types such as `dom_reference` whose targets
/// live outside the current file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRelationship {
    /// Source entity name within this file's scope.
    pub from_name: String,
    /// Target entity name (or external target for pending references).
    pub to_name: String,
    /// Relation wire name.
    pub relation: String,
    /// Edge metadata.
    pub metadata: Option<MetadataBag>,
}

/// Everything a parser extracted from one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseOutcome {
    /// Entity descriptors, containment order preserved.
    pub entities: Vec<ParsedEntity>,
    /// Relationship descriptors.
    pub relationships: Vec<ParsedRelationship>,
    /// Human-readable parse errors; a non-empty list marks the file skipped.
    pub errors: Vec<String>,
}

/// Hard parser failures (I/O, not syntax).
#[derive(Debug, Error)]
pub enum ParseError {
    /// The source file could not be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// File that failed to read.
        path: String,
        /// Underlying error text.
        message: String,
    },
}

// ============================================================================
// SECTION: Import Extraction
// ============================================================================

/// How an import statement was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportType {
    /// `import foo` / `import foo.bar`.
    Import,
    /// `from foo import bar`.
    From,
    /// `from foo import *`.
    FromStar,
    /// A submodule import synthesized from `from . import sub`.
    FromSubmodule,
}

impl ImportType {
    /// Returns the stable wire name stored in edge metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::From => "from",
            Self::FromStar => "from_star",
            Self::FromSubmodule => "from_submodule",
        }
    }
}

/// Details of one import statement, stored as `imports` edge metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportInfo {
    /// Imported names (the target module name itself for plain imports).
    pub names: Vec<String>,
    /// Alias map (`name -> asname`) for aliased imports.
    pub aliases: BTreeMap<String, String>,
    /// Whether the statement was written relative.
    pub is_relative: bool,
    /// Number of leading dots on a relative import.
    pub level: u32,
    /// Statement form.
    pub import_type: ImportType,
}

impl Default for ImportType {
    fn default() -> Self {
        Self::Import
    }
}

/// One resolved import: the absolute target module plus statement details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Absolute dotted name of the imported module.
    pub module: String,
    /// Statement details persisted as edge metadata.
    pub info: ImportInfo,
}

// ============================================================================
// SECTION: Call Extraction
// ============================================================================

/// Syntactic shape of an extracted call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallSiteKind {
    /// Bare identifier call `f()`.
    Simple,
    /// Method call on the receiver object (`self.f()`).
    Method,
    /// Attribute call `x.f()` recorded with its one-step qualifier.
    Chained,
}

/// One call site extracted from a code fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// Candidate callee name (`f` or `x.f`).
    pub name: String,
    /// Syntactic shape.
    pub kind: CallSiteKind,
}

/// Name references extracted from a code fragment for usage analysis.
///
/// Syntax-aware reference sets avoid the false positives a substring scan
/// would produce from strings and comments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeReferences {
    /// Bare identifiers used as expressions (calls, reads, instantiations).
    pub names: BTreeSet<String>,
    /// Attribute names invoked as method calls (`obj.name()`).
    pub method_calls: BTreeSet<String>,
    /// Attribute accesses, both bare (`attr`) and one-step qualified
    /// (`obj.attr`).
    pub attribute_accesses: BTreeSet<String>,
}

// ============================================================================
// SECTION: Parser Contract
// ============================================================================

/// A language plug-in producing entities and relationships from source files.
///
/// # Invariants
/// - Implementations are deterministic for a given file content.
/// - `extract_imports` returns records whose relative levels are already
///   resolved against the importer's dotted name.
pub trait SourceParser: Send + Sync {
    /// Language tag written into entity metadata (e.g. `python`).
    fn language(&self) -> &'static str;

    /// File extensions this parser handles, with leading dots.
    fn extensions(&self) -> &'static [&'static str];

    /// Parses one file into entity and relationship descriptors.
    ///
    /// `root` is the ingest root used to derive dotted module names.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when the file cannot be read. Syntax errors are
    /// reported through [`ParseOutcome::errors`] instead.
    fn parse_file(&self, path: &Path, root: &Path) -> Result<ParseOutcome, ParseError>;

    /// Extracts top-level import statements from module source.
    ///
    /// The default implementation reports no imports; languages that resolve
    /// imports during parsing need not override it.
    fn extract_imports(&self, source: &str, module_name: &str) -> Vec<ImportRecord> {
        let _ = (source, module_name);
        Vec::new()
    }

    /// Extracts call sites from a code fragment.
    ///
    /// The default implementation reports no calls.
    fn extract_calls(&self, code: &str) -> Vec<CallSite> {
        let _ = code;
        Vec::new()
    }

    /// Extracts name references from a code fragment for usage analysis.
    ///
    /// The default implementation reports no references.
    fn extract_references(&self, code: &str) -> CodeReferences {
        let _ = code;
        CodeReferences::default()
    }

    /// Reports whether a call name is a language builtin to be skipped.
    fn is_builtin(&self, name: &str) -> bool {
        let _ = name;
        false
    }
}

// ============================================================================
// SECTION: Parser Registry
// ============================================================================

/// Ordered collection of language parsers keyed by file extension.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    /// Registered parsers in registration order.
    parsers: Vec<Arc<dyn SourceParser>>,
}

impl ParserRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parser. Later registrations do not shadow earlier ones
    /// for extensions already claimed.
    pub fn register(&mut self, parser: Arc<dyn SourceParser>) {
        self.parsers.push(parser);
    }

    /// Returns the parser handling the given path's extension, if any.
    #[must_use]
    pub fn parser_for(&self, path: &Path) -> Option<Arc<dyn SourceParser>> {
        let file_name = path.file_name()?.to_str()?;
        self.parsers
            .iter()
            .find(|parser| {
                parser
                    .extensions()
                    .iter()
                    .any(|ext| file_name.ends_with(ext))
            })
            .cloned()
    }

    /// Returns the parser registered for a language tag, if any.
    #[must_use]
    pub fn parser_for_language(&self, language: &str) -> Option<Arc<dyn SourceParser>> {
        self.parsers
            .iter()
            .find(|parser| parser.language() == language)
            .cloned()
    }

    /// Returns every supported extension, deduplicated and sorted.
    #[must_use]
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let set: BTreeSet<&'static str> = self
            .parsers
            .iter()
            .flat_map(|parser| parser.extensions().iter().copied())
            .collect();
        set.into_iter().collect()
    }

    /// Returns true when no parser is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("languages", &self.parsers.iter().map(|p| p.language()).collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::ParseOutcome;
    use super::ParserRegistry;
    use super::SourceParser;

    struct StubParser;

    impl SourceParser for StubParser {
        fn language(&self) -> &'static str {
            "stub"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &[".stub"]
        }

        fn parse_file(
            &self,
            _path: &Path,
            _root: &Path,
        ) -> Result<ParseOutcome, super::ParseError> {
            Ok(ParseOutcome::default())
        }
    }

    #[test]
    fn registry_dispatches_by_extension() {
        let mut registry = ParserRegistry::new();
        registry.register(Arc::new(StubParser));
        assert!(registry.parser_for(Path::new("a/b.stub")).is_some());
        assert!(registry.parser_for(Path::new("a/b.py")).is_none());
        assert_eq!(registry.supported_extensions(), vec![".stub"]);
    }

    #[test]
    fn registry_dispatches_by_language() {
        let mut registry = ParserRegistry::new();
        registry.register(Arc::new(StubParser));
        assert!(registry.parser_for_language("stub").is_some());
        assert!(registry.parser_for_language("python").is_none());
    }
}
