// crates/loom-parsers/src/lib.rs
// ============================================================================
// Module: Loom Parsers Library
// Description: Language plug-ins for the Loom ingestion pipeline.
// Purpose: Provide concrete SourceParser implementations and a default registry.
// Dependencies: loom-core, tree-sitter, tree-sitter-python
// ============================================================================

//! ## Overview
//! This crate ships the language parsers Loom registers by default. Each
//! parser implements the [`loom_core::SourceParser`] contract: it turns one
//! source file into entity and relationship descriptors, and exposes the
//! second-pass hooks (import extraction, call-site extraction, builtin
//! filtering) the analysis passes consume.
//!
//! Only Python ships today. The registry accepts further languages without
//! code changes here.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod python;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use loom_core::ParserRegistry;

pub use python::PythonParser;

// ============================================================================
// SECTION: Default Registry
// ============================================================================

/// Builds the registry with every default parser registered.
#[must_use]
pub fn default_registry() -> ParserRegistry {
    let mut registry = ParserRegistry::new();
    registry.register(Arc::new(PythonParser::new()));
    registry
}

// ============================================================================
// SECTION: Tests
// ============================================================================
