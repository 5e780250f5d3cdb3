// crates/loom-store/src/analysis.rs
// ============================================================================
// Module: Loom Analysis Passes
// Description: Second-pass import resolution and call-edge linking.
// Purpose: Connect already-ingested entities with imports and calls edges.
// Dependencies: loom-core, rusqlite, tracing
// ============================================================================

//! ## Overview
//! The analysis passes run after ingestion over the whole graph. Import
//! analysis reads each module's source file, asks the module's language
//! parser for import records, and links resolvable targets with `imports`
//! edges carrying the statement details. Call analysis extracts call sites
//! from each function's stored code and links resolvable callees with
//! `calls` edges, preferring a same-module qualified match over a bare name
//! match.
//!
//! Both passes suppress duplicate edges and self-edges, skip entities whose
//! language has no registered parser, and are idempotent: a second run
//! creates zero new relationships.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::path::Path;

use loom_core::EntityId;
use loom_core::EntityKind;
use loom_core::RelationKind;
use serde::Deserialize;
use serde::Serialize;

use crate::store::CodeStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Stats
// ============================================================================

/// Counters returned by the analysis passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    /// Entities whose code or source was analyzed.
    pub analyzed: i64,
    /// Import statements or call sites found.
    pub found: i64,
    /// New relationships created.
    pub relationships_created: i64,
}

// ============================================================================
// SECTION: Import Analysis
// ============================================================================

impl CodeStore {
    /// Links module entities with `imports` edges.
    ///
    /// Modules with no source file, no registered language parser, or an
    /// unreadable file are skipped with a warning. Imports whose target
    /// module is not in the graph are skipped silently.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn analyze_imports(&self) -> Result<AnalysisStats, StoreError> {
        let mut stats = AnalysisStats::default();
        let modules = self.find_entities(None, Some(EntityKind::Module))?;
        let lookup: HashMap<&str, EntityId> =
            modules.iter().map(|module| (module.name.as_str(), module.id)).collect();

        for module in &modules {
            let Some(file_path) = module.file_path() else {
                continue;
            };
            let language = module.language().unwrap_or("python");
            let Some(parser) = self.registry().parser_for_language(language) else {
                continue;
            };
            let source = match std::fs::read_to_string(Path::new(file_path)) {
                Ok(source) => source,
                Err(err) => {
                    tracing::warn!(file = file_path, error = %err, "could not read module source");
                    continue;
                }
            };

            stats.analyzed += 1;
            let records = parser.extract_imports(&source, &module.name);
            stats.found += i64::try_from(records.len()).unwrap_or(i64::MAX);

            for record in records {
                let Some(&target) = lookup.get(record.module.as_str()) else {
                    continue;
                };
                if target == module.id {
                    continue;
                }
                if self.relationship_exists(module.id, target, RelationKind::Imports)? {
                    continue;
                }
                let metadata = match serde_json::to_value(&record.info) {
                    Ok(serde_json::Value::Object(map)) => Some(map),
                    _ => None,
                };
                self.add_relationship(
                    module.id,
                    target,
                    RelationKind::Imports,
                    metadata.as_ref(),
                )?;
                stats.relationships_created += 1;
            }
        }
        Ok(stats)
    }
}

// ============================================================================
// SECTION: Call Analysis
// ============================================================================

impl CodeStore {
    /// Links function entities with `calls` edges.
    ///
    /// Candidate call names resolve by preferring the caller-module
    /// qualified name, then a direct (qualified or short) name match.
    /// Self-calls are suppressed, as are duplicates of existing edges.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn analyze_calls(&self, skip_builtins: bool) -> Result<AnalysisStats, StoreError> {
        let mut stats = AnalysisStats::default();
        let functions = self.find_entities(None, Some(EntityKind::Function))?;
        let lookup = self.entity_name_lookup()?;

        for function in &functions {
            let Some(code) = function.code.as_deref() else {
                continue;
            };
            let language = function.language().unwrap_or("python");
            let Some(parser) = self.registry().parser_for_language(language) else {
                continue;
            };

            stats.analyzed += 1;
            let caller_module = function
                .name
                .rsplit_once('.')
                .map_or("", |(module, _)| module);

            let calls = parser.extract_calls(code);
            stats.found += i64::try_from(calls.len()).unwrap_or(i64::MAX);

            for call in calls {
                if skip_builtins && parser.is_builtin(&call.name) {
                    continue;
                }
                let callee = resolve_call_target(&call.name, caller_module, &lookup);
                let Some(callee) = callee else {
                    continue;
                };
                if callee == function.id {
                    continue;
                }
                if self.relationship_exists(function.id, callee, RelationKind::Calls)? {
                    continue;
                }
                self.add_relationship(function.id, callee, RelationKind::Calls, None)?;
                stats.relationships_created += 1;
            }
        }
        Ok(stats)
    }

    /// Builds a name index over every entity: full names always, short
    /// names first-wins.
    fn entity_name_lookup(&self) -> Result<HashMap<String, EntityId>, StoreError> {
        let conn = self.conn()?;
        let mut statement = conn.prepare("SELECT id, name FROM entities")?;
        let rows = statement.query_map(rusqlite::params![], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut lookup = HashMap::new();
        for row in rows {
            let (id, name) = row?;
            let id = EntityId::new(id);
            let short = loom_core::short_name(&name).to_string();
            lookup.insert(name, id);
            lookup.entry(short).or_insert(id);
        }
        Ok(lookup)
    }
}

/// Resolves a call name against the entity index.
fn resolve_call_target(
    call_name: &str,
    caller_module: &str,
    lookup: &HashMap<String, EntityId>,
) -> Option<EntityId> {
    if !caller_module.is_empty() {
        let qualified = format!("{caller_module}.{call_name}");
        if let Some(&id) = lookup.get(&qualified) {
            return Some(id);
        }
    }
    lookup.get(call_name).copied()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use loom_core::EntityId;

    use super::resolve_call_target;

    #[test]
    fn qualified_match_wins_over_short_name() {
        let mut lookup = HashMap::new();
        lookup.insert("pkg.mod.helper".to_string(), EntityId::new(1));
        lookup.insert("helper".to_string(), EntityId::new(2));
        assert_eq!(
            resolve_call_target("helper", "pkg.mod", &lookup),
            Some(EntityId::new(1))
        );
        assert_eq!(resolve_call_target("helper", "other", &lookup), Some(EntityId::new(2)));
        assert_eq!(resolve_call_target("missing", "pkg.mod", &lookup), None);
    }
}
