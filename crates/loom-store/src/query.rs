// crates/loom-store/src/query.rs
// ============================================================================
// Module: Loom Query Engine
// Description: Impact, usages, call graphs, test suggestion, paths, summaries.
// Purpose: Answer questions over the code graph.
// Dependencies: loom-core, rusqlite, regex
// ============================================================================

//! ## Overview
//! The query engine answers the questions the graph exists for: what calls
//! an entity, what breaks when it changes, which tests cover it, how two
//! entities connect, and how the codebase is shaped. Traversals carry
//! explicit cycle protection: `get_call_graph` copies a visited set per
//! branch (the cycle flag fires only within a single path, and siblings may
//! both render a shared callee), while `get_path` prunes revisits at deeper
//! depths.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;

use loom_core::CodeReferences;
use loom_core::Direction;
use loom_core::Entity;
use loom_core::EntityId;
use loom_core::EntityKind;
use loom_core::RelationKind;
use loom_core::short_name;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;

use crate::store::CodeStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Result Types
// ============================================================================

/// Which entity fields a text query matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    /// The entity name matched.
    Name,
    /// The intent text matched.
    Intent,
    /// The source snippet matched.
    Code,
}

/// One text-query hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    /// The matched entity.
    pub entity: Entity,
    /// Fields the query text was found in.
    pub matches: Vec<MatchField>,
}

/// One usage of an entity found by [`CodeStore::find_usages`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRef {
    /// The referencing entity.
    pub entity: Entity,
    /// How it references the target (`calls`, `imports`, ...,
    /// or `code_reference`).
    pub relation: String,
    /// Extra context: edge metadata, or reference details for code hits.
    pub context: Option<serde_json::Value>,
}

/// One node of a call graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallGraphNode {
    /// The entity at this node.
    pub entity: Entity,
    /// Sub-graphs of the entities this one calls.
    pub calls: Vec<CallGraphNode>,
    /// Number of direct callees.
    pub call_count: usize,
    /// True when this node closed a cycle on the current path.
    pub cycle: bool,
}

/// Result of impact analysis on an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactReport {
    /// Entities calling the impact surface directly.
    pub direct_callers: Vec<Entity>,
    /// Entities calling the direct callers (one level).
    pub indirect_callers: Vec<Entity>,
    /// Methods of the analyzed class (empty for non-classes).
    pub affected_methods: Vec<Entity>,
    /// `direct + indirect + methods` count.
    pub risk_score: usize,
}

/// One highly connected entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CentralEntity {
    /// Entity id.
    pub id: EntityId,
    /// Entity name.
    pub name: String,
    /// Entity kind wire name.
    pub kind: String,
    /// In-degree plus out-degree.
    pub connections: i64,
}

// ============================================================================
// SECTION: Text Query
// ============================================================================

impl CodeStore {
    /// Case-insensitive substring search over names, intents, and code.
    ///
    /// Results sort by match count descending, then name matches first,
    /// then intent matches. An empty or blank query returns no results.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn query(
        &self,
        text: &str,
        kind: Option<EntityKind>,
    ) -> Result<Vec<QueryMatch>, StoreError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let needle = text.to_lowercase();
        let entities = self.find_entities(None, kind)?;

        let mut results = Vec::new();
        for entity in entities {
            let mut matches = Vec::new();
            if entity.name.to_lowercase().contains(&needle) {
                matches.push(MatchField::Name);
            }
            if entity
                .intent
                .as_deref()
                .is_some_and(|intent| intent.to_lowercase().contains(&needle))
            {
                matches.push(MatchField::Intent);
            }
            if entity
                .code
                .as_deref()
                .is_some_and(|code| code.to_lowercase().contains(&needle))
            {
                matches.push(MatchField::Code);
            }
            if !matches.is_empty() {
                results.push(QueryMatch { entity, matches });
            }
        }

        results.sort_by(|a, b| {
            let key = |m: &QueryMatch| {
                (
                    std::cmp::Reverse(m.matches.len()),
                    std::cmp::Reverse(m.matches.contains(&MatchField::Name)),
                    std::cmp::Reverse(m.matches.contains(&MatchField::Intent)),
                )
            };
            key(a).cmp(&key(b))
        });
        Ok(results)
    }
}

// ============================================================================
// SECTION: Usages
// ============================================================================

impl CodeStore {
    /// Finds every entity referencing the target.
    ///
    /// Combines incoming graph edges (reported with their relation) with a
    /// syntax-aware scan over other entities' code, de-duplicated by
    /// `(entity, relation)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn find_usages(&self, entity_id: EntityId) -> Result<Vec<UsageRef>, StoreError> {
        let Some(target) = self.get_entity(entity_id)? else {
            return Ok(Vec::new());
        };

        let mut results = Vec::new();
        let mut seen: HashSet<(EntityId, String)> = HashSet::new();

        for summary in self.get_relationships(entity_id, Direction::Incoming)? {
            let source_id = summary.relationship.source_id;
            let relation = summary.relationship.relation.as_str().to_string();
            if !seen.insert((source_id, relation.clone())) {
                continue;
            }
            if let Some(entity) = self.get_entity(source_id)? {
                results.push(UsageRef {
                    entity,
                    relation,
                    context: summary
                        .relationship
                        .metadata
                        .map(serde_json::Value::Object),
                });
            }
        }

        let target_short = short_name(&target.name).to_string();
        for entity in self.entities_with_code(entity_id)? {
            let language = entity.language().unwrap_or("python");
            let Some(parser) = self.registry().parser_for_language(language) else {
                continue;
            };
            let Some(code) = entity.code.as_deref() else {
                continue;
            };
            let references = parser.extract_references(code);
            let Some(reference_type) =
                match_references(&references, &target.name, &target_short, target.kind)
            else {
                continue;
            };
            if !seen.insert((entity.id, "code_reference".to_string())) {
                continue;
            }
            results.push(UsageRef {
                entity,
                relation: "code_reference".to_string(),
                context: Some(serde_json::json!({
                    "reference_type": reference_type,
                    "target_name": target.name,
                })),
            });
        }
        Ok(results)
    }

    /// Returns every entity with code other than the given one.
    fn entities_with_code(&self, exclude: EntityId) -> Result<Vec<Entity>, StoreError> {
        let conn = self.conn()?;
        let mut statement =
            conn.prepare("SELECT * FROM entities WHERE code IS NOT NULL AND id != ?1")?;
        let rows = statement.query_map(params![exclude.get()], crate::graph::entity_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }
}

/// Matches extracted references against a target by kind.
///
/// Returns the reference type label, or `None` when the code does not
/// reference the target.
fn match_references(
    references: &CodeReferences,
    target_name: &str,
    target_short: &str,
    target_kind: EntityKind,
) -> Option<&'static str> {
    match target_kind {
        EntityKind::Method => {
            if references.method_calls.contains(target_short) {
                return Some("method_call");
            }
            if references.attribute_accesses.contains(target_name) {
                return Some("full_name");
            }
            let mut parts = target_name.rsplit('.');
            let method = parts.next().unwrap_or(target_name);
            if let Some(class) = parts.next() {
                if references.attribute_accesses.contains(&format!("{class}.{method}")) {
                    return Some("qualified_call");
                }
            }
            None
        }
        EntityKind::Function => {
            if references.names.contains(target_short) {
                return Some("direct_call");
            }
            if references.attribute_accesses.contains(target_name) {
                return Some("full_name");
            }
            None
        }
        EntityKind::Class => {
            if references.names.contains(target_short) {
                return Some("instantiation");
            }
            if references.attribute_accesses.contains(target_name) {
                return Some("full_name");
            }
            None
        }
        _ => {
            if references.names.contains(target_short) {
                return Some("name_reference");
            }
            if references.attribute_accesses.contains(target_name) {
                return Some("full_name");
            }
            None
        }
    }
}

// ============================================================================
// SECTION: Call Graph
// ============================================================================

impl CodeStore {
    /// Builds the call graph rooted at an entity.
    ///
    /// `depth = 0` returns the entity with no calls; `depth > 0` descends
    /// that many hops; `depth = -1` with `recursive` descends without a
    /// limit. Terminates on any graph: the first re-encounter of a node on
    /// the current path yields a leaf marked with `cycle`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_call_graph(
        &self,
        entity_id: EntityId,
        depth: i64,
        recursive: bool,
    ) -> Result<Option<CallGraphNode>, StoreError> {
        self.call_graph_inner(entity_id, depth, recursive, &HashSet::new())
    }

    /// Recursive helper carrying the current path's visited set.
    fn call_graph_inner(
        &self,
        entity_id: EntityId,
        depth: i64,
        recursive: bool,
        visited: &HashSet<EntityId>,
    ) -> Result<Option<CallGraphNode>, StoreError> {
        let Some(entity) = self.get_entity(entity_id)? else {
            return Ok(None);
        };
        if visited.contains(&entity_id) {
            return Ok(Some(CallGraphNode {
                entity,
                calls: Vec::new(),
                call_count: 0,
                cycle: true,
            }));
        }

        let mut node = CallGraphNode { entity, calls: Vec::new(), call_count: 0, cycle: false };
        let should_recurse = depth > 0 || (recursive && depth == -1);
        if should_recurse {
            // Each branch gets its own copy of the path so siblings can both
            // render a shared callee.
            let mut path = visited.clone();
            path.insert(entity_id);
            let called =
                self.find_related(entity_id, Some(RelationKind::Calls), Direction::Outgoing)?;
            node.call_count = called.len();
            let next_depth = if depth > 0 { depth - 1 } else { -1 };
            for callee in called {
                if let Some(child) =
                    self.call_graph_inner(callee.id, next_depth, recursive, &path)?
                {
                    node.calls.push(child);
                }
            }
        }
        Ok(Some(node))
    }

    /// Returns every entity with a `calls` edge into the target.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_callers(&self, entity_id: EntityId) -> Result<Vec<Entity>, StoreError> {
        self.find_related(entity_id, Some(RelationKind::Calls), Direction::Incoming)
    }
}

// ============================================================================
// SECTION: Impact Analysis
// ============================================================================

impl CodeStore {
    /// Analyzes the blast radius of changing an entity.
    ///
    /// For a class, the impact surface is the class plus its `member_of`
    /// methods. Direct callers are callers of the surface excluding surface
    /// members; indirect callers are callers of direct callers excluding
    /// everything already seen.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn impact_analysis(&self, entity_id: EntityId) -> Result<ImpactReport, StoreError> {
        let Some(entity) = self.get_entity(entity_id)? else {
            return Ok(ImpactReport::default());
        };

        let affected_methods = if entity.kind == EntityKind::Class {
            self.class_methods(entity_id)?
        } else {
            Vec::new()
        };

        let mut surface: Vec<EntityId> = vec![entity_id];
        surface.extend(affected_methods.iter().map(|method| method.id));
        let surface_set: HashSet<EntityId> = surface.iter().copied().collect();

        let mut direct_callers = Vec::new();
        let mut direct_ids = HashSet::new();
        for &member in &surface {
            for caller in self.get_callers(member)? {
                if !direct_ids.contains(&caller.id) && !surface_set.contains(&caller.id) {
                    direct_ids.insert(caller.id);
                    direct_callers.push(caller);
                }
            }
        }

        let mut indirect_callers = Vec::new();
        let mut indirect_ids = HashSet::new();
        for caller in &direct_callers {
            for indirect in self.get_callers(caller.id)? {
                if !direct_ids.contains(&indirect.id)
                    && !surface_set.contains(&indirect.id)
                    && !indirect_ids.contains(&indirect.id)
                {
                    indirect_ids.insert(indirect.id);
                    indirect_callers.push(indirect);
                }
            }
        }

        let risk_score = direct_callers.len() + indirect_callers.len() + affected_methods.len();
        Ok(ImpactReport { direct_callers, indirect_callers, affected_methods, risk_score })
    }

    /// Returns a class's methods via incoming `member_of` edges.
    fn class_methods(&self, class_id: EntityId) -> Result<Vec<Entity>, StoreError> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(
            "SELECT e.* FROM entities e
             JOIN relationships r ON e.id = r.source_id
             WHERE r.target_id = ?1 AND r.relation = 'member_of' AND e.kind = 'method'",
        )?;
        let rows = statement.query_map(params![class_id.get()], crate::graph::entity_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Test Suggestion
// ============================================================================

impl CodeStore {
    /// Suggests test modules likely to cover an entity.
    ///
    /// Test modules (name contains "test") score +2 for importing the
    /// entity's parent module, +1 per prefix-overlapping import, and +1
    /// when the entity's short name appears as a word in the test's source
    /// file. Only positive scores are returned, sorted by descending score
    /// then ascending name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn suggest_tests(&self, entity_id: EntityId) -> Result<Vec<String>, StoreError> {
        let Some(entity) = self.get_entity(entity_id)? else {
            return Ok(Vec::new());
        };
        let entity_short = short_name(&entity.name).to_string();
        let parent_module = self.get_parent(entity_id)?.map(|parent| parent.name);

        let modules = self.find_entities(None, Some(EntityKind::Module))?;
        let word_pattern =
            regex::Regex::new(&format!(r"\b{}\b", regex::escape(&entity_short))).ok();

        let mut scored: Vec<(String, i64)> = Vec::new();
        for module in modules {
            if !module.name.to_lowercase().contains("test") {
                continue;
            }
            let mut score = 0i64;

            if let Some(parent_name) = parent_module.as_deref() {
                let imports = self.find_related(
                    module.id,
                    Some(RelationKind::Imports),
                    Direction::Outgoing,
                )?;
                let imported: Vec<&str> =
                    imports.iter().map(|import| import.name.as_str()).collect();
                if imported.contains(&parent_name) {
                    score += 2;
                }
                for name in &imported {
                    if parent_name.starts_with(&format!("{name}."))
                        || name.starts_with(&format!("{parent_name}."))
                    {
                        score += 1;
                    }
                }
            }

            if let (Some(file_path), Some(pattern)) = (module.file_path(), &word_pattern) {
                if let Ok(source) = std::fs::read_to_string(file_path) {
                    if pattern.is_match(&source) {
                        score += 1;
                    }
                }
            }

            if score > 0 {
                scored.push((module.name, score));
            }
        }

        scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(scored.into_iter().map(|(name, _)| name).collect())
    }
}

// ============================================================================
// SECTION: Graph Analysis
// ============================================================================

impl CodeStore {
    /// Returns the most connected entities (in-degree plus out-degree).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_central_entities(&self, limit: i64) -> Result<Vec<CentralEntity>, StoreError> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(
            "SELECT e.id, e.name, e.kind,
                    COALESCE(out_count, 0) + COALESCE(in_count, 0) AS connections
             FROM entities e
             LEFT JOIN (
                 SELECT source_id, COUNT(*) AS out_count
                 FROM relationships GROUP BY source_id
             ) out_rels ON e.id = out_rels.source_id
             LEFT JOIN (
                 SELECT target_id, COUNT(*) AS in_count
                 FROM relationships GROUP BY target_id
             ) in_rels ON e.id = in_rels.target_id
             WHERE COALESCE(out_count, 0) + COALESCE(in_count, 0) > 0
             ORDER BY connections DESC
             LIMIT ?1",
        )?;
        let rows = statement.query_map(params![limit], |row| {
            Ok(CentralEntity {
                id: EntityId::new(row.get(0)?),
                name: row.get(1)?,
                kind: row.get(2)?,
                connections: row.get(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// Returns entities with no relationships at all (potential dead code).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_orphans(&self) -> Result<Vec<Entity>, StoreError> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(
            "SELECT e.* FROM entities e
             WHERE e.id NOT IN (
                 SELECT DISTINCT source_id FROM relationships
                 UNION
                 SELECT DISTINCT target_id FROM relationships
             )",
        )?;
        let rows = statement.query_map(params![], crate::graph::entity_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// Returns methods and functions that are never called.
    ///
    /// An entity counts as called when it is the target of a `calls` edge
    /// or its short name appears as a `calls` cross-file reference.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_uncalled_methods(&self, exclude_private: bool) -> Result<Vec<Entity>, StoreError> {
        let candidates = {
            let conn = self.conn()?;
            let mut statement = conn
                .prepare("SELECT e.* FROM entities e WHERE e.kind IN ('method', 'function')")?;
            let rows = statement.query_map(params![], crate::graph::entity_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let called_ids: HashSet<i64> = {
            let conn = self.conn()?;
            let mut statement = conn.prepare(
                "SELECT DISTINCT target_id FROM relationships WHERE relation = 'calls'",
            )?;
            let rows = statement.query_map(params![], |row| row.get::<_, i64>(0))?;
            rows.filter_map(Result::ok).collect()
        };

        let called_names: HashSet<String> = {
            let conn = self.conn()?;
            let mut statement = conn.prepare(
                "SELECT DISTINCT target_name FROM cross_file_refs WHERE ref_type = 'calls'",
            )?;
            let rows = statement.query_map(params![], |row| row.get::<_, String>(0))?;
            rows.filter_map(Result::ok).collect()
        };

        let mut uncalled = Vec::new();
        for entity in candidates {
            if called_ids.contains(&entity.id.get()) {
                continue;
            }
            let short = short_name(&entity.name);
            if called_names.contains(short) {
                continue;
            }
            if exclude_private && short.starts_with('_') {
                continue;
            }
            uncalled.push(entity);
        }
        Ok(uncalled)
    }
}

// ============================================================================
// SECTION: Path Search
// ============================================================================

impl CodeStore {
    /// Finds relationship paths between two entities, names resolved
    /// exact-first then fuzzy.
    ///
    /// BFS over the undirected projection of the graph, bounded by
    /// `max_depth`, pruning nodes revisited at a deeper depth. Returns all
    /// found paths sorted by length; identical endpoints yield the
    /// singleton path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_path(
        &self,
        from_name: &str,
        to_name: &str,
        max_depth: usize,
    ) -> Result<Vec<Vec<String>>, StoreError> {
        let Some((from_id, from_entity_name)) = self.resolve_endpoint(from_name)? else {
            return Ok(Vec::new());
        };
        let Some((to_id, _)) = self.resolve_endpoint(to_name)? else {
            return Ok(Vec::new());
        };
        if from_id == to_id {
            return Ok(vec![vec![from_entity_name]]);
        }

        let mut queue: VecDeque<(EntityId, Vec<String>)> = VecDeque::new();
        queue.push_back((from_id, vec![from_entity_name]));
        let mut found_paths: Vec<Vec<String>> = Vec::new();
        let mut visited_at_depth: HashMap<EntityId, usize> = HashMap::new();

        while let Some((current_id, path)) = queue.pop_front() {
            if path.len() > max_depth {
                continue;
            }
            if visited_at_depth.get(&current_id).is_some_and(|&depth| depth < path.len()) {
                continue;
            }
            visited_at_depth.insert(current_id, path.len());

            for neighbor_id in self.neighbor_ids(current_id)? {
                let Some(neighbor) = self.get_entity(neighbor_id)? else {
                    continue;
                };
                if path.contains(&neighbor.name) {
                    continue;
                }
                let mut new_path = path.clone();
                new_path.push(neighbor.name);
                if neighbor_id == to_id {
                    found_paths.push(new_path);
                } else if new_path.len() < max_depth {
                    queue.push_back((neighbor_id, new_path));
                }
            }
        }

        found_paths.sort_by_key(Vec::len);
        Ok(found_paths)
    }

    /// Resolves an endpoint name, preferring an exact match.
    fn resolve_endpoint(&self, name: &str) -> Result<Option<(EntityId, String)>, StoreError> {
        let candidates = self.find_entities(Some(name), None)?;
        if candidates.is_empty() {
            return Ok(None);
        }
        for candidate in &candidates {
            if candidate.name == name {
                return Ok(Some((candidate.id, candidate.name.clone())));
            }
        }
        Ok(Some((candidates[0].id, candidates[0].name.clone())))
    }

    /// Returns neighbor ids across both edge directions.
    fn neighbor_ids(&self, entity_id: EntityId) -> Result<Vec<EntityId>, StoreError> {
        let conn = self.conn()?;
        let mut neighbors = Vec::new();
        let mut statement =
            conn.prepare("SELECT target_id FROM relationships WHERE source_id = ?1")?;
        let rows = statement.query_map(params![entity_id.get()], |row| row.get::<_, i64>(0))?;
        for row in rows {
            neighbors.push(EntityId::new(row?));
        }
        let mut statement =
            conn.prepare("SELECT source_id FROM relationships WHERE target_id = ?1")?;
        let rows = statement.query_map(params![entity_id.get()], |row| row.get::<_, i64>(0))?;
        for row in rows {
            neighbors.push(EntityId::new(row?));
        }
        Ok(neighbors)
    }
}

// ============================================================================
// SECTION: Architecture Summary
// ============================================================================

impl CodeStore {
    /// Builds a formatted architecture overview for LLM consumption.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Db`] on database failure.
    pub fn get_architecture_summary(&self) -> Result<String, StoreError> {
        let mut lines: Vec<String> = Vec::new();
        lines.push("# Architecture Summary".to_string());
        lines.push(String::new());

        let (entity_counts, relation_counts) = {
            let conn = self.conn()?;
            let mut statement = conn.prepare(
                "SELECT kind, COUNT(*) AS count FROM entities
                 GROUP BY kind ORDER BY count DESC",
            )?;
            let entity_counts: Vec<(String, i64)> = statement
                .query_map(params![], |row| Ok((row.get(0)?, row.get(1)?)))?
                .filter_map(Result::ok)
                .collect();
            let mut statement = conn.prepare(
                "SELECT relation, COUNT(*) AS count FROM relationships
                 GROUP BY relation ORDER BY count DESC",
            )?;
            let relation_counts: Vec<(String, i64)> = statement
                .query_map(params![], |row| Ok((row.get(0)?, row.get(1)?)))?
                .filter_map(Result::ok)
                .collect();
            (entity_counts, relation_counts)
        };

        lines.push("## Metrics".to_string());
        lines.push(String::new());
        for (kind, count) in &entity_counts {
            lines.push(format!("- {kind}: {count}"));
        }
        lines.push(String::new());
        lines.push("Relationships:".to_string());
        for (relation, count) in &relation_counts {
            lines.push(format!("- {relation}: {count}"));
        }
        lines.push(String::new());

        let central = self.get_central_entities(10)?;
        if !central.is_empty() {
            lines.push("## Central Entities (Most Connected)".to_string());
            lines.push(String::new());
            for entity in &central {
                lines.push(format!(
                    "- {} ({}): {} connections",
                    entity.name, entity.kind, entity.connections
                ));
            }
            lines.push(String::new());
        }

        let modules = self.find_entities(None, Some(EntityKind::Module))?;
        if !modules.is_empty() {
            lines.push("## Module Overview".to_string());
            lines.push(String::new());
            let mut packages: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for module in &modules {
                let package = module.name.split('.').next().unwrap_or(&module.name);
                packages.entry(package.to_string()).or_default().push(module.name.clone());
            }
            let mut ordered: Vec<(String, Vec<String>)> = packages.into_iter().collect();
            ordered.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));
            for (package, mut members) in ordered {
                lines.push(format!("- {package}: {} module(s)", members.len()));
                if members.len() <= 5 {
                    members.sort();
                    for member in members {
                        lines.push(format!("  - {member}"));
                    }
                }
            }
            lines.push(String::new());
        }

        let orphans = self.get_orphans()?;
        if !orphans.is_empty() {
            lines.push("## Orphan Entities (No Relationships)".to_string());
            lines.push(String::new());
            lines.push(format!(
                "Found {} orphan entities (potential dead code):",
                orphans.len()
            ));
            for orphan in orphans.iter().take(10) {
                lines.push(format!("- {} ({})", orphan.name, orphan.kind));
            }
            if orphans.len() > 10 {
                lines.push(format!("- ... and {} more", orphans.len() - 10));
            }
            lines.push(String::new());
        }

        let import_count: i64 = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT COUNT(*) FROM relationships WHERE relation = 'imports'",
                params![],
                |row| row.get(0),
            )?
        };
        if import_count > 0 {
            lines.push("## Import Graph".to_string());
            lines.push(String::new());
            let conn = self.conn()?;
            let mut statement = conn.prepare(
                "SELECT e.name, COUNT(*) AS import_count
                 FROM relationships r
                 JOIN entities e ON r.source_id = e.id
                 WHERE r.relation = 'imports'
                 GROUP BY r.source_id
                 ORDER BY import_count DESC
                 LIMIT 5",
            )?;
            let importers: Vec<(String, i64)> = statement
                .query_map(params![], |row| Ok((row.get(0)?, row.get(1)?)))?
                .filter_map(Result::ok)
                .collect();
            lines.push("Most dependencies:".to_string());
            for (name, count) in importers {
                lines.push(format!("- {name}: imports {count} modules"));
            }
            lines.push(String::new());
        }

        Ok(lines.join("\n"))
    }
}
