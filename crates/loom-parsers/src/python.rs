// crates/loom-parsers/src/python.rs
// ============================================================================
// Module: Loom Python Parser
// Description: Python language plug-in built on tree-sitter.
// Purpose: Extract modules, classes, functions, methods, imports, and calls.
// Dependencies: loom-core, tree-sitter, tree-sitter-python, tracing
// ============================================================================

//! ## Overview
//! The Python parser turns `.py` files into entity descriptors with dotted
//! names derived from the path relative to the ingest root: `pkg/mod.py`
//! becomes `pkg.mod`, `pkg/__init__.py` becomes `pkg`. Top-level functions
//! and classes become entities connected to the module with `contains`
//! edges; methods become entities connected to their class with `member_of`
//! edges. Docstrings populate the entity intent.
//!
//! The second-pass hooks reuse the same grammar: `extract_imports` resolves
//! top-level import statements (including relative levels) against the
//! importer's dotted name, and `extract_calls` classifies call sites for the
//! call-edge linker.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use loom_core::CallSite;
use loom_core::CallSiteKind;
use loom_core::CodeReferences;
use loom_core::EntityKind;
use loom_core::ImportInfo;
use loom_core::ImportRecord;
use loom_core::ImportType;
use loom_core::MetadataBag;
use loom_core::ParseError;
use loom_core::ParseOutcome;
use loom_core::ParsedEntity;
use loom_core::ParsedRelationship;
use loom_core::SourceParser;
use serde_json::Value;
use serde_json::json;
use tree_sitter::Node;
use tree_sitter::Parser;
use tree_sitter::Tree;

// ============================================================================
// SECTION: Builtins
// ============================================================================

/// Python builtins that the call linker skips by default.
static BUILTINS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "abs",
        "aiter",
        "all",
        "any",
        "anext",
        "ascii",
        "bin",
        "bool",
        "breakpoint",
        "bytearray",
        "bytes",
        "callable",
        "chr",
        "classmethod",
        "compile",
        "complex",
        "delattr",
        "dict",
        "dir",
        "divmod",
        "enumerate",
        "eval",
        "exec",
        "filter",
        "float",
        "format",
        "frozenset",
        "getattr",
        "globals",
        "hasattr",
        "hash",
        "help",
        "hex",
        "id",
        "input",
        "int",
        "isinstance",
        "issubclass",
        "iter",
        "len",
        "list",
        "locals",
        "map",
        "max",
        "memoryview",
        "min",
        "next",
        "object",
        "oct",
        "open",
        "ord",
        "pow",
        "print",
        "property",
        "range",
        "repr",
        "reversed",
        "round",
        "set",
        "setattr",
        "slice",
        "sorted",
        "staticmethod",
        "str",
        "sum",
        "super",
        "tuple",
        "type",
        "vars",
        "zip",
        "__import__",
    ]
    .into_iter()
    .collect()
});

// ============================================================================
// SECTION: Parser Type
// ============================================================================

/// Python source parser implementing the registry contract.
#[derive(Debug, Default, Clone, Copy)]
pub struct PythonParser;

impl PythonParser {
    /// Creates the parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SourceParser for PythonParser {
    fn language(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".py"]
    }

    fn parse_file(&self, path: &Path, root: &Path) -> Result<ParseOutcome, ParseError> {
        let source = std::fs::read_to_string(path).map_err(|err| ParseError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;

        let module_name = module_name_for(path, root);
        let Some(tree) = parse_source(&source) else {
            return Ok(ParseOutcome {
                errors: vec![format!("failed to parse {}", path.display())],
                ..ParseOutcome::default()
            });
        };
        let tree_root = tree.root_node();
        if tree_root.has_error() {
            return Ok(ParseOutcome {
                errors: vec![format!("syntax error in {}", path.display())],
                ..ParseOutcome::default()
            });
        }

        let mut outcome = ParseOutcome::default();
        let file_path = path.display().to_string();

        outcome.entities.push(ParsedEntity {
            name: module_name.clone(),
            kind: EntityKind::Module,
            code: None,
            intent: docstring_of(tree_root, &source),
            metadata: Some(module_metadata(&file_path)),
        });

        for child in named_children(tree_root) {
            let (node, _) = unwrap_decorated(child);
            match node.kind() {
                "function_definition" => {
                    self.collect_function(node, &source, &module_name, &file_path, &mut outcome);
                }
                "class_definition" => {
                    self.collect_class(node, &source, &module_name, &file_path, &mut outcome);
                }
                _ => {}
            }
        }

        Ok(outcome)
    }

    fn extract_imports(&self, source: &str, module_name: &str) -> Vec<ImportRecord> {
        let Some(tree) = parse_source(source) else {
            return Vec::new();
        };
        let mut records = Vec::new();
        for node in named_children(tree.root_node()) {
            match node.kind() {
                "import_statement" => collect_plain_imports(node, source, &mut records),
                "import_from_statement" => {
                    collect_from_imports(node, source, module_name, &mut records);
                }
                _ => {}
            }
        }
        records
    }

    fn extract_calls(&self, code: &str) -> Vec<CallSite> {
        let Some(tree) = parse_source(code) else {
            return Vec::new();
        };
        let mut calls = Vec::new();
        walk_calls(tree.root_node(), code, &mut calls);
        calls
    }

    fn extract_references(&self, code: &str) -> CodeReferences {
        let Some(tree) = parse_source(code) else {
            return CodeReferences::default();
        };
        let mut references = CodeReferences::default();
        walk_references(tree.root_node(), code, &mut references);
        references
    }

    fn is_builtin(&self, name: &str) -> bool {
        BUILTINS.contains(name)
    }
}

impl PythonParser {
    /// Collects a top-level function and its `contains` edge.
    fn collect_function(
        &self,
        node: Node<'_>,
        source: &str,
        module_name: &str,
        file_path: &str,
        outcome: &mut ParseOutcome,
    ) {
        let Some(name) = field_text(node, "name", source) else {
            return;
        };
        let qualified = format!("{module_name}.{name}");
        outcome.entities.push(ParsedEntity {
            name: qualified.clone(),
            kind: EntityKind::Function,
            code: Some(node_text(node, source)),
            intent: body_docstring(node, source),
            metadata: Some(function_metadata(node, source, file_path)),
        });
        outcome.relationships.push(ParsedRelationship {
            from_name: module_name.to_string(),
            to_name: qualified,
            relation: "contains".to_string(),
            metadata: None,
        });
    }

    /// Collects a class, its methods, and their edges.
    fn collect_class(
        &self,
        node: Node<'_>,
        source: &str,
        module_name: &str,
        file_path: &str,
        outcome: &mut ParseOutcome,
    ) {
        let Some(name) = field_text(node, "name", source) else {
            return;
        };
        let class_name = format!("{module_name}.{name}");

        let bases = base_names(node, source);
        let mut method_names = Vec::new();
        let mut methods = Vec::new();

        if let Some(body) = node.child_by_field_name("body") {
            for child in named_children(body) {
                let (member, _) = unwrap_decorated(child);
                if member.kind() != "function_definition" {
                    continue;
                }
                let Some(method) = field_text(member, "name", source) else {
                    continue;
                };
                method_names.push(method.clone());
                let qualified = format!("{class_name}.{method}");
                methods.push(ParsedEntity {
                    name: qualified.clone(),
                    kind: EntityKind::Method,
                    code: Some(node_text(member, source)),
                    intent: body_docstring(member, source),
                    metadata: Some(method_metadata(member, source, file_path)),
                });
                outcome.relationships.push(ParsedRelationship {
                    from_name: qualified,
                    to_name: class_name.clone(),
                    relation: "member_of".to_string(),
                    metadata: None,
                });
            }
        }

        outcome.entities.push(ParsedEntity {
            name: class_name.clone(),
            kind: EntityKind::Class,
            code: Some(node_text(node, source)),
            intent: body_docstring(node, source),
            metadata: Some(class_metadata(node, file_path, &bases, &method_names)),
        });
        outcome.entities.extend(methods);

        outcome.relationships.push(ParsedRelationship {
            from_name: module_name.to_string(),
            to_name: class_name.clone(),
            relation: "contains".to_string(),
            metadata: None,
        });
        // Base classes defined in the same module resolve to inherits edges;
        // anything else is dropped by the ingestion coordinator.
        for base in bases {
            outcome.relationships.push(ParsedRelationship {
                from_name: class_name.clone(),
                to_name: format!("{module_name}.{base}"),
                relation: "inherits".to_string(),
                metadata: None,
            });
        }
    }
}

// ============================================================================
// SECTION: Tree Helpers
// ============================================================================

/// Parses Python source, returning `None` when the grammar cannot be loaded
/// or parsing is aborted.
fn parse_source(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    if parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .is_err()
    {
        tracing::warn!("failed to load the python grammar");
        return None;
    }
    parser.parse(source, None)
}

/// Collects the named children of a node.
fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
    children
}

/// Unwraps `decorated_definition` nodes to the inner definition.
fn unwrap_decorated(node: Node<'_>) -> (Node<'_>, bool) {
    if node.kind() == "decorated_definition" {
        if let Some(inner) = node.child_by_field_name("definition") {
            return (inner, true);
        }
    }
    (node, false)
}

/// Returns the UTF-8 text of a node.
fn node_text(node: Node<'_>, source: &str) -> String {
    node.utf8_text(source.as_bytes()).unwrap_or("").to_string()
}

/// Returns the text of a named field, when present and non-empty.
fn field_text(node: Node<'_>, field: &str, source: &str) -> Option<String> {
    let text = node_text(node.child_by_field_name(field)?, source);
    if text.is_empty() { None } else { Some(text) }
}

/// Returns true when a definition node carries the `async` keyword.
fn is_async(node: Node<'_>) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|child| child.kind() == "async")
}

/// Extracts a docstring from the first statement of a block-bearing node.
fn body_docstring(node: Node<'_>, source: &str) -> Option<String> {
    node.child_by_field_name("body")
        .and_then(|body| docstring_of(body, source))
}

/// Extracts a leading docstring from a module or block node.
fn docstring_of(node: Node<'_>, source: &str) -> Option<String> {
    let first = named_children(node).into_iter().next()?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string_node = named_children(first)
        .into_iter()
        .find(|child| child.kind() == "string")?;
    let content = named_children(string_node)
        .into_iter()
        .filter(|child| child.kind() == "string_content")
        .map(|child| node_text(child, source))
        .collect::<Vec<_>>()
        .join("");
    let trimmed = content.trim().to_string();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

/// Derives the dotted module name from a path relative to the ingest root.
fn module_name_for(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut parts: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    if let Some(last) = parts.pop() {
        if last == "__init__.py" {
            if parts.is_empty() {
                // Package marker at the root: name the module after the root
                // directory itself.
                let root_name = root
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "package".to_string());
                return root_name;
            }
        } else {
            parts.push(last.trim_end_matches(".py").to_string());
        }
    }
    parts.join(".")
}

// ============================================================================
// SECTION: Metadata Builders
// ============================================================================

/// Metadata for a module entity.
fn module_metadata(file_path: &str) -> MetadataBag {
    let mut bag = MetadataBag::new();
    bag.insert("file_path".to_string(), json!(file_path));
    bag.insert("language".to_string(), json!("python"));
    bag
}

/// Metadata for a function entity.
fn function_metadata(node: Node<'_>, source: &str, file_path: &str) -> MetadataBag {
    let mut bag = MetadataBag::new();
    bag.insert("file_path".to_string(), json!(file_path));
    bag.insert("lineno".to_string(), json!(node.start_position().row + 1));
    bag.insert("end_lineno".to_string(), json!(node.end_position().row + 1));
    bag.insert("is_async".to_string(), json!(is_async(node)));
    bag.insert("args".to_string(), Value::Array(parameter_names(node, source)));
    bag.insert("signature".to_string(), json!(signature_of(node, source)));
    bag.insert("language".to_string(), json!("python"));
    bag
}

/// Metadata for a class entity.
fn class_metadata(
    node: Node<'_>,
    file_path: &str,
    bases: &[String],
    methods: &[String],
) -> MetadataBag {
    let mut bag = MetadataBag::new();
    bag.insert("file_path".to_string(), json!(file_path));
    bag.insert("lineno".to_string(), json!(node.start_position().row + 1));
    bag.insert("end_lineno".to_string(), json!(node.end_position().row + 1));
    bag.insert("bases".to_string(), json!(bases));
    bag.insert("methods".to_string(), json!(methods));
    bag.insert("language".to_string(), json!("python"));
    bag
}

/// Metadata for a method entity.
fn method_metadata(node: Node<'_>, source: &str, file_path: &str) -> MetadataBag {
    let mut bag = MetadataBag::new();
    bag.insert("file_path".to_string(), json!(file_path));
    bag.insert("start_line".to_string(), json!(node.start_position().row + 1));
    bag.insert("end_line".to_string(), json!(node.end_position().row + 1));
    bag.insert("signature".to_string(), json!(signature_of(node, source)));
    bag.insert("is_async".to_string(), json!(is_async(node)));
    bag.insert("language".to_string(), json!("python"));
    bag
}

/// Returns base-class names from a class definition's superclass list.
fn base_names(node: Node<'_>, source: &str) -> Vec<String> {
    let Some(superclasses) = node.child_by_field_name("superclasses") else {
        return Vec::new();
    };
    named_children(superclasses)
        .into_iter()
        .filter(|child| matches!(child.kind(), "identifier" | "attribute"))
        .map(|child| node_text(child, source))
        .collect()
}

/// Returns positional parameter names (excluding `self` splats and markers).
fn parameter_names(node: Node<'_>, source: &str) -> Vec<Value> {
    let Some(parameters) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };
    named_children(parameters)
        .into_iter()
        .filter_map(|param| match param.kind() {
            "identifier" => Some(node_text(param, source)),
            "typed_parameter" => param
                .named_child(0)
                .map(|inner| node_text(inner, source)),
            "default_parameter" | "typed_default_parameter" => {
                field_text(param, "name", source)
            }
            _ => None,
        })
        .map(Value::String)
        .collect()
}

/// Builds a display signature like `(a, b=..., *args, **kwargs)`.
fn signature_of(node: Node<'_>, source: &str) -> String {
    let Some(parameters) = node.child_by_field_name("parameters") else {
        return "()".to_string();
    };
    let mut parts = Vec::new();
    for param in named_children(parameters) {
        match param.kind() {
            "identifier" => parts.push(node_text(param, source)),
            "typed_parameter" => {
                if let Some(inner) = param.named_child(0) {
                    parts.push(node_text(inner, source));
                }
            }
            "default_parameter" | "typed_default_parameter" => {
                if let Some(name) = field_text(param, "name", source) {
                    parts.push(format!("{name}=..."));
                }
            }
            "list_splat_pattern" | "dictionary_splat_pattern" => {
                parts.push(node_text(param, source));
            }
            "keyword_separator" => parts.push("*".to_string()),
            _ => {}
        }
    }
    format!("({})", parts.join(", "))
}

// ============================================================================
// SECTION: Import Extraction
// ============================================================================

/// Collects records from a plain `import a, b.c as d` statement.
fn collect_plain_imports(node: Node<'_>, source: &str, records: &mut Vec<ImportRecord>) {
    for child in named_children(node) {
        match child.kind() {
            "dotted_name" => {
                let module = node_text(child, source);
                records.push(ImportRecord {
                    module: module.clone(),
                    info: ImportInfo {
                        names: vec![module],
                        aliases: BTreeMap::new(),
                        is_relative: false,
                        level: 0,
                        import_type: ImportType::Import,
                    },
                });
            }
            "aliased_import" => {
                let Some(module) = field_text(child, "name", source) else {
                    continue;
                };
                let mut aliases = BTreeMap::new();
                if let Some(alias) = field_text(child, "alias", source) {
                    aliases.insert(module.clone(), alias);
                }
                records.push(ImportRecord {
                    module: module.clone(),
                    info: ImportInfo {
                        names: vec![module],
                        aliases,
                        is_relative: false,
                        level: 0,
                        import_type: ImportType::Import,
                    },
                });
            }
            _ => {}
        }
    }
}

/// Collects records from a `from ... import ...` statement.
fn collect_from_imports(
    node: Node<'_>,
    source: &str,
    importer_name: &str,
    records: &mut Vec<ImportRecord>,
) {
    let (level, module) = from_target(node, source);
    let Some(resolved_base) = resolve_relative_import(importer_name, module.as_deref(), level)
    else {
        return;
    };

    let mut names = Vec::new();
    let mut aliases = BTreeMap::new();
    let mut is_star = false;
    for child in named_children(node) {
        // The module_name field also matches dotted_name; skip it.
        if node.child_by_field_name("module_name") == Some(child) {
            continue;
        }
        match child.kind() {
            "wildcard_import" => is_star = true,
            "dotted_name" => names.push(node_text(child, source)),
            "aliased_import" => {
                if let Some(name) = field_text(child, "name", source) {
                    if let Some(alias) = field_text(child, "alias", source) {
                        aliases.insert(name.clone(), alias);
                    }
                    names.push(name);
                }
            }
            _ => {}
        }
    }
    if is_star {
        names = vec!["*".to_string()];
    }

    let info = ImportInfo {
        names: names.clone(),
        aliases: aliases.clone(),
        is_relative: level > 0,
        level,
        import_type: if is_star { ImportType::FromStar } else { ImportType::From },
    };
    records.push(ImportRecord { module: resolved_base.clone(), info });

    // `from . import sub` may name submodules; emit resolvable candidates.
    if module.is_none() && !is_star {
        for name in names {
            let mut sub_aliases = BTreeMap::new();
            if let Some(alias) = aliases.get(&name) {
                sub_aliases.insert(name.clone(), alias.clone());
            }
            records.push(ImportRecord {
                module: format!("{resolved_base}.{name}"),
                info: ImportInfo {
                    names: vec![name],
                    aliases: sub_aliases,
                    is_relative: level > 0,
                    level,
                    import_type: ImportType::FromSubmodule,
                },
            });
        }
    }
}

/// Returns the relative level and optional module text of a from-import.
fn from_target(node: Node<'_>, source: &str) -> (u32, Option<String>) {
    let Some(target) = node.child_by_field_name("module_name") else {
        return (0, None);
    };
    match target.kind() {
        "dotted_name" => (0, Some(node_text(target, source))),
        "relative_import" => {
            let mut level = 0u32;
            let mut module = None;
            for child in named_children(target) {
                match child.kind() {
                    "import_prefix" => {
                        level = u32::try_from(node_text(child, source).matches('.').count())
                            .unwrap_or(0);
                    }
                    "dotted_name" => module = Some(node_text(child, source)),
                    _ => {}
                }
            }
            // The prefix may parse as an unnamed token on some grammar
            // versions; fall back to counting leading dots of the whole node.
            if level == 0 {
                let text = node_text(target, source);
                level = u32::try_from(text.chars().take_while(|ch| *ch == '.').count())
                    .unwrap_or(0);
            }
            (level, module)
        }
        _ => (0, None),
    }
}

/// Resolves a relative import to an absolute module name.
///
/// `level` counts leading dots: 0 is absolute, 1 the current package, 2 its
/// parent, and so on. Returns `None` when the level climbs past the root.
fn resolve_relative_import(
    importer_name: &str,
    module_name: Option<&str>,
    level: u32,
) -> Option<String> {
    if level == 0 {
        return module_name.map(ToString::to_string);
    }
    let parts: Vec<&str> = importer_name.split('.').collect();
    let level = level as usize;
    if level > parts.len() {
        tracing::warn!(
            importer = importer_name,
            level,
            "relative import level exceeds package depth"
        );
        return None;
    }
    let base_parts = &parts[.. parts.len() - level];
    match module_name {
        Some(module) if base_parts.is_empty() => Some(module.to_string()),
        Some(module) => Some(format!("{}.{module}", base_parts.join("."))),
        None if base_parts.is_empty() => None,
        None => Some(base_parts.join(".")),
    }
}

// ============================================================================
// SECTION: Call Extraction
// ============================================================================

/// Recursively collects call sites from a syntax tree.
fn walk_calls(node: Node<'_>, source: &str, calls: &mut Vec<CallSite>) {
    if node.kind() == "call" {
        if let Some(function) = node.child_by_field_name("function") {
            classify_call(function, source, calls);
        }
    }
    for child in named_children(node) {
        walk_calls(child, source, calls);
    }
}

/// Classifies one call expression's callee.
fn classify_call(function: Node<'_>, source: &str, calls: &mut Vec<CallSite>) {
    match function.kind() {
        "identifier" => {
            calls.push(CallSite {
                name: node_text(function, source),
                kind: CallSiteKind::Simple,
            });
        }
        "attribute" => {
            let Some(attr) = function.child_by_field_name("attribute") else {
                return;
            };
            let attr_name = node_text(attr, source);
            match function.child_by_field_name("object") {
                Some(object) if object.kind() == "identifier" => {
                    let object_name = node_text(object, source);
                    if object_name == "self" {
                        calls.push(CallSite { name: attr_name, kind: CallSiteKind::Method });
                    } else {
                        calls.push(CallSite {
                            name: format!("{object_name}.{attr_name}"),
                            kind: CallSiteKind::Chained,
                        });
                        calls.push(CallSite { name: attr_name, kind: CallSiteKind::Simple });
                    }
                }
                _ => {
                    calls.push(CallSite { name: attr_name, kind: CallSiteKind::Chained });
                }
            }
        }
        _ => {}
    }
}

// ============================================================================
// SECTION: Reference Extraction
// ============================================================================

/// Recursively collects name references for usage analysis.
fn walk_references(node: Node<'_>, source: &str, references: &mut CodeReferences) {
    match node.kind() {
        "identifier" => {
            if is_expression_identifier(node) {
                references.names.insert(node_text(node, source));
            }
        }
        "attribute" => {
            if let Some(attr) = node.child_by_field_name("attribute") {
                let attr_name = node_text(attr, source);
                let is_call_target = node
                    .parent()
                    .is_some_and(|parent| {
                        parent.kind() == "call"
                            && parent.child_by_field_name("function") == Some(node)
                    });
                if is_call_target {
                    references.method_calls.insert(attr_name.clone());
                }
                references.attribute_accesses.insert(attr_name.clone());
                if let Some(object) = node.child_by_field_name("object") {
                    if object.kind() == "identifier" {
                        references
                            .attribute_accesses
                            .insert(format!("{}.{attr_name}", node_text(object, source)));
                    }
                }
            }
        }
        _ => {}
    }
    for child in named_children(node) {
        walk_references(child, source, references);
    }
}

/// Reports whether an identifier is used as an expression rather than as a
/// definition name, parameter, attribute suffix, or dotted-path segment.
fn is_expression_identifier(node: Node<'_>) -> bool {
    let Some(parent) = node.parent() else {
        return true;
    };
    match parent.kind() {
        "attribute" => parent.child_by_field_name("attribute") != Some(node),
        "function_definition" | "class_definition" => {
            parent.child_by_field_name("name") != Some(node)
        }
        "keyword_argument" => parent.child_by_field_name("name") != Some(node),
        "parameters" | "typed_parameter" | "default_parameter" | "typed_default_parameter"
        | "list_splat_pattern" | "dictionary_splat_pattern" | "dotted_name"
        | "aliased_import" => false,
        _ => true,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
