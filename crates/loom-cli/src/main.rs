// crates/loom-cli/src/main.rs
// ============================================================================
// Module: Loom CLI Entry Point
// Description: Command dispatcher over the Loom code-knowledge store.
// Purpose: Map verbs one-to-one onto core store operations.
// Dependencies: clap, loom-config, loom-core, loom-store
// ============================================================================

//! ## Overview
//! The CLI is a thin shell: each verb resolves the store (explicit
//! `--project`, active project, or upward search), calls one core
//! operation, and prints plain-text lines. Failures print a single line to
//! stderr and exit non-zero. The core never depends on this crate.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;
use clap::Subcommand;
use loom_core::EntityId;
use loom_core::EntityKind;
use loom_core::NoteId;
use loom_core::NoteLinkType;
use loom_core::NoteStatus;
use loom_core::NoteType;
use loom_core::TodoId;
use loom_core::TraceRunId;
use loom_store::CodeStore;
use loom_store::EntityRef;
use loom_store::NewTodo;
use loom_store::StoreError;
use loom_store::TodoFilter;
use loom_store::TodoUpdate;

// ============================================================================
// SECTION: Arguments
// ============================================================================

/// Loom: a persistent code-knowledge graph for developer assistance.
#[derive(Debug, Parser)]
#[command(name = "loom", version, about)]
struct Cli {
    /// Project root holding `.loom/store.db` (defaults to discovery).
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Verb to run.
    #[command(subcommand)]
    command: Command,
}

/// Top-level verbs.
#[derive(Debug, Subcommand)]
enum Command {
    /// Create (or migrate) the store for a project.
    Init {
        /// Project root; defaults to the current directory.
        path: Option<PathBuf>,
    },
    /// Ingest source files into the graph.
    Ingest {
        /// Root paths to walk.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Exclusion patterns (defaults to .git, __pycache__, ...).
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Run the import and call analysis passes.
    Analyze,
    /// Substring search over entity names, intents, and code.
    Query {
        /// Search text.
        text: String,
        /// Restrict to one entity kind.
        #[arg(long)]
        kind: Option<String>,
    },
    /// Find everything referencing an entity.
    Usages {
        /// Entity name (exact preferred, fuzzy fallback).
        name: String,
    },
    /// Analyze the blast radius of changing an entity.
    Impact {
        /// Entity name.
        name: String,
    },
    /// Suggest test modules covering an entity.
    SuggestTests {
        /// Entity name.
        name: String,
    },
    /// List tests impacted by current file changes.
    Test,
    /// Inspect recorded trace runs.
    Trace {
        /// Trace subverb.
        #[command(subcommand)]
        command: TraceCommand,
    },
    /// Log a failed fix attempt.
    FailureLog {
        /// What was tried.
        attempted_fix: String,
        /// What was being worked on.
        #[arg(long)]
        context: Option<String>,
        /// Related entity name.
        #[arg(long)]
        entity: Option<String>,
        /// Related file path.
        #[arg(long)]
        file: Option<String>,
        /// Why it failed.
        #[arg(long)]
        reason: Option<String>,
        /// Error text, if any.
        #[arg(long)]
        error: Option<String>,
        /// Tags.
        #[arg(long)]
        tag: Vec<String>,
    },
    /// Query previously attempted fixes.
    AttemptedFixes {
        /// Filter by entity name.
        #[arg(long)]
        entity: Option<String>,
        /// Filter by file path.
        #[arg(long)]
        file: Option<String>,
        /// Filter by tag (OR logic).
        #[arg(long)]
        tag: Vec<String>,
        /// Search in context and attempted fixes.
        #[arg(long)]
        search: Option<String>,
        /// Maximum results.
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Manage the TODO queue.
    Todo {
        /// TODO subverb.
        #[command(subcommand)]
        command: TodoCommand,
    },
    /// Manage knowledge-base notes.
    Note {
        /// Note subverb.
        #[command(subcommand)]
        command: NoteCommand,
    },
    /// Find relationship paths between two entities.
    Path {
        /// Starting entity name.
        from: String,
        /// Target entity name.
        to: String,
        /// Maximum path length.
        #[arg(long, default_value_t = 5)]
        max_depth: usize,
    },
    /// Print the architecture summary.
    Summary,
}

/// Trace inspection verbs.
#[derive(Debug, Subcommand)]
enum TraceCommand {
    /// Show one run's calls and statistics.
    Show {
        /// Trace run id.
        run_id: String,
        /// Only calls that raised.
        #[arg(long)]
        failures: bool,
    },
    /// Show global trace statistics.
    List,
}

/// TODO queue verbs.
#[derive(Debug, Subcommand)]
enum TodoCommand {
    /// Add a work item.
    Add {
        /// Task description.
        prompt: String,
        /// Short title.
        #[arg(long)]
        title: Option<String>,
        /// Additional context.
        #[arg(long)]
        context: Option<String>,
        /// Priority (higher is more urgent).
        #[arg(long, default_value_t = 0)]
        priority: i64,
        /// Related entity name.
        #[arg(long)]
        entity: Option<String>,
        /// Related file path.
        #[arg(long)]
        file: Option<String>,
        /// Tags.
        #[arg(long)]
        tag: Vec<String>,
        /// Time estimate in minutes.
        #[arg(long)]
        estimate: Option<i64>,
        /// Mark the item critical.
        #[arg(long)]
        critical: bool,
    },
    /// List open items.
    List {
        /// Include completed and combined items.
        #[arg(long)]
        all: bool,
        /// Only critical items.
        #[arg(long)]
        critical: bool,
        /// Maximum results.
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Show the next pending item.
    Next,
    /// Show one item in full.
    Show {
        /// TODO id.
        id: i64,
    },
    /// Mark an item in progress.
    Start {
        /// TODO id.
        id: i64,
    },
    /// Mark an item completed.
    Done {
        /// TODO id.
        id: i64,
        /// Completion notes.
        #[arg(long)]
        notes: Option<String>,
        /// Record the item as unsuccessful.
        #[arg(long)]
        failed: bool,
    },
    /// Combine items into one survivor.
    Combine {
        /// Item to keep.
        keep: i64,
        /// Items to merge into it.
        #[arg(required = true)]
        merge: Vec<i64>,
        /// Replacement prompt.
        #[arg(long)]
        prompt: Option<String>,
        /// Replacement title.
        #[arg(long)]
        title: Option<String>,
    },
    /// Move an item to a new position.
    Move {
        /// TODO id.
        id: i64,
        /// New 1-based position.
        position: i64,
    },
    /// Edit an item's fields.
    Edit {
        /// TODO id.
        id: i64,
        /// New title.
        #[arg(long)]
        title: Option<String>,
        /// New prompt.
        #[arg(long)]
        prompt: Option<String>,
        /// New context.
        #[arg(long)]
        context: Option<String>,
        /// New priority.
        #[arg(long)]
        priority: Option<i64>,
    },
    /// Delete an item.
    Delete {
        /// TODO id.
        id: i64,
    },
    /// Show queue statistics.
    Stats,
    /// Search open items.
    Search {
        /// Search text.
        query: String,
        /// Maximum results.
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

/// Note verbs.
#[derive(Debug, Subcommand)]
enum NoteCommand {
    /// Add a note.
    Add {
        /// Note body.
        content: String,
        /// Note type (analysis, intent, hypothesis, todo, decision, bug).
        #[arg(long, default_value = "analysis")]
        r#type: String,
        /// Title.
        #[arg(long)]
        title: Option<String>,
        /// Entities to link.
        #[arg(long)]
        entity: Vec<String>,
    },
    /// List notes.
    List {
        /// Filter to one linked entity.
        #[arg(long)]
        entity: Option<String>,
        /// Filter by note type.
        #[arg(long)]
        r#type: Option<String>,
        /// Filter by status (active, confirmed, refuted).
        #[arg(long)]
        status: Option<String>,
        /// Maximum results.
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Show one note in full.
    Show {
        /// Note id.
        id: String,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "error: {message}");
            ExitCode::FAILURE
        }
    }
}

/// Dispatches one parsed invocation.
fn run(cli: Cli) -> Result<(), String> {
    if let Command::Init { path } = &cli.command {
        let root = path
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .ok_or_else(|| "cannot determine project directory".to_string())?;
        let store_path = loom_config::store_path_for(&root);
        CodeStore::open(&store_path).map_err(|err| err.to_string())?;
        let _ = loom_config::set_active_project(&root);
        emit(&format!("initialized {}", store_path.display()));
        return Ok(());
    }

    let store = open_store(cli.project.as_deref())?;
    match cli.command {
        Command::Init { .. } => Ok(()),
        Command::Ingest { paths, exclude } => {
            let patterns = if exclude.is_empty() { None } else { Some(exclude.as_slice()) };
            let stats = store.ingest_files(&paths, patterns).map_err(|err| err.to_string())?;
            emit(&format!(
                "ingested {} modules, {} functions, {} classes, {} methods ({} errors)",
                stats.modules, stats.functions, stats.classes, stats.methods, stats.errors
            ));
            Ok(())
        }
        Command::Analyze => {
            let imports = store.analyze_imports().map_err(|err| err.to_string())?;
            let calls = store.analyze_calls(true).map_err(|err| err.to_string())?;
            emit(&format!(
                "imports: analyzed {}, found {}, created {}",
                imports.analyzed, imports.found, imports.relationships_created
            ));
            emit(&format!(
                "calls: analyzed {}, found {}, created {}",
                calls.analyzed, calls.found, calls.relationships_created
            ));
            Ok(())
        }
        Command::Query { text, kind } => {
            let kind = parse_kind(kind.as_deref())?;
            let results = store.query(&text, kind).map_err(|err| err.to_string())?;
            if results.is_empty() {
                emit("no matches");
            }
            for result in results {
                let fields: Vec<&str> = result
                    .matches
                    .iter()
                    .map(|field| match field {
                        loom_store::MatchField::Name => "name",
                        loom_store::MatchField::Intent => "intent",
                        loom_store::MatchField::Code => "code",
                    })
                    .collect();
                emit(&format!(
                    "{} [{}] ({})",
                    result.entity.name,
                    result.entity.kind,
                    fields.join(", ")
                ));
            }
            Ok(())
        }
        Command::Usages { name } => {
            let entity = resolve_entity(&store, &name)?;
            for usage in store.find_usages(entity).map_err(|err| err.to_string())? {
                emit(&format!("{} <- {} ({})", name, usage.entity.name, usage.relation));
            }
            Ok(())
        }
        Command::Impact { name } => {
            let entity = resolve_entity(&store, &name)?;
            let report = store.impact_analysis(entity).map_err(|err| err.to_string())?;
            emit(&format!("risk score: {}", report.risk_score));
            for caller in &report.direct_callers {
                emit(&format!("direct: {}", caller.name));
            }
            for caller in &report.indirect_callers {
                emit(&format!("indirect: {}", caller.name));
            }
            for method in &report.affected_methods {
                emit(&format!("method: {}", method.name));
            }
            Ok(())
        }
        Command::SuggestTests { name } => {
            let entity = resolve_entity(&store, &name)?;
            for test in store.suggest_tests(entity).map_err(|err| err.to_string())? {
                emit(&test);
            }
            Ok(())
        }
        Command::Test => {
            let tests = store.get_impacted_tests(None).map_err(|err| err.to_string())?;
            if tests.is_empty() {
                emit("no impacted tests");
            }
            for test in tests {
                emit(&test);
            }
            Ok(())
        }
        Command::Trace { command } => run_trace(&store, command),
        Command::FailureLog { attempted_fix, context, entity, file, reason, error, tag } => {
            let id = store
                .log_failure(
                    &attempted_fix,
                    context.as_deref(),
                    entity.as_deref(),
                    None,
                    file.as_deref(),
                    reason.as_deref(),
                    error.as_deref(),
                    &tag,
                )
                .map_err(|err| err.to_string())?;
            emit(&format!("logged failure #{id}"));
            Ok(())
        }
        Command::AttemptedFixes { entity, file, tag, search, limit } => {
            let logs = store
                .get_failure_logs(
                    entity.as_deref(),
                    None,
                    file.as_deref(),
                    &tag,
                    search.as_deref(),
                    limit,
                )
                .map_err(|err| err.to_string())?;
            for log in logs {
                emit(&format!(
                    "#{} {} {}{}",
                    log.id,
                    log.timestamp,
                    log.attempted_fix,
                    log.failure_reason
                        .map(|reason| format!(" ({reason})"))
                        .unwrap_or_default()
                ));
            }
            Ok(())
        }
        Command::Todo { command } => run_todo(&store, command),
        Command::Note { command } => run_note(&store, command),
        Command::Path { from, to, max_depth } => {
            let paths = store.get_path(&from, &to, max_depth).map_err(|err| err.to_string())?;
            if paths.is_empty() {
                emit("no path found");
            }
            for path in paths {
                emit(&path.join(" -> "));
            }
            Ok(())
        }
        Command::Summary => {
            let summary = store.get_architecture_summary().map_err(|err| err.to_string())?;
            emit(&summary);
            Ok(())
        }
    }
}

// ============================================================================
// SECTION: Subverb Dispatch
// ============================================================================

/// Runs a trace subverb.
fn run_trace(store: &CodeStore, command: TraceCommand) -> Result<(), String> {
    match command {
        TraceCommand::Show { run_id, failures } => {
            let run_id = TraceRunId::new(run_id);
            let stats =
                store.get_trace_stats(Some(&run_id)).map_err(|err| err.to_string())?;
            emit(&format!(
                "calls: {}, exceptions: {}, max depth: {}",
                stats.call_count,
                stats.exception_count,
                stats.max_depth.unwrap_or(0)
            ));
            let calls = store
                .get_calls_for_run(&run_id, false, failures)
                .map_err(|err| err.to_string())?;
            for call in calls {
                let marker = if call.exception_type.is_some() { " !" } else { "" };
                emit(&format!(
                    "{}{} {}{}",
                    "  ".repeat(usize::try_from(call.depth).unwrap_or(0)),
                    call.function_name,
                    call.duration_ms
                        .map(|duration| format!("({duration:.1} ms)"))
                        .unwrap_or_default(),
                    marker
                ));
            }
            Ok(())
        }
        TraceCommand::List => {
            let stats = store.get_trace_stats(None).map_err(|err| err.to_string())?;
            emit(&format!(
                "runs: {}, calls: {}, exceptions: {}",
                stats.run_count.unwrap_or(0),
                stats.call_count,
                stats.exception_count
            ));
            for top in stats.top_functions {
                emit(&format!("  {} x{}", top.function, top.count));
            }
            Ok(())
        }
    }
}

/// Runs a TODO subverb.
fn run_todo(store: &CodeStore, command: TodoCommand) -> Result<(), String> {
    match command {
        TodoCommand::Add {
            prompt,
            title,
            context,
            priority,
            entity,
            file,
            tag,
            estimate,
            critical,
        } => {
            let todo = NewTodo {
                prompt,
                title,
                context,
                priority,
                entity_name: entity,
                file_path: file,
                tags: tag,
                metadata: None,
                estimated_minutes: estimate,
                critical,
            };
            let id = store.add_todo(&todo).map_err(|err| err.to_string())?;
            emit(&format!("added todo #{id}"));
            Ok(())
        }
        TodoCommand::List { all, critical, limit } => {
            let filter = TodoFilter { critical_only: critical, ..TodoFilter::default() };
            let todos =
                store.list_todos(&filter, limit, all).map_err(|err| err.to_string())?;
            if todos.is_empty() {
                emit("no todos");
            }
            for todo in todos {
                emit(&format!(
                    "#{} [{}] p{} {}",
                    todo.id,
                    todo.status,
                    todo.priority,
                    todo.title.as_deref().unwrap_or(&todo.prompt)
                ));
            }
            Ok(())
        }
        TodoCommand::Next => {
            match store.get_next_todo(true).map_err(|err| err.to_string())? {
                Some(todo) => emit(&format!("#{} {}", todo.id, todo.prompt)),
                None => emit("queue is empty"),
            }
            Ok(())
        }
        TodoCommand::Show { id } => {
            match store.get_todo(TodoId::new(id)).map_err(|err| err.to_string())? {
                Some(todo) => {
                    emit(&format!("#{} [{}] {}", todo.id, todo.status, todo.prompt));
                    if let Some(context) = todo.context {
                        emit(&context);
                    }
                }
                None => emit("not found"),
            }
            Ok(())
        }
        TodoCommand::Start { id } => {
            report_change(store.start_todo(TodoId::new(id)), "started")
        }
        TodoCommand::Done { id, notes, failed } => report_change(
            store.complete_todo(TodoId::new(id), notes.as_deref(), !failed),
            "completed",
        ),
        TodoCommand::Combine { keep, merge, prompt, title } => {
            let merge_ids: Vec<TodoId> = merge.into_iter().map(TodoId::new).collect();
            report_change(
                store.combine_todos(
                    TodoId::new(keep),
                    &merge_ids,
                    prompt.as_deref(),
                    title.as_deref(),
                ),
                "combined",
            )
        }
        TodoCommand::Move { id, position } => {
            report_change(store.reorder_todo(TodoId::new(id), position), "moved")
        }
        TodoCommand::Edit { id, title, prompt, context, priority } => {
            let update =
                TodoUpdate { title, prompt, context, priority, ..TodoUpdate::default() };
            report_change(store.update_todo(TodoId::new(id), &update), "updated")
        }
        TodoCommand::Delete { id } => {
            report_change(store.delete_todo(TodoId::new(id)), "deleted")
        }
        TodoCommand::Stats => {
            let stats = store.get_todo_stats().map_err(|err| err.to_string())?;
            emit(&format!(
                "pending: {}, in progress: {}, completed: {}, combined: {}, total: {}",
                stats.pending, stats.in_progress, stats.completed, stats.combined, stats.total
            ));
            Ok(())
        }
        TodoCommand::Search { query, limit } => {
            for todo in store.search_todos(&query, limit).map_err(|err| err.to_string())? {
                emit(&format!(
                    "#{} {}",
                    todo.id,
                    todo.title.as_deref().unwrap_or(&todo.prompt)
                ));
            }
            Ok(())
        }
    }
}

/// Runs a note subverb.
fn run_note(store: &CodeStore, command: NoteCommand) -> Result<(), String> {
    match command {
        NoteCommand::Add { content, r#type, title, entity } => {
            let note_type = NoteType::from_str(&r#type)?;
            let linked: Vec<EntityRef> =
                entity.into_iter().map(EntityRef::from).collect();
            let id = store
                .add_note(
                    &content,
                    note_type,
                    title.as_deref(),
                    Some("manual"),
                    &linked,
                    NoteLinkType::About,
                )
                .map_err(|err| err.to_string())?;
            emit(&format!("added note {id}"));
            Ok(())
        }
        NoteCommand::List { entity, r#type, status, limit } => {
            let note_type = r#type.as_deref().map(NoteType::from_str).transpose()?;
            let status = status.as_deref().map(NoteStatus::from_str).transpose()?;
            let notes = store
                .get_notes(entity.as_deref(), note_type, status, limit)
                .map_err(|err| err.to_string())?;
            for note in notes {
                emit(&format!(
                    "{} [{}/{}] {}",
                    note.id,
                    note.note_type,
                    note.status,
                    note.title.as_deref().unwrap_or("(untitled)")
                ));
            }
            Ok(())
        }
        NoteCommand::Show { id } => {
            match store.get_note(&NoteId::new(id)).map_err(|err| err.to_string())? {
                Some(note) => {
                    emit(&format!(
                        "{} [{}/{}] {}",
                        note.id,
                        note.note_type,
                        note.status,
                        note.title.as_deref().unwrap_or("(untitled)")
                    ));
                    emit(&note.content);
                }
                None => emit("not found"),
            }
            Ok(())
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Writes one line to stdout, ignoring broken pipes.
fn emit(line: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{line}");
}

/// Reports a mutation's outcome as a line or a not-found error.
fn report_change(result: Result<bool, StoreError>, verb: &str) -> Result<(), String> {
    match result {
        Ok(true) => {
            emit(verb);
            Ok(())
        }
        Ok(false) => Err("not found".to_string()),
        Err(err) => Err(err.to_string()),
    }
}

/// Opens the store for this invocation.
fn open_store(project: Option<&std::path::Path>) -> Result<CodeStore, String> {
    let start = std::env::current_dir().map_err(|err| err.to_string())?;
    let store_path = loom_config::discover_store(project, &start)
        .ok_or_else(|| "no .loom/store.db found; run `loom init` first".to_string())?;
    CodeStore::open(store_path).map_err(|err| err.to_string())
}

/// Resolves an entity name, preferring an exact match.
fn resolve_entity(store: &CodeStore, name: &str) -> Result<EntityId, String> {
    let candidates = store.find_entities(Some(name), None).map_err(|err| err.to_string())?;
    if candidates.is_empty() {
        return Err(format!("no entity matches '{name}'"));
    }
    for candidate in &candidates {
        if candidate.name == name {
            return Ok(candidate.id);
        }
    }
    Ok(candidates[0].id)
}

/// Parses an optional entity-kind argument.
fn parse_kind(kind: Option<&str>) -> Result<Option<EntityKind>, String> {
    kind.map(|text| EntityKind::from_str(text).map_err(|err| err.to_string()))
        .transpose()
}
