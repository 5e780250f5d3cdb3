// crates/loom-cli/src/main_tests.rs
// ============================================================================
// Module: Loom CLI Unit Tests
// Description: Argument parsing and helper coverage.
// Purpose: Keep the verb surface stable.
// ============================================================================

//! Unit tests for CLI parsing and helpers.

use clap::CommandFactory;
use clap::Parser;

use super::Cli;
use super::Command;
use super::parse_kind;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn ingest_accepts_paths_and_excludes() {
    let cli = Cli::parse_from(["loom", "ingest", "src", "--exclude", "vendor"]);
    match cli.command {
        Command::Ingest { paths, exclude } => {
            assert_eq!(paths.len(), 1);
            assert_eq!(exclude, vec!["vendor".to_string()]);
        }
        other => unreachable!("parsed wrong verb: {other:?}"),
    }
}

#[test]
fn todo_combine_requires_merge_ids() {
    assert!(Cli::try_parse_from(["loom", "todo", "combine", "1"]).is_err());
    assert!(Cli::try_parse_from(["loom", "todo", "combine", "1", "2", "3"]).is_ok());
}

#[test]
fn kind_parsing_accepts_wire_names_only() {
    assert!(parse_kind(None).is_ok_and(|kind| kind.is_none()));
    assert!(parse_kind(Some("method")).is_ok_and(|kind| kind.is_some()));
    assert!(parse_kind(Some("widget")).is_err());
}
