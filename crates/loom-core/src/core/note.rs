// crates/loom-core/src/core/note.rs
// ============================================================================
// Module: Loom Note Model
// Description: Knowledge-base notes and note-entity links.
// Purpose: Represent analysis, hypotheses, intents, and bugs recorded about code.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Notes capture what humans and LLMs learn about the codebase: analysis
//! results, hypotheses under investigation, intent descriptions, decisions,
//! and bug reports. Notes link to entities through typed links. Hypothesis
//! notes move `active -> {confirmed, refuted}` by convention, but the store
//! does not enforce a state machine beyond the enum.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::NoteId;

// ============================================================================
// SECTION: Note Enums
// ============================================================================

/// The category of a knowledge-base note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    /// Analysis of existing behavior.
    Analysis,
    /// Statement of intended behavior.
    Intent,
    /// A hypothesis to confirm or refute.
    Hypothesis,
    /// A free-form todo remark (distinct from the TODO queue).
    Todo,
    /// A recorded decision.
    Decision,
    /// A bug report.
    Bug,
}

impl NoteType {
    /// Returns the stable wire name stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Intent => "intent",
            Self::Hypothesis => "hypothesis",
            Self::Todo => "todo",
            Self::Decision => "decision",
            Self::Bug => "bug",
        }
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "analysis" => Ok(Self::Analysis),
            "intent" => Ok(Self::Intent),
            "hypothesis" => Ok(Self::Hypothesis),
            "todo" => Ok(Self::Todo),
            "decision" => Ok(Self::Decision),
            "bug" => Ok(Self::Bug),
            other => Err(format!("unknown note type: {other}")),
        }
    }
}

/// The lifecycle status of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    /// Default status for new notes.
    Active,
    /// Hypothesis confirmed by evidence.
    Confirmed,
    /// Hypothesis refuted by evidence.
    Refuted,
}

impl NoteStatus {
    /// Returns the stable wire name stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Confirmed => "confirmed",
            Self::Refuted => "refuted",
        }
    }
}

impl fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "confirmed" => Ok(Self::Confirmed),
            "refuted" => Ok(Self::Refuted),
            other => Err(format!("unknown note status: {other}")),
        }
    }
}

/// How a note relates to a linked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteLinkType {
    /// The note is about the entity.
    About,
    /// The note describes something affecting the entity.
    Affects,
    /// The note explains the entity.
    Explains,
    /// The note describes tests for the entity.
    Tests,
}

impl NoteLinkType {
    /// Returns the stable wire name stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::About => "about",
            Self::Affects => "affects",
            Self::Explains => "explains",
            Self::Tests => "tests",
        }
    }
}

impl fmt::Display for NoteLinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteLinkType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "about" => Ok(Self::About),
            "affects" => Ok(Self::Affects),
            "explains" => Ok(Self::Explains),
            "tests" => Ok(Self::Tests),
            other => Err(format!("unknown note link type: {other}")),
        }
    }
}

// ============================================================================
// SECTION: Note Records
// ============================================================================

/// A knowledge-base note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Note identifier (UUID string).
    pub id: NoteId,
    /// Note category.
    pub note_type: NoteType,
    /// Optional display title.
    pub title: Option<String>,
    /// Note body.
    pub content: String,
    /// Creation timestamp (ISO-8601 UTC).
    pub created_at: String,
    /// Origin of the note (file path, session id, or "manual").
    pub source: Option<String>,
    /// Lifecycle status.
    pub status: NoteStatus,
}

/// A note joined to the link type binding it to a particular entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedNote {
    /// The note itself.
    pub note: Note,
    /// How the note relates to the entity it was queried for.
    pub link_type: NoteLinkType,
}

/// Aggregate counts over the notes table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteStats {
    /// Note counts keyed by type wire name.
    pub by_type: BTreeMap<String, i64>,
    /// Note counts keyed by status wire name.
    pub by_status: BTreeMap<String, i64>,
    /// Total number of notes.
    pub total: i64,
    /// Number of notes with at least one entity link.
    pub linked: i64,
}
