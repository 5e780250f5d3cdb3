// crates/loom-core/src/core/time.rs
// ============================================================================
// Module: Loom Time Helpers
// Description: Canonical timestamp formatting for persisted records.
// Purpose: Keep every stored timestamp in one sortable ISO-8601 UTC form.
// Dependencies: chrono
// ============================================================================

//! ## Overview
//! Loom persists timestamps as ISO-8601 UTC strings. String timestamps sort
//! lexicographically in chronological order, which the store relies on for
//! `ORDER BY started_at` and friends.

// ============================================================================
// SECTION: Imports
// ============================================================================

use chrono::SecondsFormat;
use chrono::Utc;

// ============================================================================
// SECTION: Formatting
// ============================================================================

/// Returns the current UTC time as an ISO-8601 string with microseconds.
///
/// # Invariants
/// - Output sorts lexicographically in chronological order.
#[must_use]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Returns the UTC time `days` days before now, in the same ISO-8601 form.
///
/// Used by retention operations (`clear_old_failures`,
/// `clear_completed_todos`) to compute cutoffs comparable with stored
/// timestamps.
#[must_use]
pub fn days_ago_iso8601(days: i64) -> String {
    (Utc::now() - chrono::Duration::days(days)).to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::days_ago_iso8601;
    use super::now_iso8601;

    #[test]
    fn timestamps_sort_chronologically() {
        let earlier = days_ago_iso8601(1);
        let now = now_iso8601();
        assert!(earlier < now);
    }

    #[test]
    fn timestamp_is_utc_tagged() {
        assert!(now_iso8601().ends_with('Z'));
    }
}
