// crates/loom-config/src/lib.rs
// ============================================================================
// Module: Loom Config
// Description: Active-project bookkeeping and store discovery.
// Purpose: Resolve which project's store a command should open.
// Dependencies: directories
// ============================================================================

//! ## Overview
//! Loom keeps a process-local pointer to the most recently used project in
//! `<user-config>/loom/active_project` (a one-line absolute path). Store
//! discovery follows a fixed precedence: explicit argument (which also
//! becomes the active project), then the active-project file, then an
//! upward search for `.loom/store.db` from the current directory. A stale
//! active project (no store under it) reads as absent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use directories::BaseDirs;

// ============================================================================
// SECTION: Paths
// ============================================================================

/// Directory name holding the store inside a project root.
pub const LOOM_DIR: &str = ".loom";
/// Store database file name.
pub const STORE_FILE: &str = "store.db";

/// Returns the store path for a project root (`<root>/.loom/store.db`).
#[must_use]
pub fn store_path_for(project_root: &Path) -> PathBuf {
    project_root.join(LOOM_DIR).join(STORE_FILE)
}

/// Returns the active-project pointer file path, when a config dir exists.
#[must_use]
pub fn active_project_file() -> Option<PathBuf> {
    let base = BaseDirs::new()?;
    Some(base.config_dir().join("loom").join("active_project"))
}

// ============================================================================
// SECTION: Active Project
// ============================================================================

/// Returns the active project root, when set and still holding a store.
#[must_use]
pub fn get_active_project() -> Option<PathBuf> {
    let pointer = active_project_file()?;
    let text = std::fs::read_to_string(pointer).ok()?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let root = PathBuf::from(trimmed);
    if store_path_for(&root).exists() { Some(root) } else { None }
}

/// Records a project root as the active project.
///
/// # Errors
///
/// Returns an [`std::io::Error`] when the pointer file cannot be written.
pub fn set_active_project(project_root: &Path) -> std::io::Result<()> {
    let Some(pointer) = active_project_file() else {
        return Err(std::io::Error::other("no user config directory available"));
    };
    if let Some(parent) = pointer.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let absolute = project_root
        .canonicalize()
        .unwrap_or_else(|_| project_root.to_path_buf());
    std::fs::write(pointer, absolute.display().to_string())
}

/// Clears the active-project pointer.
pub fn clear_active_project() {
    if let Some(pointer) = active_project_file() {
        let _ = std::fs::remove_file(pointer);
    }
}

// ============================================================================
// SECTION: Discovery
// ============================================================================

/// Finds the store to open.
///
/// Precedence: explicit project root (recorded as active on success), then
/// the active-project pointer, then an upward search for `.loom/store.db`
/// starting at `start_dir`.
#[must_use]
pub fn discover_store(explicit: Option<&Path>, start_dir: &Path) -> Option<PathBuf> {
    if let Some(root) = explicit {
        let store = store_path_for(root);
        if store.exists() {
            let _ = set_active_project(root);
            return Some(store);
        }
        return None;
    }

    if let Some(active) = get_active_project() {
        let store = store_path_for(&active);
        if store.exists() {
            return Some(store);
        }
    }

    let mut current = Some(start_dir);
    while let Some(dir) = current {
        let store = store_path_for(dir);
        if store.exists() {
            return Some(store);
        }
        current = dir.parent();
    }
    None
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::discover_store;
    use super::store_path_for;

    #[test]
    fn store_path_nests_under_loom_dir() {
        assert_eq!(
            store_path_for(Path::new("/work/project")),
            Path::new("/work/project/.loom/store.db")
        );
    }

    #[test]
    fn explicit_path_without_store_yields_none() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!("tempdir"));
        assert!(discover_store(Some(dir.path()), dir.path()).is_none());
    }

    #[test]
    fn upward_search_finds_parent_store() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!("tempdir"));
        let store = store_path_for(dir.path());
        std::fs::create_dir_all(store.parent().unwrap_or(dir.path())).unwrap_or(());
        std::fs::write(&store, b"").unwrap_or(());
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap_or(());
        assert_eq!(discover_store(None, &nested), Some(store));
    }
}
