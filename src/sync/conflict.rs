//! Whole-record last-write-wins.

use crate::models::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedAction {
    /// No local copy; store the remote record as is, tombstones included.
    Insert,
    /// Remote is strictly newer; replace every local field.
    Overwrite,
    /// Local is newer or equal; keep it.
    Discard,
}

/// Decides what to do with a pulled record given the local copy, if any.
///
/// Equal timestamps keep the local version.
pub fn resolve(local: Option<&Task>, remote: &Task) -> ResolvedAction {
    match local {
        None => ResolvedAction::Insert,
        Some(local) if remote.last_modified > local.last_modified => ResolvedAction::Overwrite,
        Some(_) => ResolvedAction::Discard,
    }
}
