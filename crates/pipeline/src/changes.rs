//! The set of files a pull request touches.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ports::{VcsError, VersionControl};
use crate::{GitRef, RepoPath};

/// Files changed between the merge base and the PR head.
///
/// Derived fresh on every run and never persisted. Renames are reported as a
/// deletion plus an addition so both paths are scope-checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Paths that do not exist at the merge base.
    pub added: BTreeSet<RepoPath>,
    /// Paths that exist on both sides with different content.
    pub modified: BTreeSet<RepoPath>,
    /// Paths that exist at the merge base but not at the head.
    pub deleted: BTreeSet<RepoPath>,
}

impl ChangeSet {
    /// Builds a change set from the full changed list plus the added and
    /// deleted subsets; everything else counts as modified.
    pub fn from_lists(
        changed: impl IntoIterator<Item = RepoPath>,
        added: impl IntoIterator<Item = RepoPath>,
        deleted: impl IntoIterator<Item = RepoPath>,
    ) -> Self {
        let added: BTreeSet<RepoPath> = added.into_iter().collect();
        let deleted: BTreeSet<RepoPath> = deleted.into_iter().collect();
        let modified = changed
            .into_iter()
            .filter(|p| !added.contains(p) && !deleted.contains(p))
            .collect();
        Self {
            added,
            modified,
            deleted,
        }
    }

    /// Asks `vcs` for the changes between the merge base of `base`/`head` and
    /// `head`.
    pub fn inspect(
        vcs: &dyn VersionControl,
        base: &GitRef,
        head: &GitRef,
    ) -> Result<Self, VcsError> {
        let merge_base = vcs.merge_base(base, head)?;
        let changed = vcs.changed_files(&merge_base, head)?;
        let added = vcs.added_files(&merge_base, head)?;
        let deleted = vcs.deleted_files(&merge_base, head)?;
        let set = Self::from_lists(changed, added, deleted);
        debug!(
            merge_base = %merge_base,
            added = set.added.len(),
            modified = set.modified.len(),
            deleted = set.deleted.len(),
            "Inspected pull request diff"
        );
        Ok(set)
    }

    /// Every changed path, in order.
    pub fn changed(&self) -> BTreeSet<RepoPath> {
        self.added
            .iter()
            .chain(&self.modified)
            .chain(&self.deleted)
            .cloned()
            .collect()
    }

    /// Returns `true` if `path` was touched in any way.
    pub fn contains(&self, path: &RepoPath) -> bool {
        self.added.contains(path) || self.modified.contains(path) || self.deleted.contains(path)
    }

    /// Returns `true` if `path` was deleted.
    pub fn is_deleted(&self, path: &RepoPath) -> bool {
        self.deleted.contains(path)
    }

    /// Returns `true` if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}
