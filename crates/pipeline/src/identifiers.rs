//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! a [`RepoPath`] with a [`GitRef`] even though both are strings under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: GitHub-integer-backed
// ---------------------------------------------------------------------------

/// Identifies the pull request a run is gating.
///
/// Wraps the PR number assigned by the hosting platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullRequestId(u64);

impl PullRequestId {
    /// Creates a new identifier from a raw integer.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PullRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single gatekeeper run (one CLI invocation).
///
/// Generated fresh for every invocation; propagated through spans so all
/// activity from a single run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineRunId(Uuid);

impl PipelineRunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`PipelineRunId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for PipelineRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed (configuration / Git names)
// ---------------------------------------------------------------------------

string_id! {
    /// A Git revision expression (e.g. `"origin/main"`, `"HEAD"`, a SHA).
    GitRef
}

string_id! {
    /// A Git commit SHA (40-character lowercase hex string).
    CommitSha
}

string_id! {
    /// Identifies a GitHub repository in `"owner/repo"` format.
    RepositoryId
}

string_id! {
    /// A login name on the hosting platform (PR author, bot account, maintainer).
    ActorLogin
}

string_id! {
    /// A file-system path relative to the repository root, always `/`-separated.
    ///
    /// Used for every path that crosses a port boundary: changed files,
    /// catalog files, the submission file and the approval marker.
    RepoPath
}

impl RepoPath {
    /// Returns `true` if this path equals `prefix` or lies underneath it.
    ///
    /// `prefix` is matched on whole path segments, so `ai/` covers
    /// `ai/policy.yml` but `ai` does not cover `aim.txt`.
    pub fn is_under(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return false;
        }
        self.0 == prefix
            || self
                .0
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_ids_are_rejected() {
        assert!(RepoPath::new("").is_none());
        assert!(ActorLogin::new("").is_none());
    }

    #[test]
    fn is_under_matches_whole_segments() {
        let path = RepoPath::new("ai/policy.yml").unwrap();
        assert!(path.is_under("ai/"));
        assert!(path.is_under("ai"));
        assert!(!RepoPath::new("aim.txt").unwrap().is_under("ai"));
        assert!(!path.is_under(""));
    }

    #[test]
    fn pull_request_displays_with_hash() {
        assert_eq!(PullRequestId::new(42).to_string(), "#42");
    }
}
