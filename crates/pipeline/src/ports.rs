//! Port traits: the capabilities the gatekeeper needs from the outside world.
//!
//! Infrastructure crates implement these; this crate never performs I/O
//! itself. Local, synchronous capabilities (git, the checked-out catalog, the
//! approval marker) are plain traits. Network capabilities are async and
//! dyn-compatible through [`async_trait`].
//!
//! In-memory implementations for tests live in [`crate::fakes`].

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::adjudication::AdjudicationRequest;
use crate::generation::GenerationRequest;
use crate::{ActorLogin, CatalogEntry, CommitSha, GitRef, PullRequestId, RepoPath, RepositoryId};

// ---------------------------------------------------------------------------
// Revision control
// ---------------------------------------------------------------------------

/// Failures of the revision-control capability.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The `git` executable could not be started.
    #[error("failed to run git: {0}")]
    Spawn(String),
    /// A git command exited non-zero.
    #[error("`git {command}` failed: {stderr}")]
    Command {
        /// The subcommand and arguments, space-joined.
        command: String,
        /// Captured standard error.
        stderr: String,
    },
    /// A revision could not be resolved.
    #[error("unknown revision `{0}`")]
    UnknownRevision(String),
    /// The working directory is not a git repository.
    #[error("not a git repository: {0}")]
    NotARepository(String),
    /// Git printed something that is not a usable path.
    #[error("unexpected git output: {0}")]
    Output(String),
}

/// Diff queries and the single commit a run may produce.
pub trait VersionControl: Send + Sync {
    /// Lowest common ancestor of `base` and `head`.
    fn merge_base(&self, base: &GitRef, head: &GitRef) -> Result<CommitSha, VcsError>;

    /// Every path changed between `base` and `head` (renames split into
    /// delete + add).
    fn changed_files(&self, base: &CommitSha, head: &GitRef) -> Result<Vec<RepoPath>, VcsError>;

    /// Paths added between `base` and `head`.
    fn added_files(&self, base: &CommitSha, head: &GitRef) -> Result<Vec<RepoPath>, VcsError>;

    /// Paths deleted between `base` and `head`.
    fn deleted_files(&self, base: &CommitSha, head: &GitRef) -> Result<Vec<RepoPath>, VcsError>;

    /// Stages `paths` (including deletions) and creates one commit.
    fn commit(
        &self,
        paths: &[RepoPath],
        message: &str,
        author: &ActorLogin,
    ) -> Result<CommitSha, VcsError>;

    /// Pushes the current branch to its upstream.
    fn push(&self) -> Result<(), VcsError>;
}

// ---------------------------------------------------------------------------
// Catalog persistence
// ---------------------------------------------------------------------------

/// Failures of the catalog store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error on `{path}`: {message}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying error text.
        message: String,
    },
    /// The file is not a mapping or a sequence of mappings.
    #[error("`{path}` could not be parsed: {message}")]
    Parse {
        /// File involved.
        path: String,
        /// Parser message.
        message: String,
    },
    /// A write targeted a position the file no longer has.
    #[error("`{path}` has {len} entries, cannot write position {index}")]
    IndexOutOfRange {
        /// File involved.
        path: String,
        /// Requested position.
        index: usize,
        /// Current number of entries.
        len: usize,
    },
    /// The file to create already exists.
    #[error("`{0}` already exists")]
    AlreadyExists(String),
}

/// One catalog file as an ordered sequence of raw entries.
///
/// Entries stay untyped here; they become [`CatalogEntry`] values only by
/// passing [`crate::schema::EntrySchema::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogFile {
    /// File path, relative to the repository root.
    pub path: RepoPath,
    /// Entries in file order.
    pub entries: Vec<Value>,
}

/// The checked-out catalog and neighbouring repository files.
///
/// Untouched entries must round-trip losslessly: only positions passed to
/// [`CatalogStore::replace_entry`] may change on disk.
pub trait CatalogStore: Send + Sync {
    /// Every file whose repository-relative path matches `pattern`, sorted.
    fn list_files(&self, pattern: &Regex) -> Result<Vec<RepoPath>, StoreError>;

    /// Loads one catalog file.
    fn load(&self, path: &RepoPath) -> Result<CatalogFile, StoreError>;

    /// Reads a text file; `Ok(None)` when it does not exist.
    fn read_text(&self, path: &RepoPath) -> Result<Option<String>, StoreError>;

    /// Returns `true` if `path` exists.
    fn exists(&self, path: &RepoPath) -> bool;

    /// Rewrites the entry at `index`, leaving every other entry untouched.
    fn replace_entry(
        &self,
        path: &RepoPath,
        index: usize,
        entry: &CatalogEntry,
    ) -> Result<(), StoreError>;

    /// Creates a new single-entry file; fails if it already exists.
    fn create_entry_file(&self, path: &RepoPath, entry: &CatalogEntry) -> Result<(), StoreError>;

    /// Removes a file.
    fn remove_file(&self, path: &RepoPath) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Approval marker
// ---------------------------------------------------------------------------

/// Failures updating the approval marker.
#[derive(Debug, Error)]
#[error("approval marker `{path}`: {message}")]
pub struct MarkerError {
    /// Marker path.
    pub path: String,
    /// Underlying error text.
    pub message: String,
}

/// The flag consumed by the downstream merge step. Only existence matters.
pub trait ApprovalMarker: Send + Sync {
    /// Creates the marker.
    fn set(&self) -> Result<(), MarkerError>;

    /// Removes the marker. An already-absent marker is success.
    fn clear(&self) -> Result<(), MarkerError>;

    /// Returns `true` if the marker exists.
    fn is_set(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Network services
// ---------------------------------------------------------------------------

/// Failures of an external HTTP service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Connection, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The service answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Response body (truncated by the adapter).
        body: String,
    },
    /// The service answered 2xx but the envelope is unusable.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// The adapter is not configured (e.g. missing API key).
    #[error("not configured: {0}")]
    NotConfigured(String),
}

/// Failures posting a PR comment. Logged, never fatal.
#[derive(Debug, Error)]
#[error("failed to post comment: {0}")]
pub struct CommentError(pub String);

/// Posts the run report to the pull request.
#[async_trait]
pub trait CommentSink: Send + Sync {
    /// Posts `body` as a new comment on `pr`.
    async fn post_comment(
        &self,
        repository: &RepositoryId,
        pr: PullRequestId,
        body: &str,
    ) -> Result<(), CommentError>;
}

/// The external policy adjudicator.
#[async_trait]
pub trait Adjudicator: Send + Sync {
    /// Submits the request once and returns the raw response text.
    ///
    /// The text is untrusted; [`crate::adjudication::parse_response`] decides
    /// whether any of it is used.
    async fn adjudicate(&self, request: &AdjudicationRequest) -> Result<String, ServiceError>;
}

/// Expands a bare URL into a full entry.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Returns the generated entry as an untrusted raw value.
    async fn generate_entry(&self, request: &GenerationRequest) -> Result<Value, ServiceError>;
}

/// Result of probing a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The URL answered with a status below 400.
    Reachable {
        /// Final HTTP status.
        code: u16,
    },
    /// The URL answered with an error status or not at all.
    Unreachable {
        /// HTTP status or transport error.
        reason: String,
    },
    /// Probing is disabled for this run.
    Skipped,
}

impl ProbeOutcome {
    /// One-line summary embedded in the adjudication request.
    pub fn summary(&self) -> String {
        match self {
            ProbeOutcome::Reachable { code } => format!("ok: HTTP {code}"),
            ProbeOutcome::Unreachable { reason } => format!("fail: {reason}"),
            ProbeOutcome::Skipped => "skipped".to_string(),
        }
    }

    /// Returns `true` for [`ProbeOutcome::Unreachable`].
    pub fn is_failure(&self) -> bool {
        matches!(self, ProbeOutcome::Unreachable { .. })
    }
}

/// Advisory reachability check.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Probes `url`. Never errors; failures are an outcome.
    async fn probe(&self, url: &str) -> ProbeOutcome;
}
