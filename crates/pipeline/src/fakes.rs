//! In-memory fakes for the port traits (testing only).
//!
//! Provides a scripted git, an in-memory catalog, a marker flag, a recording
//! comment sink and scripted network services, so the whole run can be
//! exercised without a checkout or network access.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::adjudication::AdjudicationRequest;
use crate::generation::GenerationRequest;
use crate::ports::*;
use crate::{ActorLogin, CatalogEntry, CommitSha, GitRef, PullRequestId, RepoPath, RepositoryId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn path(p: &str) -> RepoPath {
    RepoPath::new(p).expect("fake paths must be non-empty")
}

// ---------------------------------------------------------------------------
// FakeVersionControl
// ---------------------------------------------------------------------------

/// A commit recorded by [`FakeVersionControl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommit {
    /// Paths staged.
    pub paths: Vec<RepoPath>,
    /// Commit message.
    pub message: String,
    /// Commit author.
    pub author: ActorLogin,
}

/// Scripted diff plus a log of commits and pushes.
#[derive(Debug, Default)]
pub struct FakeVersionControl {
    added: Vec<RepoPath>,
    modified: Vec<RepoPath>,
    deleted: Vec<RepoPath>,
    missing_base: bool,
    fail_commit: bool,
    fail_push: bool,
    merge_base_calls: AtomicUsize,
    commits: Mutex<Vec<RecordedCommit>>,
    pushes: AtomicUsize,
}

impl FakeVersionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds paths reported as added.
    pub fn with_added<'a>(mut self, paths: impl IntoIterator<Item = &'a str>) -> Self {
        self.added.extend(paths.into_iter().map(path));
        self
    }

    /// Adds paths reported as modified.
    pub fn with_modified<'a>(mut self, paths: impl IntoIterator<Item = &'a str>) -> Self {
        self.modified.extend(paths.into_iter().map(path));
        self
    }

    /// Adds paths reported as deleted.
    pub fn with_deleted<'a>(mut self, paths: impl IntoIterator<Item = &'a str>) -> Self {
        self.deleted.extend(paths.into_iter().map(path));
        self
    }

    /// Makes `merge_base` fail as if the base ref were missing.
    pub fn with_missing_base(mut self) -> Self {
        self.missing_base = true;
        self
    }

    /// Makes `commit` fail.
    pub fn with_failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// Makes `push` fail.
    pub fn with_failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    pub fn merge_base_calls(&self) -> usize {
        self.merge_base_calls.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> Vec<RecordedCommit> {
        lock(&self.commits).clone()
    }

    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }
}

impl VersionControl for FakeVersionControl {
    fn merge_base(&self, base: &GitRef, _head: &GitRef) -> Result<CommitSha, VcsError> {
        self.merge_base_calls.fetch_add(1, Ordering::SeqCst);
        if self.missing_base {
            return Err(VcsError::UnknownRevision(base.to_string()));
        }
        CommitSha::new("0000000000000000000000000000000000000000")
            .ok_or_else(|| VcsError::Output("empty sha".into()))
    }

    fn changed_files(&self, _base: &CommitSha, _head: &GitRef) -> Result<Vec<RepoPath>, VcsError> {
        Ok(self
            .added
            .iter()
            .chain(&self.modified)
            .chain(&self.deleted)
            .cloned()
            .collect())
    }

    fn added_files(&self, _base: &CommitSha, _head: &GitRef) -> Result<Vec<RepoPath>, VcsError> {
        Ok(self.added.clone())
    }

    fn deleted_files(&self, _base: &CommitSha, _head: &GitRef) -> Result<Vec<RepoPath>, VcsError> {
        Ok(self.deleted.clone())
    }

    fn commit(
        &self,
        paths: &[RepoPath],
        message: &str,
        author: &ActorLogin,
    ) -> Result<CommitSha, VcsError> {
        if self.fail_commit {
            return Err(VcsError::Command {
                command: "commit".into(),
                stderr: "simulated commit failure".into(),
            });
        }
        let mut commits = lock(&self.commits);
        commits.push(RecordedCommit {
            paths: paths.to_vec(),
            message: message.to_string(),
            author: author.clone(),
        });
        CommitSha::new(format!("{:040x}", commits.len()))
            .ok_or_else(|| VcsError::Output("empty sha".into()))
    }

    fn push(&self) -> Result<(), VcsError> {
        if self.fail_push {
            return Err(VcsError::Command {
                command: "push".into(),
                stderr: "simulated push rejection".into(),
            });
        }
        self.pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryCatalogStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum StoredFile {
    Entries(Vec<Value>),
    Text(String),
}

/// In-memory repository tree of catalog files and plain text files.
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    files: Mutex<BTreeMap<RepoPath, StoredFile>>,
    written: Mutex<BTreeSet<RepoPath>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a catalog file holding `entries`.
    pub fn with_entries(self, file: &str, entries: Vec<Value>) -> Self {
        lock(&self.files).insert(path(file), StoredFile::Entries(entries));
        self
    }

    /// Adds a plain text file.
    pub fn with_text(self, file: &str, text: &str) -> Self {
        lock(&self.files).insert(path(file), StoredFile::Text(text.to_string()));
        self
    }

    /// Current entries of a catalog file.
    pub fn entries(&self, file: &str) -> Option<Vec<Value>> {
        match lock(&self.files).get(&path(file)) {
            Some(StoredFile::Entries(entries)) => Some(entries.clone()),
            _ => None,
        }
    }

    /// Paths that were created, rewritten or removed.
    pub fn written(&self) -> BTreeSet<RepoPath> {
        lock(&self.written).clone()
    }
}

impl CatalogStore for MemoryCatalogStore {
    fn list_files(&self, pattern: &Regex) -> Result<Vec<RepoPath>, StoreError> {
        Ok(lock(&self.files)
            .keys()
            .filter(|p| pattern.is_match(p.as_str()))
            .cloned()
            .collect())
    }

    fn load(&self, file: &RepoPath) -> Result<CatalogFile, StoreError> {
        match lock(&self.files).get(file) {
            Some(StoredFile::Entries(entries)) => Ok(CatalogFile {
                path: file.clone(),
                entries: entries.clone(),
            }),
            Some(StoredFile::Text(_)) => Err(StoreError::Parse {
                path: file.to_string(),
                message: "not a catalog file".into(),
            }),
            None => Err(StoreError::Io {
                path: file.to_string(),
                message: "not found".into(),
            }),
        }
    }

    fn read_text(&self, file: &RepoPath) -> Result<Option<String>, StoreError> {
        match lock(&self.files).get(file) {
            Some(StoredFile::Text(text)) => Ok(Some(text.clone())),
            Some(StoredFile::Entries(entries)) => serde_json::to_string(entries)
                .map(Some)
                .map_err(|e| StoreError::Parse {
                    path: file.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn exists(&self, file: &RepoPath) -> bool {
        lock(&self.files).contains_key(file)
    }

    fn replace_entry(
        &self,
        file: &RepoPath,
        index: usize,
        entry: &CatalogEntry,
    ) -> Result<(), StoreError> {
        let mut files = lock(&self.files);
        let Some(StoredFile::Entries(entries)) = files.get_mut(file) else {
            return Err(StoreError::Io {
                path: file.to_string(),
                message: "not found".into(),
            });
        };
        let len = entries.len();
        let slot = entries.get_mut(index).ok_or(StoreError::IndexOutOfRange {
            path: file.to_string(),
            index,
            len,
        })?;
        *slot = serde_json::to_value(entry).map_err(|e| StoreError::Parse {
            path: file.to_string(),
            message: e.to_string(),
        })?;
        lock(&self.written).insert(file.clone());
        Ok(())
    }

    fn create_entry_file(&self, file: &RepoPath, entry: &CatalogEntry) -> Result<(), StoreError> {
        let mut files = lock(&self.files);
        if files.contains_key(file) {
            return Err(StoreError::AlreadyExists(file.to_string()));
        }
        let value = serde_json::to_value(entry).map_err(|e| StoreError::Parse {
            path: file.to_string(),
            message: e.to_string(),
        })?;
        files.insert(file.clone(), StoredFile::Entries(vec![value]));
        lock(&self.written).insert(file.clone());
        Ok(())
    }

    fn remove_file(&self, file: &RepoPath) -> Result<(), StoreError> {
        lock(&self.files).remove(file);
        lock(&self.written).insert(file.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryApprovalMarker
// ---------------------------------------------------------------------------

/// Approval marker held in memory.
#[derive(Debug, Default)]
pub struct MemoryApprovalMarker {
    present: AtomicBool,
    failing: bool,
}

impl MemoryApprovalMarker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with a stale marker from a previous run.
    pub fn already_set() -> Self {
        Self {
            present: AtomicBool::new(true),
            failing: false,
        }
    }

    /// Every update fails.
    pub fn failing() -> Self {
        Self {
            present: AtomicBool::new(false),
            failing: true,
        }
    }

    fn error(&self) -> MarkerError {
        MarkerError {
            path: ".github/ai_review/APPROVED".into(),
            message: "simulated failure".into(),
        }
    }
}

impl ApprovalMarker for MemoryApprovalMarker {
    fn set(&self) -> Result<(), MarkerError> {
        if self.failing {
            return Err(self.error());
        }
        self.present.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self) -> Result<(), MarkerError> {
        if self.failing {
            return Err(self.error());
        }
        self.present.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_set(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// RecordingCommentSink
// ---------------------------------------------------------------------------

/// Records every posted comment.
#[derive(Debug, Default)]
pub struct RecordingCommentSink {
    comments: Mutex<Vec<String>>,
    failing: bool,
}

impl RecordingCommentSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every post fails (after being recorded).
    pub fn failing() -> Self {
        Self {
            comments: Mutex::default(),
            failing: true,
        }
    }

    pub fn comments(&self) -> Vec<String> {
        lock(&self.comments).clone()
    }
}

#[async_trait]
impl CommentSink for RecordingCommentSink {
    async fn post_comment(
        &self,
        _repository: &RepositoryId,
        _pr: PullRequestId,
        body: &str,
    ) -> Result<(), CommentError> {
        lock(&self.comments).push(body.to_string());
        if self.failing {
            return Err(CommentError("simulated outage".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted services
// ---------------------------------------------------------------------------

/// Adjudicator returning a fixed reply and recording requests.
#[derive(Debug)]
pub struct ScriptedAdjudicator {
    reply: Result<String, u16>,
    requests: Mutex<Vec<AdjudicationRequest>>,
}

impl ScriptedAdjudicator {
    /// Answers every request with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            reply: Ok(text.into()),
            requests: Mutex::default(),
        }
    }

    /// Answers every request with HTTP `status`.
    pub fn failing(status: u16) -> Self {
        Self {
            reply: Err(status),
            requests: Mutex::default(),
        }
    }

    pub fn requests(&self) -> Vec<AdjudicationRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl Adjudicator for ScriptedAdjudicator {
    async fn adjudicate(&self, request: &AdjudicationRequest) -> Result<String, ServiceError> {
        lock(&self.requests).push(request.clone());
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(ServiceError::Status {
                status: *status,
                body: "scripted failure".into(),
            }),
        }
    }
}

/// Generator returning a fixed entry and recording requests.
#[derive(Debug)]
pub struct ScriptedGenerator {
    reply: Option<Value>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    /// Answers every request with `entry`.
    pub fn replying(entry: Value) -> Self {
        Self {
            reply: Some(entry),
            requests: Mutex::default(),
        }
    }

    /// Fails every request.
    pub fn failing() -> Self {
        Self {
            reply: None,
            requests: Mutex::default(),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate_entry(&self, request: &GenerationRequest) -> Result<Value, ServiceError> {
        lock(&self.requests).push(request.clone());
        self.reply
            .clone()
            .ok_or_else(|| ServiceError::Transport("scripted failure".into()))
    }
}

/// Probe answering from a fixed table; unknown URLs are reachable.
#[derive(Debug, Default)]
pub struct StaticProbe {
    outcomes: BTreeMap<String, ProbeOutcome>,
    probed: Mutex<Vec<String>>,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the outcome for `url`.
    pub fn with(mut self, url: &str, outcome: ProbeOutcome) -> Self {
        self.outcomes.insert(url.to_string(), outcome);
        self
    }

    pub fn probed(&self) -> Vec<String> {
        lock(&self.probed).clone()
    }
}

#[async_trait]
impl ReachabilityProbe for StaticProbe {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        lock(&self.probed).push(url.to_string());
        self.outcomes
            .get(url)
            .cloned()
            .unwrap_or(ProbeOutcome::Reachable { code: 200 })
    }
}
