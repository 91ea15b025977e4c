//! [`VersionControl`] over the `git` executable.
//!
//! Every diff is taken against the merge base of the integration branch and
//! the PR head, never a two-dot diff, so commits landing on the base branch
//! during the PR's lifetime are excluded. Renames are disabled so both the
//! old and the new path are scope-checked.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, instrument};

use pipeline::ports::{VcsError, VersionControl};
use pipeline::{ActorLogin, CommitSha, GitRef, RepoPath};

/// Runs `git` in a checked-out repository.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_root: PathBuf,
}

impl GitCli {
    /// Creates an adapter rooted at `repo_root`.
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    /// The repository root.
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn git(&self, args: &[&str]) -> Result<Vec<u8>, VcsError> {
        self.git_with(&[], args)
    }

    fn git_with(&self, config: &[String], args: &[&str]) -> Result<Vec<u8>, VcsError> {
        let mut cmd = Command::new("git");
        for kv in config {
            cmd.arg("-c").arg(kv);
        }
        let output = cmd
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .map_err(|e| VcsError::Spawn(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("not a git repository") {
                return Err(VcsError::NotARepository(self.repo_root.display().to_string()));
            }
            return Err(VcsError::Command {
                command: args.join(" "),
                stderr,
            });
        }
        Ok(output.stdout)
    }

    /// Runs a `-z` path listing and parses the NUL-separated output.
    fn paths(&self, args: &[&str]) -> Result<Vec<RepoPath>, VcsError> {
        let stdout = self.git(args)?;
        let mut paths = Vec::new();
        for raw in stdout.split(|b| *b == 0).filter(|s| !s.is_empty()) {
            let text = std::str::from_utf8(raw)
                .map_err(|_| VcsError::Output(String::from_utf8_lossy(raw).into_owned()))?;
            let path = RepoPath::new(text).ok_or_else(|| VcsError::Output(text.to_string()))?;
            paths.push(path);
        }
        Ok(paths)
    }

    fn diff(
        &self,
        base: &CommitSha,
        head: &GitRef,
        filter: Option<&str>,
    ) -> Result<Vec<RepoPath>, VcsError> {
        let mut args = vec!["diff", "--name-only", "--no-renames", "-z"];
        let filter_arg;
        if let Some(filter) = filter {
            filter_arg = format!("--diff-filter={filter}");
            args.push(&filter_arg);
        }
        args.push(base.as_str());
        args.push(head.as_str());
        args.push("--");
        self.paths(&args)
    }

    /// Reads `path` as committed at `rev`, ignoring the working tree.
    ///
    /// `Ok(None)` when the file does not exist at `rev`; an unresolvable
    /// `rev` is [`VcsError::UnknownRevision`].
    #[instrument(skip_all, fields(rev = %rev, path = %path))]
    pub fn read_at(&self, rev: &GitRef, path: &RepoPath) -> Result<Option<String>, VcsError> {
        let commit = self.rev_parse(rev.as_str())?;
        let object = format!("{commit}:{}", path.as_str());
        match self.git(&["cat-file", "-e", &object]) {
            Ok(_) => {}
            Err(VcsError::Command { .. }) => return Ok(None),
            Err(other) => return Err(other),
        }
        let blob = self.git(&["cat-file", "blob", &object])?;
        String::from_utf8(blob)
            .map(Some)
            .map_err(|_| VcsError::Output(format!("{object} is not UTF-8")))
    }

    fn rev_parse(&self, rev: &str) -> Result<String, VcsError> {
        let spec = format!("{rev}^{{commit}}");
        match self.git(&["rev-parse", "--verify", "--quiet", &spec]) {
            Ok(out) => Ok(String::from_utf8_lossy(&out).trim().to_string()),
            Err(VcsError::Command { .. }) => Err(VcsError::UnknownRevision(rev.to_string())),
            Err(other) => Err(other),
        }
    }
}

impl VersionControl for GitCli {
    #[instrument(skip_all, fields(base = %base, head = %head))]
    fn merge_base(&self, base: &GitRef, head: &GitRef) -> Result<CommitSha, VcsError> {
        self.rev_parse(base.as_str())?;
        self.rev_parse(head.as_str())?;
        let out = self.git(&["merge-base", base.as_str(), head.as_str()])?;
        let sha = String::from_utf8_lossy(&out).trim().to_string();
        debug!(%sha, "Resolved merge base");
        CommitSha::new(sha).ok_or_else(|| VcsError::Output("empty merge-base output".into()))
    }

    fn changed_files(&self, base: &CommitSha, head: &GitRef) -> Result<Vec<RepoPath>, VcsError> {
        self.diff(base, head, None)
    }

    fn added_files(&self, base: &CommitSha, head: &GitRef) -> Result<Vec<RepoPath>, VcsError> {
        self.diff(base, head, Some("A"))
    }

    fn deleted_files(&self, base: &CommitSha, head: &GitRef) -> Result<Vec<RepoPath>, VcsError> {
        self.diff(base, head, Some("D"))
    }

    #[instrument(skip(self, paths), fields(files = paths.len()))]
    fn commit(
        &self,
        paths: &[RepoPath],
        message: &str,
        author: &ActorLogin,
    ) -> Result<CommitSha, VcsError> {
        let mut add = vec!["add", "-A", "--"];
        add.extend(paths.iter().map(RepoPath::as_str));
        self.git(&add)?;

        let identity = [
            format!("user.name={author}"),
            format!("user.email={author}@users.noreply.github.com"),
        ];
        self.git_with(&identity, &["commit", "-m", message])?;

        let sha = self.rev_parse("HEAD")?;
        CommitSha::new(sha).ok_or_else(|| VcsError::Output("empty HEAD sha".into()))
    }

    #[instrument(skip(self))]
    fn push(&self) -> Result<(), VcsError> {
        self.git(&["push"]).map(|_| ())
    }
}
