//! The explicit, immutable run context.
//!
//! Everything that would otherwise be read ad hoc from the environment
//! (actor identity, feature flags, file layout) is resolved once by the
//! composition root and handed to the classifier and the executor here. This
//! keeps the shape decision table pure and unit-testable.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{ActorLogin, GitRef, PipelineRunId, PullRequestId, RepoPath, RepositoryId};

/// Whether accepted fixes are written back to the PR branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewMode {
    /// Post the review; never rewrite entries.
    #[default]
    CommentOnly,
    /// Apply accepted `proposed_entry` values in a single commit.
    Autofix,
}

impl std::str::FromStr for ReviewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "comment-only" => Ok(ReviewMode::CommentOnly),
            "autofix" => Ok(ReviewMode::Autofix),
            other => Err(format!(
                "unknown review mode `{other}` (expected comment-only or autofix)"
            )),
        }
    }
}

/// Feature switches for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFlags {
    /// Issue a `HEAD` request per URL and report the result.
    pub probe_urls: bool,
    /// Expand contributor submissions into full entries.
    pub generate_entries: bool,
    /// Whether accepted fixes are applied.
    pub review_mode: ReviewMode,
    /// Push the commit after creating it.
    pub push_commits: bool,
}

impl Default for RunFlags {
    fn default() -> Self {
        Self {
            probe_urls: true,
            generate_entries: false,
            review_mode: ReviewMode::CommentOnly,
            push_commits: true,
        }
    }
}

/// Repository layout the gatekeeper relies on.
#[derive(Debug, Clone)]
pub struct CatalogPaths {
    /// The single-URL contributor submission file.
    pub submission_file: RepoPath,
    /// Matches every structured-entry file, against the `/`-separated
    /// repository-relative path.
    pub entry_pattern: Regex,
    /// Directory new entries generated from submissions are written under,
    /// as `<site_dir>/<slug>/site.yml`.
    pub site_dir: String,
    /// The approval marker consumed by the downstream merge step.
    pub marker: RepoPath,
    /// Operational prefixes a maintainer may additionally touch.
    pub maintainer_prefixes: Vec<String>,
}

impl CatalogPaths {
    /// Returns `true` if `path` is a structured-entry file.
    pub fn is_entry_file(&self, path: &RepoPath) -> bool {
        self.entry_pattern.is_match(path.as_str())
    }

    /// Path of the entry file generated for `slug`.
    pub fn site_file_for(&self, slug: &str) -> Option<RepoPath> {
        let dir = self.site_dir.trim_end_matches('/');
        RepoPath::new(format!("{dir}/{slug}/site.yml"))
    }
}

/// Who is running the PR and under which identity the automation acts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// PR actor, taken from the authenticated event payload.
    pub actor: ActorLogin,
    /// Login of the automation account that pushes generated results.
    pub automation_login: ActorLogin,
    /// Logins allowed to touch maintainer prefixes.
    pub maintainer_logins: Vec<ActorLogin>,
}

impl Identity {
    /// Returns `true` if the actor is the automation account.
    pub fn is_automation(&self) -> bool {
        self.actor == self.automation_login
    }

    /// Returns `true` if the actor is a designated maintainer.
    pub fn is_maintainer(&self) -> bool {
        self.maintainer_logins.contains(&self.actor)
    }
}

/// Everything a single run needs to know up front.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Correlates logs and the report.
    pub run_id: PipelineRunId,
    /// Repository under review.
    pub repository: RepositoryId,
    /// Pull request under review.
    pub pull_request: PullRequestId,
    /// Integration branch the merge base is computed against.
    pub base_ref: GitRef,
    /// PR head revision.
    pub head_ref: GitRef,
    /// Actor and trusted identities.
    pub identity: Identity,
    /// Feature switches.
    pub flags: RunFlags,
    /// Repository layout.
    pub paths: CatalogPaths,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_mode_parses_both_spellings() {
        assert_eq!("autofix".parse::<ReviewMode>(), Ok(ReviewMode::Autofix));
        assert_eq!("comment_only".parse::<ReviewMode>(), Ok(ReviewMode::CommentOnly));
        assert!("yolo".parse::<ReviewMode>().is_err());
    }

    #[test]
    fn site_file_is_under_site_dir() {
        let paths = CatalogPaths {
            submission_file: RepoPath::new(".github/submissions.txt").unwrap(),
            entry_pattern: Regex::new(r"^sites/[^/]+/site\.ya?ml$").unwrap(),
            site_dir: "sites/".into(),
            marker: RepoPath::new(".github/ai_review/APPROVED").unwrap(),
            maintainer_prefixes: vec![],
        };
        let file = paths.site_file_for("example-com").unwrap();
        assert_eq!(file.as_str(), "sites/example-com/site.yml");
        assert!(paths.is_entry_file(&file));
    }
}
