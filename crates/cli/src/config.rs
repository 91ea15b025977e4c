//! `.atlasgate/config.toml`: file-level defaults for a review run.
//!
//! The file decides who counts as a maintainer, so it is read from the base
//! ref or an explicit `--config` path, never from the PR head. Every field has
//! a default so the file is optional. Environment variables
//! and flags (see `main.rs`) override the review switches.

use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use catalog::PolicyFiles;
use pipeline::context::{CatalogPaths, ReviewMode, RunFlags};
use pipeline::RepoPath;

/// Default config location, relative to the repository root.
pub const DEFAULT_CONFIG_PATH: &str = ".atlasgate/config.toml";

/// Integration branch when neither a flag nor the event names one.
pub const DEFAULT_BASE_REF: &str = "origin/main";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    pub github: GitHubSection,
    pub model: ModelSection,
    pub catalog: CatalogSection,
    pub policy: PolicyFiles,
    pub review: ReviewSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitHubSection {
    pub api_base: String,
    /// Login the automation commits and pushes as.
    pub automation_login: String,
    /// Logins allowed to touch the maintainer prefixes.
    pub maintainers: Vec<String>,
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            api_base: github::DEFAULT_API_BASE.to_string(),
            automation_login: "web-atlas-bot".to_string(),
            maintainers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSection {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            base_url: llm::DEFAULT_BASE_URL.to_string(),
            model: llm::DEFAULT_MODEL.to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogSection {
    pub submission_file: String,
    pub entry_pattern: String,
    pub site_dir: String,
    pub marker: String,
    pub maintainer_prefixes: Vec<String>,
    pub probe_timeout_secs: u64,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            submission_file: ".github/submissions.txt".to_string(),
            entry_pattern: r"^sites/[^/]+/site\.ya?ml$".to_string(),
            site_dir: "sites".to_string(),
            marker: ".github/ai_review/APPROVED".to_string(),
            maintainer_prefixes: vec![
                ".github/workflows/".to_string(),
                ".github/scripts/".to_string(),
                "ai/".to_string(),
                "schemas/".to_string(),
            ],
            probe_timeout_secs: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReviewSection {
    pub mode: ReviewMode,
    pub probe_urls: bool,
    pub generate_entries: bool,
    pub push_commits: bool,
    /// Integration branch, used when the event payload names none.
    pub base_ref: String,
    pub head_ref: String,
}

impl Default for ReviewSection {
    fn default() -> Self {
        let flags = RunFlags::default();
        Self {
            mode: flags.review_mode,
            probe_urls: flags.probe_urls,
            generate_entries: flags.generate_entries,
            push_commits: flags.push_commits,
            base_ref: DEFAULT_BASE_REF.to_string(),
            head_ref: "HEAD".to_string(),
        }
    }
}

impl GateConfig {
    /// Loads `path`. A missing file yields defaults only when `required` is
    /// false.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if !path.exists() && !required {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Resolves the catalog section into typed paths.
    pub fn catalog_paths(&self) -> Result<CatalogPaths> {
        let c = &self.catalog;
        Ok(CatalogPaths {
            submission_file: repo_path(&c.submission_file, "catalog.submission_file")?,
            entry_pattern: Regex::new(&c.entry_pattern).context("catalog.entry_pattern")?,
            site_dir: c.site_dir.clone(),
            marker: repo_path(&c.marker, "catalog.marker")?,
            maintainer_prefixes: c.maintainer_prefixes.clone(),
        })
    }
}

fn repo_path(value: &str, field: &str) -> Result<RepoPath> {
    RepoPath::new(value).with_context(|| format!("{field} must not be empty"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(GateConfig::parse("").unwrap(), GateConfig::default());
    }

    #[test]
    fn sections_override_individually() {
        let cfg = GateConfig::parse(
            r#"
            [github]
            maintainers = ["alice"]

            [review]
            mode = "autofix"
            generate_entries = true

            [catalog]
            site_dir = "entries"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.github.maintainers, vec!["alice"]);
        assert_eq!(cfg.github.automation_login, "web-atlas-bot");
        assert_eq!(cfg.review.mode, ReviewMode::Autofix);
        assert!(cfg.review.generate_entries);
        assert!(cfg.review.probe_urls);
        assert_eq!(cfg.catalog.site_dir, "entries");
        assert_eq!(cfg.catalog.submission_file, ".github/submissions.txt");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(GateConfig::parse("[review]\nmodee = \"autofix\"\n").is_err());
    }

    #[test]
    fn bad_entry_pattern_is_reported() {
        let mut cfg = GateConfig::default();
        cfg.catalog.entry_pattern = "(".into();
        let err = cfg.catalog_paths().unwrap_err();
        assert!(format!("{err:#}").contains("catalog.entry_pattern"));
    }

    #[test]
    fn missing_optional_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GateConfig::load(&dir.path().join("none.toml"), false).unwrap();
        assert_eq!(cfg, GateConfig::default());
        assert!(GateConfig::load(&dir.path().join("none.toml"), true).is_err());
    }
}
