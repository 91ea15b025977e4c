//! PR shape classification and file-scope enforcement.
//!
//! The decision table, evaluated in order with the first match winning:
//!
//! | Condition | Shape | Allowed files |
//! |-----------|-------|---------------|
//! | changed set is exactly the submission file and it holds one valid URL line | [`PrShape::ContributorSubmission`] | the submission file |
//! | submission absent, deleted or invalid, ≥1 structured-entry file changed, nothing else changed (a submission deletion is tolerated) | [`PrShape::GeneratedResult`] | those entry files, plus the submission deletion |
//! | otherwise | [`PrShape::Invalid`] | nothing |
//!
//! Classification is derived from file content and paths only. The
//! automation identity is recorded as a secondary signal; it never widens
//! what a PR may touch. Maintainer-covered paths are removed before the table
//! is evaluated, so the maintainer allow-list is strictly additive.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::{CatalogPaths, Identity};
use crate::submission::{validate_submission_text, FormatViolation, SubmissionRecord};
use crate::{ChangeSet, Finding, FindingKind, RepoPath};

/// State of the submission file in this diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionCheck {
    /// The diff does not touch the submission file.
    NotTouched,
    /// The diff deletes the submission file.
    Deleted,
    /// The file is added or modified and holds one valid URL line.
    Valid(SubmissionRecord),
    /// The file is added or modified but violates the format rules.
    Invalid(Vec<FormatViolation>),
}

impl SubmissionCheck {
    /// Derives the check from the diff and the file's content at the head.
    ///
    /// `content` is `None` when the file could not be read at the head.
    pub fn inspect(changes: &ChangeSet, submission_file: &RepoPath, content: Option<&str>) -> Self {
        if !changes.contains(submission_file) {
            return SubmissionCheck::NotTouched;
        }
        if changes.is_deleted(submission_file) {
            return SubmissionCheck::Deleted;
        }
        match content.map(validate_submission_text) {
            Some(Ok(record)) => SubmissionCheck::Valid(record),
            Some(Err(violations)) => SubmissionCheck::Invalid(violations),
            None => SubmissionCheck::Invalid(vec![FormatViolation::LineCount { found: 0 }]),
        }
    }
}

/// The structural category of a PR. Exactly one variant holds per diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum PrShape {
    /// A contributor added or edited the submission file and nothing else.
    ContributorSubmission {
        /// The submitted URL.
        submission: SubmissionRecord,
    },
    /// Structured entries were produced or edited.
    GeneratedResult {
        /// Entry files touched by the diff.
        entry_files: BTreeSet<RepoPath>,
        /// Whether the submission file is deleted alongside.
        deletes_submission: bool,
    },
    /// No shape matched, or files outside the shape's allow-list were touched.
    Invalid {
        /// Why no shape matched.
        reason: String,
        /// Every scope and format violation, not just the first.
        findings: Vec<Finding>,
    },
}

impl PrShape {
    /// Short label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            PrShape::ContributorSubmission { .. } => "contributor_submission",
            PrShape::GeneratedResult { .. } => "generated_result",
            PrShape::Invalid { .. } => "invalid",
        }
    }
}

impl std::fmt::Display for PrShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of classifying one diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// The single matching shape.
    pub shape: PrShape,
    /// Files the shape allows; empty for [`PrShape::Invalid`].
    pub allowed: BTreeSet<RepoPath>,
    /// Files accepted only through the maintainer allow-list.
    pub maintainer_covered: BTreeSet<RepoPath>,
    /// Whether the actor is the automation identity (logged, not trusted).
    pub by_automation: bool,
}

/// Applies the shape decision table.
#[derive(Debug, Clone, Copy)]
pub struct ShapeClassifier<'a> {
    paths: &'a CatalogPaths,
    identity: &'a Identity,
}

impl<'a> ShapeClassifier<'a> {
    /// Creates a classifier bound to a repository layout and identity.
    pub fn new(paths: &'a CatalogPaths, identity: &'a Identity) -> Self {
        Self { paths, identity }
    }

    /// Classifies a diff.
    pub fn classify(&self, changes: &ChangeSet, submission: &SubmissionCheck) -> Classification {
        let by_automation = self.identity.is_automation();
        let maintainer = self.identity.is_maintainer();
        let sub = &self.paths.submission_file;

        let (maintainer_covered, candidates): (BTreeSet<RepoPath>, BTreeSet<RepoPath>) = changes
            .changed()
            .into_iter()
            .partition(|p| {
                maintainer
                    && p != sub
                    && self.paths.maintainer_prefixes.iter().any(|pre| p.is_under(pre))
            });

        debug!(
            candidates = candidates.len(),
            maintainer_covered = maintainer_covered.len(),
            by_automation,
            "classifying diff"
        );

        let classification = |shape: PrShape, allowed: BTreeSet<RepoPath>| Classification {
            shape,
            allowed,
            maintainer_covered: maintainer_covered.clone(),
            by_automation,
        };

        if candidates.is_empty() {
            return classification(
                invalid("the pull request changes no submission or catalog files", vec![]),
                BTreeSet::new(),
            );
        }

        // Row 1: contributor submission.
        if let SubmissionCheck::Valid(record) = submission {
            if candidates.len() == 1 && candidates.contains(sub) {
                let allowed = BTreeSet::from([sub.clone()]);
                return classification(
                    PrShape::ContributorSubmission {
                        submission: record.clone(),
                    },
                    allowed,
                );
            }
        }

        // Row 2: generated result.
        let entry_files: BTreeSet<RepoPath> = candidates
            .iter()
            .filter(|p| self.paths.is_entry_file(p))
            .cloned()
            .collect();
        let submission_valid = matches!(submission, SubmissionCheck::Valid(_));

        if !submission_valid && !entry_files.is_empty() {
            let deletes_submission =
                matches!(submission, SubmissionCheck::Deleted) && candidates.contains(sub);
            let mut allowed = entry_files.clone();
            if deletes_submission {
                allowed.insert(sub.clone());
            }
            let findings = scope_findings(&candidates, &allowed, "a generated-result");
            if findings.is_empty() {
                if !by_automation {
                    warn!(
                        actor = %self.identity.actor,
                        "generated-result shape from a non-automation actor"
                    );
                }
                return classification(
                    PrShape::GeneratedResult {
                        entry_files,
                        deletes_submission,
                    },
                    allowed,
                );
            }
            let mut findings = findings;
            findings.extend(format_findings(sub, submission));
            return classification(
                invalid(
                    "catalog entry pull requests may only touch structured-entry files",
                    findings,
                ),
                BTreeSet::new(),
            );
        }

        // Row 3: invalid. Report against the shape the evidence points at.
        if !matches!(submission, SubmissionCheck::NotTouched) {
            let allowed = BTreeSet::from([sub.clone()]);
            let mut findings = format_findings(sub, submission);
            findings.extend(scope_findings(&candidates, &allowed, "a submission"));
            let reason = if findings.iter().any(|f| f.kind == FindingKind::Scope) {
                "submission pull requests may only touch the submission file"
            } else if matches!(submission, SubmissionCheck::Deleted) {
                "the pull request only deletes the submission file"
            } else {
                "the submission file is not a single valid URL line"
            };
            return classification(invalid(reason, findings), BTreeSet::new());
        }

        let findings = scope_findings(&candidates, &BTreeSet::new(), "this");
        classification(
            invalid(
                "the pull request matches neither a submission nor a catalog entry change",
                findings,
            ),
            BTreeSet::new(),
        )
    }
}

fn invalid(reason: &str, findings: Vec<Finding>) -> PrShape {
    PrShape::Invalid {
        reason: reason.to_string(),
        findings,
    }
}

fn scope_findings(
    candidates: &BTreeSet<RepoPath>,
    allowed: &BTreeSet<RepoPath>,
    shape: &str,
) -> Vec<Finding> {
    candidates
        .difference(allowed)
        .map(|p| {
            Finding::blocking(
                FindingKind::Scope,
                Some(p.clone()),
                format!("file may not be changed in {shape} pull request"),
            )
        })
        .collect()
}

fn format_findings(sub: &RepoPath, submission: &SubmissionCheck) -> Vec<Finding> {
    match submission {
        SubmissionCheck::Invalid(violations) => violations
            .iter()
            .map(|v| Finding::blocking(FindingKind::Format, Some(sub.clone()), v.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ActorLogin;
    use regex::Regex;

    fn p(s: &str) -> RepoPath {
        RepoPath::new(s).unwrap()
    }

    fn paths() -> CatalogPaths {
        CatalogPaths {
            submission_file: p(".github/submissions.txt"),
            entry_pattern: Regex::new(r"^sites/[^/]+/site\.ya?ml$").unwrap(),
            site_dir: "sites".into(),
            marker: p(".github/ai_review/APPROVED"),
            maintainer_prefixes: vec![".github/workflows/".into(), "ai/".into()],
        }
    }

    fn identity(actor: &str) -> Identity {
        Identity {
            actor: ActorLogin::new(actor).unwrap(),
            automation_login: ActorLogin::new("atlas-bot").unwrap(),
            maintainer_logins: vec![ActorLogin::new("keeper").unwrap()],
        }
    }

    fn added(files: &[&str]) -> ChangeSet {
        ChangeSet::from_lists(vec![], files.iter().map(|f| p(f)), vec![])
    }

    fn valid_submission() -> SubmissionCheck {
        SubmissionCheck::Valid(SubmissionRecord {
            url: "https://example.com".into(),
            line: 1,
        })
    }

    #[test]
    fn lone_valid_submission_is_contributor_submission() {
        let (paths, id) = (paths(), identity("alice"));
        let c = ShapeClassifier::new(&paths, &id)
            .classify(&added(&[".github/submissions.txt"]), &valid_submission());
        assert!(matches!(c.shape, PrShape::ContributorSubmission { .. }));
        assert_eq!(c.allowed, BTreeSet::from([p(".github/submissions.txt")]));
    }

    #[test]
    fn entry_files_with_submission_deletion_is_generated_result() {
        let (paths, id) = (paths(), identity("atlas-bot"));
        let changes = ChangeSet::from_lists(
            vec![],
            vec![p("sites/example-com/site.yml")],
            vec![p(".github/submissions.txt")],
        );
        let c = ShapeClassifier::new(&paths, &id).classify(&changes, &SubmissionCheck::Deleted);
        match c.shape {
            PrShape::GeneratedResult {
                entry_files,
                deletes_submission,
            } => {
                assert_eq!(entry_files, BTreeSet::from([p("sites/example-com/site.yml")]));
                assert!(deletes_submission);
            }
            other => panic!("unexpected shape {other:?}"),
        }
        assert!(c.by_automation);
    }

    #[test]
    fn unrelated_file_next_to_entry_is_invalid_and_named() {
        let (paths, id) = (paths(), identity("atlas-bot"));
        let changes = added(&["sites/example-com/site.yml", "tools/unrelated.sh"]);
        let c = ShapeClassifier::new(&paths, &id).classify(&changes, &SubmissionCheck::NotTouched);
        let PrShape::Invalid { findings, .. } = c.shape else {
            panic!("expected invalid");
        };
        let named: Vec<_> = findings.iter().filter_map(|f| f.path.clone()).collect();
        assert_eq!(named, vec![p("tools/unrelated.sh")]);
    }

    #[test]
    fn every_violation_is_enumerated() {
        let (paths, id) = (paths(), identity("alice"));
        let changes = added(&[".github/submissions.txt", "a.sh", "b.sh", "README.md"]);
        let c = ShapeClassifier::new(&paths, &id).classify(&changes, &valid_submission());
        let PrShape::Invalid { findings, .. } = c.shape else {
            panic!("expected invalid");
        };
        assert_eq!(findings.len(), 3);
        assert!(findings.iter().all(|f| f.kind == FindingKind::Scope));
    }

    #[test]
    fn invalid_submission_reports_format_findings() {
        let (paths, id) = (paths(), identity("alice"));
        let changes = added(&[".github/submissions.txt"]);
        let check = SubmissionCheck::inspect(
            &changes,
            &paths.submission_file,
            Some("https://example.com\nextra text"),
        );
        let c = ShapeClassifier::new(&paths, &id).classify(&changes, &check);
        let PrShape::Invalid { findings, .. } = c.shape else {
            panic!("expected invalid");
        };
        assert!(findings
            .iter()
            .any(|f| f.kind == FindingKind::Format
                && f.message.contains("must contain exactly one line")));
    }

    #[test]
    fn valid_submission_with_entry_file_is_invalid() {
        let (paths, id) = (paths(), identity("alice"));
        let changes = added(&[".github/submissions.txt", "sites/x/site.yml"]);
        let c = ShapeClassifier::new(&paths, &id).classify(&changes, &valid_submission());
        let PrShape::Invalid { findings, .. } = c.shape else {
            panic!("expected invalid");
        };
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].path, Some(p("sites/x/site.yml")));
    }

    #[test]
    fn maintainer_prefixes_are_additive_only() {
        let paths = paths();
        let changes = added(&["sites/x/site.yml", ".github/workflows/review.yml"]);

        let keeper = identity("keeper");
        let c = ShapeClassifier::new(&paths, &keeper).classify(&changes, &SubmissionCheck::NotTouched);
        assert!(matches!(c.shape, PrShape::GeneratedResult { .. }));
        assert_eq!(c.maintainer_covered, BTreeSet::from([p(".github/workflows/review.yml")]));

        let alice = identity("alice");
        let c = ShapeClassifier::new(&paths, &alice).classify(&changes, &SubmissionCheck::NotTouched);
        assert!(matches!(c.shape, PrShape::Invalid { .. }));
    }

    #[test]
    fn maintainer_only_operational_change_is_not_a_shape() {
        let (paths, keeper) = (paths(), identity("keeper"));
        let c = ShapeClassifier::new(&paths, &keeper)
            .classify(&added(&["ai/policy.yml"]), &SubmissionCheck::NotTouched);
        assert!(matches!(c.shape, PrShape::Invalid { ref findings, .. } if findings.is_empty()));
    }

    #[test]
    fn automation_identity_alone_does_not_grant_scope() {
        let (paths, bot) = (paths(), identity("atlas-bot"));
        let c = ShapeClassifier::new(&paths, &bot)
            .classify(&added(&["Cargo.toml"]), &SubmissionCheck::NotTouched);
        assert!(matches!(c.shape, PrShape::Invalid { .. }));
        assert!(c.allowed.is_empty());
    }

    #[test]
    fn classification_is_total_and_exclusive() {
        let (paths, id) = (paths(), identity("alice"));
        let classifier = ShapeClassifier::new(&paths, &id);
        let files = [
            ".github/submissions.txt",
            "sites/a/site.yml",
            "sites/b/site.yaml",
            "docs/readme.md",
        ];
        let checks = [
            SubmissionCheck::NotTouched,
            SubmissionCheck::Deleted,
            valid_submission(),
            SubmissionCheck::Invalid(vec![FormatViolation::LineCount { found: 2 }]),
        ];
        for mask in 0u8..16 {
            let chosen: Vec<&str> = files
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, f)| *f)
                .collect();
            for check in &checks {
                let c = classifier.classify(&added(&chosen), check);
                let allowed_ok = match &c.shape {
                    PrShape::Invalid { .. } => c.allowed.is_empty(),
                    _ => c.allowed.iter().all(|a| chosen.contains(&a.as_str())),
                };
                assert!(allowed_ok, "mask {mask} check {check:?} gave {:?}", c.shape);
            }
        }
    }
}
