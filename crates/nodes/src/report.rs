//! The run report and its Markdown rendering.
//!
//! Every terminal path produces exactly one [`RunReport`]; the executor posts
//! its Markdown rendering as the single PR comment for the run and the CLI can
//! print it as JSON.

use serde::Serialize;

use pipeline::adjudication::{Action, Decision};
use pipeline::outcome::DecisionTally;
use pipeline::{
    CommitSha, Finding, FindingSeverity, PipelineRunId, PullRequestId, RepoPath, RepositoryId,
    Timestamp,
};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every entry was accepted; the approval marker is set.
    Approved,
    /// At least one entry needs contributor changes.
    NeedsChanges,
    /// At least one entry was rejected.
    Rejected,
    /// A valid submission was recorded but not expanded (generation disabled).
    AwaitingExpansion,
    /// The matched shape had no entries to review.
    NothingToReview,
    /// The run hit a fatal error.
    Failed,
}

impl RunStatus {
    /// Process exit code for the orchestrating CI system.
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Rejected | RunStatus::Failed => 1,
            RunStatus::Approved
            | RunStatus::NeedsChanges
            | RunStatus::AwaitingExpansion
            | RunStatus::NothingToReview => 0,
        }
    }

    /// Returns `true` for the `Fail` terminal state.
    pub fn is_failure(self) -> bool {
        self.exit_code() != 0
    }

    fn headline(self) -> &'static str {
        match self {
            RunStatus::Approved => "✅ Catalog review: approved",
            RunStatus::NeedsChanges => "⚠️ Catalog review: changes requested",
            RunStatus::Rejected => "❌ Catalog review: rejected",
            RunStatus::AwaitingExpansion => "📝 Catalog review: submission received",
            RunStatus::NothingToReview => "✅ Catalog review: nothing to review",
            RunStatus::Failed => "❌ Catalog review failed",
        }
    }
}

/// Everything a run observed and decided.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: PipelineRunId,
    pub repository: RepositoryId,
    pub pull_request: PullRequestId,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub status: RunStatus,
    /// Label of the classified shape, once known.
    pub shape: Option<String>,
    /// The adjudicator's summary.
    pub summary: Option<String>,
    pub tally: DecisionTally,
    pub decisions: Vec<Decision>,
    /// Blocking and advisory findings, in discovery order.
    pub findings: Vec<Finding>,
    /// Non-fatal problems (commit, push, marker cleanup).
    pub warnings: Vec<String>,
    /// The fatal error, for [`RunStatus::Failed`].
    pub error: Option<String>,
    /// Entry file created from the submission.
    pub generated: Option<RepoPath>,
    pub commit: Option<CommitSha>,
    pub pushed: bool,
    pub marker_set: bool,
}

impl RunReport {
    /// Starts an empty report.
    pub fn new(run_id: PipelineRunId, repository: RepositoryId, pull_request: PullRequestId) -> Self {
        Self {
            run_id,
            repository,
            pull_request,
            started_at: Timestamp::now(),
            finished_at: None,
            status: RunStatus::Failed,
            shape: None,
            summary: None,
            tally: DecisionTally::default(),
            decisions: Vec::new(),
            findings: Vec::new(),
            warnings: Vec::new(),
            error: None,
            generated: None,
            commit: None,
            pushed: false,
            marker_set: false,
        }
    }

    /// Records a non-fatal problem.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Returns `true` if any finding blocks the run.
    pub fn has_blocking_findings(&self) -> bool {
        self.findings.iter().any(Finding::is_blocking)
    }

    /// Renders the PR comment.
    pub fn to_markdown(&self) -> String {
        let mut out = format!("## {}\n\n", self.status.headline());

        if let Some(error) = &self.error {
            out.push_str(&format!("{error}\n\n"));
        }
        if let Some(summary) = &self.summary {
            out.push_str(&format!("{summary}\n\n"));
        }
        if let Some(shape) = &self.shape {
            out.push_str(&format!("**Shape:** `{shape}`\n\n"));
        }
        if self.status == RunStatus::AwaitingExpansion {
            out.push_str(
                "The submitted URL is valid and not yet in the catalog. \
                 It will be expanded into a full entry by a maintainer run.\n\n",
            );
        }

        if !self.decisions.is_empty() {
            out.push_str(&format!(
                "### Decisions ({} accepted, {} needs changes, {} rejected)\n\n",
                self.tally.accept, self.tally.needs_changes, self.tally.reject
            ));
            for decision in &self.decisions {
                render_decision(&mut out, decision);
            }
            out.push('\n');
        }

        if !self.findings.is_empty() {
            out.push_str("### Findings\n\n");
            for finding in &self.findings {
                let icon = match finding.severity {
                    FindingSeverity::Blocking => "❌",
                    FindingSeverity::Advisory => "⚠️",
                };
                out.push_str(&format!("- {icon} {finding}\n"));
            }
            out.push('\n');
            if self.has_blocking_findings() {
                out.push_str("Fix the ❌ items above and push again to re-run the review.\n\n");
            }
        }

        if !self.warnings.is_empty() {
            out.push_str("### Warnings\n\n");
            for warning in &self.warnings {
                out.push_str(&format!("- ⚠️ {warning}\n"));
            }
            out.push('\n');
        }

        if let Some(generated) = &self.generated {
            out.push_str(&format!("Generated `{generated}` from the submission.\n"));
        }
        if let Some(commit) = &self.commit {
            let verb = if self.pushed { "pushed to" } else { "created on" };
            out.push_str(&format!("Commit `{commit}` {verb} this branch.\n"));
        }
        if self.marker_set {
            out.push_str("Approval marker set; the merge step may proceed.\n");
        }

        out.push_str(&format!("\n<sub>run {}", self.run_id));
        if let Some(finished) = self.finished_at {
            out.push_str(&format!(" · finished {finished}"));
        }
        out.push_str("</sub>\n");
        out
    }
}

fn render_decision(out: &mut String, decision: &Decision) {
    let icon = match decision.action {
        Action::Accept => "✅",
        Action::NeedsChanges => "⚠️",
        Action::Reject => "❌",
    };
    out.push_str(&format!(
        "- {icon} `{}` entry #{}: **{}**: {}\n",
        decision.file, decision.index, decision.action, decision.reason
    ));

    if decision.action == Action::Reject {
        return;
    }
    let mut hints = Vec::new();
    if let Some(category) = &decision.suggested_category {
        hints.push(format!("category `{category}`"));
    }
    if let Some(lenses) = decision.suggested_lenses.as_ref().filter(|l| !l.is_empty()) {
        hints.push(format!("lenses `{}`", lenses.join(", ")));
    }
    if let Some(quality) = decision.quality {
        hints.push(format!("quality `{quality}`"));
    }
    if !hints.is_empty() {
        out.push_str(&format!("  - suggested: {}\n", hints.join(", ")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{FindingKind, Quality};

    fn report(status: RunStatus) -> RunReport {
        let mut report = RunReport::new(
            PipelineRunId::new_random(),
            RepositoryId::new("web-atlas/atlas").unwrap(),
            PullRequestId::new(7),
        );
        report.status = status;
        report
    }

    fn decision(action: Action) -> Decision {
        Decision {
            file: RepoPath::new("sites/a/site.yml").unwrap(),
            index: 0,
            action,
            reason: "fits the policy".into(),
            proposed_entry: None,
            suggested_category: Some("tools".into()),
            suggested_lenses: Some(vec!["privacy".into()]),
            quality: Some(Quality::Solid),
        }
    }

    #[test]
    fn exit_codes_follow_the_terminal_state() {
        assert_eq!(RunStatus::Approved.exit_code(), 0);
        assert_eq!(RunStatus::NeedsChanges.exit_code(), 0);
        assert_eq!(RunStatus::AwaitingExpansion.exit_code(), 0);
        assert_eq!(RunStatus::Rejected.exit_code(), 1);
        assert_eq!(RunStatus::Failed.exit_code(), 1);
    }

    #[test]
    fn decisions_render_with_suggestions() {
        let mut r = report(RunStatus::Approved);
        r.summary = Some("Looks good.".into());
        r.decisions = vec![decision(Action::Accept)];
        r.tally.accept = 1;
        r.marker_set = true;
        let md = r.to_markdown();
        assert!(md.starts_with("## ✅ Catalog review: approved"));
        assert!(md.contains("`sites/a/site.yml` entry #0: **accept**: fits the policy"));
        assert!(md.contains("suggested: category `tools`, lenses `privacy`, quality `solid`"));
        assert!(md.contains("Approval marker set"));
    }

    #[test]
    fn rejected_decisions_carry_no_suggestions() {
        let mut r = report(RunStatus::Rejected);
        r.decisions = vec![decision(Action::Reject)];
        assert!(!r.to_markdown().contains("suggested:"));
    }

    #[test]
    fn blocking_findings_ask_for_a_fix() {
        let mut r = report(RunStatus::Failed);
        r.error = Some("Validation failed with 1 blocking finding(s)".into());
        r.findings.push(Finding::blocking(
            FindingKind::Scope,
            RepoPath::new("tools/unrelated.sh"),
            "file is outside the allowed set",
        ));
        let md = r.to_markdown();
        assert!(md.contains("- ❌ `tools/unrelated.sh`: file is outside the allowed set"));
        assert!(md.contains("Fix the ❌ items"));
    }
}
