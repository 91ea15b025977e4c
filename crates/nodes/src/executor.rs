//! The per-run state machine.
//!
//! ```text
//! Start → Classify ─┬─ Invalid ─────────────────────────────────────────→ Fail
//!                   └─ valid shape → Validate ─┬─ blocking findings ─────→ Fail
//!                                              └─ clean → Index + Adjudicate
//!                                                    ├─ AdjudicationError → Fail
//!                                                    └─ decisions → Apply → Done
//! ```
//!
//! The executor sequences port calls; every rule it applies lives in the
//! [`pipeline`] crate. A run is strictly sequential: one classification, one
//! validation pass, one index build, at most one adjudication call and at most
//! one commit. Exactly one report comment is posted on every path.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{error, info, instrument, warn, Span};

use pipeline::adjudication::{parse_response, AdjudicationError, AdjudicationRequest, AdjudicationResponse};
use pipeline::context::RunContext;
use pipeline::generation::{accept_generated, GenerationRequest};
use pipeline::index::UrlIndex;
use pipeline::outcome::{plan_autofix, DecisionTally, Verdict};
use pipeline::policy::PolicyBundle;
use pipeline::ports::{
    Adjudicator, ApprovalMarker, CatalogFile, CatalogStore, CommentSink, ContentGenerator,
    ProbeOutcome, ReachabilityProbe, VersionControl,
};
use pipeline::shape::{PrShape, ShapeClassifier, SubmissionCheck};
use pipeline::submission::SubmissionRecord;
use pipeline::urls::slug_for;
use pipeline::{
    CatalogEntry, ChangeSet, EntryLocation, Finding, FindingKind, GateError, RepoPath, Timestamp,
};

use crate::report::{RunReport, RunStatus};

/// Commit message for autofix-only commits.
pub const NORMALIZE_COMMIT_MESSAGE: &str = "chore: normalize catalog entries";

/// Commit message when the commit carries a generated entry.
pub const GENERATE_COMMIT_MESSAGE: &str = "chore: generate catalog entry from submission";

/// The capabilities a run needs, as trait objects.
#[derive(Clone)]
pub struct Ports {
    /// Diffs, commits and pushes the checked-out repository.
    pub vcs: Arc<dyn VersionControl>,
    /// Reads and writes catalog files in the working tree.
    pub store: Arc<dyn CatalogStore>,
    /// The approval file the merge gate checks.
    pub marker: Arc<dyn ApprovalMarker>,
    /// Where the run report is posted.
    pub comments: Arc<dyn CommentSink>,
    /// Model reviewer for contributor submissions.
    pub adjudicator: Arc<dyn Adjudicator>,
    /// `None` when no generation backend is configured.
    pub generator: Option<Arc<dyn ContentGenerator>>,
    /// URL reachability check, used when `probe_urls` is on.
    pub probe: Arc<dyn ReachabilityProbe>,
}

/// Result of one run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: RunReport,
}

impl RunOutcome {
    /// Process exit code: `0` for `Done`, `1` for `Fail`.
    pub fn exit_code(&self) -> u8 {
        self.report.status.exit_code()
    }
}

/// Files written during the run, committed together at the end.
#[derive(Debug, Default)]
struct Staged {
    paths: BTreeSet<RepoPath>,
    expansion: bool,
}

impl Staged {
    fn message(&self) -> &'static str {
        if self.expansion {
            GENERATE_COMMIT_MESSAGE
        } else {
            NORMALIZE_COMMIT_MESSAGE
        }
    }
}

/// Drives one gatekeeper run.
pub struct PipelineExecutor {
    ctx: RunContext,
    policy: PolicyBundle,
    ports: Ports,
}

impl PipelineExecutor {
    /// Creates an executor for a single run.
    pub fn new(ctx: RunContext, policy: PolicyBundle, ports: Ports) -> Self {
        Self { ctx, policy, ports }
    }

    /// Runs the state machine to a terminal state.
    ///
    /// Never returns an error: failures end in [`RunStatus::Failed`] with the
    /// error recorded in the report. The approval marker is set only for
    /// [`RunStatus::Approved`] and cleared on every other path.
    #[instrument(
        name = "gate_run",
        skip(self),
        fields(
            run_id = %self.ctx.run_id,
            pr = %self.ctx.pull_request,
            actor = %self.ctx.identity.actor,
            shape = tracing::field::Empty,
        )
    )]
    pub async fn run(&self) -> RunOutcome {
        let mut report = RunReport::new(
            self.ctx.run_id,
            self.ctx.repository.clone(),
            self.ctx.pull_request,
        );

        match self.execute(&mut report).await {
            Ok(status) => report.status = status,
            Err(err) => {
                error!(error = %err, "Run failed");
                report.findings.extend(err.findings().iter().cloned());
                report.error = Some(err.to_string());
                report.status = RunStatus::Failed;
            }
        }

        self.finalize_marker(&mut report);
        report.finished_at = Some(Timestamp::now());
        self.post_report(&report).await;

        info!(status = ?report.status, exit_code = report.status.exit_code(), "Run finished");
        RunOutcome { report }
    }

    async fn execute(&self, report: &mut RunReport) -> Result<RunStatus, GateError> {
        let ctx = &self.ctx;

        // Classify
        let changes = ChangeSet::inspect(self.ports.vcs.as_ref(), &ctx.base_ref, &ctx.head_ref)?;
        let submission_text = if changes.contains(&ctx.paths.submission_file)
            && !changes.is_deleted(&ctx.paths.submission_file)
        {
            self.ports.store.read_text(&ctx.paths.submission_file)?
        } else {
            None
        };
        let check = SubmissionCheck::inspect(
            &changes,
            &ctx.paths.submission_file,
            submission_text.as_deref(),
        );
        let classification =
            ShapeClassifier::new(&ctx.paths, &ctx.identity).classify(&changes, &check);

        Span::current().record("shape", classification.shape.label());
        report.shape = Some(classification.shape.label().to_string());
        info!(
            shape = classification.shape.label(),
            allowed = classification.allowed.len(),
            maintainer_covered = classification.maintainer_covered.len(),
            by_automation = classification.by_automation,
            "Classified pull request"
        );

        match classification.shape {
            PrShape::Invalid { reason, findings } => {
                Err(GateError::InvalidShape { reason, findings })
            }
            PrShape::ContributorSubmission { submission } => {
                self.review_submission(&submission, report).await
            }
            PrShape::GeneratedResult { entry_files, .. } => {
                let live: Vec<RepoPath> = entry_files
                    .into_iter()
                    .filter(|f| !changes.is_deleted(f))
                    .collect();
                self.review_entries(&live, report).await
            }
        }
    }

    // -----------------------------------------------------------------------
    // Contributor submission
    // -----------------------------------------------------------------------

    #[instrument(skip(self, submission, report), fields(url = %submission.url))]
    async fn review_submission(
        &self,
        submission: &SubmissionRecord,
        report: &mut RunReport,
    ) -> Result<RunStatus, GateError> {
        let paths = &self.ctx.paths;
        let source = Some(paths.submission_file.clone());
        let urls = self.policy.url_policy();

        // Validate
        let url = match urls.check(&submission.url) {
            Ok(url) => url,
            Err(rejection) => {
                report.findings.push(Finding::blocking(
                    FindingKind::UrlRejected,
                    source,
                    rejection.to_string(),
                ));
                return Err(self.validation_failure(report));
            }
        };

        let (files, _) = self.load_catalog(&BTreeSet::new())?;
        let index = UrlIndex::build(&files);
        let existing = index.locations(&url);
        if !existing.is_empty() {
            report.findings.push(Finding::blocking(
                FindingKind::DuplicateUrl,
                source.clone(),
                format!("`{url}` is already in the catalog at {}", join_locations(existing)),
            ));
            return Err(self.validation_failure(report));
        }

        let mut url_checks = BTreeMap::new();
        self.probe_url(&url, source.clone(), &mut url_checks, report).await;

        let Some(generator) = self.ports.generator.as_ref().filter(|_| self.ctx.flags.generate_entries)
        else {
            info!("Generation disabled; submission awaits expansion");
            return Ok(RunStatus::AwaitingExpansion);
        };

        // Expand
        let Some(slug) = slug_for(&url) else {
            report.findings.push(Finding::blocking(
                FindingKind::Generation,
                source,
                format!("cannot derive an entry id from `{url}`"),
            ));
            return Err(self.validation_failure(report));
        };
        let Some(target) = paths.site_file_for(&slug) else {
            report.findings.push(Finding::blocking(
                FindingKind::Generation,
                source,
                format!("cannot derive an entry path for `{slug}`"),
            ));
            return Err(self.validation_failure(report));
        };
        if self.ports.store.exists(&target) {
            report.findings.push(Finding::blocking(
                FindingKind::Generation,
                Some(target.clone()),
                "an entry file for this site already exists",
            ));
            return Err(self.validation_failure(report));
        }

        let request = GenerationRequest::new(url.clone(), slug, &self.policy);
        let raw = match generator.generate_entry(&request).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "Content generation failed");
                report.findings.push(Finding::blocking(
                    FindingKind::Generation,
                    Some(target.clone()),
                    format!("content generation failed: {err}"),
                ));
                return Err(self.validation_failure(report));
            }
        };
        let entry = match accept_generated(
            &raw,
            &url,
            &request.slug,
            &target,
            &self.policy.schema(),
            &urls,
        ) {
            Ok(entry) => entry,
            Err(findings) => {
                report.findings.extend(findings);
                return Err(self.validation_failure(report));
            }
        };

        self.ports.store.create_entry_file(&target, &entry)?;
        self.ports.store.remove_file(&paths.submission_file)?;
        report.generated = Some(target.clone());
        info!(file = %target, "Generated catalog entry from submission");

        let mut staged = Staged {
            paths: BTreeSet::from([target.clone(), paths.submission_file.clone()]),
            expansion: true,
        };
        let items = vec![(EntryLocation::new(target, 0), entry)];
        let response = self.adjudicate(items, &url_checks).await?;
        Ok(self.apply(response, &mut staged, report))
    }

    // -----------------------------------------------------------------------
    // Generated result
    // -----------------------------------------------------------------------

    #[instrument(skip(self, entry_files, report), fields(files = entry_files.len()))]
    async fn review_entries(
        &self,
        entry_files: &[RepoPath],
        report: &mut RunReport,
    ) -> Result<RunStatus, GateError> {
        let schema = self.policy.schema();
        let urls = self.policy.url_policy();

        let reviewed: BTreeSet<RepoPath> = entry_files.iter().cloned().collect();
        let (files, unreadable) = self.load_catalog(&reviewed)?;
        report.findings.extend(unreadable);
        let index = UrlIndex::build(&files);

        // Validate
        let mut items = Vec::new();
        let mut url_checks = BTreeMap::new();
        for file in files.iter().filter(|f| reviewed.contains(&f.path)) {
            for (position, raw) in file.entries.iter().enumerate() {
                let at = format!("entry #{position}");
                let entry = match schema.validate(raw) {
                    Ok(entry) => entry,
                    Err(violations) => {
                        report.findings.extend(violations.into_iter().map(|v| {
                            Finding::blocking(FindingKind::Schema, Some(file.path.clone()), v.to_string())
                                .at(at.clone())
                        }));
                        continue;
                    }
                };
                let url = match urls.check(&entry.url) {
                    Ok(url) => url,
                    Err(rejection) => {
                        report.findings.push(
                            Finding::blocking(
                                FindingKind::UrlRejected,
                                Some(file.path.clone()),
                                format!("`{}`: {rejection}", entry.url),
                            )
                            .at(at),
                        );
                        continue;
                    }
                };

                let locations = index.locations(&url);
                if locations.len() > 1 {
                    report.findings.push(
                        Finding::advisory(
                            FindingKind::DuplicateUrl,
                            Some(file.path.clone()),
                            format!("duplicate url `{url}` found at {}", join_locations(locations)),
                        )
                        .at(at),
                    );
                }

                self.probe_url(&url, Some(file.path.clone()), &mut url_checks, report)
                    .await;
                items.push((EntryLocation::new(file.path.clone(), position), entry));
            }
        }

        if report.has_blocking_findings() {
            return Err(self.validation_failure(report));
        }
        if items.is_empty() {
            info!("No entries to review");
            return Ok(RunStatus::NothingToReview);
        }

        let response = self.adjudicate(items, &url_checks).await?;
        let mut staged = Staged::default();
        Ok(self.apply(response, &mut staged, report))
    }

    // -----------------------------------------------------------------------
    // Shared steps
    // -----------------------------------------------------------------------

    /// Loads every catalog file. Parse failures in `reviewed` files become
    /// blocking findings; anywhere else they are fatal, since the duplicate
    /// index would be incomplete.
    fn load_catalog(
        &self,
        reviewed: &BTreeSet<RepoPath>,
    ) -> Result<(Vec<CatalogFile>, Vec<Finding>), GateError> {
        let mut files = Vec::new();
        let mut findings = Vec::new();
        for path in self.ports.store.list_files(&self.ctx.paths.entry_pattern)? {
            match self.ports.store.load(&path) {
                Ok(file) => files.push(file),
                Err(err) if reviewed.contains(&path) => {
                    findings.push(Finding::blocking(FindingKind::Catalog, Some(path), err.to_string()));
                }
                Err(err) => return Err(err.into()),
            }
        }
        info!(files = files.len(), "Loaded catalog");
        Ok((files, findings))
    }

    async fn probe_url(
        &self,
        url: &str,
        path: Option<RepoPath>,
        url_checks: &mut BTreeMap<String, ProbeOutcome>,
        report: &mut RunReport,
    ) {
        if url_checks.contains_key(url) {
            return;
        }
        let outcome = if self.ctx.flags.probe_urls {
            self.ports.probe.probe(url).await
        } else {
            ProbeOutcome::Skipped
        };
        if outcome.is_failure() {
            report.findings.push(Finding::advisory(
                FindingKind::Reachability,
                path,
                format!("`{url}` did not respond: {}", outcome.summary()),
            ));
        }
        url_checks.insert(url.to_string(), outcome);
    }

    #[instrument(skip_all, fields(entries = items.len()))]
    async fn adjudicate(
        &self,
        items: Vec<(EntryLocation, CatalogEntry)>,
        url_checks: &BTreeMap<String, ProbeOutcome>,
    ) -> Result<AdjudicationResponse, AdjudicationError> {
        let request = AdjudicationRequest::new(&self.policy, items, url_checks);
        let text = self.ports.adjudicator.adjudicate(&request).await?;
        let response = parse_response(&text, &request)?;
        info!(decisions = response.decisions.len(), "Adjudication complete");
        Ok(response)
    }

    /// Applies decisions: fixes, the single commit and the verdict.
    fn apply(
        &self,
        response: AdjudicationResponse,
        staged: &mut Staged,
        report: &mut RunReport,
    ) -> RunStatus {
        let tally = DecisionTally::count(&response.decisions);
        let verdict = Verdict::from_tally(&tally);
        info!(
            accept = tally.accept,
            reject = tally.reject,
            needs_changes = tally.needs_changes,
            ?verdict,
            "Tallied decisions"
        );

        report.tally = tally;
        report.summary = Some(response.summary);

        if verdict == Verdict::Rejected {
            report.decisions = response.decisions;
            return RunStatus::Rejected;
        }

        let plan = plan_autofix(
            &response.decisions,
            self.ctx.flags.review_mode,
            &self.policy.schema(),
            &self.policy.url_policy(),
        );
        report.findings.extend(plan.skipped);
        for write in plan.writes {
            let location = write.location;
            match self
                .ports
                .store
                .replace_entry(&location.file, location.index, &write.entry)
            {
                Ok(()) => {
                    staged.paths.insert(location.file);
                }
                Err(err) => {
                    warn!(%location, error = %err, "Skipping accepted fix");
                    report.findings.push(
                        Finding::advisory(
                            FindingKind::Write,
                            Some(location.file.clone()),
                            format!("proposed fix not applied: {err}"),
                        )
                        .at(format!("entry #{}", location.index)),
                    );
                }
            }
        }
        report.decisions = response.decisions;

        self.commit(staged, report);

        match verdict {
            Verdict::Approved => RunStatus::Approved,
            Verdict::NeedsChanges | Verdict::Undecided => RunStatus::NeedsChanges,
            Verdict::Rejected => RunStatus::Rejected,
        }
    }

    /// Creates the run's single commit. Failures are warnings: they never
    /// un-approve a clean review.
    fn commit(&self, staged: &Staged, report: &mut RunReport) {
        if staged.paths.is_empty() {
            return;
        }
        let paths: Vec<RepoPath> = staged.paths.iter().cloned().collect();
        let author = &self.ctx.identity.automation_login;
        match self.ports.vcs.commit(&paths, staged.message(), author) {
            Ok(sha) => {
                info!(%sha, files = paths.len(), "Committed changes");
                report.commit = Some(sha);
            }
            Err(err) => {
                warn!(error = %err, "Commit failed");
                report.warn(format!("review completed, but the commit failed: {err}"));
                return;
            }
        }

        if !self.ctx.flags.push_commits {
            return;
        }
        match self.ports.vcs.push() {
            Ok(()) => report.pushed = true,
            Err(err) => {
                warn!(error = %err, "Push failed");
                report.warn(format!("review completed, but the push failed: {err}"));
            }
        }
    }

    /// Moves the collected findings into a validation error; [`Self::run`]
    /// puts them back into the report.
    fn validation_failure(&self, report: &mut RunReport) -> GateError {
        GateError::Validation {
            findings: std::mem::take(&mut report.findings),
        }
    }

    /// Sets the marker for an approved run, clears it otherwise.
    fn finalize_marker(&self, report: &mut RunReport) {
        if report.status == RunStatus::Approved && !report.has_blocking_findings() {
            match self.ports.marker.set() {
                Ok(()) => {
                    report.marker_set = true;
                    info!("Approval marker set");
                }
                Err(err) => {
                    error!(error = %err, "Could not set approval marker");
                    report.error = Some(GateError::from(err).to_string());
                    report.status = RunStatus::Failed;
                }
            }
            return;
        }

        if let Err(err) = self.ports.marker.clear() {
            warn!(error = %err, "Could not clear approval marker");
            report.warn(format!("stale approval marker could not be removed: {err}"));
        }
    }

    async fn post_report(&self, report: &RunReport) {
        let body = report.to_markdown();
        if let Err(err) = self
            .ports
            .comments
            .post_comment(&self.ctx.repository, self.ctx.pull_request, &body)
            .await
        {
            warn!(error = %err, "Could not post report comment");
        }
    }
}

fn join_locations(locations: &[EntryLocation]) -> String {
    locations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
