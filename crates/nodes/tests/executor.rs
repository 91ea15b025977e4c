//! End-to-end runs of the executor against in-memory ports.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use regex::Regex;
use serde_json::{json, Value};

use nodes::{PipelineExecutor, Ports, RunOutcome, RunStatus, GENERATE_COMMIT_MESSAGE, NORMALIZE_COMMIT_MESSAGE};
use pipeline::context::{CatalogPaths, Identity, ReviewMode, RunContext, RunFlags};
use pipeline::fakes::{
    FakeVersionControl, MemoryApprovalMarker, MemoryCatalogStore, RecordingCommentSink,
    ScriptedAdjudicator, ScriptedGenerator, StaticProbe,
};
use pipeline::policy::PolicyBundle;
use pipeline::ports::{ApprovalMarker, CatalogStore, ContentGenerator, ProbeOutcome};
use pipeline::{
    ActorLogin, FindingKind, GitRef, PipelineRunId, PullRequestId, RepoPath, RepositoryId,
};

const SUBMISSION: &str = ".github/submissions.txt";

fn p(s: &str) -> RepoPath {
    RepoPath::new(s).unwrap()
}

fn site(id: &str, url: &str) -> Value {
    json!({
        "id": id,
        "url": url,
        "category": "tools",
        "title": { "en": id },
        "description": { "en": "A useful site." }
    })
}

fn decision(file: &str, index: usize, action: &str) -> Value {
    json!({ "file": file, "index": index, "action": action, "reason": "checked" })
}

fn reply(decisions: Vec<Value>) -> String {
    json!({ "summary": "Reviewed.", "decisions": decisions }).to_string()
}

struct Harness {
    vcs: Arc<FakeVersionControl>,
    store: Arc<MemoryCatalogStore>,
    marker: Arc<MemoryApprovalMarker>,
    comments: Arc<RecordingCommentSink>,
    adjudicator: Arc<ScriptedAdjudicator>,
    generator: Option<Arc<ScriptedGenerator>>,
    probe: Arc<StaticProbe>,
    flags: RunFlags,
    actor: &'static str,
}

impl Harness {
    fn new(vcs: FakeVersionControl, store: MemoryCatalogStore, adjudicator: ScriptedAdjudicator) -> Self {
        Self {
            vcs: Arc::new(vcs),
            store: Arc::new(store),
            marker: Arc::new(MemoryApprovalMarker::new()),
            comments: Arc::new(RecordingCommentSink::new()),
            adjudicator: Arc::new(adjudicator),
            generator: None,
            probe: Arc::new(StaticProbe::new()),
            flags: RunFlags {
                push_commits: true,
                ..RunFlags::default()
            },
            actor: "contributor",
        }
    }

    fn context(&self) -> RunContext {
        RunContext {
            run_id: PipelineRunId::new_random(),
            repository: RepositoryId::new("web-atlas/atlas").unwrap(),
            pull_request: PullRequestId::new(12),
            base_ref: GitRef::new("origin/main").unwrap(),
            head_ref: GitRef::new("HEAD").unwrap(),
            identity: Identity {
                actor: ActorLogin::new(self.actor).unwrap(),
                automation_login: ActorLogin::new("atlas-bot").unwrap(),
                maintainer_logins: vec![ActorLogin::new("maintainer").unwrap()],
            },
            flags: self.flags,
            paths: CatalogPaths {
                submission_file: p(SUBMISSION),
                entry_pattern: Regex::new(r"^sites/[^/]+/site\.ya?ml$").unwrap(),
                site_dir: "sites".into(),
                marker: p(".github/ai_review/APPROVED"),
                maintainer_prefixes: vec![".github/workflows/".into(), "ai/".into()],
            },
        }
    }

    fn policy() -> PolicyBundle {
        PolicyBundle::from_documents(
            json!({ "tone": "factual" }),
            Some(json!({ "categories": ["tools", "learning"] })),
            Some(json!({ "lenses": ["privacy", "open-source"] })),
        )
        .unwrap()
    }

    async fn run(&self) -> RunOutcome {
        let ports = Ports {
            vcs: self.vcs.clone(),
            store: self.store.clone(),
            marker: self.marker.clone(),
            comments: self.comments.clone(),
            adjudicator: self.adjudicator.clone(),
            generator: self
                .generator
                .clone()
                .map(|g| g as Arc<dyn ContentGenerator>),
            probe: self.probe.clone(),
        };
        PipelineExecutor::new(self.context(), Self::policy(), ports)
            .run()
            .await
    }
}

fn submission_pr(text: &str) -> (FakeVersionControl, MemoryCatalogStore) {
    (
        FakeVersionControl::new().with_added([SUBMISSION]),
        MemoryCatalogStore::new()
            .with_text(SUBMISSION, text)
            .with_entries("sites/existing-org/site.yml", vec![site("existing-org", "https://existing.org")]),
    )
}

// ---------------------------------------------------------------------------
// Contributor submissions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn valid_submission_without_generation_awaits_expansion() {
    let (vcs, store) = submission_pr("https://example.com\n");
    let mut h = Harness::new(vcs, store, ScriptedAdjudicator::failing(500));
    h.marker = Arc::new(MemoryApprovalMarker::already_set());

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::AwaitingExpansion);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.report.shape.as_deref(), Some("contributor_submission"));
    assert!(h.adjudicator.requests().is_empty());
    assert!(!h.marker.is_set(), "stale marker must be cleared");
    assert_eq!(h.comments.comments().len(), 1);
    assert_eq!(h.probe.probed(), vec!["https://example.com".to_string()]);
}

#[tokio::test]
async fn valid_submission_is_expanded_adjudicated_and_committed_once() {
    let (vcs, store) = submission_pr("https://example.com");
    let mut h = Harness::new(
        vcs,
        store,
        ScriptedAdjudicator::replying(reply(vec![decision("sites/example-com/site.yml", 0, "accept")])),
    );
    h.flags.generate_entries = true;
    h.generator = Some(Arc::new(ScriptedGenerator::replying(site(
        "example-com",
        "https://example.com/",
    ))));

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::Approved);
    assert_eq!(outcome.report.generated, Some(p("sites/example-com/site.yml")));
    assert!(h.store.entries("sites/example-com/site.yml").is_some());
    assert!(!h.store.exists(&p(SUBMISSION)));

    let commits = h.vcs.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].message, GENERATE_COMMIT_MESSAGE);
    assert_eq!(commits[0].paths, vec![p(SUBMISSION), p("sites/example-com/site.yml")]);
    assert_eq!(commits[0].author.as_str(), "atlas-bot");
    assert_eq!(h.vcs.pushes(), 1);
    assert!(h.marker.is_set());

    let requests = h.adjudicator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].changed_entries[0].file, p("sites/example-com/site.yml"));
    assert_eq!(requests[0].url_checks["https://example.com"], "ok: HTTP 200");

    let generation = h.generator.as_ref().unwrap().requests();
    assert_eq!(generation[0].slug, "example-com");
}

#[tokio::test]
async fn generator_swapping_the_url_fails_the_run() {
    let (vcs, store) = submission_pr("https://example.com");
    let mut h = Harness::new(vcs, store, ScriptedAdjudicator::failing(500));
    h.flags.generate_entries = true;
    h.generator = Some(Arc::new(ScriptedGenerator::replying(site("evil-com", "https://evil.com"))));

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::Failed);
    assert!(outcome
        .report
        .findings
        .iter()
        .any(|f| f.message.contains("does not match the submitted url")));
    assert!(h.store.exists(&p(SUBMISSION)));
    assert!(h.vcs.commits().is_empty());
    assert!(h.adjudicator.requests().is_empty());
}

#[tokio::test]
async fn generated_id_differing_from_its_file_fails_the_run() {
    let (vcs, store) = submission_pr("https://example.com");
    let mut h = Harness::new(vcs, store, ScriptedAdjudicator::failing(500));
    h.flags.generate_entries = true;
    h.generator = Some(Arc::new(ScriptedGenerator::replying(site(
        "squatted-name",
        "https://example.com",
    ))));

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::Failed);
    assert!(outcome.report.findings.iter().any(|f| f.kind == FindingKind::Generation
        && f.is_blocking()
        && f.message.contains("`squatted-name`")));
    assert!(!h.store.exists(&p("sites/example-com/site.yml")));
    assert!(h.store.exists(&p(SUBMISSION)));
    assert!(h.vcs.commits().is_empty());
    assert!(h.adjudicator.requests().is_empty());
}

#[tokio::test]
async fn multi_line_submission_fails_with_every_rule_named() {
    let (vcs, store) = submission_pr("https://example.com\nextra text");
    let h = Harness::new(vcs, store, ScriptedAdjudicator::failing(500));

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::Failed);
    assert_eq!(outcome.exit_code(), 1);
    assert!(outcome
        .report
        .findings
        .iter()
        .any(|f| f.kind == FindingKind::Format && f.message.contains("must contain exactly one line")));
    assert!(h.adjudicator.requests().is_empty());
    let comments = h.comments.comments();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("must contain exactly one line"));
}

#[tokio::test]
async fn submission_already_in_the_catalog_is_blocking() {
    let (vcs, store) = submission_pr("https://existing.org/");
    let h = Harness::new(vcs, store, ScriptedAdjudicator::failing(500));

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::Failed);
    let dup = outcome
        .report
        .findings
        .iter()
        .find(|f| f.kind == FindingKind::DuplicateUrl)
        .expect("duplicate finding");
    assert!(dup.is_blocking());
    assert!(dup.message.contains("sites/existing-org/site.yml[0]"));
}

#[tokio::test]
async fn denylisted_submission_is_rejected_before_any_network_call() {
    let (vcs, store) = submission_pr("https://best-casino.example");
    let h = Harness::new(vcs, store, ScriptedAdjudicator::failing(500));

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::Failed);
    assert!(outcome.report.findings.iter().any(|f| f.kind == FindingKind::UrlRejected));
    assert!(h.probe.probed().is_empty());
}

// ---------------------------------------------------------------------------
// Generated results
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generated_result_touching_unrelated_file_is_invalid() {
    let vcs = FakeVersionControl::new()
        .with_added(["sites/example-com/site.yml"])
        .with_modified(["tools/unrelated.sh"]);
    let store = MemoryCatalogStore::new()
        .with_entries("sites/example-com/site.yml", vec![site("example-com", "https://example.com")]);
    let h = Harness::new(vcs, store, ScriptedAdjudicator::failing(500));

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::Failed);
    assert_eq!(outcome.report.shape.as_deref(), Some("invalid"));
    let scoped: Vec<&RepoPath> = outcome
        .report
        .findings
        .iter()
        .filter(|f| f.kind == FindingKind::Scope)
        .filter_map(|f| f.path.as_ref())
        .collect();
    assert_eq!(scoped, vec![&p("tools/unrelated.sh")]);
    assert!(h.adjudicator.requests().is_empty());
    assert!(h.vcs.commits().is_empty());
}

#[tokio::test]
async fn invalid_proposal_is_skipped_and_the_rest_committed() {
    let vcs = FakeVersionControl::new().with_modified(["sites/a-org/site.yml", "sites/b-org/site.yml"]);
    let store = MemoryCatalogStore::new()
        .with_entries("sites/a-org/site.yml", vec![site("a-org", "https://a.org")])
        .with_entries("sites/b-org/site.yml", vec![site("b-org", "https://b.org")]);

    let mut missing_description = site("a-org", "https://a.org");
    missing_description.as_object_mut().unwrap().remove("description");
    let mut renamed = site("b-org", "https://b.org");
    renamed["title"] = json!({ "en": "B Org" });

    let mut accept_a = decision("sites/a-org/site.yml", 0, "accept");
    accept_a["proposed_entry"] = missing_description;
    let mut accept_b = decision("sites/b-org/site.yml", 0, "accept");
    accept_b["proposed_entry"] = renamed;

    let mut h = Harness::new(vcs, store, ScriptedAdjudicator::replying(reply(vec![accept_a, accept_b])));
    h.actor = "atlas-bot";
    h.flags.review_mode = ReviewMode::Autofix;

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::Approved);
    assert!(h.marker.is_set());

    let a = h.store.entries("sites/a-org/site.yml").unwrap();
    assert_eq!(a[0]["description"]["en"], "A useful site.");
    let b = h.store.entries("sites/b-org/site.yml").unwrap();
    assert_eq!(b[0]["title"]["en"], "B Org");

    let commits = h.vcs.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].message, NORMALIZE_COMMIT_MESSAGE);
    assert_eq!(commits[0].paths, vec![p("sites/b-org/site.yml")]);

    let skipped: Vec<_> = outcome
        .report
        .findings
        .iter()
        .filter(|f| f.kind == FindingKind::Write)
        .collect();
    assert_eq!(skipped.len(), 1);
    assert!(!skipped[0].is_blocking());
    assert_eq!(skipped[0].path, Some(p("sites/a-org/site.yml")));
}

#[tokio::test]
async fn trailing_slash_duplicate_is_advisory_for_generated_results() {
    let vcs = FakeVersionControl::new().with_added(["sites/foo-a/site.yml"]);
    let store = MemoryCatalogStore::new()
        .with_entries("sites/foo-a/site.yml", vec![site("foo-a", "https://foo.org/")])
        .with_entries("sites/foo-b/site.yml", vec![site("foo-b", "https://foo.org")]);
    let h = Harness::new(
        vcs,
        store,
        ScriptedAdjudicator::replying(reply(vec![decision("sites/foo-a/site.yml", 0, "accept")])),
    );

    let outcome = h.run().await;

    let dup = outcome
        .report
        .findings
        .iter()
        .find(|f| f.kind == FindingKind::DuplicateUrl)
        .expect("duplicate finding");
    assert!(!dup.is_blocking());
    assert!(dup.message.contains("sites/foo-a/site.yml[0], sites/foo-b/site.yml[0]"));
    assert_eq!(outcome.report.status, RunStatus::Approved);
}

#[tokio::test]
async fn rejection_dominates_and_clears_the_marker() {
    let vcs = FakeVersionControl::new().with_modified(["sites/a-org/site.yml"]);
    let store = MemoryCatalogStore::new().with_entries(
        "sites/a-org/site.yml",
        vec![
            site("a-org", "https://a.org"),
            site("b-org", "https://b.org"),
            site("c-org", "https://c.org"),
        ],
    );
    let mut accept = decision("sites/a-org/site.yml", 0, "accept");
    accept["proposed_entry"] = site("a-org", "https://a.org");
    let mut h = Harness::new(
        vcs,
        store,
        ScriptedAdjudicator::replying(reply(vec![
            accept,
            decision("sites/a-org/site.yml", 1, "accept"),
            decision("sites/a-org/site.yml", 2, "reject"),
        ])),
    );
    h.flags.review_mode = ReviewMode::Autofix;
    h.marker = Arc::new(MemoryApprovalMarker::already_set());

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::Rejected);
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(outcome.report.tally.accept, 2);
    assert!(!h.marker.is_set());
    assert!(h.vcs.commits().is_empty());
    assert!(h.store.written().is_empty());
}

#[tokio::test]
async fn needs_changes_is_done_without_approval() {
    let vcs = FakeVersionControl::new().with_modified(["sites/a-org/site.yml"]);
    let store = MemoryCatalogStore::new()
        .with_entries("sites/a-org/site.yml", vec![site("a-org", "https://a.org")]);
    let h = Harness::new(
        vcs,
        store,
        ScriptedAdjudicator::replying(reply(vec![decision("sites/a-org/site.yml", 0, "needs_changes")])),
    );

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::NeedsChanges);
    assert_eq!(outcome.exit_code(), 0);
    assert!(!h.marker.is_set());
}

#[tokio::test]
async fn schema_violations_block_before_adjudication() {
    let vcs = FakeVersionControl::new().with_modified(["sites/a-org/site.yml"]);
    let mut bad = site("a-org", "https://a.org");
    bad["category"] = json!("casinos");
    bad["extra"] = json!(true);
    let store = MemoryCatalogStore::new().with_entries("sites/a-org/site.yml", vec![bad]);
    let h = Harness::new(vcs, store, ScriptedAdjudicator::failing(500));

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::Failed);
    let schema: Vec<_> = outcome
        .report
        .findings
        .iter()
        .filter(|f| f.kind == FindingKind::Schema)
        .collect();
    assert_eq!(schema.len(), 2);
    assert!(h.adjudicator.requests().is_empty());
}

#[tokio::test]
async fn unreachable_url_is_advisory_and_forwarded() {
    let vcs = FakeVersionControl::new().with_modified(["sites/a-org/site.yml"]);
    let store = MemoryCatalogStore::new()
        .with_entries("sites/a-org/site.yml", vec![site("a-org", "https://a.org")]);
    let mut h = Harness::new(
        vcs,
        store,
        ScriptedAdjudicator::replying(reply(vec![decision("sites/a-org/site.yml", 0, "accept")])),
    );
    h.probe = Arc::new(StaticProbe::new().with(
        "https://a.org",
        ProbeOutcome::Unreachable {
            reason: "HTTP 503".into(),
        },
    ));

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::Approved);
    assert!(outcome.report.findings.iter().any(|f| f.kind == FindingKind::Reachability));
    assert_eq!(
        h.adjudicator.requests()[0].url_checks["https://a.org"],
        "fail: HTTP 503"
    );
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_adjudication_fails_and_clears_the_marker() {
    let vcs = FakeVersionControl::new().with_modified(["sites/a-org/site.yml"]);
    let store = MemoryCatalogStore::new()
        .with_entries("sites/a-org/site.yml", vec![site("a-org", "https://a.org")]);
    let mut h = Harness::new(vcs, store, ScriptedAdjudicator::replying("Looks fine to me!"));
    h.marker = Arc::new(MemoryApprovalMarker::already_set());

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::Failed);
    assert!(outcome.report.error.as_deref().unwrap().contains("Adjudication failed"));
    assert!(!h.marker.is_set());
    assert_eq!(h.comments.comments().len(), 1);
}

#[tokio::test]
async fn adjudication_service_error_is_terminal() {
    let vcs = FakeVersionControl::new().with_modified(["sites/a-org/site.yml"]);
    let store = MemoryCatalogStore::new()
        .with_entries("sites/a-org/site.yml", vec![site("a-org", "https://a.org")]);
    let h = Harness::new(vcs, store, ScriptedAdjudicator::failing(502));

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::Failed);
    assert!(outcome.report.error.as_deref().unwrap().contains("HTTP 502"));
}

#[tokio::test]
async fn commit_failure_is_a_warning_and_keeps_approval() {
    let vcs = FakeVersionControl::new()
        .with_modified(["sites/a-org/site.yml"])
        .with_failing_commit();
    let store = MemoryCatalogStore::new()
        .with_entries("sites/a-org/site.yml", vec![site("a-org", "https://a.org")]);
    let mut accept = decision("sites/a-org/site.yml", 0, "accept");
    accept["proposed_entry"] = site("a-org", "https://a.org");
    let mut h = Harness::new(vcs, store, ScriptedAdjudicator::replying(reply(vec![accept])));
    h.flags.review_mode = ReviewMode::Autofix;

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::Approved);
    assert_eq!(outcome.exit_code(), 0);
    assert!(h.marker.is_set());
    assert_eq!(outcome.report.warnings.len(), 1);
    assert!(outcome.report.warnings[0].contains("commit failed"));
    assert!(h.comments.comments()[0].contains("commit failed"));
}

#[tokio::test]
async fn missing_base_ref_fails_with_a_comment() {
    let vcs = FakeVersionControl::new().with_missing_base();
    let h = Harness::new(vcs, MemoryCatalogStore::new(), ScriptedAdjudicator::failing(500));

    let outcome = h.run().await;

    assert_eq!(outcome.report.status, RunStatus::Failed);
    assert!(outcome.report.error.as_deref().unwrap().contains("origin/main"));
    assert_eq!(h.comments.comments().len(), 1);
}

#[tokio::test]
async fn comment_failure_does_not_change_the_exit_code() {
    let (vcs, store) = submission_pr("https://example.com");
    let mut h = Harness::new(vcs, store, ScriptedAdjudicator::failing(500));
    h.comments = Arc::new(RecordingCommentSink::failing());

    let outcome = h.run().await;

    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(h.comments.comments().len(), 1);
}

#[tokio::test]
async fn maintainer_operational_changes_ride_along_with_entries() {
    let vcs = FakeVersionControl::new()
        .with_modified(["sites/a-org/site.yml", ".github/workflows/review.yml"]);
    let store = MemoryCatalogStore::new()
        .with_entries("sites/a-org/site.yml", vec![site("a-org", "https://a.org")]);
    let mut h = Harness::new(
        vcs,
        store,
        ScriptedAdjudicator::replying(reply(vec![decision("sites/a-org/site.yml", 0, "accept")])),
    );
    h.actor = "maintainer";

    let outcome = h.run().await;

    assert_eq!(outcome.report.shape.as_deref(), Some("generated_result"));
    assert_eq!(outcome.report.status, RunStatus::Approved);
}
