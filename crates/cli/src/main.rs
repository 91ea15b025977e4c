//! `atlasgate`: the catalog PR gatekeeper.
//!
//! This binary is the composition root. It
//!
//! 1. loads `.atlasgate/config.toml` as committed on the base ref (never from
//!    the PR head) and folds environment overrides into an immutable
//!    [`RunContext`];
//! 2. wires `tracing-subscriber` (human or JSON) and, optionally, an OTLP span
//!    exporter;
//! 3. constructs the infrastructure adapters and injects them into
//!    [`PipelineExecutor`];
//! 4. maps the run's terminal state to the process exit code.

mod config;
mod event;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use catalog::{load_policy, FileApprovalMarker, HttpReachabilityProbe, YamlCatalogStore};
use github::{GitCli, GitHubClient};
use llm::{OpenAiConfig, OpenAiProvider};
use nodes::{PipelineExecutor, Ports, RunReport, RunStatus};
use pipeline::adjudication::AdjudicationRequest;
use pipeline::context::{Identity, ReviewMode, RunContext, RunFlags};
use pipeline::ports::{
    Adjudicator, ApprovalMarker, CommentError, CommentSink, ContentGenerator, ServiceError,
};
use pipeline::submission::validate_submission_text;
use pipeline::{
    ActorLogin, GitRef, PipelineRunId, PullRequestId, RepoPath, RepositoryId, Timestamp,
};

use crate::config::{GateConfig, DEFAULT_BASE_REF, DEFAULT_CONFIG_PATH};
use crate::event::PullRequestEvent;

#[derive(Parser)]
#[command(name = "atlasgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Classify and adjudicate catalog pull requests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Review the current pull request and set or clear the approval marker
    Review(ReviewArgs),

    /// Check a submission file's format without contacting any service
    CheckSubmission {
        /// Path to the submission file
        file: PathBuf,
    },
}

#[derive(clap::Args)]
struct ReviewArgs {
    /// Config file (default: .atlasgate/config.toml read from the base ref, optional)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Repository checkout to review
    #[arg(long, default_value = ".")]
    repo_root: PathBuf,

    /// Integration branch ref (overrides the event payload and config)
    #[arg(long)]
    base: Option<String>,

    /// PR head ref
    #[arg(long)]
    head: Option<String>,

    /// Print the run report as JSON on stdout and log as JSON
    #[arg(long)]
    json: bool,

    /// OTLP gRPC endpoint for span export
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    /// `owner/name`, used when the event payload has none
    #[arg(long, env = "GITHUB_REPOSITORY")]
    repository: Option<String>,

    /// Path to the pull-request event payload
    #[arg(long, env = "GITHUB_EVENT_PATH")]
    event_path: PathBuf,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// comment-only or autofix
    #[arg(long, env = "REVIEW_MODE")]
    review_mode: Option<ReviewMode>,

    /// Probe entry URLs with HEAD requests
    #[arg(long, env = "ENABLE_URL_FETCH", value_parser = BoolishValueParser::new())]
    probe_urls: Option<bool>,

    /// Expand contributor submissions into full entries
    #[arg(long, env = "ENABLE_GENERATION", value_parser = BoolishValueParser::new())]
    generate_entries: Option<bool>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Commands::CheckSubmission { file } => ExitCode::from(check_submission(&file)),
        Commands::Review(args) => {
            let _telemetry = match telemetry::init(args.json, args.otlp_endpoint.as_deref()) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("error: {e:#}");
                    return ExitCode::FAILURE;
                }
            };
            match review(args).await {
                Ok(code) => ExitCode::from(code),
                Err(e) => {
                    error!(error = %format!("{e:#}"), "Review could not start");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn check_submission(file: &std::path::Path) -> u8 {
    let text = match std::fs::read_to_string(file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: cannot read {}: {e}", file.display());
            return 1;
        }
    };
    match validate_submission_text(&text) {
        Ok(record) => {
            println!("ok: {} (line {})", record.url, record.line);
            0
        }
        Err(violations) => {
            for violation in violations {
                println!("{}: {violation}", file.display());
            }
            1
        }
    }
}

async fn review(args: ReviewArgs) -> Result<u8> {
    // Without an event there is no pull request to report on.
    let payload = std::fs::read_to_string(&args.event_path)
        .with_context(|| format!("reading event payload {}", args.event_path.display()))?;
    let event = PullRequestEvent::parse(&payload, args.repository.as_deref())?;

    let git = GitCli::new(&args.repo_root);
    let loaded = load_config(&args, &git, &event);

    // The report sink and the marker exist even when the config does not load,
    // so a failed start still clears a stale approval and gets its report.
    let fallback = GateConfig::default();
    let settings = loaded.as_ref().unwrap_or(&fallback);
    let comments = comment_sink(&args, settings)?;
    let marker = FileApprovalMarker::new(args.repo_root.join(&settings.catalog.marker));

    let prepared = loaded.and_then(|config| {
        let ctx = run_context(&args, &config, &event)?;
        let policy = load_policy(&args.repo_root, &config.policy)?;
        Ok((config, ctx, policy))
    });
    let (config, ctx, policy) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            let report = startup_failure(&event, &marker, comments.as_ref(), &e).await;
            emit(&report, args.json)?;
            return Ok(RunStatus::Failed.exit_code());
        }
    };
    info!(
        run_id = %ctx.run_id,
        pr = %ctx.pull_request,
        actor = %ctx.identity.actor,
        base = %ctx.base_ref,
        "Starting review"
    );

    let adjudicator: Arc<dyn Adjudicator>;
    let mut generator: Option<Arc<dyn ContentGenerator>> = None;
    match args.openai_api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => {
            let provider = Arc::new(OpenAiProvider::new(OpenAiConfig {
                base_url: config.model.base_url.clone(),
                model: config.model.model.clone(),
                api_key: key.to_string(),
                timeout: Duration::from_secs(config.model.timeout_secs),
            })?);
            if ctx.flags.generate_entries {
                generator = Some(provider.clone());
            }
            adjudicator = provider;
        }
        None => {
            warn!("OPENAI_API_KEY is not set; adjudication will fail");
            adjudicator = Arc::new(NoModel);
        }
    }

    let ports = Ports {
        vcs: Arc::new(git),
        store: Arc::new(YamlCatalogStore::new(&args.repo_root)),
        marker: Arc::new(marker),
        comments,
        adjudicator,
        generator,
        probe: Arc::new(HttpReachabilityProbe::new(Duration::from_secs(
            config.catalog.probe_timeout_secs,
        ))?),
    };

    let outcome = PipelineExecutor::new(ctx, policy, ports).run().await;
    emit(&outcome.report, args.json)?;
    Ok(outcome.exit_code())
}

/// Loads the run configuration from a source the pull request cannot edit.
///
/// `--config` names a file outside the checkout. Otherwise
/// `.atlasgate/config.toml` is read as committed on the base ref; the copy in
/// the working tree is the PR head and is never consulted. A file absent on
/// the base ref means defaults.
fn load_config(args: &ReviewArgs, git: &GitCli, event: &PullRequestEvent) -> Result<GateConfig> {
    if let Some(path) = &args.config {
        return GateConfig::load(path, true);
    }
    let base = GitRef::new(config_base(args, event))
        .ok_or_else(|| anyhow!("base ref must not be empty"))?;
    let path = RepoPath::new(DEFAULT_CONFIG_PATH)
        .ok_or_else(|| anyhow!("config path must not be empty"))?;
    let text = git
        .read_at(&base, &path)
        .with_context(|| format!("reading {DEFAULT_CONFIG_PATH} at {base}"))?;
    match text {
        Some(text) => GateConfig::parse(&text)
            .with_context(|| format!("parsing {DEFAULT_CONFIG_PATH} at {base}")),
        None => Ok(GateConfig::default()),
    }
}

/// The ref the config is read at. `review.base_ref` cannot take part: it
/// lives in the file being located.
fn config_base(args: &ReviewArgs, event: &PullRequestEvent) -> String {
    args.base
        .clone()
        .or_else(|| event.base_branch.as_ref().map(|b| format!("origin/{b}")))
        .unwrap_or_else(|| DEFAULT_BASE_REF.to_string())
}

/// Reports a run that failed before the pipeline started.
///
/// The approval marker is cleared first so an approval from an earlier run
/// cannot outlive this one.
async fn startup_failure(
    event: &PullRequestEvent,
    marker: &dyn ApprovalMarker,
    comments: &dyn CommentSink,
    cause: &anyhow::Error,
) -> RunReport {
    let message = format!("{cause:#}");
    error!(error = %message, "Review could not start");

    let mut report = RunReport::new(
        PipelineRunId::new_random(),
        event.repository.clone(),
        event.pull_request,
    );
    report.error = Some(message);
    if let Err(e) = marker.clear() {
        report.warn(format!("failed to clear the approval marker: {e}"));
    }
    report.finished_at = Some(Timestamp::now());
    if let Err(post) = comments
        .post_comment(&event.repository, event.pull_request, &report.to_markdown())
        .await
    {
        warn!(error = %post, "Failed to post the failure report");
    }
    report
}

fn run_context(args: &ReviewArgs, config: &GateConfig, event: &PullRequestEvent) -> Result<RunContext> {
    let base = args
        .base
        .clone()
        .or_else(|| event.base_branch.as_ref().map(|b| format!("origin/{b}")))
        .unwrap_or_else(|| config.review.base_ref.clone());
    let head = args
        .head
        .clone()
        .unwrap_or_else(|| config.review.head_ref.clone());

    let automation_login = ActorLogin::new(config.github.automation_login.clone())
        .ok_or_else(|| anyhow!("github.automation_login must not be empty"))?;
    let maintainer_logins = config
        .github
        .maintainers
        .iter()
        .filter_map(|m| ActorLogin::new(m.clone()))
        .collect();

    Ok(RunContext {
        run_id: PipelineRunId::new_random(),
        repository: event.repository.clone(),
        pull_request: event.pull_request,
        base_ref: GitRef::new(base).ok_or_else(|| anyhow!("base ref must not be empty"))?,
        head_ref: GitRef::new(head).ok_or_else(|| anyhow!("head ref must not be empty"))?,
        identity: Identity {
            actor: event.actor.clone(),
            automation_login,
            maintainer_logins,
        },
        flags: RunFlags {
            probe_urls: args.probe_urls.unwrap_or(config.review.probe_urls),
            generate_entries: args
                .generate_entries
                .unwrap_or(config.review.generate_entries),
            review_mode: args.review_mode.unwrap_or(config.review.mode),
            push_commits: config.review.push_commits,
        },
        paths: config.catalog_paths()?,
    })
}

fn comment_sink(args: &ReviewArgs, config: &GateConfig) -> Result<Arc<dyn CommentSink>> {
    match args.github_token.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(token) => Ok(Arc::new(GitHubClient::new(
            config.github.api_base.clone(),
            token,
        )?)),
        None => {
            warn!("GITHUB_TOKEN is not set; the report is printed instead of posted");
            Ok(Arc::new(StderrComments))
        }
    }
}

fn emit(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    Ok(())
}

/// Stand-in when no model key is configured; every call fails the run.
struct NoModel;

#[async_trait]
impl Adjudicator for NoModel {
    async fn adjudicate(&self, _request: &AdjudicationRequest) -> Result<String, ServiceError> {
        Err(ServiceError::NotConfigured("OPENAI_API_KEY is not set".into()))
    }
}

/// Local runs without a token: the report goes to stderr.
struct StderrComments;

#[async_trait]
impl CommentSink for StderrComments {
    async fn post_comment(
        &self,
        repository: &RepositoryId,
        pr: PullRequestId,
        body: &str,
    ) -> Result<(), CommentError> {
        eprintln!("{}\n{body}", report_banner(repository, pr));
        Ok(())
    }
}

fn report_banner(repository: &RepositoryId, pr: PullRequestId) -> String {
    format!("--- report for {repository}#{} ---", pr.as_u64())
}
