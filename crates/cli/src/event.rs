//! The pull-request event payload written by the CI system.
//!
//! Only the fields a run needs are read. The actor comes from this
//! authenticated payload, never from PR content.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use pipeline::{ActorLogin, PullRequestId, RepositoryId};

/// What a run takes from the event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    pub repository: RepositoryId,
    pub pull_request: PullRequestId,
    pub actor: ActorLogin,
    /// `pull_request.base.ref`, when present.
    pub base_branch: Option<String>,
}

impl PullRequestEvent {
    /// Parses `payload`. `fallback_repository` (usually `GITHUB_REPOSITORY`)
    /// is used when the payload has no `repository.full_name`.
    pub fn parse(payload: &str, fallback_repository: Option<&str>) -> Result<Self> {
        let doc: Value = serde_json::from_str(payload).context("event payload is not JSON")?;

        let repository = str_at(&doc, &["repository", "full_name"])
            .or(fallback_repository)
            .and_then(RepositoryId::new)
            .ok_or_else(|| anyhow!("event payload names no repository"))?;

        let pull_request = doc
            .pointer("/pull_request/number")
            .or_else(|| doc.get("number"))
            .and_then(Value::as_u64)
            .map(PullRequestId::new)
            .ok_or_else(|| anyhow!("event payload has no pull request number"))?;

        let actor = str_at(&doc, &["sender", "login"])
            .or_else(|| str_at(&doc, &["pull_request", "user", "login"]))
            .and_then(ActorLogin::new)
            .ok_or_else(|| anyhow!("event payload has no actor login"))?;

        let base_branch = str_at(&doc, &["pull_request", "base", "ref"]).map(str::to_string);

        Ok(Self {
            repository,
            pull_request,
            actor,
            base_branch,
        })
    }
}

fn str_at<'a>(doc: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .try_fold(doc, |node, key| node.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_a_pull_request_event() {
        let event = PullRequestEvent::parse(
            r#"{
                "number": 12,
                "pull_request": {
                    "number": 12,
                    "user": { "login": "author" },
                    "base": { "ref": "main" }
                },
                "sender": { "login": "pusher" },
                "repository": { "full_name": "web-atlas/atlas" }
            }"#,
            None,
        )
        .unwrap();
        assert_eq!(event.repository.as_str(), "web-atlas/atlas");
        assert_eq!(event.pull_request, PullRequestId::new(12));
        assert_eq!(event.actor.as_str(), "pusher");
        assert_eq!(event.base_branch.as_deref(), Some("main"));
    }

    #[test]
    fn falls_back_to_pr_author_and_environment_repository() {
        let event = PullRequestEvent::parse(
            r#"{ "number": 3, "pull_request": { "user": { "login": "author" } } }"#,
            Some("web-atlas/atlas"),
        )
        .unwrap();
        assert_eq!(event.actor.as_str(), "author");
        assert_eq!(event.repository.as_str(), "web-atlas/atlas");
        assert_eq!(event.pull_request, PullRequestId::new(3));
        assert_eq!(event.base_branch, None);
    }

    #[test]
    fn missing_number_is_an_error() {
        let err = PullRequestEvent::parse(
            r#"{ "sender": { "login": "x" }, "repository": { "full_name": "a/b" } }"#,
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("pull request number"));
    }
}
