//! [`CommentSink`] over the GitHub REST API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument};

use pipeline::ports::{CommentError, CommentSink};
use pipeline::{PullRequestId, RepositoryId};

/// Public GitHub API root.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "atlasgate";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors constructing the client.
#[derive(Debug, thiserror::Error)]
pub enum GitHubClientError {
    #[error("GitHub token is empty")]
    MissingToken,
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Authenticated GitHub client, scoped to what a review run needs.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

#[derive(Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

impl GitHubClient {
    /// Builds a client for `api_base` (normally [`DEFAULT_API_BASE`]).
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Result<Self, GitHubClientError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(GitHubClientError::MissingToken);
        }
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl CommentSink for GitHubClient {
    #[instrument(skip_all, fields(repository = %repository, pr = %pr))]
    async fn post_comment(
        &self,
        repository: &RepositoryId,
        pr: PullRequestId,
        body: &str,
    ) -> Result<(), CommentError> {
        // PR conversation comments live on the issues endpoint.
        let url = format!(
            "{}/repos/{}/issues/{}/comments",
            self.api_base,
            repository,
            pr.as_u64()
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .json(&CommentBody { body })
            .send()
            .await
            .map_err(|e| CommentError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CommentError(format!("HTTP {}: {}", status.as_u16(), text)));
        }
        debug!(status = status.as_u16(), "Comment posted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo() -> RepositoryId {
        RepositoryId::new("web-atlas/atlas").unwrap()
    }

    #[tokio::test]
    async fn posts_to_the_issue_comments_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/web-atlas/atlas/issues/42/comments"))
            .and(header("authorization", "Bearer t0ken"))
            .and(header("accept", "application/vnd.github+json"))
            .and(header("x-github-api-version", API_VERSION))
            .and(body_json(serde_json::json!({ "body": "## hello" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitHubClient::new(server.uri(), "t0ken").unwrap();
        client
            .post_comment(&repo(), PullRequestId::new(42), "## hello")
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].url.path(), "/repos/web-atlas/atlas/issues/42/comments");
        assert_eq!(received[0].url.fragment(), None);
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Resource not accessible"))
            .mount(&server)
            .await;

        let client = GitHubClient::new(format!("{}/", server.uri()), "t0ken").unwrap();
        let err = client
            .post_comment(&repo(), PullRequestId::new(1), "x")
            .await
            .unwrap_err();
        assert_eq!(err.0, "HTTP 403: Resource not accessible");
    }

    #[test]
    fn empty_token_is_refused() {
        assert!(matches!(
            GitHubClient::new(DEFAULT_API_BASE, "  "),
            Err(GitHubClientError::MissingToken)
        ));
    }
}
