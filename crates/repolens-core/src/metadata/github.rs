use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use super::{IssueTracker, RepositorySummary};
use crate::config::TrackerConfig;

const ACCEPT: &str = "application/vnd.github.v3+json";

/// Issue tracker backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubTracker {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl GithubTracker {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("repolens/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("Accept", ACCEPT);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn checked(response: Response) -> Result<Response> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("GitHub API error ({}): {}", status, body.trim());
        }
        Ok(response)
    }
}

#[async_trait]
impl IssueTracker for GithubTracker {
    async fn open_issues(&self, owner_repo: &str) -> Result<Vec<Value>> {
        debug!(%owner_repo, "fetching open issues");
        let response = self
            .get(&format!("/repos/{owner_repo}/issues"))
            .query(&[("state", "open"), ("per_page", "100")])
            .send()
            .await
            .context("failed to call GitHub issues API")?;
        Self::checked(response)
            .await?
            .json()
            .await
            .context("failed to parse GitHub issues response")
    }

    async fn summary(&self, owner_repo: &str) -> Result<RepositorySummary> {
        let response = self
            .get(&format!("/repos/{owner_repo}"))
            .send()
            .await
            .context("failed to call GitHub repository API")?;
        Self::checked(response)
            .await?
            .json()
            .await
            .context("failed to parse GitHub repository response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn tracker(base_url: String, token: Option<&str>) -> GithubTracker {
        GithubTracker::new(&TrackerConfig {
            base_url,
            token: token.map(str::to_string),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_open_issues() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/repos/acme/widgets/issues")
                    .query_param("state", "open")
                    .header("accept", ACCEPT)
                    .header("authorization", "Bearer gh-token");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"[{"number": 7, "title": "Crash on start", "user": {"login": "dev"}}, {"number": 3, "title": "Docs"}]"#);
            })
            .await;

        let issues = tracker(server.base_url(), Some("gh-token"))
            .open_issues("acme/widgets")
            .await
            .unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0]["number"], 7);
        assert_eq!(issues[1]["title"], "Docs");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/acme/widgets/issues");
                then.status(403).body("rate limited");
            })
            .await;

        let err = tracker(server.base_url(), None)
            .open_issues("acme/widgets")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn parses_repository_summary() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/acme/widgets");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{
                        "full_name": "acme/widgets",
                        "description": null,
                        "stargazers_count": 42,
                        "forks_count": 5,
                        "open_issues_count": 2,
                        "language": "Python",
                        "owner": {"login": "acme", "id": 1},
                        "created_at": "2020-01-01T00:00:00Z",
                        "updated_at": "2024-06-01T12:00:00Z",
                        "private": false
                    }"#);
            })
            .await;

        let summary = tracker(server.base_url(), None)
            .summary("acme/widgets")
            .await
            .unwrap();
        assert_eq!(summary.full_name, "acme/widgets");
        assert_eq!(summary.stargazers_count, 42);
        assert_eq!(summary.owner.login, "acme");
        assert!(summary.description.is_none());
        assert_eq!(summary.language.as_deref(), Some("Python"));
    }
}
