//! GitHub implementation of the [`PrAdapter`] contract.

use crate::{CreatedPr, PrAdapter, PrError, PullRequestSpec, RepoRef};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};

/// GitHub REST adapter.
pub struct GithubAdapter {
    client: Client,
    token: String,
    base_url: String,
}

impl GithubAdapter {
    /// Default API endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.github.com";

    /// Create an adapter against the default endpoint.
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, Self::DEFAULT_BASE_URL)
    }

    /// Create an adapter against a custom endpoint. Tests point this at a
    /// mock server.
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            base_url: base_url.into(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .header("accept", "application/vnd.github+json")
            .header("user-agent", "trcoder")
    }
}

async fn fail(response: Response) -> PrError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED => PrError::Auth(body),
        StatusCode::FORBIDDEN => {
            if body.contains("rate limit") {
                PrError::RateLimit
            } else {
                PrError::Auth(body)
            }
        }
        StatusCode::NOT_FOUND => PrError::NotFound(body),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => PrError::Conflict(body),
        StatusCode::TOO_MANY_REQUESTS => PrError::RateLimit,
        _ => PrError::Transport(format!("{status}: {body}")),
    }
}

fn transport(err: reqwest::Error) -> PrError {
    PrError::Transport(err.to_string())
}

#[async_trait]
impl PrAdapter for GithubAdapter {
    async fn default_branch(&self, repo: &RepoRef) -> Result<String, PrError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/{}", repo.owner, repo.name),
            )
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(fail(response).await);
        }
        let payload: Value = response.json().await.map_err(transport)?;
        Ok(payload["default_branch"]
            .as_str()
            .unwrap_or("main")
            .to_string())
    }

    async fn branch_exists(&self, repo: &RepoRef, branch: &str) -> Result<bool, PrError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/{}/branches/{branch}", repo.owner, repo.name),
            )
            .send()
            .await
            .map_err(transport)?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(fail(response).await),
        }
    }

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        spec: &PullRequestSpec,
    ) -> Result<CreatedPr, PrError> {
        let body = json!({
            "title": spec.title,
            "body": spec.body,
            "head": spec.source,
            "base": spec.target,
            "draft": spec.draft,
        });
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/pulls", repo.owner, repo.name),
            )
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(fail(response).await);
        }
        let payload: Value = response.json().await.map_err(transport)?;
        Ok(CreatedPr {
            number: payload["number"].as_u64().unwrap_or(0),
            url: payload["html_url"].as_str().unwrap_or_default().to_string(),
        })
    }
}
