use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::http::{next_link, read_json, send};
use super::{DestinationTracker, IssueComment, IssuePatch, IssueSnapshot};
use crate::config::GitHubConfig;
use crate::model::import::{ImportJob, ImportPayload};

const USER_AGENT: &str = "tracker-bridge issue import";
const V3_MEDIA_TYPE: &str = "application/vnd.github.v3+json";
/// The issue import API is still behind a preview media type.
const IMPORT_MEDIA_TYPE: &str = "application/vnd.github.golden-comet-preview+json";

pub struct GitHubClient {
    api_url: String,
    token: String,
    client: reqwest::Client,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.request_as(method, url, V3_MEDIA_TYPE)
    }

    fn request_as(
        &self,
        method: reqwest::Method,
        url: &str,
        accept: &str,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("token {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", accept)
    }

    fn issue_url(&self, issue_path: &str) -> String {
        format!("{}/repos/{issue_path}", self.api_url)
    }

    /// Fetch every page of a list endpoint by following `Link: rel="next"`.
    async fn paginate<T: DeserializeOwned>(&self, first_url: String) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first_url);
        while let Some(url) = next {
            tracing::debug!(%url, "requesting page");
            let resp = send(self.request(reqwest::Method::GET, &url), "GET", &url).await?;
            next = next_link(resp.headers());
            let page: Vec<T> = read_json(resp, &url).await?;
            items.extend(page);
        }
        Ok(items)
    }

    /// Open issues of `repo` carrying all of `labels` (comma separated).
    pub async fn list_issues(&self, repo: &str, labels: &str) -> Result<Vec<GhIssue>> {
        let url = format!(
            "{}/repos/{repo}/issues?labels={}&per_page=100",
            self.api_url,
            urlencoding::encode(labels)
        );
        self.paginate(url)
            .await
            .with_context(|| format!("Failed to list issues of {repo}"))
    }

    pub async fn list_issue_comments(&self, comments_url: &str) -> Result<Vec<GhComment>> {
        self.paginate(format!("{comments_url}?per_page=100")).await
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhIssue {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub comments_url: String,
    pub created_at: String,
    pub user: GhUser,
    #[serde(default)]
    pub labels: Vec<GhLabel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhUser {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhLabel {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhComment {
    pub url: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub created_at: String,
    pub user: GhUser,
}

#[derive(Deserialize)]
struct GhIssueText {
    title: String,
    #[serde(default)]
    body: Option<String>,
}

#[async_trait]
impl DestinationTracker for GitHubClient {
    fn name(&self) -> &str {
        "GitHub"
    }

    async fn submit_import(&self, repo: &str, payload: &ImportPayload) -> Result<ImportJob> {
        let url = format!("{}/repos/{repo}/import/issues", self.api_url);
        let request = self
            .request_as(reqwest::Method::POST, &url, IMPORT_MEDIA_TYPE)
            .json(payload);
        let resp = send(request, "POST", &url).await.inspect_err(|e| {
            tracing::error!(title = %payload.issue.title, error = %e, "error from github");
        })?;
        Ok(read_json(resp, &url).await?)
    }

    async fn poll_import(&self, job_url: &str) -> Result<ImportJob> {
        let request = self.request_as(reqwest::Method::GET, job_url, IMPORT_MEDIA_TYPE);
        let resp = send(request, "GET", job_url).await?;
        Ok(read_json(resp, job_url).await?)
    }

    async fn get_issue(&self, issue_path: &str) -> Result<IssueSnapshot> {
        let url = self.issue_url(issue_path);
        let resp = send(self.request(reqwest::Method::GET, &url), "GET", &url).await?;
        let issue: GhIssueText = read_json(resp, &url).await?;
        Ok(IssueSnapshot {
            title: issue.title,
            body: issue.body.unwrap_or_default(),
        })
    }

    async fn patch_issue(&self, issue_path: &str, patch: &IssuePatch) -> Result<()> {
        let url = self.issue_url(issue_path);
        let request = self.request(reqwest::Method::PATCH, &url).json(patch);
        send(request, "PATCH", &url).await?;
        Ok(())
    }

    async fn list_comments(&self, issue_path: &str) -> Result<Vec<IssueComment>> {
        let comments_url = format!("{}/comments", self.issue_url(issue_path));
        let comments = self.list_issue_comments(&comments_url).await?;
        Ok(comments
            .into_iter()
            .map(|c| IssueComment {
                url: c.url,
                body: c.body.unwrap_or_default(),
            })
            .collect())
    }

    async fn patch_comment(&self, comment_url: &str, body: &str) -> Result<()> {
        let request = self
            .request(reqwest::Method::PATCH, comment_url)
            .json(&serde_json::json!({ "body": body }));
        send(request, "PATCH", comment_url).await?;
        Ok(())
    }

    async fn post_comment(&self, issue_path: &str, body: &str) -> Result<()> {
        let url = format!("{}/comments", self.issue_url(issue_path));
        let request = self
            .request(reqwest::Method::POST, &url)
            .json(&serde_json::json!({ "body": body }));
        send(request, "POST", &url).await?;
        Ok(())
    }
}
