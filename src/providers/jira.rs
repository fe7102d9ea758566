use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;

use super::http::{read_json, send};
use super::SourceTracker;
use crate::config::JiraConfig;
use crate::error::ApiError;

pub struct JiraClient {
    base_url: String,
    auth_header: String,
    client: reqwest::Client,
}

impl JiraClient {
    pub fn new(config: &JiraConfig) -> Self {
        let creds = format!("{}:{}", config.username, config.api_token);
        let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            auth_header: format!("Basic {encoded}"),
            client: reqwest::Client::new(),
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub start_at: usize,
    pub total: usize,
    #[serde(default)]
    pub issues: Vec<JiraIssue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraIssue {
    pub key: String,
    pub fields: IssueFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueFields {
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created: String,
    #[serde(default)]
    pub reporter: Option<JiraUser>,
    #[serde(default)]
    pub priority: Option<NamedField>,
    #[serde(default)]
    pub issuetype: Option<NamedField>,
    #[serde(default)]
    pub status: Option<NamedField>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub comment: Option<CommentPage>,
    #[serde(default)]
    pub attachment: Vec<Attachment>,
    #[serde(default)]
    pub issuelinks: Vec<IssueLink>,
    #[serde(default)]
    pub watches: Option<Watches>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedField {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentPage {
    #[serde(default)]
    pub comments: Vec<JiraComment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraComment {
    pub author: JiraUser,
    #[serde(default)]
    pub body: Option<String>,
    pub created: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    /// Download url of the attachment.
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueLink {
    #[serde(rename = "type")]
    pub link_type: LinkType,
    #[serde(default)]
    pub inward_issue: Option<LinkedIssue>,
    #[serde(default)]
    pub outward_issue: Option<LinkedIssue>,
}

/// Labels for each side of a link, e.g. `blocks` / `is blocked by`.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkType {
    pub inward: String,
    pub outward: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkedIssue {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Watches {
    #[serde(rename = "self")]
    pub self_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteLink {
    pub object: RemoteObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteObject {
    pub title: String,
    pub url: String,
}

#[derive(Deserialize)]
struct WatchersResponse {
    #[serde(default)]
    watchers: Vec<JiraUser>,
}

#[async_trait]
impl SourceTracker for JiraClient {
    fn name(&self) -> &str {
        "Jira"
    }

    async fn search(&self, jql: &str, start_at: usize) -> Result<SearchPage> {
        let url = format!(
            "{}/rest/api/2/search?jql={}&fields=*all&startAt={start_at}",
            self.base_url,
            urlencoding::encode(jql)
        );
        let resp = send(self.get(&url), "GET", &url).await?;
        let page = read_json(resp, &url)
            .await
            .context("Failed to parse Jira search response")?;
        Ok(page)
    }

    async fn remote_links(&self, key: &str) -> Result<Vec<RemoteLink>> {
        let url = format!("{}/rest/api/2/issue/{key}/remotelink", self.base_url);
        let resp = send(self.get(&url), "GET", &url).await?;
        let links = read_json(resp, &url)
            .await
            .with_context(|| format!("Failed to parse remote links of {key}"))?;
        Ok(links)
    }

    async fn watchers(&self, watches_url: &str) -> Result<Vec<JiraUser>> {
        let resp = send(self.get(watches_url), "GET", watches_url).await?;
        let watchers: WatchersResponse = read_json(resp, watches_url).await?;
        Ok(watchers.watchers)
    }

    async fn post_comment(&self, key: &str, body: &str) -> Result<()> {
        let url = format!("{}/rest/api/2/issue/{key}/comment", self.base_url);
        let request = self
            .client
            .post(&url)
            .header("Authorization", &self.auth_header)
            .json(&serde_json::json!({ "body": body }));

        send(request, "POST", &url).await.inspect_err(|e| {
            if let ApiError::Http { status, body, .. } = e {
                tracing::error!(%key, %status, %body, "error from jira");
            }
        })?;
        Ok(())
    }

    fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{key}", self.base_url)
    }
}
