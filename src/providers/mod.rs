pub mod github;
pub mod http;
pub mod jira;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::model::import::{ImportJob, ImportPayload};
use jira::{JiraUser, RemoteLink, SearchPage};

/// Current text of a destination issue.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueSnapshot {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssueComment {
    /// API url of the comment; used to patch it.
    pub url: String,
    pub body: String,
}

/// Fields to change on a destination issue. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IssuePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Read side of the tracker tickets are exported from.
#[async_trait]
pub trait SourceTracker: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, jql: &str, start_at: usize) -> Result<SearchPage>;
    async fn remote_links(&self, key: &str) -> Result<Vec<RemoteLink>>;
    async fn watchers(&self, watches_url: &str) -> Result<Vec<JiraUser>>;
    async fn post_comment(&self, key: &str, body: &str) -> Result<()>;
    fn browse_url(&self, key: &str) -> String;
}

/// The tracker tickets are imported into. Issues are addressed by `owner/repo/issues/N`.
#[async_trait]
pub trait DestinationTracker: Send + Sync {
    fn name(&self) -> &str;
    async fn submit_import(&self, repo: &str, payload: &ImportPayload) -> Result<ImportJob>;
    async fn poll_import(&self, job_url: &str) -> Result<ImportJob>;
    async fn get_issue(&self, issue_path: &str) -> Result<IssueSnapshot>;
    async fn patch_issue(&self, issue_path: &str, patch: &IssuePatch) -> Result<()>;
    async fn list_comments(&self, issue_path: &str) -> Result<Vec<IssueComment>>;
    async fn patch_comment(&self, comment_url: &str, body: &str) -> Result<()>;
    async fn post_comment(&self, issue_path: &str, body: &str) -> Result<()>;
}

#[cfg(test)]
pub mod mock;
