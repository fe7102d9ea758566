//! In-memory trackers for the export, import and cross-linking tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::jira::{JiraIssue, JiraUser, RemoteLink, RemoteObject, SearchPage};
use super::{DestinationTracker, IssueComment, IssuePatch, IssueSnapshot, SourceTracker};
use crate::model::import::{ImportJob, ImportPayload};

pub const API: &str = "https://api.github.com";

#[derive(Default)]
pub struct MockState {
    pub calls: Vec<String>,
    pub submitted: Vec<ImportPayload>,
    pub issues: BTreeMap<String, IssueSnapshot>,
    /// issue path -> comments in order.
    pub comments: BTreeMap<String, Vec<IssueComment>>,
    /// Polls that answer "pending" before the job completes, per job url.
    pub pending_polls: HashMap<String, usize>,
    pub failing_jobs: HashSet<String>,
    /// Submissions whose title contains this text are rejected with HTTP 422.
    pub reject_title: Option<String>,
}

#[derive(Default)]
pub struct MockDestination {
    pub state: Mutex<MockState>,
}

impl MockDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_url(n: usize) -> String {
        format!("{API}/repos/org/repo/import/issues/{n}")
    }

    pub fn with_issue(self, path: &str, title: &str, body: &str) -> Self {
        self.state.lock().unwrap().issues.insert(
            path.to_string(),
            IssueSnapshot {
                title: title.to_string(),
                body: body.to_string(),
            },
        );
        self
    }

    pub fn with_comment(self, path: &str, url: &str, body: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .comments
            .entry(path.to_string())
            .or_default()
            .push(IssueComment {
                url: url.to_string(),
                body: body.to_string(),
            });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn issue(&self, path: &str) -> IssueSnapshot {
        self.state.lock().unwrap().issues[path].clone()
    }

    pub fn comment_body(&self, url: &str) -> String {
        let state = self.state.lock().unwrap();
        state
            .comments
            .values()
            .flatten()
            .find(|c| c.url == url)
            .map(|c| c.body.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DestinationTracker for MockDestination {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn submit_import(&self, repo: &str, payload: &ImportPayload) -> Result<ImportJob> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("submit {repo} {}", payload.issue.title));
        if let Some(reject) = &state.reject_title {
            if payload.issue.title.contains(reject.as_str()) {
                anyhow::bail!("POST {API}/repos/{repo}/import/issues returned HTTP 422");
            }
        }
        state.submitted.push(payload.clone());
        Ok(ImportJob {
            status: "pending".into(),
            url: Some(Self::job_url(state.submitted.len())),
            ..ImportJob::default()
        })
    }

    async fn poll_import(&self, job_url: &str) -> Result<ImportJob> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("poll {job_url}"));

        if let Some(remaining) = state.pending_polls.get_mut(job_url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(ImportJob {
                    status: "pending".into(),
                    url: Some(job_url.to_string()),
                    ..ImportJob::default()
                });
            }
        }

        if state.failing_jobs.contains(job_url) {
            return Ok(ImportJob {
                status: "failed".into(),
                url: Some(job_url.to_string()),
                errors: vec![serde_json::json!({"code": "invalid", "field": "labels"})],
                ..ImportJob::default()
            });
        }

        let number = job_url.rsplit('/').next().unwrap_or("0");
        Ok(ImportJob {
            status: "imported".into(),
            url: Some(job_url.to_string()),
            issue_url: Some(format!("{API}/repos/org/repo/issues/{number}")),
            errors: vec![],
        })
    }

    async fn get_issue(&self, issue_path: &str) -> Result<IssueSnapshot> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("get {issue_path}"));
        match state.issues.get(issue_path) {
            Some(issue) => Ok(issue.clone()),
            None => anyhow::bail!("GET {issue_path} returned HTTP 404"),
        }
    }

    async fn patch_issue(&self, issue_path: &str, patch: &IssuePatch) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("patch {issue_path}"));
        let issue = state
            .issues
            .get_mut(issue_path)
            .ok_or_else(|| anyhow::anyhow!("PATCH {issue_path} returned HTTP 404"))?;
        if let Some(title) = &patch.title {
            issue.title = title.clone();
        }
        if let Some(body) = &patch.body {
            issue.body = body.clone();
        }
        Ok(())
    }

    async fn list_comments(&self, issue_path: &str) -> Result<Vec<IssueComment>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("comments {issue_path}"));
        Ok(state.comments.get(issue_path).cloned().unwrap_or_default())
    }

    async fn patch_comment(&self, comment_url: &str, body: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("patch-comment {comment_url}"));
        let comment = state
            .comments
            .values_mut()
            .flatten()
            .find(|c| c.url == comment_url)
            .ok_or_else(|| anyhow::anyhow!("PATCH {comment_url} returned HTTP 404"))?;
        comment.body = body.to_string();
        Ok(())
    }

    async fn post_comment(&self, issue_path: &str, body: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("post-comment {issue_path}"));
        let comments = state.comments.entry(issue_path.to_string()).or_default();
        let url = format!("{API}/repos/{issue_path}/comments/{}", comments.len() + 1);
        comments.push(IssueComment {
            url,
            body: body.to_string(),
        });
        Ok(())
    }
}

pub const JIRA: &str = "https://jira.example.org";

#[derive(Default)]
pub struct MockSourceState {
    pub searches: Vec<usize>,
    /// (key, body) of every comment posted.
    pub posted: Vec<(String, String)>,
    /// Posting a comment on this key fails with HTTP 403.
    pub reject_key: Option<String>,
    /// Per-ticket lookups currently running, and the most seen at once.
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

/// Source tracker serving a fixed list of tickets, `page_size` at a time.
pub struct MockSource {
    page_size: usize,
    issues: Vec<JiraIssue>,
    remote_links: HashMap<String, Vec<RemoteLink>>,
    watchers: HashMap<String, Vec<JiraUser>>,
    pub state: Mutex<MockSourceState>,
}

impl MockSource {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            issues: Vec::new(),
            remote_links: HashMap::new(),
            watchers: HashMap::new(),
            state: Mutex::new(MockSourceState::default()),
        }
    }

    pub fn with_issue(mut self, issue: JiraIssue) -> Self {
        self.issues.push(issue);
        self
    }

    pub fn with_remote_link(mut self, key: &str, title: &str, url: &str) -> Self {
        self.remote_links
            .entry(key.to_string())
            .or_default()
            .push(RemoteLink {
                object: RemoteObject {
                    title: title.to_string(),
                    url: url.to_string(),
                },
            });
        self
    }

    /// Watchers as (name, display name) pairs.
    pub fn with_watchers(mut self, watches_url: &str, users: &[(&str, &str)]) -> Self {
        let users = users
            .iter()
            .map(|(name, display_name)| JiraUser {
                name: name.to_string(),
                display_name: display_name.to_string(),
            })
            .collect();
        self.watchers.insert(watches_url.to_string(), users);
        self
    }

    pub fn searches(&self) -> Vec<usize> {
        self.state.lock().unwrap().searches.clone()
    }

    pub fn posted(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().posted.clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.state.lock().unwrap().peak_in_flight
    }

    /// Count a lookup as running across one scheduler turn, so concurrent callers overlap.
    async fn lookup<T>(&self, value: T) -> T {
        {
            let mut state = self.state.lock().unwrap();
            state.in_flight += 1;
            state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
        }
        tokio::task::yield_now().await;
        self.state.lock().unwrap().in_flight -= 1;
        value
    }
}

#[async_trait]
impl SourceTracker for MockSource {
    fn name(&self) -> &str {
        "MockSource"
    }

    async fn search(&self, _jql: &str, start_at: usize) -> Result<SearchPage> {
        self.state.lock().unwrap().searches.push(start_at);
        let end = (start_at + self.page_size).min(self.issues.len());
        Ok(SearchPage {
            start_at,
            total: self.issues.len(),
            issues: self.issues.get(start_at..end).unwrap_or_default().to_vec(),
        })
    }

    async fn remote_links(&self, key: &str) -> Result<Vec<RemoteLink>> {
        Ok(self
            .lookup(self.remote_links.get(key).cloned().unwrap_or_default())
            .await)
    }

    async fn watchers(&self, watches_url: &str) -> Result<Vec<JiraUser>> {
        Ok(self
            .lookup(self.watchers.get(watches_url).cloned().unwrap_or_default())
            .await)
    }

    async fn post_comment(&self, key: &str, body: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.reject_key.as_deref() == Some(key) {
            anyhow::bail!("POST {JIRA}/rest/api/2/issue/{key}/comment returned HTTP 403");
        }
        state.posted.push((key.to_string(), body.to_string()));
        Ok(())
    }

    fn browse_url(&self, key: &str) -> String {
        format!("{JIRA}/browse/{key}")
    }
}
