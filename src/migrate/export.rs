use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat};
use futures::{StreamExt, TryStreamExt};
use std::collections::{BTreeMap, HashMap};

use crate::error::MigrationError;
use crate::model::ticket::{LinkDirection, RecordComment, TicketLink, TicketRecord};
use crate::providers::github::{GhComment, GhIssue, GitHubClient};
use crate::providers::jira::{JiraIssue, JiraUser};
use crate::providers::SourceTracker;
use crate::store::records::RecordStore;
use crate::util::markup::jira_to_markdown;

/// Normalize a source timestamp to second precision ISO-8601, e.g.
/// `2017-01-02T10:11:12.000+0000` becomes `2017-01-02T10:11:12+00:00`.
pub fn normalize_time(time: &str) -> Result<String> {
    let parsed = DateTime::parse_from_str(time, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(time))
        .with_context(|| format!("Unrecognised timestamp {time:?}"))?;
    Ok(parsed.to_rfc3339_opts(SecondsFormat::Secs, false))
}

/// Builds records from source tickets.
pub struct JiraExporter<'a> {
    source: &'a dyn SourceTracker,
    store: &'a RecordStore,
    users: &'a HashMap<String, String>,
    omit_reporters: &'a [String],
}

impl<'a> JiraExporter<'a> {
    pub fn new(
        source: &'a dyn SourceTracker,
        store: &'a RecordStore,
        users: &'a HashMap<String, String>,
        omit_reporters: &'a [String],
    ) -> Self {
        Self {
            source,
            store,
            users,
            omit_reporters,
        }
    }

    fn user_handle(&self, user: &JiraUser) -> Option<String> {
        self.users.get(&user.name).map(|login| format!("@{login}"))
    }

    fn user_or_display_name(&self, user: &JiraUser) -> String {
        self.user_handle(user)
            .unwrap_or_else(|| user.display_name.clone())
    }

    /// Export every unresolved ticket of `project`, `workers` tickets at a time.
    /// Returns the number of records written.
    pub async fn export_project(&self, project: &str, workers: usize) -> Result<usize> {
        let jql = format!("project = {project} AND resolution IS EMPTY ORDER BY id ASC");
        let mut start_at = 0;
        let mut written = 0;

        loop {
            let page = self
                .source
                .search(&jql, start_at)
                .await
                .with_context(|| format!("Failed to search {}", self.source.name()))?;
            let fetched = page.issues.len();
            tracing::debug!(start_at = page.start_at, fetched, total = page.total, "fetched page");

            let keys: Vec<String> = futures::stream::iter(page.issues)
                .map(|issue| self.export_issue(issue))
                .buffer_unordered(workers.max(1))
                .try_collect()
                .await?;
            written += keys.len();

            start_at += fetched;
            if fetched == 0 || start_at >= page.total {
                break;
            }
        }

        Ok(written)
    }

    async fn export_issue(&self, issue: JiraIssue) -> Result<String> {
        let key = issue.key.clone();
        tracing::info!(%key, "processing");
        let record = self
            .build_record(issue)
            .await
            .with_context(|| format!("Failed to export {key}"))?;
        self.store.save(&record)?;
        Ok(key)
    }

    async fn build_record(&self, issue: JiraIssue) -> Result<TicketRecord> {
        let JiraIssue { key, fields } = issue;

        let mut body = format!(
            "{}\n\n(Imported from {})",
            jira_to_markdown(fields.description.as_deref()),
            self.source.browse_url(&key)
        );
        if let Some(reporter) = &fields.reporter {
            if !self.omit_reporters.contains(&reporter.name) {
                body.push_str(&format!(
                    "\n\n(Reported by {})",
                    self.user_or_display_name(reporter)
                ));
            }
        }

        let mut comments = Vec::new();
        for comment in fields.comment.map(|page| page.comments).unwrap_or_default() {
            comments.push(RecordComment {
                created_at: normalize_time(&comment.created)?,
                body: format!(
                    "{}\n\n-- {}",
                    jira_to_markdown(comment.body.as_deref()),
                    self.user_or_display_name(&comment.author)
                ),
            });
        }

        let mut links = Vec::new();
        for link in fields.issuelinks {
            let (direction, other, label) = match (link.inward_issue, link.outward_issue) {
                (Some(other), _) => (LinkDirection::Inward, other, link.link_type.inward),
                (None, Some(other)) => (LinkDirection::Outward, other, link.link_type.outward),
                (None, None) => return Err(MigrationError::InvalidLink { key }.into()),
            };
            links.push(TicketLink {
                direction,
                other: other.key,
                link_type: label,
            });
        }

        let remotelinks: BTreeMap<String, String> = self
            .source
            .remote_links(&key)
            .await?
            .into_iter()
            .map(|link| (link.object.title, link.object.url))
            .collect();

        let watchers = match &fields.watches {
            Some(watches) => self
                .source
                .watchers(&watches.self_url)
                .await?
                .iter()
                .filter_map(|user| self.user_handle(user))
                .collect(),
            None => Vec::new(),
        };

        Ok(TicketRecord {
            title: fields.summary,
            body,
            created_at: normalize_time(&fields.created)?,
            priority: fields.priority.map(|p| p.name),
            issue_type: fields.issuetype.map(|t| t.name),
            status: fields.status.map(|s| s.name),
            labels: fields.labels,
            comments,
            attachments: fields.attachment.into_iter().map(|a| a.content).collect(),
            links,
            remotelinks,
            watchers,
            key,
        })
    }
}

/// Record for an issue of another GitHub repository. Its number becomes the key.
///
/// The first comment holds the description and becomes the body; the rest stay comments.
pub fn github_record(
    issue: &GhIssue,
    comments: &[GhComment],
    omit_reporters: &[String],
) -> TicketRecord {
    let (description, comments) = match comments.split_first() {
        Some((first, rest)) => (first.body.as_deref().unwrap_or_default(), rest),
        None => ("", comments),
    };
    let mut body = format!("{description}\n\n_(Imported from {})_", issue.html_url);
    if !omit_reporters.contains(&issue.user.login) {
        body.push_str(&format!("\n\n_(Reported by @{})_", issue.user.login));
    }

    TicketRecord {
        key: issue.number.to_string(),
        title: issue.title.clone(),
        body,
        created_at: issue.created_at.clone(),
        priority: None,
        issue_type: Some("issue".into()),
        status: Some("Open".into()),
        labels: issue.labels.iter().map(|l| l.name.clone()).collect(),
        comments: comments
            .iter()
            .map(|c| RecordComment {
                created_at: c.created_at.clone(),
                body: format!(
                    "_From @{}:_\n\n{}",
                    c.user.login,
                    c.body.as_deref().unwrap_or_default()
                ),
            })
            .collect(),
        attachments: Vec::new(),
        links: Vec::new(),
        remotelinks: BTreeMap::new(),
        watchers: Vec::new(),
    }
}

/// Export the open issues of `repo` carrying `labels`. Returns the number of records written.
pub async fn export_github(
    client: &GitHubClient,
    repo: &str,
    labels: &str,
    store: &RecordStore,
    omit_reporters: &[String],
) -> Result<usize> {
    let issues = client.list_issues(repo, labels).await?;
    for issue in &issues {
        tracing::info!(url = %issue.html_url, "processing");
        let comments = client
            .list_issue_comments(&issue.comments_url)
            .await
            .with_context(|| format!("Failed to list comments of {}", issue.html_url))?;
        store.save(&github_record(issue, &comments, omit_reporters))?;
    }
    Ok(issues.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockSource;
    use serde_json::json;

    fn jira_issue(key: &str, description: &str) -> JiraIssue {
        serde_json::from_value(json!({
            "key": key,
            "fields": {
                "summary": format!("Summary of {key}"),
                "description": description,
                "created": "2017-01-02T10:11:12.000+0000",
                "reporter": {"name": "alice", "displayName": "Alice A"},
                "priority": {"name": "Major"},
                "issuetype": {"name": "Bug"},
                "status": {"name": "Open"},
                "labels": ["crypto"],
                "comment": {"comments": [
                    {
                        "author": {"name": "bob", "displayName": "Bob B"},
                        "body": "*agreed*",
                        "created": "2017-01-03T08:00:00.123+0100"
                    }
                ]},
                "attachment": [{"content": "https://jira.example.org/a/1"}],
                "issuelinks": [
                    {"type": {"inward": "is blocked by", "outward": "blocks"},
                     "outwardIssue": {"key": "A-7"}},
                    {"type": {"inward": "is blocked by", "outward": "blocks"},
                     "inwardIssue": {"key": "A-8"}}
                ],
                "watches": {"self": format!("https://jira.example.org/w/{key}")}
            }
        }))
        .unwrap()
    }

    fn users() -> HashMap<String, String> {
        HashMap::from([("bob".to_string(), "bobgh".to_string())])
    }

    #[test]
    fn timestamps_lose_their_milliseconds() {
        assert_eq!(
            normalize_time("2017-01-02T10:11:12.000+0000").unwrap(),
            "2017-01-02T10:11:12+00:00"
        );
        assert_eq!(
            normalize_time("2017-01-03T08:00:00.123+0100").unwrap(),
            "2017-01-03T08:00:00+01:00"
        );
        assert_eq!(
            normalize_time("2020-05-01T12:00:00Z").unwrap(),
            "2020-05-01T12:00:00+00:00"
        );
        assert!(normalize_time("yesterday").is_err());
    }

    #[tokio::test]
    async fn exports_every_page() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let source = MockSource::new(2)
            .with_issue(jira_issue("A-1", "h1. Title"))
            .with_issue(jira_issue("A-2", "one"))
            .with_issue(jira_issue("A-3", "two"))
            .with_watchers(
                "https://jira.example.org/w/A-1",
                &[("bob", "Bob B"), ("carol", "Carol C")],
            )
            .with_remote_link("A-1", "Design doc", "https://docs.example.org/d");
        let users = users();
        let exporter = JiraExporter::new(&source, &store, &users, &[]);

        let written = exporter.export_project("A", 2).await.unwrap();

        assert_eq!(written, 3);
        assert_eq!(store.keys().unwrap(), vec!["A-1", "A-2", "A-3"]);
        assert_eq!(source.searches(), vec![0, 2]);

        let record = store.load("A-1").unwrap();
        assert_eq!(record.title, "Summary of A-1");
        assert_eq!(
            record.body,
            "# Title\n\n(Imported from https://jira.example.org/browse/A-1)\n\n\
             (Reported by Alice A)"
        );
        assert_eq!(record.created_at, "2017-01-02T10:11:12+00:00");
        assert_eq!(record.priority.as_deref(), Some("Major"));
        assert_eq!(record.issue_type.as_deref(), Some("Bug"));
        assert_eq!(record.status.as_deref(), Some("Open"));
        assert_eq!(record.labels, vec!["crypto"]);
        assert_eq!(
            record.comments,
            vec![RecordComment {
                created_at: "2017-01-03T08:00:00+01:00".into(),
                body: "**agreed**\n\n-- @bobgh".into(),
            }]
        );
        assert_eq!(record.attachments, vec!["https://jira.example.org/a/1"]);
        assert_eq!(
            record.links,
            vec![
                TicketLink {
                    direction: LinkDirection::Outward,
                    other: "A-7".into(),
                    link_type: "blocks".into(),
                },
                TicketLink {
                    direction: LinkDirection::Inward,
                    other: "A-8".into(),
                    link_type: "is blocked by".into(),
                },
            ]
        );
        assert_eq!(
            record.remotelinks.get("Design doc").map(String::as_str),
            Some("https://docs.example.org/d")
        );
        assert_eq!(record.watchers, vec!["@bobgh"]);
    }

    #[tokio::test]
    async fn worker_count_bounds_concurrent_exports() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let mut source = MockSource::new(50);
        for n in 1..=6 {
            source = source.with_issue(jira_issue(&format!("A-{n}"), "text"));
        }
        let users = users();
        let exporter = JiraExporter::new(&source, &store, &users, &[]);

        let written = exporter.export_project("A", 2).await.unwrap();

        assert_eq!(written, 6);
        assert_eq!(store.keys().unwrap().len(), 6);
        let peak = source.peak_in_flight();
        assert!(peak > 1, "exports never overlapped");
        assert!(peak <= 2, "{peak} exports ran at once");
    }

    #[tokio::test]
    async fn single_worker_exports_one_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let source = MockSource::new(50)
            .with_issue(jira_issue("A-1", "one"))
            .with_issue(jira_issue("A-2", "two"))
            .with_issue(jira_issue("A-3", "three"));
        let users = users();
        let exporter = JiraExporter::new(&source, &store, &users, &[]);

        exporter.export_project("A", 1).await.unwrap();

        assert_eq!(source.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn omitted_reporters_are_not_credited() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let source = MockSource::new(50).with_issue(jira_issue("A-1", "text"));
        let users = users();
        let omit = vec!["alice".to_string()];
        let exporter = JiraExporter::new(&source, &store, &users, &omit);

        exporter.export_project("A", 1).await.unwrap();

        let record = store.load("A-1").unwrap();
        assert!(!record.body.contains("Reported by"));
    }

    #[tokio::test]
    async fn link_without_a_side_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let mut issue = jira_issue("A-1", "text");
        issue.fields.issuelinks[0].outward_issue = None;
        let source = MockSource::new(50).with_issue(issue);
        let users = users();
        let exporter = JiraExporter::new(&source, &store, &users, &[]);

        let err = exporter.export_project("A", 4).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<MigrationError>(),
            Some(MigrationError::InvalidLink { key }) if key == "A-1"
        ));
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn github_issue_becomes_a_record() {
        let issue: GhIssue = serde_json::from_value(json!({
            "number": 12,
            "title": "Old bug",
            "body": "issue body",
            "html_url": "https://github.com/old/repo/issues/12",
            "comments_url": "https://api.github.com/repos/old/repo/issues/12/comments",
            "created_at": "2018-03-04T05:06:07Z",
            "user": {"login": "dave"},
            "labels": [{"name": "bug"}, {"name": "p1"}]
        }))
        .unwrap();
        let comments: Vec<GhComment> = serde_json::from_value(json!([
            {
                "url": "https://api.github.com/repos/old/repo/issues/comments/1",
                "body": "It broke",
                "created_at": "2018-03-04T05:06:07Z",
                "user": {"login": "dave"}
            },
            {
                "url": "https://api.github.com/repos/old/repo/issues/comments/2",
                "body": "me too",
                "created_at": "2018-03-05T00:00:00Z",
                "user": {"login": "erin"}
            }
        ]))
        .unwrap();

        let record = github_record(&issue, &comments, &[]);

        assert_eq!(record.key, "12");
        assert_eq!(
            record.body,
            "It broke\n\n_(Imported from https://github.com/old/repo/issues/12)_\n\n\
             _(Reported by @dave)_"
        );
        assert_eq!(record.status.as_deref(), Some("Open"));
        assert_eq!(record.issue_type.as_deref(), Some("issue"));
        assert_eq!(record.labels, vec!["bug", "p1"]);
        assert_eq!(record.comments.len(), 1);
        assert_eq!(record.comments[0].body, "_From @erin:_\n\nme too");
        assert_eq!(record.comments[0].created_at, "2018-03-05T00:00:00Z");

        let quiet = github_record(&issue, &[], &["dave".to_string()]);
        assert_eq!(
            quiet.body,
            "\n\n_(Imported from https://github.com/old/repo/issues/12)_"
        );
        assert!(quiet.comments.is_empty());
    }
}
