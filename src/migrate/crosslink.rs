use anyhow::{Context, Result};

use crate::model::ticket::{TicketRecord, LINK_PLACEHOLDER};
use crate::providers::{DestinationTracker, IssuePatch};
use crate::store::mapping::IssueMapping;
use crate::store::records::RecordStore;
use crate::util::keys::KeyMatcher;

/// Turns source keys in text into links: to the migrated issue when there is one,
/// otherwise back to the source tracker.
pub struct ReferenceRewriter<'a> {
    matcher: KeyMatcher,
    mapping: &'a IssueMapping,
    web_url: &'a str,
    source_url: &'a str,
}

impl<'a> ReferenceRewriter<'a> {
    pub fn new(
        project_keys: &[String],
        mapping: &'a IssueMapping,
        web_url: &'a str,
        source_url: &'a str,
    ) -> Result<Self> {
        let matcher = KeyMatcher::new(project_keys).context("Invalid project key list")?;
        Ok(Self {
            matcher,
            mapping,
            web_url,
            source_url,
        })
    }

    pub fn link_for(&self, key: &str) -> String {
        match self.mapping.get(key) {
            Some(path) => format!("{}/{path}", self.web_url),
            None => format!("[{key}]({}/browse/{key})", self.source_url),
        }
    }

    /// Rewrite every reference in `text`, or `None` if there was nothing to rewrite.
    ///
    /// Scanning resumes after each inserted link, so a link's own text is never revisited.
    pub fn rewrite(&self, text: &str) -> Option<String> {
        let mut text = text.to_string();
        let mut changed = false;
        let mut at = 0;

        while let Some(range) = self.matcher.find_at(&text, at) {
            // already part of a link back to the source tracker
            if text[..range.start].ends_with("browse/") {
                at = range.end;
                continue;
            }

            let key = text[range.clone()].to_string();
            let link = self.link_for(&key);
            tracing::debug!(%key, %link, "rewriting reference");
            text.replace_range(range.clone(), &link);
            at = range.start + link.len();
            changed = true;
        }

        changed.then_some(text)
    }

    /// Replacement body for the link placeholder comment.
    pub fn link_comment(&self, record: &TicketRecord) -> String {
        let mut body = String::from("Links exported from Jira:\n\n");
        for link in &record.links {
            body.push_str(&format!("{} {}\n", link.link_type, self.link_for(&link.other)));
        }
        for (title, url) in &record.remotelinks {
            body.push_str(&format!("[{title}]({url})\n"));
        }
        body
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LinkUpdate {
    pub body_patched: bool,
    pub comments_patched: usize,
}

/// Rewrite the body and comments of one migrated issue. Titles are left alone: links do
/// not render there and the literal key is wanted.
pub async fn update_issue(
    dest: &dyn DestinationTracker,
    rewriter: &ReferenceRewriter<'_>,
    record: &TicketRecord,
    issue_path: &str,
) -> Result<LinkUpdate> {
    let issue = dest.get_issue(issue_path).await?;
    let comments = dest.list_comments(issue_path).await?;
    let mut update = LinkUpdate::default();

    if let Some(body) = rewriter.rewrite(&issue.body) {
        tracing::info!(key = %record.key, "updating body");
        let patch = IssuePatch {
            body: Some(body),
            ..IssuePatch::default()
        };
        dest.patch_issue(issue_path, &patch).await?;
        update.body_patched = true;
    }

    for comment in comments {
        let new_body = if comment.body == LINK_PLACEHOLDER {
            Some(rewriter.link_comment(record))
        } else {
            rewriter.rewrite(&comment.body)
        };
        if let Some(body) = new_body {
            dest.patch_comment(&comment.url, &body).await?;
            update.comments_patched += 1;
        }
    }

    Ok(update)
}

/// Run [`update_issue`] for every key, stopping at the first failure.
pub async fn update_links(
    dest: &dyn DestinationTracker,
    records: &RecordStore,
    rewriter: &ReferenceRewriter<'_>,
    mapping: &IssueMapping,
    keys: &[String],
) -> Result<()> {
    for key in keys {
        tracing::info!(%key, "considering");
        let record = records.load(key)?;
        let issue_path = mapping.require(key)?;
        update_issue(dest, rewriter, &record, issue_path)
            .await
            .with_context(|| format!("Failed to update links of {key}"))?;
    }
    Ok(())
}
