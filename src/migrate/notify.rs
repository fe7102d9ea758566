//! Follow-up passes that point old tickets at their migrated issues.

use anyhow::{Context, Result};

use crate::providers::{DestinationTracker, IssuePatch, SourceTracker};
use crate::store::mapping::IssueMapping;
use crate::store::records::RecordStore;

/// Comment on every source ticket with the url of its migrated issue.
pub async fn announce_in_source(
    source: &dyn SourceTracker,
    mapping: &IssueMapping,
    web_url: &str,
    keys: &[String],
) -> Result<()> {
    for key in keys {
        tracing::info!(%key, "updating");
        let url = format!("{web_url}/{}", mapping.require(key)?);
        source
            .post_comment(key, &format!("Migrated to github: {url}"))
            .await
            .with_context(|| format!("Failed to comment on {key} in {}", source.name()))?;
    }
    Ok(())
}

/// Put the source key back into each migrated title, as `<title> (<KEY>)`.
pub async fn restore_titles(
    dest: &dyn DestinationTracker,
    records: &RecordStore,
    mapping: &IssueMapping,
    keys: &[String],
) -> Result<()> {
    for key in keys {
        tracing::info!(%key, "updating");
        let record = records.load(key)?;
        let patch = IssuePatch {
            title: Some(format!("{} ({key})", record.title)),
            ..IssuePatch::default()
        };
        dest.patch_issue(mapping.require(key)?, &patch)
            .await
            .with_context(|| format!("Failed to retitle {key}"))?;
    }
    Ok(())
}

/// For records exported from another repository, comment on each old issue with the
/// url of its replacement. Keys are the old issue numbers.
pub async fn announce_in_old_repo(
    dest: &dyn DestinationTracker,
    mapping: &IssueMapping,
    web_url: &str,
    old_repo: &str,
    keys: &[String],
) -> Result<()> {
    for key in keys {
        let url = format!("{web_url}/{}", mapping.require(key)?);
        let old_issue = format!("{old_repo}/issues/{key}");
        tracing::info!(%old_issue, %url, "updating");
        dest.post_comment(&old_issue, &format!("Migrated to: {url}"))
            .await
            .with_context(|| format!("Failed to comment on {old_issue}"))?;
    }
    Ok(())
}
