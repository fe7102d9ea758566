use anyhow::{Context, Result};
use std::time::Duration;

use crate::config::LabelConfig;
use crate::error::MigrationError;
use crate::model::import::{ImportIssue, ImportPayload, ImportState};
use crate::model::ticket::{RecordComment, TicketRecord, LINK_PLACEHOLDER};
use crate::providers::DestinationTracker;
use crate::store::mapping::IssueMapping;
use crate::store::records::RecordStore;
use crate::store::status::StatusStore;

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Keys to process; `None` means every exported record.
    pub keys: Option<Vec<String>>,
    /// Cap on new submissions this run. `Some(0)` only polls.
    pub limit: Option<usize>,
    /// Resubmit keys whose earlier import failed.
    pub retry_failed: bool,
    /// Pause between polling sweeps while jobs are still pending.
    pub poll_interval: Duration,
}

/// Drives exported records through the destination's bulk-import API.
///
/// The status store is the only record of progress, so a run can be interrupted at any
/// point and repeated: keys already pending or imported are never submitted again.
pub struct Importer<'a> {
    dest: &'a dyn DestinationTracker,
    records: &'a RecordStore,
    status: &'a mut StatusStore,
    labels: &'a LabelConfig,
    repo: &'a str,
    api_url: &'a str,
}

impl<'a> Importer<'a> {
    pub fn new(
        dest: &'a dyn DestinationTracker,
        records: &'a RecordStore,
        status: &'a mut StatusStore,
        labels: &'a LabelConfig,
        repo: &'a str,
        api_url: &'a str,
    ) -> Self {
        Self {
            dest,
            records,
            status,
            labels,
            repo,
            api_url,
        }
    }

    /// Submit, wait for every job, then merge the results into `mapping` and return it.
    pub async fn run(
        &mut self,
        options: &ImportOptions,
        mut mapping: IssueMapping,
    ) -> Result<IssueMapping> {
        let candidates = match &options.keys {
            Some(keys) => keys.clone(),
            None => self.records.keys()?,
        };
        let submitted = self.submit_new(&candidates, options).await?;
        tracing::info!(submitted, "submission phase finished");

        let tracked: Vec<String> = match &options.keys {
            Some(keys) => keys
                .iter()
                .filter(|key| self.status.get(key).is_some())
                .cloned()
                .collect(),
            None => self.status.keys(),
        };
        let pending = tracked
            .iter()
            .filter(|key| self.status.get(key).is_some_and(ImportState::is_pending))
            .count();
        tracing::info!(pending, "waiting for import jobs");
        self.await_completion(&tracked, &mut mapping, options.poll_interval)
            .await?;
        Ok(mapping)
    }

    /// Phase one: start an import job for every key that has never been submitted.
    pub async fn submit_new(&mut self, keys: &[String], options: &ImportOptions) -> Result<usize> {
        let mut count = 0;
        for key in keys {
            if options.limit.is_some_and(|limit| count >= limit) {
                break;
            }

            if let Some(state) = self.status.get(key) {
                if state.blocks_submission(options.retry_failed) {
                    if matches!(state, ImportState::Failed { .. }) {
                        tracing::warn!(%key, "skipping failed import, rerun with --retry-failed");
                    }
                    continue;
                }
            }

            tracing::info!(%key, "submitting");
            let record = self.records.load(key)?;
            let payload = build_payload(&record, self.labels);
            let job = self
                .dest
                .submit_import(self.repo, &payload)
                .await
                .with_context(|| format!("Failed to submit {key} to {}", self.dest.name()))?;
            let state = ImportState::submitted(key, job)?;
            self.status.set(key, state)?;
            count += 1;
        }
        Ok(count)
    }

    /// Phase two: poll pending jobs until none remain, collecting every imported key.
    pub async fn await_completion(
        &mut self,
        keys: &[String],
        mapping: &mut IssueMapping,
        poll_interval: Duration,
    ) -> Result<()> {
        loop {
            let mut has_pending = false;
            for key in keys {
                let Some(state) = self.status.get(key).cloned() else {
                    continue;
                };
                let state = self.poll(key, state).await?;

                match &state {
                    ImportState::Imported { issue_url, .. } => {
                        let path = self.issue_path(issue_url)?;
                        tracing::debug!(%key, %path, "imported");
                        mapping.insert(key.clone(), path);
                    }
                    ImportState::Pending { .. } => has_pending = true,
                    ImportState::Failed { errors, .. } => {
                        return Err(MigrationError::ImportFailed {
                            key: key.clone(),
                            detail: serde_json::Value::Array(errors.clone()).to_string(),
                        }
                        .into());
                    }
                }
            }

            if !has_pending {
                return Ok(());
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn poll(&mut self, key: &str, state: ImportState) -> Result<ImportState> {
        let ImportState::Pending { url } = &state else {
            return Ok(state);
        };
        tracing::info!(%key, "checking");
        let job = self
            .dest
            .poll_import(url)
            .await
            .with_context(|| format!("Failed to poll import of {key}"))?;
        let next = state.clone().polled(key, job)?;
        if next != state {
            tracing::info!(%key, status = %next, "status changed");
            self.status.set(key, next.clone())?;
        }
        Ok(next)
    }

    /// `https://api.github.com/repos/org/repo/issues/5` -> `org/repo/issues/5`
    fn issue_path(&self, issue_url: &str) -> Result<String, MigrationError> {
        let prefix = format!("{}/repos/", self.api_url);
        issue_url
            .strip_prefix(&prefix)
            .map(str::to_string)
            .ok_or_else(|| MigrationError::ForeignIssueUrl {
                url: issue_url.to_string(),
                prefix,
            })
    }
}

/// Shape one record into a bulk-import request.
///
/// The title carries the source key so provenance survives later edits. The first
/// comments are synthetic: the watcher list, then the placeholder that the cross-linking
/// pass fills in.
pub fn build_payload(record: &TicketRecord, labels: &LabelConfig) -> ImportPayload {
    let mut body = record.body.clone();
    if !record.attachments.is_empty() {
        body.push_str("\n\n#### Attachments:\n");
        for attachment in &record.attachments {
            body.push_str(attachment);
            body.push('\n');
        }
    }

    let mut comments = record.comments.clone();
    if record.has_links() {
        comments.insert(
            0,
            RecordComment {
                created_at: record.created_at.clone(),
                body: LINK_PLACEHOLDER.to_string(),
            },
        );
    }
    if !record.watchers.is_empty() {
        comments.insert(
            0,
            RecordComment {
                created_at: record.created_at.clone(),
                body: format!("Jira watchers: {}", record.watchers.join(" ")),
            },
        );
    }

    let mut issue_labels = record.labels.clone();
    if record.status.as_deref() != Some(labels.triage_status.as_str()) {
        let derived = [
            record.priority.as_ref().and_then(|p| labels.priority.get(p)),
            record.issue_type.as_ref().and_then(|t| labels.issue_type.get(t)),
        ];
        issue_labels.extend(derived.into_iter().flatten().cloned());
    }

    ImportPayload {
        issue: ImportIssue {
            title: format!("{} ({})", record.title, record.key),
            body,
            created_at: record.created_at.clone(),
            labels: issue_labels,
        },
        comments,
    }
}
