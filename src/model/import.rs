use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::ticket::RecordComment;
use crate::error::MigrationError;

/// Body POSTed to the bulk-import endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportPayload {
    pub issue: ImportIssue,
    pub comments: Vec<RecordComment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportIssue {
    pub title: String,
    pub body: String,
    pub created_at: String,
    pub labels: Vec<String>,
}

/// What the destination reports for an import job, on submission and on every poll.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportJob {
    pub status: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub issue_url: Option<String>,
    #[serde(default)]
    pub errors: Vec<Value>,
}

/// Persisted migration state of one source key. A key with no entry has never been submitted.
///
/// Transitions only move forward: absent -> pending -> imported | failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ImportState {
    Pending {
        url: String,
    },
    Imported {
        url: String,
        issue_url: String,
    },
    Failed {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        errors: Vec<Value>,
    },
}

impl ImportState {
    /// State entered once the destination accepted a submission.
    pub fn submitted(key: &str, job: ImportJob) -> Result<Self, MigrationError> {
        Self::from_job(key, job, None)
    }

    /// Apply a poll result. Only `Pending` moves; settled states are returned unchanged.
    pub fn polled(self, key: &str, job: ImportJob) -> Result<Self, MigrationError> {
        match self {
            ImportState::Pending { url } => Self::from_job(key, job, Some(url)),
            settled => Ok(settled),
        }
    }

    fn from_job(
        key: &str,
        job: ImportJob,
        known_url: Option<String>,
    ) -> Result<Self, MigrationError> {
        let url = job.url.or(known_url);
        match job.status.as_str() {
            "pending" => Ok(ImportState::Pending {
                url: url.ok_or_else(|| MigrationError::MissingJobUrl { key: key.into() })?,
            }),
            "imported" => Ok(ImportState::Imported {
                url: url.ok_or_else(|| MigrationError::MissingJobUrl { key: key.into() })?,
                issue_url: job
                    .issue_url
                    .ok_or_else(|| MigrationError::MissingIssueUrl { key: key.into() })?,
            }),
            "failed" => Ok(ImportState::Failed {
                url,
                errors: job.errors,
            }),
            other => Err(MigrationError::UnexpectedStatus {
                key: key.into(),
                status: other.into(),
            }),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ImportState::Pending { .. })
    }

    /// Whether the first phase must leave this key alone.
    pub fn blocks_submission(&self, retry_failed: bool) -> bool {
        match self {
            ImportState::Pending { .. } | ImportState::Imported { .. } => true,
            ImportState::Failed { .. } => !retry_failed,
        }
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportState::Pending { url } => write!(f, "pending ({url})"),
            ImportState::Imported { issue_url, .. } => write!(f, "imported ({issue_url})"),
            ImportState::Failed { errors, .. } => {
                write!(f, "failed ({})", Value::Array(errors.clone()))
            }
        }
    }
}
