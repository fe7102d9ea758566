use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to either tracker. None of these are retried.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{method} {url} returned HTTP {status}: {body}")]
    Http {
        method: String,
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Data inconsistencies. These indicate a logic or data error, never a transient one.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("unexpected import status {status:?} for {key}")]
    UnexpectedStatus { key: String, status: String },

    #[error("import job for {key} has no status url")]
    MissingJobUrl { key: String },

    #[error("import of {key} reported success without an issue url")]
    MissingIssueUrl { key: String },

    #[error("import of {key} failed: {detail}")]
    ImportFailed { key: String, detail: String },

    #[error("{0} is not in the issue mapping")]
    Unmapped(String),

    #[error("no exported record for {0}")]
    MissingRecord(String),

    #[error("link on {key} is neither inward nor outward")]
    InvalidLink { key: String },

    #[error("issue url {url} does not start with {prefix}")]
    ForeignIssueUrl { url: String, prefix: String },
}
