use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of the synthetic comment that the cross-linking pass later replaces with real links.
pub const LINK_PLACEHOLDER: &str = "JIRA LINK PLACEHOLDER";

/// Tracker-agnostic snapshot of one exported ticket, stored as `<key>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRecord {
    #[serde(default)]
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub created_at: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, rename = "type")]
    pub issue_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Earliest first.
    #[serde(default)]
    pub comments: Vec<RecordComment>,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub links: Vec<TicketLink>,
    /// Display title -> URL.
    #[serde(default)]
    pub remotelinks: BTreeMap<String, String>,
    /// Destination handles, already prefixed with `@`.
    #[serde(default)]
    pub watchers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordComment {
    pub created_at: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    Inward,
    Outward,
}

/// A relationship to another source-system ticket, e.g. `blocks PROJ-7`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketLink {
    pub direction: LinkDirection,
    pub other: String,
    #[serde(rename = "type")]
    pub link_type: String,
}

impl TicketRecord {
    pub fn has_links(&self) -> bool {
        !self.links.is_empty() || !self.remotelinks.is_empty()
    }
}
