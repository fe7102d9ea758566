use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

use super::write_atomic;
use crate::error::MigrationError;

/// Source key -> destination issue path (`owner/repo/issues/N`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueMapping {
    entries: BTreeMap<String, String>,
}

impl IssueMapping {
    /// Load the mapping, or start empty if it was never written.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read issue mapping {}", path.display()))?;
        let entries = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse issue mapping {}", path.display()))?;
        Ok(Self { entries })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        write_atomic(path, json.as_bytes())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str, MigrationError> {
        self.get(key)
            .ok_or_else(|| MigrationError::Unmapped(key.to_string()))
    }

    pub fn insert(&mut self, key: impl Into<String>, path: impl Into<String>) {
        self.entries.insert(key.into(), path.into());
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_earlier_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issue_mapping.json");

        let mut first = IssueMapping::default();
        first.insert("A-1", "org/repo/issues/1");
        first.save(&path).unwrap();

        let mut second = IssueMapping::load_or_default(&path).unwrap();
        second.insert("A-2", "org/repo/issues/2");
        second.save(&path).unwrap();

        let merged = IssueMapping::load(&path).unwrap();
        assert_eq!(merged.get("A-1"), Some("org/repo/issues/1"));
        assert_eq!(merged.get("A-2"), Some("org/repo/issues/2"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn missing_file_is_empty_or_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issue_mapping.json");
        assert_eq!(IssueMapping::load_or_default(&path).unwrap().len(), 0);
        assert!(IssueMapping::load(&path).is_err());
    }

    #[test]
    fn require_reports_unmapped_key() {
        let mapping = IssueMapping::default();
        let err = mapping.require("A-3").unwrap_err();
        assert_eq!(err.to_string(), "A-3 is not in the issue mapping");
    }
}
