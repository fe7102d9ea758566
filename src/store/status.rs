use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::write_atomic;
use crate::model::import::ImportState;
use crate::util::keys::sort_keys;

/// Durable per-key import state. Every `set` is on disk before it returns.
pub struct StatusStore {
    path: PathBuf,
    entries: BTreeMap<String, ImportState>,
}

impl StatusStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        write_atomic(&self.path, json.as_bytes())
    }

    pub fn get(&self, key: &str) -> Option<&ImportState> {
        self.entries.get(key)
    }

    pub fn set(&mut self, key: &str, state: ImportState) -> Result<()> {
        self.entries.insert(key.to_string(), state);
        self.save()
            .with_context(|| format!("Failed to persist status of {key}"))
    }

    /// Every key with a recorded state, in creation order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        sort_keys(&mut keys);
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
