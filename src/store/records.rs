use anyhow::{Context, Result};
use std::path::PathBuf;

use super::{write_atomic, MAPPING_FILE, STATUS_FILE};
use crate::error::MigrationError;
use crate::model::ticket::TicketRecord;
use crate::util::keys::sort_keys;

/// One JSON file per exported ticket, named after its key.
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn save(&self, record: &TicketRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        write_atomic(&self.path_for(&record.key), json.as_bytes())
            .with_context(|| format!("Failed to write record for {}", record.key))
    }

    pub fn load(&self, key: &str) -> Result<TicketRecord> {
        let path = self.path_for(key);
        if !path.exists() {
            return Err(MigrationError::MissingRecord(key.to_string()).into());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut record: TicketRecord = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        if record.key.is_empty() {
            record.key = key.to_string();
        }
        Ok(record)
    }

    /// Every stored key, in creation order.
    pub fn keys(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;

        let mut keys = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') || name == STATUS_FILE || name == MAPPING_FILE {
                continue;
            }
            if let Some(key) = name.strip_suffix(".json") {
                keys.push(key.to_string());
            }
        }
        sort_keys(&mut keys);
        Ok(keys)
    }
}
