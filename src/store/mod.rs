pub mod mapping;
pub mod records;
pub mod status;

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

pub const STATUS_FILE: &str = "status.json";
pub const MAPPING_FILE: &str = "issue_mapping.json";

/// Replace `path` with `contents` so that readers see either the old or the new file.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Not a file path: {}", path.display()))?;
    let tmp = dir.join(format!(".{file_name}.tmp"));

    let mut file = std::fs::File::create(&tmp)
        .with_context(|| format!("Failed to create {}", tmp.display()))?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}
