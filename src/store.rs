//! Durable JSON state files with atomic commit.
//!
//! Every state file (target documents, snapshot, memory, progress) is
//! rewritten via write-then-rename so a crash mid-write leaves the previous
//! fully committed file, never a half-written one.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read and deserialize a JSON file. `Ok(None)` when the file does not exist.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Serialize `value` and commit it to `path` atomically.
///
/// Parent directories are created as needed. The temporary file lives next
/// to the target so the rename stays on one filesystem.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut text = serde_json::to_string_pretty(value).context("Failed to serialize state")?;
    text.push('\n');

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, text).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to commit {}", path.display()))?;
    Ok(())
}
