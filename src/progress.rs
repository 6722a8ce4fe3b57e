//! Durable, resumable per-locale progress.
//!
//! The progress file is rewritten atomically after every status change, so
//! an interrupted run can resume without re-dispatching (or re-billing)
//! blocks that already completed. A block in flight when the process dies
//! stays `InProgress` on disk and is simply redone next run.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store;

/// Per-block state machine: `Pending → InProgress → {Done, FailedFallback}`.
///
/// `FailedFallback` is terminal for the run (the block fell back to source
/// content) but is not `Done`: the next invocation retries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Pending,
    InProgress,
    Done,
    FailedFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlockEntry {
    status: BlockStatus,
    updated_at: DateTime<Utc>,
}

/// Tracks one locale's blocks through a run, backed by a JSON file.
#[derive(Debug)]
pub struct ProgressTracker {
    file: PathBuf,
    blocks: BTreeMap<String, BlockEntry>,
}

impl ProgressTracker {
    /// Open the tracker for `(project, locale)`, loading any previous run's
    /// state so `--resume` can skip completed blocks.
    pub fn open(state_dir: &std::path::Path, project_id: &str, locale: &str) -> Result<Self> {
        let file = state_dir.join(format!(
            "translation_progress_{}_{}.json",
            project_id,
            locale.to_lowercase()
        ));
        let blocks = store::load_json(&file)?.unwrap_or_default();
        Ok(Self { file, blocks })
    }

    /// Forget previous state; used when a run starts without `--resume`.
    pub fn reset(&mut self) -> Result<()> {
        self.blocks.clear();
        self.commit()
    }

    pub fn mark(&mut self, block: &str, status: BlockStatus) -> Result<()> {
        self.blocks.insert(
            block.to_string(),
            BlockEntry {
                status,
                updated_at: Utc::now(),
            },
        );
        self.commit()
    }

    pub fn status(&self, block: &str) -> BlockStatus {
        self.blocks
            .get(block)
            .map_or(BlockStatus::Pending, |entry| entry.status)
    }

    pub fn is_done(&self, block: &str) -> bool {
        self.status(block) == BlockStatus::Done
    }

    /// Blocks that completed with fallback content and deserve a re-run.
    pub fn fallback_blocks(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter(|(_, entry)| entry.status == BlockStatus::FailedFallback)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Remove the file once the locale is fully synchronized, as the
    /// original tool does on clean completion.
    pub fn clear(self) -> Result<()> {
        if self.file.exists() {
            std::fs::remove_file(&self.file)?;
        }
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        store::save_json(&self.file, &self.blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tracker(dir: &TempDir) -> ProgressTracker {
        ProgressTracker::open(dir.path(), "site", "it-IT").unwrap()
    }

    #[test]
    fn test_unknown_block_is_pending() {
        let dir = TempDir::new().unwrap();
        let progress = tracker(&dir);
        assert_eq!(progress.status("hero"), BlockStatus::Pending);
        assert!(!progress.is_done("hero"));
    }

    #[test]
    fn test_state_machine_to_done() {
        let dir = TempDir::new().unwrap();
        let mut progress = tracker(&dir);

        progress.mark("hero", BlockStatus::InProgress).unwrap();
        assert_eq!(progress.status("hero"), BlockStatus::InProgress);
        assert!(!progress.is_done("hero"));

        progress.mark("hero", BlockStatus::Done).unwrap();
        assert!(progress.is_done("hero"));
    }

    #[test]
    fn test_failed_fallback_is_not_done() {
        let dir = TempDir::new().unwrap();
        let mut progress = tracker(&dir);

        progress.mark("hero", BlockStatus::InProgress).unwrap();
        progress.mark("hero", BlockStatus::FailedFallback).unwrap();

        assert!(!progress.is_done("hero"));
        assert_eq!(progress.fallback_blocks(), vec!["hero"]);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let mut progress = tracker(&dir);
        progress.mark("hero", BlockStatus::Done).unwrap();
        progress.mark("footer", BlockStatus::FailedFallback).unwrap();
        drop(progress);

        let reopened = tracker(&dir);
        assert!(reopened.is_done("hero"));
        assert_eq!(reopened.status("footer"), BlockStatus::FailedFallback);
    }

    #[test]
    fn test_in_progress_block_is_redone_after_crash() {
        let dir = TempDir::new().unwrap();
        let mut progress = tracker(&dir);
        progress.mark("hero", BlockStatus::InProgress).unwrap();
        drop(progress); // simulated crash mid-block

        let reopened = tracker(&dir);
        assert!(!reopened.is_done("hero"));
    }

    #[test]
    fn test_reset_forgets_previous_run() {
        let dir = TempDir::new().unwrap();
        let mut progress = tracker(&dir);
        progress.mark("hero", BlockStatus::Done).unwrap();

        progress.reset().unwrap();
        assert!(!progress.is_done("hero"));

        let reopened = tracker(&dir);
        assert!(!reopened.is_done("hero"));
    }

    #[test]
    fn test_trackers_are_per_locale() {
        let dir = TempDir::new().unwrap();
        let mut italian = ProgressTracker::open(dir.path(), "site", "it-IT").unwrap();
        italian.mark("hero", BlockStatus::Done).unwrap();

        let french = ProgressTracker::open(dir.path(), "site", "fr-FR").unwrap();
        assert!(!french.is_done("hero"));
    }

    #[test]
    fn test_clear_removes_the_file() {
        let dir = TempDir::new().unwrap();
        let mut progress = tracker(&dir);
        progress.mark("hero", BlockStatus::Done).unwrap();

        let file = dir
            .path()
            .join("translation_progress_site_it-it.json");
        assert!(file.exists());
        progress.clear().unwrap();
        assert!(!file.exists());
    }
}
