//! Translation memory: the durable record of what was already translated.
//!
//! A target value equal to the source is ambiguous on its own — it may be
//! untranslated, or a prior pass may have deliberately kept it identical
//! (brand names, numbers). The memory disambiguates: an entry whose recorded
//! value matches the current target confirms the value was produced by a
//! successful pass and needs no further work.

use std::collections::BTreeMap;
use std::path::Path as FsPath;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::DiffResult;
use crate::path::Path;
use crate::provider::TokenUsage;
use crate::store;

/// One remembered translation, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub value: Value,
    pub translated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Per-locale map of path → last translated value.
///
/// Paths are stored in their string form; the typed [`Path`] is rendered and
/// parsed only at this boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TranslationMemory {
    locales: BTreeMap<String, BTreeMap<String, MemoryEntry>>,
}

impl TranslationMemory {
    pub fn load(file: &FsPath) -> Result<Self> {
        Ok(store::load_json(file)?.unwrap_or_default())
    }

    pub fn save(&self, file: &FsPath) -> Result<()> {
        store::save_json(file, self)
    }

    pub fn lookup(&self, locale: &str, path: &Path) -> Option<&MemoryEntry> {
        self.locales.get(locale)?.get(&path.to_string())
    }

    /// Upsert after a successful merge. Never called speculatively.
    pub fn record(&mut self, locale: &str, path: &Path, value: Value, usage: Option<TokenUsage>) {
        self.locales.entry(locale.to_string()).or_default().insert(
            path.to_string(),
            MemoryEntry {
                value,
                translated_at: Utc::now(),
                usage,
            },
        );
    }

    /// Drop entries for paths the source no longer has, across all locales.
    pub fn prune_removed(&mut self, removed: &std::collections::BTreeSet<Path>) {
        if removed.is_empty() {
            return;
        }
        let removed_strings: Vec<String> = removed.iter().map(Path::to_string).collect();
        for entries in self.locales.values_mut() {
            for path_string in &removed_strings {
                entries.remove(path_string);
            }
        }
    }

    /// Decide whether the leaf at `path` still needs (re)translation.
    ///
    /// True when the source is new/changed, when the target lacks the path,
    /// or when the target still equals the source and no memory entry
    /// confirms that as intentional. False only for genuinely translated
    /// values or memory-confirmed identical ones.
    pub fn needs_translation(
        &self,
        locale: &str,
        path: &Path,
        source_value: &Value,
        target_value: Option<&Value>,
        diff: &DiffResult,
    ) -> bool {
        if diff.is_stale(path) {
            return true;
        }
        let target_value = match target_value {
            Some(value) => value,
            None => return true,
        };
        if source_value != target_value {
            return false;
        }
        match self.lookup(locale, path) {
            Some(entry) => entry.value != *target_value,
            None => true,
        }
    }

    pub fn entry_count(&self, locale: &str) -> usize {
        self.locales.get(locale).map_or(0, BTreeMap::len)
    }
}
