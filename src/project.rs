//! Project descriptors: where a document family lives on disk.
//!
//! A project binds a source locale to a directory of per-locale JSON files
//! plus the snapshot used for diffing. Several projects (marketing site,
//! app strings, knowledge base) can share one invocation host while keeping
//! separate state files.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::store;

fn default_source_locale() -> String {
    "en-GB".to_string()
}

fn default_file_pattern() -> String {
    "{locale}.json".to_string()
}

fn default_snapshot_pattern() -> String {
    "{locale}.snapshot.json".to_string()
}

/// Provenance fields the provider must never see or translate.
fn default_excluded_keys() -> Vec<String> {
    ["sources", "last_verified", "confidence"]
        .map(String::from)
        .to_vec()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,

    /// Directory holding the per-locale documents.
    pub base_path: PathBuf,

    #[serde(default = "default_source_locale")]
    pub source_locale: String,

    /// File name pattern with a `{locale}` placeholder.
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,

    #[serde(default = "default_snapshot_pattern")]
    pub snapshot_pattern: String,

    #[serde(default = "default_excluded_keys")]
    pub excluded_keys: Vec<String>,

    /// Optional locale registry override for this project.
    #[serde(default)]
    pub locale_config: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ProjectsFile {
    projects: Vec<Project>,
}

impl Project {
    /// Load one project from the projects config file. A missing file yields
    /// the built-in default project; a present file without the requested id
    /// is a configuration error (fatal, per the error policy).
    pub fn load(projects_file: &Path, id: &str) -> Result<Self> {
        let parsed: Option<ProjectsFile> = store::load_json(projects_file)
            .with_context(|| format!("Failed to load {}", projects_file.display()))?;

        match parsed {
            None => {
                if id == "site" {
                    Ok(Self::default_site())
                } else {
                    bail!(
                        "project '{}' requested but {} does not exist",
                        id,
                        projects_file.display()
                    )
                }
            }
            Some(file) => file
                .projects
                .into_iter()
                .find(|project| project.id == id)
                .with_context(|| {
                    format!("project '{}' not found in {}", id, projects_file.display())
                }),
        }
    }

    fn default_site() -> Self {
        Self {
            id: "site".to_string(),
            base_path: PathBuf::from("i18n"),
            source_locale: default_source_locale(),
            file_pattern: default_file_pattern(),
            snapshot_pattern: default_snapshot_pattern(),
            excluded_keys: default_excluded_keys(),
            locale_config: None,
        }
    }

    /// Per-locale document path. Tags are lowercased in file names unless
    /// the pattern nests directories (then the tag's own casing is kept).
    pub fn file_for_locale(&self, tag: &str) -> PathBuf {
        self.base_path.join(apply_pattern(&self.file_pattern, tag))
    }

    pub fn snapshot_for_locale(&self, tag: &str) -> PathBuf {
        self.base_path
            .join(apply_pattern(&self.snapshot_pattern, tag))
    }

    pub fn source_file(&self) -> PathBuf {
        self.file_for_locale(&self.source_locale)
    }

    pub fn source_snapshot(&self) -> PathBuf {
        self.snapshot_for_locale(&self.source_locale)
    }

    pub fn memory_file(&self, state_dir: &Path) -> PathBuf {
        state_dir.join(format!("translation_memory_{}.json", self.id))
    }
}

fn apply_pattern(pattern: &str, tag: &str) -> String {
    let locale = if pattern.contains('/') {
        tag.to_string()
    } else {
        tag.to_lowercase()
    };
    pattern.replace("{locale}", &locale)
}
