//! Locale registry: the set of locales a run may synchronize.
//!
//! Constructed once per invocation and passed through the run context — no
//! process-wide singleton. Exactly one locale is the source of truth; every
//! other enabled locale is a translation target.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::store;

/// Configuration for one supported locale.
#[derive(Debug, Clone)]
pub struct LocaleConfig {
    /// BCP 47 tag (e.g. "it-IT")
    pub tag: String,

    /// English name of the language, used in provider instructions
    pub name: String,

    /// Native name of the language
    pub native_name: String,

    /// Whether this locale is the source of truth (exactly one is)
    pub is_source: bool,

    /// Whether this locale is enabled as a translation target
    pub enabled: bool,
}

/// The registry for one run.
#[derive(Debug, Clone)]
pub struct LocaleRegistry {
    locales: Vec<LocaleConfig>,
}

/// On-disk shape of an optional locale config file: tag → settings.
#[derive(Debug, Deserialize)]
struct LocaleFileEntry {
    name: String,
    #[serde(default)]
    native_name: Option<String>,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_true() -> bool {
    true
}

impl LocaleRegistry {
    /// Build a registry, validating that exactly one locale is the source.
    pub fn new(locales: Vec<LocaleConfig>) -> Result<Self> {
        match locales.iter().filter(|l| l.is_source).count() {
            0 => bail!("no source locale configured"),
            1 => Ok(Self { locales }),
            n => bail!("{} locales claim to be the source; exactly one must", n),
        }
    }

    /// The built-in locale set, optionally replaced by a config file that
    /// maps tags to names/enabled flags (the source locale always comes from
    /// `source_tag`).
    pub fn load(config_file: Option<&Path>, source_tag: &str) -> Result<Self> {
        let mut locales = match config_file {
            Some(file) => {
                let entries: Option<BTreeMap<String, LocaleFileEntry>> = store::load_json(file)
                    .with_context(|| format!("Failed to load locale config {}", file.display()))?;
                match entries {
                    Some(entries) => entries
                        .into_iter()
                        .map(|(tag, entry)| LocaleConfig {
                            native_name: entry.native_name.unwrap_or_else(|| entry.name.clone()),
                            name: entry.name,
                            is_source: tag == source_tag,
                            enabled: entry.enabled,
                            tag,
                        })
                        .collect(),
                    None => default_locales(),
                }
            }
            None => default_locales(),
        };

        // The source locale is always present even if the file omits it.
        if !locales.iter().any(|l| l.tag == source_tag) {
            locales.push(LocaleConfig {
                tag: source_tag.to_string(),
                name: source_tag.to_string(),
                native_name: source_tag.to_string(),
                is_source: true,
                enabled: false,
            });
        }
        for locale in &mut locales {
            locale.is_source = locale.tag == source_tag;
        }
        Self::new(locales)
    }

    pub fn get(&self, tag: &str) -> Option<&LocaleConfig> {
        self.locales.iter().find(|locale| locale.tag == tag)
    }

    /// The single source-of-truth locale.
    pub fn source(&self) -> &LocaleConfig {
        self.locales
            .iter()
            .find(|locale| locale.is_source)
            .expect("registry construction validated a single source")
    }

    /// Enabled translation targets, source excluded.
    pub fn targets(&self) -> Vec<&LocaleConfig> {
        self.locales
            .iter()
            .filter(|locale| locale.enabled && !locale.is_source)
            .collect()
    }

    pub fn is_target(&self, tag: &str) -> bool {
        self.get(tag)
            .map(|locale| locale.enabled && !locale.is_source)
            .unwrap_or(false)
    }
}

/// Built-in locale set. `en-GB` is the source of truth.
fn default_locales() -> Vec<LocaleConfig> {
    fn locale(tag: &str, name: &str, native_name: &str) -> LocaleConfig {
        LocaleConfig {
            tag: tag.to_string(),
            name: name.to_string(),
            native_name: native_name.to_string(),
            is_source: false,
            enabled: true,
        }
    }

    let mut locales = vec![LocaleConfig {
        tag: "en-GB".to_string(),
        name: "English (United Kingdom)".to_string(),
        native_name: "English (UK)".to_string(),
        is_source: true,
        enabled: false,
    }];
    locales.extend([
        locale("en-US", "English (United States)", "English (US)"),
        locale("es-ES", "Spanish (Spain)", "Español"),
        locale("es-MX", "Spanish (Mexico)", "Español (México)"),
        locale("fr-FR", "French", "Français"),
        locale("de-DE", "German", "Deutsch"),
        locale("it-IT", "Italian", "Italiano"),
        locale("pt-PT", "Portuguese (Portugal)", "Português"),
        locale("pt-BR", "Portuguese (Brazil)", "Português (Brasil)"),
        locale("nl-NL", "Dutch", "Nederlands"),
        locale("pl-PL", "Polish", "Polski"),
        locale("ru-RU", "Russian", "Русский"),
        locale("uk-UA", "Ukrainian", "Українська"),
        locale("cs-CZ", "Czech", "Čeština"),
        locale("ro-RO", "Romanian", "Română"),
        locale("el-GR", "Greek", "Ελληνικά"),
        locale("tr-TR", "Turkish", "Türkçe"),
        locale("ar-SA", "Arabic (Modern Standard)", "العربية"),
        locale("he-IL", "Hebrew", "עברית"),
        locale("hi-IN", "Hindi", "हिन्दी"),
        locale("th-TH", "Thai", "ไทย"),
        locale("vi-VN", "Vietnamese", "Tiếng Việt"),
        locale("id-ID", "Indonesian", "Bahasa Indonesia"),
        locale("ko-KR", "Korean", "한국어"),
        locale("ja-JP", "Japanese", "日本語"),
        locale("zh-CN", "Chinese (Simplified)", "简体中文"),
        locale("zh-TW", "Chinese (Traditional)", "繁體中文"),
        locale("sv-SE", "Swedish", "Svenska"),
        locale("da-DK", "Danish", "Dansk"),
        locale("fi-FI", "Finnish", "Suomi"),
    ]);
    locales
}
