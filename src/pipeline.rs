//! Run orchestration: one control task drives locales sequentially, blocks
//! sequentially within a locale, and batches concurrently within a block.
//!
//! All run-scoped state (config, project, registry, glossary, dispatcher)
//! lives in the [`Runner`] constructed once per invocation — no ambient
//! globals. Snapshot, memory and progress are owned exclusively by the run
//! and committed atomically, so interrupting between blocks never corrupts
//! state: an in-flight batch is simply not recorded and is redispatched next
//! time.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::diff::{diff, DiffResult};
use crate::dispatcher::Dispatcher;
use crate::locales::{LocaleConfig, LocaleRegistry};
use crate::memory::TranslationMemory;
use crate::merge::merge_preserving_structure;
use crate::path::{flatten, Path};
use crate::progress::{BlockStatus, ProgressTracker};
use crate::project::Project;
use crate::provider::{CostModel, TokenUsage, TranslationProvider};
use crate::retry::RetryConfig;
use crate::selector::{select_blocks, Block};
use crate::store;
use crate::structure::sync_structure;

/// Glossary: term → (locale tag → preferred translation).
pub type Glossary = BTreeMap<String, BTreeMap<String, String>>;

/// How many glossary terms ride along in each instruction.
const GLOSSARY_PROMPT_LIMIT: usize = 10;

/// Politeness pauses toward the provider's rate limiter.
const BLOCK_PACING: Duration = Duration::from_millis(500);
const LOCALE_PACING: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Locale tags to synchronize; empty means every enabled target.
    pub locales: Vec<String>,
    /// Restrict work to these block names; empty means all.
    pub blocks: Vec<String>,
    /// Plan batches and report costs without calling the provider or
    /// writing any file.
    pub dry_run: bool,
    /// Structural comparison only.
    pub verify_only: bool,
    /// Skip blocks already recorded as done by a previous interrupted run.
    pub resume: bool,
    /// Seed missing target files with a copy of the source document.
    pub create_missing: bool,
}

#[derive(Debug, Default)]
pub struct LocaleReport {
    pub locale: String,
    pub blocks_selected: usize,
    pub blocks_translated: usize,
    pub blocks_fallback: usize,
    pub blocks_skipped: usize,
    pub structure_aligned: bool,
    pub usage: TokenUsage,
    pub cost: f64,
}

impl LocaleReport {
    pub fn fully_synchronized(&self) -> bool {
        self.blocks_fallback == 0 && self.structure_aligned
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<LocaleReport>,
    pub usage: TokenUsage,
    pub cost: f64,
}

impl RunSummary {
    pub fn fully_synchronized(&self) -> bool {
        self.reports.iter().all(LocaleReport::fully_synchronized)
    }
}

/// Everything a run needs, constructed once per invocation.
pub struct Runner {
    config: Config,
    project: Project,
    registry: LocaleRegistry,
    glossary: Glossary,
    dispatcher: Dispatcher,
    cost_model: CostModel,
}

impl Runner {
    pub fn new(
        config: Config,
        project: Project,
        provider: Arc<dyn TranslationProvider>,
    ) -> Result<Self> {
        let registry =
            LocaleRegistry::load(project.locale_config.as_deref(), &project.source_locale)?;

        let glossary: Glossary = match &config.glossary_file {
            Some(file) => store::load_json(file)
                .with_context(|| format!("Failed to load glossary {}", file.display()))?
                .unwrap_or_default(),
            None => Glossary::default(),
        };

        let mut retry = RetryConfig::provider_call();
        retry.max_attempts = config.max_attempts;

        let dispatcher = Dispatcher::new(
            provider,
            config.max_concurrent_requests,
            retry,
            config.batch_budget_units,
        );
        let cost_model = CostModel {
            input_per_mtok: config.input_price_per_mtok,
            output_per_mtok: config.output_price_per_mtok,
        };

        Ok(Self {
            config,
            project,
            registry,
            glossary,
            dispatcher,
            cost_model,
        })
    }

    /// Execute one run over the requested locales.
    pub async fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        let source: Value = store::load_json(&self.project.source_file())?
            .with_context(|| {
                format!(
                    "source document {} is missing",
                    self.project.source_file().display()
                )
            })?;
        let snapshot: Option<Value> = store::load_json(&self.project.source_snapshot())?;
        let source_diff = diff(&source, snapshot.as_ref());

        info!(
            "source diff: {} added, {} changed, {} removed",
            source_diff.added.len(),
            source_diff.changed.len(),
            source_diff.removed.len()
        );

        let locales = self.resolve_locales(options)?;
        info!(
            "project '{}': {} locales to process",
            self.project.id,
            locales.len()
        );

        if options.verify_only {
            return self.verify_structures(&source, &locales);
        }

        let memory_file = self.project.memory_file(&self.config.state_dir);
        let mut memory = TranslationMemory::load(&memory_file)?;
        memory.prune_removed(&source_diff.removed);

        let mut summary = RunSummary::default();
        for (index, locale) in locales.iter().enumerate() {
            let report = self
                .translate_locale(&source, &source_diff, &mut memory, locale, options)
                .await?;
            summary.usage.accumulate(&report.usage);
            summary.cost += report.cost;
            summary.reports.push(report);

            if !options.dry_run && index + 1 < locales.len() {
                tokio::time::sleep(LOCALE_PACING).await;
            }
        }

        if !options.dry_run {
            memory.save(&memory_file)?;
            store::save_json(&self.project.source_snapshot(), &source)?;
        }

        let synchronized = summary
            .reports
            .iter()
            .filter(|r| r.fully_synchronized())
            .count();
        info!(
            "run complete: {}/{} locales fully synchronized, {} tokens, ${:.4}",
            synchronized,
            summary.reports.len(),
            summary.usage.total_tokens,
            summary.cost
        );
        for report in summary.reports.iter().filter(|r| !r.fully_synchronized()) {
            warn!(
                "{}: {} fallback blocks, structure aligned: {} (re-run to retry)",
                report.locale, report.blocks_fallback, report.structure_aligned
            );
        }
        Ok(summary)
    }

    fn resolve_locales(&self, options: &RunOptions) -> Result<Vec<LocaleConfig>> {
        if options.locales.is_empty() {
            return Ok(self.registry.targets().into_iter().cloned().collect());
        }
        let mut resolved = Vec::new();
        for tag in &options.locales {
            match self.registry.get(tag) {
                Some(locale) if self.registry.is_target(tag) => resolved.push(locale.clone()),
                Some(_) => bail!("locale '{}' is not an enabled translation target", tag),
                None => bail!("unknown locale '{}'", tag),
            }
        }
        Ok(resolved)
    }

    /// Structural comparison only: no provider calls, no writes.
    fn verify_structures(&self, source: &Value, locales: &[LocaleConfig]) -> Result<RunSummary> {
        let source_keys = top_level_keys(source);
        let mut summary = RunSummary::default();

        for locale in locales {
            let target: Option<Value> = store::load_json(&self.project.file_for_locale(&locale.tag))?;
            let aligned = match &target {
                Some(tree) => {
                    let target_keys = top_level_keys(tree);
                    let missing: Vec<&String> =
                        source_keys.iter().filter(|k| !target_keys.contains(*k)).collect();
                    let extra: Vec<&String> =
                        target_keys.iter().filter(|k| !source_keys.contains(*k)).collect();
                    if missing.is_empty() && extra.is_empty() {
                        info!("{}: structure OK ({} blocks)", locale.tag, target_keys.len());
                        true
                    } else {
                        warn!(
                            "{}: structure misaligned ({} missing, {} extra blocks)",
                            locale.tag,
                            missing.len(),
                            extra.len()
                        );
                        false
                    }
                }
                None => {
                    warn!("{}: no document found", locale.tag);
                    false
                }
            };
            summary.reports.push(LocaleReport {
                locale: locale.tag.clone(),
                structure_aligned: aligned,
                ..LocaleReport::default()
            });
        }
        Ok(summary)
    }

    async fn translate_locale(
        &self,
        source: &Value,
        source_diff: &DiffResult,
        memory: &mut TranslationMemory,
        locale: &LocaleConfig,
        options: &RunOptions,
    ) -> Result<LocaleReport> {
        info!("processing {} ({})", locale.tag, locale.name);
        let mut report = LocaleReport {
            locale: locale.tag.clone(),
            structure_aligned: true,
            ..LocaleReport::default()
        };

        let target_file = self.project.file_for_locale(&locale.tag);
        let target: Value = match store::load_json(&target_file)? {
            Some(tree) => tree,
            None if options.create_missing => {
                info!("{}: creating missing document from source", locale.tag);
                if !options.dry_run {
                    store::save_json(&target_file, source)?;
                }
                source.clone()
            }
            None => Value::Object(serde_json::Map::new()),
        };

        // Structure first: removed source paths drop out here, missing
        // branches arrive as untranslated source copies.
        let mut synced = sync_structure(source, &target);

        let mut blocks = select_blocks(
            source,
            &synced,
            source_diff,
            memory,
            &locale.tag,
            &self.project.excluded_keys,
        );
        if !options.blocks.is_empty() {
            for requested in &options.blocks {
                if !blocks.iter().any(|b| &b.name == requested) {
                    warn!("{}: requested block '{}' needs no work", locale.tag, requested);
                }
            }
            blocks.retain(|block| options.blocks.contains(&block.name));
        }
        report.blocks_selected = blocks.len();

        if blocks.is_empty() {
            info!("{}: already synchronized and translated", locale.tag);
            if !options.dry_run {
                store::save_json(&target_file, &synced)?;
            }
            return Ok(report);
        }
        info!("{}: {} blocks to translate", locale.tag, blocks.len());

        if options.dry_run {
            self.plan_blocks(&locale.tag, &blocks);
            return Ok(report);
        }

        let mut progress =
            ProgressTracker::open(&self.config.state_dir, &self.project.id, &locale.tag)?;
        if !options.resume {
            progress.reset()?;
        }

        let glossary_lines = self.glossary_for(&locale.tag);
        let block_count = blocks.len();
        let memory_file = self.project.memory_file(&self.config.state_dir);

        for (index, block) in blocks.iter().enumerate() {
            if options.resume && progress.is_done(&block.name) {
                info!("{}: [{}/{}] {} already done, skipping", locale.tag, index + 1, block_count, block.name);
                report.blocks_skipped += 1;
                continue;
            }
            info!("{}: [{}/{}] {}", locale.tag, index + 1, block_count, block.name);
            progress.mark(&block.name, BlockStatus::InProgress)?;

            let outcome = self
                .dispatcher
                .dispatch_block(&locale.tag, &locale.name, &glossary_lines, block)
                .await;

            let original_block = source
                .get(&block.name)
                .cloned()
                .unwrap_or_else(|| block.content.clone());
            let mut merged = merge_preserving_structure(&original_block, &outcome.tree);

            // Fallback records revert to the untouched source sub-tree, not
            // the filtered payload that was on the wire.
            for key in &outcome.fallback_records {
                if key == &block.name && !original_block.is_object() {
                    merged = original_block.clone();
                } else if let (Value::Object(map), Some(original)) =
                    (&mut merged, original_block.get(key))
                {
                    map.insert(key.clone(), original.clone());
                }
            }

            record_block_memory(
                memory,
                &locale.tag,
                &block.name,
                &merged,
                &outcome.fallback_records,
                &outcome.usage,
            );

            if let Value::Object(map) = &mut synced {
                map.insert(block.name.clone(), merged);
            }

            let status = if outcome.fully_translated() {
                report.blocks_translated += 1;
                BlockStatus::Done
            } else {
                report.blocks_fallback += 1;
                BlockStatus::FailedFallback
            };
            progress.mark(&block.name, status)?;
            report.usage.accumulate(&outcome.usage);

            // Commit after every block: target first, then memory, so a
            // crash never leaves memory claiming work the target lacks.
            store::save_json(&target_file, &synced)?;
            memory.save(&memory_file)?;

            if index + 1 < block_count {
                tokio::time::sleep(BLOCK_PACING).await;
            }
        }

        // Provider output may have smuggled structure through the merge;
        // one final pass pins the key set back to the source.
        synced = sync_structure(source, &synced);
        report.structure_aligned = flatten(&synced).len() == flatten(source).len();
        store::save_json(&target_file, &synced)?;

        report.cost = self.cost_model.cost(&report.usage);
        info!(
            "{}: {} translated, {} fallback, {} skipped, {} tokens, ${:.4}",
            locale.tag,
            report.blocks_translated,
            report.blocks_fallback,
            report.blocks_skipped,
            report.usage.total_tokens,
            report.cost
        );

        if report.blocks_fallback == 0 {
            progress.clear()?;
        }
        Ok(report)
    }

    /// Dry-run planning: batch counts and unit estimates, no provider calls.
    fn plan_blocks(&self, tag: &str, blocks: &[Block]) {
        use crate::chunker::{chunk, estimate_units};

        let mut total_units = 0usize;
        let mut total_batches = 0usize;
        for block in blocks {
            let (batches, units) = match &block.content {
                Value::Object(map) => {
                    let batches = chunk(map, self.config.batch_budget_units);
                    let units = batches.iter().map(|b| b.estimated_units).sum::<usize>();
                    (batches.len(), units)
                }
                other => (1, estimate_units(other)),
            };
            info!(
                "{}: [dry-run] {} -> {} batches, ~{} units",
                tag, block.name, batches, units
            );
            total_batches += batches;
            total_units += units;
        }
        info!(
            "{}: [dry-run] would dispatch {} batches (~{} input units, ~${:.4})",
            tag,
            total_batches,
            total_units,
            self.cost_model.cost(&TokenUsage {
                input_tokens: total_units as u64,
                output_tokens: total_units as u64,
                total_tokens: 2 * total_units as u64,
            })
        );
    }

    fn glossary_for(&self, tag: &str) -> Vec<(String, String)> {
        self.glossary
            .iter()
            .filter_map(|(term, translations)| {
                translations
                    .get(tag)
                    .map(|preferred| (term.clone(), preferred.clone()))
            })
            .take(GLOSSARY_PROMPT_LIMIT)
            .collect()
    }
}

/// Record every translated leaf of a merged block into the memory; records
/// that fell back keep no entry so the next run reselects them.
fn record_block_memory(
    memory: &mut TranslationMemory,
    locale: &str,
    block_name: &str,
    merged: &Value,
    fallback_records: &[String],
    usage: &TokenUsage,
) {
    let usage = (usage.total_tokens > 0).then_some(*usage);
    let block_prefix = Path::key(block_name);

    match merged {
        Value::Object(map) => {
            for (record_key, record_value) in map {
                if fallback_records.iter().any(|k| k == record_key) {
                    continue;
                }
                let prefix = block_prefix.child_key(record_key);
                for (relative, value) in flatten(record_value) {
                    memory.record(locale, &prefix.join(&relative), value, usage);
                }
            }
        }
        other => {
            if fallback_records.is_empty() {
                for (relative, value) in flatten(other) {
                    memory.record(locale, &block_prefix.join(&relative), value, usage);
                }
            }
        }
    }
}

fn top_level_keys(tree: &Value) -> Vec<String> {
    match tree {
        Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}
