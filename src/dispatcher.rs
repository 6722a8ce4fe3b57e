//! Batch dispatch: bounded-concurrency fan-out to the provider with per-key
//! fallback.
//!
//! Workers only call the provider and hand back their own result; every
//! write (shape check, fallback substitution, usage accounting) happens on
//! the caller's task after all workers for the block have been joined.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::chunker::{chunk, Batch};
use crate::provider::{ProviderError, ProviderReply, ProviderRequest, TokenUsage, TranslationProvider};
use crate::retry::{with_retry_decide, RetryConfig};
use crate::selector::Block;

/// Wrapper keys some models nest their object under despite instructions.
const WRAPPER_KEYS: [&str; 7] = [
    "json",
    "translated_data",
    "data",
    "result",
    "output",
    "content",
    "translation",
];

/// Result of dispatching one block: a tree covering every input key,
/// translated where the provider delivered and original elsewhere.
#[derive(Debug)]
pub struct BlockOutcome {
    pub tree: Value,
    pub translated_keys: usize,
    pub fallback_keys: usize,
    /// Record keys that carry original content; these must not enter the
    /// translation memory.
    pub fallback_records: Vec<String>,
    pub batches: usize,
    pub usage: TokenUsage,
}

impl BlockOutcome {
    pub fn fully_translated(&self) -> bool {
        self.fallback_keys == 0
    }
}

pub struct Dispatcher {
    provider: Arc<dyn TranslationProvider>,
    semaphore: Arc<Semaphore>,
    retry: RetryConfig,
    budget_units: usize,
}

impl Dispatcher {
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        max_concurrent_requests: usize,
        retry: RetryConfig,
        budget_units: usize,
    ) -> Self {
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
            retry,
            budget_units,
        }
    }

    /// Translate one block. Never fails: records the provider could not
    /// translate come back as their original (filtered) content and are
    /// counted in `fallback_keys`.
    pub async fn dispatch_block(
        &self,
        locale: &str,
        language: &str,
        glossary: &[(String, String)],
        block: &Block,
    ) -> BlockOutcome {
        // A non-object block (array or scalar) ships as a single record
        // keyed by its own name; the result is unwrapped on the way out.
        let (records, wrapped) = match &block.content {
            Value::Object(map) => (map.clone(), false),
            other => {
                let mut map = Map::new();
                map.insert(block.name.clone(), other.clone());
                (map, true)
            }
        };

        let batches = chunk(&records, self.budget_units);
        debug!(
            "{}/{}: {} records in {} batches",
            locale,
            block.name,
            records.len(),
            batches.len()
        );

        let workers = batches.iter().enumerate().map(|(index, batch)| {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&self.semaphore);
            let retry = self.retry.clone();
            let request = ProviderRequest {
                locale: locale.to_string(),
                language: language.to_string(),
                payload: Value::Object(batch.records.clone()),
                glossary: glossary.to_vec(),
            };
            let operation_name = format!("{}/{} batch {}", locale, block.name, index + 1);

            tokio::spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("dispatch semaphore is never closed");
                with_retry_decide(
                    &retry,
                    &operation_name,
                    || provider.translate(request.clone()),
                    ProviderError::retry_decision,
                )
                .await
            })
        });

        // Join barrier: all workers finish before any state is aggregated.
        let results = join_all(workers).await;

        let mut outcome_records = Map::new();
        let mut translated_keys = 0;
        let mut fallback_keys = 0;
        let mut fallback_records = Vec::new();
        let mut usage = TokenUsage::default();

        for (batch, joined) in batches.iter().zip(results) {
            let result = match joined {
                Ok(result) => result,
                Err(join_error) => {
                    warn!("{}/{}: worker panicked: {}", locale, block.name, join_error);
                    Err(ProviderError::Transport(join_error.to_string()))
                }
            };

            match result {
                Ok(reply) => {
                    let (batch_records, batch_fallbacks) =
                        reconcile_batch(locale, &block.name, batch, reply, &mut usage);
                    translated_keys += batch_records.len() - batch_fallbacks.len();
                    fallback_keys += batch_fallbacks.len();
                    fallback_records.extend(batch_fallbacks);
                    outcome_records.extend(batch_records);
                }
                Err(error) => {
                    warn!(
                        "{}/{}: batch of {} records failed after retries ({}), falling back to source",
                        locale,
                        block.name,
                        batch.len(),
                        error
                    );
                    fallback_keys += batch.len();
                    fallback_records.extend(batch.keys().cloned());
                    outcome_records.extend(batch.records.clone());
                }
            }
        }

        info!(
            "{}/{}: {} translated, {} fallback across {} batches",
            locale,
            block.name,
            translated_keys,
            fallback_keys,
            batches.len()
        );

        let tree = if wrapped {
            outcome_records
                .remove(&block.name)
                .unwrap_or_else(|| block.content.clone())
        } else {
            Value::Object(outcome_records)
        };

        BlockOutcome {
            tree,
            translated_keys,
            fallback_keys,
            fallback_records,
            batches: batches.len(),
            usage,
        }
    }
}

/// Validate a reply's shape against the batch it answers and substitute
/// originals per key where needed. Returns the reconciled records plus the
/// keys that fell back.
fn reconcile_batch(
    locale: &str,
    block_name: &str,
    batch: &Batch,
    reply: ProviderReply,
    usage: &mut TokenUsage,
) -> (Map<String, Value>, Vec<String>) {
    if let Some(batch_usage) = &reply.usage {
        usage.accumulate(batch_usage);
    }

    let candidate = unwrap_reply(reply.tree, &batch.records);
    let candidate_map = match candidate {
        Value::Object(map) => map,
        other => {
            warn!(
                "{}/{}: expected an object, got {}; batch falls back",
                locale,
                block_name,
                kind_of(&other)
            );
            return (batch.records.clone(), batch.keys().cloned().collect());
        }
    };

    let extra: Vec<&String> = candidate_map
        .keys()
        .filter(|key| !batch.records.contains_key(*key))
        .collect();
    if !extra.is_empty() {
        warn!(
            "{}/{}: discarding {} unexpected keys ({:?}...)",
            locale,
            block_name,
            extra.len(),
            extra.iter().take(5).collect::<Vec<_>>()
        );
    }

    let mut records = Map::new();
    let mut fallbacks = Vec::new();
    for (key, original) in &batch.records {
        match candidate_map.get(key) {
            Some(value) => {
                records.insert(key.clone(), value.clone());
            }
            None => {
                debug!(
                    "{}/{}: key '{}' missing from reply, keeping original",
                    locale, block_name, key
                );
                records.insert(key.clone(), original.clone());
                fallbacks.push(key.clone());
            }
        }
    }
    (records, fallbacks)
}

/// Some providers nest the object under a wrapper key even when told not to.
/// Unwrap one level when the top level shares no keys with the batch but a
/// known wrapper does.
fn unwrap_reply(tree: Value, expected: &Map<String, Value>) -> Value {
    let map = match &tree {
        Value::Object(map) => map,
        _ => return tree,
    };
    if expected.keys().any(|key| map.contains_key(key)) {
        return tree;
    }
    for wrapper in WRAPPER_KEYS {
        if let Some(inner @ Value::Object(inner_map)) = map.get(wrapper) {
            if expected.keys().any(|key| inner_map.contains_key(key)) {
                return inner.clone();
            }
        }
    }
    tree
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
