//! Stale block selection: the minimal set of top-level blocks worth paying
//! the provider for.

use serde_json::Value;

use crate::diff::DiffResult;
use crate::filter::filter_empty;
use crate::memory::TranslationMemory;
use crate::path::{flatten, Path};

/// A top-level sub-tree scheduled for translation. `content` is the filtered
/// source payload; the unfiltered original stays in the source tree and is
/// re-attached during the merge.
#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    pub content: Value,
}

/// Pick every block with at least one leaf that still needs translation.
///
/// Blocks whose content filters away entirely are skipped. Blocks are
/// independent scheduling units: selection never considers another block's
/// state, so one block's later failure cannot block a sibling.
pub fn select_blocks(
    source: &Value,
    target: &Value,
    diff: &DiffResult,
    memory: &TranslationMemory,
    locale: &str,
    excluded_keys: &[String],
) -> Vec<Block> {
    let source_map = match source {
        Value::Object(map) => map,
        _ => return Vec::new(),
    };
    let empty = serde_json::Map::new();
    let target_map = match target {
        Value::Object(map) => map,
        _ => &empty,
    };

    let mut blocks = Vec::new();
    for (block_name, block_data) in source_map {
        let filtered = match filter_empty(block_data, excluded_keys) {
            Some(tree) => tree,
            None => continue,
        };

        let target_block = match target_map.get(block_name) {
            Some(value) => value,
            None => {
                blocks.push(Block {
                    name: block_name.clone(),
                    content: filtered,
                });
                continue;
            }
        };

        if block_needs_work(block_name, &filtered, target_block, diff, memory, locale) {
            blocks.push(Block {
                name: block_name.clone(),
                content: filtered,
            });
        }
    }
    blocks
}

fn block_needs_work(
    block_name: &str,
    filtered_source: &Value,
    target_block: &Value,
    diff: &DiffResult,
    memory: &TranslationMemory,
    locale: &str,
) -> bool {
    // Flatten under the block name so leaf paths line up with the diff,
    // which is computed over the whole source document.
    let prefix = Path::key(block_name);
    let source_flat = flatten_under(&prefix, filtered_source);
    let target_flat = flatten_under(&prefix, target_block);

    source_flat.iter().any(|(path, source_value)| {
        memory.needs_translation(locale, path, source_value, target_flat.get(path), diff)
    })
}

fn flatten_under(prefix: &Path, tree: &Value) -> crate::path::FlatMap {
    let mut wrapped = serde_json::Map::new();
    let head = match prefix.head_key() {
        Some(key) => key.to_string(),
        None => return flatten(tree),
    };
    wrapped.insert(head, tree.clone());
    flatten(&Value::Object(wrapped))
}
