//! Stage 5: canonical item names for every wide table.
//!
//! The LLM sees the unique item names of one statement file and returns
//! ordered groups `{standardized_item, original_items}`. Rows are renamed
//! onto their group, rows sharing a name are combined under the configured
//! [`AggregationPolicy`], and the output follows the groups' order.
//!
//! Raw names the mapping forgot are kept under their own name after the
//! mapped rows and reported as [`StageWarning::UncoveredItems`].

use crate::config::{AggregationPolicy, PipelineConfig};
use crate::error::{ItemError, PipelineError};
use crate::output::{StageReport, StageWarning};
use crate::pipeline::layout::{CompanyLayout, TABLE_EXT};
use crate::pipeline::llm::{CompletionClient, CompletionRequest};
use crate::pipeline::response::{strip_code_fences, unwrap_array};
use crate::pipeline::{Stage, StageTracker};
use crate::prompts::{standardization_user_message, STANDARDIZATION_SYSTEM_PROMPT};
use crate::table::{StandardizationGroup, StandardizationMapping, WideTable};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Object keys under which a reply may nest its group array.
pub const MAPPING_KEYS: [&str; 6] = [
    "mapping",
    "groups",
    "standardized_items",
    "standardization",
    "items",
    "data",
];

/// Parse a standardisation reply into ordered groups.
///
/// Accepts a bare array or one nested under [`MAPPING_KEYS`]; anything else
/// is an error, as is a group without `standardized_item`.
pub fn parse_mapping(raw: &str) -> Result<StandardizationMapping, serde_json::Error> {
    let value: Value = serde_json::from_str(&strip_code_fences(raw))?;
    let items = unwrap_array(value, &MAPPING_KEYS)
        .map_err(<serde_json::Error as serde::de::Error>::custom)?;
    let groups: Vec<StandardizationGroup> = serde_json::from_value(Value::Array(items))?;
    Ok(StandardizationMapping { groups })
}

/// Result of applying a mapping to one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standardized {
    pub table: WideTable,
    /// Raw names no group listed, in input order.
    pub uncovered: Vec<String>,
    /// `(raw name, group kept)` for names listed by more than one group.
    pub duplicates: Vec<(String, String)>,
}

/// Rename, combine and reorder `table` according to `mapping`.
///
/// Row order is the groups' order, then uncovered names in input order. A
/// group with no matching row yields an all-missing row.
pub fn apply_mapping(
    label: &str,
    table: &WideTable,
    mapping: &StandardizationMapping,
    policy: AggregationPolicy,
) -> Result<Standardized, ItemError> {
    let mut target: HashMap<&str, &str> = HashMap::new();
    let mut duplicates = Vec::new();
    let mut order: Vec<String> = Vec::new();

    for group in &mapping.groups {
        let canonical = group.standardized_item.trim();
        if !order.iter().any(|o| o == canonical) {
            order.push(canonical.to_string());
        }
        for original in &group.original_items {
            if let Some(prev) = target.insert(original.as_str(), canonical) {
                if prev != canonical {
                    duplicates.push((original.clone(), canonical.to_string()));
                }
            }
        }
    }

    let mut uncovered = Vec::new();
    let mut sources: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, row) in table.rows.iter().enumerate() {
        let name = match target.get(row.item.as_str()) {
            Some(canonical) => canonical.to_string(),
            None => {
                if !uncovered.contains(&row.item) {
                    uncovered.push(row.item.clone());
                }
                row.item.clone()
            }
        };
        if !order.contains(&name) {
            order.push(name.clone());
        }
        sources.entry(name).or_default().push(idx);
    }

    let width = table.columns.len();
    let mut out = WideTable::new(table.columns.clone());
    for name in order {
        let rows = sources.get(&name).map(Vec::as_slice).unwrap_or(&[]);
        if policy == AggregationPolicy::Strict && rows.len() > 1 {
            return Err(ItemError::AmbiguousAggregation {
                label: label.to_string(),
                canonical: name,
                originals: rows.iter().map(|&i| table.rows[i].item.clone()).collect(),
            });
        }
        let values = (0..width)
            .map(|col| {
                let mut present = rows.iter().filter_map(|&i| table.rows[i].values[col]);
                match policy {
                    AggregationPolicy::Sum => present.reduce(|a, b| a + b),
                    AggregationPolicy::First | AggregationPolicy::Strict => present.next(),
                }
            })
            .collect::<Vec<Option<Decimal>>>();
        out.push_row(name, values);
    }

    Ok(Standardized {
        table: out,
        uncovered,
        duplicates,
    })
}

/// Unique row names in table order, as pretty-printed JSON with non-ASCII
/// kept as-is. Returns the count alongside.
fn unique_items_json(table: &WideTable) -> (usize, String) {
    let mut items: Vec<&str> = Vec::new();
    for item in table.items() {
        if !items.contains(&item) {
            items.push(item);
        }
    }
    let count = items.len();
    (count, format!("{:#}", serde_json::Value::from(items)))
}

/// Wide tables waiting for standardisation, sorted by file name.
fn list_tables(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == TABLE_EXT))
        .collect();
    files.sort();
    Ok(files)
}

/// Run stage 5 over every table in `final_statements/`.
pub async fn standardize<C>(client: &C, config: &PipelineConfig) -> Result<StageReport, PipelineError>
where
    C: CompletionClient,
{
    let layout = CompanyLayout::new(&config.company_dir);
    let input_dir = layout.wide_dir();
    if !input_dir.is_dir() {
        return Err(PipelineError::MissingInput {
            stage: Stage::Standardize,
            path: input_dir,
        });
    }
    let files = list_tables(&input_dir).map_err(|_| PipelineError::MissingInput {
        stage: Stage::Standardize,
        path: input_dir.clone(),
    })?;
    if files.is_empty() {
        return Err(PipelineError::EmptyInputDir {
            stage: Stage::Standardize,
            path: input_dir,
        });
    }

    let output_dir = layout.standardized_dir();
    std::fs::create_dir_all(&output_dir).map_err(|e| PipelineError::OutputWriteFailed {
        path: output_dir.clone(),
        source: e,
    })?;

    let system = config
        .standardization_prompt
        .as_deref()
        .unwrap_or(STANDARDIZATION_SYSTEM_PROMPT);

    let mut tracker = StageTracker::start(
        Stage::Standardize,
        files.len(),
        config.progress_callback.clone(),
    );
    tracker.note("--- Starting financial statement item standardization ---");

    for path in files {
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        tracker.note(format!("Processing file for standardization: {}", path.display()));

        let table = match WideTable::read_csv(&path) {
            Ok(t) => t,
            Err(e) => {
                tracker.skip(ItemError::ReadFailed {
                    label: file_name,
                    path,
                    detail: e.to_string(),
                });
                continue;
            }
        };
        if table.is_empty() {
            tracker.skip(ItemError::EmptyContent {
                label: file_name,
                detail: "table has no rows".to_string(),
            });
            continue;
        }

        let (unique, items_json) = unique_items_json(&table);
        tracker.note(format!(
            "  Found {} unique items. Sending for standardization...",
            unique
        ));

        let request = CompletionRequest {
            label: file_name.clone(),
            system: system.to_string(),
            user: standardization_user_message(&items_json),
            temperature: config.standardization_temperature,
            max_tokens: config.max_tokens,
        };
        let completion = match client.complete(&request).await {
            Ok(c) => c,
            Err(e) => {
                tracker.skip(e);
                continue;
            }
        };
        debug!(
            "{}: {} input tokens, {} output tokens",
            file_name, completion.prompt_tokens, completion.completion_tokens
        );

        let mapping = match parse_mapping(&completion.content) {
            Ok(m) => m,
            Err(e) => {
                error!(
                    "{}: JSON decoding failed: {}\nLLM Response (raw):\n{}",
                    file_name, e, completion.content
                );
                tracker.skip(ItemError::InvalidResponse {
                    label: file_name,
                    detail: e.to_string(),
                    raw: completion.content,
                });
                continue;
            }
        };

        let standardized = match apply_mapping(&file_name, &table, &mapping, config.aggregation) {
            Ok(s) => s,
            Err(e) => {
                tracker.skip(e);
                continue;
            }
        };
        for (item, kept) in standardized.duplicates {
            tracker.warn(StageWarning::DuplicateMapping {
                label: file_name.clone(),
                item,
                kept,
            });
        }
        if !standardized.uncovered.is_empty() {
            tracker.warn(StageWarning::UncoveredItems {
                label: file_name.clone(),
                items: standardized.uncovered,
            });
        }

        let output = output_dir.join(&file_name);
        match standardized.table.write_csv(&output) {
            Ok(()) => {
                tracker.note(format!(
                    "  Standardized '{}' to: {}",
                    file_name,
                    output.display()
                ));
                tracker.note(format!(
                    "  Final standardized table shape: ({}, {})",
                    standardized.table.rows.len(),
                    standardized.table.columns.len()
                ));
                tracker.complete(&file_name, output);
            }
            Err(e) => tracker.skip(ItemError::WriteFailed {
                label: file_name,
                path: output,
                detail: e.to_string(),
            }),
        }
    }

    tracker.finish()
}
