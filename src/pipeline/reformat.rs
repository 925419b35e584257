//! Stage 4: long table → one wide (item × period) table per statement type.
//!
//! Every cell goes through [`clean_value`], rows without an item or a year
//! are dropped, duplicate (statement type, item, year) observations collapse
//! onto the first non-missing value, and period columns follow the caller's
//! order with any extra years appended.

use crate::config::PipelineConfig;
use crate::error::{ItemError, PipelineError};
use crate::pipeline::layout::{ClaimedPaths, CompanyLayout};
use crate::pipeline::{Stage, StageTracker};
use crate::output::StageReport;
use crate::table::{LineItemRecord, WideTable};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Columns the combined long table must carry.
pub const REQUIRED_COLUMNS: [&str; 4] = ["item", "year", "value", "statement_type"];

static RE_NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d.\-]").unwrap());

/// Turn one raw cell into a number.
///
/// `"(1,234)"` → `-1234`; `"1 234"` → `1234`; `""`, `"nan"`, `"n/a"` →
/// missing; text that is not a number once separators and symbols are
/// stripped → missing.
pub fn clean_value(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("n/a") {
        return None;
    }

    let s = match s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        Some(inner) => format!("-{inner}"),
        None => s.to_string(),
    };
    let s = s.replace([',', ' '], "");
    let s = RE_NON_NUMERIC.replace_all(&s, "");

    Decimal::from_str(&s).ok().map(|d| d.normalize())
}

/// Read the combined long table, checking the required columns by header.
///
/// Missing optional columns (`item_number`) are fine; a missing required one
/// is fatal.
pub fn read_combined(path: &Path) -> Result<Vec<LineItemRecord>, PipelineError> {
    let table_err = |source| PipelineError::TableRead {
        path: path.to_path_buf(),
        source,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(table_err)?;
    let headers = rdr.headers().map_err(table_err)?.clone();
    let index_of = |name: &str| headers.iter().position(|h| h.trim() == name);

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| index_of(c).is_none())
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::MissingColumns {
            path: path.to_path_buf(),
            missing,
        });
    }

    let col = |name: &str| index_of(name).unwrap_or(usize::MAX);
    let (i_item, i_year, i_value, i_type) = (col("item"), col("year"), col("value"), col("statement_type"));
    let i_number = index_of("item_number");

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row.map_err(table_err)?;
        let cell = |i: usize| {
            row.get(i)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        records.push(LineItemRecord {
            item_number: i_number.and_then(cell),
            statement_type: cell(i_type).unwrap_or_default(),
            item: cell(i_item),
            year: cell(i_year),
            value: cell(i_value),
        });
    }
    Ok(records)
}

/// Pivot long records into one wide table per statement type.
///
/// Statement types come out sorted. Rows are sorted by item name. Items and
/// years with no value at all are left out.
pub fn pivot(records: &[LineItemRecord], periods: &[String]) -> Vec<(String, WideTable)> {
    // statement type → item → year → first non-missing value
    let mut grouped: BTreeMap<&str, BTreeMap<&str, BTreeMap<&str, Option<Decimal>>>> =
        BTreeMap::new();

    for r in records {
        let (Some(item), Some(year)) = (r.item.as_deref(), r.year.as_deref()) else {
            continue;
        };
        let value = r.value.as_deref().and_then(clean_value);
        let slot = grouped
            .entry(r.statement_type.as_str())
            .or_default()
            .entry(item)
            .or_default()
            .entry(year)
            .or_insert(None);
        if slot.is_none() {
            *slot = value;
        }
    }

    grouped
        .into_iter()
        .map(|(statement_type, items)| {
            let mut years: Vec<&str> = Vec::new();
            for cells in items.values() {
                for (year, v) in cells {
                    if v.is_some() && !years.contains(year) {
                        years.push(*year);
                    }
                }
            }
            years.sort_unstable();

            let mut columns: Vec<String> = periods
                .iter()
                .filter(|p| years.contains(&p.as_str()))
                .cloned()
                .collect();
            for y in years {
                if !columns.iter().any(|c| c == y) {
                    columns.push(y.to_string());
                }
            }

            let mut table = WideTable::new(columns);
            for (item, cells) in items {
                if cells.values().all(Option::is_none) {
                    continue;
                }
                let values = table
                    .columns
                    .iter()
                    .map(|c| cells.get(c.as_str()).copied().flatten())
                    .collect();
                table.push_row(item, values);
            }
            (statement_type.to_string(), table)
        })
        .collect()
}

/// Run stage 4 over `period_statements/all_periods_concatenated.csv`.
pub fn reformat(config: &PipelineConfig) -> Result<StageReport, PipelineError> {
    let layout = CompanyLayout::new(&config.company_dir);
    let combined = layout.combined_table();

    if !combined.exists() {
        return Err(PipelineError::MissingInput {
            stage: Stage::Reformat,
            path: combined,
        });
    }

    let records = read_combined(&combined)?;
    let before = records.len();
    let tables = pivot(&records, &config.periods);
    debug!("Pivoted {} long rows into {} statement tables", before, tables.len());

    let mut tracker = StageTracker::start(Stage::Reformat, tables.len(), config.progress_callback.clone());
    tracker.note(format!("Processing combined file: {}", combined.display()));

    let mut claimed = ClaimedPaths::default();
    for (statement_type, table) in tables {
        let output = layout.wide_table(&statement_type);
        if let Some(owner) = claimed.claim(&output, &statement_type) {
            tracker.skip(ItemError::OutputCollision {
                label: statement_type,
                path: output,
                owner,
            });
            continue;
        }
        match table.write_csv(&output) {
            Ok(()) => {
                tracker.note(format!(
                    "Reformatted '{}' ({} items × {} periods) to: {}",
                    statement_type,
                    table.rows.len(),
                    table.columns.len(),
                    output.display()
                ));
                tracker.complete(&statement_type, output);
            }
            Err(e) => tracker.skip(ItemError::WriteFailed {
                label: statement_type,
                path: output,
                detail: e.to_string(),
            }),
        }
    }

    tracker.finish()
}
