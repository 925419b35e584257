//! Stage 3: per-period tables → one long table, then one table per
//! statement type.
//!
//! Statement types are title-cased before splitting so `BALANCE SHEET` from
//! one period and `Balance sheet` from another land in the same file.

use crate::config::PipelineConfig;
use crate::error::{ItemError, PipelineError};
use crate::output::{StageReport, StageWarning};
use crate::pipeline::layout::{ClaimedPaths, CompanyLayout};
use crate::pipeline::{Stage, StageTracker};
use crate::table::{read_long_csv, title_case, write_long_csv, LineItemRecord, LongTable};
use tracing::debug;

/// Statement type given to records whose type came back empty.
pub const UNCLASSIFIED: &str = "Unclassified";

/// Concatenate per-period tables in period order and normalise statement
/// types. Returns the table and the row count the parts add up to.
pub fn concatenate(parts: Vec<Vec<LineItemRecord>>) -> (LongTable, usize) {
    let expected = parts.iter().map(Vec::len).sum();
    let records = parts
        .into_iter()
        .flatten()
        .map(|mut r| {
            let st = title_case(r.statement_type.trim());
            r.statement_type = if st.is_empty() {
                UNCLASSIFIED.to_string()
            } else {
                st
            };
            r
        })
        .collect();
    (LongTable { records }, expected)
}

/// Run stage 3.
///
/// Unreadable or missing period tables are skipped. Failing to write the
/// combined table is fatal, as is ending up with no statement-type file.
pub fn merge_periods(config: &PipelineConfig) -> Result<StageReport, PipelineError> {
    let layout = CompanyLayout::new(&config.company_dir);
    let mut tracker = StageTracker::start(
        Stage::Merge,
        config.periods.len(),
        config.progress_callback.clone(),
    );
    tracker.note("--- Concatenating each period ---");

    let mut parts = Vec::new();
    for period in &config.periods {
        let path = layout.period_table(period);
        if !path.exists() {
            tracker.skip(ItemError::MissingInput {
                label: period.clone(),
                path,
            });
            continue;
        }
        match read_long_csv(&path) {
            Ok(records) => {
                debug!("{}: {} rows from {}", period, records.len(), path.display());
                parts.push(records);
                tracker.complete_item(period);
            }
            Err(e) => tracker.skip(ItemError::ReadFailed {
                label: period.clone(),
                path,
                detail: e.to_string(),
            }),
        }
    }

    if tracker.success_count() == 0 {
        return tracker.finish();
    }
    tracker.note(format!(
        "Successfully read in {} periods of financial statements",
        tracker.success_count()
    ));

    let (combined, expected) = concatenate(parts);
    if combined.len() == expected {
        tracker.note(format!(
            "Concatenated all periods. Total rows: {}",
            combined.len()
        ));
    } else {
        tracker.warn(StageWarning::RowCountMismatch {
            expected,
            actual: combined.len(),
        });
    }

    let combined_path = layout.combined_table();
    write_long_csv(&combined_path, &combined.records).map_err(|e| {
        PipelineError::OutputWriteFailed {
            path: combined_path.clone(),
            source: e.into(),
        }
    })?;
    tracker.note(format!(
        "Saved full concatenated table to: {}",
        combined_path.display()
    ));
    tracker.wrote(combined_path);

    let types = combined.statement_types();
    if types.is_empty() {
        return Err(tracker.abort("no statement types found in the concatenated data"));
    }
    tracker.note(format!(
        "Found {} unique statement types: {}",
        types.len(),
        types.join(", ")
    ));

    let mut written = 0;
    let mut claimed = ClaimedPaths::default();
    for st in &types {
        let path = layout.statement_table(st);
        if let Some(owner) = claimed.claim(&path, st) {
            tracker.skip(ItemError::OutputCollision {
                label: st.clone(),
                path,
                owner,
            });
            continue;
        }
        match write_long_csv(&path, &combined.filter_type(st)) {
            Ok(()) => {
                tracker.note(format!("  - Saved '{st}' to: {}", path.display()));
                tracker.wrote(path);
                written += 1;
            }
            Err(e) => tracker.skip(ItemError::WriteFailed {
                label: st.clone(),
                path,
                detail: e.to_string(),
            }),
        }
    }
    if written == 0 {
        return Err(tracker.abort("no statement type file could be saved"));
    }

    tracker.finish()
}
