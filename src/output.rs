//! Stage and pipeline reports.
//!
//! Every stage returns a [`StageReport`] on success, even when some of its
//! periods or files were skipped. Skips are kept as typed
//! [`ItemError`]s, and conditions that are suspicious but not fatal (a
//! row-count mismatch after concatenation, item names the standardisation
//! mapping forgot) are kept as [`StageWarning`]s rather than being buried in
//! log text.

use crate::error::ItemError;
use crate::pipeline::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Outcome of one stage run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    /// Periods or files the stage attempted.
    pub attempted: usize,
    /// Labels of the items that produced output, in processing order.
    pub completed: Vec<String>,
    /// Every file the stage wrote.
    pub outputs: Vec<PathBuf>,
    /// Items that were skipped, with the reason.
    pub skipped: Vec<ItemError>,
    /// Non-fatal anomalies worth a human look.
    pub warnings: Vec<StageWarning>,
    /// Human-readable progress log, one entry per event.
    pub log_lines: Vec<String>,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            attempted: 0,
            completed: Vec::new(),
            outputs: Vec::new(),
            skipped: Vec::new(),
            warnings: Vec::new(),
            log_lines: Vec::new(),
        }
    }

    pub fn success_count(&self) -> usize {
        self.completed.len()
    }

    /// The progress log joined into one block of text.
    pub fn log(&self) -> String {
        self.log_lines.join("\n")
    }
}

/// A non-fatal anomaly recorded by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageWarning {
    /// Concatenated row count differs from the sum of the per-period counts.
    RowCountMismatch { expected: usize, actual: usize },

    /// The LLM reply parsed as JSON but not as a list of records.
    ResponseShape { label: String, detail: String },

    /// Raw item names the standardisation mapping did not cover. They are
    /// kept under their raw name after the mapped rows.
    UncoveredItems { label: String, items: Vec<String> },

    /// A raw item name appeared in more than one group; the last group wins.
    DuplicateMapping {
        label: String,
        item: String,
        kept: String,
    },
}

impl fmt::Display for StageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageWarning::RowCountMismatch { expected, actual } => write!(
                f,
                "row count mismatch after concatenation: expected {expected}, got {actual}"
            ),
            StageWarning::ResponseShape { label, detail } => {
                write!(f, "{label}: unexpected response shape ({detail}); no records extracted")
            }
            StageWarning::UncoveredItems { label, items } => write!(
                f,
                "{label}: {} item(s) missing from the standardisation mapping: {}",
                items.len(),
                items.join(", ")
            ),
            StageWarning::DuplicateMapping { label, item, kept } => write!(
                f,
                "{label}: '{item}' mapped more than once; using '{kept}'"
            ),
        }
    }
}

/// Reports of every stage that ran, in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    /// All warnings across stages.
    pub fn warnings(&self) -> impl Iterator<Item = &StageWarning> {
        self.stages.iter().flat_map(|r| r.warnings.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_count_warning_display() {
        let w = StageWarning::RowCountMismatch {
            expected: 10,
            actual: 9,
        };
        assert!(w.to_string().contains("expected 10, got 9"));
    }

    #[test]
    fn report_log_joins_lines() {
        let mut r = StageReport::new(Stage::Merge);
        r.log_lines.push("a".into());
        r.log_lines.push("b".into());
        assert_eq!(r.log(), "a\nb");
        assert_eq!(r.success_count(), 0);
    }

    #[test]
    fn pipeline_report_lookup() {
        let mut report = PipelineReport::default();
        let mut merge = StageReport::new(Stage::Merge);
        merge.warnings.push(StageWarning::RowCountMismatch {
            expected: 1,
            actual: 2,
        });
        report.stages.push(StageReport::new(Stage::TextExtraction));
        report.stages.push(merge);
        assert!(report.stage(Stage::Merge).is_some());
        assert!(report.stage(Stage::Standardize).is_none());
        assert_eq!(report.warnings().count(), 1);
    }
}
