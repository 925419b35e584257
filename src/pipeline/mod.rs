//! Pipeline stages for PDF-to-table conversion.
//!
//! Each stage reads the previous stage's files from the company folder and
//! writes its own; no stage looks at a later stage's output.
//!
//! ## Data Flow
//!
//! ```text
//! extract_text ──▶ structured ──▶ merge ──▶ reformat ──▶ standardize
//!  (pdfium/OCR)     (LLM→JSON)   (long)     (wide)       (LLM names)
//! ```
//!
//! 1. [`extract_text`]: per period PDF → page-tagged text
//! 2. [`structured`]: page-filtered text → raw LLM JSON → per-period table
//! 3. [`merge`]: all periods → one long table + one per statement type
//! 4. [`reformat`]: long table → item × year wide table per statement type
//! 5. [`standardize`]: wide table → canonical item names, aggregated
//!
//! Helpers: [`layout`] (paths), [`input`] (PDF checks), [`render`]
//! (pdfium + tesseract), [`pages`] (page markers), [`llm`] (model calls),
//! [`response`] (LLM reply decoding).

pub mod extract_text;
pub mod input;
pub mod layout;
pub mod llm;
pub mod merge;
pub mod pages;
pub mod reformat;
pub mod render;
pub mod response;
pub mod standardize;
pub mod structured;

use crate::error::{ItemError, PipelineError};
use crate::output::{StageReport, StageWarning};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    TextExtraction,
    StructuredExtraction,
    Merge,
    Reformat,
    Standardize,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::TextExtraction,
        Stage::StructuredExtraction,
        Stage::Merge,
        Stage::Reformat,
        Stage::Standardize,
    ];

    /// 1-based position in the pipeline.
    pub fn number(self) -> usize {
        match self {
            Stage::TextExtraction => 1,
            Stage::StructuredExtraction => 2,
            Stage::Merge => 3,
            Stage::Reformat => 4,
            Stage::Standardize => 5,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::TextExtraction => "Text extraction",
            Stage::StructuredExtraction => "Structured extraction",
            Stage::Merge => "Merge",
            Stage::Reformat => "Reformat",
            Stage::Standardize => "Standardize",
        };
        f.write_str(name)
    }
}

/// Bookkeeping shared by every stage: fills the [`StageReport`], mirrors each
/// event to `tracing`, and forwards it to the progress callback.
pub(crate) struct StageTracker {
    report: StageReport,
    progress: Option<ProgressCallback>,
}

impl StageTracker {
    pub(crate) fn start(stage: Stage, total_items: usize, progress: Option<ProgressCallback>) -> Self {
        if let Some(ref cb) = progress {
            cb.on_stage_start(stage, total_items);
        }
        let mut report = StageReport::new(stage);
        report.attempted = total_items;
        Self { report, progress }
    }

    /// Record a progress line.
    pub(crate) fn note(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!("{}", line);
        self.report.log_lines.push(line);
    }

    /// Record a file the stage wrote without completing an item (e.g. the
    /// combined long table).
    pub(crate) fn wrote(&mut self, path: PathBuf) {
        self.report.outputs.push(path);
    }

    pub(crate) fn complete(&mut self, label: &str, output: PathBuf) {
        self.complete_item(label);
        self.report.outputs.push(output);
    }

    /// Mark an item done when its output is shared with other items.
    pub(crate) fn complete_item(&mut self, label: &str) {
        if let Some(ref cb) = self.progress {
            cb.on_item_complete(self.report.stage, label);
        }
        self.report.completed.push(label.to_string());
    }

    pub(crate) fn skip(&mut self, err: ItemError) {
        let reason = err.to_string();
        warn!("{}. Skipping.", reason);
        if let Some(ref cb) = self.progress {
            cb.on_item_skipped(self.report.stage, err.label(), &reason);
        }
        self.report.log_lines.push(format!("Warning: {reason}. Skipping."));
        self.report.skipped.push(err);
    }

    pub(crate) fn warn(&mut self, warning: StageWarning) {
        warn!("{}", warning);
        self.report.log_lines.push(format!("Warning: {warning}"));
        self.report.warnings.push(warning);
    }

    pub(crate) fn success_count(&self) -> usize {
        self.report.completed.len()
    }

    /// Close the stage as failed regardless of completed items.
    pub(crate) fn abort(self, reason: impl Into<String>) -> PipelineError {
        let stage = self.report.stage;
        if let Some(ref cb) = self.progress {
            cb.on_stage_complete(stage, self.report.attempted, self.report.completed.len());
        }
        PipelineError::StageFailed {
            stage,
            attempted: self.report.attempted,
            first_error: reason.into(),
        }
    }

    /// Close the stage. Zero completed items is fatal for the whole stage.
    pub(crate) fn finish(mut self) -> Result<StageReport, PipelineError> {
        let stage = self.report.stage;
        if let Some(ref cb) = self.progress {
            cb.on_stage_complete(stage, self.report.attempted, self.report.completed.len());
        }

        if self.report.completed.is_empty() {
            let first_error = self
                .report
                .skipped
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "nothing to process".to_string());
            return Err(PipelineError::StageFailed {
                stage,
                attempted: self.report.attempted,
                first_error,
            });
        }

        self.note(format!(
            "--- {} complete: {}/{} succeeded ---",
            stage,
            self.report.completed.len(),
            self.report.attempted
        ));
        Ok(self.report)
    }
}
