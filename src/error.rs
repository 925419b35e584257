//! Error types for the edgequake-finstat library.
//!
//! Two distinct error types reflect the two tiers every stage uses:
//!
//! * [`PipelineError`]: **Fatal**: the stage cannot hand anything to the
//!   next one (no period produced output, the combined table is missing a
//!   required column, the input directory is empty). Returned as
//!   `Err(PipelineError)` and the pipeline halts.
//!
//! * [`ItemError`]: **Non-fatal**: a single period or statement file failed
//!   (missing PDF, OCR crash, undecodable LLM reply) while the others are
//!   fine. Stored in [`crate::output::StageReport::skipped`] so callers can
//!   inspect partial success.

use crate::pipeline::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-finstat library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Stage errors ──────────────────────────────────────────────────────
    /// Every period/file of a stage was skipped; there is nothing to pass on.
    #[error("{stage} produced no output ({attempted} attempted).\nFirst error: {first_error}")]
    StageFailed {
        stage: Stage,
        attempted: usize,
        first_error: String,
    },

    /// A stage input that must exist (combined table, input directory) is absent.
    #[error("{stage}: required input '{path}' not found.\nRun the previous stage first.")]
    MissingInput { stage: Stage, path: PathBuf },

    /// The stage input directory exists but holds no files to work on.
    #[error("{stage}: no table files found in '{path}'")]
    EmptyInputDir { stage: Stage, path: PathBuf },

    /// The combined long table lacks one or more required columns.
    #[error("'{path}' is missing required columns: {}", missing.join(", "))]
    MissingColumns { path: PathBuf, missing: Vec<String> },

    /// A table file could not be parsed as CSV.
    #[error("Failed to read table '{path}': {source}")]
    TableRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a stage output that the stage cannot do without.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single period or statement file.
///
/// `label` is the period (stages 1–3) or the statement file name (stages 4–5).
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The per-item input file does not exist.
    #[error("{label}: input not found at '{path}'")]
    MissingInput { label: String, path: PathBuf },

    /// The input exists but is not a readable PDF.
    #[error("{label}: not a valid PDF: {detail}")]
    InvalidPdf { label: String, detail: String },

    /// Text extraction (pdfium or tesseract) failed.
    #[error("{label}: text extraction failed: {detail}")]
    ExtractionFailed { label: String, detail: String },

    /// An input file could not be read or parsed.
    #[error("{label}: failed to read '{path}': {detail}")]
    ReadFailed {
        label: String,
        path: PathBuf,
        detail: String,
    },

    /// Nothing left to send after page filtering, or the table has no rows.
    #[error("{label}: no content to process ({detail})")]
    EmptyContent { label: String, detail: String },

    /// LLM call failed (after retries, when retries are enabled).
    #[error("{label}: LLM call failed after {retries} retries: {detail}")]
    LlmFailed {
        label: String,
        retries: u32,
        detail: String,
    },

    /// The LLM reply is not valid JSON. `raw` holds the reply for diagnosis.
    #[error("{label}: JSON decoding of LLM response failed: {detail}")]
    InvalidResponse {
        label: String,
        detail: String,
        raw: String,
    },

    /// Two source rows collapse onto one standardised name under the strict policy.
    #[error("{label}: '{canonical}' would merge {} rows: {}", originals.len(), originals.join(", "))]
    AmbiguousAggregation {
        label: String,
        canonical: String,
        originals: Vec<String>,
    },

    /// Two items map to the same output file; the later one is not written.
    #[error("{label}: output '{path}' is already taken by '{owner}'")]
    OutputCollision {
        label: String,
        path: PathBuf,
        owner: String,
    },

    /// An item's output could not be written.
    #[error("{label}: failed to write '{path}': {detail}")]
    WriteFailed {
        label: String,
        path: PathBuf,
        detail: String,
    },
}

impl ItemError {
    /// The period or file label this error belongs to.
    pub fn label(&self) -> &str {
        match self {
            ItemError::MissingInput { label, .. }
            | ItemError::InvalidPdf { label, .. }
            | ItemError::ExtractionFailed { label, .. }
            | ItemError::ReadFailed { label, .. }
            | ItemError::EmptyContent { label, .. }
            | ItemError::LlmFailed { label, .. }
            | ItemError::InvalidResponse { label, .. }
            | ItemError::AmbiguousAggregation { label, .. }
            | ItemError::OutputCollision { label, .. }
            | ItemError::WriteFailed { label, .. } => label,
        }
    }
}
