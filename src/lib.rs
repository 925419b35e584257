//! # edgequake-finstat
//!
//! Turn PDF financial statements (scanned or digital, any language tesseract
//! knows) into comparable per-statement tables across reporting periods.
//!
//! ## Pipeline Overview
//!
//! ```text
//! financial_statements/{period}.pdf
//!  │
//!  ├─ 1. Text        pdfium text layer, or pdfium raster → tesseract (spawn_blocking)
//!  ├─ 2. Structure   page window → LLM → raw JSON → per-period long table
//!  ├─ 3. Merge       all periods → one long table + one per statement type
//!  ├─ 4. Reformat    long → item × period wide table, numbers cleaned
//!  └─ 5. Standardize LLM groups item-name variants; rows renamed and combined
//! ```
//!
//! Every stage reads the previous stage's files under the company folder,
//! skips the periods or files it cannot handle (recorded in its
//! [`StageReport`]), and fails only when nothing at all came out.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_finstat::{run, ExtractionMode, PageRange, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / GEMINI_API_KEY / ANTHROPIC_API_KEY
//!     let config = PipelineConfig::builder("PVIAM", ["2021", "2022", "2023"])
//!         .extraction_mode(ExtractionMode::Ocr)
//!         .page_range(PageRange::new(Some(5), Some(12)))
//!         .build()?;
//!     let report = run(&config).await?;
//!     for warning in report.warnings() {
//!         eprintln!("warning: {warning}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `finstat` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-finstat = { version = "0.1", default-features = false }
//! ```
//!
//! ## External Tools
//!
//! OCR mode needs the `tesseract` binary with the configured language pack
//! (default `vie`). Both modes need the pdfium shared library, found on the
//! system library path or in [`PipelineConfig::pdfium_library_dir`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;
pub mod table;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AggregationPolicy, ExtractionMode, PageRange, PipelineConfig, PipelineConfigBuilder};
pub use error::{ItemError, PipelineError};
pub use output::{PipelineReport, StageReport, StageWarning};
pub use pipeline::extract_text::PageTextSource;
pub use pipeline::llm::{Completion, CompletionClient, CompletionRequest, ProviderClient};
pub use pipeline::pages::PageText;
pub use pipeline::render::PdfiumTextSource;
pub use pipeline::Stage;
pub use progress::{NoopProgressCallback, ProgressCallback, StageProgressCallback};
pub use run::{run, run_one, run_pipeline, run_pipeline_sync, run_stage};
pub use table::{
    LineItemRecord, LongTable, StandardizationGroup, StandardizationMapping, WideRow, WideTable,
};
