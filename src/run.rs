//! Pipeline entry points.
//!
//! [`run_pipeline`] and [`run_stage`] take the text source and LLM client
//! as parameters; [`run`] and [`run_one`] wire in the production ones
//! ([`PdfiumTextSource`], [`ProviderClient`]) from the config.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::{PipelineReport, StageReport};
use crate::pipeline::extract_text::{extract_text, PageTextSource};
use crate::pipeline::llm::{CompletionClient, ProviderClient};
use crate::pipeline::merge::merge_periods;
use crate::pipeline::reformat::reformat;
use crate::pipeline::render::PdfiumTextSource;
use crate::pipeline::standardize::standardize;
use crate::pipeline::structured::extract_statements;
use crate::pipeline::Stage;
use tracing::info;

fn announce(stage: Stage) {
    info!("=== Stage {}: {} ===", stage.number(), stage);
}

/// Run stage 1 on the blocking pool.
async fn run_text_extraction<S>(source: S, config: &PipelineConfig) -> Result<StageReport, PipelineError>
where
    S: PageTextSource + 'static,
{
    let config = config.clone();
    tokio::task::spawn_blocking(move || extract_text(&source, &config))
        .await
        .map_err(|e| PipelineError::Internal(format!("text extraction task panicked: {e}")))?
}

/// Run a single stage against whatever the previous stage left on disk.
pub async fn run_stage<S, C>(
    stage: Stage,
    source: S,
    client: &C,
    config: &PipelineConfig,
) -> Result<StageReport, PipelineError>
where
    S: PageTextSource + 'static,
    C: CompletionClient,
{
    announce(stage);
    match stage {
        Stage::TextExtraction => run_text_extraction(source, config).await,
        Stage::StructuredExtraction => extract_statements(client, config).await,
        Stage::Merge => merge_periods(config),
        Stage::Reformat => reformat(config),
        Stage::Standardize => standardize(client, config).await,
    }
}

/// Run all five stages in order, stopping at the first fatal error.
///
/// # Example
/// ```rust,no_run
/// use edgequake_finstat::{run_pipeline, PdfiumTextSource, PipelineConfig, ProviderClient};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::builder("PVIAM", ["2021", "2022"]).build()?;
/// let client = ProviderClient::from_config(&config)?;
/// let report = run_pipeline(PdfiumTextSource::from_config(&config), &client, &config).await?;
/// for w in report.warnings() {
///     eprintln!("warning: {w}");
/// }
/// # Ok(())
/// # }
/// ```
pub async fn run_pipeline<S, C>(
    source: S,
    client: &C,
    config: &PipelineConfig,
) -> Result<PipelineReport, PipelineError>
where
    S: PageTextSource + 'static,
    C: CompletionClient,
{
    let mut report = PipelineReport::default();

    announce(Stage::TextExtraction);
    report.stages.push(run_text_extraction(source, config).await?);
    announce(Stage::StructuredExtraction);
    report.stages.push(extract_statements(client, config).await?);
    announce(Stage::Merge);
    report.stages.push(merge_periods(config)?);
    announce(Stage::Reformat);
    report.stages.push(reformat(config)?);
    announce(Stage::Standardize);
    report.stages.push(standardize(client, config).await?);

    Ok(report)
}

/// [`run_pipeline`] with pdfium/tesseract and the configured LLM provider.
///
/// The provider is resolved before stage 1 so a missing API key fails
/// before any OCR time is spent.
pub async fn run(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let client = ProviderClient::from_config(config)?;
    run_pipeline(PdfiumTextSource::from_config(config), &client, config).await
}

/// [`run_stage`] with production collaborators. Only stages 2 and 5 need an
/// LLM provider.
pub async fn run_one(stage: Stage, config: &PipelineConfig) -> Result<StageReport, PipelineError> {
    announce(stage);
    match stage {
        Stage::TextExtraction => {
            run_text_extraction(PdfiumTextSource::from_config(config), config).await
        }
        Stage::StructuredExtraction => {
            extract_statements(&ProviderClient::from_config(config)?, config).await
        }
        Stage::Merge => merge_periods(config),
        Stage::Reformat => reformat(config),
        Stage::Standardize => standardize(&ProviderClient::from_config(config)?, config).await,
    }
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_pipeline_sync(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(config))
}
