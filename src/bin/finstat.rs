//! CLI binary for edgequake-finstat.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints stage reports.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_finstat::{
    run, run_one, AggregationPolicy, ExtractionMode, PageRange, PipelineConfig, PipelineReport,
    ProgressCallback, Stage, StageProgressCallback, StageReport,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar per stage, one log line per period
/// or statement file.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Self {
        let bar = ProgressBar::hidden();
        Self { bar }
    }
}

impl StageProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage, total_items: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len}  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.reset();
        self.bar.set_length(total_items as u64);
        self.bar.set_style(style);
        self.bar.set_prefix(format!("{}. {}", stage.number(), stage));
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Stage {}: {stage} ({total_items} items)", stage.number()))
        ));
    }

    fn on_item_complete(&self, _stage: Stage, label: &str) {
        self.bar.println(format!("  {} {}", green("✓"), label));
        self.bar.inc(1);
    }

    fn on_item_skipped(&self, _stage: Stage, label: &str, reason: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if reason.chars().count() > 100 {
            format!("{}\u{2026}", reason.chars().take(99).collect::<String>())
        } else {
            reason.to_string()
        };
        self.bar.println(format!("  {} {}  {}", red("✗"), label, red(&msg)));
        self.bar.inc(1);
    }

    fn on_stage_complete(&self, stage: Stage, total_items: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_items.saturating_sub(success_count);
        let mark = if success_count == 0 {
            red("✘")
        } else if failed == 0 {
            green("✔")
        } else {
            yellow("⚠")
        };
        eprintln!(
            "{} {}: {}/{} succeeded",
            mark,
            stage,
            bold(&success_count.to_string()),
            total_items
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full pipeline over three annual reports (scanned, Vietnamese)
  finstat PVIAM 2021,2022,2023

  # Digital PDFs, statements on pages 5-12 only
  finstat --mode direct --pages 5-12 PVIAM 2021,2022,2023

  # Re-run only the standardisation stage
  finstat --stage standardize PVIAM 2021,2022,2023

  # English filings, machine-readable report
  finstat --lang eng --json ACME 2022,2023 > report.json

COMPANY FOLDER LAYOUT:
  <company>/financial_statements/{period}.pdf          input
  <company>/text_statements/{period}_ocr.txt           stage 1
  <company>/json_statements/{period}_..._raw.json      stage 2 (raw LLM reply)
  <company>/excel_statements/{period}_...csv           stage 2
  <company>/period_statements/*.csv                    stage 3
  <company>/final_statements/*.csv                     stage 4
  <company>/final_statements_standardized/*.csv        stage 5

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Provider name (same as --provider)
  EDGEQUAKE_MODEL         Model ID (same as --model)
  RUST_LOG                Override log filter

REQUIREMENTS:
  OCR mode needs `tesseract` with the language pack (default: vie).
  Both modes need the pdfium shared library (--pdfium-lib-dir or system path).
"#;

/// Extract, merge, reshape and standardise financial statements from PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "finstat",
    version,
    about = "Turn PDF financial statements into standardised multi-period tables",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Company folder holding financial_statements/{period}.pdf.
    company: PathBuf,

    /// Comma-separated periods, in the column order wanted (e.g. 2021,2022).
    #[arg(value_delimiter = ',', required = true)]
    periods: Vec<String>,

    /// Text extraction: ocr (scanned PDFs) or direct (embedded text layer).
    #[arg(long, env = "FINSTAT_MODE", value_enum, default_value = "ocr")]
    mode: ModeArg,

    /// Inclusive page window sent to the LLM: 5-12, 5-, or -12.
    #[arg(long, env = "FINSTAT_PAGES")]
    pages: Option<PageRange>,

    /// Run a single stage instead of the whole pipeline.
    #[arg(long, value_enum)]
    stage: Option<StageArg>,

    /// LLM model ID (e.g. gemini-2.5-flash, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// OCR rendering DPI (72–1200).
    #[arg(long, env = "FINSTAT_DPI", default_value_t = 650,
          value_parser = clap::value_parser!(u32).range(72..=1200))]
    dpi: u32,

    /// Tesseract language pack(s), e.g. vie, eng, vie+eng.
    #[arg(long, env = "FINSTAT_LANG", default_value = "vie")]
    lang: String,

    /// Tesseract page segmentation mode.
    #[arg(long, env = "FINSTAT_PSM", default_value_t = 3)]
    psm: u8,

    /// Tesseract executable.
    #[arg(long, env = "FINSTAT_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_DIR")]
    pdfium_lib_dir: Option<PathBuf>,

    /// How rows that standardise to the same name are combined.
    #[arg(long, env = "FINSTAT_AGGREGATION", value_enum, default_value = "sum")]
    aggregation: AggregationArg,

    /// Max LLM output tokens per call.
    #[arg(long, env = "FINSTAT_MAX_TOKENS", default_value_t = 16384)]
    max_tokens: usize,

    /// Retries per LLM call (0 = skip the item on first failure).
    #[arg(long, env = "FINSTAT_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Text file with a custom extraction system prompt.
    #[arg(long, env = "FINSTAT_EXTRACTION_PROMPT")]
    extraction_prompt: Option<PathBuf>,

    /// Text file with a custom standardisation system prompt.
    #[arg(long, env = "FINSTAT_STANDARDIZATION_PROMPT")]
    standardization_prompt: Option<PathBuf>,

    /// Print the stage reports as JSON on stdout.
    #[arg(long, env = "FINSTAT_JSON")]
    json: bool,

    /// Disable progress bars.
    #[arg(long, env = "FINSTAT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FINSTAT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FINSTAT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Ocr,
    Direct,
}

impl From<ModeArg> for ExtractionMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Ocr => ExtractionMode::Ocr,
            ModeArg::Direct => ExtractionMode::Direct,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StageArg {
    Text,
    Extract,
    Merge,
    Reformat,
    Standardize,
}

impl From<StageArg> for Stage {
    fn from(v: StageArg) -> Self {
        match v {
            StageArg::Text => Stage::TextExtraction,
            StageArg::Extract => Stage::StructuredExtraction,
            StageArg::Merge => Stage::Merge,
            StageArg::Reformat => Stage::Reformat,
            StageArg::Standardize => Stage::Standardize,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum AggregationArg {
    Sum,
    First,
    Strict,
}

impl From<AggregationArg> for AggregationPolicy {
    fn from(v: AggregationArg) -> Self {
        match v {
            AggregationArg::Sum => AggregationPolicy::Sum,
            AggregationArg::First => AggregationPolicy::First,
            AggregationArg::Strict => AggregationPolicy::Strict,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs would interleave with the progress bars; the bars carry the
    // per-item feedback.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = Arc::new(CliProgressCallback::new());
        Some(cb as Arc<dyn StageProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    let report = match cli.stage {
        Some(stage) => {
            let stage: Stage = stage.into();
            let r = run_one(stage, &config)
                .await
                .with_context(|| format!("{stage} failed"))?;
            PipelineReport { stages: vec![r] }
        }
        None => run(&config).await.context("Pipeline failed")?,
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        for stage in &report.stages {
            print_summary(stage, show_progress);
        }
    }

    Ok(())
}

/// Warnings and outputs of one stage, on stderr.
fn print_summary(report: &StageReport, progress_shown: bool) {
    if !progress_shown {
        eprintln!(
            "{}: {}/{} succeeded",
            bold(&report.stage.to_string()),
            report.success_count(),
            report.attempted
        );
        for skipped in &report.skipped {
            eprintln!("  {} {}", red("✗"), skipped);
        }
    }
    for warning in &report.warnings {
        eprintln!("  {} {}", yellow("⚠"), warning);
    }
    for path in &report.outputs {
        eprintln!("  {} {}", dim("→"), path.display());
    }
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder(&cli.company, cli.periods.iter().cloned())
        .extraction_mode(cli.mode.into())
        .dpi(cli.dpi)
        .ocr_language(&cli.lang)
        .page_segmentation_mode(cli.psm)
        .tesseract_cmd(&cli.tesseract)
        .aggregation(cli.aggregation.into())
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries);

    if let Some(range) = cli.pages {
        builder = builder.page_range(range);
    }
    if let Some(ref dir) = cli.pdfium_lib_dir {
        builder = builder.pdfium_library_dir(dir);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = cli.extraction_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read extraction prompt from {:?}", path))?;
        builder = builder.extraction_prompt(prompt);
    }
    if let Some(ref path) = cli.standardization_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read standardisation prompt from {:?}", path))?;
        builder = builder.standardization_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
