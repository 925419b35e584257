//! Configuration types for the financial-statement pipeline.
//!
//! Every knob of every stage lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`] and passed into each stage entry point. No stage
//! reads environment variables or hard-coded directories; the CLI maps flags
//! and env vars into this struct before anything runs.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for one pipeline run over a company folder.
///
/// # Example
/// ```rust
/// use edgequake_finstat::{ExtractionMode, PageRange, PipelineConfig};
///
/// let config = PipelineConfig::builder("PVIAM", ["2021", "2022"])
///     .extraction_mode(ExtractionMode::Direct)
///     .page_range(PageRange::new(Some(3), Some(9)))
///     .build()
///     .unwrap();
/// assert_eq!(config.periods, vec!["2021", "2022"]);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Company folder. Every stage reads and writes below it.
    pub company_dir: PathBuf,

    /// Period labels in the order the caller wants them as table columns.
    pub periods: Vec<String>,

    /// How stage 1 gets text out of each PDF. Default: [`ExtractionMode::Ocr`].
    pub extraction_mode: ExtractionMode,

    /// Inclusive page window handed to the extraction LLM. Default: all pages.
    pub page_range: Option<PageRange>,

    /// OCR rendering DPI. Range: 72–1200. Default: 650.
    ///
    /// Scanned filings often use 7–8 pt figures; tesseract needs glyphs around
    /// 30 px tall to tell `8` from `6` reliably.
    pub dpi: u32,

    /// Tesseract language pack, e.g. `"vie"`, `"eng"`, `"vie+eng"`. Default: `"vie"`.
    pub ocr_language: String,

    /// Tesseract page-segmentation mode (`--psm`). Default: 3 (fully automatic).
    pub page_segmentation_mode: u8,

    /// Tesseract executable. Default: `"tesseract"` (looked up on `PATH`).
    pub tesseract_cmd: PathBuf,

    /// Directory holding the pdfium shared library. If None, the system library is used.
    pub pdfium_library_dir: Option<PathBuf>,

    /// LLM model identifier, e.g. "gemini-2.5-flash", "gpt-4.1-mini".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for statement extraction. Default: 0.05.
    pub extraction_temperature: f32,

    /// Sampling temperature for item-name standardisation. Default: 0.5.
    pub standardization_temperature: f32,

    /// Maximum tokens the LLM may generate per call. Default: 16384.
    ///
    /// A full set of three statements runs to several hundred JSON objects.
    pub max_tokens: usize,

    /// Retry attempts on a failed LLM call. Default: 0.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom extraction system prompt. If None, uses the built-in one.
    pub extraction_prompt: Option<String>,

    /// Custom standardisation system prompt. If None, uses the built-in one.
    pub standardization_prompt: Option<String>,

    /// What to do with rows that collapse onto the same standardised name.
    pub aggregation: AggregationPolicy,

    /// Per-stage/per-item progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            company_dir: PathBuf::from("."),
            periods: Vec::new(),
            extraction_mode: ExtractionMode::default(),
            page_range: None,
            dpi: 650,
            ocr_language: "vie".to_string(),
            page_segmentation_mode: 3,
            tesseract_cmd: PathBuf::from("tesseract"),
            pdfium_library_dir: None,
            model: None,
            provider_name: None,
            provider: None,
            extraction_temperature: 0.05,
            standardization_temperature: 0.5,
            max_tokens: 16384,
            max_retries: 0,
            retry_backoff_ms: 500,
            extraction_prompt: None,
            standardization_prompt: None,
            aggregation: AggregationPolicy::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("company_dir", &self.company_dir)
            .field("periods", &self.periods)
            .field("extraction_mode", &self.extraction_mode)
            .field("page_range", &self.page_range)
            .field("dpi", &self.dpi)
            .field("ocr_language", &self.ocr_language)
            .field("page_segmentation_mode", &self.page_segmentation_mode)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("aggregation", &self.aggregation)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for a company folder and its ordered periods.
    pub fn builder<I, S>(company_dir: impl Into<PathBuf>, periods: I) -> PipelineConfigBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PipelineConfigBuilder {
            config: Self {
                company_dir: company_dir.into(),
                periods: periods.into_iter().map(Into::into).collect(),
                ..Self::default()
            },
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn extraction_mode(mut self, mode: ExtractionMode) -> Self {
        self.config.extraction_mode = mode;
        self
    }

    pub fn page_range(mut self, range: PageRange) -> Self {
        self.config.page_range = Some(range);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 1200);
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn page_segmentation_mode(mut self, psm: u8) -> Self {
        self.config.page_segmentation_mode = psm;
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<PathBuf>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn pdfium_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_dir = Some(dir.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn extraction_temperature(mut self, t: f32) -> Self {
        self.config.extraction_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn standardization_temperature(mut self, t: f32) -> Self {
        self.config.standardization_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn standardization_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.standardization_prompt = Some(prompt.into());
        self
    }

    pub fn aggregation(mut self, policy: AggregationPolicy) -> Self {
        self.config.aggregation = policy;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<PipelineConfig, PipelineError> {
        self.config.periods = self
            .config
            .periods
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let c = &self.config;
        if c.periods.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "At least one period is required".into(),
            ));
        }
        if c.company_dir.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Company folder must not be empty".into(),
            ));
        }
        if let Some(p) = c.periods.iter().find(|p| p.contains(['/', '\\'])) {
            return Err(PipelineError::InvalidConfig(format!(
                "Period '{p}' must not contain path separators"
            )));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.page_segmentation_mode > 13 {
            return Err(PipelineError::InvalidConfig(format!(
                "Page segmentation mode must be 0–13, got {}",
                c.page_segmentation_mode
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How stage 1 reads text out of a PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtractionMode {
    /// Rasterise each page and run tesseract. Needed for scanned filings. (default)
    #[default]
    Ocr,
    /// Read the embedded text layer as-is.
    Direct,
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMode::Ocr => f.write_str("OCR"),
            ExtractionMode::Direct => f.write_str("DIRECT"),
        }
    }
}

/// Policy for rows that the standardisation mapping collapses onto one name.
///
/// Summing is what analysts usually want (two OCR variants of "Cash" are the
/// same line), but sub-items that share a display name under different
/// parents get added together silently. `First` and `Strict` exist for those
/// statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AggregationPolicy {
    /// Elementwise sum of the present values. (default)
    #[default]
    Sum,
    /// Keep the first present value in input row order.
    First,
    /// Refuse to merge: the file is skipped with an item error.
    Strict,
}

/// Inclusive page window over the `--- PAGE n ---` markers.
///
/// Either bound may be open: `PageRange::new(Some(50), None)` keeps page 50
/// onwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageRange {
    pub start: Option<usize>,
    pub end: Option<usize>,
}

impl PageRange {
    pub fn new(start: Option<usize>, end: Option<usize>) -> Self {
        Self { start, end }
    }

    /// True when no bound is set and text should pass through untouched.
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Whether 1-indexed page `page` falls inside the window.
    pub fn contains(&self, page: usize) -> bool {
        self.start.is_none_or(|s| page >= s) && self.end.is_none_or(|e| page <= e)
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |b: Option<usize>| b.map(|n| n.to_string()).unwrap_or_default();
        write!(f, "{}-{}", show(self.start), show(self.end))
    }
}

impl FromStr for PageRange {
    type Err = PipelineError;

    /// Parse `"50-90"`, `"50-"` or `"-90"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| PipelineError::InvalidConfig(format!("Invalid page range '{s}': {why}"));

        let (start, end) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| invalid("expected 'start-end'"))?;

        let bound = |b: &str| -> Result<Option<usize>, PipelineError> {
            let b = b.trim();
            if b.is_empty() {
                return Ok(None);
            }
            let n: usize = b.parse().map_err(|_| invalid("not a page number"))?;
            if n < 1 {
                return Err(invalid("pages are 1-indexed"));
            }
            Ok(Some(n))
        };

        let range = PageRange::new(bound(start)?, bound(end)?);
        if let (Some(s), Some(e)) = (range.start, range.end) {
            if s > e {
                return Err(invalid("start must be <= end"));
            }
        }
        Ok(range)
    }
}
