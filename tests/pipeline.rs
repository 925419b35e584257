//! End-to-end tests for the five-stage pipeline.
//!
//! PDFs are stand-in files with a `%PDF` header; page text comes from a fake
//! [`PageTextSource`] and LLM replies from a scripted [`CompletionClient`],
//! so these run without pdfium, tesseract or network access.

use edgequake_finstat::pipeline::layout::CompanyLayout;
use edgequake_finstat::{
    run_pipeline, run_stage, AggregationPolicy, Completion, CompletionClient, CompletionRequest,
    ItemError, PageRange, PageText, PageTextSource, PipelineConfig, PipelineError, Stage,
    StageProgressCallback, StageWarning, WideTable,
};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fakes ────────────────────────────────────────────────────────────────

/// One page per PDF: "Cash = <value>", value keyed by period file stem.
#[derive(Clone)]
struct OnePageStatements {
    values: Vec<(&'static str, &'static str)>,
}

impl PageTextSource for OnePageStatements {
    fn read_pages(&self, period: &str, _pdf_path: &Path) -> Result<Vec<PageText>, ItemError> {
        let value = self
            .values
            .iter()
            .find(|(p, _)| *p == period)
            .map(|(_, v)| *v)
            .ok_or_else(|| ItemError::ExtractionFailed {
                label: period.to_string(),
                detail: "no canned text".into(),
            })?;
        Ok(vec![
            PageText {
                page: 1,
                text: "BẢNG CÂN ĐỐI KẾ TOÁN".into(),
            },
            PageText {
                page: 2,
                text: format!("Balance sheet {period}\nCash = {value}"),
            },
        ])
    }
}

/// Answers extraction calls by reading "Cash = N" back out of the prompt
/// and standardisation calls with a fixed mapping.
struct ScriptedLlm {
    mapping: String,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    fn new(mapping: &str) -> Self {
        Self {
            mapping: mapping.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl CompletionClient for ScriptedLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ItemError> {
        self.calls.lock().unwrap().push(request.clone());

        let content = if request.user.starts_with("Standardize") {
            self.mapping.clone()
        } else {
            let year = request
                .user
                .lines()
                .find_map(|l| l.strip_prefix("Balance sheet "))
                .unwrap_or("unknown")
                .to_string();
            let value = request
                .user
                .lines()
                .find_map(|l| l.strip_prefix("Cash = "))
                .unwrap_or("")
                .to_string();
            format!(
                "```json\n[{{\"item_number\": \"110\", \"statement_type\": \"BALANCE SHEET\", \
                 \"item\": \"Cash\", \"year\": \"{year}\", \"value\": \"{value}\"}}]\n```"
            )
        };

        Ok(Completion {
            content,
            prompt_tokens: 100,
            completion_tokens: 20,
            retries: 0,
        })
    }
}

fn company(periods: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let pdfs = CompanyLayout::new(dir.path()).pdf_dir();
    std::fs::create_dir_all(&pdfs).unwrap();
    for p in periods {
        std::fs::write(pdfs.join(format!("{p}.pdf")), b"%PDF-1.4\n%stub\n").unwrap();
    }
    dir
}

/// `RUST_LOG=debug cargo test -- --nocapture` shows the stage logs.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const CASH_MAPPING: &str =
    r#"[{"standardized_item": "Cash", "original_items": ["Cash"]}]"#;

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_periods_end_to_end() {
    init_logging();
    let dir = company(&["2021", "2022"]);
    let config = PipelineConfig::builder(dir.path(), ["2021", "2022"])
        .build()
        .unwrap();
    let source = OnePageStatements {
        values: vec![("2021", "100"), ("2022", "150")],
    };
    let llm = ScriptedLlm::new(CASH_MAPPING);

    let report = run_pipeline(source, &llm, &config).await.unwrap();
    assert_eq!(report.stages.len(), 5);
    assert_eq!(report.warnings().count(), 0);

    let layout = CompanyLayout::new(dir.path());
    let table =
        WideTable::read_csv(&layout.standardized_dir().join("Balance Sheet.csv")).unwrap();
    assert_eq!(table.columns, vec!["2021", "2022"]);
    assert_eq!(table.items(), vec!["Cash"]);
    assert_eq!(table.get("Cash", "2021"), Some(Decimal::from(100)));
    assert_eq!(table.get("Cash", "2022"), Some(Decimal::from(150)));

    // two extraction calls, one standardisation call
    let calls = llm.calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2].temperature, 0.5);
    assert!(calls[2].user.contains("\"Cash\""));
}

#[tokio::test]
async fn missing_pdf_is_skipped_and_pipeline_completes() {
    init_logging();
    let dir = company(&["2022"]);
    let config = PipelineConfig::builder(dir.path(), ["2021", "2022"])
        .build()
        .unwrap();
    let source = OnePageStatements {
        values: vec![("2021", "100"), ("2022", "150")],
    };
    let llm = ScriptedLlm::new(CASH_MAPPING);

    let report = run_pipeline(source, &llm, &config).await.unwrap();

    let text = report.stage(Stage::TextExtraction).unwrap();
    assert_eq!(text.completed, vec!["2022"]);
    assert!(matches!(text.skipped[0], ItemError::MissingInput { .. }));
    assert!(!CompanyLayout::new(dir.path()).text("2021").exists());

    let layout = CompanyLayout::new(dir.path());
    let table =
        WideTable::read_csv(&layout.standardized_dir().join("Balance Sheet.csv")).unwrap();
    assert_eq!(table.columns, vec!["2022"]);
    assert_eq!(table.get("Cash", "2022"), Some(Decimal::from(150)));
}

#[tokio::test]
async fn no_pdfs_halts_at_stage_one() {
    let dir = company(&[]);
    let config = PipelineConfig::builder(dir.path(), ["2021"]).build().unwrap();
    let llm = ScriptedLlm::new(CASH_MAPPING);

    let err = run_pipeline(OnePageStatements { values: vec![] }, &llm, &config)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::StageFailed {
            stage: Stage::TextExtraction,
            ..
        }
    ));
    assert!(llm.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn page_window_outside_text_skips_every_period() {
    let dir = company(&["2021"]);
    let config = PipelineConfig::builder(dir.path(), ["2021"])
        .page_range(PageRange::new(Some(40), Some(45)))
        .build()
        .unwrap();
    let source = OnePageStatements {
        values: vec![("2021", "100")],
    };
    let llm = ScriptedLlm::new(CASH_MAPPING);

    match run_pipeline(source, &llm, &config).await {
        Err(PipelineError::StageFailed { stage, first_error, .. }) => {
            assert_eq!(stage, Stage::StructuredExtraction);
            assert!(first_error.contains("no content"));
        }
        other => panic!("expected StageFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn standardisation_sums_variants_and_warns_on_uncovered() {
    let dir = tempfile::tempdir().unwrap();
    let layout = CompanyLayout::new(dir.path());
    let mut wide = WideTable::new(vec!["2021".into(), "2022".into()]);
    wide.push_row("Tiền", vec![Some(Decimal::from(10)), None]);
    wide.push_row("Cash", vec![Some(Decimal::from(100)), Some(Decimal::from(150))]);
    wide.push_row("Inventory", vec![Some(Decimal::from(5)), Some(Decimal::from(6))]);
    wide.push_row("Goodwill", vec![None, Some(Decimal::from(1))]);
    wide.write_csv(&layout.wide_dir().join("Balance Sheet.csv")).unwrap();

    let config = PipelineConfig::builder(dir.path(), ["2021", "2022"])
        .build()
        .unwrap();
    let llm = ScriptedLlm::new(
        r#"{"mapping": [
            {"standardized_item": "Inventory", "original_items": ["Inventory"]},
            {"standardized_item": "Cash And Cash Equivalents", "original_items": ["Cash", "Tiền"]}
        ]}"#,
    );

    let report = run_stage(
        Stage::Standardize,
        OnePageStatements { values: vec![] },
        &llm,
        &config,
    )
    .await
    .unwrap();

    assert_eq!(report.completed, vec!["Balance Sheet.csv"]);
    assert_eq!(
        report.warnings,
        vec![StageWarning::UncoveredItems {
            label: "Balance Sheet.csv".into(),
            items: vec!["Goodwill".into()],
        }]
    );

    let out = WideTable::read_csv(&layout.standardized_dir().join("Balance Sheet.csv")).unwrap();
    assert_eq!(
        out.items(),
        vec!["Inventory", "Cash And Cash Equivalents", "Goodwill"]
    );
    assert_eq!(out.get("Cash And Cash Equivalents", "2021"), Some(Decimal::from(110)));
    assert_eq!(out.get("Cash And Cash Equivalents", "2022"), Some(Decimal::from(150)));
}

#[tokio::test]
async fn strict_aggregation_skips_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let layout = CompanyLayout::new(dir.path());
    let mut wide = WideTable::new(vec!["2021".into()]);
    wide.push_row("Cash", vec![Some(Decimal::from(100))]);
    wide.push_row("Cash ", vec![Some(Decimal::from(1))]);
    wide.write_csv(&layout.wide_dir().join("Balance Sheet.csv")).unwrap();

    let config = PipelineConfig::builder(dir.path(), ["2021"])
        .aggregation(AggregationPolicy::Strict)
        .build()
        .unwrap();
    let llm = ScriptedLlm::new(
        r#"[{"standardized_item": "Cash", "original_items": ["Cash", "Cash "]}]"#,
    );

    let err = run_stage(Stage::Standardize, OnePageStatements { values: vec![] }, &llm, &config)
        .await
        .unwrap_err();
    match err {
        PipelineError::StageFailed { first_error, .. } => assert!(first_error.contains("Cash")),
        other => panic!("expected StageFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn standardize_with_empty_input_dir_is_fatal_before_any_call() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(CompanyLayout::new(dir.path()).wide_dir()).unwrap();
    let config = PipelineConfig::builder(dir.path(), ["2021"]).build().unwrap();
    let llm = ScriptedLlm::new(CASH_MAPPING);

    let err = run_stage(Stage::Standardize, OnePageStatements { values: vec![] }, &llm, &config)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyInputDir { .. }));
    assert!(llm.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reformat_without_combined_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder(dir.path(), ["2021"]).build().unwrap();
    let llm = ScriptedLlm::new(CASH_MAPPING);

    let err = run_stage(Stage::Reformat, OnePageStatements { values: vec![] }, &llm, &config)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::MissingInput {
            stage: Stage::Reformat,
            ..
        }
    ));
}

struct Counting {
    starts: AtomicUsize,
    completes: AtomicUsize,
}

impl StageProgressCallback for Counting {
    fn on_stage_start(&self, _stage: Stage, _total_items: usize) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_item_complete(&self, _stage: Stage, _label: &str) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_callback_sees_every_stage() {
    let dir = company(&["2021"]);
    let counter = Arc::new(Counting {
        starts: AtomicUsize::new(0),
        completes: AtomicUsize::new(0),
    });
    let config = PipelineConfig::builder(dir.path(), ["2021"])
        .progress_callback(counter.clone())
        .build()
        .unwrap();
    let source = OnePageStatements {
        values: vec![("2021", "100")],
    };

    run_pipeline(source, &ScriptedLlm::new(CASH_MAPPING), &config)
        .await
        .unwrap();

    assert_eq!(counter.starts.load(Ordering::SeqCst), 5);
    // text, extraction, merge (one period), reformat + standardize (one file each)
    assert_eq!(counter.completes.load(Ordering::SeqCst), 5);
}
