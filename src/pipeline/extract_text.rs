//! Stage 1: one PDF per period → one page-tagged text file per period.
//!
//! Reads `<company>/financial_statements/<period>.pdf` and writes
//! `<company>/text_statements/<period>_ocr.txt`. A period whose PDF is missing,
//! unreadable, or fails extraction is skipped; the stage fails only when no
//! period produced text.

use crate::config::PipelineConfig;
use crate::error::{ItemError, PipelineError};
use crate::output::StageReport;
use crate::pipeline::input::check_pdf;
use crate::pipeline::layout::CompanyLayout;
use crate::pipeline::pages::{assemble, PageText};
use crate::pipeline::{Stage, StageTracker};
use std::path::Path;
use tracing::debug;

/// Where page text comes from.
///
/// [`crate::pipeline::render::PdfiumTextSource`] is the production source;
/// tests substitute canned pages.
pub trait PageTextSource: Send + Sync {
    /// Text of every page of `pdf_path`, in page order. Blocking.
    fn read_pages(&self, period: &str, pdf_path: &Path) -> Result<Vec<PageText>, ItemError>;
}

/// Run stage 1 over every configured period. Blocking.
pub fn extract_text<S>(source: &S, config: &PipelineConfig) -> Result<StageReport, PipelineError>
where
    S: PageTextSource + ?Sized,
{
    let layout = CompanyLayout::new(&config.company_dir);
    let text_dir = layout.text_dir();
    std::fs::create_dir_all(&text_dir).map_err(|e| PipelineError::OutputWriteFailed {
        path: text_dir.clone(),
        source: e,
    })?;

    let mut tracker = StageTracker::start(
        Stage::TextExtraction,
        config.periods.len(),
        config.progress_callback.clone(),
    );
    tracker.note(format!(
        "--- Starting text extraction (mode: {}) ---",
        config.extraction_mode
    ));

    for period in &config.periods {
        let pdf_path = layout.pdf(period);
        tracker.note(format!("Processing period: {period}"));

        match extract_period(source, period, &pdf_path, &layout) {
            Ok((output, pages)) => {
                tracker.note(format!(
                    "Saved {} pages of text to: {}",
                    pages,
                    output.display()
                ));
                tracker.complete(period, output);
            }
            Err(e) => tracker.skip(e),
        }
    }

    tracker.finish()
}

fn extract_period<S>(
    source: &S,
    period: &str,
    pdf_path: &Path,
    layout: &CompanyLayout,
) -> Result<(std::path::PathBuf, usize), ItemError>
where
    S: PageTextSource + ?Sized,
{
    check_pdf(period, pdf_path)?;

    let pages = source.read_pages(period, pdf_path)?;
    let text = assemble(&pages);
    debug!("{}: {} pages, {} chars of text", period, pages.len(), text.len());

    let output = layout.text(period);
    std::fs::write(&output, text).map_err(|e| ItemError::WriteFailed {
        label: period.to_string(),
        path: output.clone(),
        detail: e.to_string(),
    })?;

    Ok((output, pages.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::pages::page_header;

    struct CannedPages;

    impl PageTextSource for CannedPages {
        fn read_pages(&self, period: &str, _pdf_path: &Path) -> Result<Vec<PageText>, ItemError> {
            if period == "broken" {
                return Err(ItemError::ExtractionFailed {
                    label: period.into(),
                    detail: "tesseract crashed".into(),
                });
            }
            Ok(vec![
                PageText {
                    page: 1,
                    text: format!("Cover {period}"),
                },
                PageText {
                    page: 2,
                    text: "Cash 100".into(),
                },
            ])
        }
    }

    fn company_with_pdfs(periods: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let pdfs = dir.path().join("financial_statements");
        std::fs::create_dir_all(&pdfs).unwrap();
        for p in periods {
            std::fs::write(pdfs.join(format!("{p}.pdf")), b"%PDF-1.4\n").unwrap();
        }
        dir
    }

    #[test]
    fn writes_page_tagged_text_per_period() {
        let dir = company_with_pdfs(&["2021", "2022"]);
        let config = PipelineConfig::builder(dir.path(), ["2021", "2022"])
            .build()
            .unwrap();

        let report = extract_text(&CannedPages, &config).unwrap();
        assert_eq!(report.completed, vec!["2021", "2022"]);

        let text = std::fs::read_to_string(dir.path().join("text_statements/2021_ocr.txt")).unwrap();
        assert!(text.starts_with("--- PAGE 1 ---\nCover 2021\n\n"));
        let headers: Vec<usize> = text.lines().filter_map(page_header).collect();
        assert_eq!(headers, vec![1, 2]);
    }

    #[test]
    fn missing_and_failing_periods_are_skipped() {
        let dir = company_with_pdfs(&["2021", "broken"]);
        let config = PipelineConfig::builder(dir.path(), ["2020", "2021", "broken"])
            .build()
            .unwrap();

        let report = extract_text(&CannedPages, &config).unwrap();
        assert_eq!(report.completed, vec!["2021"]);
        assert_eq!(report.skipped.len(), 2);
        assert!(matches!(report.skipped[0], ItemError::MissingInput { .. }));
        assert!(matches!(report.skipped[1], ItemError::ExtractionFailed { .. }));
        assert!(!dir.path().join("text_statements/2020_ocr.txt").exists());
    }

    #[test]
    fn no_period_producing_text_is_fatal() {
        let dir = company_with_pdfs(&[]);
        let config = PipelineConfig::builder(dir.path(), ["2021"]).build().unwrap();
        assert!(matches!(
            extract_text(&CannedPages, &config),
            Err(PipelineError::StageFailed {
                stage: Stage::TextExtraction,
                ..
            })
        ));
    }
}
