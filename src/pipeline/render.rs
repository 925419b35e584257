//! PDF page text via pdfium: the embedded text layer, or a raster run
//! through tesseract.
//!
//! ## Why shell out to tesseract?
//!
//! Tesseract's language packs (Vietnamese in particular) are what scanned
//! filings need, and the `tesseract` binary is the one interface every
//! platform packages. Each page is rendered by pdfium at the configured DPI,
//! written as a PNG into a temp dir that is removed when the period is done,
//! and read back from tesseract's stdout.
//!
//! Everything here is blocking; [`crate::pipeline::extract_text`] runs it
//! inside `spawn_blocking`.

use crate::config::{ExtractionMode, PipelineConfig};
use crate::error::ItemError;
use crate::pipeline::extract_text::PageTextSource;
use crate::pipeline::pages::PageText;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// [`PageTextSource`] backed by pdfium (and tesseract in OCR mode).
#[derive(Debug, Clone)]
pub struct PdfiumTextSource {
    mode: ExtractionMode,
    dpi: u32,
    language: String,
    psm: u8,
    tesseract_cmd: PathBuf,
    library_dir: Option<PathBuf>,
}

impl PdfiumTextSource {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            mode: config.extraction_mode,
            dpi: config.dpi,
            language: config.ocr_language.clone(),
            psm: config.page_segmentation_mode,
            tesseract_cmd: config.tesseract_cmd.clone(),
            library_dir: config.pdfium_library_dir.clone(),
        }
    }

    fn bind(&self) -> Result<Pdfium, PdfiumError> {
        let bindings = match self.library_dir {
            Some(ref dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))?
            }
            None => Pdfium::bind_to_system_library()?,
        };
        Ok(Pdfium::new(bindings))
    }

    /// Rasterise one page and OCR it.
    fn ocr_page(&self, page: &PdfPage, page_num: usize, workdir: &Path) -> Result<String, String> {
        let render_config = PdfRenderConfig::new().scale_page_by_factor(self.dpi as f32 / 72.0);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| format!("rasterisation failed on page {page_num}: {e:?}"))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px at {} DPI",
            page_num,
            image.width(),
            image.height(),
            self.dpi
        );

        let png = workdir.join(format!("page-{page_num}.png"));
        image
            .save_with_format(&png, ImageFormat::Png)
            .map_err(|e| format!("could not write raster for page {page_num}: {e}"))?;

        run_tesseract(&self.tesseract_cmd, &png, &self.language, self.psm)
            .map_err(|e| format!("page {page_num}: {e}"))
    }
}

impl PageTextSource for PdfiumTextSource {
    fn read_pages(&self, period: &str, pdf_path: &Path) -> Result<Vec<PageText>, ItemError> {
        let fail = |detail: String| ItemError::ExtractionFailed {
            label: period.to_string(),
            detail,
        };

        let pdfium = self
            .bind()
            .map_err(|e| fail(format!("failed to bind to pdfium library: {e:?}")))?;
        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| fail(format!("failed to open PDF: {e:?}")))?;

        let pages = document.pages();
        let total = pages.len() as usize;
        if total == 0 {
            return Err(fail("PDF has no pages".to_string()));
        }
        info!("{}: {} pages, {} extraction", period, total, self.mode);

        let workdir = match self.mode {
            ExtractionMode::Ocr => Some(
                tempfile::tempdir().map_err(|e| fail(format!("temp dir: {e}")))?,
            ),
            ExtractionMode::Direct => None,
        };

        let mut out = Vec::with_capacity(total);
        for (idx, page) in pages.iter().enumerate() {
            let page_num = idx + 1;
            let text = match workdir {
                Some(ref dir) => self.ocr_page(&page, page_num, dir.path()).map_err(fail)?,
                None => page
                    .text()
                    .map_err(|e| fail(format!("no text layer on page {page_num}: {e:?}")))?
                    .all(),
            };
            debug!("{}: page {} → {} chars", period, page_num, text.len());
            out.push(PageText {
                page: page_num,
                text,
            });
        }

        Ok(out)
    }
}

/// `tesseract <image> stdout -l <lang> --psm <psm>`
pub fn run_tesseract(cmd: &Path, image: &Path, language: &str, psm: u8) -> Result<String, String> {
    let output = Command::new(cmd)
        .arg(image)
        .arg("stdout")
        .arg("-l")
        .arg(language)
        .arg("--psm")
        .arg(psm.to_string())
        .output()
        .map_err(|e| format!("failed to run '{}': {}", cmd.display(), e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "tesseract exited with {}: {}",
            output.status,
            stderr.trim()
        ));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    // tesseract ends every page with a form feed
    Ok(text.trim_end_matches('\u{c}').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_follows_config() {
        let config = PipelineConfig::builder("ACME", ["2021"])
            .extraction_mode(ExtractionMode::Direct)
            .ocr_language("eng")
            .dpi(300)
            .build()
            .unwrap();
        let source = PdfiumTextSource::from_config(&config);
        assert_eq!(source.mode, ExtractionMode::Direct);
        assert_eq!(source.language, "eng");
        assert_eq!(source.dpi, 300);
        assert_eq!(source.psm, 3);
    }

    #[test]
    fn missing_tesseract_binary_is_an_error() {
        let err = run_tesseract(
            Path::new("/definitely/not/tesseract"),
            Path::new("page.png"),
            "eng",
            3,
        )
        .unwrap_err();
        assert!(err.contains("failed to run"), "got: {err}");
    }
}
