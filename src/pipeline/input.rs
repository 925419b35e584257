//! Input checks for period PDFs.
//!
//! pdfium reports a missing file, a permission problem and an HTML error page
//! saved as `.pdf` all as the same opaque load failure. Checking existence,
//! readability and the `%PDF` magic up front gives each period a precise skip
//! reason instead.

use crate::error::ItemError;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Validate that `path` exists, is readable and starts with `%PDF`.
pub fn check_pdf(period: &str, path: &Path) -> Result<(), ItemError> {
    if !path.exists() {
        return Err(ItemError::MissingInput {
            label: period.to_string(),
            path: path.to_path_buf(),
        });
    }

    let mut f = std::fs::File::open(path).map_err(|e| ItemError::ReadFailed {
        label: period.to_string(),
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let mut magic = [0u8; 4];
    if f.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
        return Err(ItemError::InvalidPdf {
            label: period.to_string(),
            detail: format!("first bytes {magic:?} are not %PDF"),
        });
    }

    debug!("Resolved PDF for {}: {}", period, path.display());
    Ok(())
}
