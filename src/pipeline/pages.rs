//! Page markers in the per-period text artifact.
//!
//! Stage 1 writes every page as
//!
//! ```text
//! --- PAGE 7 ---
//! <page text>
//!
//! ```
//!
//! and stage 2 uses the same markers to cut the text down to a page window
//! before it reaches the LLM.

use crate::config::PageRange;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_PAGE_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^--- PAGE (\d+) ---").unwrap());

/// Text of one PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-indexed page number.
    pub page: usize,
    pub text: String,
}

/// Render one page with its header line and two trailing newlines.
pub fn format_page(page: &PageText) -> String {
    format!("--- PAGE {} ---\n{}\n\n", page.page, page.text)
}

/// Concatenate pages into the text artifact written by stage 1.
pub fn assemble(pages: &[PageText]) -> String {
    pages.iter().map(format_page).collect()
}

/// Page number of a header line, if `line` is one.
pub fn page_header(line: &str) -> Option<usize> {
    RE_PAGE_HEADER
        .captures(line)
        .and_then(|c| c[1].parse().ok())
}

/// Keep only the lines whose enclosing page is inside `range`.
///
/// Header lines of kept pages are kept too, and order is preserved. Lines
/// before the first header belong to no page and are dropped. With no range,
/// or an unbounded one, the text is returned untouched.
pub fn filter_pages(text: &str, range: Option<&PageRange>) -> String {
    let Some(range) = range.filter(|r| !r.is_unbounded()) else {
        return text.to_string();
    };

    let mut kept: Vec<&str> = Vec::new();
    let mut in_range = false;

    for line in text.split('\n') {
        if let Some(page) = page_header(line) {
            in_range = range.contains(page);
            if in_range {
                kept.push(line);
            }
        } else if in_range {
            kept.push(line);
        }
    }

    kept.join("\n")
}
