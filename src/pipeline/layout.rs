//! On-disk layout of a company folder.
//!
//! ```text
//! <company>/
//!   financial_statements/{period}.pdf
//!   text_statements/{period}_ocr.txt
//!   json_statements/{period}_financial_statements_raw.json
//!   excel_statements/{period}_financial_statements.csv
//!   period_statements/all_periods_concatenated.csv
//!   period_statements/{statement_type}.csv
//!   final_statements/{statement_type}.csv
//!   final_statements_standardized/{statement_type}.csv
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// File name of the merged long table.
pub const COMBINED_FILE: &str = "all_periods_concatenated.csv";

/// Extension shared by every tabular file.
pub const TABLE_EXT: &str = "csv";

/// Paths for one company folder.
#[derive(Debug, Clone)]
pub struct CompanyLayout {
    root: PathBuf,
}

impl CompanyLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.root.join("financial_statements")
    }

    pub fn text_dir(&self) -> PathBuf {
        self.root.join("text_statements")
    }

    pub fn json_dir(&self) -> PathBuf {
        self.root.join("json_statements")
    }

    pub fn period_table_dir(&self) -> PathBuf {
        self.root.join("excel_statements")
    }

    pub fn merged_dir(&self) -> PathBuf {
        self.root.join("period_statements")
    }

    pub fn wide_dir(&self) -> PathBuf {
        self.root.join("final_statements")
    }

    pub fn standardized_dir(&self) -> PathBuf {
        self.root.join("final_statements_standardized")
    }

    pub fn pdf(&self, period: &str) -> PathBuf {
        self.pdf_dir().join(format!("{period}.pdf"))
    }

    pub fn text(&self, period: &str) -> PathBuf {
        self.text_dir().join(format!("{period}_ocr.txt"))
    }

    pub fn raw_json(&self, period: &str) -> PathBuf {
        self.json_dir()
            .join(format!("{period}_financial_statements_raw.json"))
    }

    pub fn period_table(&self, period: &str) -> PathBuf {
        self.period_table_dir()
            .join(format!("{period}_financial_statements.{TABLE_EXT}"))
    }

    pub fn combined_table(&self) -> PathBuf {
        self.merged_dir().join(COMBINED_FILE)
    }

    pub fn statement_table(&self, statement_type: &str) -> PathBuf {
        self.merged_dir().join(table_file_name(statement_type))
    }

    pub fn wide_table(&self, statement_type: &str) -> PathBuf {
        self.wide_dir().join(table_file_name(statement_type))
    }
}

/// `{statement_type}.csv`, with characters that would escape the directory
/// or upset common filesystems replaced by `-`.
pub fn table_file_name(statement_type: &str) -> String {
    let stem: String = statement_type
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    let stem = stem.trim_matches('.');
    let stem = if stem.is_empty() { "Unclassified" } else { stem };
    format!("{stem}.{TABLE_EXT}")
}

/// Output files handed out during one stage run.
///
/// [`table_file_name`] folds several characters onto `-`, so two statement
/// types can map to the same file; the second one must not overwrite the
/// first.
#[derive(Debug, Default)]
pub struct ClaimedPaths {
    owners: HashMap<PathBuf, String>,
}

impl ClaimedPaths {
    /// Claim `path` for `label`. Returns the earlier owner when the path is
    /// already taken.
    pub fn claim(&mut self, path: &Path, label: &str) -> Option<String> {
        match self.owners.get(path) {
            Some(owner) => Some(owner.clone()),
            None => {
                self.owners.insert(path.to_path_buf(), label.to_string());
                None
            }
        }
    }
}
