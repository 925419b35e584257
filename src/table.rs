//! Tabular data moving between stages 2–5, and its CSV form on disk.
//!
//! * [`LineItemRecord`]: one extracted observation, long format.
//! * [`WideTable`]: item × period grid for one statement type.
//! * [`StandardizationMapping`]: ordered groups of raw names under one
//!   canonical name.
//!
//! Long-format cells stay textual until stage 4 cleans them; wide tables hold
//! [`Decimal`] so sums of money values are exact.

use crate::pipeline::reformat::clean_value;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Columns of every long-format table, in file order.
pub const LONG_COLUMNS: [&str; 5] = ["item_number", "statement_type", "item", "year", "value"];

/// Header of the row-key column in wide tables.
pub const ITEM_COLUMN: &str = "item";

/// One line item observed in one period.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineItemRecord {
    /// Printed line number ("1.", "II.3"), if the statement has one.
    #[serde(default)]
    pub item_number: Option<String>,
    #[serde(default)]
    pub statement_type: String,
    #[serde(default)]
    pub item: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    /// Raw value text as extracted; cleaned into a number by stage 4.
    #[serde(default)]
    pub value: Option<String>,
}

/// All periods' records, tagged by statement type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LongTable {
    pub records: Vec<LineItemRecord>,
}

impl LongTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct statement types in first-appearance order.
    pub fn statement_types(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for r in &self.records {
            if !seen.contains(&r.statement_type) {
                seen.push(r.statement_type.clone());
            }
        }
        seen
    }

    /// Records of one statement type, in table order.
    pub fn filter_type(&self, statement_type: &str) -> Vec<LineItemRecord> {
        self.records
            .iter()
            .filter(|r| r.statement_type == statement_type)
            .cloned()
            .collect()
    }
}

/// Write records as a long-format CSV with a header row.
pub fn write_long_csv(path: &Path, records: &[LineItemRecord]) -> Result<(), csv::Error> {
    ensure_parent(path)?;
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    wtr.write_record(LONG_COLUMNS)?;
    for r in records {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a long-format CSV written by [`write_long_csv`].
pub fn read_long_csv(path: &Path) -> Result<Vec<LineItemRecord>, csv::Error> {
    let mut rdr = csv::Reader::from_path(path)?;
    rdr.deserialize().collect()
}

/// One row of a wide table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WideRow {
    pub item: String,
    /// One cell per entry of [`WideTable::columns`].
    pub values: Vec<Option<Decimal>>,
}

/// Item × period table for one statement type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WideTable {
    /// Period column labels, in display order.
    pub columns: Vec<String>,
    pub rows: Vec<WideRow>,
}

impl WideTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row; `values` is padded or truncated to the column count.
    pub fn push_row(&mut self, item: impl Into<String>, mut values: Vec<Option<Decimal>>) {
        values.resize(self.columns.len(), None);
        self.rows.push(WideRow {
            item: item.into(),
            values,
        });
    }

    pub fn row(&self, item: &str) -> Option<&WideRow> {
        self.rows.iter().find(|r| r.item == item)
    }

    /// Cell lookup by item name and column label.
    pub fn get(&self, item: &str, column: &str) -> Option<Decimal> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.row(item).and_then(|r| r.values.get(col).copied().flatten())
    }

    /// Row keys in table order.
    pub fn items(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.item.as_str()).collect()
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), csv::Error> {
        ensure_parent(path)?;
        let mut wtr = csv::Writer::from_path(path)?;

        let mut header = Vec::with_capacity(self.columns.len() + 1);
        header.push(ITEM_COLUMN.to_string());
        header.extend(self.columns.iter().cloned());
        wtr.write_record(&header)?;

        for row in &self.rows {
            let mut record = Vec::with_capacity(row.values.len() + 1);
            record.push(row.item.clone());
            record.extend(
                row.values
                    .iter()
                    .map(|v| v.map(|d| d.normalize().to_string()).unwrap_or_default()),
            );
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Read a wide CSV: first column is the row key, the rest are periods.
    pub fn read_csv(path: &Path) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let columns: Vec<String> = rdr.headers()?.iter().skip(1).map(str::to_string).collect();
        let mut table = WideTable::new(columns);

        for record in rdr.records() {
            let record = record?;
            let Some(item) = record.get(0).map(str::trim).filter(|s| !s.is_empty()) else {
                continue;
            };
            let values = record.iter().skip(1).map(clean_value).collect();
            table.push_row(item, values);
        }
        Ok(table)
    }
}

/// One canonical name and the raw names that collapse onto it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardizationGroup {
    pub standardized_item: String,
    #[serde(default)]
    pub original_items: Vec<String>,
}

/// Groups in canonical display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StandardizationMapping {
    pub groups: Vec<StandardizationGroup>,
}

/// Title case: a letter is upper-cased when the previous
/// character is not a letter, lower-cased otherwise.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_letter = false;
    for c in s.chars() {
        if prev_letter {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_letter = c.is_alphabetic();
    }
    out
}

fn ensure_parent(path: &Path) -> Result<(), csv::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
