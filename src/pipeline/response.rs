//! Decoding of LLM replies into records.
//!
//! Models are asked for a bare JSON array and mostly comply, but replies
//! still arrive wrapped in ```` ```json ```` fences, prefixed with a BOM, or
//! nested under an object key (`{"data": [...]}`). Cleanup here is
//! deterministic and never touches values.

use crate::table::LineItemRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

/// Object keys under which a reply may nest its record array.
pub const WRAPPER_KEYS: [&str; 7] = [
    "data",
    "items",
    "line_items",
    "records",
    "financial_statements",
    "statements",
    "results",
];

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n?(.*?)\r?\n?```$").unwrap());

/// What a syntactically valid reply turned out to contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedRecords {
    /// A record array was found. `dropped` counts elements that were not objects.
    Records {
        records: Vec<LineItemRecord>,
        dropped: usize,
    },
    /// Valid JSON with no record array in it; the string says what was found.
    Unrecognised(String),
}

/// Remove one pair of outer Markdown fences and invisible characters.
pub fn strip_code_fences(input: &str) -> String {
    let cleaned = remove_invisible_chars(input);
    let trimmed = cleaned.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

/// Find the top-level array: the value itself, or an array under one of `keys`.
pub fn unwrap_array(value: Value, keys: &[&str]) -> Result<Vec<Value>, String> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in keys {
                if let Some(Value::Array(items)) = map.remove(*key) {
                    return Ok(items);
                }
            }
            let found: Vec<&str> = map.keys().map(String::as_str).collect();
            Err(format!(
                "object without a known record key (keys: {})",
                found.join(", ")
            ))
        }
        other => Err(format!("expected a JSON array, got {}", json_kind(&other))),
    }
}

/// Parse a structured-extraction reply.
///
/// Only a JSON syntax error is an `Err`; a wrong shape comes back as
/// [`DecodedRecords::Unrecognised`] so the caller can treat it as zero
/// records.
pub fn decode_records(raw: &str) -> Result<DecodedRecords, serde_json::Error> {
    let value: Value = serde_json::from_str(&strip_code_fences(raw))?;

    let items = match unwrap_array(value, &WRAPPER_KEYS) {
        Ok(items) => items,
        Err(detail) => return Ok(DecodedRecords::Unrecognised(detail)),
    };

    let mut records = Vec::with_capacity(items.len());
    let mut dropped = 0;
    for item in items {
        match item {
            Value::Object(map) => records.push(record_from_object(&map)),
            _ => dropped += 1,
        }
    }
    Ok(DecodedRecords::Records { records, dropped })
}

fn record_from_object(map: &Map<String, Value>) -> LineItemRecord {
    let field = |key: &str| map.get(key).and_then(cell_text);
    LineItemRecord {
        item_number: field("item_number"),
        statement_type: field("statement_type").unwrap_or_default(),
        item: field("item"),
        year: field("year"),
        value: field("value"),
    }
}

/// Cell text for a JSON value. Null and blank strings are missing.
fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(number_text(n)),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Plain decimal text (no exponent), so `2021.0` reads as a year and
/// `1.5e9` survives value cleaning.
fn number_text(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    n.as_f64()
        .and_then(Decimal::from_f64)
        .map(|d| d.normalize().to_string())
        .unwrap_or_else(|| n.to_string())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn records(raw: &str) -> Vec<LineItemRecord> {
        match decode_records(raw).unwrap() {
            DecodedRecords::Records { records, .. } => records,
            other => panic!("expected records, got {other:?}"),
        }
    }

    #[test]
    fn strip_json_fences() {
        let input = "```json\n[{\"item\": \"Cash\"}]\n```";
        assert_eq!(strip_code_fences(input), "[{\"item\": \"Cash\"}]");
    }

    #[test]
    fn strip_fences_no_lang_and_surrounding_space() {
        assert_eq!(strip_code_fences("  ```\n[]\n```  \n"), "[]");
    }

    #[test]
    fn no_fences_passthrough() {
        assert_eq!(strip_code_fences("\u{FEFF}[1, 2]"), "[1, 2]");
    }

    #[test]
    fn bare_array() {
        let recs = records(
            r#"[{"item_number": "110", "statement_type": "Balance Sheet",
                 "item": "Cash", "year": 2021, "value": 100}]"#,
        );
        assert_eq!(
            recs,
            vec![LineItemRecord {
                item_number: Some("110".into()),
                statement_type: "Balance Sheet".into(),
                item: Some("Cash".into()),
                year: Some("2021".into()),
                value: Some("100".into()),
            }]
        );
    }

    #[test]
    fn wrapped_array_under_known_key() {
        let recs = records(r#"```json
{"financial_statements": [{"statement_type": "Income Statement", "item": "Revenue", "year": "2022", "value": "1,234"}]}
```"#);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].value.as_deref(), Some("1,234"));
    }

    #[test]
    fn unknown_shape_is_unrecognised_not_an_error() {
        match decode_records(r#"{"answer": "no statements found"}"#).unwrap() {
            DecodedRecords::Unrecognised(detail) => assert!(detail.contains("answer")),
            other => panic!("expected Unrecognised, got {other:?}"),
        }
        assert!(matches!(
            decode_records("42").unwrap(),
            DecodedRecords::Unrecognised(_)
        ));
    }

    #[test]
    fn syntax_error_is_an_error() {
        assert!(decode_records("[{\"item\": \"Cash\",").is_err());
        assert!(decode_records("Sorry, I cannot help with that.").is_err());
    }

    #[test]
    fn blank_and_null_cells_are_missing() {
        let recs = records(r#"[{"item_number": "", "statement_type": "BS", "item": "Cash", "year": "2021", "value": null}]"#);
        assert_eq!(recs[0].item_number, None);
        assert_eq!(recs[0].value, None);
    }

    #[test]
    fn float_numbers_have_no_exponent() {
        let recs = records(r#"[{"item": "Cash", "year": 2021.0, "value": 1.5e9}]"#);
        assert_eq!(recs[0].year.as_deref(), Some("2021"));
        assert_eq!(recs[0].value.as_deref(), Some("1500000000"));
    }

    #[test]
    fn non_object_elements_are_dropped() {
        match decode_records(r#"[{"item": "Cash"}, "stray", 3]"#).unwrap() {
            DecodedRecords::Records { records, dropped } => {
                assert_eq!(records.len(), 1);
                assert_eq!(dropped, 2);
            }
            other => panic!("expected records, got {other:?}"),
        }
    }
}
