//! Stage 2: page text → LLM → raw JSON reply → per-period long table.
//!
//! For each period the text from stage 1 is cut to the configured page
//! window and sent with the extraction prompt. The reply is saved verbatim
//! to `json_statements/` before anything else happens, so a reply that fails
//! to decode can still be inspected. Decoded records go to
//! `excel_statements/{period}_financial_statements.csv`.

use crate::config::PipelineConfig;
use crate::error::{ItemError, PipelineError};
use crate::output::{StageReport, StageWarning};
use crate::pipeline::layout::CompanyLayout;
use crate::pipeline::llm::{CompletionClient, CompletionRequest};
use crate::pipeline::pages::filter_pages;
use crate::pipeline::response::{decode_records, DecodedRecords};
use crate::pipeline::{Stage, StageTracker};
use crate::prompts::{extraction_user_message, EXTRACTION_SYSTEM_PROMPT};
use crate::table::write_long_csv;
use tracing::{debug, error};

/// Run stage 2 over every configured period.
///
/// A period is complete once its table is written. Missing text, an empty
/// page window, a failed call, or a reply that is not JSON skips the period.
pub async fn extract_statements<C>(
    client: &C,
    config: &PipelineConfig,
) -> Result<StageReport, PipelineError>
where
    C: CompletionClient,
{
    let layout = CompanyLayout::new(&config.company_dir);
    let json_dir = layout.json_dir();
    std::fs::create_dir_all(&json_dir).map_err(|e| PipelineError::OutputWriteFailed {
        path: json_dir.clone(),
        source: e,
    })?;

    let system = config
        .extraction_prompt
        .as_deref()
        .unwrap_or(EXTRACTION_SYSTEM_PROMPT);
    let window = match config.page_range {
        Some(ref r) if !r.is_unbounded() => format!("pages {r}"),
        _ => "all pages".to_string(),
    };

    let mut tracker = StageTracker::start(
        Stage::StructuredExtraction,
        config.periods.len(),
        config.progress_callback.clone(),
    );

    for period in &config.periods {
        tracker.note(format!("Processing period: {period}"));

        let text_path = layout.text(period);
        if !text_path.exists() {
            tracker.skip(ItemError::MissingInput {
                label: period.clone(),
                path: text_path,
            });
            continue;
        }
        let text = match std::fs::read_to_string(&text_path) {
            Ok(t) => t,
            Err(e) => {
                tracker.skip(ItemError::ReadFailed {
                    label: period.clone(),
                    path: text_path,
                    detail: e.to_string(),
                });
                continue;
            }
        };

        let filtered = filter_pages(&text, config.page_range.as_ref());
        if filtered.trim().is_empty() {
            tracker.skip(ItemError::EmptyContent {
                label: period.clone(),
                detail: format!("no text in {window}"),
            });
            continue;
        }

        tracker.note(format!("Sending text for {period} ({window}) for extraction..."));
        let request = CompletionRequest {
            label: period.clone(),
            system: system.to_string(),
            user: extraction_user_message(&filtered),
            temperature: config.extraction_temperature,
            max_tokens: config.max_tokens,
        };
        let completion = match client.complete(&request).await {
            Ok(c) => c,
            Err(e) => {
                tracker.skip(e);
                continue;
            }
        };
        debug!(
            "{}: {} input tokens, {} output tokens, {} retries",
            period, completion.prompt_tokens, completion.completion_tokens, completion.retries
        );

        let raw_path = layout.raw_json(period);
        if let Err(e) = std::fs::write(&raw_path, &completion.content) {
            tracker.skip(ItemError::WriteFailed {
                label: period.clone(),
                path: raw_path,
                detail: e.to_string(),
            });
            continue;
        }
        tracker.note(format!(
            "Saved raw LLM output for {period} to: {}",
            raw_path.display()
        ));
        tracker.wrote(raw_path);

        let records = match decode_records(&completion.content) {
            Ok(DecodedRecords::Records { records, dropped }) => {
                if dropped > 0 {
                    tracker.warn(StageWarning::ResponseShape {
                        label: period.clone(),
                        detail: format!("{dropped} array elements were not objects"),
                    });
                }
                records
            }
            Ok(DecodedRecords::Unrecognised(detail)) => {
                tracker.warn(StageWarning::ResponseShape {
                    label: period.clone(),
                    detail: format!("{detail}; treated as zero records"),
                });
                Vec::new()
            }
            Err(e) => {
                error!(
                    "{}: JSON decoding failed: {}\nLLM Response (raw):\n{}",
                    period, e, completion.content
                );
                tracker.skip(ItemError::InvalidResponse {
                    label: period.clone(),
                    detail: e.to_string(),
                    raw: completion.content,
                });
                continue;
            }
        };

        let table_path = layout.period_table(period);
        match write_long_csv(&table_path, &records) {
            Ok(()) => {
                tracker.note(format!(
                    "Saved {} records for {period} to: {}",
                    records.len(),
                    table_path.display()
                ));
                tracker.complete(period, table_path);
            }
            Err(e) => tracker.skip(ItemError::WriteFailed {
                label: period.clone(),
                path: table_path,
                detail: e.to_string(),
            }),
        }
    }

    tracker.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageRange;
    use crate::pipeline::llm::Completion;
    use crate::table::read_long_csv;
    use std::sync::Mutex;

    /// Replies with a fixed body and remembers what it was asked.
    struct Fixed {
        reply: Result<String, String>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Fixed {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl CompletionClient for Fixed {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ItemError> {
            self.seen.lock().unwrap().push(request.clone());
            match &self.reply {
                Ok(content) => Ok(Completion {
                    content: content.clone(),
                    ..Default::default()
                }),
                Err(detail) => Err(ItemError::LlmFailed {
                    label: request.label.clone(),
                    retries: 0,
                    detail: detail.clone(),
                }),
            }
        }
    }

    fn company_with_text(periods: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let layout = CompanyLayout::new(dir.path());
        std::fs::create_dir_all(layout.text_dir()).unwrap();
        for (p, text) in periods {
            std::fs::write(layout.text(p), text).unwrap();
        }
        dir
    }

    const CASH: &str = r#"[{"statement_type": "balance sheet", "item": "Cash", "year": "2021", "value": "100"}]"#;

    #[tokio::test]
    async fn persists_raw_reply_and_writes_table() {
        let dir = company_with_text(&[("2021", "--- PAGE 1 ---\nCash 100\n\n")]);
        let config = PipelineConfig::builder(dir.path(), ["2021"]).build().unwrap();
        let client = Fixed::ok(&format!("```json\n{CASH}\n```"));

        let report = extract_statements(&client, &config).await.unwrap();
        assert_eq!(report.completed, vec!["2021"]);

        let layout = CompanyLayout::new(dir.path());
        let raw = std::fs::read_to_string(layout.raw_json("2021")).unwrap();
        assert!(raw.starts_with("```json"));
        let records = read_long_csv(&layout.period_table("2021")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].statement_type, "balance sheet");

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].temperature, 0.05);
        assert!(seen[0].user.contains("Cash 100"));
    }

    #[tokio::test]
    async fn page_window_limits_what_is_sent() {
        let text = "--- PAGE 1 ---\ncover\n\n--- PAGE 2 ---\nCash 100\n\n--- PAGE 3 ---\nnotes\n\n";
        let dir = company_with_text(&[("2021", text)]);
        let config = PipelineConfig::builder(dir.path(), ["2021"])
            .page_range(PageRange::new(Some(2), Some(2)))
            .build()
            .unwrap();
        let client = Fixed::ok(CASH);

        extract_statements(&client, &config).await.unwrap();
        let seen = client.seen.lock().unwrap();
        assert!(seen[0].user.contains("Cash 100"));
        assert!(!seen[0].user.contains("cover"));
        assert!(!seen[0].user.contains("notes"));
    }

    #[tokio::test]
    async fn empty_window_and_missing_text_are_skipped() {
        let dir = company_with_text(&[
            ("2021", "--- PAGE 1 ---\nCash 100\n\n"),
            ("2022", "--- PAGE 9 ---\nCash 150\n\n"),
        ]);
        let config = PipelineConfig::builder(dir.path(), ["2020", "2021", "2022"])
            .page_range(PageRange::new(Some(9), Some(9)))
            .build()
            .unwrap();
        let client = Fixed::ok(CASH);

        let report = extract_statements(&client, &config).await.unwrap();
        assert_eq!(report.completed, vec!["2022"]);
        assert!(matches!(report.skipped[0], ItemError::MissingInput { .. }));
        assert!(matches!(report.skipped[1], ItemError::EmptyContent { .. }));
        assert_eq!(client.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_json_keeps_raw_reply_but_skips_table() {
        let dir = company_with_text(&[("2021", "--- PAGE 1 ---\nCash\n\n")]);
        let config = PipelineConfig::builder(dir.path(), ["2021"]).build().unwrap();
        let client = Fixed::ok("I could not find any statements.");

        let err = extract_statements(&client, &config).await.unwrap_err();
        assert!(matches!(err, PipelineError::StageFailed { .. }));

        let layout = CompanyLayout::new(dir.path());
        assert!(layout.raw_json("2021").exists());
        assert!(!layout.period_table("2021").exists());
    }

    #[tokio::test]
    async fn unrecognised_shape_writes_empty_table_with_warning() {
        let dir = company_with_text(&[("2021", "--- PAGE 1 ---\nCash\n\n")]);
        let config = PipelineConfig::builder(dir.path(), ["2021"]).build().unwrap();
        let client = Fixed::ok(r#"{"note": "nothing here"}"#);

        let report = extract_statements(&client, &config).await.unwrap();
        assert_eq!(report.completed, vec!["2021"]);
        assert!(matches!(report.warnings[0], StageWarning::ResponseShape { .. }));
        let layout = CompanyLayout::new(dir.path());
        assert!(read_long_csv(&layout.period_table("2021")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn llm_failure_skips_period() {
        let dir = company_with_text(&[("2021", "--- PAGE 1 ---\nCash\n\n")]);
        let config = PipelineConfig::builder(dir.path(), ["2021"]).build().unwrap();
        let client = Fixed {
            reply: Err("quota exceeded".into()),
            seen: Mutex::new(Vec::new()),
        };

        match extract_statements(&client, &config).await {
            Err(PipelineError::StageFailed { first_error, .. }) => {
                assert!(first_error.contains("quota exceeded"))
            }
            other => panic!("expected StageFailed, got {other:?}"),
        }
    }
}
