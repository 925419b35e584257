//! LLM interaction: one system prompt, one user message, text back.
//!
//! Stages 2 and 5 talk to the model through [`CompletionClient`], so tests
//! can script replies without a network. [`ProviderClient`] is the
//! production client over an `edgequake_llm` provider.
//!
//! ## Retry Strategy
//!
//! Retries are off by default: one failed call skips the period or file.
//! With `max_retries > 0` the wait is `retry_backoff_ms * 2^attempt`, so a
//! 500 ms base with 3 retries waits 500 ms → 1 s → 2 s.

use crate::config::PipelineConfig;
use crate::error::{ItemError, PipelineError};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// One chat call: system instructions plus a single user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Period or file the call is for; used in logs and errors.
    pub label: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// The model's reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    /// Failed attempts before this reply.
    pub retries: u32,
}

/// Anything that can answer a [`CompletionRequest`].
pub trait CompletionClient: Send + Sync {
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<Completion, ItemError>> + Send;
}

/// [`CompletionClient`] over an `edgequake_llm` provider, with retry.
#[derive(Clone)]
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Resolve the provider from `config` (see [`resolve_provider`]).
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }
}

impl CompletionClient for ProviderClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ItemError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(&request.system),
            ChatMessage::user(&request.user),
        ];
        let options = build_options(request);

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    request.label, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "{}: {} input tokens, {} output tokens, {:?}",
                        request.label,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(Completion {
                        content: response.content,
                        prompt_tokens: response.prompt_tokens,
                        completion_tokens: response.completion_tokens,
                        retries: attempt,
                    });
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("{}: attempt {} failed: {}", request.label, attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(ItemError::LlmFailed {
            label: request.label.clone(),
            retries: self.max_retries,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

/// Build `CompletionOptions` from a request.
fn build_options(request: &CompletionRequest) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: Some(request.max_tokens),
        ..Default::default()
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PipelineError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or
///    [`DEFAULT_MODEL`]. The factory reads the matching API key from the
///    environment.
/// 3. **API-key auto-detection** (`ProviderFactory::from_env`), only when
///    neither of the above is set.
///
/// Provider and model names come from the config alone; the CLI maps
/// `EDGEQUAKE_LLM_PROVIDER` / `EDGEQUAKE_MODEL` into it.
///
/// Called before the stage touches any period, so a missing key stops the
/// run with one clear error instead of one skip per period.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PipelineError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, GEMINI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_carries_request_sampling() {
        let request = CompletionRequest {
            label: "2021".into(),
            system: "sys".into(),
            user: "text".into(),
            temperature: 0.05,
            max_tokens: 16384,
        };
        let opts = build_options(&request);
        assert_eq!(opts.temperature, Some(0.05));
        assert_eq!(opts.max_tokens, Some(16384));
    }

    #[test]
    fn provider_name_comes_from_config_not_environment() {
        std::env::set_var("EDGEQUAKE_LLM_PROVIDER", "no-such-provider");
        std::env::set_var("EDGEQUAKE_MODEL", "no-such-model");
        let config = PipelineConfig::builder("ACME", ["2021"]).build().unwrap();

        let result = resolve_provider(&config);
        std::env::remove_var("EDGEQUAKE_LLM_PROVIDER");
        std::env::remove_var("EDGEQUAKE_MODEL");

        // Either API-key auto-detection found something, or it failed as
        // auto-detection; never as the provider named in the environment.
        match result {
            Ok(_) => {}
            Err(PipelineError::ProviderNotConfigured { provider, .. }) => {
                assert_eq!(provider, "auto")
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn named_provider_in_config_is_used() {
        let config = PipelineConfig::builder("ACME", ["2021"])
            .provider_name("no-such-provider")
            .build()
            .unwrap();
        match resolve_provider(&config) {
            Err(PipelineError::ProviderNotConfigured { provider, .. }) => {
                assert_eq!(provider, "no-such-provider")
            }
            Ok(_) => panic!("unknown provider name resolved"),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}
