//! Model client: walk the provider chain with retry and fallback.
//!
//! ## Retry strategy
//!
//! Each provider gets one attempt plus `max_retries` retries, but only for
//! transient failures (timeouts, 408/429/5xx, empty replies). Backoff is
//! exponential: `retry_backoff_ms * 2^(retry-1)`. A rejected request (bad
//! key, bad model) or an exhausted retry budget moves on to the next
//! provider. When the chain runs out the page fails with
//! [`ExtractionServiceError`]; the rest of the document is unaffected.

use crate::config::ExtractionConfig;
use crate::error::ExtractionServiceError;
use crate::pipeline::schema::{parse_schema_reply, ColumnSchema};
use crate::prompts::{schema_prompt, table_check_prompt, Prompt, PromptContent};
use crate::providers::{ProviderError, SubmitOptions, VisionProvider};
use edgequake_llm::ImageData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// A successful reply and how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub provider: String,
    /// Calls made for this prompt across all providers.
    pub attempts: u32,
    pub duration_ms: u64,
}

#[derive(Clone)]
pub struct ModelClient {
    providers: Vec<Arc<dyn VisionProvider>>,
    options: SubmitOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    call_timeout: Duration,
}

impl ModelClient {
    pub fn new(providers: Vec<Arc<dyn VisionProvider>>, config: &ExtractionConfig) -> Self {
        Self {
            providers,
            options: SubmitOptions {
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                json_output: true,
            },
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            call_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Submit an extraction prompt for one page.
    pub async fn submit(
        &self,
        page_num: usize,
        prompt: &Prompt,
    ) -> Result<ModelReply, ExtractionServiceError> {
        self.submit_with(page_num, prompt, &self.options).await
    }

    async fn submit_with(
        &self,
        page_num: usize,
        prompt: &Prompt,
        options: &SubmitOptions,
    ) -> Result<ModelReply, ExtractionServiceError> {
        let start = Instant::now();
        let mut attempts = 0u32;
        let mut last: Option<(String, ProviderError)> = None;

        for provider in &self.providers {
            for retry in 0..=self.max_retries {
                if retry > 0 {
                    let backoff = backoff_ms(self.retry_backoff_ms, retry);
                    warn!(
                        "Page {}: {} retry {}/{} after {}ms",
                        page_num,
                        provider.name(),
                        retry,
                        self.max_retries,
                        backoff
                    );
                    sleep(Duration::from_millis(backoff)).await;
                }

                attempts += 1;
                let outcome = match tokio::time::timeout(
                    self.call_timeout,
                    provider.submit(prompt, options),
                )
                .await
                {
                    Ok(r) => r,
                    Err(_) => Err(ProviderError::Transient(format!(
                        "timed out after {}s",
                        self.call_timeout.as_secs()
                    ))),
                };

                match outcome {
                    Ok(text) => {
                        debug!(
                            "Page {}: {} replied with {} chars after {} attempt(s)",
                            page_num,
                            provider.name(),
                            text.len(),
                            attempts
                        );
                        return Ok(ModelReply {
                            text,
                            provider: provider.name().to_string(),
                            attempts,
                            duration_ms: start.elapsed().as_millis() as u64,
                        });
                    }
                    Err(e) => {
                        warn!("Page {}: {} failed: {}", page_num, provider.name(), e);
                        let transient = e.is_transient();
                        last = Some((provider.name().to_string(), e));
                        if !transient {
                            break;
                        }
                    }
                }
            }
        }

        let (last_provider, detail) = last
            .map(|(name, e)| (name, e.to_string()))
            .unwrap_or_else(|| ("none".to_string(), "no providers configured".to_string()));

        Err(ExtractionServiceError {
            providers: self.providers.len(),
            attempts,
            last_provider,
            detail,
        })
    }

    /// Ask whether a page image shows a transaction table.
    ///
    /// Any failure or unclear answer counts as YES, so a flaky classifier
    /// never drops a page.
    pub async fn is_transaction_table(&self, page_num: usize, image: &ImageData) -> bool {
        let options = SubmitOptions {
            json_output: false,
            max_tokens: 10,
            ..self.options.clone()
        };
        let prompt = table_check_prompt(image.clone());
        match self.submit_with(page_num, &prompt, &options).await {
            Ok(reply) => !answer_is_no(&reply.text),
            Err(e) => {
                warn!("Page {}: table check failed, keeping page: {}", page_num, e);
                true
            }
        }
    }

    /// Read the debit/credit column order and date direction of a bank
    /// transaction table. `None` when the model fails or its reply has no
    /// usable row; callers then keep the debit-first default.
    pub async fn detect_schema(
        &self,
        page_num: usize,
        content: PromptContent,
    ) -> Option<ColumnSchema> {
        let options = SubmitOptions {
            json_output: false,
            max_tokens: 256,
            ..self.options.clone()
        };
        let prompt = schema_prompt(content);
        match self.submit_with(page_num, &prompt, &options).await {
            Ok(reply) => {
                let schema = parse_schema_reply(&reply.text);
                if schema.is_none() {
                    warn!("Page {}: unreadable column schema reply", page_num);
                }
                schema
            }
            Err(e) => {
                warn!("Page {}: column schema detection failed: {}", page_num, e);
                None
            }
        }
    }
}

/// Delay before retry `retry` (1-based). Saturates instead of overflowing.
fn backoff_ms(base_ms: u64, retry: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(retry.saturating_sub(1)))
}

fn answer_is_no(text: &str) -> bool {
    let word: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect();
    word.eq_ignore_ascii_case("no")
}
