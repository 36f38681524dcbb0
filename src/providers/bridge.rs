//! Adapter from any `edgequake-llm` provider to [`VisionProvider`].

use super::{ProviderError, SubmitOptions, VisionProvider};
use crate::error::Pdf2TxnError;
use crate::prompts::Prompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;

pub struct LlmBridge {
    name: String,
    inner: Arc<dyn LLMProvider>,
}

impl LlmBridge {
    pub fn new(name: impl Into<String>, inner: Arc<dyn LLMProvider>) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }

    /// Instantiate a named provider with the given model. API keys are read
    /// by the factory from the provider's usual environment variable.
    pub fn create(provider: &str, model: &str) -> Result<Self, Pdf2TxnError> {
        let inner = ProviderFactory::create_llm_provider(provider, model).map_err(|e| {
            Pdf2TxnError::ProviderNotConfigured {
                provider: provider.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, inner))
    }
}

#[async_trait]
impl VisionProvider for LlmBridge {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(
        &self,
        prompt: &Prompt,
        options: &SubmitOptions,
    ) -> Result<String, ProviderError> {
        let images = prompt.image.iter().cloned().collect::<Vec<_>>();
        let messages = vec![ChatMessage::user_with_images(prompt.text.as_str(), images)];
        let completion = CompletionOptions {
            temperature: Some(options.temperature),
            max_tokens: Some(options.max_tokens),
            ..Default::default()
        };

        // edgequake-llm does not expose a status code, so every failure is
        // treated as retryable and the chain decides when to move on.
        let response = self
            .inner
            .chat(&messages, Some(&completion))
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        if response.content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(response.content)
    }
}
