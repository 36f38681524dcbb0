//! Groq chat-completions client (OpenAI-compatible wire format).

use super::{http_client, ProviderError, SubmitOptions, VisionProvider};
use crate::error::Pdf2TxnError;
use crate::prompts::Prompt;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const GROQ_DEFAULT_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

pub struct GroqProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl GroqProvider {
    pub fn new(
        api_key: String,
        model: Option<String>,
        timeout: Duration,
    ) -> Result<Self, Pdf2TxnError> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            model: model.unwrap_or_else(|| GROQ_DEFAULT_MODEL.to_string()),
            url: GROQ_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different endpoint (proxies, self-hosted gateways).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Build the chat-completions request body.
pub(crate) fn request_body(model: &str, prompt: &Prompt, options: &SubmitOptions) -> Value {
    let mut content = vec![json!({ "type": "text", "text": prompt.text })];
    if let Some(ref image) = prompt.image {
        content.push(json!({
            "type": "image_url",
            "image_url": { "url": format!("data:{};base64,{}", image.mime_type, image.data) }
        }));
    }

    let mut body = json!({
        "model": model,
        "messages": [{ "role": "user", "content": content }],
        "temperature": options.temperature,
        "max_completion_tokens": options.max_tokens,
    });
    // Groq's JSON mode rejects image requests and fails any reply that is
    // not a single object, so it is only set for object-shaped text prompts.
    if options.json_output && prompt.image.is_none() && prompt.expects_object {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the assistant text out of a chat-completions response.
pub(crate) fn response_text(raw: &str) -> Result<String, ProviderError> {
    let parsed: ChatResponse = serde_json::from_str(raw)
        .map_err(|e| ProviderError::Transient(format!("malformed response: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or(ProviderError::EmptyResponse)
}

#[async_trait]
impl VisionProvider for GroqProvider {
    fn name(&self) -> &str {
        "groq"
    }

    async fn submit(
        &self,
        prompt: &Prompt,
        options: &SubmitOptions,
    ) -> Result<String, ProviderError> {
        let body = request_body(&self.model, prompt, options);
        debug!("groq: POST {} model={}", self.url, self.model);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        let text = response.text().await.map_err(ProviderError::from_reqwest)?;
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), &text));
        }
        response_text(&text)
    }
}
