//! Google Gemini `generateContent` client.

use super::{http_client, ProviderError, SubmitOptions, VisionProvider};
use crate::error::Pdf2TxnError;
use crate::prompts::Prompt;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(
        api_key: String,
        model: Option<String>,
        timeout: Duration,
    ) -> Result<Self, Pdf2TxnError> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            model: model.unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string()),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

pub(crate) fn request_body(prompt: &Prompt, options: &SubmitOptions) -> Value {
    let mut parts = vec![json!({ "text": prompt.text })];
    if let Some(ref image) = prompt.image {
        parts.push(json!({
            "inline_data": { "mime_type": image.mime_type, "data": image.data }
        }));
    }

    let mut generation = json!({
        "temperature": options.temperature,
        "maxOutputTokens": options.max_tokens,
    });
    if options.json_output {
        generation["responseMimeType"] = json!("application/json");
    }

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": generation,
    })
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

/// Concatenate the text parts of the first candidate.
pub(crate) fn response_text(raw: &str) -> Result<String, ProviderError> {
    let parsed: GenerateResponse = serde_json::from_str(raw)
        .map_err(|e| ProviderError::Transient(format!("malformed response: {e}")))?;
    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn submit(
        &self,
        prompt: &Prompt,
        options: &SubmitOptions,
    ) -> Result<String, ProviderError> {
        let url = self.endpoint();
        debug!("gemini: POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(prompt, options))
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
