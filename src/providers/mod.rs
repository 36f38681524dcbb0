//! Vision providers: the single capability "submit a prompt, get text back".
//!
//! The model client never knows which service it talks to. It holds an
//! ordered chain of [`VisionProvider`] trait objects and walks it on
//! failure, so adding a backend means implementing one async method.
//!
//! | Provider | Service | Auth |
//! |----------|---------|------|
//! | [`GroqProvider`]   | Groq OpenAI-compatible chat completions | `GROQ_API_KEY` |
//! | [`GeminiProvider`] | Google `generateContent` | `GEMINI_API_KEY` |
//! | [`LlmBridge`]      | anything `edgequake-llm` can construct | provider specific |

mod bridge;
mod gemini;
mod groq;

pub use bridge::LlmBridge;
pub use gemini::GeminiProvider;
pub use groq::GroqProvider;

use crate::error::Pdf2TxnError;
use crate::prompts::Prompt;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Per-call generation settings shared by every provider.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOptions {
    pub temperature: f32,
    pub max_tokens: usize,
    /// Ask the service for a JSON body when it supports that natively.
    pub json_output: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 8192,
            json_output: true,
        }
    }
}

/// Failure of a single provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Timeouts, dropped connections, 408/429/5xx. Worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Bad key, bad request, unsupported model. Retrying will not help.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The call succeeded but carried no text.
    #[error("empty response")]
    EmptyResponse,
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_) | ProviderError::EmptyResponse)
    }

    /// Map a non-success HTTP status to the retry class it belongs to.
    pub fn from_status(status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        let msg = format!("HTTP {status}: {snippet}");
        match status {
            408 | 429 | 500..=599 => ProviderError::Transient(msg),
            _ => ProviderError::Rejected(msg),
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            ProviderError::Transient(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::from_status(status.as_u16(), "")
        } else {
            ProviderError::Transient(e.to_string())
        }
    }
}

/// A hosted model that reads a prompt (plus optional image) and replies
/// with text.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Short name used in logs and page reports.
    fn name(&self) -> &str;

    async fn submit(&self, prompt: &Prompt, options: &SubmitOptions)
        -> Result<String, ProviderError>;
}

/// Declarative description of one link in the provider chain.
#[derive(Clone)]
pub enum ProviderSpec {
    Groq {
        api_key: String,
        model: Option<String>,
    },
    Gemini {
        api_key: String,
        model: Option<String>,
    },
    /// Any provider `edgequake-llm` knows by name ("openai", "anthropic", ...).
    Llm { provider: String, model: String },
    /// A caller-constructed provider, used as-is.
    Custom(Arc<dyn VisionProvider>),
}

impl fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderSpec::Groq { model, .. } => f
                .debug_struct("Groq")
                .field("api_key", &"<redacted>")
                .field("model", model)
                .finish(),
            ProviderSpec::Gemini { model, .. } => f
                .debug_struct("Gemini")
                .field("api_key", &"<redacted>")
                .field("model", model)
                .finish(),
            ProviderSpec::Llm { provider, model } => f
                .debug_struct("Llm")
                .field("provider", provider)
                .field("model", model)
                .finish(),
            ProviderSpec::Custom(p) => f.debug_tuple("Custom").field(&p.name()).finish(),
        }
    }
}

impl ProviderSpec {
    pub fn label(&self) -> String {
        match self {
            ProviderSpec::Groq { .. } => "groq".to_string(),
            ProviderSpec::Gemini { .. } => "gemini".to_string(),
            ProviderSpec::Llm { provider, .. } => provider.clone(),
            ProviderSpec::Custom(p) => p.name().to_string(),
        }
    }

    fn build(&self, timeout: Duration) -> Result<Arc<dyn VisionProvider>, Pdf2TxnError> {
        match self {
            ProviderSpec::Groq { api_key, model } => {
                require_key("groq", api_key, "GROQ_API_KEY")?;
                let p = GroqProvider::new(api_key.clone(), model.clone(), timeout)?;
                Ok(Arc::new(p))
            }
            ProviderSpec::Gemini { api_key, model } => {
                require_key("gemini", api_key, "GEMINI_API_KEY")?;
                let p = GeminiProvider::new(api_key.clone(), model.clone(), timeout)?;
                Ok(Arc::new(p))
            }
            ProviderSpec::Llm { provider, model } => Ok(Arc::new(LlmBridge::create(provider, model)?)),
            ProviderSpec::Custom(p) => Ok(Arc::clone(p)),
        }
    }
}

fn require_key(provider: &str, key: &str, env_var: &str) -> Result<(), Pdf2TxnError> {
    if key.trim().is_empty() {
        return Err(Pdf2TxnError::ProviderNotConfigured {
            provider: provider.to_string(),
            hint: format!("An API key is required. Set {env_var} or pass it explicitly."),
        });
    }
    Ok(())
}

/// Instantiate the configured chain, preserving order.
pub fn resolve_chain(
    specs: &[ProviderSpec],
    timeout: Duration,
) -> Result<Vec<Arc<dyn VisionProvider>>, Pdf2TxnError> {
    if specs.is_empty() {
        return Err(Pdf2TxnError::ProviderNotConfigured {
            provider: "none".to_string(),
            hint: "No vision provider configured.\n\
                   Set GEMINI_API_KEY and/or GROQ_API_KEY, or pass --provider."
                .to_string(),
        });
    }
    specs.iter().map(|s| s.build(timeout)).collect()
}

/// Build a chain from `GEMINI_API_KEY` (primary) and `GROQ_API_KEY`
/// (fallback). Keys that are unset or empty are skipped.
pub fn providers_from_env() -> Vec<ProviderSpec> {
    let mut specs = Vec::new();
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.trim().is_empty() {
            specs.push(ProviderSpec::Gemini {
                api_key: key,
                model: None,
            });
        }
    }
    if let Ok(key) = std::env::var("GROQ_API_KEY") {
        if !key.trim().is_empty() {
            specs.push(ProviderSpec::Groq {
                api_key: key,
                model: None,
            });
        }
    }
    specs
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, Pdf2TxnError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Pdf2TxnError::Internal(format!("HTTP client: {e}")))
}
