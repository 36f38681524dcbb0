//! Configuration types for statement extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Everything a run needs (API keys
//! included, through [`ProviderSpec`]) is passed in here; the library does
//! not read ambient environment state on its own.

use crate::error::Pdf2TxnError;
use crate::pipeline::redact::RedactionPolicy;
use crate::progress::ProgressCallback;
use crate::prompts::DocumentKind;
use crate::providers::ProviderSpec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound for [`ExtractionConfig::max_retries`].
pub const MAX_RETRIES: u32 = 10;

/// Configuration for one statement extraction.
///
/// # Example
/// ```rust
/// use pdf2txn::{DocumentKind, ExtractionConfig, ProviderSpec};
///
/// let config = ExtractionConfig::builder()
///     .document_kind(DocumentKind::Bank)
///     .provider(ProviderSpec::Groq { api_key: "gsk_...".into(), model: None })
///     .dpi(300)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Statement kind; selects the prompt template. Default: credit card.
    pub document_kind: DocumentKind,

    /// What each page turns into before it reaches the model. Default: page image.
    pub render_mode: RenderMode,

    /// Rendering DPI used when rasterising each page. Range: 72–600. Default: 200.
    ///
    /// Statement tables use small fonts; below ~150 DPI digits start to blur
    /// together and amounts come back wrong.
    pub dpi: u32,

    /// Maximum rendered image edge in pixels. Default: 2400.
    pub max_rendered_pixels: u32,

    /// Pixels kept above and below a cropped table region. Default: 10.
    pub table_padding_px: u32,

    /// Paint the area above the transaction table header white before the
    /// page image is sent. Keeps name/address/account blocks away from the
    /// model. Default: false.
    pub mask_header: bool,

    /// Convert page images to grayscale before encoding. Default: true.
    pub grayscale: bool,

    /// Number of concurrent model calls. Default: 4.
    pub concurrency: usize,

    /// Ordered provider chain: the first is primary, the rest are fallbacks.
    pub providers: Vec<ProviderSpec>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 8192.
    pub max_tokens: usize,

    /// Retries per provider on a transient failure before falling back to
    /// the next provider. Range: 0–10. Default: 1.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled on each retry. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// PDF user password for protected statements.
    pub password: Option<String>,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Which record fields get masked before export.
    pub redaction: RedactionPolicy,

    /// Drop records repeated on the same (date, description, amount,
    /// direction). `None` follows the statement kind: on for credit cards,
    /// off for bank statements, where identical rows are usually real.
    pub deduplicate: Option<bool>,

    /// Bank statements: ask the model for the column order of the first
    /// transaction table and reuse it in every page prompt. Default: true.
    pub detect_schema: bool,

    /// Bank statements: flip debit/credit on rows whose amount only fits the
    /// running balance the other way round. Default: true.
    pub reconcile_balances: bool,

    /// Ask the model whether a page holds a transaction table before
    /// extracting it; pages answered NO are skipped. Default: false.
    pub classify_tables: bool,

    /// Custom extraction instructions. If None, uses the built-in template
    /// for `document_kind`.
    pub system_prompt: Option<String>,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            document_kind: DocumentKind::default(),
            render_mode: RenderMode::default(),
            dpi: 200,
            max_rendered_pixels: 2400,
            table_padding_px: 10,
            mask_header: false,
            grayscale: true,
            concurrency: 4,
            providers: Vec::new(),
            temperature: 0.0,
            max_tokens: 8192,
            max_retries: 1,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            password: None,
            pages: PageSelection::default(),
            redaction: RedactionPolicy::default(),
            deduplicate: None,
            detect_schema: true,
            reconcile_balances: true,
            classify_tables: false,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("document_kind", &self.document_kind)
            .field("render_mode", &self.render_mode)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("mask_header", &self.mask_header)
            .field("concurrency", &self.concurrency)
            .field("providers", &self.providers)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pages", &self.pages)
            .field("redaction", &self.redaction)
            .field("deduplicate", &self.deduplicate)
            .field("detect_schema", &self.detect_schema)
            .field("reconcile_balances", &self.reconcile_balances)
            .field("classify_tables", &self.classify_tables)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn callback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether duplicate records are dropped for this run.
    pub fn deduplicates(&self) -> bool {
        self.deduplicate
            .unwrap_or(self.document_kind == DocumentKind::CreditCard)
    }

    /// Whether the first bank table is asked for its column order.
    /// A caller's own instructions have no column slot, so detection is
    /// skipped for them.
    pub fn detects_schema(&self) -> bool {
        self.detect_schema
            && self.document_kind == DocumentKind::Bank
            && self.system_prompt.is_none()
    }

    /// Whether the balance-continuity pass runs for this run.
    pub fn reconciles_balances(&self) -> bool {
        self.reconcile_balances && self.document_kind == DocumentKind::Bank
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn document_kind(mut self, kind: DocumentKind) -> Self {
        self.config.document_kind = kind;
        self
    }

    pub fn render_mode(mut self, mode: RenderMode) -> Self {
        self.config.render_mode = mode;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn table_padding_px(mut self, px: u32) -> Self {
        self.config.table_padding_px = px;
        self
    }

    pub fn mask_header(mut self, v: bool) -> Self {
        self.config.mask_header = v;
        self
    }

    pub fn grayscale(mut self, v: bool) -> Self {
        self.config.grayscale = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    /// Append a provider to the chain.
    pub fn provider(mut self, spec: ProviderSpec) -> Self {
        self.config.providers.push(spec);
        self
    }

    /// Replace the whole chain.
    pub fn providers(mut self, specs: Vec<ProviderSpec>) -> Self {
        self.config.providers = specs;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn redaction(mut self, policy: RedactionPolicy) -> Self {
        self.config.redaction = policy;
        self
    }

    pub fn deduplicate(mut self, v: bool) -> Self {
        self.config.deduplicate = Some(v);
        self
    }

    pub fn detect_schema(mut self, v: bool) -> Self {
        self.config.detect_schema = v;
        self
    }

    pub fn reconcile_balances(mut self, v: bool) -> Self {
        self.config.reconcile_balances = v;
        self
    }

    pub fn classify_tables(mut self, v: bool) -> Self {
        self.config.classify_tables = v;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2TxnError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(Pdf2TxnError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2TxnError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(Pdf2TxnError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Pdf2TxnError::InvalidConfig(
                "API timeout must be at least one second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How a page is prepared for the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// The whole page as an image. (default)
    #[default]
    PageImage,
    /// Only the detected transaction table band, as an image.
    TableImage,
    /// The detected transaction table as pipe-separated text; no image.
    TableText,
}

/// Specifies which pages of the statement to process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// All pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// The first requested page, for out-of-range reports.
    pub fn first_requested(&self) -> usize {
        match self {
            PageSelection::All => 1,
            PageSelection::Single(p) => *p,
            PageSelection::Range(s, _) => *s,
            PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(1),
        }
    }
}
