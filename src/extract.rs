//! Extraction entry points.
//!
//! Every entry point runs the same flow:
//!
//! ```text
//! resolve providers ─▶ load ─▶ select pages ─▶ render/prepare ─▶ encode
//!   ─▶ column schema (bank) ─▶ model calls (bounded concurrency) ─▶ parse
//!   ─▶ aggregate ─▶ balance check (bank) ─▶ redact ─▶ summary
//! ```
//!
//! Providers are resolved first so a missing key fails before any PDF work.
//! The post-render half is public ([`process_prepared`], [`assemble_result`])
//! so callers with their own page source can reuse it.

use crate::config::ExtractionConfig;
use crate::error::{PageError, Pdf2TxnError};
use crate::export::{export_to_file, ExportFormat};
use crate::output::{ExtractionResult, ExtractionStats, PageOutcome, TransactionRecord};
use crate::pipeline::aggregate::{aggregate, summarize, PageExtraction};
use crate::pipeline::balance::reconcile_balances;
use crate::pipeline::encode::encode_page;
use crate::pipeline::input::{resolve_input, InputDocument};
use crate::pipeline::llm::ModelClient;
use crate::pipeline::loader::{load_document, DocumentInfo};
use crate::pipeline::parse::parse_response;
use crate::pipeline::redact::redact_records;
use crate::pipeline::render::{render_pages, RenderSettings, RenderedPage};
use crate::pipeline::schema::{ColumnSchema, DateOrder};
use crate::prompts::{build_prompt, PromptContent};
use crate::providers::resolve_chain;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A page ready for the model, or the reason it is not.
#[derive(Debug, Clone)]
pub struct PreparedPage {
    /// 1-indexed page number.
    pub page_num: usize,
    pub content: Result<PromptContent, PageError>,
}

/// One page after the model pass.
#[derive(Debug, Clone)]
pub struct PageRun {
    pub outcome: PageOutcome,
    pub records: Vec<TransactionRecord>,
}

/// Extract transactions from a statement file path or URL.
///
/// # Returns
/// `Ok(ExtractionResult)` as long as at least one page parsed; failed pages
/// are listed in `result.pages`. Use [`ExtractionResult::into_strict`] to
/// turn any page failure into an error.
///
/// # Errors
/// Fatal errors only: unreadable input, decryption failure, unconfigured
/// providers, an empty page selection, or every page failing.
///
/// # Example
/// ```rust,no_run
/// use pdf2txn::{extract, providers_from_env, DocumentKind, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::builder()
///     .document_kind(DocumentKind::Bank)
///     .providers(providers_from_env())
///     .build()?;
/// let result = extract("statement.pdf", &config).await?;
/// println!("{} transactions, net {}", result.summary.record_count, result.summary.net);
/// # Ok(())
/// # }
/// ```
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, Pdf2TxnError> {
    let started = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);

    let client = build_client(config)?;
    let input = resolve_input(input_str, config.download_timeout_secs).await?;
    run(input, &client, config, started).await
}

/// Extract transactions from PDF bytes already in memory.
pub async fn extract_from_bytes(
    name: impl Into<String>,
    bytes: Vec<u8>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, Pdf2TxnError> {
    let started = Instant::now();
    let client = build_client(config)?;
    let input = InputDocument::from_bytes(name, bytes)?;
    run(input, &client, config, started).await
}

/// Extract and write the records straight to a file.
///
/// The format follows the file extension (`.json`, otherwise CSV).
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionStats, Pdf2TxnError> {
    let path = output_path.as_ref();
    let format = ExportFormat::from_path(path).unwrap_or_default();
    let result = extract(input_str, config).await?;
    export_to_file(path, &result.records, format).await?;
    Ok(result.stats)
}

/// Blocking wrapper around [`extract`] with its own tokio runtime.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, Pdf2TxnError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2TxnError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, config))
}

/// Open a statement and report its metadata. No provider is needed.
pub async fn inspect(
    input_str: impl AsRef<str>,
    password: Option<String>,
) -> Result<DocumentInfo, Pdf2TxnError> {
    let input = resolve_input(input_str.as_ref(), 120).await?;
    Ok(load_document(input, password).await?.info)
}

fn build_client(config: &ExtractionConfig) -> Result<ModelClient, Pdf2TxnError> {
    let providers = resolve_chain(
        &config.providers,
        Duration::from_secs(config.api_timeout_secs),
    )?;
    let client = ModelClient::new(providers, config);
    debug!("Provider chain: {}", client.provider_names().join(" → "));
    Ok(client)
}

async fn run(
    input: InputDocument,
    client: &ModelClient,
    config: &ExtractionConfig,
    started: Instant,
) -> Result<ExtractionResult, Pdf2TxnError> {
    let document = Arc::new(load_document(input, config.password.clone()).await?);
    let total_pages = document.page_count();

    let page_indices = config.pages.to_indices(total_pages);
    if page_indices.is_empty() {
        return Err(Pdf2TxnError::PageOutOfRange {
            page: config.pages.first_requested(),
            total: total_pages,
        });
    }
    debug!("Selected {} of {} pages", page_indices.len(), total_pages);

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(page_indices.len());
    }

    let render_start = Instant::now();
    let rendered = render_pages(
        Arc::clone(&document),
        RenderSettings::from_config(config),
        &page_indices,
    )
    .await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!("Prepared {} pages in {}ms", rendered.len(), render_duration_ms);

    let prepared = prepare_contents(rendered, config.grayscale);

    let model_start = Instant::now();
    let runs = process_prepared(client, prepared, config).await;
    let model_duration_ms = model_start.elapsed().as_millis() as u64;

    let stats = ExtractionStats {
        total_pages,
        render_duration_ms,
        model_duration_ms,
        total_duration_ms: started.elapsed().as_millis() as u64,
        ..ExtractionStats::default()
    };
    let result = assemble_result(document.info.clone(), runs, config, stats);

    if let Some(ref cb) = config.progress_callback {
        let succeeded = result.as_ref().map_or(0, |r| r.stats.processed_pages);
        cb.on_extraction_complete(page_indices.len(), succeeded);
    }
    result
}

/// Turn rendered pages into prompt content.
pub fn prepare_contents(
    rendered: Vec<(usize, Result<RenderedPage, PageError>)>,
    grayscale: bool,
) -> Vec<PreparedPage> {
    rendered
        .into_iter()
        .map(|(idx, result)| {
            let page_num = idx + 1;
            let content = result.and_then(|page| match (page.table_text, page.image) {
                (Some(text), _) => Ok(PromptContent::TableText(text)),
                (None, Some(image)) => encode_page(&image, grayscale)
                    .map(PromptContent::Image)
                    .map_err(|e| PageError::RenderFailed {
                        page: page_num,
                        detail: format!("image encoding failed: {}", e),
                    }),
                (None, None) => Err(PageError::NoContent {
                    page: page_num,
                    detail: "nothing rendered".to_string(),
                }),
            });
            PreparedPage { page_num, content }
        })
        .collect()
}

/// Send prepared pages through the model and parse the replies.
///
/// For bank statements the first transaction table is read for its column
/// order before any extraction call, and every page prompt then uses it.
/// Runs up to `config.concurrency` pages at once; the result is sorted by
/// page number.
pub async fn process_prepared(
    client: &ModelClient,
    pages: Vec<PreparedPage>,
    config: &ExtractionConfig,
) -> Vec<PageRun> {
    let total_pages = pages.len();
    let (schema, verdicts) = if config.detects_schema() {
        detect_schema(client, &pages, config).await
    } else {
        (None, HashMap::new())
    };
    let schema = schema.as_ref();
    let verdicts = &verdicts;

    let mut runs: Vec<PageRun> = stream::iter(pages.into_iter().map(|page| async move {
        let verdict = verdicts.get(&page.page_num).copied();
        let run = process_page(client, page, config, total_pages, schema, verdict).await;
        if let Some(ref cb) = config.progress_callback {
            let outcome = &run.outcome;
            match &outcome.error {
                None => cb.on_page_complete(outcome.page_num, total_pages, outcome.record_count),
                Some(e @ PageError::NoContent { .. }) => {
                    cb.on_page_skipped(outcome.page_num, total_pages, &e.to_string())
                }
                Some(e) => cb.on_page_error(outcome.page_num, total_pages, &e.to_string()),
            }
        }
        run
    }))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await;

    runs.sort_by_key(|r| r.outcome.page_num);
    runs
}

/// Walk pages in order until one holds a transaction table, then read its
/// column schema. Table-check answers given on the way are returned so the
/// extraction pass does not ask again.
async fn detect_schema(
    client: &ModelClient,
    pages: &[PreparedPage],
    config: &ExtractionConfig,
) -> (Option<ColumnSchema>, HashMap<usize, bool>) {
    let mut verdicts = HashMap::new();
    for page in pages {
        let Ok(ref content) = page.content else {
            continue;
        };
        if config.classify_tables {
            if let PromptContent::Image(ref image) = content {
                let is_table = client.is_transaction_table(page.page_num, image).await;
                verdicts.insert(page.page_num, is_table);
                if !is_table {
                    continue;
                }
            }
        }

        let schema = client.detect_schema(page.page_num, content.clone()).await;
        match schema {
            Some(ref s) => info!("Page {}: column schema {}", page.page_num, s),
            None => info!("Page {}: keeping debit-first column order", page.page_num),
        }
        return (schema, verdicts);
    }
    (None, verdicts)
}

async fn process_page(
    client: &ModelClient,
    page: PreparedPage,
    config: &ExtractionConfig,
    total_pages: usize,
    schema: Option<&ColumnSchema>,
    table_verdict: Option<bool>,
) -> PageRun {
    let page_num = page.page_num;
    let failed = |error: PageError| PageRun {
        outcome: PageOutcome::failed(page_num, error),
        records: Vec::new(),
    };

    let content = match page.content {
        Ok(content) => content,
        Err(e) => {
            warn!("{}", e);
            return failed(e);
        }
    };

    if config.classify_tables {
        if let PromptContent::Image(ref image) = content {
            let is_table = match table_verdict {
                Some(verdict) => verdict,
                None => client.is_transaction_table(page_num, image).await,
            };
            if !is_table {
                info!("Page {}: classified as not a transaction table, skipping", page_num);
                return failed(PageError::NoContent {
                    page: page_num,
                    detail: "classified as not a transaction table".to_string(),
                });
            }
        }
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(page_num, total_pages);
    }

    let prompt = build_prompt(
        config.document_kind,
        content,
        config.system_prompt.as_deref(),
        schema,
    );
    let reply = match client.submit(page_num, &prompt).await {
        Ok(reply) => reply,
        Err(error) => {
            warn!("Page {}: {}", page_num, error);
            return failed(PageError::ExtractionService {
                page: page_num,
                error,
            });
        }
    };

    let mut outcome = PageOutcome {
        page_num,
        record_count: 0,
        skipped_rows: 0,
        provider: Some(reply.provider),
        attempts: reply.attempts,
        duration_ms: reply.duration_ms,
        error: None,
    };

    match parse_response(&reply.text, page_num, config.document_kind) {
        Ok(parsed) => {
            outcome.record_count = parsed.records.len();
            outcome.skipped_rows = parsed.skipped_rows;
            PageRun {
                outcome,
                records: parsed.records,
            }
        }
        Err(e) => {
            warn!("{}", e);
            outcome.error = Some(e);
            PageRun {
                outcome,
                records: Vec::new(),
            }
        }
    }
}

/// Merge page runs into the final result.
///
/// Records are concatenated in page order, optionally de-duplicated,
/// checked against the running balance (bank statements), then redacted;
/// the summary is computed over the redacted set. `stats` should
/// carry `total_pages` and the durations; page counters are filled in here.
///
/// # Errors
/// [`Pdf2TxnError::AllPagesFailed`] when no page parsed.
pub fn assemble_result(
    document: DocumentInfo,
    runs: Vec<PageRun>,
    config: &ExtractionConfig,
    mut stats: ExtractionStats,
) -> Result<ExtractionResult, Pdf2TxnError> {
    let processed = runs.iter().filter(|r| r.outcome.is_success()).count();
    if processed == 0 {
        let first_error = runs
            .iter()
            .find_map(|r| r.outcome.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no pages were processed".to_string());
        return Err(Pdf2TxnError::AllPagesFailed {
            total: runs.len(),
            first_error,
        });
    }

    stats.processed_pages = processed;
    stats.failed_pages = runs.iter().filter(|r| r.outcome.is_failure()).count();
    stats.skipped_pages = runs.iter().filter(|r| r.outcome.is_skipped()).count();

    let mut pages = Vec::with_capacity(runs.len());
    let mut extractions = Vec::with_capacity(processed);
    for run in runs {
        if run.outcome.is_success() {
            extractions.push(PageExtraction {
                page_num: run.outcome.page_num,
                records: run.records,
            });
        }
        pages.push(run.outcome);
    }

    let (mut records, duplicates_removed) = aggregate(extractions, config.deduplicates());
    stats.duplicates_removed = duplicates_removed;
    if config.reconciles_balances() {
        stats.balance_corrections = reconcile_balances(&mut records, DateOrder::Unknown);
        if stats.balance_corrections > 0 {
            info!(
                "Flipped {} row(s) to match the running balance",
                stats.balance_corrections
            );
        }
    }
    redact_records(&mut records, &config.redaction);
    let summary = summarize(&records);

    info!(
        "Extraction complete: {} records from {}/{} pages ({} failed, {} skipped)",
        summary.record_count,
        stats.processed_pages,
        pages.len(),
        stats.failed_pages,
        stats.skipped_pages
    );

    Ok(ExtractionResult {
        document,
        document_kind: config.document_kind,
        records,
        pages,
        summary,
        stats,
    })
}
