//! CLI binary for pdf2txn.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs the extraction and writes CSV or JSON.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2txn::{
    export_records, export_to_file, extract, inspect, DocumentKind, ExportFormat,
    ExtractionConfig, ExtractionProgressCallback, ExtractionResult, PageSelection,
    ProgressCallback, ProviderSpec, RedactionPolicy, RenderMode, SensitiveField,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn truncate(msg: &str, max: usize) -> String {
    if msg.chars().count() > max {
        let head: String = msg.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        msg.to_string()
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per page. Pages finish out of order
/// when concurrency > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    records: AtomicUsize,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_extraction_start` tells us the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening statement…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            records: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn page_elapsed(&self, page_num: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&page_num)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting transactions from {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(page_num, Instant::now());
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, record_count: usize) {
        self.records.fetch_add(record_count, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<12}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{record_count:>4} records")),
            self.page_elapsed(page_num),
        ));
        self.bar.inc(1);
    }

    fn on_page_skipped(&self, page_num: usize, total: usize, reason: &str) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            yellow("–"),
            page_num,
            total,
            dim(&truncate(reason, 80)),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&truncate(error, 80)),
            self.page_elapsed(page_num),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let records = self.records.load(Ordering::SeqCst);
        let errors = self.errors.load(Ordering::SeqCst);

        if errors == 0 {
            eprintln!(
                "{} {} records from {}/{} pages",
                green("✔"),
                bold(&records.to_string()),
                success_count,
                total_pages
            );
        } else {
            eprintln!(
                "{} {} records from {}/{} pages  ({} failed)",
                if success_count == 0 { red("✘") } else { cyan("⚠") },
                bold(&records.to_string()),
                success_count,
                total_pages,
                red(&errors.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Credit-card statement to CSV on stdout (Gemini, Groq fallback)
  pdf2txn statement.pdf

  # Bank statement to a JSON file
  pdf2txn --kind bank statement.pdf -o transactions.json

  # Password-protected statement, selected pages, with totals
  pdf2txn --password 1234 --pages 2-5 --summary statement.pdf -o out.csv

  # Send only the detected transaction table, as text (no image)
  pdf2txn --mode table-text statement.pdf

  # Hide the account-holder block above the table and mask descriptions
  pdf2txn --mask-header --redact description statement.pdf

  # Any edgequake-llm provider as the only link in the chain
  pdf2txn --provider openai --model gpt-4.1-mini statement.pdf

  # Inspect statement metadata (no API key needed)
  pdf2txn --inspect-only statement.pdf

PROVIDERS:
  gemini   gemini-2.5-flash (default)                 GEMINI_API_KEY
  groq     meta-llama/llama-4-scout-17b-16e-instruct  GROQ_API_KEY
  other    any edgequake-llm provider name (openai, anthropic, ollama, ...),
           model taken from --model; keys read by edgequake-llm

  Without --provider the chain is Gemini then Groq, for whichever keys are set.
  Each provider gets one retry on transient errors before the next is tried.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key
  GROQ_API_KEY            Groq API key
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  PDF2TXN_*               Defaults for most flags (see --help)
  RUST_LOG                Log filter override
"#;

/// Extract transactions from credit-card and bank statement PDFs using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2txn",
    version,
    about = "Extract transactions from statement PDFs using Vision LLMs",
    long_about = "Extract transactions from credit-card and bank statement PDFs (local files or \
URLs) into CSV or JSON using Vision Language Models. Gemini and Groq are supported directly; any \
provider known to edgequake-llm can be added to the chain.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write records to this file instead of stdout.
    #[arg(short, long, env = "PDF2TXN_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format. Default: from the output extension, else csv.
    #[arg(long, env = "PDF2TXN_FORMAT", value_enum)]
    format: Option<FormatArg>,

    /// Statement kind.
    #[arg(long, env = "PDF2TXN_KIND", value_enum, default_value = "credit-card")]
    kind: KindArg,

    /// What each page becomes before it is sent: page, table, table-text.
    #[arg(long, env = "PDF2TXN_MODE", value_enum, default_value = "page")]
    mode: ModeArg,

    /// PDF user password for protected statements.
    #[arg(long, env = "PDF2TXN_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Provider chain, comma separated, first is primary (e.g. gemini,groq).
    #[arg(long, env = "PDF2TXN_PROVIDER", value_delimiter = ',')]
    provider: Vec<String>,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    /// Groq API key.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    groq_api_key: Option<String>,

    /// Gemini model ID.
    #[arg(long, env = "PDF2TXN_GEMINI_MODEL")]
    gemini_model: Option<String>,

    /// Groq model ID.
    #[arg(long, env = "PDF2TXN_GROQ_MODEL")]
    groq_model: Option<String>,

    /// Model ID for other edgequake-llm providers.
    #[arg(long, env = "PDF2TXN_MODEL", default_value = "gpt-4.1-nano")]
    model: String,

    /// Rendering DPI (72–600).
    #[arg(long, env = "PDF2TXN_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Number of concurrent model calls.
    #[arg(short, long, env = "PDF2TXN_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF2TXN_PAGES", default_value = "all")]
    pages: String,

    /// Retries per provider on transient failures.
    #[arg(long, env = "PDF2TXN_MAX_RETRIES", default_value_t = 1)]
    max_retries: u32,

    /// Max model output tokens per page.
    #[arg(long, env = "PDF2TXN_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Model temperature (0.0–2.0).
    #[arg(long, env = "PDF2TXN_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Path to a text file replacing the built-in extraction instructions.
    #[arg(long, env = "PDF2TXN_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Fields to mask outright: description, reference, category.
    #[arg(long, env = "PDF2TXN_REDACT", value_delimiter = ',')]
    redact: Vec<SensitiveField>,

    /// Keep long digit runs (account and card numbers) unmasked.
    #[arg(long, env = "PDF2TXN_NO_MASK_ACCOUNTS")]
    no_mask_accounts: bool,

    /// Drop repeated (date, description, amount, direction) rows.
    /// Defaults to on for credit cards, off for bank statements.
    #[arg(
        long,
        env = "PDF2TXN_DEDUPE",
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    dedupe: Option<bool>,

    /// Bank statements: do not ask the first table for its column order.
    #[arg(long, env = "PDF2TXN_NO_SCHEMA_DETECT")]
    no_schema_detect: bool,

    /// Bank statements: keep debit/credit exactly as the model returned them.
    #[arg(long, env = "PDF2TXN_NO_RECONCILE")]
    no_reconcile: bool,

    /// Ask the model first whether each page holds a transaction table.
    #[arg(long, env = "PDF2TXN_CLASSIFY_TABLES")]
    classify_tables: bool,

    /// White out everything above the transaction table header.
    #[arg(long, env = "PDF2TXN_MASK_HEADER")]
    mask_header: bool,

    /// Send page images in colour instead of grayscale.
    #[arg(long, env = "PDF2TXN_COLOR")]
    color: bool,

    /// Fail if any page fails, even when others produced records.
    #[arg(long, env = "PDF2TXN_STRICT")]
    strict: bool,

    /// Print totals (counts, debits, credits, net) to stderr.
    #[arg(long, env = "PDF2TXN_SUMMARY")]
    summary: bool,

    /// Print the full result (records, pages, summary, stats) as JSON.
    #[arg(long, env = "PDF2TXN_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2TXN_NO_PROGRESS")]
    no_progress: bool,

    /// Print statement metadata only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2TXN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2TXN_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2TXN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "PDF2TXN_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    CreditCard,
    Bank,
}

impl From<KindArg> for DocumentKind {
    fn from(v: KindArg) -> Self {
        match v {
            KindArg::CreditCard => DocumentKind::CreditCard,
            KindArg::Bank => DocumentKind::Bank,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Page,
    Table,
    TableText,
}

impl From<ModeArg> for RenderMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Page => RenderMode::PageImage,
            ModeArg::Table => RenderMode::TableImage,
            ModeArg::TableText => RenderMode::TableText,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Json => ExportFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs would fight with the progress bar; keep them quiet
    // unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.input, cli.password.clone())
            .await
            .context("Failed to inspect statement")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            if let Some(ref t) = info.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = info.author {
                println!("Author:       {}", a);
            }
            println!("Pages:        {}", info.page_count);
            println!("PDF Version:  {}", info.pdf_version);
            println!("Protected:    {}", info.password_protected);
            if let Some(ref p) = info.producer {
                println!("Producer:     {}", p);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run extraction ───────────────────────────────────────────────────
    let mut result = extract(&cli.input, &config)
        .await
        .context("Extraction failed")?;
    if cli.strict {
        result = result.into_strict().context("Extraction incomplete")?;
    }

    let format = cli
        .format
        .map(ExportFormat::from)
        .or_else(|| cli.output.as_deref().and_then(ExportFormat::from_path))
        .unwrap_or_default();

    if let Some(ref output_path) = cli.output {
        export_to_file(output_path, &result.records, format)
            .await
            .context("Failed to write output")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} records  {}ms  →  {}",
                if result.stats.failed_pages == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                result.records.len(),
                result.stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise result")?;
        println!("{json}");
    } else if cli.output.is_none() {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        export_records(&mut handle, &result.records, format)
            .context("Failed to write to stdout")?;
        handle.flush().context("Failed to write to stdout")?;
    }

    if !cli.quiet && !show_progress {
        eprintln!(
            "Extracted {} records from {}/{} pages in {}ms",
            result.records.len(),
            result.stats.processed_pages,
            result.pages.len(),
            result.stats.total_duration_ms
        );
        for page in result.failed_pages() {
            if let Some(ref e) = page.error {
                eprintln!("  {} {}", red("✗"), e);
            }
        }
    }

    if cli.summary {
        print_summary(&result);
    }

    Ok(())
}

fn print_summary(result: &ExtractionResult) {
    let s = &result.summary;
    let range = match (s.first_date, s.last_date) {
        (Some(a), Some(b)) => format!("{a} → {b}"),
        _ => "-".to_string(),
    };
    eprintln!("{}", bold("Summary"));
    eprintln!("  Statement:      {} ({})", result.document.name, result.document_kind);
    eprintln!("  Period:         {}", range);
    eprintln!("  Transactions:   {}", s.record_count);
    eprintln!("  Debits:         {} totalling {}", s.debit_count, s.total_debits);
    eprintln!("  Credits:        {} totalling {}", s.credit_count, s.total_credits);
    eprintln!("  Net:            {}", s.net);
    if s.missing_amounts > 0 {
        eprintln!("  No amount:      {}", yellow(&s.missing_amounts.to_string()));
    }
    if result.stats.duplicates_removed > 0 {
        eprintln!("  Duplicates:     {} removed", result.stats.duplicates_removed);
    }
    if result.stats.balance_corrections > 0 {
        eprintln!(
            "  Balance fixes:  {} row(s) flipped",
            result.stats.balance_corrections
        );
    }
    eprintln!(
        "  Pages:          {} processed, {} skipped, {} failed",
        result.stats.processed_pages, result.stats.skipped_pages, result.stats.failed_pages
    );
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let redaction = RedactionPolicy {
        fields: cli.redact.clone(),
        mask_account_numbers: !cli.no_mask_accounts,
        ..RedactionPolicy::default()
    };

    let mut builder = ExtractionConfig::builder()
        .document_kind(cli.kind.into())
        .render_mode(cli.mode.into())
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .pages(parse_pages(&cli.pages)?)
        .providers(provider_chain(cli)?)
        .max_retries(cli.max_retries)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .redaction(redaction)
        .detect_schema(!cli.no_schema_detect)
        .reconcile_balances(!cli.no_reconcile)
        .classify_tables(cli.classify_tables)
        .mask_header(cli.mask_header)
        .grayscale(!cli.color)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(dedupe) = cli.dedupe {
        builder = builder.deduplicate(dedupe);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Build the provider chain from `--provider` (or the available keys).
fn provider_chain(cli: &Cli) -> Result<Vec<ProviderSpec>> {
    let gemini = || ProviderSpec::Gemini {
        api_key: cli.gemini_api_key.clone().unwrap_or_default(),
        model: cli.gemini_model.clone(),
    };
    let groq = || ProviderSpec::Groq {
        api_key: cli.groq_api_key.clone().unwrap_or_default(),
        model: cli.groq_model.clone(),
    };
    let has_key = |k: &Option<String>| k.as_deref().is_some_and(|k| !k.trim().is_empty());

    if cli.provider.is_empty() {
        let mut chain = Vec::new();
        if has_key(&cli.gemini_api_key) {
            chain.push(gemini());
        }
        if has_key(&cli.groq_api_key) {
            chain.push(groq());
        }
        if chain.is_empty() {
            anyhow::bail!(
                "No vision provider configured.\n\
                 Set GEMINI_API_KEY and/or GROQ_API_KEY, or pass --provider."
            );
        }
        return Ok(chain);
    }

    cli.provider
        .iter()
        .map(|name| {
            let name = name.trim().to_lowercase();
            Ok(match name.as_str() {
                "gemini" => gemini(),
                "groq" => groq(),
                "" => anyhow::bail!("Empty provider name in --provider"),
                _ => ProviderSpec::Llm {
                    provider: name,
                    model: cli.model.clone(),
                },
            })
        })
        .collect()
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }
        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }
        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}
