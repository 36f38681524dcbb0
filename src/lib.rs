//! # pdf2txn
//!
//! Extract transactions from credit-card and bank statement PDFs using
//! Vision Language Models (VLMs).
//!
//! Statement layouts vary by issuer and rarely survive text extraction: columns
//! interleave, amounts detach from their rows, and scanned statements have no
//! text layer at all. This crate renders each page (or just its transaction
//! table), asks a vision model for structured rows, and normalises the reply
//! into typed [`TransactionRecord`]s ready for CSV or JSON export.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     local file, URL or in-memory bytes
//!  ├─ 2. Load      pdfium open, password handling, metadata
//!  ├─ 3. Prepare   full page, cropped table band, or table text
//!  ├─ 4. Encode    PNG → base64 ImageData
//!  ├─ 5. Model     Gemini / Groq / any edgequake-llm provider, with
//!  │               retry and fallback, bounded concurrency; bank runs read
//!  │               the debit/credit column order from the first table
//!  ├─ 6. Parse     tolerant JSON / table parsing → TransactionRecord
//!  ├─ 7. Merge     page order, optional de-duplication, running-balance
//!  │               check for bank rows
//!  ├─ 8. Redact    mask sensitive fields and account numbers
//!  └─ 9. Output    records + summary + per-page outcomes
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2txn::{export_to_file, extract, providers_from_env, DocumentKind, ExportFormat, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Gemini first, Groq as fallback, from GEMINI_API_KEY / GROQ_API_KEY.
//!     let config = ExtractionConfig::builder()
//!         .document_kind(DocumentKind::CreditCard)
//!         .providers(providers_from_env())
//!         .build()?;
//!     let result = extract("statement.pdf", &config).await?;
//!     export_to_file("statement.csv", &result.records, ExportFormat::Csv).await?;
//!     eprintln!(
//!         "{} records, debits {}, credits {}",
//!         result.summary.record_count, result.summary.total_debits, result.summary.total_credits
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2txn` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2txn = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod providers;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, PageSelection, RenderMode};
pub use error::{ExtractionServiceError, PageError, Pdf2TxnError};
pub use export::{export_records, export_to_file, read_json, write_csv, write_json, ExportFormat};
pub use extract::{
    assemble_result, extract, extract_from_bytes, extract_sync, extract_to_file, inspect,
    process_prepared, PageRun, PreparedPage,
};
pub use output::{
    Direction, ExtractionResult, ExtractionStats, ExtractionSummary, PageOutcome,
    TransactionRecord,
};
pub use pipeline::loader::DocumentInfo;
pub use pipeline::redact::{RedactionPolicy, SensitiveField};
pub use pipeline::schema::{ColumnSchema, DateOrder};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::DocumentKind;
pub use providers::{
    providers_from_env, ProviderError, ProviderSpec, SubmitOptions, VisionProvider,
};
