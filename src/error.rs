//! Error types for the pdf2txn library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2TxnError`] — **Fatal**: the extraction cannot proceed at all
//!   (bad input file, wrong password, no provider configured). Returned as
//!   `Err(Pdf2TxnError)` from the top-level `extract*` functions.
//!
//! * [`PageError`] — **Non-fatal**: a single page failed (no transaction
//!   table, unparseable model reply, every provider down) while the other
//!   pages are fine. Stored inside [`crate::output::PageOutcome`] so callers
//!   get the records of the good pages plus a report of the bad ones.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2txn library.
#[derive(Debug, Error)]
pub enum Pdf2TxnError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("'{name}' is not a PDF statement (first bytes: {magic:?})")]
    NotAPdf { name: String, magic: Vec<u8> },

    // ── Document errors ───────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("Statement '{name}' is corrupt or unreadable: {detail}")]
    CorruptDocument { name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("Statement '{name}' is password-protected.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { name: String },

    /// A password was provided but it does not open the document.
    #[error("Wrong password for statement '{name}'")]
    WrongPassword { name: String },

    /// The page selection does not hit a single page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Provider errors ───────────────────────────────────────────────────
    /// A provider in the chain cannot be constructed (missing API key etc.).
    #[error("Vision provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every selected page failed; the result would be empty.
    #[error("All {total} pages failed.\nFirst error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    /// Some pages produced records but at least one failed.
    ///
    /// Returned by [`crate::output::ExtractionResult::into_strict`] when the
    /// caller wants any page failure to be an error.
    #[error("{failed}/{total} pages failed during extraction")]
    PartialFailure {
        success: usize,
        failed: usize,
        total: usize,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialising records to CSV/JSON failed.
    #[error("{format} export failed: {detail}")]
    Export { format: String, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory),\n\
or install libpdfium where the system loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2TxnError {
    /// True for the two decryption failures: missing or wrong password.
    pub fn is_decryption(&self) -> bool {
        matches!(
            self,
            Pdf2TxnError::PasswordRequired { .. } | Pdf2TxnError::WrongPassword { .. }
        )
    }
}

/// Every provider in the chain failed for one page.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{providers} provider(s) failed after {attempts} attempt(s); last ({last_provider}): {detail}")]
pub struct ExtractionServiceError {
    pub providers: usize,
    pub attempts: u32,
    pub last_provider: String,
    pub detail: String,
}

/// A non-fatal error for a single page.
///
/// The overall extraction continues unless ALL pages fail.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PageError {
    /// Page rasterisation or text extraction failed.
    #[error("Page {page}: rendering failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The page has nothing to send: blank, or no transaction table found.
    #[error("Page {page}: no extractable content: {detail}")]
    NoContent { page: usize, detail: String },

    /// All vision providers failed.
    #[error("Page {page}: extraction service failed: {error}")]
    ExtractionService {
        page: usize,
        error: ExtractionServiceError,
    },

    /// The model replied but no structured transaction data was found.
    #[error("Page {page}: could not parse model reply: {detail}")]
    ParseFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-indexed page the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::NoContent { page, .. }
            | PageError::ExtractionService { page, .. }
            | PageError::ParseFailed { page, .. } => *page,
        }
    }
}
