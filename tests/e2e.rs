//! End-to-end tests that go through PDFium.
//!
//! Statements are generated in-process (see `common`), a password-protected
//! one included, so the only external requirement for most tests is a
//! loadable pdfium library. Tests that need
//! real statements or live model APIs are additionally gated behind the
//! `E2E_ENABLED` environment variable and files in `./test_cases/`.
//!
//! Run with:
//!   PDFIUM_LIB_PATH=/path/to/libpdfium.so cargo test --test e2e -- --nocapture
//!
//! Live provider tests:
//!   E2E_ENABLED=1 GEMINI_API_KEY=... GROQ_API_KEY=... cargo test --test e2e live_ -- --nocapture

mod common;

use async_trait::async_trait;
use common::{bank_statement_page, build_encrypted_pdf, build_pdf, terms_page};
use pdf2txn::pipeline::engine::bind_pdfium;
use pdf2txn::pipeline::input::InputDocument;
use pdf2txn::pipeline::loader::load_document;
use pdf2txn::pipeline::render::{render_pages, RenderSettings};
use pdf2txn::prompts::Prompt;
use pdf2txn::{
    extract, extract_from_bytes, inspect, Direction, DocumentKind, ExtractionConfig, PageError,
    PageSelection, Pdf2TxnError, ProviderError, ProviderSpec, RedactionPolicy, RenderMode,
    SubmitOptions, VisionProvider,
};
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test when no pdfium library can be bound.
macro_rules! skip_without_pdfium {
    () => {{
        let bound = tokio::task::spawn_blocking(|| bind_pdfium().map(|_| ()))
            .await
            .unwrap();
        if let Err(e) = bound {
            println!("SKIP — pdfium not available: {e}");
            return;
        }
    }};
}

/// Skip this test if E2E_ENABLED is not set *or* no file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn statement_pdf() -> Vec<u8> {
    build_pdf(&[bank_statement_page(), terms_page()])
}

const STATEMENT_PASSWORD: &str = "JOHN1985";

fn protected_statement_pdf() -> Vec<u8> {
    build_encrypted_pdf(&[bank_statement_page(), terms_page()], STATEMENT_PASSWORD)
}

async fn open_with(
    bytes: Vec<u8>,
    password: Option<&str>,
) -> Result<pdf2txn::pipeline::loader::Document, Pdf2TxnError> {
    let input = InputDocument::from_bytes("protected.pdf", bytes).unwrap();
    load_document(input, password.map(str::to_string)).await
}

async fn open(bytes: Vec<u8>) -> Arc<pdf2txn::pipeline::loader::Document> {
    let input = InputDocument::from_bytes("statement.pdf", bytes).unwrap();
    Arc::new(load_document(input, None).await.unwrap())
}

fn table_text_settings() -> RenderSettings {
    let config = ExtractionConfig::builder()
        .render_mode(RenderMode::TableText)
        .build()
        .unwrap();
    RenderSettings::from_config(&config)
}

/// Answers table-text prompts for the generated statement; anything else is
/// rejected so a wrongly prepared page shows up as a failure.
struct TableEcho;

#[async_trait]
impl VisionProvider for TableEcho {
    fn name(&self) -> &str {
        "table-echo"
    }

    async fn submit(
        &self,
        prompt: &Prompt,
        _options: &SubmitOptions,
    ) -> Result<String, ProviderError> {
        if prompt.has_image() {
            return Err(ProviderError::Rejected("expected table text".into()));
        }
        if !prompt.text.contains("SALARY JAN") {
            return Err(ProviderError::Rejected("table rows missing".into()));
        }
        Ok(r#"[{"dt":"02/01/2024","desc":"UPI/SWIGGY/1234","dr":"450.00","cr":"","bal":"12,550.00"},
{"dt":"05/01/2024","desc":"SALARY JAN","dr":"","cr":"85,000.00","bal":"97,550.00"},
{"dt":"09/01/2024","desc":"ATM CASH","dr":"2,000.00","cr":"","bal":"95,550.00"}]"#
            .to_string())
    }
}

fn echo_config(pages: PageSelection) -> ExtractionConfig {
    ExtractionConfig::builder()
        .document_kind(DocumentKind::Bank)
        .render_mode(RenderMode::TableText)
        .provider(ProviderSpec::Custom(Arc::new(TableEcho)))
        .redaction(RedactionPolicy::none())
        .retry_backoff_ms(1)
        .pages(pages)
        .build()
        .unwrap()
}

// ── Loading ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn generated_statement_loads() {
    skip_without_pdfium!();

    let doc = open(statement_pdf()).await;
    assert_eq!(doc.page_count(), 2);
    assert!(!doc.info.password_protected);
    assert_eq!(doc.info.name, "statement.pdf");
}

#[tokio::test]
async fn inspect_reads_file_metadata() {
    skip_without_pdfium!();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("statement.pdf");
    std::fs::write(&path, statement_pdf()).unwrap();

    let info = inspect(path.to_string_lossy(), None).await.unwrap();
    assert_eq!(info.page_count, 2);
    assert!(!info.password_protected);
}

#[tokio::test]
async fn non_pdf_bytes_are_rejected_before_pdfium() {
    let err = InputDocument::from_bytes("notes.txt", b"hello, world".to_vec()).unwrap_err();
    assert!(matches!(err, Pdf2TxnError::NotAPdf { .. }), "got {err:?}");
}

#[tokio::test]
async fn truncated_pdf_is_corrupt() {
    skip_without_pdfium!();

    let mut bytes = statement_pdf();
    bytes.truncate(40);
    let input = InputDocument::from_bytes("broken.pdf", bytes).unwrap();
    let err = load_document(input, None).await.unwrap_err();
    assert!(
        matches!(err, Pdf2TxnError::CorruptDocument { .. }),
        "got {err:?}"
    );
}

// ── Table detection ──────────────────────────────────────────────────────────

#[tokio::test]
async fn table_text_holds_statement_rows() {
    skip_without_pdfium!();

    let doc = open(statement_pdf()).await;
    let rendered = render_pages(doc, table_text_settings(), &[0]).await.unwrap();
    assert_eq!(rendered.len(), 1);

    let (idx, page) = &rendered[0];
    assert_eq!(*idx, 0);
    let text = page.as_ref().unwrap().table_text.clone().unwrap();
    for expected in ["SWIGGY", "SALARY JAN", "85,000.00", "ATM CASH"] {
        assert!(text.contains(expected), "missing {expected:?} in:\n{text}");
    }
    assert!(
        !text.contains("STATEMENT OF ACCOUNT"),
        "header block leaked into table:\n{text}"
    );
}

#[tokio::test]
async fn page_without_table_has_no_content() {
    skip_without_pdfium!();

    let doc = open(statement_pdf()).await;
    let rendered = render_pages(doc, table_text_settings(), &[1]).await.unwrap();
    assert!(matches!(
        rendered[0].1,
        Err(PageError::NoContent { page: 2, .. })
    ));
}

#[tokio::test]
async fn page_image_renders_at_requested_dpi() {
    skip_without_pdfium!();

    let doc = open(statement_pdf()).await;
    let config = ExtractionConfig::builder().dpi(72).build().unwrap();
    let rendered = render_pages(doc, RenderSettings::from_config(&config), &[0])
        .await
        .unwrap();
    let image = rendered[0].1.as_ref().unwrap().image.clone().unwrap();
    // A4 at 72 dpi is 595 x 842 points.
    assert!((594..=596).contains(&image.width()), "width {}", image.width());
    assert!((841..=843).contains(&image.height()), "height {}", image.height());
}

// ── Full runs with a scripted provider ───────────────────────────────────────

#[tokio::test]
async fn full_run_extracts_and_skips_terms_page() {
    skip_without_pdfium!();

    let config = echo_config(PageSelection::All);
    let result = extract_from_bytes("statement.pdf", statement_pdf(), &config)
        .await
        .unwrap();

    assert_eq!(result.records.len(), 3);
    assert_eq!(result.records[1].description, "SALARY JAN");
    assert_eq!(result.records[1].direction, Direction::Credit);
    assert_eq!(result.records[1].amount, Some(dec!(85000.00)));
    assert_eq!(result.records[0].date.to_string(), "2024-01-02");

    assert_eq!(result.summary.total_debits, dec!(2450.00));
    assert_eq!(result.summary.total_credits, dec!(85000.00));

    assert_eq!(result.stats.total_pages, 2);
    assert_eq!(result.stats.processed_pages, 1);
    assert_eq!(result.stats.skipped_pages, 1);
    assert_eq!(result.failed_pages().count(), 0);
}

#[tokio::test]
async fn out_of_range_selection_fails_before_model() {
    skip_without_pdfium!();

    let config = echo_config(PageSelection::Single(9));
    let err = extract_from_bytes("statement.pdf", statement_pdf(), &config)
        .await
        .unwrap_err();
    assert!(
        matches!(err, Pdf2TxnError::PageOutOfRange { page: 9, total: 2 }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn only_terms_page_selected_means_nothing_extracted() {
    skip_without_pdfium!();

    let config = echo_config(PageSelection::Single(2));
    let err = extract_from_bytes("statement.pdf", statement_pdf(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2TxnError::AllPagesFailed { .. }), "got {err:?}");
}

#[tokio::test]
async fn missing_provider_fails_fast() {
    let config = ExtractionConfig::builder().build().unwrap();
    let err = extract_from_bytes("statement.pdf", statement_pdf(), &config)
        .await
        .unwrap_err();
    assert!(
        matches!(err, Pdf2TxnError::ProviderNotConfigured { .. }),
        "got {err:?}"
    );
}

// ── Password-protected statements ────────────────────────────────────────────

#[test]
fn protected_fixture_hides_its_rows() {
    let bytes = protected_statement_pdf();
    assert!(bytes.starts_with(b"%PDF-"));
    assert!(bytes.windows(8).any(|w| w == b"/Encrypt"));
    assert!(!bytes.windows(10).any(|w| w == b"SALARY JAN"));
}

#[tokio::test]
async fn protected_statement_without_password_is_refused() {
    skip_without_pdfium!();

    let err = open_with(protected_statement_pdf(), None).await.unwrap_err();
    assert!(
        matches!(err, Pdf2TxnError::PasswordRequired { ref name } if name == "protected.pdf"),
        "got {err:?}"
    );
    assert!(err.is_decryption());

    // An empty password counts as none.
    let err = open_with(protected_statement_pdf(), Some("")).await.unwrap_err();
    assert!(matches!(err, Pdf2TxnError::PasswordRequired { .. }), "got {err:?}");
}

#[tokio::test]
async fn protected_statement_with_wrong_password_is_refused() {
    skip_without_pdfium!();

    let err = open_with(protected_statement_pdf(), Some("not-the-password"))
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2TxnError::WrongPassword { .. }), "got {err:?}");
}

#[tokio::test]
async fn protected_statement_opens_with_password() {
    skip_without_pdfium!();

    let doc = open_with(protected_statement_pdf(), Some(STATEMENT_PASSWORD))
        .await
        .unwrap();
    assert!(doc.info.password_protected);
    assert_eq!(doc.page_count(), 2);

    // Unprotected files never report protection, password or not.
    let plain = open_with(statement_pdf(), Some(STATEMENT_PASSWORD))
        .await
        .unwrap();
    assert!(!plain.info.password_protected);
}

#[tokio::test]
async fn protected_statement_extracts_with_password() {
    skip_without_pdfium!();

    let config = ExtractionConfig::builder()
        .document_kind(DocumentKind::Bank)
        .render_mode(RenderMode::TableText)
        .provider(ProviderSpec::Custom(Arc::new(TableEcho)))
        .password(STATEMENT_PASSWORD)
        .retry_backoff_ms(1)
        .build()
        .unwrap();
    let result = extract_from_bytes("protected.pdf", protected_statement_pdf(), &config)
        .await
        .unwrap();

    assert!(result.document.password_protected);
    assert_eq!(result.records.len(), 3);
    assert_eq!(result.summary.total_credits, dec!(85000.00));
}

// ── Live models (E2E_ENABLED) ────────────────────────────────────────────────

#[tokio::test]
async fn live_gemini_bank_statement() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("bank_statement.pdf"));
    let Ok(key) = std::env::var("GEMINI_API_KEY") else {
        println!("SKIP — GEMINI_API_KEY not set");
        return;
    };

    let config = ExtractionConfig::builder()
        .document_kind(DocumentKind::Bank)
        .provider(ProviderSpec::Gemini {
            api_key: key,
            model: None,
        })
        .pages(PageSelection::Single(1))
        .build()
        .unwrap();

    let result = extract(path.to_string_lossy(), &config).await.unwrap();
    println!(
        "gemini: {} records in {}ms",
        result.records.len(),
        result.stats.total_duration_ms
    );
    assert!(!result.records.is_empty());
    for r in &result.records {
        if let Some(amount) = r.amount {
            assert!(amount >= dec!(0), "amount must be absolute: {amount}");
        }
    }
}

#[tokio::test]
async fn live_groq_table_text_credit_card() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("credit_card.pdf"));
    let Ok(key) = std::env::var("GROQ_API_KEY") else {
        println!("SKIP — GROQ_API_KEY not set");
        return;
    };

    let config = ExtractionConfig::builder()
        .document_kind(DocumentKind::CreditCard)
        .render_mode(RenderMode::TableText)
        .provider(ProviderSpec::Groq {
            api_key: key,
            model: None,
        })
        .build()
        .unwrap();

    let result = extract(path.to_string_lossy(), &config).await.unwrap();
    println!(
        "groq: {} records, debits {}, credits {}",
        result.records.len(),
        result.summary.total_debits,
        result.summary.total_credits
    );
    assert!(!result.records.is_empty());
}
