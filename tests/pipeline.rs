//! Post-render pipeline tests: prepared pages → model → records → export.
//!
//! Providers are scripted, so these run without PDFium or network access.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use pdf2txn::pipeline::llm::ModelClient;
use pdf2txn::prompts::{Prompt, PromptContent};
use pdf2txn::{
    assemble_result, process_prepared, read_json, write_csv, write_json, Direction, DocumentInfo,
    DocumentKind, ExtractionConfig, ExtractionProgressCallback, ExtractionStats, PageError,
    Pdf2TxnError, PreparedPage, ProviderError, RedactionPolicy, SensitiveField, SubmitOptions,
    VisionProvider,
};
use rust_decimal_macros::dec;
use edgequake_llm::ImageData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

type Script = dyn Fn(&str) -> (u64, Result<String, ProviderError>) + Send + Sync;

/// Replies based on the prompt text, after an optional delay.
struct Mock {
    name: &'static str,
    calls: AtomicUsize,
    script: Box<Script>,
}

impl Mock {
    fn new(
        name: &'static str,
        script: impl Fn(&str) -> (u64, Result<String, ProviderError>) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
            script: Box::new(script),
        })
    }
}

#[async_trait]
impl VisionProvider for Mock {
    fn name(&self) -> &str {
        self.name
    }

    async fn submit(
        &self,
        prompt: &Prompt,
        _options: &SubmitOptions,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay_ms, reply) = (self.script)(prompt.text.as_str());
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        reply
    }
}

fn chain(mocks: &[&Arc<Mock>]) -> Vec<Arc<dyn VisionProvider>> {
    mocks
        .iter()
        .map(|m| Arc::clone(*m) as Arc<dyn VisionProvider>)
        .collect()
}

fn table_page(page_num: usize) -> PreparedPage {
    PreparedPage {
        page_num,
        content: Ok(PromptContent::TableText(format!(
            "Date | Narration | Amount\nPAGE-{page_num}"
        ))),
    }
}

/// Schema detection is off so call counts only cover extraction prompts.
fn config() -> pdf2txn::ExtractionConfigBuilder {
    ExtractionConfig::builder()
        .document_kind(DocumentKind::Bank)
        .concurrency(3)
        .retry_backoff_ms(1)
        .detect_schema(false)
}

const PAGE_1: &str = r#"[{"dt":"02-01-2024","desc":"UPI/SWIGGY/1234","ref":null,"dr":450.00,"cr":0,"bal":12550.00,"type":"W"},
 {"dt":"05-01-2024","desc":"SALARY JAN","ref":"NEFT991","dr":0,"cr":85000.00,"bal":97550.00,"type":"D"}]"#;
const PAGE_2: &str = r#"Here are the rows:
```json
[{"dt":"05-01-2024","desc":"SALARY JAN","ref":"NEFT991","dr":0,"cr":85000.00,"bal":97550.00,"type":"D"},
 {"dt":"09-01-2024","desc":"ATM CASH 123456789012","ref":"ATM77","dr":2000.00,"cr":0,"bal":95550.00,"type":"W"}]
```"#;
const PAGE_3: &str = r#"[{"dt":"15-01-2024","desc":"INTEREST CREDIT","ref":null,"dr":0,"cr":12.50,"bal":95562.50,"type":"D"}]"#;

/// Page 1 answers last so completion order differs from page order.
fn statement_mock() -> Arc<Mock> {
    Mock::new("statement", |text| {
        if text.contains("PAGE-1") {
            (40, Ok(PAGE_1.to_string()))
        } else if text.contains("PAGE-2") {
            (10, Ok(PAGE_2.to_string()))
        } else if text.contains("PAGE-3") {
            (0, Ok(PAGE_3.to_string()))
        } else {
            (0, Err(ProviderError::Rejected("unexpected page".into())))
        }
    })
}

async fn run_pages(
    providers: Vec<Arc<dyn VisionProvider>>,
    pages: Vec<PreparedPage>,
    config: &ExtractionConfig,
) -> Result<pdf2txn::ExtractionResult, Pdf2TxnError> {
    let client = ModelClient::new(providers, config);
    let page_count = pages.len();
    let runs = process_prepared(&client, pages, config).await;
    assemble_result(
        DocumentInfo::new("statement.pdf", page_count),
        runs,
        config,
        ExtractionStats {
            total_pages: page_count,
            ..ExtractionStats::default()
        },
    )
}

// ── Ordering, totals, de-duplication ─────────────────────────────────────────

#[tokio::test]
async fn records_follow_page_order_and_sum_up() {
    let mock = statement_mock();
    let config = config().redaction(RedactionPolicy::none()).build().unwrap();
    let pages = vec![table_page(1), table_page(2), table_page(3)];

    let result = run_pages(chain(&[&mock]), pages, &config).await.unwrap();

    let pages_of: Vec<usize> = result.records.iter().map(|r| r.page).collect();
    assert_eq!(pages_of, vec![1, 1, 2, 2, 3]);
    assert_eq!(result.records[0].description, "UPI/SWIGGY/1234");
    assert_eq!(result.records[0].direction, Direction::Debit);
    assert_eq!(result.records[1].direction, Direction::Credit);

    let s = &result.summary;
    assert_eq!(s.record_count, 5);
    assert_eq!(s.total_debits, dec!(2450.00));
    assert_eq!(s.total_credits, dec!(170012.50));
    assert_eq!(s.net, dec!(167562.50));
    assert_eq!(result.stats.processed_pages, 3);
    assert_eq!(result.stats.duplicates_removed, 0);
    assert!(result.pages.iter().all(|p| p.provider.as_deref() == Some("statement")));
}

#[tokio::test]
async fn dedupe_drops_reprinted_rows() {
    let mock = statement_mock();
    let config = config().deduplicate(true).build().unwrap();
    let pages = vec![table_page(1), table_page(2), table_page(3)];

    let result = run_pages(chain(&[&mock]), pages, &config).await.unwrap();

    assert_eq!(result.records.len(), 4);
    assert_eq!(result.stats.duplicates_removed, 1);
    assert_eq!(result.summary.total_credits, dec!(85012.50));
    // The first occurrence (page 1) is kept.
    let salary: Vec<usize> = result
        .records
        .iter()
        .filter(|r| r.description == "SALARY JAN")
        .map(|r| r.page)
        .collect();
    assert_eq!(salary, vec![1]);
}

// ── Column schema and running balance ────────────────────────────────────────

const SCHEMA_QUESTION: &str = "Reorder this JSON schema";
const CREDIT_FIRST_REPLY: &str = r#"[{"dt":"DD-MM-YYYY","desc":"DESCRIPTION","ref":null,"cr":0.00,"dr":0.00,"bal":0.00,"type":"W"}]
Date_Order: ASCENDING"#;

#[tokio::test]
async fn detected_column_order_reaches_every_page_prompt() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let log = Arc::clone(&seen);
    let mock = Mock::new("primary", move |text| {
        log.lock().unwrap().push(text.to_string());
        if text.contains(SCHEMA_QUESTION) {
            (0, Ok(CREDIT_FIRST_REPLY.to_string()))
        } else if text.contains("PAGE-2") {
            (0, Ok(r#"{"transactions":[]}"#.to_string()))
        } else {
            (0, Ok(PAGE_3.to_string()))
        }
    });
    let config = config().detect_schema(true).build().unwrap();
    let pages = vec![
        PreparedPage {
            page_num: 1,
            content: Err(PageError::NoContent {
                page: 1,
                detail: "no transaction table detected".into(),
            }),
        },
        table_page(2),
        table_page(3),
    ];

    let result = run_pages(chain(&[&mock]), pages, &config).await.unwrap();
    assert_eq!(result.records.len(), 1);

    let prompts = seen.lock().unwrap().clone();
    assert_eq!(prompts.len(), 3);
    // The first page with content is the one asked about its columns.
    assert!(prompts[0].contains(SCHEMA_QUESTION));
    assert!(prompts[0].contains("PAGE-2"));
    for prompt in &prompts[1..] {
        assert!(prompt.contains(r#""cr":0.00,"dr":0.00"#), "{prompt}");
        assert!(prompt.contains("oldest first"), "{prompt}");
        assert!(prompt.contains(r#"{"transactions": ["#), "{prompt}");
    }
}

#[tokio::test]
async fn failed_schema_detection_keeps_debit_first_prompts() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let log = Arc::clone(&seen);
    let mock = Mock::new("primary", move |text| {
        log.lock().unwrap().push(text.to_string());
        if text.contains(SCHEMA_QUESTION) {
            (0, Ok("I can't tell the column order.".to_string()))
        } else {
            (0, Ok(PAGE_3.to_string()))
        }
    });
    let config = config().detect_schema(true).build().unwrap();

    let result = run_pages(chain(&[&mock]), vec![table_page(1)], &config)
        .await
        .unwrap();

    assert_eq!(result.records.len(), 1);
    let prompts = seen.lock().unwrap().clone();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains(r#""dr":0.00,"cr":0.00"#));
}

#[tokio::test]
async fn table_check_answers_are_reused_after_schema_detection() {
    let checks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&checks);
    let mock = Mock::new("primary", move |text| {
        if text.contains("YES or NO") {
            // Only the first page is a transaction table.
            let n = counter.fetch_add(1, Ordering::SeqCst);
            (0, Ok(if n == 0 { "YES" } else { "NO" }.to_string()))
        } else if text.contains(SCHEMA_QUESTION) {
            (0, Ok(CREDIT_FIRST_REPLY.to_string()))
        } else {
            (0, Ok(PAGE_3.to_string()))
        }
    });
    let config = config()
        .detect_schema(true)
        .classify_tables(true)
        .concurrency(1)
        .build()
        .unwrap();
    let image_page = |page_num| PreparedPage {
        page_num,
        content: Ok(PromptContent::Image(ImageData::new(
            "QUJD".to_string(),
            "image/png",
        ))),
    };

    let result = run_pages(chain(&[&mock]), vec![image_page(1), image_page(2)], &config)
        .await
        .unwrap();

    // Page 1 is checked once for the schema pass and not again; page 2 once.
    assert_eq!(checks.load(Ordering::SeqCst), 2);
    assert_eq!(mock.calls.load(Ordering::SeqCst), 4);
    assert_eq!(result.stats.processed_pages, 1);
    assert_eq!(result.stats.skipped_pages, 1);
}

/// SALARY is read into the withdrawal column although the balance rose.
const SWAPPED_PAGE: &str = r#"{"transactions":[
 {"dt":"02-01-2024","desc":"UPI/SWIGGY/1234","ref":null,"dr":450.00,"cr":0,"bal":12550.00,"type":"W"},
 {"dt":"05-01-2024","desc":"SALARY JAN","ref":"NEFT991","dr":85000.00,"cr":0,"bal":97550.00,"type":"W"},
 {"dt":"09-01-2024","desc":"ATM CASH","ref":"ATM77","dr":2000.00,"cr":0,"bal":95550.00,"type":"W"}]}"#;

#[tokio::test]
async fn swapped_rows_follow_the_running_balance() {
    let mock = Mock::new("primary", |_| (0, Ok(SWAPPED_PAGE.to_string())));

    let checked = config().build().unwrap();
    let unchecked = config().reconcile_balances(false).build().unwrap();

    let result = run_pages(chain(&[&mock]), vec![table_page(1)], &checked)
        .await
        .unwrap();
    assert_eq!(result.stats.balance_corrections, 1);
    assert_eq!(result.records[1].direction, Direction::Credit);
    assert_eq!(result.summary.total_credits, dec!(85000.00));
    assert_eq!(result.summary.total_debits, dec!(2450.00));

    let result = run_pages(chain(&[&mock]), vec![table_page(1)], &unchecked)
        .await
        .unwrap();
    assert_eq!(result.stats.balance_corrections, 0);
    assert_eq!(result.records[1].direction, Direction::Debit);
}

// ── Provider chain ───────────────────────────────────────────────────────────

#[tokio::test]
async fn rejected_primary_falls_back() {
    let primary = Mock::new("gemini", |_| {
        (0, Err(ProviderError::Rejected("HTTP 401: bad key".into())))
    });
    let fallback = statement_mock();
    let config = config().build().unwrap();

    let result = run_pages(chain(&[&primary, &fallback]), vec![table_page(3)], &config)
        .await
        .unwrap();

    assert_eq!(result.records.len(), 1);
    assert_eq!(result.pages[0].provider.as_deref(), Some("statement"));
    assert_eq!(result.pages[0].attempts, 2);
    assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_errors_retry_once_per_provider() {
    let flaky = Mock::new("groq", |_| {
        (0, Err(ProviderError::Transient("HTTP 503".into())))
    });
    let config = config().build().unwrap();

    let err = run_pages(chain(&[&flaky]), vec![table_page(1)], &config)
        .await
        .unwrap_err();

    assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    match err {
        Pdf2TxnError::AllPagesFailed { total, first_error } => {
            assert_eq!(total, 1);
            assert!(first_error.contains("groq"), "{first_error}");
        }
        other => panic!("unexpected {other:?}"),
    }
}

// ── Partial failures and skips ───────────────────────────────────────────────

#[tokio::test]
async fn unparsable_page_fails_alone() {
    let mock = Mock::new("primary", |text| {
        if text.contains("PAGE-2") {
            (0, Ok("Sorry, I cannot read this page.".to_string()))
        } else {
            (0, Ok(PAGE_3.to_string()))
        }
    });
    let config = config().build().unwrap();
    let pages = vec![table_page(1), table_page(2)];

    let result = run_pages(chain(&[&mock]), pages, &config).await.unwrap();

    assert_eq!(result.stats.processed_pages, 1);
    assert_eq!(result.stats.failed_pages, 1);
    assert!(matches!(
        result.pages[1].error,
        Some(PageError::ParseFailed { page: 2, .. })
    ));
    assert!(matches!(
        result.into_strict(),
        Err(Pdf2TxnError::PartialFailure { failed: 1, total: 2, .. })
    ));
}

#[tokio::test]
async fn pages_without_tables_are_skipped_not_failed() {
    let mock = statement_mock();
    let config = config().build().unwrap();
    let pages = vec![
        table_page(1),
        PreparedPage {
            page_num: 2,
            content: Err(PageError::NoContent {
                page: 2,
                detail: "no transaction table detected".into(),
            }),
        },
    ];

    let result = run_pages(chain(&[&mock]), pages, &config).await.unwrap();

    assert_eq!(result.stats.skipped_pages, 1);
    assert_eq!(result.stats.failed_pages, 0);
    assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
    assert!(result.into_strict().is_ok());
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Events {
    started: AtomicUsize,
    completed: AtomicUsize,
    records: AtomicUsize,
    errors: AtomicUsize,
}

impl ExtractionProgressCallback for Events {
    fn on_page_start(&self, _page_num: usize, _total: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_page_complete(&self, _page_num: usize, _total: usize, record_count: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.records.fetch_add(record_count, Ordering::SeqCst);
    }

    fn on_page_error(&self, _page_num: usize, _total: usize, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_events_fire_per_page() {
    let events = Arc::new(Events::default());
    let mock = Mock::new("primary", |text| {
        if text.contains("PAGE-3") {
            (0, Ok("no json here".to_string()))
        } else if text.contains("PAGE-1") {
            (0, Ok(PAGE_1.to_string()))
        } else {
            (0, Ok(PAGE_3.to_string()))
        }
    });
    let config = config()
        .progress_callback(events.clone() as Arc<dyn ExtractionProgressCallback>)
        .build()
        .unwrap();
    let pages = vec![table_page(1), table_page(2), table_page(3)];

    run_pages(chain(&[&mock]), pages, &config).await.unwrap();

    assert_eq!(events.started.load(Ordering::SeqCst), 3);
    assert_eq!(events.completed.load(Ordering::SeqCst), 2);
    assert_eq!(events.records.load(Ordering::SeqCst), 3);
    assert_eq!(events.errors.load(Ordering::SeqCst), 1);
}

// ── Redaction and export ─────────────────────────────────────────────────────

#[tokio::test]
async fn redacted_values_never_reach_exports() {
    let mock = statement_mock();
    let config = config()
        .redaction(RedactionPolicy {
            fields: vec![SensitiveField::Reference],
            ..RedactionPolicy::default()
        })
        .build()
        .unwrap();
    let pages = vec![table_page(1), table_page(2)];

    let result = run_pages(chain(&[&mock]), pages, &config).await.unwrap();

    let mut csv = Vec::new();
    write_csv(&mut csv, &result.records).unwrap();
    let mut json = Vec::new();
    write_json(&mut json, &result.records).unwrap();

    for output in [String::from_utf8(csv).unwrap(), String::from_utf8(json).unwrap()] {
        assert!(!output.contains("123456789012"));
        assert!(!output.contains("NEFT991"));
        assert!(!output.contains("ATM77"));
        assert!(output.contains("XXXXXXXX9012"));
        assert!(output.contains("UPI/SWIGGY/1234"));
    }
    // Amounts are untouched by redaction.
    assert_eq!(result.summary.total_debits, dec!(2450.00));
}

#[tokio::test]
async fn json_export_reads_back_identical() {
    let mock = statement_mock();
    let config = config().build().unwrap();
    let pages = vec![table_page(1), table_page(2), table_page(3)];
    let result = run_pages(chain(&[&mock]), pages, &config).await.unwrap();

    let mut buf = Vec::new();
    write_json(&mut buf, &result.records).unwrap();
    let back = read_json(buf.as_slice()).unwrap();

    assert_eq!(back, result.records);
}

#[tokio::test]
async fn csv_header_matches_json_key_order() {
    let mock = statement_mock();
    let config = config().build().unwrap();
    let result = run_pages(chain(&[&mock]), vec![table_page(1)], &config)
        .await
        .unwrap();

    let mut csv = Vec::new();
    write_csv(&mut csv, &result.records).unwrap();
    let csv = String::from_utf8(csv).unwrap();
    let header: Vec<&str> = csv.lines().next().unwrap().split(',').collect();

    let json = serde_json::to_string(&result.records[0]).unwrap();
    let mut keys: Vec<(usize, &str)> = header
        .iter()
        .map(|k| (json.find(&format!("\"{k}\":")).unwrap(), *k))
        .collect();
    keys.sort();
    let json_order: Vec<&str> = keys.into_iter().map(|(_, k)| k).collect();

    assert_eq!(header, json_order);
    assert_eq!(header.len(), 8);
}
