//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to follow a
//! run page by page, e.g. to drive a terminal progress bar.
//!
//! # Example
//!
//! ```rust
//! use pdf2txn::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct RecordCounter {
//!     records: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for RecordCounter {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, record_count: usize) {
//!         self.records.fetch_add(record_count, Ordering::SeqCst);
//!         eprintln!("Page {}/{}: {} records", page_num, total_pages, record_count);
//!     }
//! }
//!
//! let counter = Arc::new(RecordCounter { records: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction pipeline as it processes each page.
///
/// Pages are sent to the model concurrently, so `on_page_*` methods may be
/// called from several tasks at once and in any page order. All methods
/// default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once, after page selection, with the number of pages to process.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before a page's prompt is submitted.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page reply parsed, with the rows it yielded.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, record_count: usize) {
        let _ = (page_num, total_pages, record_count);
    }

    /// Called when a page was ruled out (blank, no table, classified away).
    fn on_page_skipped(&self, page_num: usize, total_pages: usize, reason: &str) {
        let _ = (page_num, total_pages, reason);
    }

    /// Called when a page failed after the provider chain was exhausted or
    /// its reply could not be parsed.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page has been attempted.
    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// Progress sink that ignores every event.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// The callback type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
