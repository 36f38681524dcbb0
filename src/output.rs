//! Result types: normalised transaction records and per-run reports.

use crate::error::{PageError, Pdf2TxnError};
use crate::pipeline::loader::DocumentInfo;
use crate::prompts::DocumentKind;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Money direction from the account holder's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Money out: purchases, withdrawals, fees.
    Debit,
    /// Money in: payments to the card, deposits, refunds.
    Credit,
}

/// One normalised transaction row.
///
/// Field order is the export column order: CSV headers and JSON keys both
/// follow the declaration order below.
///
/// Money fields are serialised as plain numbers, which pass through `f64`
/// in both JSON and CSV exports. Values up to 15 significant digits (any
/// 2-decimal amount below 10^13) are exact; larger values may be rounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// 1-indexed page the row was read from.
    pub page: usize,
    /// Transaction date, always serialised as `YYYY-MM-DD`.
    pub date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    /// Absolute amount, 2 decimal places. `None` when the statement row had
    /// no readable amount.
    pub amount: Option<Decimal>,
    pub direction: Direction,
    /// Running balance after the row, when the statement prints one.
    pub balance: Option<Decimal>,
    pub category: Option<String>,
}

impl TransactionRecord {
    /// Amount with sign: debits negative, credits positive.
    pub fn signed_amount(&self) -> Option<Decimal> {
        self.amount.map(|a| match self.direction {
            Direction::Debit => -a,
            Direction::Credit => a,
        })
    }
}

/// How one page fared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-indexed page number.
    pub page_num: usize,
    pub record_count: usize,
    /// Rows the parser had to drop (no date, no description).
    pub skipped_rows: usize,
    /// Provider that produced the accepted reply.
    pub provider: Option<String>,
    /// Model calls spent on this page, across all providers.
    pub attempts: u32,
    pub duration_ms: u64,
    /// Set when the page contributed no records because it failed or was
    /// skipped.
    pub error: Option<PageError>,
}

impl PageOutcome {
    pub fn failed(page_num: usize, error: PageError) -> Self {
        Self {
            page_num,
            record_count: 0,
            skipped_rows: 0,
            provider: None,
            attempts: 0,
            duration_ms: 0,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Ruled out before extraction: blank, no table, or classified as not a
    /// transaction page. Skips are not failures.
    pub fn is_skipped(&self) -> bool {
        matches!(self.error, Some(PageError::NoContent { .. }))
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some() && !self.is_skipped()
    }
}

/// Document-level totals over the final record set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub record_count: usize,
    pub debit_count: usize,
    pub credit_count: usize,
    pub total_debits: Decimal,
    pub total_credits: Decimal,
    /// `total_credits - total_debits`.
    pub net: Decimal,
    /// Records whose amount was null and therefore left out of the totals.
    pub missing_amounts: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

/// Timing and page counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages in the document.
    pub total_pages: usize,
    /// Selected pages that produced a parse (possibly with zero rows).
    pub processed_pages: usize,
    /// Selected pages that failed.
    pub failed_pages: usize,
    /// Selected pages the table classifier ruled out.
    pub skipped_pages: usize,
    pub duplicates_removed: usize,
    /// Bank rows whose debit/credit direction was flipped to fit the
    /// running balance.
    #[serde(default)]
    pub balance_corrections: usize,
    pub total_duration_ms: u64,
    pub render_duration_ms: u64,
    pub model_duration_ms: u64,
}

/// Everything one extraction produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub document: DocumentInfo,
    pub document_kind: DocumentKind,
    /// Records in page order, redacted per the configured policy.
    pub records: Vec<TransactionRecord>,
    pub pages: Vec<PageOutcome>,
    pub summary: ExtractionSummary,
    pub stats: ExtractionStats,
}

impl ExtractionResult {
    pub fn failed_pages(&self) -> impl Iterator<Item = &PageOutcome> {
        self.pages.iter().filter(|p| p.is_failure())
    }

    /// Turn any page failure into an error.
    pub fn into_strict(self) -> Result<Self, Pdf2TxnError> {
        let failed = self.failed_pages().count();
        if failed > 0 {
            return Err(Pdf2TxnError::PartialFailure {
                success: self.pages.len() - failed,
                failed,
                total: self.pages.len(),
            });
        }
        Ok(self)
    }
}
