//! Merge per-page records into one document-ordered list and total it.

use crate::output::{Direction, ExtractionSummary, TransactionRecord};
use std::collections::HashSet;
use tracing::debug;

/// Records parsed from one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageExtraction {
    /// 1-indexed page number.
    pub page_num: usize,
    pub records: Vec<TransactionRecord>,
}

/// Concatenate pages in page order, keeping row order within each page.
///
/// Returns the records and how many duplicates were dropped.
pub fn aggregate(mut pages: Vec<PageExtraction>, deduplicate: bool) -> (Vec<TransactionRecord>, usize) {
    pages.sort_by_key(|p| p.page_num);
    let records: Vec<TransactionRecord> = pages.into_iter().flat_map(|p| p.records).collect();

    if deduplicate {
        dedupe(records)
    } else {
        (records, 0)
    }
}

/// Drop rows repeating an earlier (date, description, amount, direction).
///
/// Statements often reprint the last rows of a page at the top of the
/// next; the first occurrence wins.
pub fn dedupe(records: Vec<TransactionRecord>) -> (Vec<TransactionRecord>, usize) {
    let before = records.len();
    let mut seen = HashSet::new();
    let kept: Vec<TransactionRecord> = records
        .into_iter()
        .filter(|r| {
            seen.insert((
                r.date,
                r.description.to_lowercase(),
                r.amount,
                r.direction,
            ))
        })
        .collect();

    let removed = before - kept.len();
    if removed > 0 {
        debug!("Removed {} duplicate records", removed);
    }
    (kept, removed)
}

/// Totals over a final record set. Null amounts are counted, not summed.
pub fn summarize(records: &[TransactionRecord]) -> ExtractionSummary {
    let mut summary = ExtractionSummary {
        record_count: records.len(),
        ..ExtractionSummary::default()
    };

    for r in records {
        match r.direction {
            Direction::Debit => summary.debit_count += 1,
            Direction::Credit => summary.credit_count += 1,
        }
        match (r.amount, r.direction) {
            (None, _) => summary.missing_amounts += 1,
            (Some(a), Direction::Debit) => summary.total_debits += a,
            (Some(a), Direction::Credit) => summary.total_credits += a,
        }
    }
    summary.net = summary.total_credits - summary.total_debits;
    summary.first_date = records.iter().map(|r| r.date).min();
    summary.last_date = records.iter().map(|r| r.date).max();
    summary
}
