//! Text-layer layout analysis: find the transaction table on a page.
//!
//! pdfium hands us positioned text segments. We bucket them into visual
//! lines, then look for a table header ("Date ... Amount") followed by rows
//! that carry a date and a money amount. The detected region drives header
//! masking, table cropping and the text-only render mode.
//!
//! All coordinates are PDF points measured from the top of the page.

use once_cell::sync::Lazy;
use regex::Regex;

/// Lines whose tops are this close (points) are one visual line.
pub const LINE_TOLERANCE: f32 = 6.0;

/// A header needs this many transaction rows among the lines after it.
const MIN_CONFIRMING_ROWS: usize = 2;
/// How many lines after a header are searched for confirming rows.
const CONFIRM_WINDOW: usize = 10;

const COLUMN_KEYWORDS: &[&str] = &[
    "transaction",
    "txn",
    "description",
    "details",
    "narration",
    "amount",
    "debit",
    "credit",
    "balance",
    "withdrawal",
    "deposit",
    "particulars",
];

const SUMMARY_BLACKLIST: &[&str] = &[
    "summary",
    "minimum amount",
    "payment due",
    "credit limit",
    "available credit",
    "statement date",
    "account details",
    "transaction period",
];

pub static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        \b(?:\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4} | \d{4}[/\-.]\d{1,2}[/\-.]\d{1,2})\b
        |
        \b\d{1,2}(?:st|nd|rd|th)?[\s\-]?
          (?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*
          [\s\-,]{0,2}\d{2,4}\b
        ",
    )
    .unwrap()
});

/// Money amounts need exactly two decimals so page numbers and reference
/// digits are not mistaken for amounts.
pub static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        (?:INR|Rs\.?|₹|\$)?\s*
        [-+]?
        (?:\d{1,3}(?:,\d{2,3})+|\d+)
        \.\d{2}\b
        (?:\s*(?:Cr|Dr|CR|DR))?
        ",
    )
    .unwrap()
});

/// One positioned text run.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub x: f32,
    pub top: f32,
    pub bottom: f32,
    pub text: String,
}

/// Fragments sharing a baseline, left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub top: f32,
    pub bottom: f32,
    pub cells: Vec<String>,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.cells.join(" ")
    }
}

/// Vertical extent of the transaction table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableRegion {
    pub header_index: usize,
    pub last_row_index: usize,
    /// Top of the header line.
    pub top: f32,
    /// Bottom of the last transaction row.
    pub bottom: f32,
}

/// Bucket fragments into lines, top to bottom.
pub fn merge_into_lines(mut fragments: Vec<TextFragment>, tolerance: f32) -> Vec<TextLine> {
    fragments.retain(|f| !f.text.trim().is_empty());
    fragments.sort_by(|a, b| a.top.total_cmp(&b.top).then(a.x.total_cmp(&b.x)));

    let mut grouped: Vec<(f32, f32, Vec<TextFragment>)> = Vec::new();
    for frag in fragments {
        match grouped.last_mut() {
            Some((top, bottom, members)) if (frag.top - *top).abs() <= tolerance => {
                *bottom = bottom.max(frag.bottom);
                members.push(frag);
            }
            _ => grouped.push((frag.top, frag.bottom, vec![frag])),
        }
    }

    grouped
        .into_iter()
        .map(|(top, bottom, mut members)| {
            members.sort_by(|a, b| a.x.total_cmp(&b.x));
            TextLine {
                top,
                bottom,
                cells: members.into_iter().map(|m| m.text.trim().to_string()).collect(),
            }
        })
        .collect()
}

pub fn has_date(text: &str) -> bool {
    DATE_RE.is_match(text)
}

/// True when the text carries an amount outside of any date.
pub fn has_amount(text: &str) -> bool {
    let without_dates = DATE_RE.replace_all(text, " ");
    AMOUNT_RE.is_match(&without_dates)
}

fn is_blacklisted(lower: &str) -> bool {
    SUMMARY_BLACKLIST.iter().any(|b| lower.contains(b))
}

/// "Date" plus at least one column keyword, and not a summary box.
pub fn is_header_line(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("date")
        && COLUMN_KEYWORDS.iter().any(|k| lower.contains(k))
        && !is_blacklisted(&lower)
}

/// A row with its own date and amount, or an amount whose date sits on
/// one of the two lines above (wrapped descriptions).
pub fn is_transaction_line(lines: &[TextLine], index: usize) -> bool {
    let Some(line) = lines.get(index) else {
        return false;
    };
    let text = line.text();
    if !has_amount(&text) {
        return false;
    }
    if has_date(&text) {
        return true;
    }
    (index.saturating_sub(2)..index).any(|i| has_date(&lines[i].text()))
}

fn confirming_rows(lines: &[TextLine], after: usize) -> usize {
    let end = (after + 1 + CONFIRM_WINDOW).min(lines.len());
    (after + 1..end)
        .filter(|&i| is_transaction_line(lines, i))
        .count()
}

/// Header split over three stacked lines ("Transaction" / "Date" / "Amount").
fn is_stacked_header(lines: &[TextLine], index: usize) -> bool {
    if index + 2 >= lines.len() {
        return false;
    }
    let joined = lines[index..index + 3]
        .iter()
        .map(|l| l.text().to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    joined.contains("date")
        && (joined.contains("transaction") || joined.contains("description"))
        && joined.contains("amount")
        && !is_blacklisted(&joined)
}

/// Locate the first confirmed transaction table on the page.
pub fn detect_table_region(lines: &[TextLine]) -> Option<TableRegion> {
    for i in 0..lines.len() {
        let header_end = if is_header_line(&lines[i].text()) {
            i
        } else if is_stacked_header(lines, i) {
            i + 2
        } else {
            continue;
        };

        if confirming_rows(lines, header_end) < MIN_CONFIRMING_ROWS {
            continue;
        }

        let last_row_index = (header_end + 1..lines.len())
            .filter(|&j| is_transaction_line(lines, j))
            .last()
            .unwrap_or(header_end);

        return Some(TableRegion {
            header_index: i,
            last_row_index,
            top: lines[i].top,
            bottom: lines[last_row_index].bottom,
        });
    }
    None
}

/// Cells of every line from the header through the last row.
pub fn table_grid(lines: &[TextLine], region: &TableRegion) -> Vec<Vec<String>> {
    lines[region.header_index..=region.last_row_index.min(lines.len().saturating_sub(1))]
        .iter()
        .map(|l| l.cells.clone())
        .collect()
}

/// Render a grid as pipe-separated rows.
pub fn grid_to_text(grid: &[Vec<String>]) -> String {
    grid.iter()
        .map(|row| row.join(" | "))
        .collect::<Vec<_>>()
        .join("\n")
}
