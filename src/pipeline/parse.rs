//! Response parsing: model reply text → normalised [`TransactionRecord`]s.
//!
//! Models are asked for bare JSON but routinely wrap it in prose, code
//! fences, trailing commas or Python-style quotes, and sometimes run out of
//! tokens mid-array. The parser therefore looks for the payload in stages:
//!
//! 1. the whole reply as JSON, when it holds rows
//! 2. the first balanced `[...]` that parses as an array
//! 3. the first balanced `{...}` holding a `transactions`/`records`/`data`
//!    array, or a single array of objects under any other key
//! 4. every standalone balanced `{...}` object with a date field, gathered
//!    into an array (recovers the complete rows of a truncated reply)
//! 5. a Markdown pipe table
//!
//! Each candidate gets a lenient second try (trailing commas removed, then
//! single quotes and `None`/`True`/`False` rewritten) before it is rejected.

use crate::error::PageError;
use crate::output::{Direction, TransactionRecord};
use crate::pipeline::layout::DATE_RE;
use crate::prompts::DocumentKind;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::debug;

/// Candidate spans tried per stage before giving up.
const MAX_CANDIDATES: usize = 64;

const DATE_KEYS: &[&str] = &["date", "dt", "txn_date", "transaction_date", "value_date", "tran_date"];
const DESCRIPTION_KEYS: &[&str] = &[
    "description",
    "desc",
    "narration",
    "particulars",
    "details",
    "transaction_details",
    "remarks",
];
const REFERENCE_KEYS: &[&str] = &["ref", "reference", "reference_number", "ref_no", "cheque_no", "chq_no"];
const AMOUNT_KEYS: &[&str] = &["amount", "amt", "transaction_amount"];
const DEBIT_KEYS: &[&str] = &["dr", "debit", "withdrawal", "withdrawals", "withdrawal_dr", "debit_amount"];
const CREDIT_KEYS: &[&str] = &["cr", "credit", "deposit", "deposits", "deposit_cr", "credit_amount"];
const BALANCE_KEYS: &[&str] = &["bal", "balance", "closing_balance", "running_balance"];
const TYPE_KEYS: &[&str] = &["type", "txn_type", "transaction_type", "dr_cr", "cr_dr"];
const CATEGORY_KEYS: &[&str] = &["category", "merchant_category"];
const CONTAINER_KEYS: &[&str] = &["transactions", "records", "data", "rows"];

const CARD_CREDIT_KEYWORDS: &[&str] = &["PAYMENT", "REFUND", "CREDIT", "CASHBACK", "REVERSAL"];
const BANK_CREDIT_KEYWORDS: &[&str] = &[
    "SALARY",
    "DEPOSIT",
    "REFUND",
    "REVERSAL",
    "INTEREST CREDIT",
    "CASH DEP",
];

static FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[A-Za-z]*").unwrap());
static TRAILING_COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([\]}])").unwrap());
static PY_LITERAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(None|True|False)\b").unwrap());
static ORDINAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").unwrap());

const DATE_FORMATS_4Y: &[&str] = &[
    "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%d %b %Y",
    "%d-%b-%Y", "%d %B %Y", "%d-%B-%Y", "%b %d %Y", "%B %d %Y", "%d%b%Y",
];
const DATE_FORMATS_2Y: &[&str] = &[
    "%d/%m/%y", "%d-%m-%y", "%d.%m.%y", "%d %b %y", "%d-%b-%y", "%d %B %y", "%d-%B-%y",
];

/// Records read from one page reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    pub records: Vec<TransactionRecord>,
    /// Rows dropped for lacking a date or a description.
    pub skipped_rows: usize,
}

/// An amount with its sign and any `Cr`/`Dr` marker it carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAmount {
    pub value: Decimal,
    pub marker: Option<Direction>,
}

/// Parse one page reply.
///
/// # Errors
/// [`PageError::ParseFailed`] when the reply holds no structured data at
/// all. An explicit empty list is a success with zero records.
pub fn parse_response(raw: &str, page: usize, kind: DocumentKind) -> Result<ParsedPage, PageError> {
    let text = sanitize(raw);
    let fail = |detail: &str| PageError::ParseFailed {
        page,
        detail: detail.to_string(),
    };

    if text.trim().is_empty() {
        return Err(fail("empty reply"));
    }

    let value = locate_structured(&text).ok_or_else(|| fail(&excerpt(&text)))?;
    let rows = rows_of(value).ok_or_else(|| fail("reply holds no transaction rows"))?;

    let mut parsed = ParsedPage::default();
    for row in rows {
        match row.as_object().and_then(|obj| record_from_row(obj, page, kind)) {
            Some(record) => parsed.records.push(record),
            None => parsed.skipped_rows += 1,
        }
    }

    debug!(
        "Page {}: parsed {} records, skipped {}",
        page,
        parsed.records.len(),
        parsed.skipped_rows
    );
    Ok(parsed)
}

fn excerpt(text: &str) -> String {
    let head: String = text.chars().take(80).collect();
    format!("no JSON or table found in reply starting {:?}", head)
}

/// Normalise line endings, drop invisible characters and code fences.
pub fn sanitize(raw: &str) -> String {
    let s = raw.replace("\r\n", "\n").replace('\r', "\n");
    let s = s.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    );
    FENCE_RE.replace_all(&s, "").to_string()
}

/// Find the structured payload in a reply. Only values with readable rows
/// are accepted, so an object that holds no rows falls through to the
/// looser stages.
pub fn locate_structured(text: &str) -> Option<Value> {
    if let Some(v) = parse_lenient(text.trim()).filter(has_rows) {
        return Some(v);
    }

    if let Some(v) = balanced_spans(text, '[')
        .filter_map(parse_lenient)
        .find(is_row_array)
    {
        return Some(v);
    }

    if let Some(v) = balanced_spans(text, '{')
        .filter_map(parse_lenient)
        .find(|v| container_rows(v).is_some())
    {
        return Some(v);
    }

    let objects: Vec<Value> = standalone_objects(text)
        .into_iter()
        .filter(|v| v.as_object().is_some_and(looks_like_record))
        .collect();
    if !objects.is_empty() {
        return Some(Value::Array(objects));
    }

    markdown_table(text)
}

/// Empty, or holding at least one object. Keeps `[2]` in prose from
/// passing as the payload.
fn is_row_array(v: &Value) -> bool {
    v.as_array()
        .is_some_and(|rows| rows.is_empty() || rows.iter().any(Value::is_object))
}

/// Strict parse, then with trailing commas removed, then with quote repair.
fn parse_lenient(candidate: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(candidate) {
        return Some(v);
    }
    let no_commas = TRAILING_COMMA_RE.replace_all(candidate, "$1");
    if let Ok(v) = serde_json::from_str::<Value>(&no_commas) {
        return Some(v);
    }
    let requoted = no_commas.replace('\'', "\"");
    let requoted = PY_LITERAL_RE.replace_all(&requoted, |caps: &regex::Captures<'_>| {
        match &caps[1] {
            "None" => "null",
            "True" => "true",
            _ => "false",
        }
        .to_string()
    });
    serde_json::from_str::<Value>(&requoted).ok()
}

/// Byte index of the bracket closing the one at `start`, skipping string
/// contents.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Every balanced span opening with `open`, in order of appearance.
fn balanced_spans(text: &str, open: char) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(move |&(_, c)| c == open)
        .take(MAX_CANDIDATES)
        .filter_map(move |(i, _)| balanced_end(text, i).map(|end| &text[i..=end]))
}

/// Non-overlapping top-level objects that parse, left to right.
fn standalone_objects(text: &str) -> Vec<Value> {
    let mut found = Vec::new();
    let mut pos = 0;
    let mut tries = 0;

    while let Some(rel) = text[pos..].find('{') {
        let start = pos + rel;
        tries += 1;
        if tries > MAX_CANDIDATES * 8 {
            break;
        }
        match balanced_end(text, start)
            .and_then(|end| parse_lenient(&text[start..=end]).map(|v| (end, v)))
        {
            Some((end, v)) if v.is_object() => {
                found.push(v);
                pos = end + 1;
            }
            _ => pos = start + 1,
        }
    }
    found
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}

fn split_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim().trim_start_matches('|').trim_end_matches('|');
    trimmed.split('|').map(|c| c.trim().to_string()).collect()
}

/// Convert the first Markdown pipe table into an array of objects keyed by
/// its header cells.
fn markdown_table(text: &str) -> Option<Value> {
    let mut rows = text
        .lines()
        .skip_while(|l| !is_table_row(l))
        .take_while(|l| is_table_row(l))
        .filter(|l| !is_separator_row(l));

    let header = split_cells(rows.next()?);
    let objects: Vec<Value> = rows
        .map(|line| {
            let cells = split_cells(line);
            let obj: Map<String, Value> = header
                .iter()
                .zip(cells)
                .map(|(h, c)| (h.clone(), Value::String(c)))
                .collect();
            Value::Object(obj)
        })
        .collect();

    if objects.is_empty() {
        None
    } else {
        Some(Value::Array(objects))
    }
}

/// Rows held by a wrapper object: a known container key first, else the
/// only array of objects under any key, as in `{"statement_rows": [...]}`.
fn container_rows(v: &Value) -> Option<&Vec<Value>> {
    let obj = v.as_object()?;
    if let Some(rows) = obj
        .iter()
        .find(|(k, _)| CONTAINER_KEYS.contains(&normalize_key(k).as_str()))
        .and_then(|(_, v)| v.as_array())
    {
        return Some(rows);
    }
    if looks_like_record(obj) {
        return None;
    }
    let mut wrapped = obj
        .values()
        .filter(|v| v.as_array().is_some_and(|a| !a.is_empty()) && is_row_array(v));
    match (wrapped.next(), wrapped.next()) {
        (Some(rows), None) => rows.as_array(),
        _ => None,
    }
}

/// `rows_of` can read this value.
fn has_rows(v: &Value) -> bool {
    v.is_array()
        || container_rows(v).is_some()
        || v.as_object().is_some_and(looks_like_record)
}

fn looks_like_record(obj: &Map<String, Value>) -> bool {
    obj.keys()
        .any(|k| DATE_KEYS.contains(&normalize_key(k).as_str()))
}

/// The row list of a located payload.
fn rows_of(value: Value) -> Option<Vec<Value>> {
    if let Some(rows) = container_rows(&value) {
        return Some(rows.clone());
    }
    match value {
        Value::Array(rows) => Some(rows),
        Value::Object(obj) if looks_like_record(&obj) => Some(vec![Value::Object(obj)]),
        _ => None,
    }
}

fn normalize_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .replace([' ', '-', '.'], "_")
        .trim_matches('_')
        .to_string()
}

struct Row<'a> {
    fields: Vec<(String, &'a Value)>,
}

impl<'a> Row<'a> {
    fn new(obj: &'a Map<String, Value>) -> Self {
        Self {
            fields: obj.iter().map(|(k, v)| (normalize_key(k), v)).collect(),
        }
    }

    /// First non-null value under any of `keys`, in alias order.
    fn get(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter().find_map(|key| {
            self.fields
                .iter()
                .find(|(k, v)| k.as_str() == *key && !v.is_null())
                .map(|(_, v)| *v)
        })
    }

    fn text(&self, keys: &[&str]) -> Option<String> {
        let s = match self.get(keys)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match collapsed.to_lowercase().as_str() {
            "" | "-" | "null" | "none" | "n/a" | "na" => None,
            _ => Some(collapsed),
        }
    }

    fn amount(&self, keys: &[&str]) -> Option<ParsedAmount> {
        self.get(keys).and_then(parse_amount)
    }
}

fn record_from_row(
    obj: &Map<String, Value>,
    page: usize,
    kind: DocumentKind,
) -> Option<TransactionRecord> {
    let row = Row::new(obj);
    let date = row.text(DATE_KEYS).and_then(|d| normalize_date(&d))?;
    let description = row.text(DESCRIPTION_KEYS)?;

    let type_hint = row
        .text(TYPE_KEYS)
        .and_then(|t| direction_from_type(&t, kind));
    let debit = row.amount(DEBIT_KEYS);
    let credit = row.amount(CREDIT_KEYS);
    let nonzero = |a: &Option<ParsedAmount>| a.filter(|p| !p.value.is_zero());

    let (amount, direction) = if let Some(d) = nonzero(&debit) {
        (Some(d.value.abs()), Direction::Debit)
    } else if let Some(c) = nonzero(&credit) {
        (Some(c.value.abs()), Direction::Credit)
    } else if let Some(a) = row.amount(AMOUNT_KEYS) {
        let direction = type_hint
            .or(a.marker)
            .or_else(|| direction_from_sign(a.value, kind))
            .or_else(|| direction_from_keywords(&description, kind))
            .unwrap_or(Direction::Debit);
        (Some(a.value.abs()), direction)
    } else {
        let amount = debit.or(credit).map(|z| z.value.abs());
        let direction = type_hint
            .or_else(|| direction_from_keywords(&description, kind))
            .unwrap_or(Direction::Debit);
        (amount, direction)
    };

    let balance = row.amount(BALANCE_KEYS).map(|b| match b.marker {
        Some(Direction::Debit) => -b.value.abs(),
        _ => b.value,
    });

    Some(TransactionRecord {
        page,
        date,
        description,
        reference: row.text(REFERENCE_KEYS),
        amount,
        direction,
        balance,
        category: row.text(CATEGORY_KEYS),
    })
}

fn direction_from_type(t: &str, kind: DocumentKind) -> Option<Direction> {
    match t.trim().to_lowercase().as_str() {
        "credit" | "cr" | "c" | "deposit" | "refund" | "payment received" => Some(Direction::Credit),
        "debit" | "dr" | "withdrawal" | "w" | "purchase" => Some(Direction::Debit),
        // "D" is a deposit on bank statements and a debit on card statements.
        "d" => Some(match kind {
            DocumentKind::Bank => Direction::Credit,
            DocumentKind::CreditCard => Direction::Debit,
        }),
        _ => None,
    }
}

/// Card statements print payments as negative; bank statements print
/// withdrawals as negative.
fn direction_from_sign(value: Decimal, kind: DocumentKind) -> Option<Direction> {
    if !value.is_sign_negative() || value.is_zero() {
        return None;
    }
    Some(match kind {
        DocumentKind::CreditCard => Direction::Credit,
        DocumentKind::Bank => Direction::Debit,
    })
}

fn direction_from_keywords(description: &str, kind: DocumentKind) -> Option<Direction> {
    let upper = description.to_uppercase();
    let keywords = match kind {
        DocumentKind::CreditCard => CARD_CREDIT_KEYWORDS,
        DocumentKind::Bank => BANK_CREDIT_KEYWORDS,
    };
    keywords
        .iter()
        .any(|k| upper.contains(k))
        .then_some(Direction::Credit)
}

fn to_cents(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse a JSON amount: a number or a string with currency noise.
pub fn parse_amount(value: &Value) -> Option<ParsedAmount> {
    match value {
        Value::Number(n) => {
            let s = n.to_string();
            let d = Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()?;
            Some(ParsedAmount {
                value: to_cents(d),
                marker: None,
            })
        }
        Value::String(s) => parse_amount_str(s),
        _ => None,
    }
}

/// Parse amount text such as `₹1,23,456.78 Cr`, `(45.00)` or `Rs. -12`.
pub fn parse_amount_str(raw: &str) -> Option<ParsedAmount> {
    let mut s = raw.trim().to_uppercase();
    if s.is_empty() {
        return None;
    }

    let mut marker = None;
    for (suffix, dir) in [("CR", Direction::Credit), ("DR", Direction::Debit)] {
        let stripped = s.trim_end_matches('.').trim_end();
        if let Some(rest) = stripped.strip_suffix(suffix) {
            marker = Some(dir);
            s = rest.trim_end().to_string();
            break;
        }
    }

    for currency in ["₹", "RS.", "RS", "INR", "USD", "$", "€", "£"] {
        s = s.replace(currency, "");
    }
    let mut s: String = s.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') && s.len() > 2 {
        negative = true;
        s = s[1..s.len() - 1].to_string();
    }
    if let Some(rest) = s.strip_suffix('-') {
        negative = true;
        s = rest.to_string();
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest.to_string();
    }
    let s = s.strip_prefix('+').unwrap_or(&s);

    let value = to_cents(Decimal::from_str(s).ok()?);
    Some(ParsedAmount {
        value: if negative { -value } else { value },
        marker,
    })
}

/// Normalise a statement date (day first) to a calendar date.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let candidate = DATE_RE
        .find(raw)
        .map(|m| m.as_str())
        .unwrap_or(raw)
        .trim();
    let cleaned = ORDINAL_RE.replace_all(candidate, "$1");
    let cleaned = cleaned
        .replace(',', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let plausible = |d: &NaiveDate| (1900..=2100).contains(&d.year());

    DATE_FORMATS_4Y
        .iter()
        .chain(DATE_FORMATS_2Y)
        .filter_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
        .find(plausible)
}
