//! Column-order schema for bank statements.
//!
//! Banks disagree on whether the credit column comes before the debit
//! column, and a model reading a page image tends to follow the visual
//! order. The first transaction table of a statement is read once for
//! its column order and date direction; every page prompt then asks for
//! `dr`/`cr` in that order.

use crate::output::TransactionRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

static SCHEMA_ARRAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\s*\{[^\[\]]*\}\s*\]").unwrap());
static DATE_ORDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)date[ _]?order\W*(ascending|descending)").unwrap());

/// Direction the statement lists its rows in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    /// Oldest row first.
    Ascending,
    /// Newest row first.
    Descending,
    #[default]
    Unknown,
}

impl DateOrder {
    /// Resolve `Unknown` from the first and last record dates; equal or
    /// missing dates count as ascending.
    pub fn resolve(self, records: &[TransactionRecord]) -> DateOrder {
        match self {
            DateOrder::Unknown => match (records.first(), records.last()) {
                (Some(first), Some(last)) if first.date > last.date => DateOrder::Descending,
                _ => DateOrder::Ascending,
            },
            known => known,
        }
    }
}

impl fmt::Display for DateOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateOrder::Ascending => f.write_str("ascending"),
            DateOrder::Descending => f.write_str("descending"),
            DateOrder::Unknown => f.write_str("unknown"),
        }
    }
}

/// Detected layout of a bank transaction table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// The credit/deposit column is printed left of the debit/withdrawal one.
    pub credit_first: bool,
    pub date_order: DateOrder,
}

impl ColumnSchema {
    /// One example row with `dr`/`cr` in table order.
    pub fn row_template(&self) -> String {
        let (first, second) = if self.credit_first {
            ("cr", "dr")
        } else {
            ("dr", "cr")
        };
        format!(
            r#"{{"dt":"DD-MM-YYYY","desc":"...","ref":null,"{first}":0.00,"{second}":0.00,"bal":0.00,"type":"W"}}"#
        )
    }
}

impl fmt::Display for ColumnSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns = if self.credit_first { "cr,dr" } else { "dr,cr" };
        write!(f, "{} ({} dates)", columns, self.date_order)
    }
}

/// Read a schema reply: a re-ordered one-row JSON array plus an optional
/// `Date_Order:` line. When the reply echoes several arrays the last one
/// wins. `None` when no usable array is present.
pub fn parse_schema_reply(raw: &str) -> Option<ColumnSchema> {
    let array = SCHEMA_ARRAY_RE
        .find_iter(raw)
        .filter(|m| {
            serde_json::from_str::<Value>(m.as_str())
                .ok()
                .and_then(|v| v.as_array().and_then(|rows| rows.first().cloned()))
                .is_some_and(|row| row.get("dr").is_some() && row.get("cr").is_some())
        })
        .last()?
        .as_str();

    let credit_first = match (array.find("\"cr\""), array.find("\"dr\"")) {
        (Some(cr), Some(dr)) => cr < dr,
        _ => false,
    };

    let date_order = DATE_ORDER_RE
        .captures(raw)
        .map(|caps| {
            if caps[1].eq_ignore_ascii_case("descending") {
                DateOrder::Descending
            } else {
                DateOrder::Ascending
            }
        })
        .unwrap_or_default();

    Some(ColumnSchema {
        credit_first,
        date_order,
    })
}
