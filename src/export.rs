//! CSV and JSON export of transaction records.
//!
//! Both formats carry exactly the [`TransactionRecord`] fields in
//! declaration order. JSON keeps amounts as numbers and nulls as `null`;
//! CSV leaves missing values empty.

use crate::error::Pdf2TxnError;
use crate::output::TransactionRecord;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Column names, in export order.
pub const COLUMNS: &[&str] = &[
    "page",
    "date",
    "description",
    "reference",
    "amount",
    "direction",
    "balance",
    "category",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unknown export format '{}' (expected csv or json)", other)),
        }
    }
}

fn export_err(format: ExportFormat, detail: impl fmt::Display) -> Pdf2TxnError {
    Pdf2TxnError::Export {
        format: format.to_string(),
        detail: detail.to_string(),
    }
}

/// Write records as CSV with a header row, even when there are no records.
pub fn write_csv<W: Write>(writer: W, records: &[TransactionRecord]) -> Result<(), Pdf2TxnError> {
    let fail = |e: csv::Error| export_err(ExportFormat::Csv, e);

    if records.is_empty() {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(COLUMNS).map_err(fail)?;
        return wtr.flush().map_err(|e| export_err(ExportFormat::Csv, e));
    }

    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(record).map_err(fail)?;
    }
    wtr.flush().map_err(|e| export_err(ExportFormat::Csv, e))
}

/// Write records as a pretty-printed JSON array.
pub fn write_json<W: Write>(mut writer: W, records: &[TransactionRecord]) -> Result<(), Pdf2TxnError> {
    serde_json::to_writer_pretty(&mut writer, records)
        .map_err(|e| export_err(ExportFormat::Json, e))?;
    writer
        .write_all(b"\n")
        .map_err(|e| export_err(ExportFormat::Json, e))
}

/// Read back a JSON export.
pub fn read_json<R: Read>(reader: R) -> Result<Vec<TransactionRecord>, Pdf2TxnError> {
    serde_json::from_reader(reader).map_err(|e| export_err(ExportFormat::Json, e))
}

pub fn export_records<W: Write>(
    writer: W,
    records: &[TransactionRecord],
    format: ExportFormat,
) -> Result<(), Pdf2TxnError> {
    match format {
        ExportFormat::Csv => write_csv(writer, records),
        ExportFormat::Json => write_json(writer, records),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write an export to `path` atomically (`<path>.tmp`, then rename).
pub async fn export_to_file(
    path: impl AsRef<Path>,
    records: &[TransactionRecord],
    format: ExportFormat,
) -> Result<(), Pdf2TxnError> {
    let path = path.as_ref();
    let write_failed = |e: std::io::Error| Pdf2TxnError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let mut buf = Vec::new();
    export_records(&mut buf, records, format)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &buf).await.map_err(write_failed)?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_failed(e));
    }

    info!(
        "Wrote {} records as {} to {}",
        records.len(),
        format,
        path.display()
    );
    Ok(())
}
