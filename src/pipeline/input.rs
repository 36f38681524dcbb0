//! Input resolution: turn a user-supplied path or URL into PDF bytes.
//!
//! The loader opens documents from a byte slice, so both local files and
//! downloads end up as an owned buffer here. The `%PDF` magic is checked up
//! front so callers get a meaningful error rather than a pdfium failure.

use crate::error::Pdf2TxnError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Raw statement bytes plus a display name for messages.
#[derive(Clone)]
pub struct InputDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for InputDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputDocument")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl InputDocument {
    /// Wrap bytes already in memory (uploads, database blobs).
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, Pdf2TxnError> {
        let name = name.into();
        check_magic(&name, &bytes)?;
        Ok(Self { name, bytes })
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or HTTP(S) URL to PDF bytes.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<InputDocument, Pdf2TxnError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

fn check_magic(name: &str, bytes: &[u8]) -> Result<(), Pdf2TxnError> {
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        return Err(Pdf2TxnError::NotAPdf {
            name: name.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        });
    }
    Ok(())
}

async fn read_local(path_str: &str) -> Result<InputDocument, Pdf2TxnError> {
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Pdf2TxnError::PermissionDenied { path: path.clone() },
        _ => Pdf2TxnError::FileNotFound { path: path.clone() },
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path_str.to_string());

    debug!("Read local statement: {} ({} bytes)", path.display(), bytes.len());
    InputDocument::from_bytes(name, bytes)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<InputDocument, Pdf2TxnError> {
    info!("Downloading statement from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Pdf2TxnError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let to_err = |e: reqwest::Error| {
        if e.is_timeout() {
            Pdf2TxnError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Pdf2TxnError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(to_err)?;
    if !response.status().is_success() {
        return Err(Pdf2TxnError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(to_err)?;
    info!("Downloaded {} bytes", bytes.len());
    InputDocument::from_bytes(filename_from_url(url), bytes.to_vec())
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}
