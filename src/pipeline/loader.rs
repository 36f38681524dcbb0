//! Document loading: open the PDF once to learn whether it is protected,
//! how many pages it has, and what its metadata says.
//!
//! A protected statement is always opened without a password first. That
//! gives a reliable `password_protected` flag and lets us tell "no password
//! given" apart from "wrong password given".

use super::engine::bind_pdfium;
use super::input::InputDocument;
use crate::error::Pdf2TxnError;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// What is known about a loaded statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Random per-run identifier; documents are never persisted.
    pub id: Uuid,
    pub name: String,
    pub page_count: usize,
    pub password_protected: bool,
    pub title: Option<String>,
    pub author: Option<String>,
    pub producer: Option<String>,
    pub pdf_version: String,
}

impl DocumentInfo {
    pub fn new(name: impl Into<String>, page_count: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            page_count,
            password_protected: false,
            title: None,
            author: None,
            producer: None,
            pdf_version: String::new(),
        }
    }
}

/// A statement that opened successfully, ready for rendering.
pub struct Document {
    pub info: DocumentInfo,
    bytes: Arc<Vec<u8>>,
    password: Option<String>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document").field("info", &self.info).finish()
    }
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.info.page_count
    }

    /// Re-open the document on a pdfium instance. Blocking.
    pub(crate) fn open<'a>(&'a self, pdfium: &'a Pdfium) -> Result<PdfDocument<'a>, Pdf2TxnError> {
        open_document(pdfium, &self.bytes, &self.info.name, self.password.as_deref())
            .map(|(doc, _)| doc)
    }
}

fn is_password_message(detail: &str) -> bool {
    detail.contains("Password") || detail.contains("password")
}

/// Open `bytes`, probing without a password first.
///
/// Returns the document and whether it was password-protected.
pub(crate) fn open_document<'a>(
    pdfium: &'a Pdfium,
    bytes: &'a [u8],
    name: &str,
    password: Option<&'a str>,
) -> Result<(PdfDocument<'a>, bool), Pdf2TxnError> {
    let password = password.filter(|p| !p.is_empty());

    let first_err = match pdfium.load_pdf_from_byte_slice(bytes, None) {
        Ok(doc) => return Ok((doc, false)),
        Err(e) => format!("{:?}", e),
    };

    if !is_password_message(&first_err) {
        return Err(Pdf2TxnError::CorruptDocument {
            name: name.to_string(),
            detail: first_err,
        });
    }

    let Some(pw) = password else {
        return Err(Pdf2TxnError::PasswordRequired {
            name: name.to_string(),
        });
    };

    pdfium
        .load_pdf_from_byte_slice(bytes, Some(pw))
        .map(|doc| (doc, true))
        .map_err(|e| {
            let detail = format!("{:?}", e);
            if is_password_message(&detail) {
                Pdf2TxnError::WrongPassword {
                    name: name.to_string(),
                }
            } else {
                Pdf2TxnError::CorruptDocument {
                    name: name.to_string(),
                    detail,
                }
            }
        })
}

fn read_info(doc: &PdfDocument<'_>, name: &str, protected: bool) -> DocumentInfo {
    let metadata = doc.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    DocumentInfo {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        pdf_version: format!("{:?}", doc.version()),
        password_protected: protected,
        ..DocumentInfo::new(name, doc.pages().len() as usize)
    }
}

fn load_blocking(input: InputDocument, password: Option<String>) -> Result<Document, Pdf2TxnError> {
    let pdfium = bind_pdfium()?;
    let info = {
        let (doc, protected) =
            open_document(&pdfium, &input.bytes, &input.name, password.as_deref())?;
        read_info(&doc, &input.name, protected)
    };
    debug!("Loaded {:?}", info);

    Ok(Document {
        info,
        bytes: Arc::new(input.bytes),
        password,
    })
}

/// Open and validate a statement.
///
/// # Errors
/// * [`Pdf2TxnError::PasswordRequired`] / [`Pdf2TxnError::WrongPassword`]
///   for protected files
/// * [`Pdf2TxnError::CorruptDocument`] for anything else pdfium rejects
pub async fn load_document(
    input: InputDocument,
    password: Option<String>,
) -> Result<Document, Pdf2TxnError> {
    let name = input.name.clone();
    let doc = tokio::task::spawn_blocking(move || load_blocking(input, password))
        .await
        .map_err(|e| Pdf2TxnError::Internal(format!("Load task panicked: {}", e)))??;

    info!(
        "Opened '{}': {} pages{}",
        name,
        doc.page_count(),
        if doc.info.password_protected {
            " (password-protected)"
        } else {
            ""
        }
    );
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_messages_are_detected() {
        assert!(is_password_message(
            "PdfiumLibraryInternalError(PasswordError)"
        ));
        assert!(!is_password_message("PdfiumLibraryInternalError(FormatError)"));
    }

    #[test]
    fn info_ids_are_unique() {
        let a = DocumentInfo::new("a.pdf", 1);
        let b = DocumentInfo::new("a.pdf", 1);
        assert_ne!(a.id, b.id);
        assert!(!a.password_protected);
    }
}
