//! Binding to the PDFium shared library.
//!
//! Lookup order:
//! 1. `PDFIUM_LIB_PATH`, either the library file or the directory holding it
//! 2. the platform library name in the current directory
//! 3. the system loader path

use crate::error::Pdf2TxnError;
use pdfium_render::prelude::Pdfium;
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(target_os = "macos")]
const LIB_NAME: &str = "libpdfium.dylib";
#[cfg(target_os = "windows")]
const LIB_NAME: &str = "pdfium.dll";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const LIB_NAME: &str = "libpdfium.so";

/// Resolve `PDFIUM_LIB_PATH`: a directory means "the library inside it".
fn library_path(env_value: &Path) -> PathBuf {
    if env_value.is_dir() {
        env_value.join(LIB_NAME)
    } else {
        env_value.to_path_buf()
    }
}

fn bind_at(path: &Path) -> Result<Pdfium, Pdf2TxnError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| Pdf2TxnError::PdfiumBindingFailed(format!("{}: {}", path.display(), e)))
}

/// Load PDFium. Must be called from a blocking context.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2TxnError> {
    if let Some(value) = std::env::var_os("PDFIUM_LIB_PATH") {
        let path = library_path(Path::new(&value));
        debug!("Binding pdfium from PDFIUM_LIB_PATH: {}", path.display());
        return bind_at(&path);
    }

    let local = PathBuf::from(".").join(LIB_NAME);
    if local.exists() {
        debug!("Binding pdfium from {}", local.display());
        return bind_at(&local);
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| Pdf2TxnError::PdfiumBindingFailed(e.to_string()))
}
