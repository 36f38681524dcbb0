//! Pipeline stages for statement extraction.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ loader ──▶ render ──▶ encode ──▶ llm ──▶ parse ──▶ aggregate ──▶ balance ──▶ redact
//! (path/URL) (pdfium)  (layout)   (base64)   (VLM)   (JSON)   (order/dedupe) (dr/cr fix)
//! ```
//!
//! 1. [`input`]     – read a local path or download a URL, check the PDF magic
//! 2. [`engine`]    – bind the pdfium library
//! 3. [`loader`]    – open the document (password handling) and read metadata
//! 4. [`layout`]    – find the transaction table from the text layer
//! 5. [`render`]    – rasterise, crop or mask pages; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 6. [`encode`]    – PNG-encode and base64-wrap page images
//! 7. [`llm`]       – provider chain with retry and fallback; the only stage
//!    with network I/O
//! 8. [`schema`]    – bank column order read once from the first table
//! 9. [`parse`]     – model reply → normalised records
//! 10. [`aggregate`] – page-ordered concatenation, de-duplication, totals
//! 11. [`balance`]  – running-balance check that flips swapped bank rows
//! 12. [`redact`]   – mask sensitive fields before export

pub mod aggregate;
pub mod balance;
pub mod encode;
pub mod engine;
pub mod input;
pub mod layout;
pub mod llm;
pub mod loader;
pub mod parse;
pub mod redact;
pub mod render;
pub mod schema;
