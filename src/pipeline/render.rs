//! Page preparation: rasterise pages and/or read their transaction table.
//!
//! pdfium is not async-safe, so the whole pass runs inside
//! `tokio::task::spawn_blocking` on its own pdfium binding. One bad page
//! never aborts the document: each page yields its own
//! `Result<RenderedPage, PageError>`.

use super::engine::bind_pdfium;
use super::layout::{
    detect_table_region, grid_to_text, merge_into_lines, table_grid, TableRegion, TextFragment,
    TextLine, LINE_TOLERANCE,
};
use super::loader::Document;
use crate::config::{ExtractionConfig, RenderMode};
use crate::error::{PageError, Pdf2TxnError};
use image::{DynamicImage, Rgba};
use pdfium_render::prelude::*;
use std::sync::Arc;
use tracing::{debug, warn};

/// Points left visible above the table header when masking.
pub const HEADER_MASK_OFFSET_PT: f32 = 15.0;

/// Pixel value at or above which a grayscale pixel counts as paper.
const BLANK_THRESHOLD: u8 = 250;

/// The render-relevant subset of [`ExtractionConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub mode: RenderMode,
    pub dpi: u32,
    pub max_pixels: u32,
    pub padding_px: u32,
    pub mask_header: bool,
}

impl RenderSettings {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            mode: config.render_mode,
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            padding_px: config.table_padding_px,
            mask_header: config.mask_header,
        }
    }

    fn needs_layout(&self) -> bool {
        self.mode != RenderMode::PageImage || self.mask_header
    }
}

/// One prepared page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 0-based page index.
    pub index: usize,
    pub image: Option<DynamicImage>,
    pub table_text: Option<String>,
}

/// Prepare the selected pages.
///
/// Only failures that affect the whole document (binding, reopening) are
/// returned as `Err`.
pub async fn render_pages(
    document: Arc<Document>,
    settings: RenderSettings,
    page_indices: &[usize],
) -> Result<Vec<(usize, Result<RenderedPage, PageError>)>, Pdf2TxnError> {
    let indices = page_indices.to_vec();
    tokio::task::spawn_blocking(move || render_pages_blocking(&document, settings, &indices))
        .await
        .map_err(|e| Pdf2TxnError::Internal(format!("Render task panicked: {}", e)))?
}

fn render_pages_blocking(
    document: &Document,
    settings: RenderSettings,
    page_indices: &[usize],
) -> Result<Vec<(usize, Result<RenderedPage, PageError>)>, Pdf2TxnError> {
    let pdfium = bind_pdfium()?;
    let pdf = document.open(&pdfium)?;
    let pages = pdf.pages();
    let total_pages = pages.len() as usize;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(settings.dpi as f32 / 72.0)
        .set_maximum_width(settings.max_pixels as i32)
        .set_maximum_height(settings.max_pixels as i32);

    let mut results = Vec::with_capacity(page_indices.len());
    for &idx in page_indices {
        let page_num = idx + 1;
        if idx >= total_pages {
            warn!("Skipping page {} (out of range, total={})", page_num, total_pages);
            continue;
        }

        let result = pages
            .get(idx as u16)
            .map_err(|e| PageError::RenderFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })
            .and_then(|page| prepare_page(&page, idx, &settings, &render_config));

        if let Err(ref e) = result {
            debug!("{}", e);
        }
        results.push((idx, result));
    }

    Ok(results)
}

fn prepare_page(
    page: &PdfPage<'_>,
    idx: usize,
    settings: &RenderSettings,
    render_config: &PdfRenderConfig,
) -> Result<RenderedPage, PageError> {
    let page_num = idx + 1;
    let page_height = page.height().value;

    let region = if settings.needs_layout() {
        match page_lines(page, page_height) {
            Ok(lines) => detect_table_region(&lines).map(|r| (r, lines)),
            Err(detail) if settings.mode == RenderMode::PageImage => {
                warn!("Page {}: no text layer for header masking: {}", page_num, detail);
                None
            }
            Err(detail) => {
                return Err(PageError::RenderFailed {
                    page: page_num,
                    detail,
                })
            }
        }
    } else {
        None
    };

    let no_table = || PageError::NoContent {
        page: page_num,
        detail: "no transaction table detected".to_string(),
    };

    match settings.mode {
        RenderMode::TableText => {
            let (region, lines) = region.ok_or_else(no_table)?;
            Ok(RenderedPage {
                index: idx,
                image: None,
                table_text: Some(grid_to_text(&table_grid(&lines, &region))),
            })
        }
        RenderMode::TableImage => {
            let (region, _) = region.ok_or_else(no_table)?;
            let (image, scale) = rasterise(page, page_num, page_height, render_config)?;
            Ok(RenderedPage {
                index: idx,
                image: Some(crop_band(
                    &image,
                    region.top,
                    region.bottom,
                    scale,
                    settings.padding_px,
                )),
                table_text: None,
            })
        }
        RenderMode::PageImage => {
            let (mut image, scale) = rasterise(page, page_num, page_height, render_config)?;
            if let Some((TableRegion { top, .. }, _)) = region {
                image = mask_above(&image, top - HEADER_MASK_OFFSET_PT, scale);
            }
            Ok(RenderedPage {
                index: idx,
                image: Some(image),
                table_text: None,
            })
        }
    }
}

/// Render a page; returns the image and its pixels-per-point scale.
fn rasterise(
    page: &PdfPage<'_>,
    page_num: usize,
    page_height: f32,
    render_config: &PdfRenderConfig,
) -> Result<(DynamicImage, f32), PageError> {
    let bitmap = page
        .render_with_config(render_config)
        .map_err(|e| PageError::RenderFailed {
            page: page_num,
            detail: format!("{:?}", e),
        })?;
    let image = bitmap.as_image();

    if is_blank(&image) {
        return Err(PageError::NoContent {
            page: page_num,
            detail: "page renders blank".to_string(),
        });
    }

    let scale = if page_height > 0.0 {
        image.height() as f32 / page_height
    } else {
        1.0
    };
    debug!(
        "Rendered page {} → {}x{} px ({:.2} px/pt)",
        page_num,
        image.width(),
        image.height(),
        scale
    );
    Ok((image, scale))
}

/// Text segments of a page, grouped into lines with top-down coordinates.
fn page_lines(page: &PdfPage<'_>, page_height: f32) -> Result<Vec<TextLine>, String> {
    let text = page.text().map_err(|e| format!("{:?}", e))?;
    let fragments: Vec<TextFragment> = text
        .segments()
        .iter()
        .map(|seg| {
            let bounds = seg.bounds();
            TextFragment {
                x: bounds.left().value,
                top: page_height - bounds.top().value,
                bottom: page_height - bounds.bottom().value,
                text: seg.text(),
            }
        })
        .collect();

    if fragments.is_empty() {
        return Err("page has no text layer".to_string());
    }
    Ok(merge_into_lines(fragments, LINE_TOLERANCE))
}

/// True when every pixel is (near) white.
pub fn is_blank(image: &DynamicImage) -> bool {
    image.to_luma8().pixels().all(|p| p.0[0] >= BLANK_THRESHOLD)
}

/// Paint everything above `y_pt` white.
pub fn mask_above(image: &DynamicImage, y_pt: f32, scale: f32) -> DynamicImage {
    let mut rgba = image.to_rgba8();
    let limit = ((y_pt * scale).max(0.0) as u32).min(rgba.height());
    let width = rgba.width();
    for y in 0..limit {
        for x in 0..width {
            rgba.put_pixel(x, y, Rgba([255, 255, 255, 255]));
        }
    }
    DynamicImage::ImageRgba8(rgba)
}

/// Keep the full-width band between `top_pt` and `bottom_pt`, plus padding.
pub fn crop_band(
    image: &DynamicImage,
    top_pt: f32,
    bottom_pt: f32,
    scale: f32,
    padding_px: u32,
) -> DynamicImage {
    let height = image.height();
    let y0 = ((top_pt * scale).max(0.0) as u32).saturating_sub(padding_px);
    let y1 = ((bottom_pt * scale).max(0.0) as u32)
        .saturating_add(padding_px)
        .min(height);
    if y1 <= y0 {
        return image.clone();
    }
    image.crop_imm(0, y0, image.width(), y1 - y0)
}
