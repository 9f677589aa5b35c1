//! PDF access: page text for the cheap stages, rasterised images for the
//! OCR and vision fallbacks.
//!
//! pdfium wraps a C++ library with thread-local state that must not run on
//! Tokio worker threads, so every document open happens inside
//! `tokio::task::spawn_blocking`.
//!
//! Rendering caps the longest edge in pixels rather than trusting DPI:
//! page sizes vary wildly and an unbounded A0 render would blow past both
//! memory and the vision model's useful resolution.

use crate::error::ExtractError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Extract the embedded text layer of every page.
///
/// Returns `(page_number_1based, text)` in page order. Pages with no text
/// layer yield empty strings; scanned documents produce all-empty output,
/// which is what pushes them down the cascade.
pub async fn extract_page_texts(pdf_path: &Path) -> Result<Vec<(u32, String)>, ExtractError> {
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || extract_page_texts_blocking(&path))
        .await
        .map_err(|e| ExtractError::Internal(format!("text task panicked: {e}")))?
}

fn extract_page_texts_blocking(pdf_path: &Path) -> Result<Vec<(u32, String)>, ExtractError> {
    let pdfium = Pdfium::default();
    let document = open_document(&pdfium, pdf_path)?;

    let pages = document.pages();
    info!("document loaded: {} pages", pages.len());

    let mut texts = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let page_number = idx as u32 + 1;
        let text = page
            .text()
            .map(|t| t.all())
            .unwrap_or_default();
        debug!("page {page_number}: {} chars of text", text.len());
        texts.push((page_number, text));
    }
    Ok(texts)
}

/// Rasterise the given 1-based pages into images.
///
/// `pages` empty means all pages. Out-of-range numbers are skipped.
pub async fn render_pages(
    pdf_path: &Path,
    max_pixels: u32,
    pages: &[u32],
) -> Result<Vec<(u32, DynamicImage)>, ExtractError> {
    let path = pdf_path.to_path_buf();
    let wanted = pages.to_vec();
    tokio::task::spawn_blocking(move || render_pages_blocking(&path, max_pixels, &wanted))
        .await
        .map_err(|e| ExtractError::Internal(format!("render task panicked: {e}")))?
}

fn render_pages_blocking(
    pdf_path: &Path,
    max_pixels: u32,
    wanted: &[u32],
) -> Result<Vec<(u32, DynamicImage)>, ExtractError> {
    let pdfium = Pdfium::default();
    let document = open_document(&pdfium, pdf_path)?;

    let pages = document.pages();
    let total = pages.len() as u32;

    let targets: Vec<u32> = if wanted.is_empty() {
        (1..=total).collect()
    } else {
        wanted.iter().copied().filter(|&p| p >= 1 && p <= total).collect()
    };

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(targets.len());
    for page_number in targets {
        let page = pages
            .get((page_number - 1) as u16)
            .map_err(|e| ExtractError::RasterisationFailed {
                page: page_number,
                detail: format!("{e:?}"),
            })?;

        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| ExtractError::RasterisationFailed {
                    page: page_number,
                    detail: format!("{e:?}"),
                })?;

        let image = bitmap.as_image();
        debug!(
            "rendered page {page_number} at {}x{} px",
            image.width(),
            image.height()
        );
        results.push((page_number, image));
    }
    Ok(results)
}

/// Number of pages without touching text or pixels.
pub async fn page_count(pdf_path: &Path) -> Result<u32, ExtractError> {
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let pdfium = Pdfium::default();
        let document = open_document(&pdfium, &path)?;
        Ok(document.pages().len() as u32)
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("page count task panicked: {e}")))?
}

fn open_document<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, ExtractError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| ExtractError::CorruptDocument {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })
}
