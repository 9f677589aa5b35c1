//! Optional OCR stage between the quality gate and the vision fallback.
//!
//! The engine itself is a caller-supplied black box behind [`OcrEngine`];
//! this crate only rasterises pages for it and gates whether its text is
//! worth a model call. Recognition runs inside `spawn_blocking` since OCR
//! backends are CPU-bound native code.

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, OcrError};
use crate::pipeline::{encode, render};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Black-box character recognition over a PNG page image.
///
/// Implementations wrap whatever backend the caller runs (tesseract, a
/// hosted OCR API, ...). A failed page only loses that page's text.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, png: &[u8]) -> Result<String, OcrError>;
}

/// Run OCR over every page and return `(page_number, text)` pairs.
///
/// Pages are rendered at `ocr_dpi` resolution independent of the vision
/// render. Pages whose recognition fails or comes back blank are dropped;
/// an all-blank document returns an empty vector so the cascade can move
/// straight to the vision stage without a model call.
pub async fn recognize_pages(
    engine: &Arc<dyn OcrEngine>,
    pdf_path: &Path,
    config: &ExtractionConfig,
) -> Result<Vec<(u32, String)>, ExtractError> {
    // ocr_dpi drives a larger pixel cap than the vision render uses.
    let max_pixels = config
        .max_rendered_pixels
        .saturating_mul(config.ocr_dpi)
        .checked_div(config.dpi.max(1))
        .unwrap_or(config.max_rendered_pixels);

    let pages = render::render_pages(pdf_path, max_pixels, &[]).await?;
    info!("OCR stage: {} pages rendered", pages.len());

    let mut texts = Vec::with_capacity(pages.len());
    for (page_number, image) in pages {
        let png = encode::png_bytes(&image)
            .map_err(|e| ExtractError::Internal(format!("PNG encode: {e}")))?;

        let engine = Arc::clone(engine);
        let recognized = tokio::task::spawn_blocking(move || engine.recognize(&png))
            .await
            .map_err(|e| ExtractError::Internal(format!("OCR task panicked: {e}")))?;

        match recognized {
            Ok(text) if !text.trim().is_empty() => {
                debug!("page {page_number}: OCR produced {} chars", text.len());
                texts.push((page_number, text));
            }
            Ok(_) => debug!("page {page_number}: OCR produced no text"),
            Err(e) => warn!("page {page_number}: OCR failed: {e}"),
        }
    }
    Ok(texts)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedText(&'static str);

    impl OcrEngine for FixedText {
        fn recognize(&self, _png: &[u8]) -> Result<String, OcrError> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    impl OcrEngine for Failing {
        fn recognize(&self, _png: &[u8]) -> Result<String, OcrError> {
            Err(OcrError::Engine("backend crashed".into()))
        }
    }

    #[test]
    fn engine_trait_is_object_safe() {
        let engines: Vec<Arc<dyn OcrEngine>> =
            vec![Arc::new(FixedText("AB-1  Vana  10,00")), Arc::new(Failing)];
        assert!(engines[0].recognize(&[]).is_ok());
        assert!(engines[1].recognize(&[]).is_err());
    }
}
