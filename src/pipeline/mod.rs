//! Mechanics under the cascade: input resolution, PDF rendering, image
//! encoding, OCR plumbing, and model access.
//!
//! The extraction logic itself lives in [`crate::extract`]; these modules
//! only move bytes around:
//!
//! - [`input`]: path/URL/buffer to a local file
//! - [`render`]: pdfium text layer and rasterisation
//! - [`encode`]: page image to base64 PNG, page splitting
//! - [`ocr`]: the black-box OCR seam
//! - [`llm`]: the model seam and provider resolution
//! - [`vision`]: the fallback stage with its timeout ladder

pub mod encode;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod render;
pub mod vision;
