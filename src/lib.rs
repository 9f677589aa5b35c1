//! # fiyatex
//!
//! Extract product/price records from vendor price lists, spreadsheets and
//! PDFs alike, into one canonical dataset.
//!
//! ## Why this crate?
//!
//! Vendor price lists arrive as whatever the vendor's ERP exported that
//! year: spreadsheets with Turkish headers, text PDFs with whitespace
//! tables, scanned catalogues with no text layer at all. Parsing them with
//! a vision model alone is accurate but expensive; parsing them with
//! regexes alone is cheap but brittle. This crate runs a cascade: cheap
//! deterministic stages first, and only when their output fails a quality
//! gate does the document escalate to OCR and finally to per-page vision
//! model calls.
//!
//! ## Cascade Overview
//!
//! ```text
//! source (path / URL / bytes)
//!  │
//!  ├─ 1. Structured  spreadsheet columns via fuzzy Turkish header matching
//!  ├─ 2. TextTable   whitespace tables + line patterns in the PDF text layer
//!  ├─ 3. Quality     all-or-nothing gate (row count, code coverage)
//!  ├─ 4. Ocr         optional engine, recognised text sent as plain chat
//!  ├─ 5. VisionLlm   page PNGs with a timeout → retry → split ladder
//!  └─ 6. Normalize   price parsing, code/description split, brand, record codes
//! ```
//!
//! Extracted batches land in a [`MasterStore`]: an atomically rewritten CSV
//! snapshot plus a SQLite mirror, with update-mode supersession by brand,
//! year, and source file.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fiyatex::{extract, ExtractionConfig, SourceInput};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ExtractionConfig::default();
//!     let output = extract(&SourceInput::from_str_like("liste_2024.pdf"), &config).await?;
//!     println!("{} records", output.records.len());
//!     for outcome in &output.page_summary {
//!         eprintln!("page {}: {} ({} rows)", outcome.page_number, outcome.status, outcome.rows);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fiyatex` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! fiyatex = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod columns;
pub mod config;
pub mod debug_dump;
pub mod error;
pub mod extract;
pub mod guide;
pub mod master;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod retry;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, QualityThresholds};
pub use error::{ExtractError, ModelError, OcrError};
pub use extract::{extract, extract_document, extract_spreadsheet, Stage};
pub use guide::{ExtractionGuide, GuideEntry};
pub use master::{MasterStore, MergeMode, MergeReport};
pub use normalize::PriceStyle;
pub use pipeline::input::SourceInput;
pub use pipeline::llm::{ModelReply, VisionModel};
pub use pipeline::ocr::OcrEngine;
pub use progress::{ExtractionProgress, NoopProgress, ProgressHandle};
pub use record::{
    ExtractionOutput, PageOutcome, PageStatus, RawCandidate, Record, TokenCounts,
};
pub use retry::RetryPolicy;
