//! The extraction cascade: cheap structured stages first, the vision
//! fallback last.
//!
//! ```text
//! spreadsheet ──► Structured ───────────────────────────┐
//!                                                       ▼
//! document ────► TextTable ──► QualityCheck ──► Ocr ──► VisionLlm
//!                                   │accept      │rows      │
//!                                   ▼            ▼          ▼
//!                                Normalize ◄────────────────┘
//! ```
//!
//! Escalation is all-or-nothing: when the quality gate rejects a cheap
//! result, every cheap row is discarded and the fallback result stands
//! alone. Rows from different stages are never mixed for one document.

pub mod quality;
pub mod sheet;
pub mod table;
pub mod text;

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::normalize::normalize_records;
use crate::pipeline::input::{self, SourceInput};
use crate::pipeline::llm::{ProviderVisionModel, VisionModel};
use crate::pipeline::vision::VisionOutcome;
use crate::pipeline::{ocr, render, vision};
use crate::record::{ExtractionOutput, PageOutcome, PageStatus, RawCandidate};
use quality::GateDecision;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Where a document currently sits in the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Spreadsheet column projection.
    Structured,
    /// Embedded tables and line patterns in the PDF text layer.
    TextTable,
    /// The all-or-nothing gate over the cheap result.
    QualityCheck,
    /// OCR text recovery, fed through the model as plain text.
    Ocr,
    /// Per-page vision calls with the timeout ladder.
    VisionLlm,
    /// Candidate rows become canonical records.
    Normalize,
    Done,
}

/// Extract one source, dispatching on its extension.
///
/// Spreadsheets (`.xlsx`, `.xls`, `.xlsm`, `.ods`) take the structured
/// path and never touch the model; everything else is treated as a
/// document and enters the cascade.
pub async fn extract(
    input: &SourceInput,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let file_name = input.file_name();
    if input::is_spreadsheet_name(&file_name) {
        extract_spreadsheet(input, config).await
    } else {
        extract_document(input, config).await
    }
}

/// Structured extraction for spreadsheet sources.
///
/// Each sheet's header row is matched against the column vocabulary; sheets
/// with no usable mapping are skipped. The page ledger stays empty, there
/// are no pages to account for.
pub async fn extract_spreadsheet(
    input: &SourceInput,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let file_name = input.file_name();
    status(config, &format!("reading workbook {file_name}"));

    let sheets = match input {
        SourceInput::Bytes { data, filename } => sheet::load_workbook_from_bytes(data, filename)?,
        _ => {
            let resolved = input::resolve(input, config.download_timeout_secs).await?;
            sheet::load_workbook(resolved.path(), &file_name)?
        }
    };

    let candidates = sheet::candidates_from_sheets(&sheets);
    info!("{file_name}: {} candidate rows from {} sheets", candidates.len(), sheets.len());

    let records = normalize_records(
        candidates,
        &file_name,
        &config.default_currency,
        config.price_style,
    );
    Ok(ExtractionOutput {
        records,
        page_summary: Vec::new(),
        token_counts: None,
    })
}

/// Run a document source through the cascade.
pub async fn extract_document(
    input: &SourceInput,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let file_name = input.file_name();
    let resolved = input::resolve(input, config.download_timeout_secs).await?;

    let mut stage = if config.force_fallback {
        info!("{file_name}: cheap stages disabled, going straight to the model");
        Stage::VisionLlm
    } else {
        Stage::TextTable
    };

    let mut cheap: Vec<RawCandidate> = Vec::new();
    let mut cheap_outcomes: Vec<PageOutcome> = Vec::new();
    let mut fallback = VisionOutcome::default();
    let mut model: Option<Arc<dyn VisionModel>> = None;

    loop {
        debug!("{file_name}: stage {stage:?}");
        stage = match stage {
            Stage::Structured => unreachable!("documents never enter the structured stage"),

            Stage::TextTable => {
                status(config, &format!("scanning text layer of {file_name}"));
                let texts = render::extract_page_texts(resolved.path()).await?;
                (cheap, cheap_outcomes) = cheap_pass(&texts, config);
                Stage::QualityCheck
            }

            Stage::QualityCheck => {
                let records = normalize_records(
                    cheap.clone(),
                    &file_name,
                    &config.default_currency,
                    config.price_style,
                );
                match quality::evaluate(&records, &config.quality) {
                    GateDecision::Accept => {
                        return Ok(ExtractionOutput {
                            records,
                            page_summary: cheap_outcomes,
                            token_counts: None,
                        });
                    }
                    GateDecision::Escalate => {
                        cheap.clear();
                        cheap_outcomes.clear();
                        Stage::Ocr
                    }
                }
            }

            Stage::Ocr => match config.ocr {
                Some(ref engine) => {
                    status(config, &format!("running OCR over {file_name}"));
                    let texts = ocr::recognize_pages(engine, resolved.path(), config).await?;
                    if texts.is_empty() {
                        info!("{file_name}: OCR found no text, skipping to vision");
                        Stage::VisionLlm
                    } else {
                        let m = resolve_model(&mut model, config)?;
                        let outcome =
                            vision::extract_from_texts(&m, texts, &file_name, config).await;
                        if outcome.candidates.is_empty() {
                            fallback.tokens.merge(outcome.tokens);
                            Stage::VisionLlm
                        } else {
                            merge_outcome(&mut fallback, outcome);
                            Stage::Normalize
                        }
                    }
                }
                None => {
                    debug!("{file_name}: no OCR engine configured");
                    Stage::VisionLlm
                }
            },

            Stage::VisionLlm => {
                status(config, &format!("vision fallback for {file_name}"));
                let m = resolve_model(&mut model, config)?;
                let pages =
                    render::render_pages(resolved.path(), config.max_rendered_pixels, &[]).await?;
                let outcome = vision::extract_pages(&m, pages, &file_name, config).await;
                merge_outcome(&mut fallback, outcome);
                Stage::Normalize
            }

            Stage::Normalize => {
                let records = normalize_records(
                    std::mem::take(&mut fallback.candidates),
                    &file_name,
                    &config.default_currency,
                    config.price_style,
                );
                return Ok(ExtractionOutput {
                    records,
                    page_summary: std::mem::take(&mut fallback.outcomes),
                    token_counts: Some(fallback.tokens),
                });
            }

            Stage::Done => return Ok(ExtractionOutput::default()),
        };
    }
}

/// TextTable stage body: per page, table blocks first, line patterns as
/// the fallback for pages without a recoverable table.
fn cheap_pass(
    texts: &[(u32, String)],
    config: &ExtractionConfig,
) -> (Vec<RawCandidate>, Vec<PageOutcome>) {
    let mut candidates = Vec::new();
    let mut outcomes = Vec::new();

    for (page, text) in texts {
        let mut page_rows: Vec<RawCandidate> = detect_tables_on_page(text, *page, config);
        if page_rows.is_empty() {
            page_rows = text::candidates_from_text(text, *page, config.price_style);
        }

        let status = if page_rows.is_empty() {
            PageStatus::Empty
        } else {
            PageStatus::Success
        };
        outcomes.push(PageOutcome::new(*page, page_rows.len(), status));
        candidates.extend(page_rows);
    }
    (candidates, outcomes)
}

fn detect_tables_on_page(text: &str, page: u32, config: &ExtractionConfig) -> Vec<RawCandidate> {
    table::detect_tables(text)
        .iter()
        .flat_map(|t| table::candidates_from_table(t, page, config.price_style))
        .collect()
}

/// Resolve the model once and reuse it across the OCR and vision stages.
fn resolve_model(
    slot: &mut Option<Arc<dyn VisionModel>>,
    config: &ExtractionConfig,
) -> Result<Arc<dyn VisionModel>, ExtractError> {
    if let Some(ref m) = slot {
        return Ok(Arc::clone(m));
    }
    let provider = crate::pipeline::llm::resolve_provider(config)?;
    let model: Arc<dyn VisionModel> = Arc::new(ProviderVisionModel::new(provider, config));
    *slot = Some(Arc::clone(&model));
    Ok(model)
}

fn merge_outcome(into: &mut VisionOutcome, from: VisionOutcome) {
    into.candidates.extend(from.candidates);
    into.outcomes.extend(from.outcomes);
    into.tokens.merge(from.tokens);
}

fn status(config: &ExtractionConfig, message: &str) {
    if let Some(ref cb) = config.progress {
        cb.on_status(message);
    }
}

/// Stem used for record codes and debug artifacts of one source.
pub fn source_stem(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cheap_pass_prefers_tables_then_lines() {
        let config = ExtractionConfig::default();
        let texts = vec![
            (
                1,
                "AB-1  Kelebek vana  1.250,00\nAB-2  Surgulu vana  2.100,00\n".to_string(),
            ),
            (2, "Item Code: X-9 Price: 10,00\n".to_string()),
            (3, "sadece metin, fiyat yok\n".to_string()),
        ];
        let (candidates, outcomes) = cheap_pass(&texts, &config);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].status, PageStatus::Success);
        assert_eq!(outcomes[1].status, PageStatus::Success);
        assert_eq!(outcomes[2].status, PageStatus::Empty);
        assert!(candidates.iter().any(|c| c.description == "X-9"));
        assert!(candidates.iter().any(|c| c.page == Some(1)));
    }

    #[test]
    fn source_stem_strips_extension() {
        assert_eq!(source_stem("Bosch_2024.pdf"), "Bosch_2024");
        assert_eq!(source_stem("liste"), "liste");
    }
}
