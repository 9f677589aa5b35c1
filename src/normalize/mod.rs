//! Canonicalisation of raw stage output into [`Record`]s.
//!
//! Every extraction stage emits loosely-shaped [`RawCandidate`]s; this module
//! turns them into the canonical schema in a fixed order: parse the price,
//! recover an embedded code, settle the currency, settle the brand, then
//! synthesise per-page record codes. Rows that cannot produce a description
//! and a price are dropped here, silently.

mod brand;
mod price;
mod split;

pub use brand::{detect_brand, slugify};
pub use price::{detect_currency, normalize_price, PriceStyle};
pub use split::split_code_description;

use crate::record::{assign_record_codes, RawCandidate, Record};
use rust_decimal::Decimal;
use std::path::Path;
use tracing::debug;

/// Normalise raw candidates from any stage into canonical records.
///
/// `source_file` is the originating file name (it feeds `Kaynak_Dosya`,
/// brand detection, and the record-code stem). Candidates whose price fails
/// to parse or whose description trims to nothing are skipped.
pub fn normalize_records(
    candidates: Vec<RawCandidate>,
    source_file: &str,
    default_currency: &str,
    style: PriceStyle,
) -> Vec<Record> {
    let file_stem = Path::new(source_file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_file.to_string());
    let brand_from_file = detect_brand(source_file);

    let total = candidates.len();
    let mut records = Vec::with_capacity(total);
    for candidate in candidates {
        if let Some(record) = normalize_one(
            candidate,
            source_file,
            brand_from_file.as_deref(),
            default_currency,
            style,
        ) {
            records.push(record);
        }
    }
    if records.len() < total {
        debug!(
            "{}: dropped {} of {} candidates during normalisation",
            source_file,
            total - records.len(),
            total
        );
    }

    assign_record_codes(&mut records, &file_stem);
    records
}

fn normalize_one(
    candidate: RawCandidate,
    source_file: &str,
    brand_from_file: Option<&str>,
    default_currency: &str,
    style: PriceStyle,
) -> Option<Record> {
    let price: Decimal = normalize_price(&candidate.price_raw, style)?;
    let description = candidate.description.trim().to_string();
    if description.is_empty() {
        return None;
    }

    let (code, description) = match candidate.code {
        Some(code) => (Some(code), description),
        None => split_code_description(&description),
    };
    if description.is_empty() {
        return None;
    }

    // An explicit currency cell wins, then a token in the raw price text.
    let currency = candidate
        .currency
        .as_deref()
        .and_then(detect_currency)
        .or_else(|| detect_currency(&candidate.price_raw))
        .unwrap_or(default_currency)
        .to_string();

    let brand = brand_from_file
        .map(str::to_string)
        .or_else(|| detect_brand(&description));

    Some(Record {
        code,
        description,
        short_code: candidate.short_code,
        price,
        currency,
        brand,
        source_file: source_file.to_string(),
        source_page: candidate.page,
        record_code: String::new(),
        section_title: candidate.section,
        subsection_title: candidate.subsection,
        year: candidate.year,
    })
}
