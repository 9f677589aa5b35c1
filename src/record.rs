//! Canonical record schema and per-stage result types.
//!
//! Every extraction stage (structured sheets, text patterns, embedded
//! tables, OCR, vision fallback) funnels into the same two shapes:
//!
//! * [`RawCandidate`]: the loose, at-least-`{description, raw price}` row a
//!   stage emits before normalisation.
//! * [`Record`]: the canonical, validated row after
//!   [`crate::normalize::normalize_records`] has run. Every surviving record
//!   has a non-empty description and a parsed decimal price; everything else
//!   may be absent.
//!
//! Stages also contribute [`PageOutcome`] entries to an append-only ledger so
//! callers can audit exactly what happened to each page, and the whole bundle
//! is returned by value as one [`ExtractionOutput`], no side channels.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One normalised product/price entry in the canonical schema.
///
/// The serde renames reproduce the persisted Turkish column order:
/// `Malzeme_Kodu, Açıklama, Kisa_Kod, Fiyat, Para_Birimi, Marka,
/// Kaynak_Dosya, Sayfa, Record_Code, Ana_Baslik, Alt_Baslik, Yil`.
/// Field order matters for tabular output; do not reorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Product code, when one was detected or recovered from the description.
    #[serde(rename = "Malzeme_Kodu")]
    pub code: Option<String>,

    /// Human-readable product name. Required.
    #[serde(rename = "Açıklama")]
    pub description: String,

    /// Secondary short code, when the source carries one.
    #[serde(rename = "Kisa_Kod")]
    pub short_code: Option<String>,

    /// Unit price. Required, non-negative.
    #[serde(rename = "Fiyat")]
    pub price: Decimal,

    /// Currency code (`EUR`, `USD`, `TRY`). Defaulted when undetectable.
    #[serde(rename = "Para_Birimi")]
    pub currency: String,

    /// Brand, from the filename or the description text.
    #[serde(rename = "Marka")]
    pub brand: Option<String>,

    /// Basename of the originating file.
    #[serde(rename = "Kaynak_Dosya")]
    pub source_file: String,

    /// 1-based page (or sheet ordinal) the row came from.
    #[serde(rename = "Sayfa")]
    pub source_page: Option<u32>,

    /// Synthetic `{file-stem}|{page}|{ordinal-within-page}` identifier,
    /// unique within one extraction run.
    #[serde(rename = "Record_Code")]
    pub record_code: String,

    /// Section heading the row sat under, when the source exposes one.
    #[serde(rename = "Ana_Baslik")]
    pub section_title: Option<String>,

    /// Subsection heading, when present.
    #[serde(rename = "Alt_Baslik")]
    pub subsection_title: Option<String>,

    /// Price-list year, recovered from year-bearing price headers.
    /// Participates in update-mode supersession.
    #[serde(rename = "Yil")]
    pub year: Option<i32>,
}

/// A raw candidate row as emitted by an extraction stage.
///
/// `price_raw` is the untouched source text ("1.234,56 TL"); currency
/// detection and decimal parsing happen during normalisation so every stage
/// can stay dumb about locale formats.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCandidate {
    pub code: Option<String>,
    pub short_code: Option<String>,
    pub description: String,
    pub price_raw: String,
    pub currency: Option<String>,
    /// 1-based page number (sheet ordinal for spreadsheets).
    pub page: Option<u32>,
    pub section: Option<String>,
    pub subsection: Option<String>,
    /// Year carried by the price column header, if any.
    pub year: Option<i32>,
}

/// Final status of one extraction attempt for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageStatus {
    /// The page contributed at least one candidate row.
    Success,
    /// The page was processed cleanly but produced nothing.
    Empty,
    /// Processing the page failed; `note` carries the message.
    Error,
    /// The page succeeded only after an immediate post-timeout retry.
    TimeoutRetry,
    /// The entry covers one half of a page that was split after repeated
    /// timeouts. Split pages contribute exactly two such entries.
    TimeoutSplit,
    /// The retry budget was exhausted; zero rows, not a document failure.
    GaveUp,
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PageStatus::Success => "success",
            PageStatus::Empty => "empty",
            PageStatus::Error => "error",
            PageStatus::TimeoutRetry => "timeout-retry",
            PageStatus::TimeoutSplit => "timeout-split",
            PageStatus::GaveUp => "gave-up",
        };
        f.write_str(s)
    }
}

/// One entry in a document's extraction ledger.
///
/// Entries are append-only: a retried or split page gets further entries for
/// the same page number, it never mutates earlier ones. First-attempt entries
/// appear in increasing page order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-based page number.
    pub page_number: u32,
    /// Candidate rows this entry contributed.
    pub rows: usize,
    pub status: PageStatus,
    /// Diagnostic note ("top half", error message, ...).
    pub note: Option<String>,
}

impl PageOutcome {
    pub fn new(page_number: u32, rows: usize, status: PageStatus) -> Self {
        Self {
            page_number,
            rows,
            status,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Token usage across all fallback calls for one document, for cost
/// observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenCounts {
    pub fn add(&mut self, input: u64, output: u64) {
        self.input_tokens += input;
        self.output_tokens += output;
    }

    pub fn merge(&mut self, other: TokenCounts) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// The immutable snapshot an extraction hands back to its caller.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
    /// Normalised records, in source order.
    pub records: Vec<Record>,
    /// Per-page ledger for document sources; empty for spreadsheets.
    pub page_summary: Vec<PageOutcome>,
    /// Token usage, when the fallback chain ran.
    pub token_counts: Option<TokenCounts>,
}

impl ExtractionOutput {
    /// True when no stage produced any usable record.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Synthesize `record_code` values for a batch of records in place.
///
/// The identifier is `{file-stem}|{page}|{ordinal-within-page}` with the
/// ordinal restarting at 1 on each page, matching the run-unique invariant.
/// Records with no page use `0` as the page component.
pub fn assign_record_codes(records: &mut [Record], file_stem: &str) {
    let mut per_page: HashMap<u32, usize> = HashMap::new();
    for rec in records.iter_mut() {
        let page = rec.source_page.unwrap_or(0);
        let ordinal = per_page.entry(page).or_insert(0);
        *ordinal += 1;
        rec.record_code = format!("{file_stem}|{page}|{ordinal}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rec(page: Option<u32>) -> Record {
        Record {
            code: None,
            description: "Elma".into(),
            short_code: None,
            price: dec!(10),
            currency: "TRY".into(),
            brand: None,
            source_file: "list.pdf".into(),
            source_page: page,
            record_code: String::new(),
            section_title: None,
            subsection_title: None,
            year: None,
        }
    }

    #[test]
    fn record_codes_restart_per_page() {
        let mut records = vec![rec(Some(1)), rec(Some(1)), rec(Some(2)), rec(Some(1))];
        assign_record_codes(&mut records, "list");
        let codes: Vec<&str> = records.iter().map(|r| r.record_code.as_str()).collect();
        assert_eq!(codes, vec!["list|1|1", "list|1|2", "list|2|1", "list|1|3"]);
    }

    #[test]
    fn record_codes_without_page_use_zero() {
        let mut records = vec![rec(None), rec(None)];
        assign_record_codes(&mut records, "list");
        assert_eq!(records[1].record_code, "list|0|2");
    }

    #[test]
    fn page_status_display_is_kebab_case() {
        assert_eq!(PageStatus::TimeoutSplit.to_string(), "timeout-split");
        assert_eq!(PageStatus::GaveUp.to_string(), "gave-up");
    }
}
