//! Line-oriented regex extraction from document text.
//!
//! Handles price lists with no recoverable table structure: each page's text
//! is scanned line by line with a fixed priority list of patterns for the
//! layouts seen in the wild. Name/description separation happens later in
//! the normalizer, not here.

use crate::normalize::{detect_currency, normalize_price, PriceStyle};
use crate::record::RawCandidate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

/// Patterns in priority order:
/// 1. name, a run of 2+ spaces, numeric price, optional currency, end of line
/// 2. uppercase alnum code/name token (5–50 chars) followed by a price
/// 3./4. explicit labeled pairs, English and Turkish
static LINE_PATTERNS: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)^(.*?)\s{2,}([\d.,]+)\s*(?:TL|TRY|EUR|USD|\$|€)?$").unwrap(),
        Regex::new(r"(?i)([A-Z0-9\-\s/]{5,50})\s+([\d.,]+)\s*(?:TL|TRY|EUR|USD|\$|€)?").unwrap(),
        Regex::new(r"(?i)Item Code:\s*(.*?)\s*Price:\s*([\d.,]+)").unwrap(),
        Regex::new(r"(?i)Ürün No:\s*(.*?)\s*Birim Fiyat:\s*([\d.,]+)").unwrap(),
    ]
});

static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Scan one page's text for (name, price) pairs.
///
/// Lines shorter than 5 characters are skipped. Each pattern contributes at
/// most one pair per line; a pair whose price does not normalize is
/// rejected. Currency is detected from the whole line so a trailing token
/// like `EUR` counts even though the price capture is digits-only.
pub fn candidates_from_text(text: &str, page: u32, style: PriceStyle) -> Vec<RawCandidate> {
    let mut candidates = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.chars().count() < 5 {
            continue;
        }
        for pattern in LINE_PATTERNS.iter() {
            let Some(caps) = pattern.captures(line) else {
                continue;
            };
            let name = MULTI_SPACE_RE
                .replace_all(caps[1].trim(), " ")
                .into_owned();
            let price_raw = caps[2].to_string();
            if name.is_empty() || normalize_price(&price_raw, style).is_none() {
                continue;
            }
            trace!("page {page}: line matched: {:.100}", line);
            candidates.push(RawCandidate {
                description: name,
                price_raw,
                currency: detect_currency(line).map(str::to_string),
                page: Some(page),
                ..Default::default()
            });
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Vec<RawCandidate> {
        candidates_from_text(text, 1, PriceStyle::Eu)
    }

    #[test]
    fn spaced_name_price_line() {
        let out = extract("Kelebek vana DN50   1.250,00 TL\n");
        assert!(!out.is_empty());
        assert_eq!(out[0].description, "Kelebek vana DN50");
        assert_eq!(out[0].price_raw, "1.250,00");
        assert_eq!(out[0].currency.as_deref(), Some("TRY"));
        assert_eq!(out[0].page, Some(1));
    }

    #[test]
    fn labeled_pairs() {
        let out = extract("Item Code: AB-12 Price: 99,50\n");
        assert!(out.iter().any(|c| c.description == "AB-12" && c.price_raw == "99,50"));

        let out = extract("Ürün No: XY-9 Birim Fiyat: 10,00\n");
        assert!(out.iter().any(|c| c.description == "XY-9"));
    }

    #[test]
    fn short_lines_and_priceless_lines_skipped() {
        assert!(extract("ab\n").is_empty());
        assert!(extract("Genel satış koşulları sayfası\n").is_empty());
    }

    #[test]
    fn unparseable_price_rejected() {
        // The price capture only admits digits and separators, so a line
        // whose numeric tail strips to nothing never makes it through.
        let out = extract("Vana DN50   ,.\n");
        assert!(out.is_empty());
    }

    #[test]
    fn internal_runs_of_spaces_collapse() {
        let out = extract("Celik  boru   3/4   45,90\n");
        assert!(out
            .iter()
            .any(|c| !c.description.contains("  ")));
    }
}
