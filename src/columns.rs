//! Fuzzy header matching for spreadsheet and table columns.
//!
//! Price lists name the same column a dozen different ways: `Ürün Kodu`,
//! `MALZEME`, `Stok Kodu`, `part no`. Headers are normalised (diacritics
//! folded, lowercased, separators collapsed) and compared against per-target
//! vocabularies, first exactly and then by `normalized_levenshtein` so minor
//! misspellings like `Fyat` still resolve.

use once_cell::sync::Lazy;
use regex::Regex;
use strsim::normalized_levenshtein;
use tracing::{debug, info};

/// Minimum similarity for a fuzzy header match.
const FUZZY_CUTOFF: f64 = 0.75;

const CODE_HEADERS: &[&str] = &[
    "ürün kodu",
    "urun kodu",
    "malzeme kodu",
    "malzeme",
    "stok kodu",
    "kod",
    "tip",
    "ref no",
    "ref.",
    "ürün ref",
    "ürün tip",
    "product code",
    "part no",
    "item name",
    "item no",
    "item number",
    "item #",
];

const SHORT_CODE_HEADERS: &[&str] = &[
    "kısa kod",
    "kisa kod",
    "short code",
    "shortcode",
    "kısa ürün kodu",
];

const DESC_HEADERS: &[&str] = &[
    "description",
    "ürün açıklaması",
    "açıklama",
    "aciklama",
    "ürün adı",
    "urun adi",
    "malzeme adı",
    "product name",
    "özellikler",
    "detay",
    "explanation",
];

const PRICE_HEADERS: &[&str] = &[
    "fiyat",
    "birim fiyat",
    "liste fiyatı",
    "price",
    "unit price",
    "list price",
    "tutar",
];

const CURRENCY_HEADERS: &[&str] = &["para birimi", "currency"];

const SECTION_HEADERS: &[&str] = &["ana başlık", "ana baslik", "ana_baslik"];

const SUBSECTION_HEADERS: &[&str] = &["alt başlık", "alt baslik", "alt_baslik"];

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(19|20)\d{2}").unwrap());

/// Semantic targets resolved to column indices, any of which may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub code: Option<usize>,
    pub short_code: Option<usize>,
    pub description: Option<usize>,
    pub price: Option<usize>,
    pub currency: Option<usize>,
    pub section: Option<usize>,
    pub subsection: Option<usize>,
    /// Year carried by the matched price header, when it has one.
    pub price_year: Option<i32>,
}

impl ColumnMap {
    /// A sheet is usable when an identifying column and a price column exist.
    pub fn is_usable(&self) -> bool {
        (self.code.is_some() || self.description.is_some()) && self.price.is_some()
    }
}

/// Normalise a header cell for matching: fold Turkish diacritics, lowercase,
/// treat underscores as spaces, collapse whitespace runs.
pub fn normalize_header(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars() {
        let folded = match c {
            'ç' | 'Ç' => 'c',
            'ğ' | 'Ğ' => 'g',
            'ı' | 'İ' => 'i',
            'ö' | 'Ö' => 'o',
            'ş' | 'Ş' => 's',
            'ü' | 'Ü' => 'u',
            '_' => ' ',
            other => other,
        };
        if folded.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            for lower in folded.to_lowercase() {
                out.push(lower);
            }
        }
    }
    out
}

/// Resolve semantic targets against a header row.
///
/// Each vocabulary is scanned in order and claims the first still-unclaimed
/// column it matches, exact first and fuzzy second, so a header that could
/// serve two targets goes to the higher-priority one. When no price header
/// matches at all, the column whose header carries the most recent 4-digit
/// year wins (a "price by year" table). The final mapping is logged so an
/// operator can audit which physical columns fed which fields.
pub fn match_columns(headers: &[String]) -> ColumnMap {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let mut used = vec![false; headers.len()];
    let mut map = ColumnMap::default();

    map.code = claim(&normalized, &mut used, CODE_HEADERS);
    map.short_code = claim(&normalized, &mut used, SHORT_CODE_HEADERS);
    map.description = claim(&normalized, &mut used, DESC_HEADERS);
    map.price = claim(&normalized, &mut used, PRICE_HEADERS);

    if map.price.is_none() {
        if let Some((idx, year)) = latest_year_column(&normalized, &used) {
            used[idx] = true;
            map.price = Some(idx);
            map.price_year = Some(year);
        }
    } else if let Some(idx) = map.price {
        map.price_year = extract_year(&normalized[idx]);
    }

    map.currency = claim(&normalized, &mut used, CURRENCY_HEADERS);
    map.section = claim(&normalized, &mut used, SECTION_HEADERS);
    map.subsection = claim(&normalized, &mut used, SUBSECTION_HEADERS);

    info!(
        "column mapping: code={:?} short={:?} desc={:?} price={:?} (year={:?}) currency={:?} section={:?} subsection={:?} from {:?}",
        map.code.map(|i| headers[i].as_str()),
        map.short_code.map(|i| headers[i].as_str()),
        map.description.map(|i| headers[i].as_str()),
        map.price.map(|i| headers[i].as_str()),
        map.price_year,
        map.currency.map(|i| headers[i].as_str()),
        map.section.map(|i| headers[i].as_str()),
        map.subsection.map(|i| headers[i].as_str()),
        headers,
    );

    map
}

/// Does `cell` look like a product-identifying header (code, short code or
/// description)? Used by the table extractor to spot header rows.
pub fn is_product_header(cell: &str) -> bool {
    fuzzy_in(cell, CODE_HEADERS)
        || fuzzy_in(cell, SHORT_CODE_HEADERS)
        || fuzzy_in(cell, DESC_HEADERS)
}

/// Does `cell` look like a price header?
pub fn is_price_header(cell: &str) -> bool {
    fuzzy_in(cell, PRICE_HEADERS)
}

/// Does `cell` look like a code-column header? A leading table cell that
/// matches here is a label, not a product code.
pub fn is_code_header(cell: &str) -> bool {
    fuzzy_in(cell, CODE_HEADERS)
}

fn fuzzy_in(cell: &str, vocab: &[&str]) -> bool {
    let normalized = normalize_header(cell);
    if normalized.is_empty() {
        return false;
    }
    vocab.iter().any(|entry| {
        let entry = normalize_header(entry);
        normalized == entry || normalized_levenshtein(&normalized, &entry) >= FUZZY_CUTOFF
    })
}

/// Claim the first unclaimed column matching any vocabulary entry.
///
/// Vocabulary entries are written in their natural form and normalised here
/// so the lists stay readable.
fn claim(normalized: &[String], used: &mut [bool], vocab: &[&str]) -> Option<usize> {
    let vocab_normalized: Vec<String> = vocab.iter().map(|v| normalize_header(v)).collect();
    for entry in &vocab_normalized {
        for (idx, header) in normalized.iter().enumerate() {
            if !used[idx] && header == entry {
                used[idx] = true;
                return Some(idx);
            }
        }
    }
    // No exact hit anywhere; take the closest fuzzy match above the cutoff.
    let mut best: Option<(usize, f64)> = None;
    for entry in &vocab_normalized {
        for (idx, header) in normalized.iter().enumerate() {
            if used[idx] || header.is_empty() {
                continue;
            }
            let score = normalized_levenshtein(header, entry);
            if score >= FUZZY_CUTOFF && best.map_or(true, |(_, b)| score > b) {
                best = Some((idx, score));
            }
        }
    }
    if let Some((idx, score)) = best {
        debug!(
            "fuzzy header match: {:?} (score {:.2})",
            normalized[idx], score
        );
        used[idx] = true;
        return Some(idx);
    }
    None
}

/// Pick the unclaimed column whose header carries the maximum year token.
fn latest_year_column(normalized: &[String], used: &[bool]) -> Option<(usize, i32)> {
    let mut best: Option<(usize, i32)> = None;
    for (idx, header) in normalized.iter().enumerate() {
        if used[idx] {
            continue;
        }
        if let Some(year) = extract_year(header) {
            if best.map_or(true, |(_, b)| year > b) {
                best = Some((idx, year));
            }
        }
    }
    best
}

fn extract_year(text: &str) -> Option<i32> {
    YEAR_RE
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalizes_turkish_headers() {
        assert_eq!(normalize_header("Ürün_Açıklaması"), "urun aciklamasi");
        assert_eq!(normalize_header("  LİSTE   FİYATI "), "liste fiyati");
    }

    #[test]
    fn malzeme_plus_fiyat_resolves_code_column() {
        let map = match_columns(&headers(&["MALZEME", "Fiyat"]));
        assert_eq!(map.code, Some(0));
        assert_eq!(map.price, Some(1));
        assert!(map.is_usable());
    }

    #[test]
    fn year_fallback_picks_maximum_year() {
        let map = match_columns(&headers(&["Ürün Kodu", "2022", "2024", "2023"]));
        assert_eq!(map.code, Some(0));
        assert_eq!(map.price, Some(2));
        assert_eq!(map.price_year, Some(2024));
    }

    #[test]
    fn price_header_year_is_extracted() {
        let map = match_columns(&headers(&["Malzeme Kodu", "2025 Liste Fiyatı"]));
        assert_eq!(map.price, Some(1));
        assert_eq!(map.price_year, Some(2025));
    }

    #[test]
    fn fuzzy_match_tolerates_typos() {
        let map = match_columns(&headers(&["Ürün Kdou", "Fyat"]));
        assert_eq!(map.code, Some(0));
        assert_eq!(map.price, Some(1));
    }

    #[test]
    fn unusable_without_price() {
        let map = match_columns(&headers(&["Açıklama", "Not"]));
        assert_eq!(map.description, Some(0));
        assert!(map.price.is_none());
        assert!(!map.is_usable());
    }

    #[test]
    fn columns_are_not_claimed_twice() {
        // "Kod" could fuzzy-match several vocabularies but must only ever
        // serve the code target.
        let map = match_columns(&headers(&["Kod", "Fiyat", "Para Birimi"]));
        assert_eq!(map.code, Some(0));
        assert_eq!(map.price, Some(1));
        assert_eq!(map.currency, Some(2));
        assert_eq!(map.short_code, None);
    }
}
