//! Embedded-table recovery from page text.
//!
//! PDF text extraction flattens tables into lines where cells are separated
//! by runs of whitespace. Splitting lines on 2+ spaces and grouping
//! consecutive multi-cell lines recovers the table shape well enough to run
//! the column matcher over it.

use crate::columns::{is_code_header, is_price_header, is_product_header, match_columns};
use crate::normalize::{detect_currency, normalize_price, PriceStyle};
use crate::record::RawCandidate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Leading product-code token: uppercase-shaped alnum at line start.
static CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^([A-ZÇĞİÖŞÜ0-9][A-ZÇĞİÖŞÜ0-9\-/]+)").unwrap());

static CELL_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Recover table blocks from page text.
///
/// A table is a run of 2+ consecutive lines that each split into 2+ cells
/// on whitespace runs. Single multi-cell lines and prose are left for the
/// line-pattern extractor.
pub fn detect_tables(text: &str) -> Vec<Vec<Vec<String>>> {
    let mut tables = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        let cells: Vec<String> = if trimmed.is_empty() {
            Vec::new()
        } else {
            CELL_SPLIT_RE
                .split(trimmed)
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect()
        };

        if cells.len() >= 2 {
            current.push(cells);
        } else {
            if current.len() >= 2 {
                tables.push(std::mem::take(&mut current));
            }
            current.clear();
        }
    }
    if current.len() >= 2 {
        tables.push(current);
    }
    tables
}

/// Project one table into raw candidates.
///
/// When the first row fuzzily matches known product/price headers it is
/// treated as a header row and the column matcher decides which columns
/// feed which fields. Otherwise the table is read positionally: first
/// column is the product, last column the price. A leading code token is
/// recovered from the first cell unless that cell is itself a header label.
pub fn candidates_from_table(
    table: &[Vec<String>],
    page: u32,
    style: PriceStyle,
) -> Vec<RawCandidate> {
    let Some(first_row) = table.first() else {
        return Vec::new();
    };

    let has_header = first_row
        .iter()
        .any(|c| is_product_header(c) || is_price_header(c));

    let (product_idx, price_idx, currency_idx, data_rows): (usize, PriceCol, Option<usize>, &[Vec<String>]) =
        if has_header {
            let map = match_columns(first_row);
            let product = map.description.or(map.code).unwrap_or(0);
            let price = map.price.map(PriceCol::Fixed).unwrap_or(PriceCol::Last);
            (product, price, map.currency, &table[1..])
        } else {
            debug!("page {page}: headerless table, positional fallback");
            (0, PriceCol::Last, None, table)
        };

    let mut candidates = Vec::new();
    for row in data_rows {
        let price_i = match price_idx {
            PriceCol::Fixed(i) => i,
            PriceCol::Last => row.len().saturating_sub(1),
        };
        let (Some(product), Some(price_raw)) = (row.get(product_idx), row.get(price_i)) else {
            continue;
        };
        let product = product.trim();
        let price_raw = price_raw.trim();
        if product.is_empty() || price_raw.is_empty() || product_idx == price_i {
            continue;
        }
        if normalize_price(price_raw, style).is_none() {
            warn!("page {page}: unparseable table price: {:.80}", price_raw);
            continue;
        }

        let code = row.first().and_then(|first| {
            let first = first.trim();
            match CODE_RE.captures(first) {
                Some(caps) if !is_code_header(first) => Some(caps[1].to_string()),
                _ => None,
            }
        });

        let currency = currency_idx
            .and_then(|i| row.get(i))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| detect_currency(price_raw).map(str::to_string));

        candidates.push(RawCandidate {
            code,
            description: product.to_string(),
            price_raw: price_raw.to_string(),
            currency,
            page: Some(page),
            ..Default::default()
        });
    }
    candidates
}

#[derive(Clone, Copy)]
enum PriceCol {
    Fixed(usize),
    Last,
}
