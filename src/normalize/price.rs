//! Locale-aware price parsing and currency detection.
//!
//! Price lists in the wild mix European (`1.234,56`) and English
//! (`1,234.56`) digit grouping, often inside the same vendor's catalogue.
//! The parser strips everything that is not a digit or separator, then pins
//! the separator roles according to the requested [`PriceStyle`] instead of
//! guessing per string: a lone comma means decimal under `Eu` and grouping
//! under `En`, full stop.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Which separator convention a raw price string follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceStyle {
    /// Comma is the decimal mark, period groups thousands (`1.234,56`).
    #[default]
    Eu,
    /// Period is the decimal mark, comma groups thousands (`1,234.56`).
    En,
}

/// Parse a raw price string into a decimal value.
///
/// Currency symbols, whitespace and any other non-numeric decoration are
/// ignored. When both separators are present the style's decimal mark must
/// appear **last**, with the other separator grouping thousands; an input
/// shaped for the opposite style is rejected rather than misread. Returns
/// `None` for anything that does not survive as a number; a dropped row,
/// not an error.
///
/// ```
/// use fiyatex::normalize::{normalize_price, PriceStyle};
/// use rust_decimal::Decimal;
///
/// assert_eq!(
///     normalize_price("1.234,56 TL", PriceStyle::Eu),
///     Some(Decimal::new(123456, 2))
/// );
/// assert_eq!(normalize_price("not a number", PriceStyle::Eu), None);
/// ```
pub fn normalize_price(raw: &str, style: PriceStyle) -> Option<Decimal> {
    let stripped: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if stripped.is_empty() {
        return None;
    }

    let has_comma = stripped.contains(',');
    let has_period = stripped.contains('.');

    let canonical = match style {
        PriceStyle::Eu => {
            if has_comma && has_period {
                // Comma must be the last separator under Eu; a trailing
                // period marks an English-style string, which Eu rejects.
                if stripped.rfind('.') < stripped.rfind(',') {
                    stripped.replace('.', "").replace(',', ".")
                } else {
                    return None;
                }
            } else if has_comma {
                // A lone comma is always decimal under Eu.
                stripped.replace(',', ".")
            } else {
                stripped
            }
        }
        PriceStyle::En => {
            if has_comma && has_period {
                if stripped.rfind(',') < stripped.rfind('.') {
                    stripped.replace(',', "")
                } else {
                    stripped.replace('.', "").replace(',', ".")
                }
            } else if has_comma {
                // A lone comma never marks decimals under En.
                stripped.replace(',', "")
            } else {
                stripped
            }
        }
    };

    let value = Decimal::from_str(&canonical).ok()?;
    if value.is_sign_negative() {
        return None;
    }
    Some(value)
}

/// Currency codes in detection priority order. First match wins.
const CURRENCY_TOKENS: &[(&str, &str)] = &[
    ("€", "EUR"),
    ("EUR", "EUR"),
    ("$", "USD"),
    ("USD", "USD"),
    ("₺", "TRY"),
    ("TRY", "TRY"),
    ("TL", "TRY"),
];

/// Guess the currency mentioned in a text snippet.
///
/// Case-insensitive substring match against a priority-ordered token list:
/// Euro before Dollar before Lira. No match means the caller fills the
/// configured default downstream.
pub fn detect_currency(text: &str) -> Option<&'static str> {
    if text.is_empty() {
        return None;
    }
    let upper = text.to_uppercase();
    for (token, code) in CURRENCY_TOKENS {
        if upper.contains(token) {
            return Some(code);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn eu_mixed_separators() {
        assert_eq!(normalize_price("1.234,56", PriceStyle::Eu), Some(dec!(1234.56)));
        assert_eq!(
            normalize_price("1.234.567,89", PriceStyle::Eu),
            Some(dec!(1234567.89))
        );
    }

    #[test]
    fn en_mixed_separators() {
        assert_eq!(normalize_price("1,234.56", PriceStyle::En), Some(dec!(1234.56)));
        assert_eq!(
            normalize_price("1,234,567.89", PriceStyle::En),
            Some(dec!(1234567.89))
        );
    }

    #[test]
    fn lone_comma_depends_on_style() {
        // Eu: decimal mark. En: thousands separator. Style must change the
        // interpretation of the same string.
        assert_eq!(normalize_price("12,5", PriceStyle::Eu), Some(dec!(12.5)));
        assert_eq!(normalize_price("12,5", PriceStyle::En), Some(dec!(125)));
        // English-shaped input is rejected under Eu rather than misread.
        assert_eq!(normalize_price("1,234.56", PriceStyle::Eu), None);
        assert_ne!(
            normalize_price("1,234.56", PriceStyle::Eu),
            normalize_price("1,234.56", PriceStyle::En)
        );
    }

    #[test]
    fn decorations_are_stripped() {
        assert_eq!(
            normalize_price("  1.000,50 TL ", PriceStyle::Eu),
            Some(dec!(1000.50))
        );
        assert_eq!(normalize_price("€ 42", PriceStyle::Eu), Some(dec!(42)));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(normalize_price("not a number", PriceStyle::Eu), None);
        assert_eq!(normalize_price("", PriceStyle::Eu), None);
        assert_eq!(normalize_price("TL", PriceStyle::Eu), None);
        // Separators only, no digits.
        assert_eq!(normalize_price(",.", PriceStyle::Eu), None);
    }

    #[test]
    fn currency_priority_euro_first() {
        assert_eq!(detect_currency("100 € or $120"), Some("EUR"));
        assert_eq!(detect_currency("eur 50"), Some("EUR"));
        assert_eq!(detect_currency("$ 99,90"), Some("USD"));
        assert_eq!(detect_currency("1.250,00 TL"), Some("TRY"));
        assert_eq!(detect_currency("try"), Some("TRY"));
        assert_eq!(detect_currency("plain text"), None);
        assert_eq!(detect_currency(""), None);
    }
}
