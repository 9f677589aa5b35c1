//! Brand inference from source file names.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static EXT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[A-Za-z0-9]{2,4}$").unwrap());
static TOKEN_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_-]+").unwrap());

/// Infer a brand name from a file name or path.
///
/// Only inputs that look like file names (a 2-4 character extension) are
/// considered. The brand is the leading run of tokens in the stem: the
/// first token containing a letter, extended by subsequent tokens that are
/// capitalised or all-uppercase. `Bosch_fiyat_listesi_2024.pdf` yields
/// `Bosch`; a bare description yields `None`.
pub fn detect_brand(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    let base = Path::new(text)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())?;
    if !EXT_RE.is_match(&base) {
        return None;
    }
    let stem = match base.rfind('.') {
        Some(idx) => &base[..idx],
        None => base.as_str(),
    };

    let mut parts: Vec<&str> = Vec::new();
    for token in TOKEN_SPLIT_RE.split(stem) {
        if token.is_empty() {
            continue;
        }
        if parts.is_empty() {
            if token.chars().any(|c| c.is_alphabetic()) {
                parts.push(token);
            }
            continue;
        }
        let capitalised = token.chars().next().is_some_and(|c| c.is_uppercase());
        // Uppercase-shaped means at least one letter and no lowercase ones,
        // so a bare year token does not extend the brand run.
        let all_upper = token.chars().any(|c| c.is_uppercase())
            && !token.chars().any(|c| c.is_lowercase());
        if capitalised || all_upper {
            parts.push(token);
        } else {
            break;
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Reduce a file name or brand to a lowercase ASCII slug for matching.
///
/// Turkish diacritics fold to their ASCII base letter; anything outside
/// `[a-z0-9]` collapses into single hyphens.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_hyphen = true;
    for c in text.chars() {
        let folded = match c {
            'ç' | 'Ç' => 'c',
            'ğ' | 'Ğ' => 'g',
            'ı' | 'İ' => 'i',
            'ö' | 'Ö' => 'o',
            'ş' | 'Ş' => 's',
            'ü' | 'Ü' => 'u',
            other => other,
        };
        let lower = folded.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() {
            out.push(lower);
            last_hyphen = false;
        } else if !last_hyphen {
            out.push('-');
            last_hyphen = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_tokens_from_filename() {
        assert_eq!(
            detect_brand("Bosch_fiyat_listesi_2024.pdf"),
            Some("Bosch".into())
        );
        assert_eq!(
            detect_brand("/data/in/ACME Tools 2024.xlsx"),
            Some("ACME Tools".into())
        );
    }

    #[test]
    fn run_stops_at_lowercase_token() {
        assert_eq!(detect_brand("Vaillant Eco fiyat.pdf"), Some("Vaillant Eco".into()));
    }

    #[test]
    fn skips_leading_numeric_tokens() {
        assert_eq!(detect_brand("2024_Ferroli_liste.pdf"), Some("Ferroli".into()));
    }

    #[test]
    fn non_filenames_yield_none() {
        assert_eq!(detect_brand("plain product description"), None);
        assert_eq!(detect_brand(""), None);
        assert_eq!(detect_brand("1234.pdf"), None);
    }

    #[test]
    fn slug_folds_diacritics() {
        assert_eq!(slugify("Şömine Fiyat Listesi"), "somine-fiyat-listesi");
        assert_eq!(slugify("ACME--2024.pdf"), "acme-2024-pdf");
        assert_eq!(slugify(""), "");
    }
}
