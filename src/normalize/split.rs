//! Recover product codes embedded in free-text descriptions.

use once_cell::sync::Lazy;
use regex::Regex;

/// `CODE rest-of-line`: an uppercase alphanumeric prefix of 2+ chars
/// followed by whitespace. Tried first so `ABC-12 Widget` keeps its code
/// even when the description itself contains slashes.
static PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z0-9][A-Z0-9\-/]+)\s+(.+)$").unwrap());

/// Slash-delimited forms, code on either side. Codes here need 3+ chars so
/// a bare unit like `M/2` in a description is not mistaken for one.
static SLASH_RES: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"^([A-Z0-9\-/]{3,})\s*/\s*(.+)$").unwrap(),
        Regex::new(r"^(.+?)\s*/\s*([A-Z0-9\-/]{3,})$").unwrap(),
    ]
});

/// Parenthesised forms, `(CODE) desc` and `desc (CODE)`.
static PAREN_RES: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"^\(([A-Z0-9\-/]{3,})\)\s*(.+)$").unwrap(),
        Regex::new(r"^(.+?)\s*\(([A-Z0-9\-/]{3,})\)$").unwrap(),
    ]
});

/// Split raw product text into `(code, description)`.
///
/// Strategies run in a fixed order (uppercase prefix, then slash forms,
/// then parenthesised forms) and the first match wins. Text that matches
/// nothing comes back untouched with `None` for the code; nothing is ever
/// invented.
pub fn split_code_description(text: &str) -> (Option<String>, String) {
    let text = text.trim();
    if text.is_empty() {
        return (None, String::new());
    }

    if let Some(caps) = PREFIX_RE.captures(text) {
        return (
            Some(caps[1].trim().to_string()),
            caps[2].trim().to_string(),
        );
    }

    if let Some(caps) = SLASH_RES[0].captures(text) {
        return (
            Some(caps[1].trim().to_string()),
            caps[2].trim().to_string(),
        );
    }
    if let Some(caps) = SLASH_RES[1].captures(text) {
        return (
            Some(caps[2].trim().to_string()),
            caps[1].trim().to_string(),
        );
    }

    if let Some(caps) = PAREN_RES[0].captures(text) {
        return (
            Some(caps[1].trim().to_string()),
            caps[2].trim().to_string(),
        );
    }
    if let Some(caps) = PAREN_RES[1].captures(text) {
        return (
            Some(caps[2].trim().to_string()),
            caps[1].trim().to_string(),
        );
    }

    (None, text.to_string())
}
