// src/matching/name.rs - name canonicalization and edit-distance similarity

use once_cell::sync::Lazy;
use regex::Regex;
use strsim::levenshtein;

static CORPORATE_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:,\s*|\s+)(?:inc|llc|ltd|corp|company|co)\.?$")
        .expect("corporate suffix pattern is valid")
});

static LEADING_ARTICLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^the\s+").expect("leading article pattern is valid"));

/// Lowercases, trims and collapses whitespace runs to a single space.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Company name reduced for comparison: `"The Acme Corp."` and `"acme, inc"` both become `"acme"`.
pub fn strip_company_name(name: &str) -> String {
    let normalized = normalize_name(name);
    let without_suffix = CORPORATE_SUFFIX.replace(&normalized, "");
    let without_article = LEADING_ARTICLE.replace(without_suffix.trim(), "");
    without_article.trim().to_string()
}

/// Edit-distance similarity in `[0, 1]`.
///
/// Case-insensitively equal strings (including two empty strings) score 1.0 and a
/// single empty side scores 0.0. Otherwise the score is
/// `1 - levenshtein(a, b) / max(len(a), len(b))` over characters.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.to_lowercase() == b.to_lowercase() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}
