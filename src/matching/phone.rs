// src/matching/phone.rs - phone canonicalization for pairwise comparison

/// Normalized numbers shorter than this are too ambiguous to compare.
pub const MIN_PHONE_LENGTH: usize = 7;

/// Drops formatting characters (whitespace, `-`, `(`, `)`, `.`, `+`). Anything else is kept.
pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')' | '.' | '+'))
        .collect()
}

fn comparable(normalized: &str) -> bool {
    normalized.chars().count() >= MIN_PHONE_LENGTH
}

/// Equal, or one contained in the other so that a missing country prefix still lines up.
pub fn phones_overlap(a: &str, b: &str) -> bool {
    let (a, b) = (normalize_phone(a), normalize_phone(b));
    if !comparable(&a) || !comparable(&b) {
        return false;
    }
    a == b || a.contains(&b) || b.contains(&a)
}

pub fn phones_equal(a: &str, b: &str) -> bool {
    let (a, b) = (normalize_phone(a), normalize_phone(b));
    comparable(&a) && comparable(&b) && a == b
}
