// src/matching/email.rs - email canonicalization for pairwise comparison

/// Consumer mail providers. A shared domain on one of these says nothing about
/// two people working at the same place.
pub const FREE_EMAIL_DOMAINS: [&str; 4] = ["gmail.com", "yahoo.com", "hotmail.com", "outlook.com"];

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Everything after the last `@`, lowercased. `None` when there is no `@` or nothing after it.
pub fn extract_email_domain(email: &str) -> Option<String> {
    if email.is_empty() {
        return None;
    }
    let (_, domain) = email.rsplit_once('@')?;
    let domain = domain.trim().to_lowercase();
    if domain.is_empty() {
        None
    } else {
        Some(domain)
    }
}

pub fn is_free_email_domain(domain: &str) -> bool {
    FREE_EMAIL_DOMAINS.contains(&domain)
}
