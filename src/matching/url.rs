// src/matching/url.rs - domain and website canonicalization

use once_cell::sync::Lazy;
use regex::Regex;

static SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9+.\-]*://").expect("scheme pattern is valid"));

/// Lowercased domain without a leading `www.`.
pub fn normalize_domain(domain: &str) -> String {
    let lowered = domain.trim().to_lowercase();
    lowered
        .strip_prefix("www.")
        .unwrap_or(&lowered)
        .to_string()
}

/// Website reduced to host and path: no scheme, no leading `www.`, no trailing slash.
pub fn normalize_website(website: &str) -> String {
    let lowered = website.trim().to_lowercase();
    let without_scheme = SCHEME.replace(&lowered, "");
    let without_www = without_scheme
        .strip_prefix("www.")
        .unwrap_or(&without_scheme);
    without_www.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("WWW.Acme.com"), "acme.com");
        assert_eq!(normalize_domain(" acme.com "), "acme.com");
        assert_eq!(normalize_domain("shop.acme.com"), "shop.acme.com");
    }

    #[test]
    fn test_normalize_website() {
        assert_eq!(normalize_website("https://www.acme.com/"), "acme.com");
        assert_eq!(normalize_website("http://acme.com"), "acme.com");
        assert_eq!(normalize_website("www.acme.com/about/"), "acme.com/about");
        assert_eq!(normalize_website("acme.com"), "acme.com");
        assert_eq!(normalize_website(""), "");
    }
}
