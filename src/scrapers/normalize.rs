//! Text cleanup and slug derivation for scraped pages.
//!
//! News pages carry a lot of chrome (share buttons, subscription prompts,
//! related-story rails) that survives naive text extraction. The cleanup
//! here is line-oriented: strip known boilerplate phrases, drop lines too
//! short to be prose, and dedupe repeated paragraphs.

use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

/// Phrases that mark navigation or promo text rather than article prose.
const BOILERPLATE_PATTERNS: &[&str] = &[
    r"(?i)Share\s+on\s+(?:Facebook|Twitter|WhatsApp|SMS|Email)",
    r"(?i)Follow\s+us\s+on\s+(?:Facebook|Twitter|Instagram)",
    r"(?i)Subscribe\s+to\s+our\s+newsletter",
    r"(?i)Sign\s+up\s+for\s+our\s+newsletter",
    r"(?i)Copyright\s+\d{4}.*?All\s+rights\s+reserved",
    r"(?i)Terms\s+of\s+(?:Use|Service)",
    r"(?i)Privacy\s+Policy",
    r"(?i)Do\s+Not\s+Sell\s+My\s+Info",
    r"(?i)Related\s+(?:Stories|Articles|Content)",
    r"(?i)Recommended\s+for\s+you",
    r"(?i)Most\s+(?:Popular|Read|Viewed)",
    r"(?i)Top\s+Stories",
    r"(?im)Breaking\s+News:?\s*$",
    r"(?i)Advertisement",
    r"(?i)Click\s+here\s+to\s+(?:read|view)",
    r"(?i)Continue\s+reading",
    r"(?i)Read\s+more",
    r"(?i)Load\s+(?:more|comments)",
    r"(?i)Updated\s+\d+\s+(?:mins|hours|days)\s+ago",
];

fn boilerplate() -> &'static [Regex] {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        BOILERPLATE_PATTERNS
            .iter()
            .map(|p| Regex::new(p).unwrap())
            .collect()
    })
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]{2,}").unwrap())
}

/// Normalize a short text field: swap problematic unicode separators for
/// plain spaces and collapse runs of whitespace.
pub fn clean_text(text: &str) -> String {
    let replaced = text.replace(['\u{202f}', '\u{2028}', '\u{2029}'], " ");
    whitespace_run()
        .replace_all(replaced.trim(), " ")
        .to_string()
}

/// Clean extracted article body text.
///
/// Strips boilerplate phrases, drops lines too short to be prose (keeping
/// numbered list items), dedupes repeated paragraphs, and collapses
/// spacing. Paragraph order is preserved.
pub fn clean_content(content: &str) -> String {
    let mut text = content.replace(['\u{202f}', '\u{2028}', '\u{2029}'], " ");
    for re in boilerplate() {
        text = re.replace_all(&text, "").to_string();
    }

    let mut seen = std::collections::HashSet::new();
    let mut paragraphs = Vec::new();
    for line in text.lines() {
        let line = whitespace_run().replace_all(line.trim(), " ").to_string();
        if line.is_empty() {
            continue;
        }
        let numbered_item = line.starts_with(|c: char| c.is_ascii_digit()) && line.contains('.');
        if line.chars().count() <= 20 && !numbered_item {
            continue;
        }
        let key = line.to_lowercase();
        if seen.insert(key) {
            paragraphs.push(line);
        }
    }

    paragraphs.join("\n\n")
}

/// Derive a slug from the last path segment of an article URL.
///
/// Falls back to a short hash of the whole URL when the path yields
/// nothing usable (bare domains, opaque query-only links).
pub fn slug_from_url(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        if let Some(last) = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        {
            let decoded = urlencoding::decode(last)
                .map(|c| c.into_owned())
                .unwrap_or_else(|_| last.to_string());
            let stem = decoded
                .trim_end_matches(".html")
                .trim_end_matches(".htm")
                .trim_end_matches(".php")
                .trim_end_matches(".aspx");

            let mut slug = String::with_capacity(stem.len());
            let mut prev_dash = false;
            for c in stem.to_lowercase().chars() {
                if c.is_ascii_alphanumeric() {
                    slug.push(c);
                    prev_dash = false;
                } else if !prev_dash && !slug.is_empty() {
                    slug.push('-');
                    prev_dash = true;
                }
            }
            let slug = slug.trim_end_matches('-').to_string();
            if !slug.is_empty() {
                return slug;
            }
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_from_article_url() {
        assert_eq!(
            slug_from_url("https://www.abqjournal.com/news/2025/city-council-approves-budget.html"),
            "city-council-approves-budget"
        );
    }

    #[test]
    fn test_slug_ignores_trailing_slash() {
        assert_eq!(
            slug_from_url("https://example.com/story/water-main-break/"),
            "water-main-break"
        );
    }

    #[test]
    fn test_slug_sanitizes_non_ascii() {
        assert_eq!(
            slug_from_url("https://example.com/news/caf%C3%A9-reopens"),
            "caf-reopens"
        );
    }

    #[test]
    fn test_slug_falls_back_to_hash_for_bare_domain() {
        let slug = slug_from_url("https://example.com/");
        assert_eq!(slug.len(), 12);
        assert!(slug.chars().all(|c| c.is_ascii_hexdigit()));
        // Stable across calls
        assert_eq!(slug, slug_from_url("https://example.com/"));
    }

    #[test]
    fn test_clean_content_strips_boilerplate_and_short_lines() {
        let raw = "City officials announced the new transit plan on Tuesday morning.\n\
                   Share on Facebook\n\
                   Menu\n\
                   The plan adds three bus routes serving the east side of town.\n\
                   Subscribe to our newsletter\n";
        let cleaned = clean_content(raw);
        assert!(cleaned.contains("transit plan"));
        assert!(cleaned.contains("three bus routes"));
        assert!(!cleaned.contains("Facebook"));
        assert!(!cleaned.contains("Menu"));
        assert!(!cleaned.contains("newsletter"));
    }

    #[test]
    fn test_clean_content_dedupes_repeated_paragraphs() {
        let raw = "The council voted seven to two in favor of the measure.\n\
                   The council voted seven to two in favor of the measure.\n\
                   A second reading is scheduled for next month.";
        let cleaned = clean_content(raw);
        assert_eq!(cleaned.matches("seven to two").count(), 1);
        assert!(cleaned.contains("second reading"));
    }

    #[test]
    fn test_clean_content_keeps_numbered_items() {
        let raw = "1. Budget vote\nlong enough line of actual article prose right here";
        let cleaned = clean_content(raw);
        assert!(cleaned.contains("1. Budget vote"));
    }

    #[test]
    fn test_clean_text_replaces_unicode_separators() {
        assert_eq!(clean_text("8:00\u{202f}AM"), "8:00 AM");
        assert_eq!(clean_text("  spaced   out  "), "spaced out");
    }
}
