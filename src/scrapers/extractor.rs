//! CSS-selector extraction of article fields from fetched HTML.
//!
//! Every field of a [`SourceEndpoint`] carries an ordered selector chain.
//! One extraction attempt uses a single position in each chain (clamped to
//! the chain's length), so a retry can advance to the next fallback
//! without re-trying selectors that already missed. Title and content are
//! required; a miss on either fails the attempt. Author, date, and images
//! are best-effort.

use scraper::{Html, Selector};
use tracing::warn;
use url::Url;

use super::normalize::{clean_content, clean_text};
use crate::error::SelectorMiss;
use crate::models::SourceEndpoint;

const MAX_IMAGE_URLS: usize = 5;

/// Fields pulled out of one article page.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub published_date: Option<String>,
    pub image_urls: Vec<String>,
}

/// Selector for the given attempt position, clamped to the end of the
/// chain so extra attempts keep using the most generic fallback.
fn selector_at(chain: &[String], position: usize) -> Option<&str> {
    if chain.is_empty() {
        None
    } else {
        Some(chain[position.min(chain.len() - 1)].as_str())
    }
}

/// An unparseable selector counts as a miss rather than an error; config
/// files are operator-edited and one typo should not take a source down.
fn parse_selector(raw: &str) -> Option<Selector> {
    match Selector::parse(raw) {
        Ok(selector) => Some(selector),
        Err(e) => {
            warn!(selector = raw, error = %e, "invalid CSS selector, treating as no match");
            None
        }
    }
}

/// Concatenated text of all elements matching the selector.
fn extract_text(document: &Html, raw_selector: &str) -> String {
    let Some(selector) = parse_selector(raw_selector) else {
        return String::new();
    };
    let texts: Vec<String> = document
        .select(&selector)
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.trim().is_empty())
        .collect();
    clean_text(&texts.join(" "))
}

/// Body text under the content selector, one line per paragraph.
///
/// Containers with `<p>` children yield a line per paragraph; containers
/// without fall back to their whole text.
fn extract_body(document: &Html, raw_selector: &str) -> String {
    let Some(selector) = parse_selector(raw_selector) else {
        return String::new();
    };
    let paragraph = Selector::parse("p").unwrap();

    let mut lines = Vec::new();
    for container in document.select(&selector) {
        let mut had_paragraphs = false;
        for p in container.select(&paragraph) {
            let text = p.text().collect::<Vec<_>>().join(" ");
            if !text.trim().is_empty() {
                lines.push(text);
                had_paragraphs = true;
            }
        }
        if !had_paragraphs {
            let text = container.text().collect::<Vec<_>>().join(" ");
            if !text.trim().is_empty() {
                lines.push(text);
            }
        }
    }
    lines.join("\n")
}

/// Image URLs under the selector: absolutized against the page URL,
/// deduplicated, svg and inline-data sources skipped.
fn extract_images(document: &Html, raw_selector: &str, page_url: &str) -> Vec<String> {
    let Some(selector) = parse_selector(raw_selector) else {
        return Vec::new();
    };
    let base = Url::parse(page_url).ok();

    let mut seen = std::collections::HashSet::new();
    let mut urls = Vec::new();
    for el in document.select(&selector) {
        let Some(src) = el.value().attr("src") else {
            continue;
        };
        if src.starts_with("data:") || src.ends_with(".svg") {
            continue;
        }
        let absolute = if src.starts_with("http") {
            src.to_string()
        } else if let Some(resolved) = base.as_ref().and_then(|b| b.join(src).ok()) {
            resolved.to_string()
        } else {
            continue;
        };
        if seen.insert(absolute.clone()) {
            urls.push(absolute);
            if urls.len() >= MAX_IMAGE_URLS {
                break;
            }
        }
    }
    urls
}

/// Extract article fields from a fetched page using the selector chains
/// at the given attempt position.
pub fn extract_article(
    html: &str,
    endpoint: &SourceEndpoint,
    page_url: &str,
    position: usize,
) -> Result<Extracted, SelectorMiss> {
    let document = Html::parse_document(html);

    let title = selector_at(&endpoint.title_selectors, position)
        .map(|s| extract_text(&document, s))
        .unwrap_or_default();
    if title.is_empty() {
        return Err(SelectorMiss {
            field: "title",
            position,
        });
    }

    let content = selector_at(&endpoint.content_selectors, position)
        .map(|s| clean_content(&extract_body(&document, s)))
        .unwrap_or_default();
    if content.is_empty() {
        return Err(SelectorMiss {
            field: "content",
            position,
        });
    }

    let author = selector_at(&endpoint.author_selectors, position)
        .map(|s| extract_text(&document, s))
        .filter(|t| !t.is_empty());
    let published_date = selector_at(&endpoint.date_selectors, position)
        .map(|s| extract_text(&document, s))
        .filter(|t| !t.is_empty());
    let image_urls = selector_at(&endpoint.image_selectors, position)
        .map(|s| extract_images(&document, s, page_url))
        .unwrap_or_default();

    Ok(Extracted {
        title,
        content,
        author,
        published_date,
        image_urls,
    })
}

/// Collect candidate article links from a listing page.
///
/// Walks the link selector chain in order and keeps the first selector
/// that yields anything. Links are absolutized against the listing URL;
/// section/tag/search links and non-http schemes are filtered out. The
/// result is deduplicated in page order and capped at the endpoint's
/// `max_articles`.
pub fn extract_links(html: &str, endpoint: &SourceEndpoint, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let base = match Url::parse(base_url) {
        Ok(u) => u,
        Err(e) => {
            warn!(url = base_url, error = %e, "unparseable listing URL");
            return Vec::new();
        }
    };

    for raw_selector in &endpoint.link_selectors {
        let Some(selector) = parse_selector(raw_selector) else {
            continue;
        };

        let mut seen = std::collections::HashSet::new();
        let mut links = Vec::new();
        for el in document.select(&selector) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            if href.starts_with('#') {
                continue;
            }
            let Ok(resolved) = base.join(href) else {
                continue;
            };
            if resolved.scheme() != "http" && resolved.scheme() != "https" {
                continue;
            }
            let path = resolved.path();
            if path.contains("/tag/")
                || path.contains("/category/")
                || path.contains("/author/")
                || path.contains("/search")
            {
                continue;
            }
            // The listing page linking to itself is navigation, not a story
            if resolved == base {
                continue;
            }
            let link = resolved.to_string();
            if seen.insert(link.clone()) {
                links.push(link);
            }
        }

        if !links.is_empty() {
            links.truncate(endpoint.max_articles);
            return links;
        }
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> SourceEndpoint {
        let mut ep = SourceEndpoint::new("gazette", "Daily Gazette", "https://gazette.example.com/");
        ep.link_selectors = vec![".headline a".to_string(), "article a".to_string()];
        ep.title_selectors = vec!["h1.headline".to_string(), "h1".to_string()];
        ep.content_selectors = vec![".story-body".to_string()];
        ep.author_selectors = vec![".byline".to_string()];
        ep.date_selectors = vec!["time".to_string()];
        ep.image_selectors = vec![".story-body img".to_string()];
        ep
    }

    const ARTICLE_HTML: &str = r#"
        <html><body>
            <h1 class="headline">Council Approves New Transit Plan</h1>
            <div class="byline">By Jordan Avila</div>
            <time>March 1, 2025</time>
            <div class="story-body">
                <p>The city council voted Tuesday to approve a transit expansion covering the east side.</p>
                <p>Construction on the first of three new routes begins this summer.</p>
                <img src="/images/council.jpg">
                <img src="/images/council.jpg">
                <img src="/images/logo.svg">
            </div>
        </body></html>
    "#;

    #[test]
    fn test_extract_article_full_page() {
        let extracted = extract_article(ARTICLE_HTML, &endpoint(), "https://gazette.example.com/news/transit", 0)
            .unwrap();
        assert_eq!(extracted.title, "Council Approves New Transit Plan");
        assert!(extracted.content.contains("transit expansion"));
        assert!(extracted.content.contains("first of three new routes"));
        assert_eq!(extracted.author.as_deref(), Some("By Jordan Avila"));
        assert_eq!(extracted.published_date.as_deref(), Some("March 1, 2025"));
        // Absolutized, deduplicated, svg dropped
        assert_eq!(
            extracted.image_urls,
            vec!["https://gazette.example.com/images/council.jpg".to_string()]
        );
    }

    #[test]
    fn test_extract_article_reports_miss_with_position() {
        let mut ep = endpoint();
        ep.title_selectors = vec!["h2.subhead".to_string(), "h1.headline".to_string()];

        let err = extract_article(ARTICLE_HTML, &ep, "https://gazette.example.com/x", 0).unwrap_err();
        assert_eq!(err.field, "title");
        assert_eq!(err.position, 0);

        // The next chain position finds the headline
        let extracted = extract_article(ARTICLE_HTML, &ep, "https://gazette.example.com/x", 1).unwrap();
        assert_eq!(extracted.title, "Council Approves New Transit Plan");
    }

    #[test]
    fn test_position_clamps_to_last_selector() {
        let extracted = extract_article(ARTICLE_HTML, &endpoint(), "https://gazette.example.com/x", 7)
            .unwrap();
        assert_eq!(extracted.title, "Council Approves New Transit Plan");
    }

    #[test]
    fn test_optional_fields_may_be_absent() {
        let html = r#"
            <h1 class="headline">Short Staffed</h1>
            <div class="story-body"><p>The parks department is hiring seasonal workers again.</p></div>
        "#;
        let extracted = extract_article(html, &endpoint(), "https://gazette.example.com/x", 0).unwrap();
        assert_eq!(extracted.author, None);
        assert_eq!(extracted.published_date, None);
        assert!(extracted.image_urls.is_empty());
    }

    #[test]
    fn test_invalid_selector_counts_as_miss() {
        let mut ep = endpoint();
        ep.title_selectors = vec!["!!not-a-selector".to_string()];
        let err = extract_article(ARTICLE_HTML, &ep, "https://gazette.example.com/x", 0).unwrap_err();
        assert_eq!(err.field, "title");
    }

    #[test]
    fn test_extract_links_filters_and_absolutizes() {
        let html = r##"
            <div class="headline"><a href="/news/story-one">One</a></div>
            <div class="headline"><a href="https://gazette.example.com/news/story-two">Two</a></div>
            <div class="headline"><a href="/tag/weather">Tag</a></div>
            <div class="headline"><a href="mailto:tips@gazette.example.com">Tips</a></div>
            <div class="headline"><a href="#top">Top</a></div>
            <div class="headline"><a href="/news/story-one">One again</a></div>
        "##;
        let links = extract_links(html, &endpoint(), "https://gazette.example.com/");
        assert_eq!(
            links,
            vec![
                "https://gazette.example.com/news/story-one".to_string(),
                "https://gazette.example.com/news/story-two".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_links_first_yielding_selector_wins() {
        let html = r#"
            <article><a href="/news/generic-match">Generic</a></article>
            <div class="headline"><a href="/news/primary-match">Primary</a></div>
        "#;
        let links = extract_links(html, &endpoint(), "https://gazette.example.com/");
        assert_eq!(links, vec!["https://gazette.example.com/news/primary-match".to_string()]);
    }

    #[test]
    fn test_extract_links_caps_at_max_articles() {
        let mut ep = endpoint();
        ep.max_articles = 3;
        let html: String = (0..10)
            .map(|i| format!(r#"<div class="headline"><a href="/news/{}">S</a></div>"#, i))
            .collect();
        let links = extract_links(&html, &ep, "https://gazette.example.com/");
        assert_eq!(links.len(), 3);
    }
}
