//! Article and digest models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized article produced by a successful scrape.
///
/// Keyed by URL in the archive. Everything except the usage-tracking
/// fields is immutable once written; re-scrapes of the same URL never
/// overwrite an existing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    /// Publication date as displayed on the page. Sites format these
    /// inconsistently, so it is kept verbatim rather than parsed.
    pub published_date: Option<String>,
    /// Source endpoint id this article came from.
    pub source: String,
    pub image_urls: Vec<String>,
    pub category: Option<String>,
    pub scraped_at: DateTime<Utc>,
    pub slug: String,
    /// Usage tracking: set once the digest step consumes this article.
    pub is_used: bool,
    pub used_in_digest_id: Option<String>,
    pub used_at: Option<DateTime<Utc>>,
}

/// A generated digest covering a batch of articles from one source.
#[derive(Debug, Clone)]
pub struct Digest {
    pub id: String,
    pub source: String,
    pub title: String,
    pub body: String,
    pub article_count: u32,
    pub generated_at: DateTime<Utc>,
}

impl Digest {
    pub fn new(source: &str, title: String, body: String, article_count: u32) -> Self {
        Digest {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            title,
            body,
            article_count,
            generated_at: Utc::now(),
        }
    }
}
