//! Source registry.
//!
//! Ships a builtin set of endpoints and overlays entries from the config
//! file on top. Every endpoint's selector chains get the shared generic
//! fallback tails appended, so site-specific config only lists the
//! primary selectors and still degrades gracefully when a site redesign
//! breaks them.

use std::collections::{BTreeMap, HashMap};

use crate::models::SourceEndpoint;

const GENERIC_LINK_SELECTORS: &[&str] = &[
    "a.headline, a.title, a.article-title, h2 a, h3 a",
    "article a, .story a, .post a, .entry a",
];
const GENERIC_TITLE_SELECTORS: &[&str] = &["h1, .headline, .title, .article-title"];
const GENERIC_CONTENT_SELECTORS: &[&str] = &[".content, .article-body, .entry-content"];
const GENERIC_AUTHOR_SELECTORS: &[&str] = &[".author, .byline"];
const GENERIC_DATE_SELECTORS: &[&str] = &[".date, time, .published"];
const GENERIC_IMAGE_SELECTORS: &[&str] = &["img"];

/// Endpoints keyed by id, iterated in stable alphabetical order.
pub struct SourceRegistry {
    endpoints: BTreeMap<String, SourceEndpoint>,
}

impl SourceRegistry {
    /// Registry with only the builtin endpoints.
    pub fn builtin() -> Self {
        Self::from_entries(builtin_endpoints())
    }

    /// Builtin endpoints with config entries overlaid. A config entry
    /// whose key matches a builtin id replaces it wholesale; other keys
    /// add new endpoints. The map key wins as the endpoint id.
    pub fn with_config(overrides: &HashMap<String, SourceEndpoint>) -> Self {
        let mut entries = builtin_endpoints();
        for (id, endpoint) in overrides {
            let mut endpoint = endpoint.clone();
            endpoint.id = id.clone();
            match entries.iter_mut().find(|existing| existing.id == *id) {
                Some(existing) => *existing = endpoint,
                None => entries.push(endpoint),
            }
        }
        Self::from_entries(entries)
    }

    fn from_entries(entries: Vec<SourceEndpoint>) -> Self {
        let mut endpoints = BTreeMap::new();
        for mut endpoint in entries {
            append_fallbacks(&mut endpoint);
            endpoints.insert(endpoint.id.clone(), endpoint);
        }
        Self { endpoints }
    }

    pub fn get(&self, id: &str) -> Option<&SourceEndpoint> {
        self.endpoints.get(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &SourceEndpoint> {
        self.endpoints.values()
    }

    /// Endpoints eligible for a scrape run.
    pub fn active(&self) -> Vec<SourceEndpoint> {
        self.endpoints
            .values()
            .filter(|endpoint| endpoint.active)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

fn append_fallbacks(endpoint: &mut SourceEndpoint) {
    extend_chain(&mut endpoint.link_selectors, GENERIC_LINK_SELECTORS);
    extend_chain(&mut endpoint.title_selectors, GENERIC_TITLE_SELECTORS);
    extend_chain(&mut endpoint.content_selectors, GENERIC_CONTENT_SELECTORS);
    extend_chain(&mut endpoint.author_selectors, GENERIC_AUTHOR_SELECTORS);
    extend_chain(&mut endpoint.date_selectors, GENERIC_DATE_SELECTORS);
    extend_chain(&mut endpoint.image_selectors, GENERIC_IMAGE_SELECTORS);
}

fn extend_chain(chain: &mut Vec<String>, tail: &[&str]) {
    for selector in tail {
        if !chain.iter().any(|existing| existing == selector) {
            chain.push((*selector).to_string());
        }
    }
}

fn builtin_endpoints() -> Vec<SourceEndpoint> {
    vec![
        SourceEndpoint {
            category: Some("local".to_string()),
            link_selectors: vec![".article-title a, .entry-title a".to_string()],
            title_selectors: vec![".article-title, .entry-title, h1".to_string()],
            content_selectors: vec![".article-body, .entry-content".to_string()],
            author_selectors: vec![".author, .byline".to_string()],
            date_selectors: vec![".published-date, time".to_string()],
            image_selectors: vec![".article-body img, .entry-content img".to_string()],
            ..SourceEndpoint::new("denverpost", "The Denver Post", "https://www.denverpost.com/")
        },
        SourceEndpoint {
            category: Some("local".to_string()),
            link_selectors: vec![".post-card a, .headline a".to_string()],
            title_selectors: vec![".headline, .title, h1".to_string()],
            content_selectors: vec![".entry-content, .post-content".to_string()],
            author_selectors: vec![".byline, .author".to_string()],
            date_selectors: vec![".date, time".to_string()],
            image_selectors: vec![".entry-content img, .featured-image img".to_string()],
            ..SourceEndpoint::new("denverite", "Denverite", "https://denverite.com/")
        },
        SourceEndpoint {
            category: Some("regional".to_string()),
            link_selectors: vec![".post-title a, .headline a".to_string()],
            title_selectors: vec![".post-title, .headline, h1".to_string()],
            content_selectors: vec![".post-content, .content".to_string()],
            author_selectors: vec![".byline, .author".to_string()],
            date_selectors: vec![".date, time, .posted-on".to_string()],
            image_selectors: vec![".post-content img, .featured-image img".to_string()],
            ..SourceEndpoint::new("cpr", "Colorado Public Radio", "https://www.cpr.org/")
        },
    ]
}
