//! Source endpoint configuration.

use serde::{Deserialize, Serialize};

fn default_max_articles() -> usize {
    15
}

fn default_active() -> bool {
    true
}

/// One external news site: a base URL plus ordered selector-fallback
/// chains per extracted field.
///
/// Immutable config data; there is no per-source code. A chain lists the
/// site-specific primary selector first, followed by progressively more
/// generic fallbacks (the registry appends the shared generic tails, so
/// config entries only need the primaries). The orchestrator advances
/// through a chain across retry attempts when extraction misses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEndpoint {
    /// Registry key; filled from the config map key when loaded from file.
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub base_url: String,
    /// Category tag carried onto archived articles (e.g. "local", "politics").
    #[serde(default)]
    pub category: Option<String>,
    /// Selectors for discovering article links on the listing page.
    #[serde(default)]
    pub link_selectors: Vec<String>,
    #[serde(default)]
    pub title_selectors: Vec<String>,
    #[serde(default)]
    pub content_selectors: Vec<String>,
    #[serde(default)]
    pub author_selectors: Vec<String>,
    #[serde(default)]
    pub date_selectors: Vec<String>,
    #[serde(default)]
    pub image_selectors: Vec<String>,
    /// Cap on candidate links processed per run.
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl SourceEndpoint {
    /// Minimal endpoint with empty selector chains. Used by tests and as
    /// a base for registry entries; real endpoints get their fallback
    /// tails appended by the registry.
    pub fn new(id: &str, name: &str, base_url: &str) -> Self {
        SourceEndpoint {
            id: id.to_string(),
            name: name.to_string(),
            base_url: base_url.to_string(),
            category: None,
            link_selectors: Vec::new(),
            title_selectors: Vec::new(),
            content_selectors: Vec::new(),
            author_selectors: Vec::new(),
            date_selectors: Vec::new(),
            image_selectors: Vec::new(),
            max_articles: default_max_articles(),
            active: true,
        }
    }
}
