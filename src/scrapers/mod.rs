//! Article scraping: HTTP fetching, selector-chain extraction, text
//! normalization, and run orchestration.

pub mod extractor;
pub mod fetcher;
pub mod normalize;
pub mod orchestrator;

pub use extractor::{extract_article, extract_links, Extracted};
pub use fetcher::{resolve_user_agent, Fetcher, HttpFetcher};
pub use normalize::{clean_content, clean_text, slug_from_url};
pub use orchestrator::{FetchOrchestrator, RunSummary, ScrapePolicy, SourceSummary};
