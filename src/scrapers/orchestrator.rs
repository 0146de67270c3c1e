//! Scrape run orchestration.
//!
//! Drives the per-candidate pipeline for each configured source: blocklist
//! gate, URL freshness gate, fetch with retry and selector fallback,
//! content-fingerprint dedup, archive write, and failure accounting. A
//! candidate that fails never aborts its source, and a source that fails
//! never aborts the run; only an unavailable store (surfaced before the
//! orchestrator is built) is fatal.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use super::extractor::{self, Extracted};
use super::fetcher::Fetcher;
use super::normalize::slug_from_url;
use crate::error::ScrapeError;
use crate::models::{Article, SourceEndpoint, UrlStatus};
use crate::repository::{ArchiveRepository, DedupRepository, DieselError, FailureRepository};

/// Tuning knobs for a scrape run.
#[derive(Debug, Clone)]
pub struct ScrapePolicy {
    /// Fetch attempts per URL before the failure is terminal.
    pub retry_count: u32,
    /// Pause between attempts on the same URL.
    pub retry_delay: Duration,
    /// Politeness delay after each candidate that touched the network.
    pub request_delay: Duration,
    /// Consecutive failures at which a URL is blocklisted.
    pub failure_threshold: u32,
    /// Sources processed concurrently; within a source, candidates are
    /// strictly sequential so the politeness delay means something.
    pub source_concurrency: usize,
}

impl Default for ScrapePolicy {
    fn default() -> Self {
        Self {
            retry_count: 2,
            retry_delay: Duration::from_secs(2),
            request_delay: Duration::from_millis(1000),
            failure_threshold: 5,
            source_concurrency: 4,
        }
    }
}

/// Per-source outcome counters.
#[derive(Debug, Clone, Default)]
pub struct SourceSummary {
    pub source: String,
    /// Candidate links found on the listing page.
    pub discovered: usize,
    /// Articles fetched, extracted, and archived.
    pub fetched: usize,
    pub skipped_duplicate_url: usize,
    pub skipped_duplicate_content: usize,
    pub skipped_blocklisted: usize,
    /// Candidates whose fetch/extract attempts all failed.
    pub failed: usize,
    /// URLs that crossed the failure threshold during this run.
    pub newly_blocklisted: usize,
}

/// Whole-run outcome counters.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub sources_processed: usize,
    pub sources_failed: usize,
    pub fetched: usize,
    pub skipped_duplicate_url: usize,
    pub skipped_duplicate_content: usize,
    pub skipped_blocklisted: usize,
    pub failed: usize,
    pub newly_blocklisted: usize,
}

impl RunSummary {
    fn absorb(&mut self, source: &SourceSummary) {
        self.fetched += source.fetched;
        self.skipped_duplicate_url += source.skipped_duplicate_url;
        self.skipped_duplicate_content += source.skipped_duplicate_content;
        self.skipped_blocklisted += source.skipped_blocklisted;
        self.failed += source.failed;
        self.newly_blocklisted += source.newly_blocklisted;
    }
}

/// Coordinates fetching, deduplication, and persistence for scrape runs.
pub struct FetchOrchestrator<F: Fetcher> {
    fetcher: Arc<F>,
    dedup: DedupRepository,
    failures: FailureRepository,
    archive: ArchiveRepository,
    policy: ScrapePolicy,
}

impl<F: Fetcher> FetchOrchestrator<F> {
    pub fn new(
        fetcher: F,
        dedup: DedupRepository,
        failures: FailureRepository,
        archive: ArchiveRepository,
        policy: ScrapePolicy,
    ) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            dedup,
            failures,
            archive,
            policy,
        }
    }

    /// Process every active source and aggregate the outcome.
    pub async fn run(&self, sources: &[SourceEndpoint]) -> RunSummary {
        let active: Vec<&SourceEndpoint> = sources.iter().filter(|s| s.active).collect();
        info!(sources = active.len(), "starting scrape run");

        let mut summary = RunSummary::default();
        let mut outcomes = stream::iter(active)
            .map(|endpoint| async move {
                let outcome = self.process_source(endpoint).await;
                (endpoint.id.clone(), outcome)
            })
            .buffer_unordered(self.policy.source_concurrency.max(1));

        while let Some((source_id, outcome)) = outcomes.next().await {
            match outcome {
                Ok(source_summary) => {
                    info!(
                        source = %source_id,
                        discovered = source_summary.discovered,
                        fetched = source_summary.fetched,
                        skipped_duplicate_url = source_summary.skipped_duplicate_url,
                        skipped_duplicate_content = source_summary.skipped_duplicate_content,
                        skipped_blocklisted = source_summary.skipped_blocklisted,
                        failed = source_summary.failed,
                        newly_blocklisted = source_summary.newly_blocklisted,
                        "source complete"
                    );
                    summary.sources_processed += 1;
                    summary.absorb(&source_summary);
                }
                Err(error) => {
                    warn!(source = %source_id, error = %error, "source failed, continuing run");
                    summary.sources_failed += 1;
                }
            }
        }

        info!(
            sources_processed = summary.sources_processed,
            sources_failed = summary.sources_failed,
            fetched = summary.fetched,
            skipped_duplicate_url = summary.skipped_duplicate_url,
            skipped_duplicate_content = summary.skipped_duplicate_content,
            skipped_blocklisted = summary.skipped_blocklisted,
            failed = summary.failed,
            newly_blocklisted = summary.newly_blocklisted,
            "scrape run complete"
        );
        summary
    }

    /// Scrape one source: discover candidates on the listing page, then
    /// run each through the candidate pipeline in order.
    ///
    /// Returns Err only when the listing page itself cannot be fetched.
    pub async fn process_source(
        &self,
        endpoint: &SourceEndpoint,
    ) -> Result<SourceSummary, ScrapeError> {
        let mut summary = SourceSummary {
            source: endpoint.id.clone(),
            ..Default::default()
        };

        let listing_html = self.fetch_listing(&endpoint.base_url).await?;
        let candidates = extractor::extract_links(&listing_html, endpoint, &endpoint.base_url);
        summary.discovered = candidates.len();
        if candidates.is_empty() {
            warn!(source = %endpoint.id, "no candidate links found on listing page");
            return Ok(summary);
        }
        info!(source = %endpoint.id, candidates = candidates.len(), "discovered candidate links");

        if let Err(error) = self.dedup.record_discovered(&candidates).await {
            warn!(source = %endpoint.id, error = %error, "failed to record discovered URLs");
        }

        for url in &candidates {
            let touched_network = self.process_candidate(endpoint, url, &mut summary).await;
            if touched_network && !self.policy.request_delay.is_zero() {
                tokio::time::sleep(self.policy.request_delay).await;
            }
        }

        Ok(summary)
    }

    /// One candidate through the whole pipeline. Returns whether any
    /// network fetch happened, which is what the politeness delay keys on.
    async fn process_candidate(
        &self,
        endpoint: &SourceEndpoint,
        url: &str,
        summary: &mut SourceSummary,
    ) -> bool {
        match self.failures.is_blocklisted(url).await {
            Ok(true) => {
                info!(url = %url, "skipping blocklisted URL");
                summary.skipped_blocklisted += 1;
                return false;
            }
            Ok(false) => {}
            // A store hiccup must not grant the URL a permanent pardon,
            // so treat it as not blocklisted and move on
            Err(error) => warn!(url = %url, error = %error, "blocklist check failed, proceeding"),
        }

        match self.is_fresh_scrape(url).await {
            Ok(true) => {
                info!(url = %url, "skipping recently scraped URL");
                summary.skipped_duplicate_url += 1;
                return false;
            }
            Ok(false) => {}
            Err(error) => warn!(url = %url, error = %error, "freshness check failed, proceeding"),
        }

        let extracted = match self.fetch_article(endpoint, url).await {
            Ok(extracted) => extracted,
            Err(error) => {
                warn!(url = %url, error = %error, "giving up on URL");
                summary.failed += 1;
                self.record_terminal_failure(url, &error, summary).await;
                return true;
            }
        };

        match self
            .dedup
            .is_new_content(&extracted.title, &extracted.content)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!(url = %url, "skipping article with duplicate content");
                summary.skipped_duplicate_content += 1;
                return true;
            }
            Err(error) => {
                warn!(url = %url, error = %error, "content dedup check failed, archiving anyway")
            }
        }

        let article = build_article(endpoint, url, extracted);
        match self.archive.store(&[article], None).await {
            Ok(report) if report.failed == 0 => {
                if let Err(error) = self.dedup.record_url(url, UrlStatus::Scraped).await {
                    warn!(url = %url, error = %error, "failed to record scraped URL");
                }
                summary.fetched += 1;
                info!(url = %url, "archived article");
            }
            Ok(report) => {
                warn!(url = %url, failed = report.failed, "archive write failed, article dropped")
            }
            Err(error) => warn!(url = %url, error = %error, "archive write failed, article dropped"),
        }
        true
    }

    /// A URL is a fresh scrape when it is still inside the URL TTL and
    /// already reached `scraped`. Known-but-failed URLs get another try.
    async fn is_fresh_scrape(&self, url: &str) -> Result<bool, DieselError> {
        if self.dedup.is_new_url(url).await? {
            return Ok(false);
        }
        let record = self.dedup.get_record(url).await?;
        Ok(record.map(|r| r.status == UrlStatus::Scraped).unwrap_or(false))
    }

    /// Fetch and extract one article with the retry budget.
    ///
    /// A transport failure retries the same selector position; an
    /// extraction miss advances the fallback chain for the next attempt.
    async fn fetch_article(
        &self,
        endpoint: &SourceEndpoint,
        url: &str,
    ) -> Result<Extracted, ScrapeError> {
        let mut position = 0usize;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.fetcher.fetch(url).await {
                Ok(html) => match extractor::extract_article(&html, endpoint, url, position) {
                    Ok(extracted) => return Ok(extracted),
                    Err(miss) => {
                        warn!(
                            url = %url,
                            field = miss.field,
                            position = miss.position,
                            attempt,
                            "extraction missed"
                        );
                        if attempt >= self.policy.retry_count {
                            return Err(miss.into());
                        }
                        position += 1;
                    }
                },
                Err(fetch_error) => {
                    warn!(url = %url, error = %fetch_error, attempt, "fetch attempt failed");
                    if attempt >= self.policy.retry_count {
                        return Err(fetch_error.into());
                    }
                }
            }
            if !self.policy.retry_delay.is_zero() {
                tokio::time::sleep(self.policy.retry_delay).await;
            }
        }
    }

    /// Listing pages get the same attempt budget but no selector
    /// positions; only transport failures are retryable here.
    async fn fetch_listing(&self, url: &str) -> Result<String, ScrapeError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.fetcher.fetch(url).await {
                Ok(html) => return Ok(html),
                Err(error) => {
                    warn!(url = %url, error = %error, attempt, "listing fetch failed");
                    if attempt >= self.policy.retry_count {
                        return Err(error.into());
                    }
                }
            }
            if !self.policy.retry_delay.is_zero() {
                tokio::time::sleep(self.policy.retry_delay).await;
            }
        }
    }

    /// Bump the consecutive failure count and blocklist the URL once it
    /// crosses the threshold.
    async fn record_terminal_failure(
        &self,
        url: &str,
        error: &ScrapeError,
        summary: &mut SourceSummary,
    ) {
        let count = match self.failures.record_failure(url).await {
            Ok(count) => count,
            Err(store_error) => {
                warn!(url = %url, error = %store_error, "failed to record failure");
                return;
            }
        };

        if count >= self.policy.failure_threshold {
            let reason = format!("{} consecutive failures, last error: {}", count, error);
            match self.failures.add_to_blocklist(url, &reason).await {
                Ok(true) => {
                    warn!(url = %url, failures = count, "blocklisted URL");
                    summary.newly_blocklisted += 1;
                }
                Ok(false) => {}
                Err(store_error) => {
                    warn!(url = %url, error = %store_error, "failed to blocklist URL")
                }
            }
        }
    }
}

fn build_article(endpoint: &SourceEndpoint, url: &str, extracted: Extracted) -> Article {
    Article {
        url: url.to_string(),
        title: extracted.title,
        content: extracted.content,
        author: extracted.author,
        published_date: extracted.published_date,
        source: endpoint.id.clone(),
        image_urls: extracted.image_urls,
        category: endpoint.category.clone(),
        scraped_at: Utc::now(),
        slug: slug_from_url(url),
        is_used: false,
        used_in_digest_id: None,
        used_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_summary_absorbs_source_counts() {
        let mut run = RunSummary::default();
        run.absorb(&SourceSummary {
            source: "gazette".to_string(),
            discovered: 10,
            fetched: 4,
            skipped_duplicate_url: 3,
            skipped_duplicate_content: 1,
            skipped_blocklisted: 1,
            failed: 1,
            newly_blocklisted: 1,
        });
        run.absorb(&SourceSummary {
            source: "tribune".to_string(),
            fetched: 2,
            ..Default::default()
        });

        assert_eq!(run.fetched, 6);
        assert_eq!(run.skipped_duplicate_url, 3);
        assert_eq!(run.skipped_duplicate_content, 1);
        assert_eq!(run.skipped_blocklisted, 1);
        assert_eq!(run.failed, 1);
        assert_eq!(run.newly_blocklisted, 1);
    }

    #[test]
    fn test_build_article_carries_endpoint_metadata() {
        let mut endpoint =
            SourceEndpoint::new("gazette", "Daily Gazette", "https://gazette.example.com/");
        endpoint.category = Some("local".to_string());

        let article = build_article(
            &endpoint,
            "https://gazette.example.com/news/budget-vote.html",
            Extracted {
                title: "Budget Vote".to_string(),
                content: "The council voted.".to_string(),
                author: None,
                published_date: None,
                image_urls: vec![],
            },
        );

        assert_eq!(article.source, "gazette");
        assert_eq!(article.category.as_deref(), Some("local"));
        assert_eq!(article.slug, "budget-vote");
        assert!(!article.is_used);
        assert_eq!(article.used_in_digest_id, None);
    }
}
