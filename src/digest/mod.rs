//! Digest generation from archived articles.
//!
//! Pulls unused articles for a source from the archive, asks the LLM
//! for a digest, saves it, and marks the articles consumed so the next
//! digest starts from fresh material. Articles are never deleted.

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::llm::{LlmClient, LlmError};
use crate::models::{Article, Digest};
use crate::repository::{ArchiveRepository, UsageUpdate};

/// Characters of article content included per article in the prompt.
const ARTICLE_PREVIEW_CHARS: usize = 500;
/// Articles per digest, regardless of how many are unused.
const MAX_DIGEST_ARTICLES: i64 = 30;

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error("store error: {0}")]
    Store(#[from] diesel::result::Error),
}

pub struct DigestGenerator {
    archive: ArchiveRepository,
    llm: LlmClient,
}

impl DigestGenerator {
    pub fn new(archive: ArchiveRepository, llm: LlmClient) -> Self {
        Self { archive, llm }
    }

    /// Generate and persist a digest for one source.
    ///
    /// Returns Ok(None) when the source has no unused articles.
    pub async fn generate_for_source(
        &self,
        source_id: &str,
        source_name: &str,
        limit: i64,
    ) -> Result<Option<Digest>, DigestError> {
        let limit = limit.clamp(1, MAX_DIGEST_ARTICLES);
        let articles = self.archive.unused_for_source(source_id, limit).await?;
        if articles.is_empty() {
            info!(source = %source_id, "no unused articles, skipping digest");
            return Ok(None);
        }

        info!(source = %source_id, articles = articles.len(), "generating digest");
        let articles_text = format_articles(&articles);
        let body = self.llm.generate_digest(source_name, &articles_text).await?;
        let title =
            extract_title(&body).unwrap_or_else(|| format!("{} Morning Digest", source_name));

        let digest = Digest::new(source_id, title, body, articles.len() as u32);
        self.archive.save_digest(&digest).await?;

        let usage = UsageUpdate {
            digest_id: digest.id.clone(),
            used_at: Utc::now(),
        };
        let report = self.archive.store(&articles, Some(&usage)).await?;
        if report.failed > 0 {
            warn!(
                digest_id = %digest.id,
                failed = report.failed,
                "some articles could not be marked used"
            );
        }

        info!(digest_id = %digest.id, source = %source_id, "digest saved");
        Ok(Some(digest))
    }
}

/// Format articles for the prompt. Source names and URLs are left out
/// so the model cannot echo them into the digest.
fn format_articles(articles: &[Article]) -> String {
    articles
        .iter()
        .enumerate()
        .map(|(i, article)| {
            let preview: String = article.content.chars().take(ARTICLE_PREVIEW_CHARS).collect();
            format!(
                "Article {}:\nTitle: {}\nContent Preview: {}\n",
                i + 1,
                article.title,
                preview
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pull the headline out of the digest body: the first non-empty line,
/// stripped of the bold-bracket markers the prompt asks for.
fn extract_title(body: &str) -> Option<String> {
    let line = body.lines().find(|line| !line.trim().is_empty())?;
    let title = line
        .trim()
        .trim_matches(|c: char| c == '*' || c == '[' || c == ']' || c.is_whitespace())
        .to_string();
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}
