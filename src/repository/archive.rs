//! Durable article archive and digest storage.
//!
//! Articles are keyed by URL. A fresh store never rewrites an existing
//! row (a re-scraped URL keeps its archived copy and any usage marks),
//! while a usage store flips only the usage columns. Writes go out in
//! fixed-size batches, each committed independently, so a failure midway
//! leaves earlier batches durable.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use tracing::warn;

use super::pool::{run_blocking, DieselError, SqlitePool};
use super::records::{ArticleRecord, DigestRecord, NewArticle, NewDigest};
use super::{parse_datetime, parse_datetime_opt};
use crate::models::{Article, Digest};
use crate::schema::{articles, digests};

impl From<ArticleRecord> for Article {
    fn from(record: ArticleRecord) -> Self {
        Article {
            url: record.url,
            title: record.title,
            content: record.content,
            author: record.author,
            published_date: record.published_date,
            image_urls: serde_json::from_str(&record.image_urls).unwrap_or_default(),
            source: record.source,
            category: record.category,
            slug: record.slug,
            scraped_at: parse_datetime(&record.scraped_at),
            is_used: record.is_used != 0,
            used_in_digest_id: record.used_in_digest_id,
            used_at: parse_datetime_opt(record.used_at),
        }
    }
}

impl From<DigestRecord> for Digest {
    fn from(record: DigestRecord) -> Self {
        Digest {
            id: record.id,
            source: record.source,
            title: record.title,
            body: record.body,
            article_count: record.article_count.max(0) as u32,
            generated_at: parse_datetime(&record.generated_at),
        }
    }
}

/// Marks stored articles as consumed by a digest.
#[derive(Debug, Clone)]
pub struct UsageUpdate {
    pub digest_id: String,
    pub used_at: DateTime<Utc>,
}

/// Outcome of an archive store call.
#[derive(Debug, Clone, Default)]
pub struct StoreReport {
    /// Rows inserted or usage-updated.
    pub stored: usize,
    /// Rows left untouched because the URL was already archived.
    pub skipped: usize,
    /// Rows that could not be written.
    pub failed: usize,
}

/// Article and digest persistence over the `articles` and `digests` tables.
#[derive(Clone)]
pub struct ArchiveRepository {
    pool: SqlitePool,
    batch_size: usize,
}

impl ArchiveRepository {
    pub fn new(pool: SqlitePool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
        }
    }

    /// Store articles in batches, committing each batch on its own.
    ///
    /// Without a usage update, an already-archived URL is skipped rather
    /// than rewritten. With one, only the usage columns change on
    /// conflict. Individual row failures are logged and counted, never
    /// propagated; a batch that fails wholesale counts all of its rows
    /// as failed and the remaining batches still run.
    pub async fn store(
        &self,
        articles: &[Article],
        usage: Option<&UsageUpdate>,
    ) -> Result<StoreReport, DieselError> {
        let mut report = StoreReport::default();

        for chunk in articles.chunks(self.batch_size) {
            let batch: Vec<Article> = chunk.to_vec();
            let usage = usage.cloned();
            let pool = self.pool.clone();

            let outcome = run_blocking(pool, move |conn| {
                conn.transaction(|conn| {
                    let mut stored = 0usize;
                    let mut skipped = 0usize;
                    let mut failed = 0usize;
                    for article in &batch {
                        match upsert_article(conn, article, usage.as_ref()) {
                            Ok(true) => stored += 1,
                            Ok(false) => skipped += 1,
                            Err(e) => {
                                warn!(url = %article.url, error = %e, "failed to archive article, skipping");
                                failed += 1;
                            }
                        }
                    }
                    Ok((stored, skipped, failed))
                })
            })
            .await;

            match outcome {
                Ok((stored, skipped, failed)) => {
                    report.stored += stored;
                    report.skipped += skipped;
                    report.failed += failed;
                }
                Err(e) => {
                    warn!(batch_len = chunk.len(), error = %e, "archive batch failed");
                    report.failed += chunk.len();
                }
            }
        }

        Ok(report)
    }

    /// Fetch a single archived article by URL.
    pub async fn get(&self, url: &str) -> Result<Option<Article>, DieselError> {
        let url = url.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            articles::table
                .find(&url)
                .first::<ArticleRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(Article::from))
    }

    /// Articles from a source that no digest has consumed yet, newest
    /// scrape first.
    pub async fn unused_for_source(
        &self,
        source: &str,
        limit: i64,
    ) -> Result<Vec<Article>, DieselError> {
        let source = source.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            articles::table
                .filter(articles::source.eq(&source))
                .filter(articles::is_used.eq(0))
                .order(articles::scraped_at.desc())
                .limit(limit)
                .load::<ArticleRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(Article::from).collect())
    }

    /// Persist a generated digest.
    pub async fn save_digest(&self, digest: &Digest) -> Result<(), DieselError> {
        let digest = digest.clone();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let generated_at = digest.generated_at.to_rfc3339();
            diesel::insert_into(digests::table)
                .values(&NewDigest {
                    id: &digest.id,
                    source: &digest.source,
                    title: &digest.title,
                    body: &digest.body,
                    article_count: digest.article_count as i32,
                    generated_at: &generated_at,
                })
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Most recently generated digests.
    pub async fn recent_digests(&self, limit: i64) -> Result<Vec<Digest>, DieselError> {
        let pool = self.pool.clone();
        run_blocking(pool, move |conn| {
            digests::table
                .order(digests::generated_at.desc())
                .limit(limit)
                .load::<DigestRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(Digest::from).collect())
    }

    /// Total archived articles.
    pub async fn article_count(&self) -> Result<i64, DieselError> {
        let pool = self.pool.clone();
        run_blocking(pool, |conn| {
            use diesel::dsl::count_star;
            articles::table.select(count_star()).first(conn)
        })
        .await
    }

    /// Archived articles no digest has consumed.
    pub async fn unused_count(&self) -> Result<i64, DieselError> {
        let pool = self.pool.clone();
        run_blocking(pool, |conn| {
            use diesel::dsl::count_star;
            articles::table
                .filter(articles::is_used.eq(0))
                .select(count_star())
                .first(conn)
        })
        .await
    }

    /// Total generated digests.
    pub async fn digest_count(&self) -> Result<i64, DieselError> {
        let pool = self.pool.clone();
        run_blocking(pool, |conn| {
            use diesel::dsl::count_star;
            digests::table.select(count_star()).first(conn)
        })
        .await
    }
}

/// Returns Ok(true) when a row was written, Ok(false) when the URL was
/// already archived and left untouched.
fn upsert_article(
    conn: &mut SqliteConnection,
    article: &Article,
    usage: Option<&UsageUpdate>,
) -> Result<bool, DieselError> {
    let record = new_article_record(article, usage);

    match usage {
        Some(update) => {
            diesel::insert_into(articles::table)
                .values(&record)
                .on_conflict(articles::url)
                .do_update()
                .set((
                    articles::is_used.eq(1),
                    articles::used_in_digest_id.eq(update.digest_id.clone()),
                    articles::used_at.eq(update.used_at.to_rfc3339()),
                ))
                .execute(conn)?;
            Ok(true)
        }
        None => {
            let inserted = diesel::insert_into(articles::table)
                .values(&record)
                .on_conflict(articles::url)
                .do_nothing()
                .execute(conn)?;
            Ok(inserted > 0)
        }
    }
}

fn new_article_record(article: &Article, usage: Option<&UsageUpdate>) -> NewArticle {
    let (is_used, used_in_digest_id, used_at) = match usage {
        Some(update) => (
            1,
            Some(update.digest_id.clone()),
            Some(update.used_at.to_rfc3339()),
        ),
        None => (
            article.is_used as i32,
            article.used_in_digest_id.clone(),
            article.used_at.map(|t| t.to_rfc3339()),
        ),
    };

    NewArticle {
        url: article.url.clone(),
        title: article.title.clone(),
        content: article.content.clone(),
        author: article.author.clone(),
        published_date: article.published_date.clone(),
        image_urls: serde_json::to_string(&article.image_urls)
            .unwrap_or_else(|_| "[]".to_string()),
        source: article.source.clone(),
        category: article.category.clone(),
        slug: article.slug.clone(),
        scraped_at: article.scraped_at.to_rfc3339(),
        is_used,
        used_in_digest_id,
        used_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::pool::open_store;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn setup() -> (ArchiveRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let pool = open_store(&dir.path().join("test.db")).unwrap();
        (ArchiveRepository::new(pool, 50), dir)
    }

    fn make_article(url: &str, title: &str, source: &str) -> Article {
        Article {
            url: url.to_string(),
            title: title.to_string(),
            content: "Body text for the story.".to_string(),
            author: Some("Staff Reports".to_string()),
            published_date: None,
            image_urls: vec!["https://example.com/img.jpg".to_string()],
            source: source.to_string(),
            category: Some("local".to_string()),
            slug: "story".to_string(),
            scraped_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            is_used: false,
            used_in_digest_id: None,
            used_at: None,
        }
    }

    #[tokio::test]
    async fn test_store_is_idempotent() {
        let (repo, _dir) = setup();
        let article = make_article("https://example.com/a", "First", "gazette");

        let first = repo.store(&[article.clone()], None).await.unwrap();
        assert_eq!(first.stored, 1);
        assert_eq!(first.skipped, 0);

        let second = repo.store(&[article], None).await.unwrap();
        assert_eq!(second.stored, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(repo.article_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_restore_keeps_archived_fields() {
        let (repo, _dir) = setup();
        let original = make_article("https://example.com/a", "Original Title", "gazette");
        repo.store(&[original], None).await.unwrap();

        let mut altered = make_article("https://example.com/a", "Rewritten Title", "gazette");
        altered.content = "Different body.".to_string();
        repo.store(&[altered], None).await.unwrap();

        let stored = repo.get("https://example.com/a").await.unwrap().unwrap();
        assert_eq!(stored.title, "Original Title");
        assert_eq!(stored.content, "Body text for the story.");
    }

    #[tokio::test]
    async fn test_usage_update_flips_flags_without_duplicating() {
        let (repo, _dir) = setup();
        let article = make_article("https://example.com/a", "Used Soon", "gazette");
        repo.store(&[article.clone()], None).await.unwrap();

        let used_at = Utc.with_ymd_and_hms(2025, 3, 2, 8, 0, 0).unwrap();
        let usage = UsageUpdate {
            digest_id: "digest-001".to_string(),
            used_at,
        };
        let report = repo.store(&[article], Some(&usage)).await.unwrap();
        assert_eq!(report.stored, 1);
        assert_eq!(repo.article_count().await.unwrap(), 1);

        let stored = repo.get("https://example.com/a").await.unwrap().unwrap();
        assert!(stored.is_used);
        assert_eq!(stored.used_in_digest_id.as_deref(), Some("digest-001"));
        assert_eq!(stored.used_at, Some(used_at));
        // Article fields stay as archived
        assert_eq!(stored.title, "Used Soon");
    }

    #[tokio::test]
    async fn test_store_commits_every_batch() {
        let dir = tempdir().unwrap();
        let pool = open_store(&dir.path().join("test.db")).unwrap();
        let repo = ArchiveRepository::new(pool, 3);

        let articles: Vec<Article> = (0..7)
            .map(|i| {
                make_article(
                    &format!("https://example.com/{}", i),
                    &format!("Story {}", i),
                    "gazette",
                )
            })
            .collect();

        let report = repo.store(&articles, None).await.unwrap();
        assert_eq!(report.stored, 7);
        assert_eq!(repo.article_count().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_unused_for_source_excludes_used_and_other_sources() {
        let (repo, _dir) = setup();
        let a = make_article("https://example.com/a", "A", "gazette");
        let b = make_article("https://example.com/b", "B", "gazette");
        let c = make_article("https://example.com/c", "C", "tribune");
        repo.store(&[a.clone(), b, c], None).await.unwrap();

        let usage = UsageUpdate {
            digest_id: "digest-001".to_string(),
            used_at: Utc::now(),
        };
        repo.store(&[a], Some(&usage)).await.unwrap();

        let unused = repo.unused_for_source("gazette", 10).await.unwrap();
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].url, "https://example.com/b");
        assert_eq!(repo.unused_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_save_digest_roundtrip() {
        let (repo, _dir) = setup();
        let digest = Digest::new(
            "gazette",
            "Morning Roundup".to_string(),
            "Three stories about the city.".to_string(),
            3,
        );
        repo.save_digest(&digest).await.unwrap();

        let recent = repo.recent_digests(5).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, digest.id);
        assert_eq!(recent[0].title, "Morning Roundup");
        assert_eq!(recent[0].article_count, 3);
        assert_eq!(repo.digest_count().await.unwrap(), 1);
    }
}
