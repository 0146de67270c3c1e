//! URL and content-fingerprint deduplication backed by SQLite.
//!
//! Two independent indices with separate TTLs: the URL index answers "have
//! we processed this page recently", the fingerprint index answers "have we
//! seen this story recently, regardless of URL" (syndicated and mirrored
//! copies). Every write prunes entries older than that index's TTL first,
//! so the tables stay bounded by the TTL window.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::sql_types::Text;
use sha2::{Digest, Sha256};

use super::parse_datetime;
use super::pool::{run_blocking, DieselError, SqlitePool};
use super::records::{NewFingerprint, TrackedUrlRecord};
use crate::models::{TrackedUrl, UrlStatus};
use crate::schema::{content_fingerprints, tracked_urls};

/// Characters of article content that participate in the fingerprint.
const FINGERPRINT_CONTENT_CHARS: usize = 500;

impl From<TrackedUrlRecord> for TrackedUrl {
    fn from(record: TrackedUrlRecord) -> Self {
        TrackedUrl {
            url: record.url,
            first_seen_at: parse_datetime(&record.first_seen_at),
            last_seen_at: parse_datetime(&record.last_seen_at),
            status: UrlStatus::from_str(&record.status).unwrap_or(UrlStatus::Pending),
            failure_count: record.failure_count.max(0) as u32,
        }
    }
}

/// Deduplication store over the `tracked_urls` and `content_fingerprints`
/// tables.
#[derive(Clone)]
pub struct DedupRepository {
    pool: SqlitePool,
    url_ttl: Duration,
    fingerprint_ttl: Duration,
}

impl DedupRepository {
    pub fn new(pool: SqlitePool, url_ttl: Duration, fingerprint_ttl: Duration) -> Self {
        Self {
            pool,
            url_ttl,
            fingerprint_ttl,
        }
    }

    /// Hash a title plus the leading content characters, lowercased.
    ///
    /// The URL deliberately does not participate: the same story mirrored
    /// under a different URL produces the same fingerprint.
    pub fn fingerprint(title: &str, content: &str) -> String {
        let lead: String = content.chars().take(FINGERPRINT_CONTENT_CHARS).collect();
        let sample = format!("{} {}", title, lead).to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(sample.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// True when the URL is absent from the index or its entry has
    /// outlived the URL TTL.
    pub async fn is_new_url(&self, url: &str) -> Result<bool, DieselError> {
        self.is_new_url_at(url, Utc::now()).await
    }

    pub async fn is_new_url_at(&self, url: &str, now: DateTime<Utc>) -> Result<bool, DieselError> {
        let url = url.to_string();
        let cutoff = (now - self.url_ttl).to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            let count: i64 = tracked_urls::table
                .filter(tracked_urls::url.eq(&url))
                .filter(tracked_urls::last_seen_at.ge(&cutoff))
                .select(count_star())
                .first(conn)?;
            Ok(count == 0)
        })
        .await
    }

    /// Get the tracked entry for a URL, if any.
    pub async fn get_record(&self, url: &str) -> Result<Option<TrackedUrl>, DieselError> {
        let url = url.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            tracked_urls::table
                .find(&url)
                .first::<TrackedUrlRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(TrackedUrl::from))
    }

    /// Record a URL sighting with the given status.
    ///
    /// Inserts if absent, otherwise bumps `last_seen_at`. Status follows
    /// the monotonicity rule: an entry that reached `scraped` stays
    /// `scraped`. A scraped sighting also resets the consecutive failure
    /// counter. Entries older than the URL TTL are evicted first.
    pub async fn record_url(&self, url: &str, status: UrlStatus) -> Result<(), DieselError> {
        self.record_url_at(url, status, Utc::now()).await
    }

    pub async fn record_url_at(
        &self,
        url: &str,
        status: UrlStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DieselError> {
        let url = url.to_string();
        let now_s = now.to_rfc3339();
        let cutoff = (now - self.url_ttl).to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            diesel::delete(tracked_urls::table.filter(tracked_urls::last_seen_at.lt(&cutoff)))
                .execute(conn)?;
            upsert_sighting(conn, &url, status, &now_s)?;
            Ok(())
        })
        .await
    }

    /// Record a batch of discovered candidate URLs as pending sightings.
    ///
    /// New URLs insert with status `pending`; known URLs only get their
    /// `last_seen_at` bumped (a re-listed scraped page stays fresh and
    /// keeps being skipped).
    pub async fn record_discovered(&self, urls: &[String]) -> Result<(), DieselError> {
        self.record_discovered_at(urls, Utc::now()).await
    }

    pub async fn record_discovered_at(
        &self,
        urls: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), DieselError> {
        if urls.is_empty() {
            return Ok(());
        }
        let urls = urls.to_vec();
        let now_s = now.to_rfc3339();
        let cutoff = (now - self.url_ttl).to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            conn.transaction(|conn| {
                diesel::delete(
                    tracked_urls::table.filter(tracked_urls::last_seen_at.lt(&cutoff)),
                )
                .execute(conn)?;
                for url in &urls {
                    upsert_sighting(conn, url, UrlStatus::Pending, &now_s)?;
                }
                Ok(())
            })
        })
        .await
    }

    /// True when this title+content fingerprint has not been seen within
    /// the fingerprint TTL. A true answer records the fingerprint as a
    /// side effect; expired fingerprints are evicted first.
    pub async fn is_new_content(&self, title: &str, content: &str) -> Result<bool, DieselError> {
        self.is_new_content_at(title, content, Utc::now()).await
    }

    pub async fn is_new_content_at(
        &self,
        title: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DieselError> {
        let hash = Self::fingerprint(title, content);
        let now_s = now.to_rfc3339();
        let cutoff = (now - self.fingerprint_ttl).to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            diesel::delete(
                content_fingerprints::table
                    .filter(content_fingerprints::inserted_at.lt(&cutoff)),
            )
            .execute(conn)?;

            // Insert wins the race or loses it atomically: zero rows means
            // the fingerprint was already present within the TTL.
            let inserted = diesel::insert_into(content_fingerprints::table)
                .values(&NewFingerprint {
                    hash: &hash,
                    inserted_at: &now_s,
                })
                .on_conflict_do_nothing()
                .execute(conn)?;
            Ok(inserted > 0)
        })
        .await
    }

    /// Number of entries in the URL index.
    pub async fn url_count(&self) -> Result<i64, DieselError> {
        let pool = self.pool.clone();
        run_blocking(pool, |conn| {
            use diesel::dsl::count_star;
            tracked_urls::table.select(count_star()).first(conn)
        })
        .await
    }

    /// Number of entries in the fingerprint index.
    pub async fn fingerprint_count(&self) -> Result<i64, DieselError> {
        let pool = self.pool.clone();
        run_blocking(pool, |conn| {
            use diesel::dsl::count_star;
            content_fingerprints::table.select(count_star()).first(conn)
        })
        .await
    }
}

/// Single-statement sighting upsert with the status monotonicity guard.
///
/// The CASE guards run inside SQLite, so concurrent writers cannot
/// downgrade a scraped entry or clobber each other's counters.
fn upsert_sighting(
    conn: &mut SqliteConnection,
    url: &str,
    status: UrlStatus,
    now_s: &str,
) -> Result<usize, DieselError> {
    diesel::sql_query(
        "INSERT INTO tracked_urls (url, first_seen_at, last_seen_at, status, failure_count) \
         VALUES (?, ?, ?, ?, 0) \
         ON CONFLICT(url) DO UPDATE SET \
             last_seen_at = excluded.last_seen_at, \
             status = CASE \
                 WHEN tracked_urls.status = 'scraped' THEN 'scraped' \
                 ELSE excluded.status \
             END, \
             failure_count = CASE \
                 WHEN excluded.status = 'scraped' THEN 0 \
                 ELSE tracked_urls.failure_count \
             END",
    )
    .bind::<Text, _>(url)
    .bind::<Text, _>(now_s)
    .bind::<Text, _>(now_s)
    .bind::<Text, _>(status.as_str())
    .execute(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::pool::open_store;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn setup() -> (DedupRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let pool = open_store(&dir.path().join("test.db")).unwrap();
        let repo = DedupRepository::new(pool, Duration::days(7), Duration::hours(48));
        (repo, dir)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_is_new_url_respects_ttl() {
        let (repo, _dir) = setup();
        let url = "https://example.com/news/story-1";

        assert!(repo.is_new_url_at(url, t0()).await.unwrap());

        repo.record_url_at(url, UrlStatus::Scraped, t0()).await.unwrap();
        assert!(!repo.is_new_url_at(url, t0() + Duration::hours(1)).await.unwrap());
        assert!(!repo.is_new_url_at(url, t0() + Duration::days(6)).await.unwrap());

        // Past the 7-day TTL the URL reads as new again
        assert!(repo.is_new_url_at(url, t0() + Duration::days(8)).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_url_prunes_stale_entries() {
        let (repo, _dir) = setup();
        repo.record_url_at("https://example.com/a", UrlStatus::Scraped, t0())
            .await
            .unwrap();

        // A write 8 days later evicts the stale entry before inserting
        repo.record_url_at(
            "https://example.com/b",
            UrlStatus::Scraped,
            t0() + Duration::days(8),
        )
        .await
        .unwrap();

        assert!(repo.get_record("https://example.com/a").await.unwrap().is_none());
        assert!(repo.get_record("https://example.com/b").await.unwrap().is_some());
        assert_eq!(repo.url_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scraped_status_is_never_downgraded() {
        let (repo, _dir) = setup();
        let url = "https://example.com/story";

        repo.record_url_at(url, UrlStatus::Scraped, t0()).await.unwrap();
        repo.record_url_at(url, UrlStatus::Failed, t0() + Duration::hours(1))
            .await
            .unwrap();
        repo.record_url_at(url, UrlStatus::Pending, t0() + Duration::hours(2))
            .await
            .unwrap();

        let record = repo.get_record(url).await.unwrap().unwrap();
        assert_eq!(record.status, UrlStatus::Scraped);
        assert_eq!(record.last_seen_at, t0() + Duration::hours(2));
    }

    #[tokio::test]
    async fn test_record_discovered_preserves_first_seen() {
        let (repo, _dir) = setup();
        let urls = vec!["https://example.com/one".to_string()];

        repo.record_discovered_at(&urls, t0()).await.unwrap();
        repo.record_discovered_at(&urls, t0() + Duration::days(1))
            .await
            .unwrap();

        let record = repo.get_record(&urls[0]).await.unwrap().unwrap();
        assert_eq!(record.first_seen_at, t0());
        assert_eq!(record.last_seen_at, t0() + Duration::days(1));
        assert_eq!(record.status, UrlStatus::Pending);
    }

    #[tokio::test]
    async fn test_content_fingerprint_ignores_url() {
        let (repo, _dir) = setup();
        let title = "Water Main Break Closes Downtown Street";
        let content = "Crews responded early Tuesday to a water main break that...";

        // First sighting records the fingerprint
        assert!(repo.is_new_content_at(title, content, t0()).await.unwrap());
        // The same story from a mirror is rejected, URL never consulted
        assert!(!repo.is_new_content_at(title, content, t0() + Duration::hours(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_fingerprint_ttl_reaccepts_after_expiry() {
        let (repo, _dir) = setup();
        let title = "Council Sets Budget Hearing";
        let content = "The city council will hold a public hearing next week.";

        assert!(repo.is_new_content_at(title, content, t0()).await.unwrap());
        assert!(!repo
            .is_new_content_at(title, content, t0() + Duration::hours(47))
            .await
            .unwrap());

        // 49 hours after the last recording the fingerprint has expired
        let t_new = t0() + Duration::hours(47) + Duration::hours(49);
        assert!(repo.is_new_content_at(title, content, t_new).await.unwrap());
    }

    #[tokio::test]
    async fn test_fingerprint_uses_leading_content_only() {
        let (repo, _dir) = setup();
        let lead = "a".repeat(500);
        let c1 = format!("{}{}", lead, " tail one");
        let c2 = format!("{}{}", lead, " tail two");

        assert_eq!(
            DedupRepository::fingerprint("Title", &c1),
            DedupRepository::fingerprint("Title", &c2)
        );
        assert!(repo.is_new_content_at("Title", &c1, t0()).await.unwrap());
        assert!(!repo.is_new_content_at("Title", &c2, t0()).await.unwrap());
    }

    #[test]
    fn test_fingerprint_counts_characters_not_bytes() {
        // 600 two-byte chars; the prefix is measured in characters
        let c1 = "é".repeat(600);
        let c2 = format!("{}{}", "é".repeat(500), "different tail");
        assert_eq!(
            DedupRepository::fingerprint("T", &c1),
            DedupRepository::fingerprint("T", &c2)
        );
    }

    #[test]
    fn test_fingerprint_is_case_insensitive() {
        assert_eq!(
            DedupRepository::fingerprint("Big Story", "Some Content"),
            DedupRepository::fingerprint("BIG STORY", "some content")
        );
    }
}
