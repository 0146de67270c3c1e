//! Consecutive-failure tracking and the append-only blocklist.
//!
//! Failure counts live on the tracked URL entry and share its TTL, so a
//! URL that stops being attempted eventually ages out of the index. The
//! blocklist is a separate table with no TTL: once a URL lands there it
//! stays until an operator removes it.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::sql_types::Text;

use super::parse_datetime;
use super::pool::{run_blocking, DieselError, SqlitePool};
use super::records::{BlocklistEntryRecord, NewBlocklistEntry};
use crate::models::BlocklistEntry;
use crate::schema::{blocklist, tracked_urls};

impl From<BlocklistEntryRecord> for BlocklistEntry {
    fn from(record: BlocklistEntryRecord) -> Self {
        BlocklistEntry {
            url: record.url,
            reason: record.reason,
            added_at: parse_datetime(&record.added_at),
        }
    }
}

/// Failure bookkeeping over `tracked_urls` plus the `blocklist` table.
#[derive(Clone)]
pub struct FailureRepository {
    pool: SqlitePool,
    url_ttl: Duration,
}

impl FailureRepository {
    pub fn new(pool: SqlitePool, url_ttl: Duration) -> Self {
        Self { pool, url_ttl }
    }

    /// Record a terminal fetch failure and return the updated consecutive
    /// failure count.
    ///
    /// The increment happens in a single SQL statement, so two workers
    /// failing on the same URL both land their increments. Entries older
    /// than the URL TTL are evicted first, which is what makes the count
    /// "consecutive within the tracking window".
    pub async fn record_failure(&self, url: &str) -> Result<u32, DieselError> {
        self.record_failure_at(url, Utc::now()).await
    }

    pub async fn record_failure_at(
        &self,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<u32, DieselError> {
        let url = url.to_string();
        let now_s = now.to_rfc3339();
        let cutoff = (now - self.url_ttl).to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            conn.transaction(|conn| {
                diesel::delete(
                    tracked_urls::table.filter(tracked_urls::last_seen_at.lt(&cutoff)),
                )
                .execute(conn)?;

                diesel::sql_query(
                    "INSERT INTO tracked_urls (url, first_seen_at, last_seen_at, status, failure_count) \
                     VALUES (?, ?, ?, 'failed', 1) \
                     ON CONFLICT(url) DO UPDATE SET \
                         last_seen_at = excluded.last_seen_at, \
                         failure_count = tracked_urls.failure_count + 1, \
                         status = CASE \
                             WHEN tracked_urls.status = 'scraped' THEN 'scraped' \
                             ELSE 'failed' \
                         END",
                )
                .bind::<Text, _>(&url)
                .bind::<Text, _>(&now_s)
                .bind::<Text, _>(&now_s)
                .execute(conn)?;

                let count: i32 = tracked_urls::table
                    .find(&url)
                    .select(tracked_urls::failure_count)
                    .first(conn)?;
                Ok(count.max(0) as u32)
            })
        })
        .await
    }

    /// Add a URL to the blocklist with a human-readable reason.
    ///
    /// Returns true when the URL was newly added. An already-listed URL
    /// keeps its original reason and timestamp.
    pub async fn add_to_blocklist(&self, url: &str, reason: &str) -> Result<bool, DieselError> {
        self.add_to_blocklist_at(url, reason, Utc::now()).await
    }

    pub async fn add_to_blocklist_at(
        &self,
        url: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DieselError> {
        let url = url.to_string();
        let reason = reason.to_string();
        let now_s = now.to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let inserted = diesel::insert_into(blocklist::table)
                .values(&NewBlocklistEntry {
                    url: &url,
                    reason: &reason,
                    added_at: &now_s,
                })
                .on_conflict_do_nothing()
                .execute(conn)?;
            Ok(inserted > 0)
        })
        .await
    }

    /// Whether a URL is currently blocklisted.
    pub async fn is_blocklisted(&self, url: &str) -> Result<bool, DieselError> {
        let url = url.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            let count: i64 = blocklist::table
                .filter(blocklist::url.eq(&url))
                .select(count_star())
                .first(conn)?;
            Ok(count > 0)
        })
        .await
    }

    /// All blocklist entries, oldest first.
    pub async fn blocklist(&self) -> Result<Vec<BlocklistEntry>, DieselError> {
        let pool = self.pool.clone();
        run_blocking(pool, |conn| {
            blocklist::table
                .order(blocklist::added_at.asc())
                .load::<BlocklistEntryRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(BlocklistEntry::from).collect())
    }

    /// Operator reinstatement: drop the URL from the blocklist and zero
    /// its consecutive failure count so the next failure starts over.
    ///
    /// Returns false when the URL was not listed.
    pub async fn remove_from_blocklist(&self, url: &str) -> Result<bool, DieselError> {
        let url = url.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            conn.transaction(|conn| {
                let removed =
                    diesel::delete(blocklist::table.filter(blocklist::url.eq(&url)))
                        .execute(conn)?;
                if removed > 0 {
                    diesel::update(tracked_urls::table.find(&url))
                        .set(tracked_urls::failure_count.eq(0))
                        .execute(conn)?;
                }
                Ok(removed > 0)
            })
        })
        .await
    }

    /// Number of blocklisted URLs.
    pub async fn blocklist_count(&self) -> Result<i64, DieselError> {
        let pool = self.pool.clone();
        run_blocking(pool, |conn| {
            use diesel::dsl::count_star;
            blocklist::table.select(count_star()).first(conn)
        })
        .await
    }
}
