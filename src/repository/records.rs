//! Diesel ORM records for database tables.
//!
//! These provide compile-time type checking for database operations. For
//! SQLite, operations are wrapped in spawn_blocking since diesel-async
//! only supports Postgres/MySQL.

use diesel::prelude::*;

use crate::schema;

/// Tracked URL record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::tracked_urls)]
#[diesel(primary_key(url))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TrackedUrlRecord {
    pub url: String,
    pub first_seen_at: String,
    pub last_seen_at: String,
    pub status: String,
    pub failure_count: i32,
}

/// New content fingerprint for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::content_fingerprints)]
pub struct NewFingerprint<'a> {
    pub hash: &'a str,
    pub inserted_at: &'a str,
}

/// Blocklist record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::blocklist)]
#[diesel(primary_key(url))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BlocklistEntryRecord {
    pub url: String,
    pub reason: String,
    pub added_at: String,
}

/// New blocklist entry for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::blocklist)]
pub struct NewBlocklistEntry<'a> {
    pub url: &'a str,
    pub reason: &'a str,
    pub added_at: &'a str,
}

/// Article record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::articles)]
#[diesel(primary_key(url))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ArticleRecord {
    pub url: String,
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub published_date: Option<String>,
    pub source: String,
    pub image_urls: String,
    pub category: Option<String>,
    pub scraped_at: String,
    pub slug: String,
    pub is_used: i32,
    pub used_in_digest_id: Option<String>,
    pub used_at: Option<String>,
}

/// New article for insertion. Owns its fields so batches can move into
/// spawn_blocking closures.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = schema::articles)]
pub struct NewArticle {
    pub url: String,
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub published_date: Option<String>,
    pub source: String,
    pub image_urls: String,
    pub category: Option<String>,
    pub scraped_at: String,
    pub slug: String,
    pub is_used: i32,
    pub used_in_digest_id: Option<String>,
    pub used_at: Option<String>,
}

/// Digest record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::digests)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DigestRecord {
    pub id: String,
    pub source: String,
    pub title: String,
    pub body: String,
    pub article_count: i32,
    pub generated_at: String,
}

/// New digest for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::digests)]
pub struct NewDigest<'a> {
    pub id: &'a str,
    pub source: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub article_count: i32,
    pub generated_at: &'a str,
}
