//! SQLite connection pool management.
//!
//! diesel-async does not cover SQLite, so operations use sync Diesel with
//! r2d2 pooling, wrapped in spawn_blocking by [`run_blocking`].

use std::path::Path;
use std::time::Duration;

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};

use crate::error::StoreError;

/// Diesel error type alias.
pub type DieselError = diesel::result::Error;

/// Connection pool for SQLite using r2d2.
pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

/// Pooled connection type.
pub type PooledConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Open (or create) the database file, bootstrap the schema, and build a
/// connection pool.
///
/// Failure here is fatal to the caller: nothing in the pipeline can run
/// without dedup/blocklist/archive state behind it.
pub fn open_store(db_path: &Path) -> Result<SqlitePool, StoreError> {
    bootstrap_schema(db_path).map_err(|e| StoreError::Unavailable(e.to_string()))?;
    create_pool(db_path).map_err(|e| StoreError::Unavailable(e.to_string()))
}

/// Create an r2d2 pool for the given database path.
pub fn create_pool(db_path: &Path) -> Result<SqlitePool, diesel::r2d2::PoolError> {
    create_pool_from_url(&db_path.display().to_string())
}

/// Create an r2d2 pool from a database URL or bare path.
pub fn create_pool_from_url(database_url: &str) -> Result<SqlitePool, diesel::r2d2::PoolError> {
    // Strip "sqlite:" prefix if present for Diesel
    let url = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

    let manager = ConnectionManager::<SqliteConnection>::new(url);

    Pool::builder()
        .max_size(10)
        .connection_timeout(Duration::from_secs(30))
        .connection_customizer(Box::new(ConnectionPragmas))
        .build(manager)
}

/// Applies per-connection pragmas whenever the pool hands out a connection.
#[derive(Debug)]
struct ConnectionPragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        init_connection_pragmas(conn).map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Initialize SQLite pragmas for a connection.
pub fn init_connection_pragmas(conn: &mut SqliteConnection) -> Result<(), DieselError> {
    diesel::sql_query("PRAGMA busy_timeout = 5000").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous = NORMAL").execute(conn)?;
    diesel::sql_query("PRAGMA foreign_keys = ON").execute(conn)?;
    diesel::sql_query("PRAGMA cache_size = -64000").execute(conn)?; // 64MB
    diesel::sql_query("PRAGMA temp_store = MEMORY").execute(conn)?;
    Ok(())
}

/// Create tables and indexes. Idempotent; runs before the pool is built so
/// WAL mode is set once on the database file itself.
fn bootstrap_schema(db_path: &Path) -> rusqlite::Result<()> {
    let conn = rusqlite::Connection::open(db_path)?;

    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;

        CREATE TABLE IF NOT EXISTS tracked_urls (
            url TEXT PRIMARY KEY,
            first_seen_at TEXT NOT NULL,
            last_seen_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            failure_count INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_tracked_urls_last_seen
            ON tracked_urls(last_seen_at);

        CREATE TABLE IF NOT EXISTS content_fingerprints (
            hash TEXT PRIMARY KEY,
            inserted_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_fingerprints_inserted
            ON content_fingerprints(inserted_at);

        CREATE TABLE IF NOT EXISTS blocklist (
            url TEXT PRIMARY KEY,
            reason TEXT NOT NULL,
            added_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS articles (
            url TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            author TEXT,
            published_date TEXT,
            source TEXT NOT NULL,
            image_urls TEXT NOT NULL DEFAULT '[]',
            category TEXT,
            scraped_at TEXT NOT NULL,
            slug TEXT NOT NULL,
            is_used INTEGER NOT NULL DEFAULT 0,
            used_in_digest_id TEXT,
            used_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_articles_source_unused
            ON articles(source, is_used);
        CREATE INDEX IF NOT EXISTS idx_articles_scraped_at
            ON articles(scraped_at);

        CREATE TABLE IF NOT EXISTS digests (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            article_count INTEGER NOT NULL DEFAULT 0,
            generated_at TEXT NOT NULL
        );
        "#,
    )?;

    Ok(())
}

/// Run a blocking Diesel operation asynchronously.
///
/// Wraps a sync closure in spawn_blocking so Diesel operations can be used
/// in async contexts without blocking the runtime.
///
/// # Example
/// ```ignore
/// let count = run_blocking(pool.clone(), |conn| {
///     tracked_urls::table.count().get_result::<i64>(conn)
/// }).await?;
/// ```
pub async fn run_blocking<F, T>(pool: SqlitePool, f: F) -> Result<T, DieselError>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T, DieselError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| {
            DieselError::DatabaseError(
                diesel::result::DatabaseErrorKind::Unknown,
                Box::new(e.to_string()),
            )
        })?;
        f(&mut conn)
    })
    .await
    .map_err(|e| {
        DieselError::DatabaseError(
            diesel::result::DatabaseErrorKind::Unknown,
            Box::new(e.to_string()),
        )
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_store_bootstraps_schema() {
        let dir = tempdir().unwrap();
        let pool = open_store(&dir.path().join("test.db")).unwrap();

        // All tables exist and are queryable
        let count = run_blocking(pool, |conn| {
            use diesel::dsl::count_star;
            let mut total = 0i64;
            total += crate::schema::tracked_urls::table
                .select(count_star())
                .first::<i64>(conn)?;
            total += crate::schema::content_fingerprints::table
                .select(count_star())
                .first::<i64>(conn)?;
            total += crate::schema::blocklist::table
                .select(count_star())
                .first::<i64>(conn)?;
            total += crate::schema::articles::table
                .select(count_star())
                .first::<i64>(conn)?;
            total += crate::schema::digests::table
                .select(count_star())
                .first::<i64>(conn)?;
            Ok(total)
        })
        .await
        .unwrap();

        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_open_store_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        open_store(&path).unwrap();
        open_store(&path).unwrap();
    }
}
