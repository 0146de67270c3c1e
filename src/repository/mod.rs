//! SQLite persistence layer.
//!
//! All durable state lives in one SQLite database: the URL and content
//! deduplication indices, the failure counters and blocklist, and the
//! article archive with its digests. Since diesel-async only supports
//! Postgres/MySQL, SQLite operations use sync Diesel with r2d2 pooling
//! wrapped in spawn_blocking.
//!
//! Timestamps are stored as RFC3339 UTC strings, which compare
//! lexicographically in the same order as chronologically, so TTL
//! cutoffs can be evaluated inside SQL.

mod archive;
mod dedup;
mod failures;
mod pool;
mod records;

pub use archive::{ArchiveRepository, StoreReport, UsageUpdate};
pub use dedup::DedupRepository;
pub use failures::FailureRepository;
pub use pool::{open_store, run_blocking, DieselError, PooledConn, SqlitePool};

use chrono::{DateTime, Utc};

/// Parse a stored RFC3339 timestamp.
///
/// Malformed values map to the epoch, so a corrupt row reads as maximally
/// stale and the next TTL prune clears it.
pub(crate) fn parse_datetime(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Parse an optional stored timestamp.
pub(crate) fn parse_datetime_opt(value: Option<String>) -> Option<DateTime<Utc>> {
    value.as_deref().map(parse_datetime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_datetime_roundtrip() {
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 45).unwrap();
        assert_eq!(parse_datetime(&t.to_rfc3339()), t);
    }

    #[test]
    fn test_parse_datetime_malformed_reads_as_epoch() {
        assert_eq!(parse_datetime("not a timestamp"), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(parse_datetime(""), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_parse_datetime_opt() {
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_datetime_opt(Some(t.to_rfc3339())), Some(t));
        assert_eq!(parse_datetime_opt(None), None);
    }
}
