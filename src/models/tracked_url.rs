//! URL tracking state shared by the dedup index and the failure tracker.

use chrono::{DateTime, Utc};

/// Processing status of a tracked URL.
///
/// `Scraped` is sticky: once a URL has produced an archived article, later
/// failures never move it back to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlStatus {
    /// Discovered but not yet successfully processed.
    Pending,
    /// Successfully scraped and archived.
    Scraped,
    /// Last attempt ended in a terminal failure for that run.
    Failed,
}

impl UrlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlStatus::Pending => "pending",
            UrlStatus::Scraped => "scraped",
            UrlStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(UrlStatus::Pending),
            "scraped" => Some(UrlStatus::Scraped),
            "failed" => Some(UrlStatus::Failed),
            _ => None,
        }
    }
}

/// One URL's entry in the dedup index.
///
/// Pruned when `last_seen_at` outlives the URL TTL; `failure_count` counts
/// consecutive terminal failures and resets to zero on a successful scrape.
#[derive(Debug, Clone)]
pub struct TrackedUrl {
    pub url: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub status: UrlStatus,
    pub failure_count: u32,
}

/// A permanently quarantined URL.
///
/// Entries never expire on their own; removal is an operator action.
#[derive(Debug, Clone)]
pub struct BlocklistEntry {
    pub url: String,
    pub reason: String,
    pub added_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_status_round_trip() {
        for status in [UrlStatus::Pending, UrlStatus::Scraped, UrlStatus::Failed] {
            assert_eq!(UrlStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(UrlStatus::from_str("unknown"), None);
    }
}
