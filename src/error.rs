//! Error types for the scrape pipeline.
//!
//! The taxonomy separates retryable transport failures from terminal
//! extraction failures so callers can tell what a retry could still fix,
//! and keeps store errors distinct so persistence hiccups never masquerade
//! as scrape failures.

use std::time::Duration;

use thiserror::Error;

/// A fetch failed at the transport level. Retryable within a run's
/// per-URL attempt budget.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP status {0}")]
    Status(u16),
}

/// No selector in the fallback chain produced usable content for a
/// required field. Terminal for that URL within the current run.
#[derive(Debug, Error)]
#[error("no usable {field} at selector position {position}")]
pub struct SelectorMiss {
    pub field: &'static str,
    pub position: usize,
}

/// Terminal outcome for one candidate URL in one run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    SelectorMiss(#[from] SelectorMiss),
}

/// Failures from the durable store.
///
/// `Unavailable` means the backend could not be opened at all; nothing in
/// the pipeline can proceed without dedup/archive state, so it is fatal to
/// the run. `Database` covers individual read/write failures, which are
/// logged and skipped.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}
