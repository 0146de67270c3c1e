//! # CityDigest
//!
//! Local news aggregation and digest generation.
//!
//! Scrapes configured news sources into a SQLite archive with URL and
//! content-level deduplication, tracks chronically failing URLs in a
//! durable blocklist, and turns unused articles into LLM-written
//! digests.

pub mod config;
pub mod digest;
pub mod error;
pub mod llm;
pub mod models;
pub mod repository;
pub mod schema;
pub mod scrapers;
pub mod sources;
