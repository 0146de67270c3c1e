//! Domain models for sources, tracked URLs, and articles.

mod article;
mod source;
mod tracked_url;

pub use article::{Article, Digest};
pub use source::SourceEndpoint;
pub use tracked_url::{BlocklistEntry, TrackedUrl, UrlStatus};
