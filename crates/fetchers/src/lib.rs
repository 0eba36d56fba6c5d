//! Fetcher plugins: one per source kind, all satisfying the same
//! [`ContentFetcher`] contract.
//!
//! Fetchers return normalized [`ContentItem`]s (no ids, external_id set,
//! timezone-aware timestamps, metrics under `analysis.metrics`) and never
//! write to the database; the orchestrator decides what to store.

mod feed;
mod feedparse;
mod file;
mod forum;
mod readability;
mod validator;
mod video;
mod vtt;

use async_trait::async_trait;

use prismis_core::{ContentItem, Result, Source};

pub use feed::FeedFetcher;
pub use feedparse::{FeedEntry, parse_feed};
pub use file::FileFetcher;
pub use forum::ForumFetcher;
pub use readability::extract_article_text;
pub use validator::SourceValidator;
pub use video::VideoFetcher;
pub use vtt::parse_subtitle_text;

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch and normalize the source's current items, newest first.
    /// Recoverable failures degrade to an empty list; unrecoverable ones
    /// surface as [`prismis_core::Error::Fetch`] and count against the
    /// source's error budget.
    async fn fetch(&self, source: &Source) -> Result<Vec<ContentItem>>;
}
