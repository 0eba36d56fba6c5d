//! Web-feed fetcher with full-article extraction.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use prismis_config::Config;
use prismis_core::{ContentItem, Error, Result, Source, SourceKind, short_hash};

use crate::feedparse::{FeedEntry, parse_feed};
use crate::readability::extract_article_text;
use crate::ContentFetcher;

const FEED_TIMEOUT: Duration = Duration::from_secs(30);
const ARTICLE_TIMEOUT: Duration = Duration::from_secs(30);
/// Cap on downloaded article bytes; pages beyond this are truncated.
const MAX_ARTICLE_BYTES: usize = 512 * 1024;

pub struct FeedFetcher {
    max_items: usize,
    max_days_lookback: i64,
    client: reqwest::Client,
}

impl FeedFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FEED_TIMEOUT)
            .user_agent("prismis/0.1 (content aggregator)")
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            max_items: config.max_items(SourceKind::Feed) as usize,
            max_days_lookback: config.daemon.max_days_lookback as i64,
            client,
        })
    }

    async fn fetch_inner(&self, source: &Source) -> Result<Vec<ContentItem>> {
        let document = self
            .client
            .get(&source.url)
            .send()
            .await
            .map_err(|e| Error::fetch(format!("feed request failed for {}: {e}", source.url)))?
            .text()
            .await
            .map_err(|e| Error::fetch(format!("feed body unreadable for {}: {e}", source.url)))?;

        let entries = parse_feed(&document);
        let cutoff = Utc::now() - chrono::Duration::days(self.max_days_lookback);
        debug!(
            url = %source.url,
            entries = entries.len(),
            %cutoff,
            "parsed feed"
        );

        let mut items = Vec::new();
        let mut filtered_old = 0usize;
        for entry in entries.into_iter().take(self.max_items) {
            let Some(url) = entry.link.clone().filter(|l| !l.is_empty()) else {
                warn!(title = ?entry.title, "skipping entry without URL");
                continue;
            };

            if let Some(published) = entry.published {
                if published < cutoff {
                    filtered_old += 1;
                    continue;
                }
            }

            let fetched_at = Utc::now();
            let content = self.full_content(&url, &entry).await;
            let title = entry
                .title
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Untitled".to_string());

            let mut item = ContentItem::new(
                source.id.clone(),
                external_id(&entry, &url, &title),
                title,
                url,
                content,
            );
            item.published_at = Some(entry.published.unwrap_or(fetched_at));
            item.fetched_at = fetched_at;
            items.push(item);

            if items.len() >= self.max_items {
                break;
            }
        }

        if filtered_old > 0 {
            info!(
                filtered_old,
                lookback_days = self.max_days_lookback,
                "dropped entries older than lookback"
            );
        }
        Ok(items)
    }

    /// Full article text via readability extraction, falling back to the
    /// entry's own content/summary/description.
    async fn full_content(&self, url: &str, entry: &FeedEntry) -> String {
        match self.fetch_article(url).await {
            Some(text) => text,
            None => entry
                .body_fallback()
                .map(str::to_string)
                .unwrap_or_else(|| "No content available".to_string()),
        }
    }

    async fn fetch_article(&self, url: &str) -> Option<String> {
        let response = self
            .client
            .get(url)
            .timeout(ARTICLE_TIMEOUT)
            .header("Accept", "text/html")
            .send()
            .await
            .ok()?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !content_type.contains("text/html") && !content_type.contains("application/xhtml") {
            return None;
        }

        let mut body = response.text().await.ok()?;
        if body.len() > MAX_ARTICLE_BYTES {
            let mut end = MAX_ARTICLE_BYTES;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }

        extract_article_text(&body)
    }
}

/// Stable external id: the entry id when provided, else a hash of the
/// canonical URL, else a hash of the title.
fn external_id(entry: &FeedEntry, url: &str, title: &str) -> String {
    if let Some(id) = entry.id.as_deref().filter(|id| !id.trim().is_empty()) {
        return id.trim().to_string();
    }
    if !url.is_empty() {
        return short_hash(url);
    }
    short_hash(title)
}

#[async_trait]
impl ContentFetcher for FeedFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<ContentItem>> {
        let started = Instant::now();
        match self.fetch_inner(source).await {
            Ok(items) => {
                prismis_observability::log(
                    "fetcher.complete",
                    json!({
                        "fetcher_type": "rss",
                        "source_id": source.id,
                        "source_url": source.url,
                        "items_count": items.len(),
                        "duration_ms": started.elapsed().as_millis() as u64,
                        "status": "success",
                    }),
                );
                Ok(items)
            }
            Err(e) => {
                prismis_observability::log(
                    "fetcher.error",
                    json!({
                        "fetcher_type": "rss",
                        "source_id": source.id,
                        "source_url": source.url,
                        "error": e.to_string(),
                        "duration_ms": started.elapsed().as_millis() as u64,
                        "status": "error",
                    }),
                );
                Err(e)
            }
        }
    }
}
