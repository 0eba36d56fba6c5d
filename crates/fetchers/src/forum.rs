//! Forum (subreddit) fetcher over reddit's JSON API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, warn};

use prismis_config::Config;
use prismis_core::{ContentItem, Error, Result, Source, SourceKind};

use crate::ContentFetcher;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Hosts whose submissions are image/video-only and carry no readable text.
const MEDIA_DOMAINS: &[&str] = &[
    "i.redd.it",
    "i.imgur.com",
    "imgur.com",
    "gfycat.com",
    "v.redd.it",
    "youtube.com",
    "youtu.be",
    "streamable.com",
];

const MEDIA_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".mp4", ".webm"];

pub struct ForumFetcher {
    max_items: usize,
    max_days_lookback: i64,
    /// 0 means unlimited.
    max_comments: usize,
    client: reqwest::Client,
}

impl ForumFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(config.reddit.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            max_items: config.max_items(SourceKind::Forum) as usize,
            max_days_lookback: config.daemon.max_days_lookback as i64,
            max_comments: config.daemon.reddit_max_comments as usize,
            client,
        })
    }

    async fn fetch_inner(&self, source: &Source) -> Result<Vec<ContentItem>> {
        let subreddit = parse_subreddit_name(&source.url).ok_or_else(|| {
            Error::fetch(format!("could not parse subreddit from URL: {}", source.url))
        })?;

        // Over-fetch so date/media filtering still leaves a full batch.
        let listing_url = format!(
            "https://www.reddit.com/r/{subreddit}/hot.json?limit={}",
            self.max_items + 50
        );
        let listing: Value = self
            .client
            .get(&listing_url)
            .send()
            .await
            .map_err(|e| Error::fetch(format!("r/{subreddit} request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::fetch(format!("r/{subreddit} returned error: {e}")))?
            .json()
            .await
            .map_err(|e| Error::fetch(format!("r/{subreddit} returned invalid JSON: {e}")))?;

        let posts = listing["data"]["children"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        let cutoff = Utc::now() - chrono::Duration::days(self.max_days_lookback);

        let mut items = Vec::new();
        for post in posts {
            let data = &post["data"];

            if data["stickied"].as_bool().unwrap_or(false) {
                continue;
            }
            if is_media_post(data) {
                debug!(title = ?data["title"].as_str(), "skipping image/video post");
                continue;
            }

            let published = data["created_utc"]
                .as_f64()
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts as i64, 0));
            if let Some(published) = published {
                if published < cutoff {
                    continue;
                }
            }

            let comments = self.fetch_comments(data).await;
            items.push(self.to_content_item(data, &source.id, published, &comments));

            if items.len() >= self.max_items {
                break;
            }
        }

        Ok(items)
    }

    /// Top-level, non-deleted comments, bounded by `max_comments`.
    async fn fetch_comments(&self, post: &Value) -> Vec<(String, String)> {
        let Some(permalink) = post["permalink"].as_str() else {
            return Vec::new();
        };
        let url = format!("https://www.reddit.com{permalink}.json");

        let thread: Value = match self.client.get(&url).send().await {
            Ok(response) => match response.json().await {
                Ok(json) => json,
                Err(e) => {
                    warn!(%permalink, error = %e, "comment thread unreadable");
                    return Vec::new();
                }
            },
            Err(e) => {
                warn!(%permalink, error = %e, "comment fetch failed");
                return Vec::new();
            }
        };

        let mut comments = Vec::new();
        let children = thread
            .get(1)
            .and_then(|listing| listing["data"]["children"].as_array())
            .cloned()
            .unwrap_or_default();

        for child in children {
            if child["kind"].as_str() != Some("t1") {
                continue;
            }
            let data = &child["data"];
            let body = data["body"].as_str().unwrap_or("");
            if body.is_empty() || body == "[deleted]" || body == "[removed]" {
                continue;
            }
            let author = data["author"].as_str().unwrap_or("[deleted]").to_string();
            comments.push((author, body.to_string()));

            if self.max_comments != 0 && comments.len() >= self.max_comments {
                break;
            }
        }
        comments
    }

    fn to_content_item(
        &self,
        data: &Value,
        source_id: &str,
        published: Option<DateTime<Utc>>,
        comments: &[(String, String)],
    ) -> ContentItem {
        let permalink = data["permalink"].as_str().unwrap_or("");
        let canonical = format!("https://reddit.com{permalink}");
        let title = data["title"].as_str().unwrap_or("Untitled").to_string();
        let is_self = data["is_self"].as_bool().unwrap_or(false);
        let selftext = data["selftext"].as_str().unwrap_or("");
        let link_url = data["url"].as_str().unwrap_or("");

        let mut content = if is_self && !selftext.is_empty() {
            selftext.to_string()
        } else {
            let mut text = format!("Link: {link_url}\n\n");
            if !selftext.is_empty() {
                text.push_str(selftext);
            }
            text
        };
        if content.trim().is_empty()
            || content.trim() == "[deleted]"
            || content.trim() == "[removed]"
        {
            content = format!("Link post to: {link_url}");
        }

        if !comments.is_empty() {
            let formatted: Vec<String> = comments
                .iter()
                .map(|(author, body)| format!("**u/{author}:**\n> {body}"))
                .collect();
            content.push_str("\n\n## Discussion\n\n");
            content.push_str(&formatted.join("\n\n"));
        }

        let metrics = json!({
            "score": data["score"].as_i64().unwrap_or(0),
            "upvote_ratio": data["upvote_ratio"].as_f64().unwrap_or(0.0),
            "num_comments": data["num_comments"].as_i64().unwrap_or(0),
            "subreddit": data["subreddit"].as_str(),
            "author": data["author"].as_str().unwrap_or("[deleted]"),
        });

        let mut item = ContentItem::new(source_id, canonical.clone(), title, canonical, content);
        item.published_at = published;
        item.fetched_at = Utc::now();
        item.analysis = Some(json!({"metrics": metrics}));
        item
    }
}

/// Accepts `https://reddit.com/r/name`, `reddit.com/r/name`, `/r/name`,
/// and bare names.
fn parse_subreddit_name(url: &str) -> Option<String> {
    let stripped = url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .trim_start_matches("old.");

    if let Some(pos) = stripped.find("/r/") {
        let name: String = stripped[pos + 3..]
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        return (!name.is_empty()).then_some(name);
    }
    if let Some(rest) = stripped.strip_prefix("r/") {
        let name: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        return (!name.is_empty()).then_some(name);
    }
    if !stripped.is_empty()
        && stripped
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_')
    {
        return Some(stripped.to_string());
    }
    None
}

fn is_media_post(data: &Value) -> bool {
    if data["is_self"].as_bool().unwrap_or(false) {
        return false;
    }
    let url = data["url"].as_str().unwrap_or("").to_lowercase();
    MEDIA_DOMAINS.iter().any(|domain| url.contains(domain))
        || MEDIA_EXTENSIONS.iter().any(|ext| url.ends_with(ext))
}

#[async_trait]
impl ContentFetcher for ForumFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<ContentItem>> {
        let started = Instant::now();
        match self.fetch_inner(source).await {
            Ok(items) => {
                prismis_observability::log(
                    "fetcher.complete",
                    json!({
                        "fetcher_type": "reddit",
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
                        "fetcher_type": "reddit",
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
