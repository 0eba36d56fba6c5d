//! File-source fetcher: change monitoring for static text/markdown URLs.
//!
//! Each fetch hashes the current body and compares against the previous
//! stored version. First fetch stores the full body; later fetches store
//! one item per change whose content is a unified diff. File sources are
//! always HIGH priority: the user subscribed specifically to track them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use similar::{ChangeTag, TextDiff};
use tracing::{debug, info, warn};

use prismis_core::{ContentItem, Priority, Result, Source, short_hash};
use prismis_storage::Storage;

use crate::ContentFetcher;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct FileFetcher {
    storage: Arc<Storage>,
    client: reqwest::Client,
}

impl FileFetcher {
    pub fn new(storage: Arc<Storage>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("prismis/0.1 (content aggregator)")
            .build()
            .map_err(|e| prismis_core::Error::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { storage, client })
    }

    async fn fetch_inner(&self, source: &Source) -> Result<Vec<ContentItem>> {
        let response = match self.client.get(&source.url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %source.url, error = %e, "file fetch failed");
                return Ok(Vec::new());
            }
        };
        if let Err(e) = response.error_for_status_ref() {
            warn!(url = %source.url, error = %e, "file fetch returned error status");
            return Ok(Vec::new());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.contains("text") && !content_type.contains("markdown") {
            warn!(url = %source.url, content_type, "skipping non-text file");
            return Ok(Vec::new());
        }

        let current = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %source.url, error = %e, "file body unreadable");
                return Ok(Vec::new());
            }
        };
        let current_hash = hex_sha256(&current);

        let previous = self.storage.get_latest_content_for_source(&source.id).await?;

        let Some(previous) = previous else {
            info!(url = %source.url, bytes = current.len(), "first fetch, storing baseline");
            return Ok(vec![baseline_item(source, &current, &current_hash)]);
        };

        let previous_hash = previous
            .analysis
            .as_ref()
            .and_then(|a| a.get("content_hash"))
            .and_then(Value::as_str);
        if previous_hash == Some(current_hash.as_str()) {
            debug!(url = %source.url, "no changes detected");
            return Ok(Vec::new());
        }

        // Diff against the stored full text; older baselines kept the body
        // in `content` directly.
        let previous_text = previous
            .analysis
            .as_ref()
            .and_then(|a| a.get("full_text"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(previous.content);

        let diff_text = unified_diff(&previous_text, &current, &source.url);
        let stats = diff_stats(&previous_text, &current);
        info!(
            url = %source.url,
            added = stats.0,
            removed = stats.1,
            "change detected"
        );

        Ok(vec![diff_item(source, &current, &current_hash, diff_text, stats)])
    }
}

fn baseline_item(source: &Source, body: &str, hash: &str) -> ContentItem {
    let now = Utc::now();
    let mut item = ContentItem::new(
        source.id.clone(),
        short_hash(&format!("{}{}", source.url, hash)),
        format!("{} Updated", source.label()),
        source.url.clone(),
        body.to_string(),
    );
    item.published_at = Some(now);
    item.fetched_at = now;
    item.priority = Some(Priority::High);
    item.analysis = Some(json!({
        "content_hash": hash,
        "full_text": body,
        "first_fetch": true,
    }));
    item
}

fn diff_item(
    source: &Source,
    body: &str,
    hash: &str,
    diff_text: String,
    (added, removed): (usize, usize),
) -> ContentItem {
    let now = Utc::now();
    let mut item = ContentItem::new(
        source.id.clone(),
        short_hash(&format!("{}{}", source.url, hash)),
        format!("{} Updated", source.label()),
        source.url.clone(),
        diff_text,
    );
    item.published_at = Some(now);
    item.fetched_at = now;
    item.priority = Some(Priority::High);
    item.analysis = Some(json!({
        "content_hash": hash,
        "full_text": body,
        "diff_stats": {
            "added_lines": added,
            "removed_lines": removed,
            "changed_lines": added + removed,
        },
        "first_fetch": false,
    }));
    item
}

fn hex_sha256(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn unified_diff(previous: &str, current: &str, url: &str) -> String {
    TextDiff::from_lines(previous, current)
        .unified_diff()
        .context_radius(3)
        .header(&format!("{url} (previous)"), &format!("{url} (current)"))
        .to_string()
}

fn diff_stats(previous: &str, current: &str) -> (usize, usize) {
    let diff = TextDiff::from_lines(previous, current);
    let mut added = 0;
    let mut removed = 0;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => added += 1,
            ChangeTag::Delete => removed += 1,
            ChangeTag::Equal => {}
        }
    }
    (added, removed)
}

#[async_trait]
impl ContentFetcher for FileFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<ContentItem>> {
        let started = Instant::now();
        match self.fetch_inner(source).await {
            Ok(items) => {
                prismis_observability::log(
                    "fetcher.complete",
                    json!({
                        "fetcher_type": "file",
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
                        "fetcher_type": "file",
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
