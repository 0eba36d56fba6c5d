//! Pre-insert source validation: kind-specific reachability checks with a
//! hard 5 second timeout.

use std::time::Duration;

use serde_json::Value;
use url::Url;

use prismis_core::{Error, Result, SourceKind};

use crate::feedparse::{looks_like_feed, parse_feed};

const VALIDATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Source-specific metadata discovered during validation (currently just
/// the properly-capitalized forum display name).
#[derive(Debug, Clone, Default)]
pub struct ValidationMetadata {
    pub display_name: Option<String>,
}

pub struct SourceValidator {
    client: reqwest::Client,
}

impl SourceValidator {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(VALIDATION_TIMEOUT)
            .user_agent("prismis/0.1 (content aggregator)")
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Validate a normalized URL for its kind. Err is always
    /// [`Error::Validation`] with an actionable message.
    pub async fn validate(&self, url: &str, kind: SourceKind) -> Result<ValidationMetadata> {
        match kind {
            SourceKind::Feed => self.validate_feed(url).await,
            SourceKind::Forum => self.validate_forum(url).await,
            SourceKind::Video => validate_video(url),
            SourceKind::File => validate_file(url),
        }
    }

    async fn validate_feed(&self, url: &str) -> Result<ValidationMetadata> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Validation(validation_network_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Validation(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("request failed")
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Validation(format!("feed body unreadable: {e}")))?;

        // Parse warts are tolerated as long as the document is feed-shaped
        // or yields entries; an empty feed may populate later.
        let entries = parse_feed(&body);
        if entries.is_empty() && !looks_like_feed(&body) {
            return Err(Error::Validation(
                "URL does not look like an RSS/Atom feed".into(),
            ));
        }
        Ok(ValidationMetadata::default())
    }

    async fn validate_forum(&self, url: &str) -> Result<ValidationMetadata> {
        let subreddit = extract_subreddit(url)
            .ok_or_else(|| Error::Validation("could not extract subreddit name from URL".into()))?;

        let check_url = format!("https://www.reddit.com/r/{subreddit}/about.json");
        let response = self
            .client
            .get(&check_url)
            .send()
            .await
            .map_err(|e| Error::Validation(validation_network_error(&e)))?;

        match response.status().as_u16() {
            404 => {
                return Err(Error::Validation(format!(
                    "subreddit r/{subreddit} does not exist"
                )));
            }
            403 => {
                return Err(Error::Validation(format!(
                    "subreddit r/{subreddit} is private"
                )));
            }
            429 => {
                return Err(Error::Validation(
                    "rate limit exceeded - try again later".into(),
                ));
            }
            200 => {}
            status => {
                return Err(Error::Validation(format!(
                    "HTTP {status}: could not verify subreddit"
                )));
            }
        }

        let body: Value = response
            .json()
            .await
            .map_err(|_| Error::Validation("could not parse forum API response".into()))?;

        let is_subreddit = body["kind"].as_str() == Some("t5")
            || body["data"]["subreddit_type"].as_str().is_some();
        if !is_subreddit {
            return Err(Error::Validation("invalid subreddit response format".into()));
        }

        Ok(ValidationMetadata {
            display_name: body["data"]["display_name_prefixed"]
                .as_str()
                .map(str::to_string),
        })
    }
}

/// Channel/user/handle URL shapes only: watch and playlist URLs are the
/// wrong granularity. Checked offline to avoid API quota.
fn validate_video(url: &str) -> Result<ValidationMetadata> {
    let parsed = Url::parse(url).map_err(|e| Error::Validation(format!("invalid URL: {e}")))?;

    let host = parsed.host_str().unwrap_or("");
    if !matches!(host, "youtube.com" | "www.youtube.com" | "m.youtube.com") {
        return Err(Error::Validation(format!("not a YouTube URL: {host}")));
    }

    let path = parsed.path();
    if path.starts_with("/watch") || path.starts_with("/playlist") {
        return Err(Error::Validation(
            "video and playlist URLs are not supported - provide a channel URL".into(),
        ));
    }

    let valid = path.starts_with("/c/")
        || path.starts_with("/channel/")
        || path.starts_with("/@")
        || path.starts_with("/user/");
    if !valid {
        return Err(Error::Validation("invalid YouTube channel URL format".into()));
    }
    Ok(ValidationMetadata::default())
}

fn validate_file(url: &str) -> Result<ValidationMetadata> {
    if !url.ends_with(".md") && !url.ends_with(".txt") {
        return Err(Error::Validation("file URL must end with .md or .txt".into()));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(Error::Validation(
            "file URL must start with http:// or https://".into(),
        ));
    }
    Ok(ValidationMetadata::default())
}

fn extract_subreddit(url: &str) -> Option<String> {
    if let Some(pos) = url.find("/r/") {
        let name: String = url[pos + 3..]
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        return (!name.is_empty()).then_some(name);
    }
    if !url.contains('/') && !url.contains('.') && !url.is_empty() {
        return Some(url.to_string());
    }
    None
}

fn validation_network_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out after 5 seconds".to_string()
    } else {
        format!("network error: {err}")
    }
}
