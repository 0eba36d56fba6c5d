//! Source URL normalization and naming.
//!
//! Clients may submit short-form URLs (`reddit://rust`, `youtube://@handle`,
//! `rss://example.com/feed`); these expand to canonical HTTPS URLs before
//! validation and storage.

use sha2::{Digest, Sha256};

use crate::model::SourceKind;

/// Expand short-form source URLs to the canonical form stored in the
/// database. Already-normalized URLs pass through unchanged.
pub fn normalize_source_url(url: &str, kind: SourceKind) -> String {
    let url = url.trim();

    match kind {
        SourceKind::Forum => {
            if let Some(rest) = url.strip_prefix("reddit://") {
                let subreddit = rest.trim_matches('/');
                return format!("https://www.reddit.com/r/{subreddit}");
            }
        }
        SourceKind::Video => {
            if let Some(rest) = url.strip_prefix("youtube://") {
                let channel = rest.trim_matches('/');
                if channel.starts_with('@') {
                    return format!("https://www.youtube.com/{channel}");
                }
                if channel.starts_with("UC") {
                    return format!("https://www.youtube.com/channel/{channel}");
                }
                return format!("https://www.youtube.com/@{channel}");
            }
        }
        SourceKind::Feed => {
            if let Some(rest) = url.strip_prefix("rss://") {
                let feed_url = rest.trim_start_matches('/');
                if feed_url.starts_with("http://") || feed_url.starts_with("https://") {
                    return feed_url.to_string();
                }
                return format!("https://{feed_url}");
            }
        }
        SourceKind::File => {}
    }

    url.to_string()
}

/// Derive a human-readable name from an already-normalized URL, used when
/// the client did not supply one.
pub fn extract_name_from_url(url: &str, kind: SourceKind) -> String {
    if kind == SourceKind::Forum {
        if let Some(sub) = segment_after(url, "/r/") {
            return format!("r/{sub}");
        }
    }

    if kind == SourceKind::Video {
        if let Some(at) = url.find('@') {
            let handle: String = url[at + 1..]
                .chars()
                .take_while(|c| *c != '/' && *c != '?')
                .collect();
            if !handle.is_empty() {
                return format!("@{handle}");
            }
        }
        if let Some(channel_id) = segment_after(url, "/channel/") {
            let mut id = channel_id;
            id.truncate(20);
            return id;
        }
    }

    // Generic fallback: the registrable part of the host.
    let stripped = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.");
    let domain = stripped
        .split(['/', '?'])
        .next()
        .unwrap_or(stripped);
    match domain.split('.').next() {
        Some(first) if domain.contains('.') => {
            let mut chars = first.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect(),
                None => domain.to_string(),
            }
        }
        _ => domain.to_string(),
    }
}

fn segment_after(url: &str, marker: &str) -> Option<String> {
    let start = url.find(marker)? + marker.len();
    let segment: String = url[start..]
        .chars()
        .take_while(|c| *c != '/' && *c != '?')
        .collect();
    (!segment.is_empty()).then_some(segment)
}

/// 16-hex-character SHA-256 prefix, the external-id fallback shared by the
/// feed and file fetchers.
pub fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
