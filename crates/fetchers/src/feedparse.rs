//! RSS/Atom parsing over the syndication crates.
//!
//! A document is tried as RSS first (the common case), then as Atom; both
//! dialects normalize into one [`FeedEntry`] shape. Documents neither
//! parser accepts yield an empty list and the caller decides whether the
//! shape still looks like a feed.

use std::str::FromStr;

use atom_syndication::Feed;
use chrono::{DateTime, Utc};
use rss::Channel;

#[derive(Debug, Clone, Default)]
pub struct FeedEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
}

impl FeedEntry {
    /// Fallback body, in preference order: content, summary, description.
    pub fn body_fallback(&self) -> Option<&str> {
        self.content
            .as_deref()
            .or(self.summary.as_deref())
            .or(self.description.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

/// True when the document even looks like a feed; used by the validator
/// to tolerate parse warts as long as the shape is right.
pub fn looks_like_feed(document: &str) -> bool {
    let head: String = document.chars().take(2048).collect::<String>().to_ascii_lowercase();
    head.contains("<rss") || head.contains("<feed") || head.contains("<rdf")
}

/// Parse a feed document into entries, document order preserved.
pub fn parse_feed(document: &str) -> Vec<FeedEntry> {
    if let Ok(channel) = Channel::from_str(document) {
        return channel.items.iter().map(rss_entry).collect();
    }
    if let Ok(feed) = Feed::from_str(document) {
        return feed.entries.iter().map(atom_entry).collect();
    }
    Vec::new()
}

fn rss_entry(item: &rss::Item) -> FeedEntry {
    FeedEntry {
        id: item.guid.as_ref().map(|guid| guid.value.clone()),
        title: item.title.clone(),
        link: item.link.as_deref().map(|link| link.trim().to_string()),
        published: item.pub_date.as_deref().and_then(parse_date),
        content: item.content.clone(),
        summary: None,
        description: item.description.clone(),
    }
}

fn atom_entry(entry: &atom_syndication::Entry) -> FeedEntry {
    FeedEntry {
        id: Some(entry.id.clone()),
        title: Some(entry.title.value.clone()),
        link: extract_link(entry),
        published: entry
            .published
            .map(|published| published.with_timezone(&Utc))
            .or_else(|| Some(entry.updated.with_timezone(&Utc))),
        content: entry.content.as_ref().and_then(|content| content.value.clone()),
        summary: entry.summary.as_ref().map(|text| text.value.clone()),
        description: None,
    }
}

/// Best URL for an Atom entry: a rel="alternate" link (the default rel)
/// first, then whatever link comes first.
fn extract_link(entry: &atom_syndication::Entry) -> Option<String> {
    entry
        .links
        .iter()
        .find(|link| link.rel == "alternate")
        .or_else(|| entry.links.first())
        .map(|link| link.href.trim().to_string())
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Date-only forms show up in the wild.
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Example Blog</title>
    <link>https://example.com</link>
    <description>A blog</description>
    <item>
      <title>First Post</title>
      <link>https://example.com/first</link>
      <guid>post-1</guid>
      <pubDate>Mon, 02 Mar 2026 10:00:00 GMT</pubDate>
      <description><![CDATA[<p>Hello &amp; welcome</p>]]></description>
      <content:encoded><![CDATA[The full article body]]></content:encoded>
    </item>
    <item>
      <title>Second Post</title>
      <link>https://example.com/second</link>
      <description>Short one</description>
    </item>
  </channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Feed</title>
  <id>urn:feed</id>
  <updated>2026-03-02T10:00:00Z</updated>
  <entry>
    <id>urn:entry:1</id>
    <title>Atom Entry</title>
    <link rel="self" href="https://example.com/atom-1.xml"/>
    <link rel="alternate" href="https://example.com/atom-1"/>
    <published>2026-03-02T10:00:00Z</published>
    <updated>2026-03-02T11:00:00Z</updated>
    <summary>A summary</summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_items() {
        let entries = parse_feed(RSS_SAMPLE);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id.as_deref(), Some("post-1"));
        assert_eq!(entries[0].link.as_deref(), Some("https://example.com/first"));
        assert_eq!(entries[0].title.as_deref(), Some("First Post"));
        assert!(entries[0].published.is_some());
        // CDATA is literal text; entities inside it stay encoded.
        assert_eq!(
            entries[0].description.as_deref(),
            Some("<p>Hello &amp; welcome</p>")
        );
        assert_eq!(entries[0].content.as_deref(), Some("The full article body"));
        // No pubDate on the second item.
        assert!(entries[1].published.is_none());
    }

    #[test]
    fn parses_atom_entries_preferring_alternate_links() {
        let entries = parse_feed(ATOM_SAMPLE);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id.as_deref(), Some("urn:entry:1"));
        assert_eq!(entries[0].link.as_deref(), Some("https://example.com/atom-1"));
        assert_eq!(entries[0].title.as_deref(), Some("Atom Entry"));
        assert!(entries[0].published.is_some());
        assert_eq!(entries[0].summary.as_deref(), Some("A summary"));
    }

    #[test]
    fn atom_published_falls_back_to_updated() {
        let without_published = ATOM_SAMPLE.replace(
            "<published>2026-03-02T10:00:00Z</published>\n    ",
            "",
        );
        let entries = parse_feed(&without_published);
        assert_eq!(entries.len(), 1);
        let published = entries[0].published.unwrap();
        assert_eq!(published.to_rfc3339(), "2026-03-02T11:00:00+00:00");
    }

    #[test]
    fn non_feed_documents_yield_no_entries() {
        assert!(parse_feed("this is not xml at all").is_empty());
        assert!(parse_feed("<html><body>a page</body></html>").is_empty());
    }

    #[test]
    fn body_fallback_prefers_content_then_summary_then_description() {
        let mut entry = FeedEntry {
            content: Some("full".into()),
            summary: Some("sum".into()),
            description: Some("desc".into()),
            ..Default::default()
        };
        assert_eq!(entry.body_fallback(), Some("full"));
        entry.content = None;
        assert_eq!(entry.body_fallback(), Some("sum"));
        entry.summary = None;
        assert_eq!(entry.body_fallback(), Some("desc"));
        entry.description = Some("   ".into());
        assert_eq!(entry.body_fallback(), None);
    }

    #[test]
    fn feed_shape_detection() {
        assert!(looks_like_feed(RSS_SAMPLE));
        assert!(looks_like_feed(ATOM_SAMPLE));
        assert!(!looks_like_feed("<html><body>a page</body></html>"));
    }
}
