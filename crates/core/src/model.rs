use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of a content source.
///
/// Serialized with the storage/wire labels (`rss`, `reddit`, `youtube`,
/// `file`) so the database schema and the CLI contract stay compatible
/// with existing clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "rss")]
    Feed,
    #[serde(rename = "reddit")]
    Forum,
    #[serde(rename = "youtube")]
    Video,
    #[serde(rename = "file")]
    File,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Feed => "rss",
            SourceKind::Forum => "reddit",
            SourceKind::Video => "youtube",
            SourceKind::File => "file",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "rss" => Some(SourceKind::Feed),
            "reddit" => Some(SourceKind::Forum),
            "youtube" => Some(SourceKind::Video),
            "file" => Some(SourceKind::File),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content priority assigned by the evaluator. `None` anywhere a priority
/// is expected means "unprioritized" (eligible for prune).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }

    /// Ranking weight used by semantic search. Similarity dominates; this
    /// only breaks ties.
    pub fn weight(priority: Option<Priority>) -> f64 {
        match priority {
            Some(Priority::High) => 1.0,
            Some(Priority::Medium) => 0.5,
            Some(Priority::Low) | None => 0.0,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content source row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub name: Option<String>,
    pub active: bool,
    pub error_count: i64,
    pub last_error: Option<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Source {
    /// Display label: the human name when set, the URL otherwise.
    pub fn label(&self) -> &str {
        self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or(&self.url)
    }
}

/// A normalized item produced by a fetcher, before it has a database id.
///
/// Fetchers never touch the database; the orchestrator decides what to
/// store. Fetcher-captured metrics live under `analysis["metrics"]` and
/// must survive every later analysis merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub source_id: Option<String>,
    pub external_id: String,
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub analysis: Option<Value>,
    #[serde(default)]
    pub priority: Option<Priority>,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub favorited: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ContentItem {
    pub fn new(
        source_id: impl Into<String>,
        external_id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source_id: Some(source_id.into()),
            external_id: external_id.into(),
            title: title.into(),
            url: url.into(),
            content: content.into(),
            summary: None,
            analysis: None,
            priority: None,
            published_at: None,
            fetched_at: Utc::now(),
            read: false,
            favorited: false,
            notes: None,
        }
    }

    /// The fetcher-captured metrics object, if any.
    pub fn metrics(&self) -> Option<&Value> {
        self.analysis.as_ref().and_then(|a| a.get("metrics"))
    }
}

/// A full content row as read back from storage, including the joined
/// source name/kind and (for search results) the relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    pub source_id: Option<String>,
    pub external_id: String,
    pub title: String,
    pub url: String,
    pub content: String,
    pub summary: Option<String>,
    pub analysis: Option<Value>,
    pub priority: Option<Priority>,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub read: bool,
    pub favorited: bool,
    pub flagged_interesting: bool,
    pub notes: Option<String>,
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(rename = "source_type", skip_serializing_if = "Option::is_none")]
    pub source_kind: Option<SourceKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

/// Priority-aware archival windows, in days. `high_read = None` means HIGH
/// items are never archived.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ArchivalWindows {
    pub high_read: Option<i64>,
    pub medium_unread: i64,
    pub medium_read: i64,
    pub low_unread: i64,
    pub low_read: i64,
}

impl Default for ArchivalWindows {
    fn default() -> Self {
        Self {
            high_read: Some(30),
            medium_unread: 14,
            medium_read: 14,
            low_unread: 7,
            low_read: 3,
        }
    }
}

/// Flagged-item feedback rolled up for the evaluator.
#[derive(Debug, Clone, Default)]
pub struct FeedbackStats {
    pub total_votes: i64,
    /// Text digest of recently flagged titles/interests, handed to the
    /// evaluator as extra context once `total_votes` passes the threshold.
    pub digest: Option<String>,
}

/// Aggregated counters for one orchestrator tick.
#[derive(Debug, Default, Clone)]
pub struct TickStats {
    pub items_fetched: usize,
    pub items_processed: usize,
    pub items_new: usize,
    pub items_updated: usize,
    pub errors: Vec<String>,
    pub new_high_priority: Vec<ContentRecord>,
}

impl TickStats {
    pub fn absorb(&mut self, other: TickStats) {
        self.items_fetched += other.items_fetched;
        self.items_processed += other.items_processed;
        self.items_new += other.items_new;
        self.items_updated += other.items_updated;
        self.errors.extend(other.errors);
        self.new_high_priority.extend(other.new_high_priority);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_labels_round_trip() {
        for kind in [
            SourceKind::Feed,
            SourceKind::Forum,
            SourceKind::Video,
            SourceKind::File,
        ] {
            assert_eq!(SourceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SourceKind::parse("podcast"), None);
    }

    #[test]
    fn source_kind_serde_uses_wire_labels() {
        let json = serde_json::to_string(&SourceKind::Forum).unwrap();
        assert_eq!(json, "\"reddit\"");
        let back: SourceKind = serde_json::from_str("\"youtube\"").unwrap();
        assert_eq!(back, SourceKind::Video);
    }

    #[test]
    fn priority_weight_breaks_ties_only() {
        assert_eq!(Priority::weight(Some(Priority::High)), 1.0);
        assert_eq!(Priority::weight(Some(Priority::Medium)), 0.5);
        assert_eq!(Priority::weight(Some(Priority::Low)), 0.0);
        assert_eq!(Priority::weight(None), 0.0);
    }

    #[test]
    fn content_item_metrics_accessor() {
        let mut item = ContentItem::new("s1", "e1", "t", "http://x", "body");
        assert!(item.metrics().is_none());
        item.analysis = Some(serde_json::json!({"metrics": {"score": 42}}));
        assert_eq!(item.metrics().unwrap()["score"], 42);
    }

    #[test]
    fn tick_stats_absorb_accumulates() {
        let mut total = TickStats::default();
        total.absorb(TickStats {
            items_fetched: 3,
            items_new: 2,
            errors: vec!["boom".into()],
            ..Default::default()
        });
        total.absorb(TickStats {
            items_fetched: 1,
            ..Default::default()
        });
        assert_eq!(total.items_fetched, 4);
        assert_eq!(total.items_new, 2);
        assert_eq!(total.errors.len(), 1);
    }
}
