//! Content persistence: dedup-aware writes, priority queries, status
//! mutation, archival, and prune.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use libsql::params;
use tracing::debug;
use uuid::Uuid;

use prismis_core::time;
use prismis_core::{
    ArchivalWindows, ContentItem, ContentRecord, Error, FeedbackStats, Priority, Result,
};

use crate::Storage;
use crate::rows::{CONTENT_COLUMNS, content_from_row};

impl Storage {
    /// Strict insert: returns None when the external_id already exists.
    pub async fn add_content(&self, item: &ContentItem) -> Result<Option<String>> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id FROM content WHERE external_id = ?1",
                params![item.external_id.as_str()],
            )
            .await
            .map_err(Error::storage)?;
        if rows.next().await.map_err(Error::storage)?.is_some() {
            return Ok(None);
        }

        let id = Uuid::new_v4().to_string();
        self.insert_content(&id, item).await?;
        Ok(Some(id))
    }

    /// Upsert with deduplication tracking. Existing rows keep their id and
    /// only the mutable fields (content, summary, analysis, priority) are
    /// updated; returns `(id, is_new)`.
    pub async fn create_or_update_content(&self, item: &ContentItem) -> Result<(String, bool)> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id FROM content WHERE external_id = ?1",
                params![item.external_id.as_str()],
            )
            .await
            .map_err(Error::storage)?;

        if let Some(row) = rows.next().await.map_err(Error::storage)? {
            let id: String = row.get(0).map_err(Error::storage)?;
            let analysis_json = analysis_to_json(item)?;
            self.conn()
                .execute(
                    "UPDATE content
                     SET content = ?1, summary = ?2, analysis = ?3, priority = ?4,
                         updated_at = CURRENT_TIMESTAMP
                     WHERE external_id = ?5",
                    params![
                        item.content.as_str(),
                        item.summary.as_deref(),
                        analysis_json,
                        item.priority.map(|p| p.as_str()),
                        item.external_id.as_str(),
                    ],
                )
                .await
                .map_err(Error::storage)?;
            debug!(content_id = %id, "content updated");
            return Ok((id, false));
        }

        let id = Uuid::new_v4().to_string();
        self.insert_content(&id, item).await?;
        debug!(content_id = %id, "content created");
        Ok((id, true))
    }

    async fn insert_content(&self, id: &str, item: &ContentItem) -> Result<()> {
        let analysis_json = analysis_to_json(item)?;
        self.conn()
            .execute(
                "INSERT INTO content (
                     id, source_id, external_id, title, url, content,
                     summary, analysis, priority, published_at, fetched_at,
                     read, favorited, notes, created_at, updated_at
                 )
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                         CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
                params![
                    id,
                    item.source_id.as_deref(),
                    item.external_id.as_str(),
                    item.title.as_str(),
                    item.url.as_str(),
                    item.content.as_str(),
                    item.summary.as_deref(),
                    analysis_json,
                    item.priority.map(|p| p.as_str()),
                    item.published_at.map(time::to_db),
                    time::to_db(item.fetched_at),
                    item.read as i64,
                    item.favorited as i64,
                    item.notes.as_deref(),
                ],
            )
            .await
            .map_err(Error::storage)?;
        Ok(())
    }

    /// All external ids for a source, as a membership-test-friendly set.
    /// The orchestrator subtracts this from a fetch batch before any LLM
    /// work happens.
    pub async fn get_existing_external_ids(&self, source_id: &str) -> Result<HashSet<String>> {
        let mut rows = self
            .conn()
            .query(
                "SELECT external_id FROM content WHERE source_id = ?1",
                params![source_id],
            )
            .await
            .map_err(Error::storage)?;
        let mut ids = HashSet::new();
        while let Some(row) = rows.next().await.map_err(Error::storage)? {
            ids.insert(row.get::<String>(0).map_err(Error::storage)?);
        }
        Ok(ids)
    }

    pub async fn get_content_by_id(&self, content_id: &str) -> Result<Option<ContentRecord>> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content c
             LEFT JOIN sources s ON c.source_id = s.id
             WHERE c.id = ?1"
        );
        let mut rows = self
            .conn()
            .query(&sql, params![content_id])
            .await
            .map_err(Error::storage)?;
        match rows.next().await.map_err(Error::storage)? {
            Some(row) => Ok(Some(content_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Most recently fetched item for a source: the file fetcher's
    /// previous-version lookup.
    pub async fn get_latest_content_for_source(
        &self,
        source_id: &str,
    ) -> Result<Option<ContentRecord>> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content c
             LEFT JOIN sources s ON c.source_id = s.id
             WHERE c.source_id = ?1
             ORDER BY c.fetched_at DESC
             LIMIT 1"
        );
        let mut rows = self
            .conn()
            .query(&sql, params![source_id])
            .await
            .map_err(Error::storage)?;
        match rows.next().await.map_err(Error::storage)? {
            Some(row) => Ok(Some(content_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Unread items of one priority, newest first, joined to their source.
    pub async fn get_content_by_priority(
        &self,
        priority: Priority,
        limit: i64,
        include_archived: bool,
    ) -> Result<Vec<ContentRecord>> {
        let archived_clause = if include_archived {
            ""
        } else {
            " AND c.archived_at IS NULL"
        };
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content c
             JOIN sources s ON c.source_id = s.id
             WHERE c.priority = ?1 AND c.read = 0{archived_clause}
             ORDER BY c.published_at DESC
             LIMIT ?2"
        );
        self.collect_content(&sql, params![priority.as_str(), limit])
            .await
    }

    /// Prioritized items fetched since a cutoff (all of them when `since`
    /// is None), ordered high → medium → low, then newest first.
    /// Unprioritized rows are always excluded.
    pub async fn get_content_since(
        &self,
        since: Option<chrono::DateTime<Utc>>,
        include_archived: bool,
    ) -> Result<Vec<ContentRecord>> {
        let archived_clause = if include_archived {
            ""
        } else {
            " AND c.archived_at IS NULL"
        };
        let order = "ORDER BY CASE c.priority
                         WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2
                     END ASC, c.published_at DESC";

        match since {
            Some(cutoff) => {
                let sql = format!(
                    "SELECT {CONTENT_COLUMNS} FROM content c
                     JOIN sources s ON c.source_id = s.id
                     WHERE c.priority IS NOT NULL AND c.fetched_at > ?1{archived_clause}
                     {order}"
                );
                self.collect_content(&sql, params![time::to_db(cutoff)]).await
            }
            None => {
                let sql = format!(
                    "SELECT {CONTENT_COLUMNS} FROM content c
                     JOIN sources s ON c.source_id = s.id
                     WHERE c.priority IS NOT NULL{archived_clause}
                     {order}"
                );
                self.collect_content(&sql, ()).await
            }
        }
    }

    async fn collect_content(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<ContentRecord>> {
        let mut rows = self.conn().query(sql, params).await.map_err(Error::storage)?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::storage)? {
            items.push(content_from_row(&row)?);
        }
        Ok(items)
    }

    /// Update read and/or favorited. At least one field must be supplied.
    /// Favoriting always clears `archived_at` (auto-unarchive); setting
    /// read alone leaves archive state untouched.
    pub async fn update_content_status(
        &self,
        content_id: &str,
        read: Option<bool>,
        favorited: Option<bool>,
    ) -> Result<bool> {
        let changed = match (read, favorited) {
            (Some(read), Some(favorited)) => self
                .conn()
                .execute(
                    "UPDATE content
                     SET read = ?1, favorited = ?2, archived_at = NULL,
                         updated_at = CURRENT_TIMESTAMP
                     WHERE id = ?3",
                    params![read as i64, favorited as i64, content_id],
                )
                .await
                .map_err(Error::storage)?,
            (Some(read), None) => self
                .conn()
                .execute(
                    "UPDATE content SET read = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
                    params![read as i64, content_id],
                )
                .await
                .map_err(Error::storage)?,
            (None, Some(favorited)) => self
                .conn()
                .execute(
                    "UPDATE content
                     SET favorited = ?1, archived_at = NULL, updated_at = CURRENT_TIMESTAMP
                     WHERE id = ?2",
                    params![favorited as i64, content_id],
                )
                .await
                .map_err(Error::storage)?,
            (None, None) => {
                return Err(Error::Validation(
                    "at least one of read or favorited must be provided".into(),
                ));
            }
        };
        Ok(changed > 0)
    }

    /// Flag or unflag an item as interesting. Flagged items feed the
    /// learned-preference digest and are protected from prune.
    pub async fn set_flagged(&self, content_id: &str, flagged: bool) -> Result<bool> {
        let changed = self
            .conn()
            .execute(
                "UPDATE content
                 SET flagged_interesting = ?1, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?2",
                params![flagged as i64, content_id],
            )
            .await
            .map_err(Error::storage)?;
        Ok(changed > 0)
    }

    /// Priority-aware aging in a single UPDATE. Favorited items and items
    /// with notes are never archived. `high_read = None` means HIGH items
    /// age out never.
    pub async fn archive_old_content(&self, windows: &ArchivalWindows) -> Result<u64> {
        // The sentinel pushes the HIGH window beyond any plausible age.
        let high_read = windows
            .high_read
            .map(|days| format!("-{days} days"))
            .unwrap_or_else(|| "-10000 days".to_string());

        let changed = self
            .conn()
            .execute(
                "UPDATE content
                 SET archived_at = CURRENT_TIMESTAMP
                 WHERE archived_at IS NULL
                   AND favorited = 0
                   AND notes IS NULL
                   AND (
                     (priority = 'high' AND read = 1 AND fetched_at < datetime('now', ?1))
                     OR
                     (priority = 'medium' AND (
                       (read = 0 AND fetched_at < datetime('now', ?2))
                       OR (read = 1 AND fetched_at < datetime('now', ?3))
                     ))
                     OR
                     (priority = 'low' AND (
                       (read = 0 AND fetched_at < datetime('now', ?4))
                       OR (read = 1 AND fetched_at < datetime('now', ?5))
                     ))
                   )",
                params![
                    high_read,
                    format!("-{} days", windows.medium_unread),
                    format!("-{} days", windows.medium_read),
                    format!("-{} days", windows.low_unread),
                    format!("-{} days", windows.low_read),
                ],
            )
            .await
            .map_err(Error::storage)?;
        Ok(changed)
    }

    pub async fn count_archived(&self) -> Result<i64> {
        self.scalar("SELECT COUNT(*) FROM content WHERE archived_at IS NOT NULL")
            .await
    }

    pub async fn count_active(&self) -> Result<i64> {
        self.scalar("SELECT COUNT(*) FROM content WHERE archived_at IS NULL")
            .await
    }

    async fn scalar(&self, sql: &str) -> Result<i64> {
        let mut rows = self.conn().query(sql, ()).await.map_err(Error::storage)?;
        let row = rows
            .next()
            .await
            .map_err(Error::storage)?
            .ok_or_else(|| Error::Storage("count query returned no rows".into()))?;
        row.get(0).map_err(Error::storage)
    }

    /// How many items prune would delete: unprioritized, not favorited,
    /// not flagged, optionally older than `days`.
    pub async fn count_unprioritized(&self, days: Option<i64>) -> Result<i64> {
        let (sql, cutoff) = prune_filter("SELECT COUNT(*) FROM content", days);
        let mut rows = match cutoff {
            Some(cutoff) => self
                .conn()
                .query(&sql, params![cutoff])
                .await
                .map_err(Error::storage)?,
            None => self.conn().query(&sql, ()).await.map_err(Error::storage)?,
        };
        let row = rows
            .next()
            .await
            .map_err(Error::storage)?
            .ok_or_else(|| Error::Storage("count query returned no rows".into()))?;
        row.get(0).map_err(Error::storage)
    }

    /// Delete unprioritized items (never favorited or flagged ones) and
    /// purge any vectors they leave behind, in one transaction.
    pub async fn delete_unprioritized(&self, days: Option<i64>) -> Result<u64> {
        let tx = self.conn().transaction().await.map_err(Error::storage)?;

        let (sql, cutoff) = prune_filter("DELETE FROM content", days);
        let deleted = match cutoff {
            Some(cutoff) => tx.execute(&sql, params![cutoff]).await.map_err(Error::storage)?,
            None => tx.execute(&sql, ()).await.map_err(Error::storage)?,
        };

        tx.execute(
            "DELETE FROM vec_content WHERE content_id NOT IN (SELECT id FROM content)",
            (),
        )
        .await
        .map_err(Error::storage)?;
        tx.execute(
            "DELETE FROM embeddings WHERE content_id NOT IN (SELECT id FROM content)",
            (),
        )
        .await
        .map_err(Error::storage)?;

        tx.commit().await.map_err(Error::storage)?;
        Ok(deleted)
    }

    /// Roll up flagged-item feedback for the evaluator. The digest is only
    /// built when there is at least one flagged item in the window.
    pub async fn get_feedback_stats(&self, since_days: i64) -> Result<FeedbackStats> {
        let sql = format!(
            "SELECT title, analysis FROM content
             WHERE flagged_interesting = 1
               AND updated_at >= datetime('now', '-{since_days} days')
             ORDER BY updated_at DESC
             LIMIT 50"
        );
        let mut rows = self.conn().query(&sql, ()).await.map_err(Error::storage)?;

        let mut lines = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::storage)? {
            let title: String = row.get(0).map_err(Error::storage)?;
            let interests = row
                .get::<Option<String>>(1)
                .map_err(Error::storage)?
                .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
                .and_then(|analysis| {
                    analysis.get("matched_interests").map(|m| {
                        m.as_array()
                            .map(|items| {
                                items
                                    .iter()
                                    .filter_map(|v| v.as_str().map(String::from))
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            })
                            .unwrap_or_default()
                    })
                })
                .unwrap_or_default();
            if interests.is_empty() {
                lines.push(format!("- {title}"));
            } else {
                lines.push(format!("- {title} (interests: {interests})"));
            }
        }

        let total_votes = lines.len() as i64;
        let digest = (total_votes > 0).then(|| {
            format!(
                "The user recently flagged these items as interesting:\n{}",
                lines.join("\n")
            )
        });

        Ok(FeedbackStats { total_votes, digest })
    }
}

fn prune_filter(prefix: &str, days: Option<i64>) -> (String, Option<String>) {
    let base = format!(
        "{prefix}
         WHERE (priority IS NULL OR priority = '')
           AND favorited = 0
           AND flagged_interesting = 0"
    );
    match days {
        Some(days) => {
            let cutoff = time::to_db(Utc::now() - Duration::days(days));
            (format!("{base} AND published_at < ?1"), Some(cutoff))
        }
        None => (base, None),
    }
}

fn analysis_to_json(item: &ContentItem) -> Result<Option<String>> {
    match &item.analysis {
        Some(value) => serde_json::to_string(value)
            .map(Some)
            .map_err(|e| Error::Storage(format!("cannot serialize analysis: {e}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::temp_storage;
    use prismis_core::SourceKind;

    async fn seed_source(storage: &Storage) -> String {
        storage
            .add_source("https://example.com/feed", SourceKind::Feed, Some("Example"))
            .await
            .unwrap()
    }

    fn item(source_id: &str, external_id: &str, title: &str) -> ContentItem {
        ContentItem::new(source_id, external_id, title, "https://example.com/a", "body text")
    }

    #[tokio::test]
    async fn add_content_rejects_duplicates() {
        let (_dir, storage) = temp_storage().await;
        let sid = seed_source(&storage).await;

        let first = storage.add_content(&item(&sid, "ext-1", "One")).await.unwrap();
        assert!(first.is_some());
        let second = storage.add_content(&item(&sid, "ext-1", "One again")).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn upsert_preserves_original_id() {
        let (_dir, storage) = temp_storage().await;
        let sid = seed_source(&storage).await;

        let (id1, is_new1) = storage
            .create_or_update_content(&item(&sid, "ext-1", "One"))
            .await
            .unwrap();
        assert!(is_new1);

        let mut updated = item(&sid, "ext-1", "One");
        updated.summary = Some("fresh summary".into());
        updated.priority = Some(Priority::High);
        let (id2, is_new2) = storage.create_or_update_content(&updated).await.unwrap();
        assert!(!is_new2);
        assert_eq!(id1, id2);

        let record = storage.get_content_by_id(&id1).await.unwrap().unwrap();
        assert_eq!(record.summary.as_deref(), Some("fresh summary"));
        assert_eq!(record.priority, Some(Priority::High));
    }

    #[tokio::test]
    async fn existing_external_ids_is_a_set() {
        let (_dir, storage) = temp_storage().await;
        let sid = seed_source(&storage).await;
        storage.add_content(&item(&sid, "a", "A")).await.unwrap();
        storage.add_content(&item(&sid, "b", "B")).await.unwrap();

        let ids = storage.get_existing_external_ids(&sid).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("a"));
        assert!(!ids.contains("c"));
    }

    #[tokio::test]
    async fn status_update_requires_a_field() {
        let (_dir, storage) = temp_storage().await;
        let err = storage
            .update_content_status("whatever", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn favoriting_unarchives_but_read_does_not() {
        let (_dir, storage) = temp_storage().await;
        let sid = seed_source(&storage).await;
        let id = storage.add_content(&item(&sid, "x", "X")).await.unwrap().unwrap();

        storage
            .conn()
            .execute(
                "UPDATE content SET archived_at = CURRENT_TIMESTAMP WHERE id = ?1",
                params![id.as_str()],
            )
            .await
            .unwrap();

        // Read alone must not touch archive state.
        storage.update_content_status(&id, Some(true), None).await.unwrap();
        let record = storage.get_content_by_id(&id).await.unwrap().unwrap();
        assert!(record.read);
        assert!(record.archived_at.is_some());

        // Favoriting must auto-unarchive.
        storage.update_content_status(&id, None, Some(true)).await.unwrap();
        let record = storage.get_content_by_id(&id).await.unwrap().unwrap();
        assert!(record.favorited);
        assert!(record.archived_at.is_none());
    }

    #[tokio::test]
    async fn prune_spares_favorited_and_flagged() {
        let (_dir, storage) = temp_storage().await;
        let sid = seed_source(&storage).await;

        let mut ids = Vec::new();
        for n in 0..5 {
            let id = storage
                .add_content(&item(&sid, &format!("unprio-{n}"), "U"))
                .await
                .unwrap()
                .unwrap();
            ids.push(id);
        }
        storage.set_flagged(&ids[0], true).await.unwrap();
        storage.set_flagged(&ids[1], true).await.unwrap();
        storage.update_content_status(&ids[2], None, Some(true)).await.unwrap();

        assert_eq!(storage.count_unprioritized(None).await.unwrap(), 2);
        assert_eq!(storage.delete_unprioritized(None).await.unwrap(), 2);

        for id in &ids[..3] {
            assert!(storage.get_content_by_id(id).await.unwrap().is_some());
        }
        for id in &ids[3..] {
            assert!(storage.get_content_by_id(id).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn archival_honors_priority_windows() {
        let (_dir, storage) = temp_storage().await;
        let sid = seed_source(&storage).await;

        // (external_id, priority, read, age_days, favorited)
        let fixtures = [
            ("high-read-old", Some(Priority::High), true, 45, false),
            ("medium-unread-old", Some(Priority::Medium), false, 20, false),
            ("low-read-old", Some(Priority::Low), true, 5, false),
            ("favorite-old", Some(Priority::Low), true, 60, true),
            ("high-unread-old", Some(Priority::High), false, 60, false),
        ];
        for (ext, priority, read, age, favorited) in fixtures {
            let mut it = item(&sid, ext, ext);
            it.priority = priority;
            it.read = read;
            it.favorited = favorited;
            it.fetched_at = Utc::now() - Duration::days(age);
            storage.add_content(&it).await.unwrap();
        }

        let windows = ArchivalWindows {
            high_read: Some(30),
            medium_unread: 14,
            medium_read: 14,
            low_unread: 7,
            low_read: 3,
        };
        let archived = storage.archive_old_content(&windows).await.unwrap();
        assert_eq!(archived, 3);
        assert_eq!(storage.count_archived().await.unwrap(), 3);

        // Favorite and unread HIGH survive.
        let survivors = storage.count_active().await.unwrap();
        assert_eq!(survivors, 2);
    }

    #[tokio::test]
    async fn high_read_none_never_archives_high() {
        let (_dir, storage) = temp_storage().await;
        let sid = seed_source(&storage).await;

        let mut it = item(&sid, "ancient-high", "Ancient");
        it.priority = Some(Priority::High);
        it.read = true;
        it.fetched_at = Utc::now() - Duration::days(900);
        storage.add_content(&it).await.unwrap();

        let windows = ArchivalWindows {
            high_read: None,
            ..Default::default()
        };
        assert_eq!(storage.archive_old_content(&windows).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn archival_skips_items_with_notes() {
        let (_dir, storage) = temp_storage().await;
        let sid = seed_source(&storage).await;

        let mut it = item(&sid, "noted", "Noted");
        it.priority = Some(Priority::Low);
        it.read = true;
        it.notes = Some("keep this around".into());
        it.fetched_at = Utc::now() - Duration::days(90);
        storage.add_content(&it).await.unwrap();

        assert_eq!(
            storage
                .archive_old_content(&ArchivalWindows::default())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn content_since_excludes_unprioritized_and_orders_by_priority() {
        let (_dir, storage) = temp_storage().await;
        let sid = seed_source(&storage).await;

        for (ext, priority) in [
            ("m", Some(Priority::Medium)),
            ("h", Some(Priority::High)),
            ("l", Some(Priority::Low)),
            ("none", None),
        ] {
            let mut it = item(&sid, ext, ext);
            it.priority = priority;
            storage.add_content(&it).await.unwrap();
        }

        let items = storage.get_content_since(None, false).await.unwrap();
        let priorities: Vec<_> = items.iter().map(|i| i.priority).collect();
        assert_eq!(
            priorities,
            vec![
                Some(Priority::High),
                Some(Priority::Medium),
                Some(Priority::Low)
            ]
        );
    }

    #[tokio::test]
    async fn by_priority_returns_unread_only() {
        let (_dir, storage) = temp_storage().await;
        let sid = seed_source(&storage).await;

        let mut unread = item(&sid, "u", "Unread");
        unread.priority = Some(Priority::High);
        storage.add_content(&unread).await.unwrap();

        let mut read = item(&sid, "r", "Read");
        read.priority = Some(Priority::High);
        read.read = true;
        storage.add_content(&read).await.unwrap();

        let items = storage
            .get_content_by_priority(Priority::High, 50, false)
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].external_id, "u");
        assert_eq!(items[0].source_name.as_deref(), Some("Example"));
    }

    #[tokio::test]
    async fn feedback_stats_count_flagged_items() {
        let (_dir, storage) = temp_storage().await;
        let sid = seed_source(&storage).await;

        for n in 0..6 {
            let mut it = item(&sid, &format!("f-{n}"), &format!("Flagged {n}"));
            it.analysis = Some(serde_json::json!({"matched_interests": ["rust"]}));
            let id = storage.add_content(&it).await.unwrap().unwrap();
            storage.set_flagged(&id, true).await.unwrap();
        }

        let stats = storage.get_feedback_stats(30).await.unwrap();
        assert_eq!(stats.total_votes, 6);
        let digest = stats.digest.unwrap();
        assert!(digest.contains("Flagged 0"));
        assert!(digest.contains("rust"));
    }
}
