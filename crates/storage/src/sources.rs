//! Source CRUD and fetch-status accounting.

use libsql::params;
use tracing::debug;
use uuid::Uuid;

use prismis_core::{Error, Result, Source, SourceKind};

use crate::Storage;
use crate::rows::{SOURCE_COLUMNS, source_from_row};

/// A source is deactivated after this many consecutive fetch failures.
pub const MAX_CONSECUTIVE_ERRORS: i64 = 5;

impl Storage {
    /// Add a source, idempotent on URL: an existing row's id is returned
    /// unchanged.
    pub async fn add_source(
        &self,
        url: &str,
        kind: SourceKind,
        name: Option<&str>,
    ) -> Result<String> {
        let mut rows = self
            .conn()
            .query("SELECT id FROM sources WHERE url = ?1", params![url])
            .await
            .map_err(Error::storage)?;
        if let Some(row) = rows.next().await.map_err(Error::storage)? {
            return row.get::<String>(0).map_err(Error::storage);
        }

        let id = Uuid::new_v4().to_string();
        self.conn()
            .execute(
                "INSERT INTO sources (id, url, type, name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
                params![id.as_str(), url, kind.as_str(), name],
            )
            .await
            .map_err(Error::storage)?;

        debug!(source_id = %id, url, "source added");
        Ok(id)
    }

    pub async fn get_source(&self, source_id: &str) -> Result<Option<Source>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?1");
        let mut rows = self
            .conn()
            .query(&sql, params![source_id])
            .await
            .map_err(Error::storage)?;
        match rows.next().await.map_err(Error::storage)? {
            Some(row) => Ok(Some(source_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Active sources in id order: the deterministic order the
    /// orchestrator processes them in.
    pub async fn get_active_sources(&self) -> Result<Vec<Source>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE active = 1 ORDER BY id");
        self.collect_sources(&sql).await
    }

    pub async fn get_all_sources(&self) -> Result<Vec<Source>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources ORDER BY created_at DESC");
        self.collect_sources(&sql).await
    }

    async fn collect_sources(&self, sql: &str) -> Result<Vec<Source>> {
        let mut rows = self.conn().query(sql, ()).await.map_err(Error::storage)?;
        let mut sources = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::storage)? {
            sources.push(source_from_row(&row)?);
        }
        Ok(sources)
    }

    /// Update name and/or URL. Returns false when no fields were given or
    /// the source does not exist. URL validation happens at the API layer
    /// before this is called.
    pub async fn update_source(
        &self,
        source_id: &str,
        name: Option<&str>,
        url: Option<&str>,
    ) -> Result<bool> {
        let changed = match (name, url) {
            (Some(name), Some(url)) => self
                .conn()
                .execute(
                    "UPDATE sources SET name = ?1, url = ?2, updated_at = CURRENT_TIMESTAMP
                     WHERE id = ?3",
                    params![name, url, source_id],
                )
                .await
                .map_err(Error::storage)?,
            (Some(name), None) => self
                .conn()
                .execute(
                    "UPDATE sources SET name = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
                    params![name, source_id],
                )
                .await
                .map_err(Error::storage)?,
            (None, Some(url)) => self
                .conn()
                .execute(
                    "UPDATE sources SET url = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
                    params![url, source_id],
                )
                .await
                .map_err(Error::storage)?,
            (None, None) => return Ok(false),
        };
        Ok(changed > 0)
    }

    pub async fn pause_source(&self, source_id: &str) -> Result<bool> {
        let changed = self
            .conn()
            .execute(
                "UPDATE sources SET active = 0, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
                params![source_id],
            )
            .await
            .map_err(Error::storage)?;
        Ok(changed > 0)
    }

    /// Reactivate a source and clear its error accounting.
    pub async fn resume_source(&self, source_id: &str) -> Result<bool> {
        let changed = self
            .conn()
            .execute(
                "UPDATE sources
                 SET active = 1, error_count = 0, last_error = NULL,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1",
                params![source_id],
            )
            .await
            .map_err(Error::storage)?;
        Ok(changed > 0)
    }

    /// Record the outcome of a fetch attempt. Success clears the error
    /// counter; failure increments it and deactivates the source once it
    /// reaches [`MAX_CONSECUTIVE_ERRORS`].
    pub async fn update_source_fetch_status(
        &self,
        source_id: &str,
        success: bool,
        error_message: Option<&str>,
    ) -> Result<()> {
        if success {
            self.conn()
                .execute(
                    "UPDATE sources
                     SET last_fetched_at = CURRENT_TIMESTAMP, error_count = 0,
                         last_error = NULL, updated_at = CURRENT_TIMESTAMP
                     WHERE id = ?1",
                    params![source_id],
                )
                .await
                .map_err(Error::storage)?;
        } else {
            self.conn()
                .execute(
                    "UPDATE sources
                     SET error_count = error_count + 1, last_error = ?1,
                         updated_at = CURRENT_TIMESTAMP
                     WHERE id = ?2",
                    params![error_message, source_id],
                )
                .await
                .map_err(Error::storage)?;
            self.conn()
                .execute(
                    "UPDATE sources SET active = 0 WHERE id = ?1 AND error_count >= ?2",
                    params![source_id, MAX_CONSECUTIVE_ERRORS],
                )
                .await
                .map_err(Error::storage)?;
        }
        Ok(())
    }

    /// Remove a source in one transaction, preserving favorited content
    /// as orphans (source_id = NULL) and purging orphaned vectors.
    pub async fn remove_source(&self, source_id: &str) -> Result<bool> {
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(Error::storage)?;

        tx.execute(
            "UPDATE content SET source_id = NULL WHERE source_id = ?1 AND favorited = 1",
            params![source_id],
        )
        .await
        .map_err(Error::storage)?;

        tx.execute(
            "DELETE FROM content WHERE source_id = ?1 AND favorited = 0",
            params![source_id],
        )
        .await
        .map_err(Error::storage)?;

        // The vector table has no FK cascade.
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

        let deleted = tx
            .execute("DELETE FROM sources WHERE id = ?1", params![source_id])
            .await
            .map_err(Error::storage)?;

        tx.commit().await.map_err(Error::storage)?;
        Ok(deleted > 0)
    }
}
