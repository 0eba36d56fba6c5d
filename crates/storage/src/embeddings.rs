//! Embedding storage and similarity-first semantic search.
//!
//! Vectors live twice: a durable blob row in `embeddings` and a mirror in
//! the `vec_content` vector table that similarity queries run against.
//! Both rows are written in one transaction and both must be purged on
//! every content deletion path.

use libsql::params;
use tracing::debug;

use prismis_core::{ContentRecord, Error, Priority, Result};

use crate::Storage;
use crate::rows::{CONTENT_COLUMNS, content_from_row};

/// Dimension of the default sentence-embedding model.
pub const EMBEDDING_DIM: usize = 384;

/// Candidates pulled from the vector table before reranking.
const CANDIDATE_POOL: i64 = 100;

const SIMILARITY_WEIGHT: f64 = 0.90;
const PRIORITY_WEIGHT: f64 = 0.10;

impl Storage {
    /// Store an embedding for a content item, replacing any previous one.
    pub async fn add_embedding(
        &self,
        content_id: &str,
        embedding: &[f32],
        model: &str,
    ) -> Result<()> {
        let blob: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
        let vector_text = vector_literal(embedding);

        let tx = self.conn().transaction().await.map_err(Error::storage)?;
        tx.execute(
            "INSERT OR REPLACE INTO embeddings (content_id, embedding, model, created_at)
             VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)",
            params![content_id, blob, model],
        )
        .await
        .map_err(Error::storage)?;
        tx.execute(
            "INSERT OR REPLACE INTO vec_content (content_id, embedding)
             VALUES (?1, vector32(?2))",
            params![content_id, vector_text],
        )
        .await
        .map_err(Error::storage)?;
        tx.commit().await.map_err(Error::storage)?;

        debug!(content_id, model, dims = embedding.len(), "embedding stored");
        Ok(())
    }

    /// Similarity-first search: the top [`CANDIDATE_POOL`] nearest vectors
    /// are reranked by `0.90·(1 − distance) + 0.10·priority_weight`, so
    /// semantic match dominates and priority only breaks ties.
    pub async fn search_content(
        &self,
        query_embedding: &[f32],
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<ContentRecord>> {
        let vector_text = vector_literal(query_embedding);
        let sql = format!(
            "SELECT {CONTENT_COLUMNS},
                    vector_distance_cos(v.embedding, vector32(?1)) AS distance
             FROM vec_content v
             JOIN content c ON c.id = v.content_id
             LEFT JOIN sources s ON c.source_id = s.id
             ORDER BY distance ASC
             LIMIT ?2"
        );

        let mut rows = self
            .conn()
            .query(&sql, params![vector_text, CANDIDATE_POOL])
            .await
            .map_err(Error::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::storage)? {
            let mut record = content_from_row(&row)?;
            let distance: f64 = row.get(18).map_err(Error::storage)?;
            let similarity = 1.0 - distance;
            let relevance =
                similarity * SIMILARITY_WEIGHT + Priority::weight(record.priority) * PRIORITY_WEIGHT;
            if relevance >= min_score {
                record.relevance_score = Some((relevance * 1000.0).round() / 1000.0);
                results.push(record);
            }
        }

        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);
        Ok(results)
    }

    pub async fn count_content_without_embeddings(&self) -> Result<i64> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM content
                 WHERE id NOT IN (SELECT content_id FROM embeddings)",
                (),
            )
            .await
            .map_err(Error::storage)?;
        let row = rows
            .next()
            .await
            .map_err(Error::storage)?
            .ok_or_else(|| Error::Storage("count query returned no rows".into()))?;
        row.get(0).map_err(Error::storage)
    }

    /// Items still missing an embedding, newest first: the backfill job's
    /// work queue.
    pub async fn get_content_without_embeddings(&self, limit: i64) -> Result<Vec<ContentRecord>> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content c
             LEFT JOIN sources s ON c.source_id = s.id
             WHERE c.id NOT IN (SELECT content_id FROM embeddings)
             ORDER BY c.fetched_at DESC
             LIMIT ?1"
        );
        let mut rows = self
            .conn()
            .query(&sql, params![limit])
            .await
            .map_err(Error::storage)?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::storage)? {
            items.push(content_from_row(&row)?);
        }
        Ok(items)
    }

    /// Remove vector and blob rows whose content no longer exists.
    pub async fn cleanup_orphaned_vectors(&self) -> Result<u64> {
        let tx = self.conn().transaction().await.map_err(Error::storage)?;
        let removed = tx
            .execute(
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
        Ok(removed)
    }

    /// Count vector rows: used by tests to assert the no-orphan invariant.
    pub async fn count_vectors(&self) -> Result<i64> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM vec_content", ())
            .await
            .map_err(Error::storage)?;
        let row = rows
            .next()
            .await
            .map_err(Error::storage)?
            .ok_or_else(|| Error::Storage("count query returned no rows".into()))?;
        row.get(0).map_err(Error::storage)
    }
}

/// Render a vector as the `[x, y, ...]` text form `vector32()` accepts.
fn vector_literal(embedding: &[f32]) -> String {
    let mut out = String::with_capacity(embedding.len() * 10 + 2);
    out.push('[');
    for (i, value) in embedding.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("{value}"));
    }
    out.push(']');
    out
}
