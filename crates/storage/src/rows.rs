//! Row-to-model mapping helpers.

use libsql::Row;
use serde_json::Value;

use prismis_core::time;
use prismis_core::{ContentRecord, Error, Priority, Result, Source, SourceKind};

/// Column list shared by every content query, with the joined source
/// columns last. Keep in sync with [`content_from_row`].
pub const CONTENT_COLUMNS: &str = "c.id, c.source_id, c.external_id, c.title, c.url, c.content, \
     c.summary, c.analysis, c.priority, c.published_at, c.fetched_at, \
     c.read, c.favorited, c.flagged_interesting, c.notes, c.archived_at, \
     s.name AS source_name, s.type AS source_type";

pub const SOURCE_COLUMNS: &str =
    "id, url, type, name, active, error_count, last_error, last_fetched_at, created_at, updated_at";

pub fn source_from_row(row: &Row) -> Result<Source> {
    let kind_label: String = row.get(2).map_err(Error::storage)?;
    let kind = SourceKind::parse(&kind_label)
        .ok_or_else(|| Error::Storage(format!("unknown source type in database: {kind_label}")))?;

    Ok(Source {
        id: row.get(0).map_err(Error::storage)?,
        url: row.get(1).map_err(Error::storage)?,
        kind,
        name: row.get(3).map_err(Error::storage)?,
        active: row.get::<i64>(4).map_err(Error::storage)? != 0,
        error_count: row.get(5).map_err(Error::storage)?,
        last_error: row.get(6).map_err(Error::storage)?,
        last_fetched_at: opt_timestamp(row, 7)?,
        created_at: opt_timestamp(row, 8)?,
        updated_at: opt_timestamp(row, 9)?,
    })
}

pub fn content_from_row(row: &Row) -> Result<ContentRecord> {
    let analysis: Option<Value> = row
        .get::<Option<String>>(7)
        .map_err(Error::storage)?
        .and_then(|raw| serde_json::from_str(&raw).ok());

    let priority = row
        .get::<Option<String>>(8)
        .map_err(Error::storage)?
        .as_deref()
        .and_then(Priority::parse);

    let source_kind = row
        .get::<Option<String>>(17)
        .map_err(Error::storage)?
        .as_deref()
        .and_then(SourceKind::parse);

    Ok(ContentRecord {
        id: row.get(0).map_err(Error::storage)?,
        source_id: row.get(1).map_err(Error::storage)?,
        external_id: row.get(2).map_err(Error::storage)?,
        title: row.get(3).map_err(Error::storage)?,
        url: row.get(4).map_err(Error::storage)?,
        content: row.get(5).map_err(Error::storage)?,
        summary: row.get(6).map_err(Error::storage)?,
        analysis,
        priority,
        published_at: opt_timestamp(row, 9)?,
        fetched_at: opt_timestamp(row, 10)?,
        read: row.get::<i64>(11).map_err(Error::storage)? != 0,
        favorited: row.get::<i64>(12).map_err(Error::storage)? != 0,
        flagged_interesting: row.get::<i64>(13).map_err(Error::storage)? != 0,
        notes: row.get(14).map_err(Error::storage)?,
        archived_at: opt_timestamp(row, 15)?,
        source_name: row.get(16).map_err(Error::storage)?,
        source_kind,
        relevance_score: None,
    })
}

fn opt_timestamp(row: &Row, idx: i32) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    Ok(row
        .get::<Option<String>>(idx)
        .map_err(Error::storage)?
        .as_deref()
        .and_then(time::from_db))
}
