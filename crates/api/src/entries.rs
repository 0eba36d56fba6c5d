//! Entry (content) resource handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use prismis_core::{ContentRecord, Error, Priority};
use prismis_llm::EmbeddingProvider;

use crate::AppState;
use crate::error::{ApiError, ApiResult, Envelope};

const MAX_LIMIT: i64 = 10_000;

#[derive(Debug, Deserialize)]
pub struct EntryFilters {
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub unread_only: Option<bool>,
    #[serde(default)]
    pub include_archived: Option<bool>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub since_hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ContentUpdateRequest {
    #[serde(default)]
    pub read: Option<bool>,
    #[serde(default)]
    pub favorited: Option<bool>,
    /// Feedback signal: flag the item as interesting.
    #[serde(default)]
    pub flagged: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct EntryDetailQuery {
    #[serde(default)]
    pub include: Option<String>,
}

/// GET /api/entries: filtered listing.
pub async fn list_entries(
    State(state): State<AppState>,
    Query(filters): Query<EntryFilters>,
) -> ApiResult {
    let priority = match filters.priority.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(Priority::parse(raw).ok_or_else(|| {
            Error::Validation(format!(
                "Invalid priority '{raw}'. Must be one of: high, medium, low"
            ))
        })?),
    };

    let limit = filters.limit.unwrap_or(50);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(Error::Validation(format!("limit must be between 1 and {MAX_LIMIT}")).into());
    }

    let unread_only = filters.unread_only.unwrap_or(false);
    let include_archived = filters.include_archived.unwrap_or(false);
    let since = parse_since(&filters)?;

    let storage = state.storage().await?;
    let items: Vec<ContentRecord> = match (priority, unread_only) {
        (Some(priority), true) => {
            storage
                .get_content_by_priority(priority, limit, include_archived)
                .await?
        }
        (Some(priority), false) => {
            let all = storage.get_content_since(since, include_archived).await?;
            all.into_iter()
                .filter(|item| item.priority == Some(priority))
                .take(limit as usize)
                .collect()
        }
        (None, true) => {
            // Unread across all priorities, highest first, sharing the limit.
            let mut items = Vec::new();
            for priority in [Priority::High, Priority::Medium, Priority::Low] {
                let remaining = limit - items.len() as i64;
                if remaining <= 0 {
                    break;
                }
                items.extend(
                    storage
                        .get_content_by_priority(priority, remaining, include_archived)
                        .await?,
                );
            }
            items
        }
        (None, false) => {
            let all = storage.get_content_since(since, include_archived).await?;
            all.into_iter().take(limit as usize).collect()
        }
    };
    storage.close();

    let total = items.len();
    Ok(Envelope::ok(
        format!("Retrieved {total} content items"),
        json!({
            "items": items,
            "total": total,
            "filters_applied": {
                "priority": filters.priority,
                "unread_only": unread_only,
                "include_archived": include_archived,
                "limit": limit,
                "since": filters.since,
                "since_hours": filters.since_hours,
            },
        }),
    ))
}

fn parse_since(filters: &EntryFilters) -> Result<Option<DateTime<Utc>>, ApiError> {
    if let Some(hours) = filters.since_hours {
        if !(1..=720).contains(&hours) {
            return Err(Error::Validation("since_hours must be between 1 and 720".into()).into());
        }
        return Ok(Some(Utc::now() - Duration::hours(hours)));
    }
    match &filters.since {
        None => Ok(None),
        Some(raw) => {
            let parsed = DateTime::parse_from_rfc3339(&raw.replace('Z', "+00:00"))
                .map_err(|_| {
                    Error::Validation(format!(
                        "Invalid ISO8601 timestamp: {raw}. Expected format: 2026-03-01T12:00:00Z"
                    ))
                })?;
            Ok(Some(parsed.with_timezone(&Utc)))
        }
    }
}

/// PATCH /api/entries/{id}: read/favorited/flagged updates.
pub async fn update_entry(
    State(state): State<AppState>,
    Path(content_id): Path<String>,
    Json(request): Json<ContentUpdateRequest>,
) -> ApiResult {
    if request.read.is_none() && request.favorited.is_none() && request.flagged.is_none() {
        return Err(Error::Validation(
            "at least one of read, favorited or flagged must be provided".into(),
        )
        .into());
    }

    let storage = state.storage().await?;

    if request.read.is_some() || request.favorited.is_some() {
        let updated = storage
            .update_content_status(&content_id, request.read, request.favorited)
            .await?;
        if !updated {
            storage.close();
            return Err(Error::not_found("Content", &content_id).into());
        }
    }
    if let Some(flagged) = request.flagged {
        let updated = storage.set_flagged(&content_id, flagged).await?;
        if !updated {
            storage.close();
            return Err(Error::not_found("Content", &content_id).into());
        }
    }

    let record = storage.get_content_by_id(&content_id).await?;
    storage.close();

    Ok(Envelope::ok(
        "Content updated successfully",
        json!({
            "id": content_id,
            "read": record.as_ref().map(|r| r.read),
            "favorited": record.as_ref().map(|r| r.favorited),
            "flagged": record.as_ref().map(|r| r.flagged_interesting),
        }),
    ))
}

/// GET /api/entries/{id}: lightweight by default, `?include=content` for
/// the full body.
pub async fn get_entry(
    State(state): State<AppState>,
    Path(content_id): Path<String>,
    Query(query): Query<EntryDetailQuery>,
) -> ApiResult {
    let storage = state.storage().await?;
    let record = storage
        .get_content_by_id(&content_id)
        .await?
        .ok_or_else(|| Error::not_found("Entry", &content_id))?;
    storage.close();

    let mut data = serde_json::to_value(&record)
        .map_err(|e| Error::Storage(format!("cannot serialize entry: {e}")))?;
    if query.include.as_deref() != Some("content") {
        if let Some(obj) = data.as_object_mut() {
            obj.remove("content");
        }
    }

    Ok(Envelope::ok("Entry retrieved successfully", data))
}

/// GET /api/entries/{id}/raw: plain text body for piping.
pub async fn get_entry_raw(
    State(state): State<AppState>,
    Path(content_id): Path<String>,
) -> Response {
    let storage = match state.storage().await {
        Ok(storage) => storage,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {e}")).into_response();
        }
    };
    let record = storage.get_content_by_id(&content_id).await;
    storage.close();

    match record {
        Ok(Some(record)) => record.content.into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Not found").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {e}")).into_response(),
    }
}

/// GET /api/search: semantic search over embeddings.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub min_score: Option<f64>,
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult {
    if query.q.trim().is_empty() {
        return Err(Error::Validation("search query must not be empty".into()).into());
    }
    let limit = query.limit.unwrap_or(20);
    if !(1..=50).contains(&limit) {
        return Err(Error::Validation("limit must be between 1 and 50".into()).into());
    }
    let min_score = query.min_score.unwrap_or(0.0);
    if !(0.0..=1.0).contains(&min_score) {
        return Err(Error::Validation("min_score must be between 0.0 and 1.0".into()).into());
    }

    let query_embedding = state.embedder.embed_text(query.q.trim()).await?;

    let storage = state.storage().await?;
    let results = storage
        .search_content(&query_embedding, limit, min_score)
        .await?;
    storage.close();

    let total = results.len();
    Ok(Envelope::ok(
        format!("Found {total} results for '{}'", query.q),
        json!({
            "items": results,
            "total": total,
            "query": query.q,
            "filters_applied": {"limit": limit, "min_score": min_score},
        }),
    ))
}
