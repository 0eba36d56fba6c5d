//! Source resource handlers.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::json;

use prismis_core::{Error, SourceKind, extract_name_from_url, normalize_source_url};
use prismis_fetchers::SourceValidator;

use crate::AppState;
use crate::error::{ApiResult, Envelope};

#[derive(Debug, Deserialize)]
pub struct SourceRequest {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SourceUpdateRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<SourceKind>,
    #[serde(default)]
    pub name: Option<String>,
}

/// POST /api/sources: normalize → validate → insert (idempotent on URL).
pub async fn add_source(
    State(state): State<AppState>,
    Json(request): Json<SourceRequest>,
) -> ApiResult {
    let url = request.url.trim();
    if url.is_empty() {
        return Err(Error::Validation("URL cannot be empty".into()).into());
    }

    let normalized = normalize_source_url(url, request.kind);

    let validator = SourceValidator::new()?;
    let metadata = validator
        .validate(&normalized, request.kind)
        .await
        .map_err(|e| Error::Validation(format!("Source validation failed: {e}")))?;

    // Caller-supplied name or a URL-derived fallback; a display name
    // discovered during validation (e.g. the subreddit's canonical
    // capitalization) always wins.
    let mut name = request
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| extract_name_from_url(&normalized, request.kind));
    if let Some(display_name) = metadata.display_name {
        name = display_name;
    }

    let storage = state.storage().await?;
    let id = storage.add_source(&normalized, request.kind, Some(&name)).await?;
    storage.close();

    Ok(Envelope::ok(
        "Source added successfully",
        json!({
            "id": id,
            "url": normalized,
            "type": request.kind,
            "name": name,
        }),
    ))
}

/// GET /api/sources
pub async fn list_sources(State(state): State<AppState>) -> ApiResult {
    let storage = state.storage().await?;
    let sources = storage.get_all_sources().await?;
    storage.close();

    let total = sources.len();
    Ok(Envelope::ok(
        format!("Retrieved {total} sources"),
        json!({"sources": sources, "total": total}),
    ))
}

/// PATCH /api/sources/{id}: rename and/or reassign URL (re-validates).
pub async fn update_source(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
    Json(request): Json<SourceUpdateRequest>,
) -> ApiResult {
    let storage = state.storage().await?;
    let source = storage
        .get_source(&source_id)
        .await?
        .ok_or_else(|| Error::not_found("Source", &source_id))?;

    let kind = request.kind.unwrap_or(source.kind);

    let new_url = match request.url {
        Some(url) if !url.is_empty() && url != source.url => {
            let normalized = normalize_source_url(&url, kind);
            let validator = SourceValidator::new()?;
            validator
                .validate(&normalized, kind)
                .await
                .map_err(|e| Error::Validation(format!("Source validation failed: {e}")))?;
            Some(normalized)
        }
        _ => None,
    };

    if request.name.is_none() && new_url.is_none() {
        storage.close();
        return Ok(Envelope::ok(
            "Nothing to update",
            json!({"id": source_id}),
        ));
    }

    let updated = storage
        .update_source(&source_id, request.name.as_deref(), new_url.as_deref())
        .await?;
    storage.close();
    if !updated {
        return Err(Error::Storage("failed to update source".into()).into());
    }

    Ok(Envelope::ok(
        "Source updated successfully",
        json!({"id": source_id, "name": request.name, "url": new_url}),
    ))
}

/// DELETE /api/sources/{id}: cascade with favorite preservation.
pub async fn delete_source(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> ApiResult {
    let storage = state.storage().await?;
    let removed = storage.remove_source(&source_id).await?;
    storage.close();
    if !removed {
        return Err(Error::not_found("Source", &source_id).into());
    }
    Ok(Envelope::ok(
        "Source removed successfully",
        json!({"id": source_id}),
    ))
}

/// PATCH /api/sources/{id}/pause
pub async fn pause_source(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> ApiResult {
    let storage = state.storage().await?;
    let paused = storage.pause_source(&source_id).await?;
    storage.close();
    if !paused {
        return Err(Error::not_found("Source", &source_id).into());
    }
    Ok(Envelope::ok(
        "Source paused successfully",
        json!({"id": source_id, "active": false}),
    ))
}

/// PATCH /api/sources/{id}/resume: reactivates and clears errors.
pub async fn resume_source(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> ApiResult {
    let storage = state.storage().await?;
    let resumed = storage.resume_source(&source_id).await?;
    storage.close();
    if !resumed {
        return Err(Error::not_found("Source", &source_id).into());
    }
    Ok(Envelope::ok(
        "Source resumed successfully",
        json!({"id": source_id, "active": true}),
    ))
}
