//! Maintenance endpoints: prune, archive status, audio briefings, health.

use std::process::Stdio;

use axum::extract::{Query, State};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::process::Command;
use tracing::info;

use prismis_core::{Error, Priority};

use crate::AppState;
use crate::error::{ApiResult, Envelope};

#[derive(Debug, Deserialize)]
pub struct PruneQuery {
    #[serde(default)]
    pub days: Option<i64>,
}

/// POST /api/prune: delete unprioritized items (favorites and flagged
/// items are never touched).
pub async fn prune(State(state): State<AppState>, Query(query): Query<PruneQuery>) -> ApiResult {
    if let Some(days) = query.days {
        if days < 0 {
            return Err(Error::Validation("days must be non-negative".into()).into());
        }
    }

    let storage = state.storage().await?;
    let count = storage.count_unprioritized(query.days).await?;
    if count == 0 {
        storage.close();
        return Ok(Envelope::ok(
            "No unprioritized items to prune",
            json!({"deleted": 0, "days_filter": query.days}),
        ));
    }

    let deleted = storage.delete_unprioritized(query.days).await?;
    storage.close();

    let message = match query.days {
        Some(days) => format!("Pruned {deleted} unprioritized items older than {days} days"),
        None => format!("Pruned {deleted} unprioritized items"),
    };
    Ok(Envelope::ok(
        message,
        json!({"deleted": deleted, "days_filter": query.days}),
    ))
}

/// GET /api/prune/count: dry-run count.
pub async fn prune_count(
    State(state): State<AppState>,
    Query(query): Query<PruneQuery>,
) -> ApiResult {
    let storage = state.storage().await?;
    let count = storage.count_unprioritized(query.days).await?;
    storage.close();

    let message = match query.days {
        Some(days) => format!("Found {count} unprioritized items older than {days} days"),
        None => format!("Found {count} unprioritized items"),
    };
    Ok(Envelope::ok(
        message,
        json!({"count": count, "days_filter": query.days}),
    ))
}

/// GET /api/archive/status: counts plus the configured windows.
pub async fn archive_status(State(state): State<AppState>) -> ApiResult {
    let storage = state.storage().await?;
    let archived = storage.count_archived().await?;
    let active = storage.count_active().await?;
    storage.close();

    let archival = &state.config.archival;
    Ok(Envelope::ok(
        "Archival status retrieved",
        json!({
            "enabled": archival.enabled,
            "total_items": archived + active,
            "archived_items": archived,
            "active_items": active,
            "windows": {
                "high_read": archival.high_read,
                "medium_unread": archival.medium_unread,
                "medium_read": archival.medium_read,
                "low_unread": archival.low_unread,
                "low_read": archival.low_read,
            },
        }),
    ))
}

/// POST /api/audio/briefings: build a spoken briefing from the last 24h
/// of HIGH priority items and hand it to the configured TTS command.
pub async fn generate_audio_briefing(State(state): State<AppState>) -> ApiResult {
    let storage = state.storage().await?;
    let since = Utc::now() - chrono::Duration::hours(24);
    let recent = storage.get_content_since(Some(since), false).await?;
    storage.close();

    let high: Vec<_> = recent
        .into_iter()
        .filter(|item| item.priority == Some(Priority::High))
        .collect();
    if high.is_empty() {
        return Err(Error::Validation(
            "No high priority content available for briefing. \
             Add content sources or adjust prioritization context."
                .into(),
        )
        .into());
    }

    // Conversational script via the LLM; summaries stand in when a script
    // cannot be produced.
    let digest: Vec<String> = high
        .iter()
        .map(|item| {
            format!(
                "- {} ({}): {}",
                item.title,
                item.source_name.as_deref().unwrap_or("unknown source"),
                item.summary.as_deref().unwrap_or("no summary")
            )
        })
        .collect();
    let reply = state
        .llm
        .chat_json(
            "You write short spoken briefing scripts. Respond with ONLY valid JSON: \
             {\"script\": \"...\"}. The script should be conversational, 200-400 words, \
             no markdown, suitable for text-to-speech.",
            &format!(
                "Write a briefing covering these high-priority items:\n{}",
                digest.join("\n")
            ),
        )
        .await?;
    let script = reply
        .get("script")
        .and_then(|s| s.as_str())
        .ok_or_else(|| Error::Validation("briefing script generation failed".into()))?
        .to_string();

    let audio_dir = prismis_config::audio_dir();
    std::fs::create_dir_all(&audio_dir)
        .map_err(|e| Error::Storage(format!("cannot create audio dir: {e}")))?;
    let filename = format!("briefing-{}.mp3", Utc::now().format("%Y-%m-%d"));
    let output_path = audio_dir.join(&filename);

    let status = Command::new(&state.config.audio.command)
        .arg(&script)
        .arg("-o")
        .arg(&output_path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| {
            Error::Storage(format!(
                "TTS command '{}' failed to start: {e}",
                state.config.audio.command
            ))
        })?;
    if !status.success() {
        return Err(Error::Storage(format!(
            "TTS command '{}' exited with {status}",
            state.config.audio.command
        ))
        .into());
    }

    info!(path = %output_path.display(), items = high.len(), "audio briefing generated");
    Ok(Envelope::ok(
        format!("Audio briefing generated: {filename}"),
        json!({
            "file_path": output_path.to_string_lossy(),
            "filename": filename,
            "generated_at": Utc::now().to_rfc3339(),
            "provider": state.config.audio.provider,
            "high_priority_count": high.len(),
        }),
    ))
}

/// GET /health: liveness plus database reachability; no auth.
pub async fn health(State(state): State<AppState>) -> ApiResult {
    let storage = state.storage().await?;
    let sources = storage.get_all_sources().await?;
    storage.close();

    Ok(Envelope::ok(
        "Service healthy",
        json!({
            "service": "prismis-api",
            "database": "connected",
            "sources": sources.len(),
        }),
    ))
}
