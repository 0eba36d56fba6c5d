//! REST API for the Prismis daemon.
//!
//! axum server bound to the configured host (loopback unless the user
//! opted in to LAN exposure), port 8989. Every handler acquires a scoped
//! Storage handle and releases it on all exit paths; every response,
//! success or error, uses the uniform envelope.

mod auth;
mod entries;
mod error;
mod sources;
mod system;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::Request;
use axum::http::{HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, patch, post};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use prismis_config::Config;
use prismis_core::Result;
use prismis_llm::{EmbeddingProvider, LlmClient};
use prismis_storage::Storage;

pub use error::{ApiError, Envelope};

pub const API_PORT: u16 = 8989;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_path: PathBuf,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub llm: Arc<LlmClient>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        db_path: PathBuf,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<LlmClient>,
    ) -> Self {
        Self {
            config,
            db_path,
            embedder,
            llm,
        }
    }

    /// Scoped storage handle for one request.
    pub async fn storage(&self) -> Result<Storage> {
        Storage::open(&self.db_path).await
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/sources", post(sources::add_source).get(sources::list_sources))
        .route(
            "/api/sources/{id}",
            patch(sources::update_source).delete(sources::delete_source),
        )
        .route("/api/sources/{id}/pause", patch(sources::pause_source))
        .route("/api/sources/{id}/resume", patch(sources::resume_source))
        .route("/api/entries", get(entries::list_entries))
        .route(
            "/api/entries/{id}",
            get(entries::get_entry).patch(entries::update_entry),
        )
        .route("/api/entries/{id}/raw", get(entries::get_entry_raw))
        .route("/api/search", get(entries::search))
        .route("/api/prune", post(system::prune))
        .route("/api/prune/count", get(system::prune_count))
        .route("/api/archive/status", get(system::archive_status))
        .route("/api/audio/briefings", post(system::generate_audio_briefing))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/health", get(system::health))
        .merge(protected)
        .layer(middleware::from_fn(log_requests))
        .layer(cors_layer())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{API_PORT}", state.config.api.host).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Local-only CORS: browser UIs served from localhost may call the API.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|o| o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1"))
                .unwrap_or(false)
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::Any)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    if !path.starts_with("/api/") {
        return next.run(request).await;
    }

    let started = Instant::now();
    let response = next.run(request).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    info!(
        %method,
        path,
        status = response.status().as_u16(),
        duration_ms,
        "api request"
    );
    prismis_observability::log(
        "api.request",
        json!({
            "method": method.as_str(),
            "path": path,
            "status_code": response.status().as_u16(),
            "duration_ms": duration_ms,
        }),
    );
    response
}
