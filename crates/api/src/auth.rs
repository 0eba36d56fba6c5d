//! Shared-key authentication: every endpoint except `/health` requires
//! the configured key in the `X-API-Key` header.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use prismis_core::Error;

use crate::AppState;
use crate::error::ApiError;

pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    match provided {
        None => Err(ApiError(Error::Authentication(
            "Missing API key. Please provide X-API-Key header".into(),
        ))),
        Some(key) if key == state.config.api.key => Ok(next.run(request).await),
        Some(_) => Err(ApiError(Error::Authentication("Invalid API key".into()))),
    }
}
