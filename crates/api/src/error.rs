//! Uniform response envelope and error-to-status mapping.
//!
//! Every outcome, success or failure, renders as
//! `{"success": bool, "message": string, "data": object|null}`. Stack
//! traces never leak; the taxonomy maps deterministically to statuses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use prismis_core::Error;

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
    pub data: Option<Value>,
}

impl Envelope {
    pub fn ok(message: impl Into<String>, data: Value) -> Json<Envelope> {
        Json(Envelope {
            success: true,
            message: message.into(),
            data: Some(data),
        })
    }
}

/// Handler error: a core error plus the HTTP rendering.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Authentication(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %self.0, "request failed");
        }
        let body = Envelope {
            success: false,
            message: self.0.to_string(),
            data: None,
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult = std::result::Result<Json<Envelope>, ApiError>;
