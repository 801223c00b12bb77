pub mod controller;
pub mod devices;
pub mod templates;
pub mod vpns;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::compose::ComposeError;
use crate::AppState;

/// Shared pagination query parameters for list endpoints.
/// Defaults: limit=100, offset=0. Max limit=1000.
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page_limit")]
    pub limit: i32,
    #[serde(default)]
    pub offset: i32,
}

impl PaginationQuery {
    /// Clamp limit to [1, 1000] and offset to >= 0
    pub fn sanitize(&self) -> (i32, i32) {
        let limit = self.limit.clamp(1, 1000);
        let offset = self.offset.max(0);
        (limit, offset)
    }
}

fn default_page_limit() -> i32 {
    100
}

/// Error response body: {"error": "message"} plus optional detail
/// fields (path, kind, sources) for composition failures.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(flatten)]
    pub detail: Option<Value>,
}

/// API error type
pub struct ApiError {
    status: StatusCode,
    message: String,
    detail: Option<Value>,
}

impl ApiError {
    fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            detail: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{} not found", resource))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                detail: self.detail,
            }),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Check for typed NotFoundError first (no fragile string matching)
        if let Some(nf) = err.downcast_ref::<crate::db::NotFoundError>() {
            return Self::not_found(&nf.resource);
        }
        Self::internal(err.to_string())
    }
}

/// Map a composition failure onto the API error taxonomy:
/// malformed input 400, unknown template reference 404, schema and
/// duplicate-key violations 422 with a path-annotated payload, render
/// failures 500.
pub fn map_compose_error(err: anyhow::Error) -> ApiError {
    match err.downcast_ref::<ComposeError>() {
        Some(ComposeError::MalformedInput(msg)) => {
            ApiError::bad_request(msg.clone()).with_detail(json!({"kind": "malformed-input"}))
        }
        Some(ComposeError::UnknownTemplate(id)) => {
            ApiError::new(StatusCode::NOT_FOUND, format!("unknown template: {}", id))
                .with_detail(json!({"kind": "reference-error"}))
        }
        Some(ComposeError::DuplicateKey { key, first, second }) => ApiError::unprocessable(format!(
            "duplicate top-level key '{}' defined by both '{}' and '{}'",
            key, first, second
        ))
        .with_detail(json!({
            "kind": "validation-error",
            "field": "templates",
            "key": key,
            "sources": [first, second],
        })),
        Some(ComposeError::Validation(inner)) => ApiError::unprocessable(inner.message.clone())
            .with_detail(json!({"kind": "validation-error", "path": inner.path.clone()})),
        Some(ComposeError::Render(msg)) => {
            tracing::error!("Render failed after successful validation: {}", msg);
            ApiError::internal("internal compile error")
        }
        None => ApiError::from(err),
    }
}

/// Response helper: return 201 Created with JSON body
pub fn created<T: Serialize>(item: T) -> (StatusCode, Json<T>) {
    (StatusCode::CREATED, Json(item))
}

/// Healthcheck endpoint — returns 200 OK with status
pub async fn healthcheck() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "netweave",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Recompute a device's checksum after a mutation, logging failures.
/// A config that no longer composes keeps its stale checksum; the
/// admin response already carried the validation error.
pub async fn refresh_device_config(state: &Arc<AppState>, device_id: &str) {
    if let Err(e) = state.composer.refresh(device_id).await {
        tracing::warn!("Failed to refresh config for device {}: {}", device_id, e);
    }
}
