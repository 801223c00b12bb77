use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::backend::Backend;
use crate::models::*;
use crate::utils::{generate_key, is_valid_key};
use crate::AppState;

use super::{created, map_compose_error, refresh_device_config, ApiError, PaginationQuery};

/// List all devices (with optional pagination)
pub async fn list_devices(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Vec<Device>>, ApiError> {
    let (limit, offset) = page.sanitize();
    let devices = state.store.list_devices(limit, offset).await?;
    Ok(Json(devices))
}

/// Get a device together with its owned config
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeviceDetail>, ApiError> {
    let detail = load_detail(&state, &id).await?;
    Ok(Json(detail))
}

/// Create a new device with its config and template attachments
pub async fn create_device(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDeviceRequest>,
) -> Result<(StatusCode, Json<DeviceDetail>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    let key = match &req.key {
        Some(key) => {
            if !is_valid_key(key) {
                return Err(ApiError::bad_request(
                    "key must not contain spaces, dots or slashes (max 64 chars)",
                ));
            }
            if state.store.device_key_exists(key).await? {
                return Err(ApiError::conflict("device with this key already exists"));
            }
            key.clone()
        }
        None => generate_key(),
    };

    validate_payload(&state, &req.backend, &req.templates).await?;
    dry_run(
        &state,
        None,
        &req.name,
        &key,
        &req.backend,
        req.config.as_ref(),
        req.context.as_ref(),
        &req.templates,
    )
    .await?;

    let id = uuid::Uuid::new_v4().to_string();
    state.store.create_device(&id, &key, &req).await?;
    refresh_device_config(&state, &id).await;

    let detail = load_detail(&state, &id).await?;
    Ok(created(detail))
}

/// Update a device and its config. The device key is immutable.
pub async fn update_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDeviceRequest>,
) -> Result<Json<DeviceDetail>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    let device = state
        .store
        .get_device(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("device"))?;
    let config = state
        .store
        .get_config_for_device(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("config"))?;

    validate_payload(&state, &req.backend, &req.templates).await?;
    dry_run(
        &state,
        Some(&device.id),
        &req.name,
        &device.key,
        &req.backend,
        req.config.as_ref(),
        req.context.as_ref(),
        &req.templates,
    )
    .await?;

    state.store.update_device(&id, &req).await?;
    state
        .store
        .update_config_payload(
            &config.id,
            &req.backend,
            req.config.as_ref(),
            req.context.as_ref(),
            &req.templates,
        )
        .await?;
    refresh_device_config(&state, &id).await;

    let detail = load_detail(&state, &id).await?;
    Ok(Json(detail))
}

/// Delete a device and the config it owns
pub async fn delete_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let config = state.store.get_config_for_device(&id).await?;
    state.store.delete_device(&id).await?;
    if let Some(config) = config {
        state.composer.evict(&config.id).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Preview a composition over transient config/context/templates.
/// Runs the full pipeline short of persisting anything.
pub async fn preview_config(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConfigPreviewRequest>,
) -> Result<Json<ConfigPreviewResponse>, ApiError> {
    let composition = state
        .composer
        .preview(&req)
        .await
        .map_err(map_compose_error)?;

    Ok(Json(ConfigPreviewResponse {
        files: composition
            .archive
            .files
            .into_iter()
            .map(|(name, content)| PreviewFile { name, content })
            .collect(),
        checksum: composition.archive.checksum,
    }))
}

/// Download the compiled configuration archive of a device
/// (operator-facing; the device-facing variant lives in the
/// controller and requires the device key).
pub async fn download_configuration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let device = state
        .store
        .get_device(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("device"))?;
    let config = state
        .store
        .get_config_for_device(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("config"))?;

    let (_, data) = state
        .composer
        .archive_for_device(&device, &config)
        .await
        .map_err(map_compose_error)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.tar\"", device.id),
            ),
        ],
        data,
    )
        .into_response())
}

async fn load_detail(state: &Arc<AppState>, id: &str) -> Result<DeviceDetail, ApiError> {
    let device = state
        .store
        .get_device(id)
        .await?
        .ok_or_else(|| ApiError::not_found("device"))?;
    let config = state
        .store
        .get_config_for_device(id)
        .await?
        .ok_or_else(|| ApiError::not_found("config"))?;
    Ok(DeviceDetail { device, config })
}

/// Cross-field checks before a device write: the backend identifier
/// must be a known dialect and every attached template must target it.
async fn validate_payload(
    state: &Arc<AppState>,
    backend: &str,
    templates: &[String],
) -> Result<(), ApiError> {
    if Backend::from_id(backend).is_none() {
        return Err(ApiError::bad_request("unknown backend identifier"));
    }
    for template_id in templates {
        let template = state
            .store
            .get_template(template_id)
            .await?
            .ok_or_else(|| ApiError::bad_request(format!("unknown template: {}", template_id)))?;
        if template.backend != backend {
            return Err(ApiError::bad_request(format!(
                "template '{}' targets backend '{}', not '{}'",
                template.name, template.backend, backend
            )));
        }
    }
    Ok(())
}

/// Run the composition pipeline against the incoming payload before
/// anything is persisted, so conflicts and schema violations surface
/// as field-level errors instead of a broken stored config.
#[allow(clippy::too_many_arguments)]
async fn dry_run(
    state: &Arc<AppState>,
    id: Option<&str>,
    name: &str,
    key: &str,
    backend: &str,
    config: Option<&serde_json::Value>,
    context: Option<&serde_json::Value>,
    templates: &[String],
) -> Result<(), ApiError> {
    let preview = ConfigPreviewRequest {
        id: id.map(str::to_string),
        name: Some(name.to_string()),
        key: Some(key.to_string()),
        backend: backend.to_string(),
        config: config.map(|v| v.to_string()),
        context: context.map(|v| v.to_string()),
        templates: templates.to_vec(),
    };
    state
        .composer
        .preview(&preview)
        .await
        .map(|_| ())
        .map_err(map_compose_error)
}
