use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Form,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::backend::Backend;
use crate::models::*;
use crate::utils::generate_key;
use crate::AppState;

/// Plain-text response in the device protocol dialect.
fn text(status: StatusCode, body: impl Into<String>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body.into(),
    )
        .into_response()
}

fn forbidden(param: &str) -> Response {
    text(StatusCode::FORBIDDEN, format!("error: wrong {}\n", param))
}

fn not_found() -> Response {
    text(StatusCode::NOT_FOUND, "error: not found\n")
}

fn internal_error() -> Response {
    text(
        StatusCode::INTERNAL_SERVER_ERROR,
        "error: internal server error\n",
    )
}

/// Resolve the device and enforce its key before anything else.
/// Unknown device reads as 404; a wrong or missing key as a bare 403
/// that reveals nothing further.
async fn authorize(
    state: &Arc<AppState>,
    id: &str,
    key: Option<&str>,
) -> Result<(Device, DeviceConfig), Response> {
    let device = match state.store.get_device(id).await {
        Ok(Some(device)) => device,
        Ok(None) => return Err(not_found()),
        Err(e) => {
            tracing::error!("Device lookup failed: {}", e);
            return Err(internal_error());
        }
    };
    if key != Some(device.key.as_str()) {
        return Err(forbidden("key"));
    }
    let config = match state.store.get_config_for_device(&device.id).await {
        Ok(Some(config)) => config,
        Ok(None) => return Err(not_found()),
        Err(e) => {
            tracing::error!("Config lookup failed: {}", e);
            return Err(internal_error());
        }
    };
    Ok((device, config))
}

async fn track_last_ip(state: &Arc<AppState>, device: &Device, config: &DeviceConfig, addr: Option<SocketAddr>) {
    let Some(addr) = addr else { return };
    let ip = addr.ip().to_string();
    if let Err(e) = state.store.set_device_last_ip(&device.id, &ip).await {
        tracing::warn!("Failed to record device last_ip: {}", e);
    }
    if let Err(e) = state.store.set_config_last_ip(&config.id, &ip).await {
        tracing::warn!("Failed to record config last_ip: {}", e);
    }
}

/// GET /controller/checksum/:id — the cached checksum as plain text.
/// Serves the cache without recompiling; a cold cache (fresh device)
/// compiles once.
pub async fn checksum(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    Path(id): Path<String>,
    Query(query): Query<KeyQuery>,
) -> Response {
    let (device, config) = match authorize(&state, &id, query.key.as_deref()).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let checksum = match config.checksum.clone() {
        Some(checksum) => checksum,
        None => match state.composer.refresh(&device.id).await {
            Ok(checksum) => checksum,
            Err(e) => {
                tracing::error!("Checksum computation failed for {}: {}", device.id, e);
                return internal_error();
            }
        },
    };

    track_last_ip(&state, &device, &config, connect.map(|c| c.0)).await;
    text(StatusCode::OK, checksum)
}

/// GET /controller/download-config/:id — the compiled archive.
/// Compile-on-demand, memoized by checksum.
pub async fn download_config(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    Path(id): Path<String>,
    Query(query): Query<KeyQuery>,
) -> Response {
    let (device, config) = match authorize(&state, &id, query.key.as_deref()).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let (_, data) = match state.composer.archive_for_device(&device, &config).await {
        Ok(archive) => archive,
        Err(e) => {
            // The stored config validated when it was written; failing
            // here is an internal error, never an empty archive.
            tracing::error!("Archive build failed for {}: {}", device.id, e);
            return internal_error();
        }
    };

    track_last_ip(&state, &device, &config, connect.map(|c| c.0)).await;
    (
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
        .into_response()
}

/// POST /controller/report-status/:id — store a device-reported status.
/// Values outside the allowed set are rejected without mutating state.
pub async fn report_status(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    Path(id): Path<String>,
    Form(form): Form<ReportStatusForm>,
) -> Response {
    let (device, config) = match authorize(&state, &id, form.key.as_deref()).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let status = match form.status.as_deref() {
        Some(status) if config_status::is_valid(status) => status.to_string(),
        _ => return forbidden("status"),
    };

    if let Err(e) = state.store.set_config_status(&config.id, &status).await {
        tracing::error!("Status write failed for {}: {}", device.id, e);
        return internal_error();
    }

    track_last_ip(&state, &device, &config, connect.map(|c| c.0)).await;
    text(
        StatusCode::OK,
        format!("report-result: success\ncurrent-status: {}\n", status),
    )
}

/// POST /controller/register — create a Device+Config pair from a
/// shared registration secret. The only operation that needs no
/// pre-existing device key, since it is how a device obtains one.
pub async fn register(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    Form(form): Form<RegisterForm>,
) -> Response {
    if !state.config.registration_enabled {
        return text(StatusCode::FORBIDDEN, "error: registration disabled\n");
    }
    if form.secret.as_deref() != Some(state.config.shared_secret.as_str())
        || state.config.shared_secret.is_empty()
    {
        return forbidden("secret");
    }
    let name = match form.name.as_deref() {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => return forbidden("name"),
    };
    let backend = match form.backend.as_deref() {
        Some(backend)
            if state.config.backends.iter().any(|b| b == backend)
                && Backend::from_id(backend).is_some() =>
        {
            backend.to_string()
        }
        _ => return forbidden("backend"),
    };

    // Freshly generated keys are unique with overwhelming probability;
    // the retry covers the leftover collision case.
    let mut key = generate_key();
    loop {
        match state.store.device_key_exists(&key).await {
            Ok(false) => break,
            Ok(true) => key = generate_key(),
            Err(e) => {
                tracing::error!("Key uniqueness check failed: {}", e);
                return internal_error();
            }
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    let request = CreateDeviceRequest {
        name,
        mac_address: String::new(),
        hardware_id: String::new(),
        model: String::new(),
        os: String::new(),
        notes: String::new(),
        key: None,
        backend,
        config: None,
        context: None,
        templates: Vec::new(),
    };

    let device = match state.store.create_device(&id, &key, &request).await {
        Ok(device) => device,
        Err(e) => {
            tracing::error!("Device registration failed: {}", e);
            return internal_error();
        }
    };

    if let Err(e) = state.composer.refresh(&device.id).await {
        tracing::warn!("Initial checksum for {} failed: {}", device.id, e);
    }
    if let Ok(Some(config)) = state.store.get_config_for_device(&device.id).await {
        track_last_ip(&state, &device, &config, connect.map(|c| c.0)).await;
    }

    text(
        StatusCode::CREATED,
        format!(
            "registration-result: success\nuuid: {}\nkey: {}\n",
            device.id, device.key
        ),
    )
}
