use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use std::sync::Arc;

use crate::backend::Backend;
use crate::models::*;
use crate::notify;
use crate::tree;
use crate::AppState;

use super::{created, refresh_device_config, ApiError, PaginationQuery};

/// List all templates
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Vec<Template>>, ApiError> {
    let (limit, offset) = page.sanitize();
    let templates = state.store.list_templates(limit, offset).await?;
    Ok(Json(templates))
}

/// Get a single template by ID
pub async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Template>, ApiError> {
    let template = state
        .store
        .get_template(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("template"))?;
    Ok(Json(template))
}

/// Create a new template
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<Template>), ApiError> {
    validate_template(&state, &req, None).await?;

    let id = uuid::Uuid::new_v4().to_string();
    let template = state.store.create_template(&id, &req).await?;
    Ok(created(template))
}

/// Update an existing template. Every device config built on it is
/// recomposed, and active subscribers are notified best-effort.
pub async fn update_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<Json<Template>, ApiError> {
    validate_template(&state, &req, Some(&id)).await?;

    let template = state.store.update_template(&id, &req).await?;

    refresh_users(&state, &id).await;
    let subscribers = state.store.list_subscribers(&id).await?;
    notify::notify_subscribers(subscribers, id);
    Ok(Json(template))
}

/// Delete a template. Attached configs lose the layer and are
/// recomposed; subscribers are notified with the pre-delete list.
pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let affected = state.store.device_ids_using_template(&id).await?;
    let subscribers = state.store.list_subscribers(&id).await?;

    state.store.delete_template(&id).await?;

    for device_id in affected {
        refresh_device_config(&state, &device_id).await;
    }
    notify::notify_subscribers(subscribers, id);
    Ok(StatusCode::NO_CONTENT)
}

// === Public template API ===

/// GET /api/v1/templates — public templates, filterable by `name`
/// and `des` substrings (AND-combined when both are given).
pub async fn list_public_templates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TemplateListQuery>,
) -> Result<Json<Vec<Template>>, ApiError> {
    let templates = state
        .store
        .list_public_templates(query.name.as_deref(), query.des.as_deref())
        .await?;
    Ok(Json(templates))
}

/// GET /api/v1/templates/:id — template detail under the sharing
/// rules: public, or secret_key with a matching `key` query param.
/// Anything else is a 404, including existing private templates.
pub async fn public_template_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<KeyQuery>,
) -> Result<Json<TemplateDetail>, ApiError> {
    let template = state
        .store
        .get_shared_template(&id, query.key.as_deref())
        .await?
        .ok_or_else(|| ApiError::not_found("template"))?;

    let vpn = match &template.vpn_id {
        Some(vpn_id) => state.store.get_vpn(vpn_id).await?,
        None => None,
    };
    Ok(Json(TemplateDetail { template, vpn }))
}

/// POST /api/v1/templates — create a template from a remote library
/// URL. Validation failures are reported back as
/// `{"template_errors": [...]}` with status 500, the dialect the
/// library speaks.
pub async fn create_external_template(
    State(state): State<Arc<AppState>>,
    Form(req): Form<ImportTemplateRequest>,
) -> Response {
    let data = match notify::fetch_remote_template(&req.url).await {
        Ok(data) => data,
        Err(e) => return template_errors(vec![format!("failed to fetch {}: {}", req.url, e)]),
    };

    let vpn_id = match import_vpn(&state, &data).await {
        Ok(vpn_id) => vpn_id,
        Err(e) => return template_errors(vec![e.message().to_string()]),
    };

    let request = CreateTemplateRequest {
        name: data.name.clone(),
        description: data.description.clone(),
        backend: data.backend.clone(),
        kind: data.kind.clone(),
        sharing: Some(sharing::IMPORT.to_string()),
        key: None,
        url: Some(req.url.clone()),
        config: data.config.clone(),
        default_values: data.default_values.clone(),
        vpn_id,
    };
    if let Err(e) = validate_template(&state, &request, None).await {
        return template_errors(vec![e.message().to_string()]);
    }

    let id = uuid::Uuid::new_v4().to_string();
    let template = match state.store.create_template(&id, &request).await {
        Ok(template) => template,
        Err(e) => return template_errors(vec![e.to_string()]),
    };

    // Subscribe to the origin so future changes reach this server.
    let remote_id = data.id.unwrap_or_else(|| template.id.clone());
    notify::subscribe_at_origin(req.url, remote_id, state.config.base_url.clone(), true);

    StatusCode::OK.into_response()
}

/// POST /api/v1/templates/subscription — upsert a TemplateSubscription
/// keyed on (template, subscriber). Re-subscribing flips the flag on
/// the existing record, never duplicates it.
pub async fn template_subscription(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SubscriptionForm>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .get_template(&form.template)
        .await?
        .ok_or_else(|| ApiError::not_found("template"))?;

    state
        .store
        .upsert_subscription(&form.template, &form.subscriber, form.subscribe)
        .await?;
    Ok(StatusCode::OK)
}

/// POST /api/v1/templates/synchronize — re-fetch an imported
/// template's remote source and re-save it.
pub async fn synchronize_template(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SynchronizeForm>,
) -> Response {
    let template = match state.store.get_template(&form.template_id).await {
        Ok(Some(template)) => template,
        Ok(None) => return ApiError::not_found("template").into_response(),
        Err(e) => return ApiError::from(e).into_response(),
    };
    let url = match &template.url {
        Some(url) => url.clone(),
        None => {
            return ApiError::bad_request("template has no import source").into_response();
        }
    };

    let data = match notify::fetch_remote_template(&url).await {
        Ok(data) => data,
        Err(e) => return template_errors(vec![format!("failed to fetch {}: {}", url, e)]),
    };

    let request = CreateTemplateRequest {
        name: template.name.clone(),
        description: data.description.clone(),
        backend: data.backend.clone(),
        kind: data.kind.clone(),
        sharing: Some(sharing::IMPORT.to_string()),
        key: template.key.clone(),
        url: template.url.clone(),
        config: data.config.clone(),
        default_values: data.default_values.clone(),
        vpn_id: template.vpn_id.clone(),
    };
    if let Err(e) = validate_template(&state, &request, Some(&template.id)).await {
        return template_errors(vec![e.message().to_string()]);
    }
    if let Err(e) = state.store.update_template(&template.id, &request).await {
        return template_errors(vec![e.to_string()]);
    }

    refresh_users(&state, &template.id).await;
    let remote_id = data.id.unwrap_or_else(|| template.id.clone());
    notify::subscribe_at_origin(url, remote_id, state.config.base_url.clone(), true);

    StatusCode::OK.into_response()
}

fn template_errors(errors: Vec<String>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(TemplateErrorResponse {
            template_errors: errors,
        }),
    )
        .into_response()
}

/// Find or create the VPN carried by imported template data.
async fn import_vpn(state: &Arc<AppState>, data: &RemoteTemplate) -> Result<Option<String>, ApiError> {
    let Some(remote_vpn) = &data.vpn else {
        return Ok(None);
    };
    if let Some(existing) = state.store.get_vpn_by_name(&remote_vpn.name).await? {
        return Ok(Some(existing.id));
    }

    let request = CreateVpnRequest {
        name: remote_vpn.name.clone(),
        host: remote_vpn.host.clone(),
        backend: remote_vpn.backend.clone(),
        ca: remote_vpn.ca.clone(),
        cert: remote_vpn.cert.clone(),
        config: remote_vpn.config.clone(),
    };
    let id = uuid::Uuid::new_v4().to_string();
    let vpn = state.store.create_vpn(&id, &request).await?;
    Ok(Some(vpn.id))
}

/// Recompose every device config built on a template.
async fn refresh_users(state: &Arc<AppState>, template_id: &str) {
    match state.store.device_ids_using_template(template_id).await {
        Ok(device_ids) => {
            for device_id in device_ids {
                refresh_device_config(state, &device_id).await;
            }
        }
        Err(e) => {
            tracing::warn!("Failed to list devices using template {}: {}", template_id, e);
        }
    }
}

/// Field-level validation of a template payload.
async fn validate_template(
    state: &Arc<AppState>,
    req: &CreateTemplateRequest,
    current_id: Option<&str>,
) -> Result<(), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    if let Some(existing) = state.store.get_template_by_name(&req.name).await? {
        if current_id != Some(existing.id.as_str()) {
            return Err(ApiError::conflict("template with this name already exists"));
        }
    }

    let backend = Backend::from_id(&req.backend)
        .ok_or_else(|| ApiError::bad_request("unknown backend identifier"))?;

    let kind = req.kind.as_deref().unwrap_or(template_kind::GENERIC);
    if !template_kind::is_valid(kind) {
        return Err(ApiError::bad_request("type must be one of: generic, vpn"));
    }
    let sharing_mode = req.sharing.as_deref().unwrap_or(sharing::PRIVATE);
    if !sharing::is_valid(sharing_mode) {
        return Err(ApiError::bad_request(
            "sharing must be one of: public, secret_key, import, private",
        ));
    }
    if sharing_mode == sharing::SECRET_KEY && req.key.as_deref().unwrap_or("").is_empty() {
        return Err(ApiError::bad_request("key is required when sharing is secret_key"));
    }
    if sharing_mode == sharing::IMPORT && req.url.as_deref().unwrap_or("").is_empty() {
        return Err(ApiError::bad_request("url is required when sharing is import"));
    }
    if kind == template_kind::VPN {
        let vpn_id = req
            .vpn_id
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("vpn is required when type is vpn"))?;
        state
            .store
            .get_vpn(vpn_id)
            .await?
            .ok_or_else(|| ApiError::bad_request(format!("unknown vpn: {}", vpn_id)))?;
    }

    if let Some(config) = &req.config {
        let fragment = tree::as_tree(config.clone()).map_err(ApiError::bad_request)?;
        // Malformed fragments are caught at authoring time, before any
        // device composition trips over them.
        backend.validate(&fragment).map_err(|e| {
            ApiError::unprocessable(e.message.clone())
                .with_detail(serde_json::json!({"kind": "validation-error", "path": e.path}))
        })?;
    }
    if let Some(defaults) = &req.default_values {
        if !defaults.is_object() {
            return Err(ApiError::bad_request("default_values must be a JSON object"));
        }
    }
    Ok(())
}
