use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::tree;
use crate::AppState;

use super::{created, refresh_device_config, ApiError};

const VPN_BACKENDS: &[&str] = &["openvpn", "wireguard"];

/// List all VPNs
pub async fn list_vpns(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Vpn>>, ApiError> {
    let vpns = state.store.list_vpns().await?;
    Ok(Json(vpns))
}

/// Get a single VPN by ID
pub async fn get_vpn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vpn>, ApiError> {
    let vpn = state
        .store
        .get_vpn(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("vpn"))?;
    Ok(Json(vpn))
}

/// Create a new VPN
pub async fn create_vpn(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateVpnRequest>,
) -> Result<(StatusCode, Json<Vpn>), ApiError> {
    validate_vpn(&req)?;
    if state.store.get_vpn_by_name(&req.name).await?.is_some() {
        return Err(ApiError::conflict("vpn with this name already exists"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let vpn = state.store.create_vpn(&id, &req).await?;
    Ok(created(vpn))
}

/// Update an existing VPN. A host change or certificate rotation
/// recomposes every device built on a template using this VPN.
pub async fn update_vpn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateVpnRequest>,
) -> Result<Json<Vpn>, ApiError> {
    validate_vpn(&req)?;
    if let Some(existing) = state.store.get_vpn_by_name(&req.name).await? {
        if existing.id != id {
            return Err(ApiError::conflict("vpn with this name already exists"));
        }
    }

    let vpn = state.store.update_vpn(&id, &req).await?;

    for template_id in state.store.template_ids_using_vpn(&id).await? {
        for device_id in state.store.device_ids_using_template(&template_id).await? {
            refresh_device_config(&state, &device_id).await;
        }
    }
    Ok(Json(vpn))
}

/// Delete a VPN. Refused while templates are still built on it.
pub async fn delete_vpn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.store.template_ids_using_vpn(&id).await?.is_empty() {
        return Err(ApiError::conflict("vpn is referenced by existing templates"));
    }
    state.store.delete_vpn(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn validate_vpn(req: &CreateVpnRequest) -> Result<(), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    if req.host.trim().is_empty() {
        return Err(ApiError::bad_request("host is required"));
    }
    if !VPN_BACKENDS.contains(&req.backend.as_str()) {
        return Err(ApiError::bad_request(format!(
            "backend must be one of: {}",
            VPN_BACKENDS.join(", ")
        )));
    }
    if let Some(config) = &req.config {
        tree::as_tree(config.clone()).map_err(ApiError::bad_request)?;
    }
    Ok(())
}
