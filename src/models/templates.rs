use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Vpn;

/// Template is a reusable, orderable configuration fragment attachable
/// to many devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub description: String,
    pub backend: String,
    /// generic | vpn
    #[serde(rename = "type")]
    pub kind: String,
    /// public | secret_key | import | private
    pub sharing: String,
    /// Access key, checked only when sharing = secret_key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Remote source, present when sharing = import.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub config: Value,
    pub default_values: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpn_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Template plus its owned VPN, as served by the public detail API.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateDetail {
    #[serde(flatten)]
    pub template: Template,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpn: Option<Vpn>,
}

/// CreateTemplateRequest for the admin API.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub backend: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub sharing: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub config: Option<Value>,
    #[serde(default)]
    pub default_values: Option<Value>,
    #[serde(default)]
    pub vpn_id: Option<String>,
}

/// Filters of the public template list endpoint. `name` and `des`
/// are substring matches, AND-combined when both are present.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateListQuery {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub des: Option<String>,
}

/// TemplateSubscription tracks a (template, subscriber URL) pair.
/// At most one record per pair; writes are upserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSubscription {
    pub id: String,
    pub template_id: String,
    pub subscriber: String,
    pub subscribe: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Form body of the subscription endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionForm {
    pub template: String,
    pub subscriber: String,
    #[serde(default)]
    pub subscribe: bool,
}

/// Form body of the synchronize endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SynchronizeForm {
    pub template_id: String,
}

/// Body of the external-template create endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportTemplateRequest {
    pub url: String,
}

/// Validation failures of the external-template create endpoint,
/// reported back to the template library with status 500.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateErrorResponse {
    pub template_errors: Vec<String>,
}

/// Template data fetched from a remote template library.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTemplate {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub backend: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub config: Option<Value>,
    #[serde(default)]
    pub default_values: Option<Value>,
    #[serde(default)]
    pub vpn: Option<RemoteVpn>,
}

/// VPN payload nested in remote template data. CA and certificate are
/// opaque references from the external certificate subsystem.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteVpn {
    pub name: String,
    pub host: String,
    pub backend: String,
    pub ca: super::CertRef,
    pub cert: super::CertRef,
    #[serde(default)]
    pub config: Option<Value>,
}
