use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque reference to a certificate-subsystem entity. Only identity
/// and validity are tracked; rotating a certificate therefore changes
/// the content hash of every template built on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertRef {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub validity_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub validity_end: Option<DateTime<Utc>>,
}

/// Vpn holds the server-side parameters a VPN template renders from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vpn {
    pub id: String,
    pub name: String,
    pub host: String,
    pub backend: String,
    pub ca: CertRef,
    pub cert: CertRef,
    pub config: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// CreateVpnRequest for the admin API.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVpnRequest {
    pub name: String,
    pub host: String,
    pub backend: String,
    pub ca: CertRef,
    pub cert: CertRef,
    #[serde(default)]
    pub config: Option<Value>,
}
