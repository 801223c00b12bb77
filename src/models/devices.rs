use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Device represents a managed network device. Every device owns
/// exactly one Config; the config never outlives its device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub mac_address: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub hardware_id: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub model: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub os: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub notes: String,
    /// Shared secret authorizing the synchronization protocol.
    /// Generated when absent, immutable afterwards.
    pub key: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub last_ip: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// DeviceConfig is the composed configuration owned by a Device:
/// a backend identifier, the base Config Tree, context overrides and
/// the ordered template attachments, plus the synchronization state
/// (status + cached checksum).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    pub device_id: String,
    pub backend: String,
    pub config: Value,
    pub context: Value,
    /// modified | applied | error
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub last_ip: String,
    /// Template ids in application order.
    pub templates: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Device plus its owned config, as served by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceDetail {
    #[serde(flatten)]
    pub device: Device,
    pub config: DeviceConfig,
}

/// CreateDeviceRequest for registering a device through the admin API.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDeviceRequest {
    pub name: String,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub hardware_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub notes: String,
    /// Optional explicit device key; generated when omitted.
    #[serde(default)]
    pub key: Option<String>,
    pub backend: String,
    #[serde(default)]
    pub config: Option<Value>,
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub templates: Vec<String>,
}

/// UpdateDeviceRequest mutates a device and its config. The device key
/// is immutable and absent here.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateDeviceRequest {
    pub name: String,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub hardware_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub notes: String,
    pub backend: String,
    #[serde(default)]
    pub config: Option<Value>,
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub templates: Vec<String>,
}

/// Preview request: transient config/context/templates, no persistence.
/// `config` and `context` arrive as JSON text so the engine can report
/// malformed input itself instead of failing in the extractor.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigPreviewRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    pub backend: String,
    #[serde(default)]
    pub config: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub templates: Vec<String>,
}

/// A single rendered native config file in a preview response.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewFile {
    pub name: String,
    pub content: String,
}

/// Preview response: the compiled archive contents and checksum.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigPreviewResponse {
    pub files: Vec<PreviewFile>,
    pub checksum: String,
}

/// Form body of the device report-status protocol operation.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportStatusForm {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Form body of the device register protocol operation.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub backend: Option<String>,
}

/// `?key=` query parameter shared by the protocol GET operations.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyQuery {
    #[serde(default)]
    pub key: Option<String>,
}
