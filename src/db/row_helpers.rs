use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Row};

use crate::models::*;

/// Decode a JSON text column, falling back to an empty object.
/// Columns default to '{}' so a decode failure means hand-edited data.
pub fn json_col(row: &SqliteRow, column: &str) -> Value {
    let raw: String = row.get(column);
    serde_json::from_str(&raw).unwrap_or_else(|_| Value::Object(Default::default()))
}

/// Filter empty strings to None — used when the DB stores '' instead of NULL
pub fn none_if_empty(opt: Option<String>) -> Option<String> {
    opt.filter(|s| !s.is_empty())
}

/// Map a SQLite row to a Device struct
pub fn map_device_row(row: &SqliteRow) -> Device {
    Device {
        id: row.get("id"),
        name: row.get("name"),
        mac_address: row.get("mac_address"),
        hardware_id: row.get("hardware_id"),
        model: row.get("model"),
        os: row.get("os"),
        notes: row.get("notes"),
        key: row.get("key"),
        last_ip: row.get("last_ip"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a DeviceConfig struct. Template ids are loaded
/// separately, in attachment order.
pub fn map_config_row(row: &SqliteRow) -> DeviceConfig {
    DeviceConfig {
        id: row.get("id"),
        device_id: row.get("device_id"),
        backend: row.get("backend"),
        config: json_col(row, "config"),
        context: json_col(row, "context"),
        status: row.get("status"),
        checksum: none_if_empty(row.get("checksum")),
        last_ip: row.get("last_ip"),
        templates: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a Template struct
pub fn map_template_row(row: &SqliteRow) -> Template {
    Template {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        backend: row.get("backend"),
        kind: row.get("type"),
        sharing: row.get("sharing"),
        key: none_if_empty(row.get("key")),
        url: none_if_empty(row.get("url")),
        config: json_col(row, "config"),
        default_values: json_col(row, "default_values"),
        vpn_id: none_if_empty(row.get("vpn_id")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a Vpn struct
pub fn map_vpn_row(row: &SqliteRow) -> Vpn {
    Vpn {
        id: row.get("id"),
        name: row.get("name"),
        host: row.get("host"),
        backend: row.get("backend"),
        ca: cert_ref_col(row, "ca"),
        cert: cert_ref_col(row, "cert"),
        config: json_col(row, "config"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn cert_ref_col(row: &SqliteRow, column: &str) -> CertRef {
    let raw: String = row.get(column);
    serde_json::from_str(&raw).unwrap_or(CertRef {
        id: String::new(),
        name: String::new(),
        validity_start: None,
        validity_end: None,
    })
}

/// Map a SQLite row to a TemplateSubscription struct
pub fn map_subscription_row(row: &SqliteRow) -> TemplateSubscription {
    let subscribe: i64 = row.get("subscribe");
    TemplateSubscription {
        id: row.get("id"),
        template_id: row.get("template_id"),
        subscriber: row.get("subscriber"),
        subscribe: subscribe != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
