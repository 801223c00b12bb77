use serde_json::Value;

use super::ValidationError;
use crate::tree::ConfigTree;

const INTERFACE_TYPES: &[&str] = &["loopback", "ethernet", "bridge", "wireless", "virtual"];
const PROTO_VALUES: &[&str] = &["static", "dhcp"];
const FAMILY_VALUES: &[&str] = &["ipv4", "ipv6"];

/// Validate the source tree shared by all dialects. Stops at the first
/// violation and reports the offending path.
///
/// Unknown top-level sections pass through; renderers skip them.
pub fn validate(tree: &ConfigTree) -> Result<(), ValidationError> {
    if let Some(general) = tree.get("general") {
        validate_general(general)?;
    }
    if let Some(interfaces) = tree.get("interfaces") {
        validate_interfaces(interfaces)?;
    }
    if let Some(radios) = tree.get("radios") {
        validate_radios(radios)?;
    }
    if let Some(dns) = tree.get("dns_servers") {
        validate_string_list("dns_servers", dns)?;
    }
    for section in ["openvpn", "wireguard"] {
        if let Some(value) = tree.get(section) {
            validate_named_sections(section, value)?;
        }
    }
    Ok(())
}

fn validate_general(value: &Value) -> Result<(), ValidationError> {
    let map = value
        .as_object()
        .ok_or_else(|| ValidationError::new("general", "must be an object"))?;
    if let Some(hostname) = map.get("hostname") {
        let hostname = hostname
            .as_str()
            .ok_or_else(|| ValidationError::new("general.hostname", "must be a string"))?;
        if hostname.is_empty() {
            return Err(ValidationError::new("general.hostname", "must not be empty"));
        }
        if hostname.contains(char::is_whitespace) {
            return Err(ValidationError::new(
                "general.hostname",
                "must not contain whitespace",
            ));
        }
    }
    Ok(())
}

fn validate_interfaces(value: &Value) -> Result<(), ValidationError> {
    let items = value
        .as_array()
        .ok_or_else(|| ValidationError::new("interfaces", "must be an array"))?;
    for (i, item) in items.iter().enumerate() {
        let path = format!("interfaces.{}", i);
        let map = item
            .as_object()
            .ok_or_else(|| ValidationError::new(&path, "must be an object"))?;

        let name = map
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::new(format!("{}.name", path), "is required"))?;
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(ValidationError::new(
                format!("{}.name", path),
                "must be a non-empty string without whitespace",
            ));
        }

        let iface_type = map
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::new(format!("{}.type", path), "is required"))?;
        if !INTERFACE_TYPES.contains(&iface_type) {
            return Err(ValidationError::new(
                format!("{}.type", path),
                format!("must be one of: {}", INTERFACE_TYPES.join(", ")),
            ));
        }

        if let Some(proto) = map.get("proto") {
            validate_choice(&format!("{}.proto", path), proto, PROTO_VALUES)?;
        }
        if let Some(addresses) = map.get("addresses") {
            validate_addresses(&path, addresses)?;
        }
    }
    Ok(())
}

fn validate_addresses(iface_path: &str, value: &Value) -> Result<(), ValidationError> {
    let items = value.as_array().ok_or_else(|| {
        ValidationError::new(format!("{}.addresses", iface_path), "must be an array")
    })?;
    for (i, item) in items.iter().enumerate() {
        let path = format!("{}.addresses.{}", iface_path, i);
        let map = item
            .as_object()
            .ok_or_else(|| ValidationError::new(&path, "must be an object"))?;

        if let Some(family) = map.get("family") {
            validate_choice(&format!("{}.family", path), family, FAMILY_VALUES)?;
        }
        let proto = map
            .get("proto")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::new(format!("{}.proto", path), "is required"))?;
        if !PROTO_VALUES.contains(&proto) {
            return Err(ValidationError::new(
                format!("{}.proto", path),
                format!("must be one of: {}", PROTO_VALUES.join(", ")),
            ));
        }
        if proto == "static" {
            let address = map
                .get("address")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ValidationError::new(format!("{}.address", path), "is required for static addresses")
                })?;
            if address.is_empty() {
                return Err(ValidationError::new(
                    format!("{}.address", path),
                    "must not be empty",
                ));
            }
            // Placeholders resolve before validation; a leftover {{ var }}
            // is still a legal preview value, so only shape is checked here.
            let mask = map.get("mask").ok_or_else(|| {
                ValidationError::new(format!("{}.mask", path), "is required for static addresses")
            })?;
            let mask = mask.as_u64().ok_or_else(|| {
                ValidationError::new(format!("{}.mask", path), "must be an integer")
            })?;
            if mask > 128 {
                return Err(ValidationError::new(
                    format!("{}.mask", path),
                    "must be between 0 and 128",
                ));
            }
        }
    }
    Ok(())
}

fn validate_radios(value: &Value) -> Result<(), ValidationError> {
    let items = value
        .as_array()
        .ok_or_else(|| ValidationError::new("radios", "must be an array"))?;
    for (i, item) in items.iter().enumerate() {
        let path = format!("radios.{}", i);
        let map = item
            .as_object()
            .ok_or_else(|| ValidationError::new(&path, "must be an object"))?;
        let name = map
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::new(format!("{}.name", path), "is required"))?;
        if name.is_empty() {
            return Err(ValidationError::new(format!("{}.name", path), "must not be empty"));
        }
        if let Some(channel) = map.get("channel") {
            if !channel.is_u64() {
                return Err(ValidationError::new(
                    format!("{}.channel", path),
                    "must be a non-negative integer",
                ));
            }
        }
    }
    Ok(())
}

fn validate_string_list(section: &str, value: &Value) -> Result<(), ValidationError> {
    let items = value
        .as_array()
        .ok_or_else(|| ValidationError::new(section, "must be an array"))?;
    for (i, item) in items.iter().enumerate() {
        if !item.is_string() {
            return Err(ValidationError::new(
                format!("{}.{}", section, i),
                "must be a string",
            ));
        }
    }
    Ok(())
}

fn validate_named_sections(section: &str, value: &Value) -> Result<(), ValidationError> {
    let items = value
        .as_array()
        .ok_or_else(|| ValidationError::new(section, "must be an array"))?;
    for (i, item) in items.iter().enumerate() {
        let path = format!("{}.{}", section, i);
        let map = item
            .as_object()
            .ok_or_else(|| ValidationError::new(&path, "must be an object"))?;
        let name = map
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::new(format!("{}.name", path), "is required"))?;
        if name.is_empty() {
            return Err(ValidationError::new(format!("{}.name", path), "must not be empty"));
        }
    }
    Ok(())
}

fn validate_choice(path: &str, value: &Value, allowed: &[&str]) -> Result<(), ValidationError> {
    let s = value
        .as_str()
        .ok_or_else(|| ValidationError::new(path, "must be a string"))?;
    if !allowed.contains(&s) {
        return Err(ValidationError::new(
            path,
            format!("must be one of: {}", allowed.join(", ")),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::as_tree;
    use serde_json::json;

    #[test]
    fn test_interfaces_must_be_array() {
        let tree = as_tree(json!({"interfaces": {"wrong": "wrong"}})).unwrap();
        let err = validate(&tree).unwrap_err();
        assert_eq!(err.path, "interfaces");
    }

    #[test]
    fn test_error_path_points_at_offending_node() {
        let tree = as_tree(json!({
            "interfaces": [
                {"name": "lo0", "type": "loopback", "addresses": [
                    {"family": "ipv4", "proto": "static", "address": "127.0.0.1", "mask": 8},
                    {"family": "ipv4", "proto": "static", "address": "10.0.0.1", "mask": "8"}
                ]}
            ]
        }))
        .unwrap();
        let err = validate(&tree).unwrap_err();
        assert_eq!(err.path, "interfaces.0.addresses.1.mask");
    }

    #[test]
    fn test_unknown_interface_type_rejected() {
        let tree = as_tree(json!({"interfaces": [{"name": "x", "type": "tunnel"}]})).unwrap();
        let err = validate(&tree).unwrap_err();
        assert_eq!(err.path, "interfaces.0.type");
    }

    #[test]
    fn test_unknown_sections_pass() {
        let tree = as_tree(json!({"custom_section": {"anything": 1}})).unwrap();
        assert!(validate(&tree).is_ok());
    }

    #[test]
    fn test_valid_tree_passes() {
        let tree = as_tree(json!({
            "general": {"hostname": "node1", "timezone": "UTC"},
            "interfaces": [
                {"name": "lo0", "type": "loopback"},
                {"name": "eth0", "type": "ethernet", "proto": "dhcp"}
            ],
            "radios": [{"name": "radio0", "protocol": "802.11ac", "channel": 36}],
            "dns_servers": ["10.0.0.1"]
        }))
        .unwrap();
        assert!(validate(&tree).is_ok());
    }
}
