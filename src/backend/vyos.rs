use serde_json::Value;

use crate::tree::ConfigTree;

/// Render a validated tree into a flat VyOS-style set-command script.
/// Single file, one `set` statement per leaf.
pub fn render(tree: &ConfigTree) -> Result<Vec<(String, String)>, String> {
    let mut out = String::new();

    if let Some(general) = tree.get("general").and_then(Value::as_object) {
        if let Some(hostname) = general.get("hostname").and_then(Value::as_str) {
            push_set(&mut out, &["system", "host-name"], hostname);
        }
        if let Some(timezone) = general.get("timezone").and_then(Value::as_str) {
            push_set(&mut out, &["system", "time-zone"], timezone);
        }
        for (key, value) in general {
            if key == "hostname" || key == "timezone" {
                continue;
            }
            if let Some(text) = scalar_text(value) {
                push_set(&mut out, &["system", key.as_str()], &text);
            }
        }
    }

    if let Some(servers) = tree.get("dns_servers").and_then(Value::as_array) {
        for server in servers {
            if let Some(text) = scalar_text(server) {
                push_set(&mut out, &["system", "name-server"], &text);
            }
        }
    }

    if let Some(interfaces) = tree.get("interfaces").and_then(Value::as_array) {
        for interface in interfaces {
            render_interface(&mut out, interface)?;
        }
    }

    if let Some(radios) = tree.get("radios").and_then(Value::as_array) {
        for radio in radios {
            render_named(&mut out, "wireless", radio)?;
        }
    }
    for section in ["openvpn", "wireguard"] {
        if let Some(items) = tree.get(section).and_then(Value::as_array) {
            for item in items {
                render_named(&mut out, &format!("interfaces {}", section), item)?;
            }
        }
    }

    if out.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![("config/commands".to_string(), out)])
}

fn render_interface(out: &mut String, interface: &Value) -> Result<(), String> {
    let map = interface
        .as_object()
        .ok_or_else(|| "interface entry is not an object".to_string())?;
    let name = map
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| "interface entry has no name".to_string())?;
    let class = match map.get("type").and_then(Value::as_str).unwrap_or("") {
        "loopback" => "loopback",
        "bridge" => "bridge",
        "wireless" => "wireless",
        "virtual" => "dummy",
        _ => "ethernet",
    };
    let prefix = format!("interfaces {} {}", class, name);

    // Bare declaration so empty interfaces still appear in the script.
    out.push_str(&format!("set {}\n", prefix));

    for (key, value) in map {
        if key == "name" || key == "type" || key == "addresses" {
            continue;
        }
        if let Some(text) = scalar_text(value) {
            push_set(out, &[prefix.as_str(), key.as_str()], &text);
        }
    }
    if let Some(addresses) = map.get("addresses").and_then(Value::as_array) {
        for address in addresses {
            let addr = address
                .as_object()
                .ok_or_else(|| "address entry is not an object".to_string())?;
            match addr.get("proto").and_then(Value::as_str) {
                Some("static") => {
                    let ip = addr.get("address").and_then(Value::as_str).unwrap_or("");
                    let mask = addr.get("mask").and_then(Value::as_u64).unwrap_or(0);
                    push_set(out, &[prefix.as_str(), "address"], &format!("{}/{}", ip, mask));
                }
                _ => push_set(out, &[prefix.as_str(), "address"], "dhcp"),
            }
        }
    }
    Ok(())
}

fn render_named(out: &mut String, class: &str, item: &Value) -> Result<(), String> {
    let map = item
        .as_object()
        .ok_or_else(|| format!("{} entry is not an object", class))?;
    let name = map
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| format!("{} entry has no name", class))?;
    let prefix = format!("{} {}", class, name);
    for (key, value) in map {
        if key == "name" {
            continue;
        }
        if let Some(text) = scalar_text(value) {
            push_set(out, &[prefix.as_str(), key.as_str()], &text);
        }
    }
    Ok(())
}

fn push_set(out: &mut String, path: &[&str], value: &str) {
    out.push_str(&format!("set {} '{}'\n", path.join(" "), value));
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::as_tree;
    use serde_json::json;

    #[test]
    fn test_set_commands_for_interfaces() {
        let tree = as_tree(json!({
            "interfaces": [{
                "name": "eth0", "type": "ethernet",
                "addresses": [{"family": "ipv4", "proto": "static",
                               "address": "10.0.0.1", "mask": 8}]
            }]
        }))
        .unwrap();
        let files = render(&tree).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "config/commands");
        assert!(files[0].1.contains("set interfaces ethernet eth0 address '10.0.0.1/8'"));
    }

    #[test]
    fn test_hostname_and_dns() {
        let tree = as_tree(json!({
            "general": {"hostname": "gw1"},
            "dns_servers": ["10.0.0.53"]
        }))
        .unwrap();
        let script = &render(&tree).unwrap()[0].1;
        assert!(script.contains("set system host-name 'gw1'"));
        assert!(script.contains("set system name-server '10.0.0.53'"));
    }

    #[test]
    fn test_loopback_maps_to_loopback_class() {
        let tree = as_tree(json!({"interfaces": [{"name": "lo0", "type": "loopback"}]})).unwrap();
        let script = &render(&tree).unwrap()[0].1;
        assert!(script.contains("set interfaces loopback lo0"));
    }

    #[test]
    fn test_empty_tree_renders_nothing() {
        let tree = as_tree(json!({})).unwrap();
        assert!(render(&tree).unwrap().is_empty());
    }
}
