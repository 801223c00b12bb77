use serde_json::Value;

use crate::tree::ConfigTree;

/// Render a validated tree into UCI package files.
pub fn render(tree: &ConfigTree) -> Result<Vec<(String, String)>, String> {
    let mut files = Vec::new();

    if let Some(general) = tree.get("general").and_then(Value::as_object) {
        if !general.is_empty() {
            files.push(("etc/config/system".to_string(), render_system(general)));
        }
    }

    let interfaces = tree.get("interfaces").and_then(Value::as_array);
    let dns_servers = tree.get("dns_servers").and_then(Value::as_array);
    if interfaces.map_or(false, |i| !i.is_empty()) || dns_servers.map_or(false, |d| !d.is_empty())
    {
        files.push((
            "etc/config/network".to_string(),
            render_network(
                interfaces.map(Vec::as_slice).unwrap_or(&[]),
                dns_servers.map(Vec::as_slice).unwrap_or(&[]),
            )?,
        ));
    }

    if let Some(radios) = tree.get("radios").and_then(Value::as_array) {
        if !radios.is_empty() {
            files.push(("etc/config/wireless".to_string(), render_wireless(radios)?));
        }
    }

    for section in ["openvpn", "wireguard"] {
        if let Some(items) = tree.get(section).and_then(Value::as_array) {
            if !items.is_empty() {
                files.push((
                    format!("etc/config/{}", section),
                    render_named_sections(section, items)?,
                ));
            }
        }
    }

    Ok(files)
}

fn render_system(general: &serde_json::Map<String, Value>) -> String {
    let mut out = String::from("package system\n\nconfig system\n");
    for (key, value) in general {
        if let Some(text) = scalar_text(value) {
            push_option(&mut out, key, &text);
        }
    }
    out
}

fn render_network(interfaces: &[Value], dns_servers: &[Value]) -> Result<String, String> {
    let mut out = String::from("package network\n");

    for interface in interfaces {
        let map = interface
            .as_object()
            .ok_or_else(|| "interface entry is not an object".to_string())?;
        let name = map
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| "interface entry has no name".to_string())?;

        out.push_str(&format!("\nconfig interface '{}'\n", name));
        for (key, value) in map {
            if key == "name" || key == "addresses" {
                continue;
            }
            if let Some(text) = scalar_text(value) {
                push_option(&mut out, key, &text);
            }
        }
        if let Some(addresses) = map.get("addresses").and_then(Value::as_array) {
            let mut dhcp = false;
            for address in addresses {
                let addr = address
                    .as_object()
                    .ok_or_else(|| "address entry is not an object".to_string())?;
                match addr.get("proto").and_then(Value::as_str) {
                    Some("static") => {
                        let ip = addr.get("address").and_then(Value::as_str).unwrap_or("");
                        let mask = addr.get("mask").and_then(Value::as_u64).unwrap_or(0);
                        out.push_str(&format!("\tlist address '{}/{}'\n", ip, mask));
                    }
                    _ => dhcp = true,
                }
            }
            if dhcp && !map.contains_key("proto") {
                push_option(&mut out, "proto", "dhcp");
            }
        }
    }

    if !dns_servers.is_empty() {
        out.push_str("\nconfig dns\n");
        for server in dns_servers {
            if let Some(text) = scalar_text(server) {
                out.push_str(&format!("\tlist server '{}'\n", text));
            }
        }
    }

    Ok(out)
}

fn render_wireless(radios: &[Value]) -> Result<String, String> {
    let mut out = String::from("package wireless\n");
    for radio in radios {
        let map = radio
            .as_object()
            .ok_or_else(|| "radio entry is not an object".to_string())?;
        let name = map
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| "radio entry has no name".to_string())?;
        out.push_str(&format!("\nconfig wifi-device '{}'\n", name));
        for (key, value) in map {
            if key == "name" {
                continue;
            }
            if let Some(text) = scalar_text(value) {
                push_option(&mut out, key, &text);
            }
        }
    }
    Ok(out)
}

fn render_named_sections(section: &str, items: &[Value]) -> Result<String, String> {
    let mut out = format!("package {}\n", section);
    for item in items {
        let map = item
            .as_object()
            .ok_or_else(|| format!("{} entry is not an object", section))?;
        let name = map
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("{} entry has no name", section))?;
        out.push_str(&format!("\nconfig {} '{}'\n", section, name));
        for (key, value) in map {
            if key == "name" {
                continue;
            }
            if let Some(text) = scalar_text(value) {
                push_option(&mut out, key, &text);
            }
        }
    }
    Ok(out)
}

fn push_option(out: &mut String, key: &str, value: &str) {
    out.push_str(&format!("\toption {} '{}'\n", key, value));
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1".to_string() } else { "0".to_string() }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::as_tree;
    use serde_json::json;

    #[test]
    fn test_network_file_contains_all_interfaces() {
        let tree = as_tree(json!({
            "interfaces": [
                {"name": "lo0", "type": "loopback"},
                {"name": "eth0", "type": "ethernet", "proto": "dhcp"}
            ]
        }))
        .unwrap();
        let files = render(&tree).unwrap();
        assert_eq!(files.len(), 1);
        let (name, content) = &files[0];
        assert_eq!(name, "etc/config/network");
        assert!(content.contains("config interface 'lo0'"));
        assert!(content.contains("config interface 'eth0'"));
        assert!(content.contains("option proto 'dhcp'"));
    }

    #[test]
    fn test_static_addresses_render_as_list_entries() {
        let tree = as_tree(json!({
            "interfaces": [{
                "name": "lan", "type": "ethernet",
                "addresses": [{"family": "ipv4", "proto": "static",
                               "address": "192.168.1.1", "mask": 24}]
            }]
        }))
        .unwrap();
        let files = render(&tree).unwrap();
        assert!(files[0].1.contains("list address '192.168.1.1/24'"));
    }

    #[test]
    fn test_empty_tree_renders_no_files() {
        let tree = as_tree(json!({})).unwrap();
        assert!(render(&tree).unwrap().is_empty());
    }

    #[test]
    fn test_system_and_wireless_files() {
        let tree = as_tree(json!({
            "general": {"hostname": "node1", "timezone": "UTC"},
            "radios": [{"name": "radio0", "channel": 36, "protocol": "802.11ac"}]
        }))
        .unwrap();
        let files = render(&tree).unwrap();
        let names: Vec<&str> = files.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["etc/config/system", "etc/config/wireless"]);
        assert!(files[0].1.contains("option hostname 'node1'"));
        assert!(files[1].1.contains("config wifi-device 'radio0'"));
        assert!(files[1].1.contains("option channel '36'"));
    }
}
