use serde_json::{Map, Value};

/// A Config Tree is a JSON object of named top-level sections
/// (interfaces, radios, general, ...) holding nested maps, lists
/// and scalars.
pub type ConfigTree = Map<String, Value>;

/// Parse a JSON string into a Config Tree.
/// Rejects anything that is not a JSON object at the top level.
pub fn parse_tree(raw: &str) -> Result<ConfigTree, String> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {}", e))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(format!(
            "configuration must be a JSON object, got {}",
            type_name(&other)
        )),
    }
}

/// Convert an already-parsed JSON value into a Config Tree.
pub fn as_tree(value: Value) -> Result<ConfigTree, String> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(format!(
            "configuration must be a JSON object, got {}",
            type_name(&other)
        )),
    }
}

/// Deep-merge `addition` into `base`.
///
/// Sequences under the same key are concatenated (base elements first),
/// nested mappings are merged recursively, and scalars from `addition`
/// override `base`. Folding an ordered template list through this
/// function is associative and order-dependent: swapping two templates
/// that touch the same sequence key swaps the element order.
pub fn merge_into(base: &mut ConfigTree, addition: &ConfigTree) {
    for (key, value) in addition {
        match base.get_mut(key) {
            Some(existing) => merge_value(existing, value),
            None => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn merge_value(base: &mut Value, addition: &Value) {
    match (base, addition) {
        (Value::Array(base_items), Value::Array(add_items)) => {
            base_items.extend(add_items.iter().cloned());
        }
        (Value::Object(base_map), Value::Object(add_map)) => {
            for (key, value) in add_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_slot, _) => {
            *base_slot = addition.clone();
        }
    }
}

/// Top-level keys of a tree that act as duplicate-detection boundaries.
/// Sequence-valued sections are exempt: they concatenate across sources.
pub fn boundary_keys(tree: &ConfigTree) -> impl Iterator<Item = &str> {
    tree.iter()
        .filter(|(_, v)| !v.is_array())
        .map(|(k, _)| k.as_str())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: Value) -> ConfigTree {
        as_tree(value).unwrap()
    }

    #[test]
    fn test_parse_tree_rejects_non_objects() {
        assert!(parse_tree("{}").is_ok());
        assert!(parse_tree("[]").is_err());
        assert!(parse_tree("WRONG").is_err());
        assert!(parse_tree("42").is_err());
    }

    #[test]
    fn test_merge_concatenates_sequences() {
        let mut base = tree(json!({"interfaces": [{"name": "lo0", "type": "loopback"}]}));
        let addition = tree(json!({"interfaces": [{"name": "eth0", "type": "ethernet"}]}));
        merge_into(&mut base, &addition);

        let interfaces = base["interfaces"].as_array().unwrap();
        assert_eq!(interfaces.len(), 2);
        assert_eq!(interfaces[0]["name"], "lo0");
        assert_eq!(interfaces[1]["name"], "eth0");
    }

    #[test]
    fn test_merge_recurses_into_mappings() {
        let mut base = tree(json!({"general": {"hostname": "a", "timezone": "UTC"}}));
        let addition = tree(json!({"general": {"hostname": "b"}}));
        merge_into(&mut base, &addition);

        assert_eq!(base["general"]["hostname"], "b");
        assert_eq!(base["general"]["timezone"], "UTC");
    }

    #[test]
    fn test_merge_order_dependent_for_sequences() {
        let t1 = tree(json!({"dns_servers": ["10.0.0.1"]}));
        let t2 = tree(json!({"dns_servers": ["10.0.0.2"]}));

        let mut forward = ConfigTree::new();
        merge_into(&mut forward, &t1);
        merge_into(&mut forward, &t2);
        let mut reverse = ConfigTree::new();
        merge_into(&mut reverse, &t2);
        merge_into(&mut reverse, &t1);

        assert_eq!(forward["dns_servers"], json!(["10.0.0.1", "10.0.0.2"]));
        assert_eq!(reverse["dns_servers"], json!(["10.0.0.2", "10.0.0.1"]));
    }

    #[test]
    fn test_boundary_keys_skip_sequences() {
        let t = tree(json!({
            "interfaces": [],
            "general": {"hostname": "x"},
            "wan_enabled": true
        }));
        let mut keys: Vec<&str> = boundary_keys(&t).collect();
        keys.sort();
        assert_eq!(keys, vec!["general", "wan_enabled"]);
    }
}
