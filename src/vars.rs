use std::collections::HashMap;

use serde_json::{Map, Value};

/// Substitution context: flat string-keyed variable map.
pub type VarContext = HashMap<String, String>;

/// System-defined variables, always present. Derived from the owning
/// device when there is one, otherwise from preview-supplied fields.
pub fn system_context(id: &str, key: &str, name: &str) -> VarContext {
    let mut ctx = VarContext::new();
    ctx.insert("id".to_string(), id.to_string());
    ctx.insert("key".to_string(), key.to_string());
    ctx.insert("name".to_string(), name.to_string());
    ctx
}

/// Overlay a JSON map onto the context. Later overlays win, so callers
/// apply template default_values in attachment order and the config's
/// own context overrides last.
pub fn overlay(ctx: &mut VarContext, values: &Map<String, Value>) {
    for (key, value) in values {
        ctx.insert(key.clone(), scalar_to_string(value));
    }
}

/// Replace `{{ variable }}` placeholders in every string scalar of the
/// tree. Placeholders whose variable is absent from the context are left
/// verbatim; previews with unset optional variables still render.
pub fn substitute(value: &mut Value, ctx: &VarContext) {
    match value {
        Value::String(s) => {
            if s.contains("{{") {
                *s = substitute_str(s, ctx);
            }
        }
        Value::Array(items) => {
            for item in items {
                substitute(item, ctx);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                substitute(item, ctx);
            }
        }
        _ => {}
    }
}

fn substitute_str(input: &str, ctx: &VarContext) -> String {
    let placeholder = regex_lite::Regex::new(r"\{\{\s*(\w+)\s*\}\}")
        .expect("placeholder pattern is valid");
    placeholder
        .replace_all(input, |caps: &regex_lite::Captures| {
            let name = &caps[1];
            match ctx.get(name) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
