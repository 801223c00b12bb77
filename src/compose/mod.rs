use std::collections::HashMap;

use anyhow::Result;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::backend::{Archive, Backend, ValidationError};
use crate::db::{NotFoundError, Store};
use crate::models::*;
use crate::tree::{self, ConfigTree};
use crate::vars::{self, VarContext};

/// Composition failure taxonomy. Preview and protocol handlers map the
/// variants to distinct HTTP outcomes.
#[derive(Debug)]
pub enum ComposeError {
    /// Unparsable caller-supplied config or context JSON.
    MalformedInput(String),
    /// A template id that does not resolve.
    UnknownTemplate(String),
    /// Two sources introduced the same top-level section.
    DuplicateKey {
        key: String,
        first: String,
        second: String,
    },
    /// Schema violation, annotated with the offending path.
    Validation(ValidationError),
    /// Render failed after successful validation. Internal.
    Render(String),
}

impl std::fmt::Display for ComposeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedInput(msg) => write!(f, "malformed input: {}", msg),
            Self::UnknownTemplate(id) => write!(f, "unknown template: {}", id),
            Self::DuplicateKey { key, first, second } => write!(
                f,
                "duplicate top-level key '{}' defined by both '{}' and '{}'",
                key, first, second
            ),
            Self::Validation(err) => write!(f, "validation failed at {}", err),
            Self::Render(msg) => write!(f, "render failed: {}", msg),
        }
    }
}

impl std::error::Error for ComposeError {}

/// Result of a successful composition: the merged+substituted tree and
/// the compiled archive.
#[derive(Debug, Clone)]
pub struct Composition {
    pub tree: ConfigTree,
    pub archive: Archive,
}

/// One template's contribution to a composition.
struct Layer {
    name: String,
    tree: ConfigTree,
    defaults: Map<String, Value>,
}

/// The composition pipeline over already-loaded inputs:
/// validate each layer in isolation, fold-merge with duplicate
/// detection, substitute variables, validate and render.
fn compose_layers(
    backend: Backend,
    base: ConfigTree,
    base_label: &str,
    layers: Vec<Layer>,
    system: VarContext,
    overrides: &Map<String, Value>,
) -> Result<Composition, ComposeError> {
    // Duplicate boundaries: the base registers its top-level
    // non-sequence keys first, then each template in order.
    let mut seen: HashMap<String, String> = tree::boundary_keys(&base)
        .map(|k| (k.to_string(), base_label.to_string()))
        .collect();

    let mut merged = base;
    let mut context = system;

    for layer in &layers {
        for key in tree::boundary_keys(&layer.tree) {
            if let Some(first) = seen.get(key) {
                return Err(ComposeError::DuplicateKey {
                    key: key.to_string(),
                    first: first.clone(),
                    second: layer.name.clone(),
                });
            }
            seen.insert(key.to_string(), layer.name.clone());
        }
        tree::merge_into(&mut merged, &layer.tree);
        vars::overlay(&mut context, &layer.defaults);
    }
    vars::overlay(&mut context, overrides);

    let mut rendered = Value::Object(merged);
    vars::substitute(&mut rendered, &context);
    let rendered = match rendered {
        Value::Object(map) => map,
        _ => unreachable!("substitution preserves the tree shape"),
    };

    backend
        .validate(&rendered)
        .map_err(ComposeError::Validation)?;
    let archive = backend
        .render(&rendered)
        .map_err(ComposeError::Render)?;

    Ok(Composition {
        tree: rendered,
        archive,
    })
}

/// Composer drives compositions against the store and memoizes
/// compiled archives per config, keyed by checksum.
pub struct Composer {
    store: Store,
    cache: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

impl Composer {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Compose a stored device's configuration.
    /// Composition failures carry a downcastable [`ComposeError`].
    pub async fn compose_device(
        &self,
        device: &Device,
        config: &DeviceConfig,
    ) -> Result<Composition> {
        let backend = Backend::from_id(&config.backend).ok_or_else(|| {
            ComposeError::Validation(ValidationError::new("backend", "unknown backend identifier"))
        })?;
        let base = tree_field(&config.config, "config")?;
        let overrides = object_field(&config.context, "context")?;
        let layers = self.load_layers(&config.templates).await?;
        let system = vars::system_context(&device.id, &device.key, &device.name);

        Ok(compose_layers(backend, base, &device.name, layers, system, &overrides)?)
    }

    /// Preview composition over transient, caller-supplied input.
    /// Nothing is persisted and no device needs to exist.
    pub async fn preview(&self, req: &ConfigPreviewRequest) -> Result<Composition> {
        let backend = Backend::from_id(&req.backend).ok_or_else(|| {
            ComposeError::Validation(ValidationError::new("backend", "unknown backend identifier"))
        })?;
        let base = match req.config.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                tree::parse_tree(raw).map_err(ComposeError::MalformedInput)?
            }
            _ => ConfigTree::new(),
        };
        let overrides = match req.context.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                tree::parse_tree(raw).map_err(ComposeError::MalformedInput)?
            }
            _ => Map::new(),
        };
        let layers = self.load_layers(&req.templates).await?;
        let system = vars::system_context(
            req.id.as_deref().unwrap_or(""),
            req.key.as_deref().unwrap_or(""),
            req.name.as_deref().unwrap_or(""),
        );
        let base_label = req.name.clone().unwrap_or_else(|| "config".to_string());

        Ok(compose_layers(backend, base, &base_label, layers, system, &overrides)?)
    }

    /// Recompute and cache a device's checksum after a mutation.
    /// The stored checksum only changes when the archive did; an
    /// unchanged recompile leaves the row (and its status) untouched.
    pub async fn refresh(&self, device_id: &str) -> Result<String> {
        let device = self
            .store
            .get_device(device_id)
            .await?
            .ok_or_else(|| NotFoundError::new("Device", device_id))?;
        let config = self
            .store
            .get_config_for_device(device_id)
            .await?
            .ok_or_else(|| NotFoundError::new("Config", device_id))?;

        let composition = self.compose_device(&device, &config).await?;
        let checksum = composition.archive.checksum.clone();
        self.store
            .refresh_config_checksum(&config.id, &checksum)
            .await?;

        let mut cache = self.cache.lock().await;
        cache.insert(config.id, (checksum.clone(), composition.archive.data));
        Ok(checksum)
    }

    /// The compiled archive for a device: served from the memo when the
    /// cached checksum still matches, recompiled on demand otherwise.
    pub async fn archive_for_device(
        &self,
        device: &Device,
        config: &DeviceConfig,
    ) -> Result<(String, Vec<u8>)> {
        if let Some(checksum) = &config.checksum {
            let cache = self.cache.lock().await;
            if let Some((cached_checksum, data)) = cache.get(&config.id) {
                if cached_checksum == checksum {
                    return Ok((cached_checksum.clone(), data.clone()));
                }
            }
        }

        let composition = self.compose_device(device, config).await?;
        let checksum = composition.archive.checksum.clone();
        self.store
            .refresh_config_checksum(&config.id, &checksum)
            .await?;

        let mut cache = self.cache.lock().await;
        cache.insert(
            config.id.clone(),
            (checksum.clone(), composition.archive.data.clone()),
        );
        Ok((checksum, composition.archive.data))
    }

    /// Drop the memoized archive of a deleted config.
    pub async fn evict(&self, config_id: &str) {
        self.cache.lock().await.remove(config_id);
    }

    async fn load_layers(&self, template_ids: &[String]) -> Result<Vec<Layer>> {
        let mut layers = Vec::with_capacity(template_ids.len());
        for id in template_ids {
            let template = self
                .store
                .get_template(id)
                .await?
                .ok_or_else(|| ComposeError::UnknownTemplate(id.clone()))?;

            let mut layer_tree = tree_field(&template.config, &template.name)?;
            // A VPN template renders on top of its VPN's tree fragment.
            if let Some(vpn_id) = &template.vpn_id {
                if let Some(vpn) = self.store.get_vpn(vpn_id).await? {
                    let mut vpn_tree = tree_field(&vpn.config, &vpn.name)?;
                    tree::merge_into(&mut vpn_tree, &layer_tree);
                    layer_tree = vpn_tree;
                }
            }

            let defaults = object_field(&template.default_values, &template.name)?;
            layers.push(Layer {
                name: template.name,
                tree: layer_tree,
                defaults,
            });
        }
        Ok(layers)
    }
}

fn tree_field(value: &Value, label: &str) -> Result<ConfigTree, ComposeError> {
    tree::as_tree(value.clone())
        .map_err(|msg| ComposeError::Validation(ValidationError::new(label, msg)))
}

fn object_field(value: &Value, label: &str) -> Result<Map<String, Value>, ComposeError> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| ComposeError::Validation(ValidationError::new(label, "must be a JSON object")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::as_tree;
    use serde_json::json;

    fn layer(name: &str, tree: Value) -> Layer {
        Layer {
            name: name.to_string(),
            tree: as_tree(tree).unwrap(),
            defaults: Map::new(),
        }
    }

    fn layer_with_defaults(name: &str, tree: Value, defaults: Value) -> Layer {
        Layer {
            name: name.to_string(),
            tree: as_tree(tree).unwrap(),
            defaults: defaults.as_object().unwrap().clone(),
        }
    }

    fn system() -> VarContext {
        vars::system_context("dev-id", "dev-key", "dev-name")
    }

    #[test]
    fn test_composition_is_deterministic() {
        let base = as_tree(json!({"interfaces": [{"name": "lo0", "type": "loopback"}]})).unwrap();
        let layers = || {
            vec![layer(
                "dhcp",
                json!({"interfaces": [{"name": "eth0", "type": "ethernet", "proto": "dhcp"}]}),
            )]
        };
        let a = compose_layers(Backend::OpenWrt, base.clone(), "d", layers(), system(), &Map::new())
            .unwrap();
        let b = compose_layers(Backend::OpenWrt, base, "d", layers(), system(), &Map::new())
            .unwrap();
        assert_eq!(a.archive.checksum, b.archive.checksum);
        assert_eq!(a.archive.data, b.archive.data);
    }

    #[test]
    fn test_base_and_template_interfaces_both_present() {
        // base lo0 + template eth0: sequences concatenate, archive compiles
        let base = as_tree(json!({"interfaces": [{"name": "lo0", "type": "loopback"}]})).unwrap();
        let layers = vec![layer(
            "dhcp",
            json!({"interfaces": [{"name": "eth0", "type": "ethernet", "proto": "dhcp"}]}),
        )];
        let result =
            compose_layers(Backend::OpenWrt, base, "d", layers, system(), &Map::new()).unwrap();

        let interfaces = result.tree["interfaces"].as_array().unwrap();
        assert_eq!(interfaces.len(), 2);
        assert!(!result.archive.checksum.is_empty());
    }

    #[test]
    fn test_swapping_sequence_templates_changes_order() {
        let t1 = json!({"dns_servers": ["10.0.0.1"]});
        let t2 = json!({"dns_servers": ["10.0.0.2"]});

        let forward = compose_layers(
            Backend::OpenWrt,
            ConfigTree::new(),
            "d",
            vec![layer("t1", t1.clone()), layer("t2", t2.clone())],
            system(),
            &Map::new(),
        )
        .unwrap();
        let reverse = compose_layers(
            Backend::OpenWrt,
            ConfigTree::new(),
            "d",
            vec![layer("t2", t2), layer("t1", t1)],
            system(),
            &Map::new(),
        )
        .unwrap();

        assert_eq!(forward.tree["dns_servers"], json!(["10.0.0.1", "10.0.0.2"]));
        assert_eq!(reverse.tree["dns_servers"], json!(["10.0.0.2", "10.0.0.1"]));
        assert_ne!(forward.archive.checksum, reverse.archive.checksum);
    }

    #[test]
    fn test_disjoint_templates_swap_freely() {
        let t1 = json!({"general": {"hostname": "x"}});
        let t2 = json!({"dns_servers": ["10.0.0.2"]});

        let forward = compose_layers(
            Backend::OpenWrt,
            ConfigTree::new(),
            "d",
            vec![layer("t1", t1.clone()), layer("t2", t2.clone())],
            system(),
            &Map::new(),
        )
        .unwrap();
        let reverse = compose_layers(
            Backend::OpenWrt,
            ConfigTree::new(),
            "d",
            vec![layer("t2", t2), layer("t1", t1)],
            system(),
            &Map::new(),
        )
        .unwrap();
        assert_eq!(forward.archive.checksum, reverse.archive.checksum);
    }

    #[test]
    fn test_duplicate_key_names_both_templates() {
        let conflicting = json!({"general": {"hostname": "x"}});
        let err = compose_layers(
            Backend::OpenWrt,
            ConfigTree::new(),
            "d",
            vec![layer("first", conflicting.clone()), layer("second", conflicting)],
            system(),
            &Map::new(),
        )
        .unwrap_err();

        match err {
            ComposeError::DuplicateKey { key, first, second } => {
                assert_eq!(key, "general");
                assert_eq!(first, "first");
                assert_eq!(second, "second");
            }
            other => panic!("expected duplicate-key error, got {}", other),
        }
    }

    #[test]
    fn test_base_config_conflicts_like_a_template() {
        let base = as_tree(json!({"general": {"hostname": "x"}})).unwrap();
        let err = compose_layers(
            Backend::OpenWrt,
            base,
            "node1",
            vec![layer("tmpl", json!({"general": {"hostname": "y"}}))],
            system(),
            &Map::new(),
        )
        .unwrap_err();

        match err {
            ComposeError::DuplicateKey { first, second, .. } => {
                assert_eq!(first, "node1");
                assert_eq!(second, "tmpl");
            }
            other => panic!("expected duplicate-key error, got {}", other),
        }
    }

    #[test]
    fn test_context_override_precedence() {
        // template default ip loses to the device-level context
        let layers = vec![layer_with_defaults(
            "tmpl",
            json!({"interfaces": [{"name": "eth0", "type": "ethernet", "addresses": [
                {"family": "ipv4", "proto": "static", "address": "{{ ip }}", "mask": 24}
            ]}]}),
            json!({"ip": "10.0.0.1"}),
        )];
        let overrides = json!({"ip": "192.168.1.1"});
        let result = compose_layers(
            Backend::OpenWrt,
            ConfigTree::new(),
            "d",
            layers,
            system(),
            overrides.as_object().unwrap(),
        )
        .unwrap();

        assert_eq!(
            result.tree["interfaces"][0]["addresses"][0]["address"],
            "192.168.1.1"
        );
        let (_, network) = &result.archive.files[0];
        assert!(network.contains("192.168.1.1"));
    }

    #[test]
    fn test_unresolved_placeholder_passes_through() {
        let base = as_tree(json!({"general": {"description": "{{ unknown_var }}"}})).unwrap();
        let result =
            compose_layers(Backend::OpenWrt, base, "d", Vec::new(), system(), &Map::new()).unwrap();
        assert_eq!(result.tree["general"]["description"], "{{ unknown_var }}");
    }

    #[test]
    fn test_system_variables_resolve() {
        let base = as_tree(json!({"general": {
            "description": "id {{ id }} key {{ key }} name {{ name }}"
        }}))
        .unwrap();
        let result =
            compose_layers(Backend::OpenWrt, base, "d", Vec::new(), system(), &Map::new()).unwrap();
        assert_eq!(
            result.tree["general"]["description"],
            "id dev-id key dev-key name dev-name"
        );
    }

    #[test]
    fn test_validation_failure_carries_path() {
        let base = as_tree(json!({"interfaces": {"wrong": "wrong"}})).unwrap();
        let err = compose_layers(Backend::OpenWrt, base, "d", Vec::new(), system(), &Map::new())
            .unwrap_err();
        match err {
            ComposeError::Validation(inner) => assert_eq!(inner.path, "interfaces"),
            other => panic!("expected validation error, got {}", other),
        }
    }
}
