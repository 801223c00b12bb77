mod archive;
mod openwrt;
mod schema;
mod vyos;

use serde::Serialize;

use crate::tree::ConfigTree;

pub use archive::Archive;

/// Canonical backend identifiers.
pub mod backend_id {
    pub const OPENWRT: &str = "openwrt";
    pub const VYOS: &str = "vyos";

    pub const ALL: &[&str] = &[OPENWRT, VYOS];
}

/// A configuration-management dialect the engine can compile to.
///
/// Closed set: unknown identifiers are rejected when a config or
/// template is created, never at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    OpenWrt,
    Vyos,
}

impl Backend {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            backend_id::OPENWRT => Some(Self::OpenWrt),
            backend_id::VYOS => Some(Self::Vyos),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::OpenWrt => backend_id::OPENWRT,
            Self::Vyos => backend_id::VYOS,
        }
    }

    /// Structural and semantic validation against the dialect schema.
    /// Returns the first failure with the offending path.
    pub fn validate(&self, tree: &ConfigTree) -> Result<(), ValidationError> {
        // Both dialects compile from the same source tree shape.
        schema::validate(tree)
    }

    /// Compile a validated tree into a native config archive.
    /// Callers run `validate` first; a failure here is an internal error.
    pub fn render(&self, tree: &ConfigTree) -> Result<Archive, String> {
        let files = match self {
            Self::OpenWrt => openwrt::render(tree)?,
            Self::Vyos => vyos::render(tree)?,
        };
        Ok(archive::build(files))
    }
}

/// A schema violation, annotated with the path of the offending node
/// (e.g. `interfaces.0.addresses.1.mask`).
#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::as_tree;
    use serde_json::json;

    #[test]
    fn test_backend_ids_round_trip() {
        for id in backend_id::ALL {
            assert_eq!(Backend::from_id(id).unwrap().id(), *id);
        }
        assert!(Backend::from_id("junos").is_none());
        assert!(Backend::from_id("").is_none());
    }

    #[test]
    fn test_render_is_deterministic_across_runs() {
        let tree = as_tree(json!({
            "general": {"hostname": "node1"},
            "interfaces": [
                {"name": "lo0", "type": "loopback"},
                {"name": "eth0", "type": "ethernet", "proto": "dhcp"}
            ]
        }))
        .unwrap();

        for backend in [Backend::OpenWrt, Backend::Vyos] {
            backend.validate(&tree).unwrap();
            let first = backend.render(&tree).unwrap();
            let second = backend.render(&tree).unwrap();
            assert_eq!(first.checksum, second.checksum);
            assert_eq!(first.data, second.data);
            assert!(!first.checksum.is_empty());
        }
    }

    #[test]
    fn test_dialects_produce_distinct_output() {
        let tree = as_tree(json!({"general": {"hostname": "node1"}})).unwrap();
        let uci = Backend::OpenWrt.render(&tree).unwrap();
        let vyos = Backend::Vyos.render(&tree).unwrap();
        assert_ne!(uci.checksum, vyos.checksum);
    }
}
