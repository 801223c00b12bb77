use std::env;

use crate::backend::backend_id;

/// Config holds all application configuration.
///
/// Protocol feature flags (registration, shared secret, backend
/// allow-list) are loaded once at startup and handed to the handlers
/// through AppState, never read from ambient globals.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub db_max_connections: u32,
    pub listen_addr: String,
    /// Whether the device register endpoint is enabled.
    pub registration_enabled: bool,
    /// Shared secret required by the register endpoint.
    pub shared_secret: String,
    /// Backends devices may register with.
    pub backends: Vec<String>,
    /// Public base URL of this server, announced as the subscriber
    /// callback address when importing remote templates.
    pub base_url: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        Self {
            db_path: get_env("DB_PATH", "/data/netweave.db"),
            db_max_connections: get_env("DB_MAX_CONNECTIONS", "5")
                .parse()
                .unwrap_or(5),
            listen_addr: get_env("LISTEN_ADDR", "0.0.0.0:8080"),
            registration_enabled: parse_bool(&get_env("REGISTRATION_ENABLED", "true")),
            shared_secret: get_env("SHARED_SECRET", ""),
            backends: parse_list(&get_env("BACKENDS", &backend_id::ALL.join(","))),
            base_url: get_env("BASE_URL", "http://localhost:8080"),
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("1"));
        assert!(parse_bool("YES"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("openwrt,vyos"), vec!["openwrt", "vyos"]);
        assert_eq!(parse_list(" openwrt , vyos "), vec!["openwrt", "vyos"]);
        assert!(parse_list("").is_empty());
    }
}
