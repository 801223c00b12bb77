use rand::distributions::Alphanumeric;
use rand::Rng;

/// Maximum accepted device-key length.
pub const KEY_MAX_LEN: usize = 64;

/// Generate a fresh 32-character device key.
pub fn generate_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

/// Validate a device key: no whitespace, dots or slashes, max 64 chars.
pub fn is_valid_key(key: &str) -> bool {
    if key.is_empty() || key.len() > KEY_MAX_LEN {
        return false;
    }
    let pattern = regex_lite::Regex::new(r"^[^\s/\.]+$").expect("key pattern is valid");
    pattern.is_match(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_key_shape() {
        let key = generate_key();
        assert_eq!(key.len(), 32);
        assert!(is_valid_key(&key));
        assert_ne!(key, generate_key());
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc123"));
        assert!(is_valid_key("under_score-dash"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("has space"));
        assert!(!is_valid_key("has.dot"));
        assert!(!is_valid_key("has/slash"));
        assert!(!is_valid_key("has\ttab"));
        assert!(!is_valid_key(&"x".repeat(65)));
        assert!(is_valid_key(&"x".repeat(64)));
    }
}
