use std::path::PathBuf;

use serde::Deserialize;

/// Retry policy for `bulk`'s `transactWrite` calls. Defaults match the spec's
/// fixed 50ms x 3 policy; fields exist so tests can shrink them.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "RetryPolicy::default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "RetryPolicy::default_delay_ms")]
    pub delay_ms: u64,
}

impl RetryPolicy {
    const fn default_max_attempts() -> usize {
        3
    }

    const fn default_delay_ms() -> u64 {
        50
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            delay_ms: Self::default_delay_ms(),
        }
    }
}

/// Where to source the 32-byte AES-256-CTR cursor encryption key from, if
/// cursor encryption is enabled at all.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CursorEncryptionConfig {
    Hex { cursor_encryption_key_hex: String },
    File { cursor_encryption_key_file: PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub table_name: String,
    #[serde(flatten)]
    pub cursor_encryption: Option<CursorEncryptionConfig>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn loads_minimal_config() {
        let raw = r#"
            table_name = "widgets"
        "#;

        let config = EngineConfig::from_toml_str(raw);
        assert!(
            config.is_ok(),
            "should be able to load minimal TOML config but got: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.table_name, "widgets");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay_ms, 50);
        assert!(config.cursor_encryption.is_none());
    }

    #[test]
    fn loads_config_with_hex_key_and_custom_retry() {
        let raw = r#"
            table_name = "widgets"
            cursor_encryption_key_hex = "00112233445566778899aabbccddeeff00112233445566778899aabbccddee"

            [retry]
            max_attempts = 5
            delay_ms = 10
        "#;

        let config = EngineConfig::from_toml_str(raw).expect("config should load");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.delay_ms, 10);
        assert!(matches!(
            config.cursor_encryption,
            Some(CursorEncryptionConfig::Hex { .. })
        ));
    }
}
