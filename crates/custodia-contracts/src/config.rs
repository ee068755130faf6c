//! TOML-driven configuration for the Custodia pipeline.
//!
//! A single `custodia.toml` document configures every component. All
//! sections and fields are optional; defaults produce a working local-only
//! pipeline (records under `./audit`, keys under `./keys`, no remote
//! classifier).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CustodiaError, CustodiaResult};

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodiaConfig {
    pub store: StoreConfig,
    pub keys: KeyConfig,
    pub delivery: DeliveryConfig,
    pub redaction: RedactionConfig,
    pub sink: SinkConfig,
    pub classifier: ClassifierConfig,
}

impl CustodiaConfig {
    /// Parse `s` as a TOML configuration document.
    ///
    /// Returns `CustodiaError::Config` if the TOML is malformed or does not
    /// match the expected schema.
    pub fn from_toml_str(s: &str) -> CustodiaResult<Self> {
        toml::from_str(s).map_err(|e| CustodiaError::Config {
            reason: format!("failed to parse configuration TOML: {}", e),
        })
    }

    /// Read the file at `path` and parse it as configuration.
    pub fn from_file(path: &Path) -> CustodiaResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| CustodiaError::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }
}

/// Local record store layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory; `pending/` and `processed/` live underneath.
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { root: PathBuf::from("./audit") }
    }
}

/// Signing key material location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Directory holding `audit_signing.key` / `audit_signing.pub`.
    pub dir: PathBuf,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("./keys") }
    }
}

/// Delivery engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Maximum delivery attempts per record under throttling.
    pub max_attempts: u32,

    /// Backoff base in milliseconds; attempt `k` waits `base * 2^k`.
    pub backoff_base_ms: u64,

    /// Fixed pause after each successful delivery, in milliseconds.
    pub pacing_ms: u64,

    /// Processed records older than this many days are purged.
    pub retention_days: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1_000,
            pacing_ms: 200,
            retention_days: 7,
        }
    }
}

impl DeliveryConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn retention_window(&self) -> Duration {
        Duration::from_secs(self.retention_days * 24 * 60 * 60)
    }
}

/// Redaction defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    /// Default language code for masking and analysis.
    pub language: String,

    /// Whether to consult the remote classifier when the language allows.
    pub use_remote: bool,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            language: "ja".to_string(),
            use_remote: false,
        }
    }
}

/// Remote log sink coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Base URL of the sink's put-events endpoint.
    pub endpoint: String,

    /// Destination log group.
    pub log_group: String,

    /// Destination log stream.
    pub log_stream: String,

    /// Request timeout in seconds. Remote calls never block indefinitely.
    pub timeout_secs: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            log_group: "/custodia/audit".to_string(),
            log_stream: "default".to_string(),
            timeout_secs: 10,
        }
    }
}

impl SinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Remote PII/NLP classifier coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Base URL of the classifier's analyze endpoint.
    pub endpoint: String,

    /// Findings below this confidence are discarded.
    pub confidence_threshold: f64,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            confidence_threshold: 0.7,
            timeout_secs: 10,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = CustodiaConfig::from_toml_str("").unwrap();
        assert_eq!(config.store.root, PathBuf::from("./audit"));
        assert_eq!(config.delivery.max_attempts, 3);
        assert_eq!(config.delivery.retention_days, 7);
        assert_eq!(config.redaction.language, "ja");
        assert!(!config.redaction.use_remote);
    }

    #[test]
    fn sections_override_defaults() {
        let doc = r#"
            [store]
            root = "/var/lib/custodia"

            [delivery]
            max_attempts = 5
            pacing_ms = 50

            [sink]
            endpoint = "https://logs.internal.example"
            log_group = "/ai/audit"
        "#;
        let config = CustodiaConfig::from_toml_str(doc).unwrap();
        assert_eq!(config.store.root, PathBuf::from("/var/lib/custodia"));
        assert_eq!(config.delivery.max_attempts, 5);
        assert_eq!(config.delivery.pacing_ms, 50);
        // Unset fields in a present section keep their defaults.
        assert_eq!(config.delivery.retention_days, 7);
        assert_eq!(config.sink.log_group, "/ai/audit");
        assert_eq!(config.sink.log_stream, "default");
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = CustodiaConfig::from_toml_str("[store\nroot = 3").unwrap_err();
        assert!(err.to_string().contains("configuration error"));
    }

    #[test]
    fn retention_window_converts_days() {
        let config = DeliveryConfig { retention_days: 2, ..Default::default() };
        assert_eq!(config.retention_window(), Duration::from_secs(2 * 86_400));
    }
}
