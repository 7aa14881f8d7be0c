//! Configuration types for the decoy gateway.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the gateway core.
///
/// These are the static bootstrap values; the settings store can override
/// the dynamic ones (honeypot toggle, rate window and max) at runtime, and
/// the values here double as the safe defaults when the store is
/// unreachable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Secret mixed into visitor ID derivation. Rotating it rotates every
    /// visitor identity.
    pub secret: String,

    /// Honeypot toggle and trigger parameter
    pub honeypot: HoneypotConfig,

    /// Sliding-window rate limiter settings
    pub rate_limit: RateLimitConfig,

    /// Agent allow/deny list refresh settings
    pub agents: AgentListConfig,

    /// Decoy content settings
    pub decoy: DecoyConfig,

    /// Settings-store cache settings
    pub settings_cache: SettingsCacheConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            secret: "change-me-in-production".to_string(),
            honeypot: HoneypotConfig::default(),
            rate_limit: RateLimitConfig::default(),
            agents: AgentListConfig::default(),
            decoy: DecoyConfig::default(),
            settings_cache: SettingsCacheConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a JSON or YAML file, chosen by extension.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
            serde_yaml::from_str(&content).context("parsing YAML config")?
        } else {
            serde_json::from_str(&content).context("parsing JSON config")?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate once at load time rather than on every access.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.secret.is_empty(), "secret must not be empty");
        anyhow::ensure!(
            self.rate_limit.window_ms > 0,
            "rate_limit.window_ms must be positive"
        );
        anyhow::ensure!(
            !self.honeypot.trigger_param.is_empty(),
            "honeypot.trigger_param must not be empty"
        );
        Ok(())
    }
}

/// Honeypot behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HoneypotConfig {
    /// Master toggle. When off, every request is allowed (still logged).
    pub enabled: bool,

    /// Query parameter that forces a decoy response regardless of any
    /// other check.
    pub trigger_param: String,
}

impl Default for HoneypotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_param: "scramble".to_string(),
        }
    }
}

/// Sliding-window rate limiter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Trailing window size in milliseconds
    pub window_ms: i64,

    /// Maximum countable requests per visitor within the window
    pub max_requests: u32,

    /// Background sweep interval in seconds
    pub sweep_interval_secs: u64,

    /// Replay persisted request logs into the limiter at startup
    pub warmup: bool,

    /// Path prefixes exempt from rate accounting
    pub excluded_path_prefixes: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_requests: 10,
            sweep_interval_secs: 300,
            warmup: true,
            excluded_path_prefixes: vec!["/api/".to_string(), "/admin".to_string()],
        }
    }
}

/// Agent list refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentListConfig {
    /// Wholesale reload interval in seconds
    pub refresh_interval_secs: u64,
}

impl Default for AgentListConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 60,
        }
    }
}

/// Decoy content settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoyConfig {
    /// Server header value to present on decoy responses
    pub server_header: String,

    /// Directory of reference HTML to build the Markov corpus from.
    /// `None` leaves the generator on its built-in fallback vocabulary.
    pub corpus_dir: Option<PathBuf>,
}

impl Default for DecoyConfig {
    fn default() -> Self {
        Self {
            server_header: "nginx".to_string(),
            corpus_dir: None,
        }
    }
}

/// Settings-store cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsCacheConfig {
    /// Maximum cached settings entries
    pub capacity: u64,

    /// Cache TTL in seconds
    pub ttl_seconds: u64,
}

impl Default for SettingsCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            ttl_seconds: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert!(config.honeypot.enabled);
        assert_eq!(config.honeypot.trigger_param, "scramble");
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert_eq!(config.rate_limit.max_requests, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = GatewayConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: GatewayConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.rate_limit.window_ms, config.rate_limit.window_ms);
        assert_eq!(parsed.decoy.server_header, config.decoy.server_header);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{"rate_limit": {"max_requests": 25}}"#;
        let config: GatewayConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.rate_limit.max_requests, 25);
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert!(config.honeypot.enabled);
    }

    #[test]
    fn test_validation_rejects_empty_secret() {
        let config = GatewayConfig {
            secret: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_window() {
        let mut config = GatewayConfig::default();
        config.rate_limit.window_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "secret: yaml-secret\nrate_limit:\n  max_requests: 5\n").unwrap();
        let config = GatewayConfig::load(&path).unwrap();
        assert_eq!(config.secret, "yaml-secret");
        assert_eq!(config.rate_limit.max_requests, 5);
    }
}
