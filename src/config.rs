//! Engine configuration with validation and defaults.

use crate::revealer::RevealerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration for the engine and the revealer service.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub chain: ChainConfig,
    pub revealer: RevealerSettings,
    pub controller: ControllerSettings,
    pub animation: AnimationSettings,
}

/// Where the authoritative round store lives.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub contract_address: String,
    /// Path to the operator credential used to sign reveals/settles.
    pub operator_key_file: Option<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: String::new(),
            operator_key_file: None,
        }
    }
}

/// Revealer timing knobs, all in milliseconds on the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealerSettings {
    pub scan_window: u64,
    pub min_reveal_delay_ms: u64,
    pub max_reveal_delay_ms: u64,
    pub grace_period_ms: u64,
    pub rescan_interval_ms: u64,
    /// File persisting committed server seeds across restarts; unset
    /// keeps the seed vault in memory only.
    pub seed_vault_path: Option<String>,
}

impl Default for RevealerSettings {
    fn default() -> Self {
        Self {
            scan_window: 10,
            min_reveal_delay_ms: 3_000,
            max_reveal_delay_ms: 10_000,
            grace_period_ms: 5_000,
            rescan_interval_ms: 15_000,
            seed_vault_path: None,
        }
    }
}

impl From<&RevealerSettings> for RevealerConfig {
    fn from(settings: &RevealerSettings) -> Self {
        RevealerConfig {
            scan_window: settings.scan_window,
            min_reveal_delay: Duration::from_millis(settings.min_reveal_delay_ms),
            max_reveal_delay: Duration::from_millis(settings.max_reveal_delay_ms),
            grace_period: Duration::from_millis(settings.grace_period_ms),
            rescan_interval: Duration::from_millis(settings.rescan_interval_ms),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    pub confirmation_timeout_ms: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            confirmation_timeout_ms: 30_000,
        }
    }
}

impl ControllerSettings {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationSettings {
    /// Milliseconds for the displayed multiplier to grow by 1.00x.
    pub growth_period_ms: u64,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            growth_period_ms: 1_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        RevealerConfig::from(&self.revealer)
            .validate()
            .map_err(ConfigError::Invalid)?;
        if self.controller.confirmation_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "confirmation_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.animation.growth_period_ms == 0 {
            return Err(ConfigError::Invalid(
                "growth_period_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [revealer]
            grace_period_ms = 2000

            [chain]
            rpc_url = "https://polygon-rpc.example"
            contract_address = "0xf8f6f8f1c656dbd0540c26b3bfa1969b500adb5c"
            "#,
        )
        .unwrap();

        assert_eq!(config.revealer.grace_period_ms, 2_000);
        assert_eq!(config.revealer.scan_window, 10);
        assert_eq!(config.chain.rpc_url, "https://polygon-rpc.example");
        assert_eq!(config.controller.confirmation_timeout_ms, 30_000);
    }

    #[test]
    fn test_inverted_delay_window_rejected() {
        let mut config = EngineConfig::default();
        config.revealer.min_reveal_delay_ms = 10_000;
        config.revealer.max_reveal_delay_ms = 1_000;
        assert!(config.validate().is_err());
    }
}
