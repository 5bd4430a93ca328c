//! Application configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    pub socket_path: String,
    pub log_level: String,
}

/// Timing of the two periodic passes run by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    pub sync_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Overrides the platform data directory.
    pub data_dir: Option<PathBuf>,
    /// Key the timer set is stored under.
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    pub enabled: bool,
    pub remote_url: Option<String>,
    pub api_token: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.daemon.validate()?;
        self.engine.validate()?;
        self.storage.validate()?;
        self.sync.validate()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            daemon: DaemonConfig::default(),
            engine: EngineConfig::default(),
            storage: StorageConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Validate daemon configuration
    pub fn validate(&self) -> Result<()> {
        if self.socket_path.trim().is_empty() {
            return Err(Error::Validation("Socket path cannot be empty".to_string()));
        }

        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(Error::Validation(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.log_level,
                valid_log_levels.join(", ")
            )));
        }

        Ok(())
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/tasktimer.sock".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(Error::Validation(
                "Tick interval must be greater than 0".to_string(),
            ));
        }

        if self.sync_interval_secs == 0 {
            return Err(Error::Validation(
                "Sync interval must be greater than 0".to_string(),
            ));
        }

        if self.tick_interval_ms >= self.sync_interval_secs.saturating_mul(1000) {
            return Err(Error::Validation(
                "Tick interval must be shorter than the sync interval".to_string(),
            ));
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Sync interval in milliseconds, for staleness checks against epoch timestamps.
    pub fn sync_interval_ms(&self) -> i64 {
        i64::try_from(self.sync_interval_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            sync_interval_secs: 30,
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        let key = self.key.trim();
        if key.is_empty() {
            return Err(Error::Validation("Storage key cannot be empty".to_string()));
        }

        if key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(Error::Validation(format!(
                "Storage key '{}' must be a plain name",
                self.key
            )));
        }

        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            key: "task_timers".to_string(),
        }
    }
}

impl SyncConfig {
    /// Validate sync configuration
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.remote_url.is_none() {
            return Err(Error::Validation(
                "Remote URL must be set when sync is enabled".to_string(),
            ));
        }

        if let Some(ref url) = self.remote_url {
            if url.trim().is_empty() {
                return Err(Error::Validation("Remote URL cannot be empty".to_string()));
            }
        }

        if self.request_timeout_secs == Some(0) {
            return Err(Error::Validation(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            remote_url: None,
            api_token: None,
            request_timeout_secs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.engine.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.engine.sync_interval(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_daemon_config_validation() {
        let mut config = DaemonConfig::default();
        assert!(config.validate().is_ok());

        config.socket_path = "".to_string();
        assert!(config.validate().is_err());

        config.socket_path = "/tmp/test.sock".to_string();
        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_config_validation() {
        let mut config = EngineConfig {
            tick_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        config.tick_interval_ms = 30_000;
        assert!(config.validate().is_err());

        config.tick_interval_ms = 500;
        assert!(config.validate().is_ok());
        assert_eq!(config.sync_interval_ms(), 30_000);
    }

    #[test]
    fn test_storage_key_validation() {
        let mut config = StorageConfig::default();
        assert!(config.validate().is_ok());

        config.key = "../escape".to_string();
        assert!(config.validate().is_err());

        config.key = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sync_config_validation() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());

        let mut enabled = SyncConfig {
            enabled: true,
            ..SyncConfig::default()
        };
        assert!(enabled.validate().is_err());

        enabled.remote_url = Some("https://timers.example.com/api".to_string());
        assert!(enabled.validate().is_ok());

        enabled.request_timeout_secs = Some(0);
        assert!(enabled.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"version": "1.0.0"}"#).unwrap();
        assert_eq!(config, Config::default());
    }
}
