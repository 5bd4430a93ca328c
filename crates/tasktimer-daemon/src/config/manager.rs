//! Configuration manager

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use tasktimer_core::{
    Result as CoreResult,
    models::Config,
    storage::{ConfigStorage, init_config_dir},
};

/// Config manager error
#[derive(Debug, thiserror::Error)]
pub enum ConfigManagerError {
    #[error("Storage error: {0}")]
    Storage(#[from] tasktimer_core::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigManagerError>;

/// Holds the daemon configuration. Engine and sync settings are read once at
/// startup; updates to them apply on the next start.
pub struct ConfigManager {
    storage: ConfigStorage,
    config: Arc<RwLock<Config>>,
}

impl ConfigManager {
    pub fn new() -> CoreResult<Self> {
        Self::with_dir(init_config_dir()?)
    }

    pub fn with_dir(config_dir: PathBuf) -> CoreResult<Self> {
        let storage = ConfigStorage::new(config_dir);

        // Load or create default config
        let config = storage.load()?;

        Ok(Self {
            storage,
            config: Arc::new(RwLock::new(config)),
        })
    }

    pub async fn get(&self) -> Config {
        self.config.read().await.clone()
    }

    pub async fn update(&self, config: Config) -> Result<Config> {
        config
            .validate()
            .map_err(|e| ConfigManagerError::Invalid(e.to_string()))?;

        self.storage.save(&config)?;

        {
            let mut current = self.config.write().await;
            *current = config.clone();
        }

        tracing::info!("Configuration updated");
        Ok(config)
    }

    pub async fn update_daemon_config(
        &self,
        socket_path: Option<String>,
        log_level: Option<String>,
    ) -> Result<Config> {
        let mut config = self.get().await;

        if let Some(path) = socket_path {
            config.daemon.socket_path = path;
        }

        if let Some(level) = log_level {
            config.daemon.log_level = level;
        }

        self.update(config).await
    }

    pub async fn update_sync_config(
        &self,
        enabled: Option<bool>,
        remote_url: Option<String>,
        api_token: Option<String>,
        request_timeout_secs: Option<u64>,
    ) -> Result<Config> {
        let mut config = self.get().await;

        if let Some(enabled) = enabled {
            config.sync.enabled = enabled;
        }

        if let Some(url) = remote_url {
            config.sync.remote_url = Some(url);
        }

        if let Some(token) = api_token {
            config.sync.api_token = Some(token);
        }

        if let Some(timeout) = request_timeout_secs {
            config.sync.request_timeout_secs = Some(timeout);
        }

        self.update(config).await
    }

    pub async fn reset(&self) -> Result<Config> {
        self.update(Config::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_defaults_written_on_first_start() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_dir(temp_dir.path().to_path_buf()).unwrap();

        assert_eq!(manager.get().await, Config::default());
        assert!(temp_dir.path().join("config.json").exists());
    }

    #[tokio::test]
    async fn test_update_sync_persists() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_dir(temp_dir.path().to_path_buf()).unwrap();

        let config = manager
            .update_sync_config(
                Some(true),
                Some("https://timers.example.com".to_string()),
                None,
                Some(5),
            )
            .await
            .unwrap();
        assert!(config.sync.enabled);

        let reloaded = ConfigManager::with_dir(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(reloaded.get().await.sync.request_timeout_secs, Some(5));
    }

    #[tokio::test]
    async fn test_invalid_update_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_dir(temp_dir.path().to_path_buf()).unwrap();

        let result = manager.update_sync_config(Some(true), None, None, None).await;
        assert!(matches!(result, Err(ConfigManagerError::Invalid(_))));
        assert!(!manager.get().await.sync.enabled);
    }

    #[tokio::test]
    async fn test_update_daemon_and_reset() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_dir(temp_dir.path().to_path_buf()).unwrap();

        let config = manager
            .update_daemon_config(Some("/tmp/other.sock".to_string()), None)
            .await
            .unwrap();
        assert_eq!(config.daemon.socket_path, "/tmp/other.sock");

        assert_eq!(manager.reset().await.unwrap(), Config::default());
    }
}
