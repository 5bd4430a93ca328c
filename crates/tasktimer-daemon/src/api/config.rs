use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::{ApiError, Result, parse_params};
use crate::config::ConfigManager;

#[derive(Debug, Deserialize)]
struct UpdateSyncParams {
    enabled: Option<bool>,
    remote_url: Option<String>,
    api_token: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct UpdateDaemonParams {
    socket_path: Option<String>,
    log_level: Option<String>,
}

/// The active configuration, with the API token masked.
pub async fn get(manager: &Arc<ConfigManager>, _params: Option<Value>) -> Result<Value> {
    let mut config = manager.get().await;
    if config.sync.api_token.is_some() {
        config.sync.api_token = Some("***".to_string());
    }
    Ok(serde_json::to_value(&config)?)
}

pub async fn update_sync(manager: &Arc<ConfigManager>, params: Option<Value>) -> Result<Value> {
    let params: UpdateSyncParams = parse_params(params)?;

    manager
        .update_sync_config(
            params.enabled,
            params.remote_url,
            params.api_token,
            params.request_timeout_secs,
        )
        .await
        .map_err(|e| ApiError::Config(e.to_string()))?;

    get(manager, None).await
}

/// Socket and log level changes apply on the next daemon start.
pub async fn update_daemon(manager: &Arc<ConfigManager>, params: Option<Value>) -> Result<Value> {
    let params: UpdateDaemonParams = parse_params(params)?;

    manager
        .update_daemon_config(params.socket_path, params.log_level)
        .await
        .map_err(|e| ApiError::Config(e.to_string()))?;

    get(manager, None).await
}

pub async fn reset(manager: &Arc<ConfigManager>, _params: Option<Value>) -> Result<Value> {
    let config = manager
        .reset()
        .await
        .map_err(|e| ApiError::Config(e.to_string()))?;

    Ok(serde_json::to_value(&config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_token_is_masked() {
        let temp_dir = TempDir::new().unwrap();
        let manager = Arc::new(ConfigManager::with_dir(temp_dir.path().to_path_buf()).unwrap());

        let config = update_sync(
            &manager,
            Some(json!({
                "enabled": true,
                "remote_url": "https://timers.example.com",
                "api_token": "secret"
            })),
        )
        .await
        .unwrap();

        assert_eq!(config["sync"]["enabled"], true);
        assert_eq!(config["sync"]["api_token"], "***");
        assert_eq!(
            manager.get().await.sync.api_token.as_deref(),
            Some("secret")
        );
    }

    #[tokio::test]
    async fn test_invalid_update_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let manager = Arc::new(ConfigManager::with_dir(temp_dir.path().to_path_buf()).unwrap());

        let result = update_sync(&manager, Some(json!({"enabled": true}))).await;
        assert!(matches!(result, Err(ApiError::Config(_))));
    }

    #[tokio::test]
    async fn test_update_daemon_settings() {
        let temp_dir = TempDir::new().unwrap();
        let manager = Arc::new(ConfigManager::with_dir(temp_dir.path().to_path_buf()).unwrap());

        let config = update_daemon(
            &manager,
            Some(json!({"socket_path": "/tmp/other.sock", "log_level": "debug"})),
        )
        .await
        .unwrap();
        assert_eq!(config["daemon"]["socket_path"], "/tmp/other.sock");
        assert_eq!(config["daemon"]["log_level"], "debug");

        let reloaded = ConfigManager::with_dir(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(reloaded.get().await.daemon.socket_path, "/tmp/other.sock");

        let result = update_daemon(&manager, Some(json!({"log_level": "loud"}))).await;
        assert!(matches!(result, Err(ApiError::Config(_))));
    }
}
