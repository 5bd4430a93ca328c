//! API handlers

pub mod config;
pub mod sync;
pub mod timer;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::config::ConfigManager;
use crate::timer::TimerStore;

/// API error
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Decode the params of a method that requires them.
pub(crate) fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let params = params.ok_or_else(|| ApiError::InvalidParams("Missing params".to_string()))?;
    serde_json::from_value(params).map_err(|e| ApiError::InvalidParams(e.to_string()))
}

/// Main API handler that routes requests to appropriate handlers
pub struct ApiHandler {
    store: Arc<TimerStore>,
    config_manager: Arc<ConfigManager>,
}

impl ApiHandler {
    pub fn new(store: Arc<TimerStore>, config_manager: Arc<ConfigManager>) -> Self {
        Self {
            store,
            config_manager,
        }
    }

    pub fn store(&self) -> &Arc<TimerStore> {
        &self.store
    }

    pub async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value> {
        match method {
            // Timer methods
            "timer.start" => timer::start(&self.store, params).await,
            "timer.pause" => timer::pause(&self.store, params).await,
            "timer.resume" => timer::resume(&self.store, params).await,
            "timer.complete" => timer::complete(&self.store, params).await,
            "timer.expire" => timer::expire(&self.store, params).await,
            "timer.clear" => timer::clear(&self.store, params).await,
            "timer.get" => timer::get(&self.store, params).await,
            "timer.remaining" => timer::remaining(&self.store, params).await,
            "timer.active" => timer::active(&self.store, params).await,
            "timer.expired" => timer::expired(&self.store, params).await,
            "timer.list" => timer::list(&self.store, params).await,

            // Sync methods
            "sync.now" => sync::now(&self.store, params).await,

            // Config methods
            "config.get" => config::get(&self.config_manager, params).await,
            "config.update_sync" => config::update_sync(&self.config_manager, params).await,
            "config.update_daemon" => config::update_daemon(&self.config_manager, params).await,
            "config.reset" => config::reset(&self.config_manager, params).await,

            // Unknown method
            _ => Err(ApiError::MethodNotFound(method.to_string())),
        }
    }
}
