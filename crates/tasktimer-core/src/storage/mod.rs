//! Durable key-value backends for the timer set and configuration

pub mod config;
pub mod file;
pub mod memory;

pub use config::ConfigStorage;
pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::{Error, Result};
use std::path::PathBuf;

/// A string-valued key-value medium.
///
/// `read` returns `Ok(None)` for a key that was never written. Backends do
/// not interpret values; callers own serialization.
pub trait KeyValueStorage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;

    fn write(&self, key: &str, value: &str) -> Result<()>;
}

pub fn get_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("tasktimer"))
        .ok_or_else(|| Error::InvalidData("Could not find data directory".to_string()))
}

pub fn get_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("tasktimer"))
        .ok_or_else(|| Error::InvalidData("Could not find config directory".to_string()))
}

pub fn init_data_dir() -> Result<PathBuf> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

pub fn init_config_dir() -> Result<PathBuf> {
    let config_dir = get_config_dir()?;
    std::fs::create_dir_all(&config_dir)?;
    Ok(config_dir)
}
