pub mod config;
pub mod timer;

pub use config::{Config, DaemonConfig, EngineConfig, StorageConfig, SyncConfig};
pub use timer::{TimerRecord, TimerStatus};
