//! TaskTimer Daemon Library
//!
//! Core daemon functionality exposed as a library for testing.

pub mod adapter;
pub mod api;
pub mod bus;
pub mod config;
pub mod ipc;
pub mod sync;
pub mod timer;

#[cfg(test)]
pub(crate) mod test_support;

pub use adapter::{OwnerView, Signal, TaskHandle, forward_signals};
pub use api::ApiHandler;
pub use bus::{ListenerError, NotificationBus, Subscription};
pub use config::ConfigManager;
pub use ipc::{IpcServer, Notification, Request, Response};
pub use sync::{SyncClient, SyncReport};
pub use timer::{PersistenceLayer, TimerStore};
