//! TaskTimer Remote
//!
//! Client side of timer reconciliation with a remote authority.

pub mod auth;
pub mod client;
pub mod error;
pub mod types;

pub use auth::RemoteAuth;
pub use client::{HttpAuthority, RemoteAuthority};
pub use error::{Error, Result};
pub use types::SyncPayload;
