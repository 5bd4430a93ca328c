//! TaskTimer Core
//!
//! Timer records, their state machine, clocks, persistence backends and
//! configuration shared by the daemon and the remote sync client.

pub mod clock;
pub mod error;
pub mod format;
pub mod models;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use format::{UrgencyLevel, format_remaining, format_time, timer_urgency, urgency_level};
pub use models::{Config, TimerRecord, TimerStatus};
