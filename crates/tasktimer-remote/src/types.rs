//! Wire types for the remote sync endpoint

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use tasktimer_core::{TimerRecord, TimerStatus};

use crate::{Error, Result};

/// State pushed for one timer. Delivering the same payload twice is a no-op
/// on the remote side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    pub status: TimerStatus,
    pub remaining_time: u64,
    /// ISO-8601, UTC.
    pub deadline: String,
}

impl SyncPayload {
    /// Build the payload for `record` as seen at `now`.
    pub fn from_record(record: &TimerRecord, now: i64) -> Result<Self> {
        let deadline = DateTime::from_timestamp_millis(record.deadline)
            .ok_or_else(|| {
                Error::InvalidPayload(format!(
                    "Deadline {} of timer {} is out of range",
                    record.deadline, record.task_id
                ))
            })?
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        Ok(Self {
            status: record.status,
            remaining_time: record.remaining_at(now),
            deadline,
        })
    }
}
