use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// One deadline-bounded countdown for a task.
///
/// All timestamps are epoch milliseconds. `remaining_time` is authoritative
/// while the timer is paused or terminal; while active it is recomputed from
/// `deadline` on every read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerRecord {
    pub task_id: String,
    pub owner_id: String,
    pub start_time: i64,
    pub deadline: i64,
    /// Original countdown length in seconds.
    pub duration: u64,
    pub remaining_time: u64,
    pub status: TimerStatus,
    /// Last successful remote reconciliation, `0` when never synced.
    #[serde(default)]
    pub last_sync: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Active,
    Paused,
    Expired,
    Completed,
}

impl TimerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerStatus::Active => "active",
            TimerStatus::Paused => "paused",
            TimerStatus::Expired => "expired",
            TimerStatus::Completed => "completed",
        }
    }

    /// Expired and Completed timers never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TimerStatus::Expired | TimerStatus::Completed)
    }
}

impl std::fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000)
}

impl TimerRecord {
    /// Create an active timer whose deadline is `duration` seconds after `now`.
    pub fn new(task_id: String, owner_id: String, duration: u64, now: i64) -> Self {
        Self {
            task_id,
            owner_id,
            start_time: now,
            deadline: now.saturating_add(secs_to_ms(duration)),
            duration,
            remaining_time: duration,
            status: TimerStatus::Active,
            last_sync: 0,
        }
    }

    /// Seconds left at `now`: live for active timers, frozen otherwise.
    pub fn remaining_at(&self, now: i64) -> u64 {
        match self.status {
            TimerStatus::Active => {
                let left_ms = self.deadline.saturating_sub(now).max(0);
                u64::try_from(left_ms / 1000).unwrap_or(0)
            }
            TimerStatus::Paused => self.remaining_time,
            TimerStatus::Expired | TimerStatus::Completed => 0,
        }
    }

    /// Copy of this record with `remaining_time` brought up to `now`.
    pub fn at(&self, now: i64) -> Self {
        let mut record = self.clone();
        record.refresh(now);
        record
    }

    /// Recompute `remaining_time` in place for an active timer; other
    /// states keep their frozen value. Returns the resulting value.
    pub fn refresh(&mut self, now: i64) -> u64 {
        if self.is_active() {
            self.remaining_time = self.remaining_at(now);
        }
        self.remaining_time
    }

    pub fn pause(&mut self, now: i64) -> Result<()> {
        if self.status != TimerStatus::Active {
            return Err(Error::InvalidData("Timer is not active".to_string()));
        }

        self.remaining_time = self.remaining_at(now);
        self.status = TimerStatus::Paused;
        Ok(())
    }

    /// Resume from the frozen remaining time; the original duration is not consulted.
    pub fn resume(&mut self, now: i64) -> Result<()> {
        if self.status != TimerStatus::Paused {
            return Err(Error::InvalidData("Timer is not paused".to_string()));
        }

        self.start_time = now;
        self.deadline = now.saturating_add(secs_to_ms(self.remaining_time));
        self.status = TimerStatus::Active;
        Ok(())
    }

    pub fn expire(&mut self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::InvalidData(format!(
                "Timer is already {}",
                self.status
            )));
        }

        self.remaining_time = 0;
        self.status = TimerStatus::Expired;
        Ok(())
    }

    pub fn complete(&mut self, now: i64) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::InvalidData(format!(
                "Timer is already {}",
                self.status
            )));
        }

        self.remaining_time = self.remaining_at(now);
        self.status = TimerStatus::Completed;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == TimerStatus::Active
    }

    pub fn is_paused(&self) -> bool {
        self.status == TimerStatus::Paused
    }

    pub fn is_expired(&self) -> bool {
        self.status == TimerStatus::Expired
    }

    /// Active and past its deadline at `now`.
    pub fn is_overdue(&self, now: i64) -> bool {
        self.is_active() && self.remaining_at(now) == 0
    }
}
