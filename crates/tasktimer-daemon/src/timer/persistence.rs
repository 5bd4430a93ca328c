//! Durable mirror of the timer set, with offline-gap recovery on load

use std::sync::Arc;

use tasktimer_core::storage::{KeyValueStorage, MemoryStorage};
use tasktimer_core::{Result as CoreResult, TimerRecord, TimerStatus};

pub const DEFAULT_STORAGE_KEY: &str = "task_timers";

/// Outcome of restoring a persisted timer set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recovered {
    pub timers: Vec<TimerRecord>,
    /// Active timers whose deadline passed while nothing was running.
    pub expired: usize,
    /// Terminal records from the previous session that were not restored.
    pub discarded: usize,
}

/// Reconcile a stored timer set with the wall clock at `now`.
///
/// Active timers past their deadline come back Expired with nothing left;
/// other active timers get their remaining time recomputed from the deadline.
/// Paused timers keep their frozen value. Expired and Completed records are
/// dropped.
pub fn recover(stored: Vec<TimerRecord>, now: i64) -> Recovered {
    let mut recovered = Recovered::default();

    for mut record in stored {
        match record.status {
            TimerStatus::Active => {
                if record.is_overdue(now) {
                    if record.expire().is_ok() {
                        recovered.expired += 1;
                    }
                } else {
                    record.refresh(now);
                }
                recovered.timers.push(record);
            }
            TimerStatus::Paused => recovered.timers.push(record),
            TimerStatus::Expired | TimerStatus::Completed => recovered.discarded += 1,
        }
    }

    recovered
}

/// Serializes the full timer set as one JSON array under a single key.
///
/// Failures are logged and swallowed: the store keeps running in memory.
pub struct PersistenceLayer {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl PersistenceLayer {
    pub fn new(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), DEFAULT_STORAGE_KEY)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Write `timers`, returning whether the write reached storage.
    pub fn save(&self, timers: &[TimerRecord]) -> bool {
        match self.try_save(timers) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to persist timers, continuing in memory: {}", e);
                false
            }
        }
    }

    pub fn try_save(&self, timers: &[TimerRecord]) -> CoreResult<()> {
        let content = serde_json::to_string(timers)?;
        self.storage.write(&self.key, &content)
    }

    /// Restore and recover the stored set. Missing or unreadable storage is an empty set.
    pub fn load(&self, now: i64) -> Recovered {
        let stored = match self.try_load() {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Ignoring unreadable timer storage '{}': {}", self.key, e);
                Vec::new()
            }
        };

        let recovered = recover(stored, now);
        if recovered.expired > 0 || recovered.discarded > 0 {
            tracing::info!(
                "Restored {} timers ({} expired while offline, {} terminal discarded)",
                recovered.timers.len(),
                recovered.expired,
                recovered.discarded
            );
        }
        recovered
    }

    pub fn try_load(&self) -> CoreResult<Vec<TimerRecord>> {
        match self.storage.read(&self.key)? {
            Some(content) if !content.trim().is_empty() => Ok(serde_json::from_str(&content)?),
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasktimer_core::Error as CoreError;

    const T0: i64 = 1_700_000_000_000;

    struct BrokenStorage;

    impl KeyValueStorage for BrokenStorage {
        fn read(&self, _key: &str) -> CoreResult<Option<String>> {
            Err(CoreError::Io(std::io::Error::other("disk gone")))
        }

        fn write(&self, _key: &str, _value: &str) -> CoreResult<()> {
            Err(CoreError::Io(std::io::Error::other("disk gone")))
        }
    }

    fn active(task_id: &str, duration: u64) -> TimerRecord {
        TimerRecord::new(task_id.to_string(), "u1".to_string(), duration, T0)
    }

    #[test]
    fn test_overdue_active_becomes_expired() {
        let recovered = recover(vec![active("t1", 10)], T0 + 3_600_000);

        assert_eq!(recovered.expired, 1);
        let timer = &recovered.timers[0];
        assert_eq!(timer.status, TimerStatus::Expired);
        assert_eq!(timer.remaining_time, 0);
    }

    #[test]
    fn test_active_remaining_recomputed_from_deadline() {
        let mut stale = active("t1", 100);
        stale.remaining_time = 100;

        let recovered = recover(vec![stale], T0 + 40_000);
        assert_eq!(recovered.timers[0].status, TimerStatus::Active);
        assert_eq!(recovered.timers[0].remaining_time, 60);
    }

    #[test]
    fn test_paused_keeps_frozen_remaining() {
        let mut paused = active("t1", 100);
        paused.pause(T0 + 10_000).unwrap();

        let recovered = recover(vec![paused], T0 + 86_400_000);
        assert_eq!(recovered.timers[0].status, TimerStatus::Paused);
        assert_eq!(recovered.timers[0].remaining_time, 90);
    }

    #[test]
    fn test_terminal_records_are_not_restored() {
        let mut expired = active("t1", 10);
        expired.expire().unwrap();
        let mut completed = active("t2", 10);
        completed.complete(T0).unwrap();

        let recovered = recover(vec![expired, completed, active("t3", 10)], T0);
        assert_eq!(recovered.discarded, 2);
        assert_eq!(recovered.timers.len(), 1);
        assert_eq!(recovered.timers[0].task_id, "t3");
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let layer = PersistenceLayer::in_memory();
        let mut paused = active("t2", 50);
        paused.pause(T0 + 5_000).unwrap();
        let timers = vec![active("t1", 30), paused];

        assert!(layer.save(&timers));
        let recovered = layer.load(T0 + 5_000);

        assert_eq!(recovered.expired, 0);
        assert_eq!(recovered.timers[0].task_id, "t1");
        assert_eq!(recovered.timers[0].remaining_time, 25);
        assert_eq!(recovered.timers[1], timers[1]);
    }

    #[test]
    fn test_corrupt_storage_is_empty() {
        let storage = Arc::new(MemoryStorage::with_value(DEFAULT_STORAGE_KEY, "{not json"));
        let layer = PersistenceLayer::new(storage, DEFAULT_STORAGE_KEY);

        assert!(layer.try_load().is_err());
        assert_eq!(layer.load(T0), Recovered::default());
    }

    #[test]
    fn test_missing_storage_is_empty() {
        let layer = PersistenceLayer::in_memory();
        assert!(layer.load(T0).timers.is_empty());
    }

    #[test]
    fn test_storage_errors_are_swallowed() {
        let layer = PersistenceLayer::new(Arc::new(BrokenStorage), DEFAULT_STORAGE_KEY);

        assert!(!layer.save(&[active("t1", 10)]));
        assert!(layer.load(T0).timers.is_empty());
    }

    #[test]
    fn test_persisted_format() {
        let storage = Arc::new(MemoryStorage::new());
        let layer = PersistenceLayer::new(storage.clone(), "timers");
        layer.save(&[active("t1", 10)]);

        let content = storage.read("timers").unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json[0]["taskId"], "t1");
        assert_eq!(json[0]["deadline"], T0 + 10_000);
        assert_eq!(json[0]["status"], "active");
    }
}
