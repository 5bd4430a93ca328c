//! Best-effort reconciliation of timer state with a remote authority

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use serde::Serialize;
use tasktimer_core::TimerRecord;
use tasktimer_remote::{RemoteAuthority, SyncPayload};

use crate::timer::{SyncCandidate, TimerStore};

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Successful pushes whose `last_sync` was recorded in the store.
    pub applied: usize,
    /// Stale records skipped because an earlier push for them is still running.
    pub skipped_in_flight: usize,
}

/// Pushes records whose last reconciliation is older than the sync interval.
///
/// Failures are logged and leave `last_sync` untouched, so the record is
/// retried on the next cycle. Local state is never rolled back.
pub struct SyncClient {
    remote: Arc<dyn RemoteAuthority>,
    interval_ms: i64,
    in_flight: Mutex<HashSet<String>>,
}

impl SyncClient {
    pub fn new(remote: Arc<dyn RemoteAuthority>, interval_ms: i64) -> Self {
        Self {
            remote,
            interval_ms,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `record` is due for a push at `now`.
    pub fn is_stale(&self, record: &TimerRecord, now: i64) -> bool {
        now.saturating_sub(record.last_sync) >= self.interval_ms
    }

    /// Claim the stale candidates that are not already being pushed.
    fn claim(&self, candidates: Vec<SyncCandidate>, now: i64) -> (Vec<SyncCandidate>, usize) {
        let mut in_flight = self.in_flight();
        let mut claimed = Vec::new();
        let mut skipped = 0;

        for candidate in candidates {
            if !self.is_stale(&candidate.record, now) {
                continue;
            }
            if in_flight.insert(candidate.record.task_id.clone()) {
                claimed.push(candidate);
            } else {
                skipped += 1;
            }
        }

        (claimed, skipped)
    }

    fn release(&self, claimed: &[SyncCandidate]) {
        let mut in_flight = self.in_flight();
        for candidate in claimed {
            in_flight.remove(&candidate.record.task_id);
        }
    }

    async fn push(&self, candidate: &SyncCandidate, now: i64) -> bool {
        let task_id = &candidate.record.task_id;
        let result = match SyncPayload::from_record(&candidate.record, now) {
            Ok(payload) => self.remote.push(task_id, &payload).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::debug!("Synced timer {}", task_id);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to sync timer {}, will retry: {}", task_id, e);
                false
            }
        }
    }

    /// Push every stale record of `store` concurrently and record the
    /// successes in one batch.
    pub async fn run_cycle(&self, store: &TimerStore) -> SyncReport {
        let generation = store.generation();
        let now = store.now_ms();
        let (claimed, skipped_in_flight) = self.claim(store.sync_candidates().await, now);

        let mut report = SyncReport {
            attempted: claimed.len(),
            skipped_in_flight,
            ..SyncReport::default()
        };
        if claimed.is_empty() {
            return report;
        }

        let outcomes = join_all(claimed.iter().map(|candidate| self.push(candidate, now))).await;
        self.release(&claimed);

        let synced: Vec<(String, u64)> = claimed
            .iter()
            .zip(outcomes)
            .filter(|(_, ok)| *ok)
            .map(|(candidate, _)| (candidate.record.task_id.clone(), candidate.revision))
            .collect();

        report.succeeded = synced.len();
        report.failed = report.attempted - report.succeeded;
        report.applied = store.apply_sync_results(generation, &synced).await;
        report
    }
}
