//! Timer store - the single authority over live timers

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tokio_util::sync::CancellationToken;

use tasktimer_core::models::EngineConfig;
use tasktimer_core::{Clock, Result as CoreResult, TimerRecord, TimerStatus};
use tasktimer_remote::RemoteAuthority;

use super::persistence::PersistenceLayer;
use crate::bus::{NotificationBus, Subscription};
use crate::sync::{SyncClient, SyncReport};

/// A live record plus the revision of the `start_timer` call that created it.
#[derive(Debug, Clone)]
struct Slot {
    record: TimerRecord,
    revision: u64,
}

/// A record picked for reconciliation, tagged so a late result can be
/// recognised as stale.
#[derive(Debug, Clone)]
pub struct SyncCandidate {
    pub record: TimerRecord,
    pub revision: u64,
}

type TimerMap = BTreeMap<String, Slot>;

/// Owns the live timer map, keyed by task id.
///
/// Every mutation takes the write lock, persists and notifies before
/// releasing it, so subscribers observe snapshots in commit order and the
/// periodic tick never interleaves with a mutation.
pub struct TimerStore {
    timers: RwLock<TimerMap>,
    persistence: PersistenceLayer,
    bus: NotificationBus,
    sync: Option<SyncClient>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    next_revision: AtomicU64,
    generation: AtomicU64,
    shutdown: CancellationToken,
    sync_requested: Notify,
}

fn snapshot_of(timers: &TimerMap, now: i64) -> Vec<TimerRecord> {
    timers.values().map(|slot| slot.record.at(now)).collect()
}

impl TimerStore {
    /// Create a store and restore whatever `persistence` holds.
    pub fn new(config: EngineConfig, persistence: PersistenceLayer, clock: Arc<dyn Clock>) -> Self {
        let mut store = Self {
            timers: RwLock::new(BTreeMap::new()),
            persistence,
            bus: NotificationBus::new(),
            sync: None,
            clock,
            config,
            next_revision: AtomicU64::new(1),
            generation: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            sync_requested: Notify::new(),
        };

        let recovered = store.persistence.load(store.clock.now_ms());
        let changed = recovered.expired > 0 || recovered.discarded > 0;
        let timers = store.slots_from(recovered.timers);
        if changed {
            store
                .persistence
                .save(&snapshot_of(&timers, store.clock.now_ms()));
        }
        store.timers = RwLock::new(timers);
        store
    }

    /// Reconcile with `remote` on every sync interval.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteAuthority>) -> Self {
        self.sync = Some(SyncClient::new(remote, self.config.sync_interval_ms()));
        self
    }

    fn slots_from(&self, records: Vec<TimerRecord>) -> TimerMap {
        records
            .into_iter()
            .map(|record| {
                let slot = Slot {
                    record,
                    revision: self.next_revision.fetch_add(1, Ordering::Relaxed),
                };
                (slot.record.task_id.clone(), slot)
            })
            .collect()
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Persist and broadcast the current state. Called with the write lock held.
    fn commit(&self, timers: &TimerMap) {
        let snapshot = snapshot_of(timers, self.clock.now_ms());
        self.persistence.save(&snapshot);
        self.bus.notify(&snapshot);
    }

    /// Start a countdown for `task_id`, replacing any existing record for it.
    pub async fn start_timer(
        &self,
        task_id: &str,
        owner_id: &str,
        duration_seconds: u64,
    ) -> TimerRecord {
        let now = self.clock.now_ms();
        let record = TimerRecord::new(
            task_id.to_string(),
            owner_id.to_string(),
            duration_seconds,
            now,
        );
        let revision = self.next_revision.fetch_add(1, Ordering::Relaxed);

        let mut timers = self.timers.write().await;
        if let Some(previous) = timers.get(task_id) {
            if previous.record.owner_id != owner_id {
                tracing::warn!(
                    "Timer {} owned by {} replaced by {}",
                    task_id,
                    previous.record.owner_id,
                    owner_id
                );
            } else {
                tracing::debug!("Timer {} restarted", task_id);
            }
        }

        timers.insert(
            task_id.to_string(),
            Slot {
                record: record.clone(),
                revision,
            },
        );
        self.commit(&timers);

        tracing::info!(
            "Started timer {} for {} ({}s)",
            task_id,
            owner_id,
            duration_seconds
        );
        record
    }

    /// Apply a single-record transition. Unknown tasks and invalid
    /// transitions are silent no-ops returning `None`.
    async fn transition<F>(&self, task_id: &str, apply: F) -> Option<TimerRecord>
    where
        F: FnOnce(&mut TimerRecord, i64) -> CoreResult<()>,
    {
        let now = self.clock.now_ms();
        let mut timers = self.timers.write().await;
        let slot = timers.get_mut(task_id)?;

        if let Err(e) = apply(&mut slot.record, now) {
            tracing::debug!("Ignoring transition for timer {}: {}", task_id, e);
            return None;
        }

        let updated = slot.record.at(now);
        self.commit(&timers);
        Some(updated)
    }

    /// Freeze the remaining time. A timer with nothing left expires instead,
    /// so a paused record always has time to give back.
    pub async fn pause_timer(&self, task_id: &str) -> Option<TimerRecord> {
        let paused = self
            .transition(task_id, |record, now| {
                if record.is_overdue(now) {
                    record.expire()
                } else {
                    record.pause(now)
                }
            })
            .await;
        match paused {
            Some(ref timer) if timer.is_expired() => {
                tracing::info!("Timer {} ran out before pause, expired", task_id);
            }
            Some(ref timer) => {
                tracing::info!(
                    "Paused timer {} with {}s left",
                    task_id,
                    timer.remaining_time
                );
            }
            None => {}
        }
        paused
    }

    pub async fn resume_timer(&self, task_id: &str) -> Option<TimerRecord> {
        let resumed = self
            .transition(task_id, |record, now| record.resume(now))
            .await;
        if resumed.is_some() {
            tracing::info!("Resumed timer {}", task_id);
        }
        resumed
    }

    pub async fn expire_timer(&self, task_id: &str) -> Option<TimerRecord> {
        let expired = self.transition(task_id, |record, _| record.expire()).await;
        if expired.is_some() {
            tracing::info!("Expired timer {}", task_id);
        }
        expired
    }

    /// Mark the timer Completed and drop it from the live set.
    ///
    /// The notification for this commit still carries the Completed record;
    /// storage and later snapshots no longer contain it.
    pub async fn complete_timer(&self, task_id: &str) -> Option<TimerRecord> {
        let now = self.clock.now_ms();
        let mut timers = self.timers.write().await;
        let slot = timers.get_mut(task_id)?;

        if let Err(e) = slot.record.complete(now) {
            tracing::debug!("Ignoring completion of timer {}: {}", task_id, e);
            return None;
        }

        let completed = slot.record.clone();
        let notified = snapshot_of(&timers, now);
        timers.remove(task_id);

        let persisted: Vec<TimerRecord> = notified
            .iter()
            .filter(|record| record.status != TimerStatus::Completed)
            .cloned()
            .collect();
        self.persistence.save(&persisted);
        self.bus.notify(&notified);

        tracing::info!(
            "Completed timer {} with {}s left",
            task_id,
            completed.remaining_time
        );
        Some(completed)
    }

    /// Remove an expired record.
    pub async fn clear_timer(&self, task_id: &str) -> Option<TimerRecord> {
        let mut timers = self.timers.write().await;
        if !timers.get(task_id)?.record.is_expired() {
            return None;
        }

        let cleared = timers.remove(task_id).map(|slot| slot.record);
        self.commit(&timers);
        cleared
    }

    /// Remove every expired record of `owner_id`. Returns how many were removed.
    pub async fn clear_expired(&self, owner_id: &str) -> usize {
        let mut timers = self.timers.write().await;
        let before = timers.len();
        timers.retain(|_, slot| !(slot.record.owner_id == owner_id && slot.record.is_expired()));

        let cleared = before - timers.len();
        if cleared > 0 {
            self.commit(&timers);
        }
        cleared
    }

    /// Seconds left, or `0` for unknown and terminal timers.
    pub async fn get_remaining_time(&self, task_id: &str) -> u64 {
        let now = self.clock.now_ms();
        let timers = self.timers.read().await;
        timers
            .get(task_id)
            .map(|slot| slot.record.remaining_at(now))
            .unwrap_or(0)
    }

    pub async fn get_timer(&self, task_id: &str) -> Option<TimerRecord> {
        let now = self.clock.now_ms();
        let timers = self.timers.read().await;
        timers.get(task_id).map(|slot| slot.record.at(now))
    }

    async fn owner_timers_where<F>(&self, owner_id: &str, keep: F) -> Vec<TimerRecord>
    where
        F: Fn(&TimerRecord) -> bool,
    {
        let now = self.clock.now_ms();
        let timers = self.timers.read().await;
        timers
            .values()
            .filter(|slot| slot.record.owner_id == owner_id && keep(&slot.record))
            .map(|slot| slot.record.at(now))
            .collect()
    }

    pub async fn get_active_timers(&self, owner_id: &str) -> Vec<TimerRecord> {
        self.owner_timers_where(owner_id, TimerRecord::is_active)
            .await
    }

    pub async fn get_expired_timers(&self, owner_id: &str) -> Vec<TimerRecord> {
        self.owner_timers_where(owner_id, TimerRecord::is_expired)
            .await
    }

    pub async fn get_owner_timers(&self, owner_id: &str) -> Vec<TimerRecord> {
        self.owner_timers_where(owner_id, |_| true).await
    }

    pub async fn snapshot(&self) -> Vec<TimerRecord> {
        let now = self.clock.now_ms();
        let timers = self.timers.read().await;
        snapshot_of(&timers, now)
    }

    pub async fn timer_count(&self) -> usize {
        self.timers.read().await.len()
    }

    /// One recompute-and-expire pass. Returns the task ids that expired.
    ///
    /// Subscribers get a single notification per pass while any timer is
    /// counting down, however many timers expired in it.
    pub async fn tick(&self) -> Vec<String> {
        let now = self.clock.now_ms();
        let mut timers = self.timers.write().await;

        let mut counting = 0usize;
        let mut expired = Vec::new();
        for (task_id, slot) in timers.iter_mut() {
            if !slot.record.is_active() {
                continue;
            }
            counting += 1;
            if slot.record.refresh(now) == 0 && slot.record.expire().is_ok() {
                expired.push(task_id.clone());
            }
        }

        if counting == 0 {
            return expired;
        }

        let snapshot = snapshot_of(&timers, now);
        if !expired.is_empty() {
            tracing::info!("Expired {} timer(s): {}", expired.len(), expired.join(", "));
            self.persistence.save(&snapshot);
        }
        self.bus.notify(&snapshot);
        expired
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[TimerRecord]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }

    /// Subscribe and immediately hand `callback` the current snapshot.
    ///
    /// No commit can land between the replay and the registration.
    pub async fn subscribe_with_replay<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[TimerRecord]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let timers = self.timers.read().await;
        if let Err(e) = callback(&snapshot_of(&timers, self.clock.now_ms())) {
            tracing::warn!("Listener failed on replay: {:#}", e);
        }

        let listener = Arc::clone(&callback);
        self.bus.subscribe(move |snapshot| listener(snapshot))
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }

    /// Write the current set to storage. Returns whether the write succeeded.
    pub async fn save_to_storage(&self) -> bool {
        let timers = self.timers.read().await;
        self.persistence
            .save(&snapshot_of(&timers, self.clock.now_ms()))
    }

    /// Replace the live set with the recovered contents of storage.
    /// Returns the number of restored timers.
    pub async fn load_from_storage(&self) -> usize {
        let now = self.clock.now_ms();
        let recovered = self.persistence.load(now);
        let changed = recovered.expired > 0 || recovered.discarded > 0;

        let mut timers = self.timers.write().await;
        *timers = self.slots_from(recovered.timers);
        if changed {
            self.commit(&timers);
        } else {
            self.bus.notify(&snapshot_of(&timers, now));
        }
        timers.len()
    }

    /// Current store generation; bumped by [`TimerStore::destroy`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Every live record with its revision, as of now.
    pub async fn sync_candidates(&self) -> Vec<SyncCandidate> {
        let now = self.clock.now_ms();
        let timers = self.timers.read().await;
        timers
            .values()
            .map(|slot| SyncCandidate {
                record: slot.record.at(now),
                revision: slot.revision,
            })
            .collect()
    }

    /// Record successful pushes. Results from an older generation, or for a
    /// record that has since been replaced or removed, are discarded.
    /// Returns how many records were updated.
    pub async fn apply_sync_results(&self, generation: u64, synced: &[(String, u64)]) -> usize {
        if generation != self.generation() {
            tracing::debug!("Discarding {} sync results from a destroyed store", synced.len());
            return 0;
        }

        let now = self.clock.now_ms();
        let mut timers = self.timers.write().await;
        let mut applied = 0;
        for (task_id, revision) in synced {
            match timers.get_mut(task_id) {
                Some(slot) if slot.revision == *revision => {
                    slot.record.last_sync = now;
                    applied += 1;
                }
                _ => tracing::debug!("Discarding stale sync result for timer {}", task_id),
            }
        }

        if applied > 0 {
            self.commit(&timers);
        }
        applied
    }

    /// Run one sync cycle and wait for its pushes to settle.
    pub async fn sync_once(&self) -> SyncReport {
        match self.sync {
            Some(ref sync) => sync.run_cycle(self).await,
            None => SyncReport::default(),
        }
    }

    /// Ask the scheduler for an immediate sync cycle.
    pub fn request_sync(&self) {
        self.sync_requested.notify_one();
    }

    fn spawn_sync_cycle(self: &Arc<Self>) {
        if self.sync.is_none() {
            return;
        }

        let store = Arc::clone(self);
        tokio::spawn(async move {
            let report = store.sync_once().await;
            if report.attempted > 0 {
                tracing::debug!(
                    "Sync cycle: {} attempted, {} succeeded, {} failed",
                    report.attempted,
                    report.succeeded,
                    report.failed
                );
            }
        });
    }

    /// Drive the tick and sync passes from one task until [`TimerStore::destroy`].
    pub fn spawn_scheduler(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move { store.run_scheduler().await })
    }

    async fn run_scheduler(self: Arc<Self>) {
        let mut tick_interval = interval(self.config.tick_interval());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let sync_period = self.config.sync_interval();
        let mut sync_interval = interval_at(Instant::now() + sync_period, sync_period);
        sync_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            "Timer scheduler started (tick {:?}, sync {:?})",
            self.config.tick_interval(),
            sync_period
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Timer scheduler stopped");
                    break;
                }
                _ = tick_interval.tick() => {
                    self.tick().await;
                }
                _ = sync_interval.tick() => {
                    self.spawn_sync_cycle();
                }
                _ = self.sync_requested.notified() => {
                    tracing::debug!("Immediate sync requested");
                    self.spawn_sync_cycle();
                }
            }
        }
    }

    /// Stop the periodic passes and drop every subscriber. Sync requests
    /// already in flight finish on their own and their results are discarded.
    pub fn destroy(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.shutdown.cancel();
        self.bus.clear();
        tracing::info!("Timer store destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
