//! Owner- and task-scoped views over the timer store
//!
//! An [`OwnerView`] keeps a live copy of one owner's timers for the lifetime
//! of the view. A [`TaskHandle`] binds the imperative operations to a single
//! task. Connectivity and visibility signals are forwarded to the store as
//! immediate sync requests.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use tasktimer_core::{TimerRecord, UrgencyLevel, format_remaining, timer_urgency};

use crate::bus::Subscription;
use crate::timer::TimerStore;

/// External events that warrant an immediate sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Network connectivity came back.
    Online,
    /// The consumer returned to the foreground.
    Visible,
}

/// Reactive projection of every timer belonging to one owner.
///
/// The view subscribes on activation and unsubscribes when deactivated or dropped.
pub struct OwnerView {
    store: Arc<TimerStore>,
    owner_id: String,
    timers: watch::Receiver<Vec<TimerRecord>>,
    subscription: Option<Subscription>,
}

impl OwnerView {
    pub async fn activate(store: Arc<TimerStore>, owner_id: impl Into<String>) -> Self {
        let owner_id = owner_id.into();
        let (tx, mut timers) = watch::channel(Vec::new());

        let owner = owner_id.clone();
        let subscription = store
            .subscribe_with_replay(move |snapshot| {
                let owned: Vec<TimerRecord> = snapshot
                    .iter()
                    .filter(|timer| timer.owner_id == owner)
                    .cloned()
                    .collect();
                tx.send_replace(owned);
                Ok(())
            })
            .await;
        // The replayed snapshot is the starting point, not an update.
        timers.borrow_and_update();
        tracing::debug!("Activated view for owner {}", owner_id);

        Self {
            store,
            owner_id,
            timers,
            subscription: Some(subscription),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    /// The owner's timers as of the last notification.
    pub fn timers(&self) -> Vec<TimerRecord> {
        self.timers.borrow().clone()
    }

    pub fn active(&self) -> Vec<TimerRecord> {
        self.timers
            .borrow()
            .iter()
            .filter(|timer| timer.is_active())
            .cloned()
            .collect()
    }

    pub fn expired(&self) -> Vec<TimerRecord> {
        self.timers
            .borrow()
            .iter()
            .filter(|timer| timer.is_expired())
            .cloned()
            .collect()
    }

    /// A receiver that observes every update of this view.
    pub fn watch(&self) -> watch::Receiver<Vec<TimerRecord>> {
        self.timers.clone()
    }

    /// Wait for the next update. Returns `false` once the view can no longer change.
    pub async fn changed(&mut self) -> bool {
        self.timers.changed().await.is_ok()
    }

    pub fn task(&self, task_id: impl Into<String>) -> TaskHandle {
        TaskHandle {
            store: self.store.clone(),
            task_id: task_id.into(),
            owner_id: self.owner_id.clone(),
        }
    }

    pub fn handle_signal(&self, signal: Signal) {
        request_sync(&self.store, signal);
    }

    pub fn deactivate(&mut self) {
        if self.subscription.take().is_some() {
            tracing::debug!("Deactivated view for owner {}", self.owner_id);
        }
    }
}

/// A single task's timer plus the operations bound to it.
#[derive(Clone)]
pub struct TaskHandle {
    store: Arc<TimerStore>,
    task_id: String,
    owner_id: String,
}

impl TaskHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub async fn timer(&self) -> Option<TimerRecord> {
        self.store.get_timer(&self.task_id).await
    }

    pub async fn remaining_time(&self) -> u64 {
        self.store.get_remaining_time(&self.task_id).await
    }

    /// Remaining time for display, `"Expired"` once the timer has expired.
    pub async fn formatted_remaining(&self) -> Option<String> {
        self.timer().await.as_ref().map(format_remaining)
    }

    pub async fn urgency(&self) -> Option<UrgencyLevel> {
        self.timer().await.as_ref().map(timer_urgency)
    }

    pub async fn start(&self, duration_seconds: u64) -> TimerRecord {
        self.store
            .start_timer(&self.task_id, &self.owner_id, duration_seconds)
            .await
    }

    pub async fn pause(&self) -> Option<TimerRecord> {
        self.store.pause_timer(&self.task_id).await
    }

    pub async fn resume(&self) -> Option<TimerRecord> {
        self.store.resume_timer(&self.task_id).await
    }

    pub async fn complete(&self) -> Option<TimerRecord> {
        self.store.complete_timer(&self.task_id).await
    }

    pub async fn expire(&self) -> Option<TimerRecord> {
        self.store.expire_timer(&self.task_id).await
    }
}

fn request_sync(store: &TimerStore, signal: Signal) {
    tracing::debug!("{:?} signal received, requesting sync", signal);
    store.request_sync();
}

/// Turn every received [`Signal`] into an immediate sync request until the
/// sending side closes.
pub fn forward_signals(store: Arc<TimerStore>, mut signals: mpsc::Receiver<Signal>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = signals.recv().await {
            if store.is_destroyed() {
                break;
            }
            request_sync(&store, signal);
        }
        tracing::debug!("Signal forwarder stopped");
    })
}
