use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use tasktimer_core::ManualClock;
use tasktimer_core::models::EngineConfig;
use tasktimer_remote::{Error as RemoteError, RemoteAuthority, Result as RemoteResult, SyncPayload};

use crate::timer::{PersistenceLayer, TimerStore};

pub const T0: i64 = 1_700_000_000_000;

/// Remote authority double that records every push it receives.
#[derive(Default)]
pub struct RecordingAuthority {
    pushes: Mutex<Vec<(String, SyncPayload)>>,
    failing: AtomicBool,
    gate: Option<Semaphore>,
}

impl RecordingAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes block until [`RecordingAuthority::release`] hands out permits.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn release(&self, pushes: usize) {
        if let Some(ref gate) = self.gate {
            gate.add_permits(pushes);
        }
    }

    pub fn pushes(&self) -> Vec<(String, SyncPayload)> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn pushed_ids(&self) -> Vec<String> {
        self.pushes().into_iter().map(|(task_id, _)| task_id).collect()
    }
}

#[async_trait]
impl RemoteAuthority for RecordingAuthority {
    async fn push(&self, task_id: &str, payload: &SyncPayload) -> RemoteResult<()> {
        self.pushes
            .lock()
            .unwrap()
            .push((task_id.to_string(), payload.clone()));

        if let Some(ref gate) = self.gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Api {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(T0))
}

pub fn store_with(clock: &Arc<ManualClock>, persistence: PersistenceLayer) -> TimerStore {
    TimerStore::new(EngineConfig::default(), persistence, clock.clone())
}

pub fn store(clock: &Arc<ManualClock>) -> TimerStore {
    store_with(clock, PersistenceLayer::in_memory())
}

pub fn synced_store(clock: &Arc<ManualClock>, authority: &Arc<RecordingAuthority>) -> TimerStore {
    store(clock).with_remote(authority.clone())
}
