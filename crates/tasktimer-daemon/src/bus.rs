//! Snapshot fan-out to subscribers

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tasktimer_core::TimerRecord;

/// Callback invoked with the full timer set after every committed change.
pub type Listener = Arc<dyn Fn(&[TimerRecord]) -> anyhow::Result<()> + Send + Sync>;

/// A subscriber that failed while handling a notification.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Listener {id} failed: {message}")]
    Failed { id: u64, message: String },

    #[error("Listener {id} panicked: {message}")]
    Panicked { id: u64, message: String },
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // Listeners never run under this lock, so a poisoned registry is still consistent.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Observer registry. Every notification carries the whole snapshot, never a delta.
///
/// Listeners run synchronously in registration order. A listener that returns
/// an error or panics is logged and skipped; the remaining listeners of the
/// same notification still run.
#[derive(Clone, Default)]
pub struct NotificationBus {
    registry: Arc<Mutex<Registry>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[TimerRecord]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(callback)));
        tracing::debug!("Listener {} subscribed", id);

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `snapshot` to every listener. Returns the failures, which have
    /// already been logged.
    pub fn notify(&self, snapshot: &[TimerRecord]) -> Vec<ListenerError> {
        // Listeners may unsubscribe themselves, so call them on a copy of the list.
        let listeners: Vec<(u64, Listener)> = lock(&self.registry).listeners.clone();

        let mut failures = Vec::new();
        for (id, listener) in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(snapshot)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => ListenerError::Failed {
                    id,
                    message: format!("{:#}", e),
                },
                Err(panic) => ListenerError::Panicked {
                    id,
                    message: panic_message(panic.as_ref()),
                },
            };
            tracing::warn!("{}", failure);
            failures.push(failure);
        }

        failures
    }

    pub fn clear(&self) {
        lock(&self.registry).listeners.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Registration handle. Dropping it unsubscribes the listener.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).listeners.retain(|(id, _)| *id != self.id);
            tracing::debug!("Listener {} unsubscribed", self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(task_id: &str) -> TimerRecord {
        TimerRecord::new(task_id.to_string(), "u1".to_string(), 10, 0)
    }

    #[test]
    fn test_all_listeners_receive_full_snapshot() {
        let bus = NotificationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_a = seen.clone();
        let _a = bus.subscribe(move |snapshot| {
            seen_a.lock().unwrap().push(("a", snapshot.len()));
            Ok(())
        });
        let seen_b = seen.clone();
        let _b = bus.subscribe(move |snapshot| {
            seen_b.lock().unwrap().push(("b", snapshot.len()));
            Ok(())
        });

        let failures = bus.notify(&[record("t1"), record("t2")]);
        assert!(failures.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec![("a", 2), ("b", 2)]);
    }

    #[test]
    fn test_failing_listener_is_isolated() {
        let bus = NotificationBus::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        let _a = bus.subscribe(|_| anyhow::bail!("render failed"));
        let counter = delivered.clone();
        let _b = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let failures = bus.notify(&[record("t1")]);
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], ListenerError::Failed { .. }));
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let bus = NotificationBus::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        let _a = bus.subscribe(|_| panic!("listener bug"));
        let counter = delivered.clone();
        let _b = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let failures = bus.notify(&[]);
        match &failures[..] {
            [ListenerError::Panicked { message, .. }] => assert_eq!(message, "listener bug"),
            other => panic!("Expected one panic, got {:?}", other),
        }
        assert_eq!(delivered.load(Ordering::SeqCst), 1);

        // Still usable after a listener panicked.
        bus.notify(&[]);
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = NotificationBus::new();
        let a = bus.subscribe(|_| Ok(()));
        let b = bus.subscribe(|_| Ok(()));
        assert_eq!(bus.subscriber_count(), 2);

        a.unsubscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(b);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_clear_removes_everyone() {
        let bus = NotificationBus::new();
        let _a = bus.subscribe(|_| Ok(()));
        let _b = bus.subscribe(|_| Ok(()));

        bus.clear();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscription_outliving_bus() {
        let bus = NotificationBus::new();
        let subscription = bus.subscribe(|_| Ok(()));
        drop(bus);
        drop(subscription);
    }
}
