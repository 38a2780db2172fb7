use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;

use super::ServerEvent;

type Registry = Mutex<HashMap<u64, mpsc::UnboundedSender<ServerEvent>>>;

/// Fan-out of received transport events to every live subscription.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.registry).insert(id, tx);
        debug!("Transport subscription {} registered", id);

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event to all subscribers, in call order.
    pub fn publish(&self, event: ServerEvent) {
        let mut registry = lock(&self.registry);
        // Receivers that went away without unsubscribing are pruned here
        registry.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).len()
    }
}

fn lock(registry: &Registry) -> std::sync::MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<ServerEvent>>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle returned by [`EventBus::subscribe`]. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Wait for the next event. `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(&self.id);
            debug!("Transport subscription {} removed", self.id);
        }
    }
}
