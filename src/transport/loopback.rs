use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use super::{ClientEvent, EventBus, ServerEvent, Subscription, Transport};
use crate::error::MessagingError;

/// In-memory transport for offline mode and tests.
///
/// Emitted events are recorded instead of sent; incoming events are injected
/// with [`LoopbackTransport::inject`]. Clones share the same state.
#[derive(Clone)]
pub struct LoopbackTransport {
    bus: EventBus,
    connected: Arc<AtomicBool>,
    reachable: Arc<AtomicBool>,
    connects: Arc<AtomicU32>,
    sent: Arc<Mutex<Vec<ClientEvent>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        LoopbackTransport {
            bus: EventBus::new(),
            connected: Arc::new(AtomicBool::new(false)),
            reachable: Arc::new(AtomicBool::new(true)),
            connects: Arc::new(AtomicU32::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// When unreachable, `connect` fails and an open connection drops.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
        if !reachable && self.connected.swap(false, Ordering::SeqCst) {
            self.bus.publish(ServerEvent::Disconnected {
                reason: "transport unreachable".to_string(),
            });
        }
    }

    /// Deliver an event as if it came from the server.
    pub fn inject(&self, event: ServerEvent) {
        self.bus.publish(event);
    }

    pub fn sent(&self) -> Vec<ClientEvent> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn take_sent(&self) -> Vec<ClientEvent> {
        self.sent
            .lock()
            .map(|mut sent| std::mem::take(&mut *sent))
            .unwrap_or_default()
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(&self, _token: &str) -> Result<(), MessagingError> {
        if self.connected.load(Ordering::SeqCst) {
            self.disconnect().await;
        }
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(MessagingError::ConnectFailed {
                attempts: 1,
                reason: "transport unreachable".to_string(),
            });
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        info!("Loopback transport connected");
        self.bus.publish(ServerEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Loopback transport disconnected");
            self.bus.publish(ServerEvent::Disconnected {
                reason: "client disconnect".to_string(),
            });
        }
    }

    fn emit(&self, event: ClientEvent) -> Result<(), MessagingError> {
        if !self.connected.load(Ordering::SeqCst) {
            warn!("Transport not connected. Cannot emit: {}", event.name());
            return Err(MessagingError::TransportUnavailable(event.name()));
        }
        debug!("Loopback emit: {:?}", event);
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(event);
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConversationId;

    #[tokio::test]
    async fn test_emit_while_disconnected_is_dropped() {
        let transport = LoopbackTransport::new();
        let result = transport.emit(ClientEvent::JoinRoom(ConversationId::from("1")));

        assert_eq!(result, Err(MessagingError::TransportUnavailable("join_room")));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let transport = LoopbackTransport::new();
        let mut events = transport.subscribe();

        transport.disconnect().await;
        transport.connect("token").await.unwrap();
        transport.disconnect().await;
        transport.disconnect().await;

        assert_eq!(events.try_recv(), Some(ServerEvent::Connected));
        assert!(matches!(events.try_recv(), Some(ServerEvent::Disconnected { .. })));
        assert_eq!(events.try_recv(), None);
    }

    #[tokio::test]
    async fn test_connect_while_connected_reconnects() {
        let transport = LoopbackTransport::new();
        transport.connect("a").await.unwrap();
        transport.connect("b").await.unwrap();

        assert_eq!(transport.connect_count(), 2);
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn test_unreachable_connect_fails() {
        let transport = LoopbackTransport::new();
        transport.set_reachable(false);

        let err = transport.connect("token").await.unwrap_err();
        assert!(matches!(err, MessagingError::ConnectFailed { .. }));
        assert!(!transport.is_connected());
    }
}
