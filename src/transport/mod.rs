// Real-time transport for GigConnect messaging
// Carries message, typing and presence events outside the persistence API

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::MessagingError;
use crate::models::{ConversationId, Message, MessageId, UserId};

pub mod bus;
pub mod frame;
pub mod loopback;
pub mod socket;

pub use bus::{EventBus, Subscription};
pub use loopback::LoopbackTransport;
pub use socket::SocketTransport;

/// Payload of `typing` / `stop_typing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
}

/// Payload we emit after a message was persisted, so the counterparty gets it live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub conversation_id: ConversationId,
    pub content: String,
    pub receiver_id: UserId,
    pub sender_id: UserId,
}

/// A `message` event relayed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub conversation_id: ConversationId,
    pub content: String,
    pub receiver_id: UserId,
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl IncomingMessage {
    /// Convert to a history message, stamping arrival time when the payload has none.
    pub fn into_message(self, received_at: DateTime<Utc>) -> Message {
        Message {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            content: self.content,
            created_at: self.created_at.unwrap_or(received_at),
        }
    }
}

/// Events the client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    JoinRoom(ConversationId),
    Message(OutgoingMessage),
    Typing(TypingPayload),
    StopTyping(TypingPayload),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom(_) => frame::JOIN_ROOM,
            ClientEvent::Message(_) => frame::MESSAGE,
            ClientEvent::Typing(_) => frame::TYPING,
            ClientEvent::StopTyping(_) => frame::STOP_TYPING,
        }
    }
}

/// Events delivered to subscribers, including connection lifecycle changes.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Message(IncomingMessage),
    Typing(TypingPayload),
    StopTyping(TypingPayload),
    UserOnline(UserId),
    UserOffline(UserId),
    Connected,
    Disconnected { reason: String },
}

/// Bounded reconnection: fixed number of attempts with a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            attempts: 5,
            delay: Duration::from_millis(1000),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// A persistent bidirectional event channel scoped to one signed-in user.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection, tearing down any existing one first.
    ///
    /// Dropping the returned future stops the wait, not the attempt: the
    /// outcome still shows up as `Connected` on the subscriptions.
    async fn connect(&self, token: &str) -> Result<(), MessagingError>;

    /// Close the connection. A no-op when nothing is open.
    async fn disconnect(&self);

    /// Fire-and-forget send. Dropped with a warning when not connected.
    fn emit(&self, event: ClientEvent) -> Result<(), MessagingError>;

    fn subscribe(&self) -> Subscription;

    fn is_connected(&self) -> bool;
}
