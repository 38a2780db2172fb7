// Persistence API for conversations and messages
// Request/response over HTTP with JSON bodies; a mock backend mirrors the development data

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{Conversation, ConversationId, Message, MessageId, SendMessageRequest, UserId, UserRef};

pub mod http;
pub mod mock;

pub use http::HttpMessageApi;
pub use mock::MockMessageApi;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx response, carrying the server-supplied message when there was one
    #[error("{message} (HTTP {status})")]
    Server { status: u16, message: String },

    #[error("Unexpected response body: {0}")]
    Decode(String),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
}

#[async_trait]
pub trait MessageApi: Send + Sync {
    /// Conversations of the authenticated user, in server order.
    async fn get_conversations(&self) -> Result<Vec<Conversation>, ApiError>;

    /// Full history of one conversation.
    async fn get_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, ApiError>;

    /// Persist a new message and return the server copy.
    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, ApiError>;
}

// Wire records are lenient: the backends omit conversationId/senderId/createdAt
// in some responses, and the missing parts are filled in from request context.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageRecord {
    #[serde(default)]
    id: Option<MessageId>,
    #[serde(default)]
    conversation_id: Option<ConversationId>,
    #[serde(default)]
    sender_id: Option<UserId>,
    content: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl MessageRecord {
    pub(crate) fn into_message(
        self,
        conversation_id: &ConversationId,
        sender_fallback: Option<&UserId>,
    ) -> Option<Message> {
        let sender_id = match self.sender_id.or_else(|| sender_fallback.cloned()) {
            Some(sender) => sender,
            None => {
                debug!("Skipping message record without sender: {:?}", self.id);
                return None;
            }
        };
        Some(Message {
            id: self.id,
            conversation_id: self.conversation_id.unwrap_or_else(|| conversation_id.clone()),
            sender_id,
            content: self.content,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConversationRecord {
    id: ConversationId,
    other_user: UserRef,
    #[serde(default)]
    last_message: Option<MessageRecord>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl ConversationRecord {
    pub(crate) fn into_conversation(self) -> Conversation {
        let last_message = self
            .last_message
            .and_then(|record| record.into_message(&self.id, None));
        Conversation {
            id: self.id,
            other_user: self.other_user,
            last_message,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}
