use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::info;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{ApiError, MessageApi};
use crate::models::{
    Conversation, ConversationId, Message, MessageId, Role, SendMessageRequest, UserId, UserRef,
};

fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory stand-in for the persistence API, used in development mode and tests.
pub struct MockMessageApi {
    me: UserId,
    delay: Duration,
    conversations: Mutex<Vec<Conversation>>,
    messages: Mutex<Vec<Message>>,
    fail_loads: AtomicBool,
    fail_sends: AtomicBool,
    next_id: AtomicU64,
}

// Server ids handed out by send_message start here, above every seeded id
const FIRST_SENT_ID: u64 = 100;

impl MockMessageApi {
    /// Empty backend for `me`, answering without delay.
    pub fn new(me: UserId) -> Self {
        MockMessageApi {
            me,
            delay: Duration::ZERO,
            conversations: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            fail_loads: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            next_id: AtomicU64::new(FIRST_SENT_ID),
        }
    }

    /// Backend preloaded with the development conversations.
    pub fn seeded(me: UserId) -> Self {
        let api = Self::new(me);
        api.seed();
        api
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_conversation(self, conversation: Conversation) -> Self {
        lock(&self.conversations).push(conversation);
        self
    }

    pub fn add_message(&self, message: Message) {
        self.reserve_id(&message);
        lock(&self.messages).push(message);
    }

    // Keep later sends clear of numeric ids that were stored directly
    fn reserve_id(&self, message: &Message) {
        if let Some(id) = message.id.as_ref().and_then(|id| id.as_str().parse::<u64>().ok()) {
            self.next_id.fetch_max(id + 1, Ordering::SeqCst);
        }
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn stored_messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        lock(&self.messages)
            .iter()
            .filter(|m| &m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    fn seed(&self) {
        let me = self.me.clone();
        let first = ConversationId::from(1);
        let mut messages = lock(&self.messages);
        messages.extend([
            Message {
                id: Some(MessageId::from(1)),
                conversation_id: first.clone(),
                sender_id: UserId::from(2),
                content: "Hi! I'm interested in your e-commerce project.".to_string(),
                created_at: at(2025, 7, 15, 10, 0),
            },
            Message {
                id: Some(MessageId::from(2)),
                conversation_id: first.clone(),
                sender_id: me.clone(),
                content: "Great! I'd love to discuss the requirements in detail.".to_string(),
                created_at: at(2025, 8, 15, 10, 15),
            },
            Message {
                id: Some(MessageId::from(3)),
                conversation_id: first.clone(),
                sender_id: me.clone(),
                content: "Thanks for your interest in the project! When can we schedule a call?".to_string(),
                created_at: at(2025, 9, 15, 10, 30),
            },
        ]);

        let mut conversations = lock(&self.conversations);
        conversations.push(Conversation {
            id: first.clone(),
            other_user: UserRef {
                id: UserId::from(2),
                name: "Shankar Yerra".to_string(),
                role: Role::Freelancer,
                avatar: None,
            },
            last_message: messages.last().cloned(),
            created_at: at(2025, 8, 15, 10, 0),
        });
        conversations.push(Conversation {
            id: ConversationId::from(2),
            other_user: UserRef {
                id: UserId::from(3),
                name: "Siva Kumar".to_string(),
                role: Role::Freelancer,
                avatar: None,
            },
            last_message: Some(Message {
                id: Some(MessageId::from(4)),
                conversation_id: ConversationId::from(2),
                sender_id: UserId::from(3),
                content: "I've reviewed your requirements. When can we start the project?".to_string(),
                created_at: at(2025, 9, 16, 15, 45),
            }),
            created_at: at(2025, 9, 16, 15, 0),
        });
    }

    async fn simulate_latency(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

fn mock_error(message: &str) -> ApiError {
    ApiError::Server {
        status: 400,
        message: message.to_string(),
    }
}

#[async_trait]
impl MessageApi for MockMessageApi {
    async fn get_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        self.simulate_latency().await;
        info!("Mock API: GET /messages/conversations");
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(mock_error("Failed to fetch conversations"));
        }
        Ok(lock(&self.conversations).clone())
    }

    async fn get_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, ApiError> {
        self.simulate_latency().await;
        info!("Mock API: GET /messages/{}", conversation_id);
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(mock_error("Failed to fetch messages"));
        }
        Ok(self.stored_messages(conversation_id))
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, ApiError> {
        self.simulate_latency().await;
        info!("Mock API: POST /messages ({})", request.conversation_id);
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(mock_error("Failed to send message"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = Message {
            id: Some(MessageId::from(id)),
            conversation_id: request.conversation_id.clone(),
            sender_id: self.me.clone(),
            content: request.content.clone(),
            created_at: Utc::now(),
        };

        lock(&self.messages).push(message.clone());
        if let Some(conversation) = lock(&self.conversations)
            .iter_mut()
            .find(|c| c.id == request.conversation_id)
        {
            conversation.last_message = Some(message.clone());
        }
        Ok(message)
    }
}
