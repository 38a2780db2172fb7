// Common test utilities for integration tests
// Fixtures for users, conversations and messages plus helpers that drive a session

#![allow(dead_code)]

use chrono::Utc;
use log::LevelFilter;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::time::timeout;

use gigconnect::api::MockMessageApi;
use gigconnect::messaging::{Session, SessionConfig, SessionUpdate};
use gigconnect::models::{Conversation, ConversationId, Message, MessageId, Role, UserContext, UserId, UserRef};
use gigconnect::transport::LoopbackTransport;

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// The signed-in user of every test, id "1".
pub fn me() -> UserContext {
    UserContext {
        id: UserId::from("1"),
        name: "Demo User".to_string(),
        role: Role::Client,
        token: "test-token".to_string(),
    }
}

pub fn other_user() -> UserContext {
    UserContext {
        id: UserId::from("99"),
        name: "Someone Else".to_string(),
        role: Role::Freelancer,
        token: "other-token".to_string(),
    }
}

pub fn conversation(id: &str, other_id: &str, other_name: &str) -> Conversation {
    Conversation {
        id: ConversationId::from(id),
        other_user: UserRef {
            id: UserId::from(other_id),
            name: other_name.to_string(),
            role: Role::Freelancer,
            avatar: None,
        },
        last_message: None,
        created_at: Utc::now(),
    }
}

pub fn message(id: u64, conversation_id: &str, sender_id: &str, content: &str) -> Message {
    Message {
        id: Some(MessageId::from(id)),
        conversation_id: ConversationId::from(conversation_id),
        sender_id: UserId::from(sender_id),
        content: content.to_string(),
        created_at: Utc::now(),
    }
}

/// Mock API holding the given conversations and no messages.
pub fn api_with(conversations: Vec<Conversation>) -> Arc<MockMessageApi> {
    delayed_api(conversations, Duration::ZERO)
}

/// Like [`api_with`], answering every call after `delay`.
pub fn delayed_api(conversations: Vec<Conversation>, delay: Duration) -> Arc<MockMessageApi> {
    let api = conversations
        .into_iter()
        .fold(MockMessageApi::new(me().id), |api, c| api.with_conversation(c));
    Arc::new(api.with_delay(delay))
}

pub async fn start_session(api: &Arc<MockMessageApi>, transport: &LoopbackTransport) -> Session {
    start_session_with(api, transport, SessionConfig::default()).await
}

pub async fn start_session_with(
    api: &Arc<MockMessageApi>,
    transport: &LoopbackTransport,
    config: SessionConfig,
) -> Session {
    setup_logging();
    let api: Arc<dyn gigconnect::api::MessageApi> = api.clone();
    Session::start(me(), Box::new(transport.clone()), api, config).await
}

/// Apply every update that is ready without waiting on timers.
pub async fn settle(session: &mut Session) -> Vec<SessionUpdate> {
    let mut updates = Vec::new();
    while let Ok(Some(update)) = timeout(Duration::from_millis(20), session.next_update()).await {
        updates.push(update);
    }
    updates
}

/// Drive the session until an update matches `predicate`, collecting everything seen.
pub async fn wait_for<F>(session: &mut Session, predicate: F) -> Vec<SessionUpdate>
where
    F: Fn(&SessionUpdate) -> bool,
{
    let mut seen = Vec::new();
    let result = timeout(Duration::from_secs(30), async {
        while let Some(update) = session.next_update().await {
            let done = predicate(&update);
            seen.push(update);
            if done {
                return true;
            }
        }
        false
    })
    .await;

    match result {
        Ok(true) => seen,
        _ => panic!("Expected update never arrived, saw {:?}", seen),
    }
}

pub fn history_contents(session: &Session) -> Vec<String> {
    session
        .history()
        .entries()
        .iter()
        .map(|entry| entry.message().content.clone())
        .collect()
}
