// Messaging session of one signed-in user
// Owns the transport and all store state; a single task drives it through next_update()

use chrono::Utc;
use log::{debug, error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::composer::Composer;
use super::conversations::ConversationStore;
use super::history::MessageHistory;
use super::notifications::{self, Notification, Notifications};
use super::presence::PresenceTracker;
use super::typing::{self, TypingCoordinator};
use crate::api::{ApiError, MessageApi};
use crate::error::MessagingError;
use crate::models::{Conversation, ConversationId, Message, SendMessageRequest, TempId, UserContext, UserId};
use crate::transport::{ClientEvent, OutgoingMessage, ServerEvent, Subscription, Transport};

/// Timing knobs of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub typing_debounce: Duration,
    /// `None` keeps a remote typing indicator until `stop_typing` arrives.
    pub typing_indicator_timeout: Option<Duration>,
    pub notification_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            typing_debounce: typing::DEFAULT_DEBOUNCE,
            typing_indicator_timeout: Some(typing::DEFAULT_INDICATOR_TIMEOUT),
            notification_ttl: notifications::DEFAULT_TTL,
        }
    }
}

/// What a call to [`Session::next_update`] changed.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// The event was consumed without visible effect.
    Unchanged,
    /// Conversation list replaced (or emptied after a failed fetch).
    ConversationsChanged,
    /// History of the active conversation replaced (or emptied after a failed fetch).
    HistoryLoaded(ConversationId),
    MessageReceived {
        conversation_id: ConversationId,
        /// Whether it was appended to the active history.
        in_history: bool,
    },
    MessageConfirmed {
        temp_id: TempId,
        conversation_id: ConversationId,
    },
    SendFailed {
        temp_id: TempId,
        conversation_id: ConversationId,
    },
    TypingChanged(bool),
    PresenceChanged(UserId),
    ConnectionChanged(bool),
}

/// Results of spawned API calls, applied on the session's task.
enum Completion {
    Conversations(Result<Vec<Conversation>, ApiError>),
    History {
        conversation_id: ConversationId,
        request: u64,
        result: Result<Vec<Message>, ApiError>,
    },
    Sent {
        temp_id: TempId,
        request: SendMessageRequest,
        result: Result<Message, ApiError>,
    },
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

pub struct Session {
    user: UserContext,
    transport: Box<dyn Transport>,
    api: Arc<dyn MessageApi>,
    subscription: Option<Subscription>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    conversations: ConversationStore,
    history: MessageHistory,
    composer: Composer,
    presence: PresenceTracker,
    typing: TypingCoordinator,
    notifications: Notifications,
    history_request: u64,
    loading_history: bool,
    connected: bool,
}

impl Session {
    /// Subscribe, connect and fetch the conversation list.
    ///
    /// Neither a connect failure nor a failed fetch aborts the session: the
    /// first leaves it without live updates, the second with an empty list and
    /// a notification.
    pub async fn start(
        user: UserContext,
        transport: Box<dyn Transport>,
        api: Arc<dyn MessageApi>,
        config: SessionConfig,
    ) -> Session {
        let subscription = transport.subscribe();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let mut session = Session {
            user,
            transport,
            api,
            subscription: Some(subscription),
            completions_tx,
            completions_rx,
            conversations: ConversationStore::new(),
            history: MessageHistory::new(),
            composer: Composer::new(),
            presence: PresenceTracker::new(),
            typing: TypingCoordinator::new(config.typing_debounce, config.typing_indicator_timeout),
            notifications: Notifications::new(config.notification_ttl),
            history_request: 0,
            loading_history: false,
            connected: false,
        };

        info!("Starting messaging session for user {}", session.user.id);
        let result = session.connect_and_fetch().await;
        session.apply_conversations(result);
        session
    }

    /// Connect and fetch the conversation list side by side.
    ///
    /// The list never waits for the reconnect budget: once it has arrived, a
    /// connect still in progress is left to the transport and reports back
    /// through `Connected` on the subscription.
    async fn connect_and_fetch(&self) -> Result<Vec<Conversation>, ApiError> {
        let connect = self.transport.connect(&self.user.token);
        let fetch = self.api.get_conversations();
        tokio::pin!(connect, fetch);

        let mut connecting = true;
        loop {
            tokio::select! {
                biased;
                result = &mut connect, if connecting => {
                    connecting = false;
                    if let Err(e) = result {
                        error!("Transport connect failed, continuing without live updates: {}", e);
                    }
                }
                result = &mut fetch => {
                    if connecting {
                        debug!("Conversations loaded while the transport is still connecting");
                    }
                    return result;
                }
            }
        }
    }

    pub fn user(&self) -> &UserContext {
        &self.user
    }

    pub fn conversations(&self) -> &[Conversation] {
        self.conversations.list()
    }

    pub fn active_conversation_id(&self) -> Option<&ConversationId> {
        self.conversations.active_id()
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.conversations.active()
    }

    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    pub fn is_loading_history(&self) -> bool {
        self.loading_history
    }

    pub fn input(&self) -> &str {
        self.composer.input()
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.presence.is_online(user_id)
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Whether the counterparty of the active conversation is typing.
    pub fn is_typing(&self) -> bool {
        self.typing.is_typing(Instant::now())
    }

    pub fn notifications(&self) -> &Notifications {
        &self.notifications
    }

    pub fn notifications_mut(&mut self) -> &mut Notifications {
        &mut self.notifications
    }

    /// Connection state as last reported by the transport.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Make `conversation_id` active: load its history and join its room.
    ///
    /// Selecting the active conversation again reloads it. Returns false for
    /// a conversation that is not in the list.
    pub fn select(&mut self, conversation_id: &ConversationId) -> bool {
        if self.conversations.get(conversation_id).is_none() {
            warn!("Cannot select unknown conversation {}", conversation_id);
            return false;
        }

        self.conversations.select(conversation_id.clone());
        self.typing.remote_stopped();
        self.history.clear(conversation_id.clone());
        self.load_history(conversation_id.clone());
        self.emit(ClientEvent::JoinRoom(conversation_id.clone()));
        true
    }

    /// Re-fetch the active conversation's history.
    pub fn reload_history(&mut self) -> bool {
        match self.conversations.active_id().cloned() {
            Some(conversation_id) => {
                self.load_history(conversation_id);
                true
            }
            None => false,
        }
    }

    fn load_history(&mut self, conversation_id: ConversationId) {
        self.history_request += 1;
        self.loading_history = true;
        let request = self.history_request;
        let api = Arc::clone(&self.api);
        self.spawn_completion(async move {
            let result = api.get_messages(&conversation_id).await;
            Completion::History {
                conversation_id,
                request,
                result,
            }
        });
    }

    /// Re-fetch the conversation list in the background.
    pub fn refresh_conversations(&mut self) {
        let api = Arc::clone(&self.api);
        self.spawn_completion(async move { Completion::Conversations(api.get_conversations().await) });
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.composer.set_input(text);
    }

    /// Announce typing in the active conversation. Returns false without one.
    pub fn keystroke(&mut self) -> bool {
        let conversation_id = match self.conversations.active_id() {
            Some(id) => id.clone(),
            None => return false,
        };
        for event in self
            .typing
            .keystroke(conversation_id, self.user.id.clone(), Instant::now())
        {
            self.emit(event);
        }
        true
    }

    /// Send the composer text to the active conversation.
    ///
    /// The message shows up at once as a pending entry and the input is
    /// cleared; the persistence call completes later through
    /// [`next_update`](Self::next_update). Blank input or no selection is a
    /// no-op.
    pub fn send(&mut self) -> Option<TempId> {
        let (conversation_id, receiver_id) = match self.conversations.active() {
            Some(conversation) => (conversation.id.clone(), conversation.other_user.id.clone()),
            None => {
                debug!("Send ignored, no conversation selected");
                return None;
            }
        };
        let content = self.composer.take_for_send()?;

        let optimistic = Message {
            id: None,
            conversation_id: conversation_id.clone(),
            sender_id: self.user.id.clone(),
            content: content.clone(),
            created_at: Utc::now(),
        };
        let temp_id = match self.history.push_pending(optimistic) {
            Some(temp_id) => temp_id,
            None => {
                warn!("History not bound to {}, keeping input", conversation_id);
                self.composer.restore(content);
                return None;
            }
        };

        debug!("Sending {} to conversation {}", temp_id, conversation_id);
        let request = SendMessageRequest {
            conversation_id,
            content,
            receiver_id,
        };
        let api = Arc::clone(&self.api);
        self.spawn_completion(async move {
            let result = api.send_message(&request).await;
            Completion::Sent {
                temp_id,
                request,
                result,
            }
        });
        Some(temp_id)
    }

    /// Wait for the next transport event, API completion or typing deadline
    /// and apply it. Returns `None` once the session has been shut down.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        let deadline = self.typing.next_deadline();
        let subscription = self.subscription.as_mut()?;

        tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => Some(self.handle_event(event)),
                None => {
                    warn!("Transport subscription closed");
                    self.subscription = None;
                    None
                }
            },
            completion = self.completions_rx.recv() => match completion {
                Some(completion) => Some(self.apply_completion(completion)),
                None => Some(SessionUpdate::Unchanged),
            },
            _ = wait_until(deadline) => Some(self.on_typing_deadline()),
        }
    }

    /// Apply one transport event to the stores.
    pub fn handle_event(&mut self, event: ServerEvent) -> SessionUpdate {
        debug!("Session event: {:?}", event);
        match event {
            ServerEvent::Message(incoming) => {
                let message = incoming.into_message(Utc::now());
                let conversation_id = message.conversation_id.clone();
                let active = self.conversations.is_active(&conversation_id);

                if active && message.sender_id != self.user.id {
                    self.typing.remote_stopped();
                }
                let in_list = self.conversations.apply_incoming(&message);
                let in_history = active && self.history.append(message);

                if in_list || in_history {
                    SessionUpdate::MessageReceived {
                        conversation_id,
                        in_history,
                    }
                } else {
                    SessionUpdate::Unchanged
                }
            }
            ServerEvent::Typing(payload) => {
                if self.conversations.is_active(&payload.conversation_id) && payload.user_id != self.user.id {
                    self.typing.remote_typing(Instant::now());
                    SessionUpdate::TypingChanged(true)
                } else {
                    SessionUpdate::Unchanged
                }
            }
            ServerEvent::StopTyping(payload) => {
                if self.conversations.is_active(&payload.conversation_id) {
                    self.typing.remote_stopped();
                    SessionUpdate::TypingChanged(false)
                } else {
                    SessionUpdate::Unchanged
                }
            }
            ServerEvent::UserOnline(user_id) => {
                if self.presence.set_online(user_id.clone()) {
                    SessionUpdate::PresenceChanged(user_id)
                } else {
                    SessionUpdate::Unchanged
                }
            }
            ServerEvent::UserOffline(user_id) => {
                if self.presence.set_offline(&user_id) {
                    SessionUpdate::PresenceChanged(user_id)
                } else {
                    SessionUpdate::Unchanged
                }
            }
            ServerEvent::Connected => {
                info!("Transport connected");
                self.connected = true;
                // Presence is rebuilt from the events of the new connection
                self.presence.reset();
                if let Some(conversation_id) = self.conversations.active_id().cloned() {
                    self.emit(ClientEvent::JoinRoom(conversation_id));
                }
                SessionUpdate::ConnectionChanged(true)
            }
            ServerEvent::Disconnected { reason } => {
                info!("Transport disconnected: {}", reason);
                self.connected = false;
                SessionUpdate::ConnectionChanged(false)
            }
        }
    }

    fn apply_completion(&mut self, completion: Completion) -> SessionUpdate {
        match completion {
            Completion::Conversations(result) => {
                self.apply_conversations(result);
                SessionUpdate::ConversationsChanged
            }
            Completion::History {
                conversation_id,
                request,
                result,
            } => {
                if request != self.history_request || !self.conversations.is_active(&conversation_id) {
                    debug!("Dropping stale history for conversation {}", conversation_id);
                    return SessionUpdate::Unchanged;
                }
                self.loading_history = false;
                match result {
                    Ok(messages) => self.history.replace(conversation_id.clone(), messages),
                    Err(e) => {
                        self.history.clear(conversation_id.clone());
                        self.fail(MessagingError::LoadFailed {
                            what: "messages",
                            reason: e.to_string(),
                        });
                    }
                }
                SessionUpdate::HistoryLoaded(conversation_id)
            }
            Completion::Sent {
                temp_id,
                request,
                result,
            } => self.apply_sent(temp_id, request, result),
        }
    }

    fn apply_conversations(&mut self, result: Result<Vec<Conversation>, ApiError>) {
        match result {
            Ok(conversations) => self.conversations.replace(conversations),
            Err(e) => {
                self.conversations.clear();
                self.fail(MessagingError::LoadFailed {
                    what: "conversations",
                    reason: e.to_string(),
                });
            }
        }
    }

    fn apply_sent(
        &mut self,
        temp_id: TempId,
        request: SendMessageRequest,
        result: Result<Message, ApiError>,
    ) -> SessionUpdate {
        let conversation_id = request.conversation_id.clone();
        match result {
            Ok(message) => {
                self.history.confirm(temp_id, message.clone());
                self.conversations.record_sent(&message);
                // Already persisted; live delivery is best-effort
                self.emit(ClientEvent::Message(OutgoingMessage {
                    conversation_id: request.conversation_id,
                    content: request.content,
                    receiver_id: request.receiver_id,
                    sender_id: self.user.id.clone(),
                }));
                SessionUpdate::MessageConfirmed {
                    temp_id,
                    conversation_id,
                }
            }
            Err(e) => {
                self.history.discard(temp_id);
                if self.conversations.is_active(&conversation_id) {
                    self.composer.restore(request.content);
                }
                self.fail(MessagingError::SendFailed(e.to_string()));
                SessionUpdate::SendFailed {
                    temp_id,
                    conversation_id,
                }
            }
        }
    }

    fn on_typing_deadline(&mut self) -> SessionUpdate {
        let now = Instant::now();
        if let Some(stop) = self.typing.poll_expired(now) {
            self.emit(stop);
        }
        if self.typing.expire_remote(now) {
            debug!("Typing indicator expired");
            return SessionUpdate::TypingChanged(false);
        }
        SessionUpdate::Unchanged
    }

    fn emit(&self, event: ClientEvent) {
        if let Err(e) = self.transport.emit(event) {
            debug!("Event dropped: {}", e);
        }
    }

    fn fail(&mut self, error: MessagingError) {
        error!("{}", error);
        let now = Instant::now();
        self.notifications.clean_expired(now);
        if let Some(notification) = Notification::for_error(&error, now) {
            self.notifications.push(notification);
        }
    }

    fn spawn_completion<F>(&self, task: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let completion = task.await;
            if tx.send(completion).is_err() {
                debug!("Session closed, discarding API result");
            }
        });
    }

    /// Stop typing, unsubscribe and disconnect. In-flight API calls are
    /// left to finish; their results are discarded.
    pub async fn shutdown(mut self) {
        info!("Shutting down messaging session for user {}", self.user.id);
        self.typing.cancel();
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.transport.disconnect().await;
    }
}
