use log::debug;

use crate::models::{Conversation, ConversationId, Message};

/// Conversation list of the signed-in user plus the active selection.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    active: Option<ConversationId>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversations in server order.
    pub fn list(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn replace(&mut self, conversations: Vec<Conversation>) {
        debug!("Conversation list replaced ({} entries)", conversations.len());
        self.conversations = conversations;
    }

    /// Empty the list after a failed fetch. The selection is kept.
    pub fn clear(&mut self) {
        self.conversations.clear();
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    /// Set the active conversation. Returns false when it already was active.
    pub fn select(&mut self, id: ConversationId) -> bool {
        if self.active.as_ref() == Some(&id) {
            return false;
        }
        self.active = Some(id);
        true
    }

    pub fn deselect(&mut self) {
        self.active = None;
    }

    pub fn active_id(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active.as_ref().and_then(|id| self.get(id))
    }

    pub fn is_active(&self, id: &ConversationId) -> bool {
        self.active.as_ref() == Some(id)
    }

    /// Record a live message as the conversation's latest activity.
    /// Returns whether a known conversation matched.
    pub fn apply_incoming(&mut self, message: &Message) -> bool {
        self.set_last_message(message)
    }

    /// Record our own confirmed send; the sender never receives its own echo.
    pub fn record_sent(&mut self, message: &Message) -> bool {
        self.set_last_message(message)
    }

    fn set_last_message(&mut self, message: &Message) -> bool {
        match self
            .conversations
            .iter_mut()
            .find(|c| c.id == message.conversation_id)
        {
            Some(conversation) => {
                conversation.last_message = Some(message.clone());
                true
            }
            None => {
                debug!("Message for unknown conversation {}", message.conversation_id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageId, Role, UserId, UserRef};
    use chrono::Utc;

    fn conversation(id: &str, other: &str) -> Conversation {
        Conversation {
            id: ConversationId::from(id),
            other_user: UserRef {
                id: UserId::from(other),
                name: format!("User {}", other),
                role: Role::Freelancer,
                avatar: None,
            },
            last_message: None,
            created_at: Utc::now(),
        }
    }

    fn message(conversation: &str, content: &str) -> Message {
        Message {
            id: Some(MessageId::from("42")),
            conversation_id: ConversationId::from(conversation),
            sender_id: UserId::from("5"),
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_list_keeps_server_order() {
        let mut store = ConversationStore::new();
        store.replace(vec![conversation("9", "2"), conversation("3", "4"), conversation("5", "6")]);

        let ids: Vec<_> = store.list().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["9", "3", "5"]);
    }

    #[test]
    fn test_incoming_updates_inactive_conversation() {
        let mut store = ConversationStore::new();
        store.replace(vec![conversation("9", "2"), conversation("3", "4")]);
        store.select(ConversationId::from("9"));

        assert!(store.apply_incoming(&message("3", "ping")));
        let updated = store.get(&ConversationId::from("3")).unwrap();
        assert_eq!(updated.last_message.as_ref().unwrap().content, "ping");
        assert!(store.get(&ConversationId::from("9")).unwrap().last_message.is_none());
    }

    #[test]
    fn test_incoming_for_unknown_conversation() {
        let mut store = ConversationStore::new();
        store.replace(vec![conversation("9", "2")]);
        assert!(!store.apply_incoming(&message("77", "lost")));
    }

    #[test]
    fn test_select_and_clear() {
        let mut store = ConversationStore::new();
        store.replace(vec![conversation("1", "2")]);

        assert!(store.select(ConversationId::from("1")));
        assert!(!store.select(ConversationId::from("1")));
        assert_eq!(store.active().unwrap().other_user.id, UserId::from("2"));

        store.clear();
        assert!(store.list().is_empty());
        assert!(store.is_active(&ConversationId::from("1")));
        assert!(store.active().is_none());
    }
}
