use log::debug;

use crate::models::{ConversationId, HistoryEntry, Message, TempId};

/// Ordered messages of the active conversation.
///
/// Entries keep arrival order (initial load, then live and confirmed
/// messages); nothing is re-sorted by timestamp. The store is bound to one
/// conversation and refuses messages for any other.
#[derive(Debug, Default)]
pub struct MessageHistory {
    conversation_id: Option<ConversationId>,
    entries: Vec<HistoryEntry>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drives the "start the conversation" affordance.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_sending()).count()
    }

    /// Bind to `conversation_id` with an empty list (selection, or a failed load).
    ///
    /// Sends still in flight for that same conversation keep their entries.
    pub fn clear(&mut self, conversation_id: ConversationId) {
        self.entries = self.take_pending(&conversation_id);
        self.conversation_id = Some(conversation_id);
    }

    // Only a pending send's confirm or discard may remove its entry
    fn take_pending(&mut self, conversation_id: &ConversationId) -> Vec<HistoryEntry> {
        if self.conversation_id.as_ref() != Some(conversation_id) {
            return Vec::new();
        }
        self.entries.drain(..).filter(HistoryEntry::is_sending).collect()
    }

    /// Overwrite with a fetched history. Never accumulates across loads.
    ///
    /// Pending entries of the same conversation survive the reload and stay
    /// at the end until their send is confirmed or discarded.
    pub fn replace(&mut self, conversation_id: ConversationId, messages: Vec<Message>) {
        debug!("History for {} replaced with {} messages", conversation_id, messages.len());
        let pending = self.take_pending(&conversation_id);
        self.conversation_id = Some(conversation_id);
        self.entries = messages.into_iter().map(HistoryEntry::Confirmed).collect();
        self.entries.extend(pending);
    }

    fn lists_server_id(&self, message: &Message) -> bool {
        message.id.is_some()
            && self.entries.iter().any(|entry| match entry {
                HistoryEntry::Confirmed(existing) => existing.id == message.id,
                HistoryEntry::Pending { .. } => false,
            })
    }

    fn accepts(&self, message: &Message) -> bool {
        self.conversation_id.as_ref() == Some(&message.conversation_id)
    }

    /// Append a delivered message. Returns false for another conversation's message.
    pub fn append(&mut self, message: Message) -> bool {
        if !self.accepts(&message) {
            return false;
        }
        self.entries.push(HistoryEntry::Confirmed(message));
        true
    }

    /// Append an optimistic entry and return its temporary id.
    pub fn push_pending(&mut self, message: Message) -> Option<TempId> {
        if !self.accepts(&message) {
            return None;
        }
        let temp_id = TempId::new();
        self.entries.push(HistoryEntry::Pending { temp_id, message });
        Some(temp_id)
    }

    /// Replace the pending entry with the server copy.
    ///
    /// A server id that a reload already listed is never shown twice: the
    /// pending entry is dropped instead. Without a pending entry the
    /// confirmed message is appended.
    pub fn confirm(&mut self, temp_id: TempId, confirmed: Message) -> bool {
        let position = self.entries.iter().position(|entry| match entry {
            HistoryEntry::Pending { temp_id: pending, .. } => *pending == temp_id,
            HistoryEntry::Confirmed(_) => false,
        });
        let already_listed = self.lists_server_id(&confirmed);

        match position {
            Some(index) if already_listed => {
                self.entries.remove(index);
                true
            }
            Some(index) => {
                self.entries[index] = HistoryEntry::Confirmed(confirmed);
                true
            }
            None if already_listed => false,
            None => self.append(confirmed),
        }
    }

    /// Remove the pending entry, returning the message it held.
    pub fn discard(&mut self, temp_id: TempId) -> Option<Message> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.temp_id() == Some(temp_id))?;
        match self.entries.remove(index) {
            HistoryEntry::Pending { message, .. } => Some(message),
            HistoryEntry::Confirmed(message) => Some(message),
        }
    }
}
